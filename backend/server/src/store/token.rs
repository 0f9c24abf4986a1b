//! Service-account access tokens for the Google APIs.
//!
//! A short-lived RS256 JWT signed with the service account's private key is exchanged at
//! the account's `token_uri` for an OAuth access token. The token is cached and reused
//! until one minute before it expires.
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use super::StoreError;

pub const SCOPES: [&str; 2] = [
    "https://www.googleapis.com/auth/spreadsheets",
    "https://www.googleapis.com/auth/drive",
];
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
const REFRESH_MARGIN_SECS: i64 = 60;

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// The fields of a service-account JSON key this crate needs.
#[derive(Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: String,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

struct AccessToken {
    value: String,
    expires_at: DateTime<Utc>,
}

pub struct TokenSource {
    key: ServiceAccountKey,
    encoding_key: EncodingKey,
    http: Client,
    cached: Mutex<Option<AccessToken>>,
}

impl TokenSource {
    pub fn from_json(json: &str, http: Client) -> Result<Self, StoreError> {
        let key: ServiceAccountKey = serde_json::from_str(json)
            .map_err(|e| StoreError::Misconfigured(format!("service account: {e}")))?;
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| StoreError::Misconfigured(format!("service account key: {e}")))?;

        Ok(Self {
            key,
            encoding_key,
            http,
            cached: Mutex::new(None),
        })
    }

    pub async fn access_token(&self) -> Result<String, StoreError> {
        let now = Utc::now();
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref() {
            if token.expires_at - Duration::seconds(REFRESH_MARGIN_SECS) > now {
                return Ok(token.value.clone());
            }
        }

        let token = self.exchange(now).await?;
        let value = token.value.clone();
        *cached = Some(token);

        Ok(value)
    }

    fn assertion(&self, now: DateTime<Utc>) -> Result<String, StoreError> {
        let iat = now.timestamp();
        let claims = Claims {
            iss: &self.key.client_email,
            scope: SCOPES.join(" "),
            aud: &self.key.token_uri,
            iat,
            exp: iat + ASSERTION_LIFETIME_SECS,
        };

        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &self.encoding_key)
            .map_err(|e| StoreError::Misconfigured(format!("jwt: {e}")))
    }

    async fn exchange(&self, now: DateTime<Utc>) -> Result<AccessToken, StoreError> {
        let assertion = self.assertion(now)?;

        let response = self
            .http
            .post(&self.key.token_uri)
            .form(&[("grant_type", GRANT_TYPE), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| StoreError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Unreachable(format!(
                "token exchange returned {status}: {body}"
            )));
        }

        let payload: TokenResponse = response
            .json()
            .await
            .map_err(|e| StoreError::Unreachable(format!("token response: {e}")))?;
        debug!(expires_in = payload.expires_in, "Minted access token");

        Ok(AccessToken {
            value: payload.access_token,
            expires_at: now + Duration::seconds(payload.expires_in),
        })
    }
}
