//! # Sessions
//!
//! Stateless signed cookie binding a browser to a username until a fixed expiry.
//!
//! Token layout: `base64url(username).expires_unix.base64url(hmac)` where the HMAC-SHA256
//! covers everything before the last dot. Logout removes the cookie; there is no
//! server-side revocation list.
//!
//! Logout therefore does not revoke a token. A copy of the cookie value taken before logout
//! keeps verifying until its `expires_at`. Rotating `COOKIE_KEY` invalidates every session.
use axum_extra::extract::cookie::{Cookie, SameSite};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

use crate::config::{COOKIE_KEY_SECRET, ConfigError, CookieConfig};

type HmacSha256 = Hmac<Sha256>;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SessionError {
    #[error("Malformed session token")]
    Malformed,

    #[error("Session signature mismatch")]
    BadSignature,

    #[error("Session expired")]
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub username: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct SessionSigner {
    cookie_name: String,
    mac: HmacSha256,
    lifetime: Duration,
}

impl SessionSigner {
    pub fn new(cookie: &CookieConfig) -> Result<Self, ConfigError> {
        let mac = HmacSha256::new_from_slice(cookie.key.as_bytes()).map_err(|e| {
            ConfigError::Invalid {
                key: COOKIE_KEY_SECRET,
                message: e.to_string(),
            }
        })?;

        Ok(Self {
            cookie_name: cookie.name.clone(),
            mac,
            lifetime: Duration::days(i64::from(cookie.expiry_days)),
        })
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    pub fn issue(&self, username: &str, now: DateTime<Utc>) -> (String, Session) {
        let expires_at = now + self.lifetime;
        let payload = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(username.as_bytes()),
            expires_at.timestamp()
        );
        let signature = URL_SAFE_NO_PAD.encode(self.sign(&payload));

        (
            format!("{payload}.{signature}"),
            Session {
                username: username.to_string(),
                expires_at,
            },
        )
    }

    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<Session, SessionError> {
        let (payload, signature) = token.rsplit_once('.').ok_or(SessionError::Malformed)?;
        let (user_part, expiry_part) = payload.split_once('.').ok_or(SessionError::Malformed)?;

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| SessionError::Malformed)?;

        let mut mac = self.mac.clone();
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| SessionError::BadSignature)?;

        let expires_at = expiry_part
            .parse::<i64>()
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .ok_or(SessionError::Malformed)?;
        if expires_at <= now {
            return Err(SessionError::Expired);
        }

        let username = URL_SAFE_NO_PAD
            .decode(user_part)
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .ok_or(SessionError::Malformed)?;

        Ok(Session {
            username,
            expires_at,
        })
    }

    pub fn cookie(&self, token: String) -> Cookie<'static> {
        Cookie::build((self.cookie_name.clone(), token))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .max_age(time::Duration::seconds(self.lifetime.num_seconds()))
            .build()
    }

    pub fn removal(&self) -> Cookie<'static> {
        Cookie::build((self.cookie_name.clone(), "")).path("/").build()
    }

    fn sign(&self, payload: &str) -> Vec<u8> {
        let mut mac = self.mac.clone();
        mac.update(payload.as_bytes());
        mac.finalize().into_bytes().to_vec()
    }
}
