use std::{
    collections::BTreeMap,
    env,
    fmt::Display,
    fs::read_to_string,
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

pub const SECRETS_DIR: &str = "/run/secrets";
pub const COOKIE_KEY_SECRET: &str = "COOKIE_KEY";
pub const USERS_SECRET: &str = "SURVEY_USERS";
pub const SERVICE_ACCOUNT_SECRET: &str = "GOOGLE_SERVICE_ACCOUNT";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Required variable {0} is not set")]
    Missing(&'static str),

    #[error("Invalid {key} value: {message}")]
    Invalid { key: &'static str, message: String },

    #[error("Failed to read secret {name}: {source}")]
    Secret {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed secret {name}: {source}")]
    MalformedSecret {
        name: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// One entry of the `SURVEY_USERS` secret. `password` is a bcrypt hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub email: String,
    pub password: String,
}

pub type Users = BTreeMap<String, UserEntry>;

#[derive(Clone)]
pub struct CookieConfig {
    pub name: String,
    pub key: String,
    pub expiry_days: u32,
}

#[derive(Clone)]
pub struct SheetsConfig {
    pub url: String,
    pub responses_sheet: String,
    pub service_account: Option<String>,
}

#[derive(Clone)]
pub struct Config {
    pub port: u16,
    pub cookie: CookieConfig,
    pub sheets: SheetsConfig,
    pub users: Users,
    pub allow_resubmit: bool,
    pub admins: Vec<String>,
    pub fail_closed: bool,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let secrets_dir = env::var("SECRETS_DIR").unwrap_or_else(|_| SECRETS_DIR.to_string());

        Self::from_sources(|key| env::var(key).ok(), Path::new(&secrets_dir))
    }

    /// Builds the config from an arbitrary variable lookup and secrets directory.
    pub fn from_sources<F>(lookup: F, secrets_dir: &Path) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = lookup("SHEETS_URL").ok_or(ConfigError::Missing("SHEETS_URL"))?;

        let users = parse_users(&read_secret(secrets_dir, USERS_SECRET)?)?;
        if users.is_empty() {
            warn!("{USERS_SECRET} holds no users, nobody will be able to log in");
        }

        let key = read_secret(secrets_dir, COOKIE_KEY_SECRET)?;
        if key.is_empty() {
            return Err(ConfigError::Invalid {
                key: COOKIE_KEY_SECRET,
                message: "signing key must not be empty".to_string(),
            });
        }

        let service_account = read_secret(secrets_dir, SERVICE_ACCOUNT_SECRET)
            .map_err(|e| {
                info!("No service account loaded: {e}");
            })
            .ok();

        Ok(Self {
            port: try_load(&lookup, "RUST_PORT", "1111")?,
            cookie: CookieConfig {
                name: try_load(&lookup, "COOKIE_NAME", "bayi_anketi_cookie")?,
                key,
                expiry_days: try_load(&lookup, "COOKIE_EXPIRY_DAYS", "1")?,
            },
            sheets: SheetsConfig {
                url,
                responses_sheet: try_load(&lookup, "RESPONSES_SHEET", "Yanıtlar")?,
                service_account,
            },
            users,
            allow_resubmit: load_flag(&lookup, "ALLOW_RESUBMIT")?,
            admins: parse_list(&lookup("ADMINS").unwrap_or_default()),
            fail_closed: load_flag(&lookup, "DUPLICATE_CHECK_FAIL_CLOSED")?,
        })
    }
}

fn try_load<T, F>(lookup: &F, key: &'static str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .unwrap_or_else(|| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e: T::Err| {
            warn!("Invalid {key} value: {e}");
            ConfigError::Invalid {
                key,
                message: e.to_string(),
            }
        })
}

fn load_flag<F>(lookup: &F, key: &'static str) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        info!("{key} not set, using default: false");
        return Ok(false);
    };

    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(ConfigError::Invalid {
            key,
            message: format!("expected a boolean, got {other:?}"),
        }),
    }
}

pub fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parses the users secret: a JSON object keyed by username.
pub fn parse_users(raw: &str) -> Result<Users, ConfigError> {
    serde_json::from_str(raw).map_err(|source| ConfigError::MalformedSecret {
        name: USERS_SECRET,
        source,
    })
}

fn read_secret(secrets_dir: &Path, secret_name: &'static str) -> Result<String, ConfigError> {
    let path: PathBuf = secrets_dir.join(secret_name);

    read_to_string(&path)
        .map(|s| s.trim().to_string())
        .map_err(|source| {
            warn!("Failed to read {secret_name} from file: {source}");
            ConfigError::Secret {
                name: secret_name,
                source,
            }
        })
}
