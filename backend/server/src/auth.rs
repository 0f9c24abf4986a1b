//! # Identities
//!
//! Users are defined entirely in static configuration (`SURVEY_USERS`), each with a
//! bcrypt password hash. Nothing here creates or mutates users at runtime.
//!
//! The controller only talks to [`IdentityProvider`], so the credential source can be
//! swapped (file, database, external IdP) without touching the routes.
use serde::Serialize;
use thiserror::Error;

use crate::config::Users;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Regular,
    Privileged,
}

/// Pure membership test against the configured admin list.
pub fn classify(username: &str, admins: &[String]) -> Role {
    if admins.iter().any(|admin| admin == username) {
        Role::Privileged
    } else {
        Role::Regular
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub username: String,
    pub display_name: String,
    pub email: String,
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Unknown user")]
    UnknownUser,

    #[error("Wrong password")]
    WrongPassword,

    #[error("Unusable credential hash: {0}")]
    Hash(#[from] bcrypt::BcryptError),
}

pub trait IdentityProvider: Send + Sync {
    fn authenticate(&self, username: &str, password: &str) -> Result<Identity, AuthError>;

    fn lookup(&self, username: &str) -> Option<Identity>;
}

pub struct StaticIdentities {
    users: Users,
}

impl StaticIdentities {
    pub fn new(users: Users) -> Self {
        Self { users }
    }
}

impl IdentityProvider for StaticIdentities {
    fn authenticate(&self, username: &str, password: &str) -> Result<Identity, AuthError> {
        let entry = self.users.get(username).ok_or(AuthError::UnknownUser)?;

        if !bcrypt::verify(password, &entry.password)? {
            return Err(AuthError::WrongPassword);
        }

        self.lookup(username).ok_or(AuthError::UnknownUser)
    }

    fn lookup(&self, username: &str) -> Option<Identity> {
        self.users.get(username).map(|entry| Identity {
            username: username.to_string(),
            display_name: entry.name.clone().unwrap_or_else(|| username.to_string()),
            email: entry.email.clone(),
        })
    }
}
