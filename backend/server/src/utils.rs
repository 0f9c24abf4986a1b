use std::sync::Arc;

use axum_extra::extract::CookieJar;
use chrono::Utc;
use tracing::debug;

use crate::{
    auth::{Identity, Role, classify},
    error::AppError::{self, Forbidden, SessionAbsent},
    state::State,
};

/// Resolves the session cookie to a configured identity.
pub fn authenticated(state: &Arc<State>, jar: &CookieJar) -> Result<Identity, AppError> {
    let cookie = jar
        .get(state.sessions.cookie_name())
        .ok_or(SessionAbsent)?;

    let session = state
        .sessions
        .verify(cookie.value(), Utc::now())
        .map_err(|e| {
            debug!("Rejected session cookie: {e}");
            SessionAbsent
        })?;

    // Users removed from the config lose access even with a live cookie.
    state.identities.lookup(&session.username).ok_or(SessionAbsent)
}

pub fn role_of(state: &Arc<State>, identity: &Identity) -> Role {
    classify(&identity.username, &state.config.admins)
}

pub fn require_privileged(state: &Arc<State>, identity: &Identity) -> Result<(), AppError> {
    match role_of(state, identity) {
        Role::Privileged => Ok(()),
        Role::Regular => {
            debug!(username = %identity.username, "Admin route refused");
            Err(Forbidden)
        }
    }
}
