//! # Submissions
//!
//! Duplicate-submission guard and submission writer.
//!
//! The guard re-reads the whole sheet on every check and scans the `username` column.
//! Expected row counts are dozens to low thousands, so there is no index or cache.
//!
//! The check and the append are separate store calls. Two concurrent submissions from the
//! same user can both pass the guard; closing that gap needs a conditional append the
//! stores do not offer.
use tracing::warn;

use crate::{
    store::{RowStore, StoreError, Table},
    survey::{ResponseRecord, USERNAME_COLUMN},
};

/// What a failed read during the duplicate check means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadFailure {
    /// Treat as "not submitted yet".
    Open,
    /// Surface the read error and block the submission.
    Closed,
}

impl ReadFailure {
    pub fn from_fail_closed(fail_closed: bool) -> Self {
        if fail_closed { Self::Closed } else { Self::Open }
    }
}

/// Case-sensitive exact match against the `username` column.
pub fn contains_username(table: &Table, username: &str) -> bool {
    let Some(column) = table.column(USERNAME_COLUMN) else {
        return false;
    };

    table
        .rows
        .iter()
        .any(|row| row.get(column).is_some_and(|value| value == username))
}

pub async fn check_submitted(
    store: &dyn RowStore,
    username: &str,
    on_failure: ReadFailure,
) -> Result<bool, StoreError> {
    match on_failure {
        ReadFailure::Open => Ok(already_submitted(store, username).await),
        ReadFailure::Closed => Ok(contains_username(&store.read_all().await?, username)),
    }
}

/// Fail-open duplicate check: a read error counts as "not submitted".
pub async fn already_submitted(store: &dyn RowStore, username: &str) -> bool {
    match store.read_all().await {
        Ok(table) => contains_username(&table, username),
        Err(e) => {
            warn!(username, "Duplicate check failed open: {e}");
            false
        }
    }
}

/// Appends exactly one row. Store errors propagate unchanged and are not retried.
pub async fn submit(store: &dyn RowStore, record: &ResponseRecord) -> Result<(), StoreError> {
    let row = record.to_row();

    #[cfg(feature = "verbose")]
    tracing::debug!(?row, "Appending response row");

    store.append(&row).await
}
