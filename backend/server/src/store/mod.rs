//! # Response store
//!
//! Tabular, row-oriented, append-only store addressed by URL + sheet name.
//!
//! ## Backends
//! - `https://docs.google.com/spreadsheets/d/<id>/...`: Google Sheets, the production store
//! - `redis://` / `rediss://`: Redis, header key + list of JSON rows
//! - `memory://<name>`: in-process book of sheets for local runs and tests
//!
//! ## Guarantees
//! - [`open_or_create`] is idempotent: one sheet, one header row
//! - `append` adds exactly one row
//! - No transactions. Reading then appending is not atomic, so two concurrent writers
//!   can both pass a uniqueness check
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::{database::RedisSheet, survey::header};

pub mod memory;
pub mod sheets;
pub mod token;

use memory::MemoryBook;
use sheets::SheetsSheet;

pub const MEMORY_SCHEME: &str = "memory://";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Unsupported store url: {0}")]
    UnsupportedUrl(String),

    #[error("Store misconfigured: {0}")]
    Misconfigured(String),

    #[error("Store unreachable: {0}")]
    Unreachable(String),

    #[error("Store read failed: {0}")]
    Read(String),

    #[error("Store write failed: {0}")]
    Write(String),
}

/// Snapshot of a sheet: the header row followed by every record row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Table {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Splits raw sheet values into header and rows. Rows shorter than the header are
    /// padded, since spreadsheets drop trailing empty cells.
    pub fn from_values(values: Vec<Vec<String>>) -> Self {
        let mut values = values.into_iter();
        let Some(header) = values.next() else {
            return Self::default();
        };

        let width = header.len();
        let rows = values
            .map(|mut row| {
                if row.len() < width {
                    row.resize(width, String::new());
                }
                row
            })
            .collect();

        Self { header, rows }
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.header.iter().position(|column| column == name)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[async_trait]
pub trait RowStore: Send + Sync {
    fn backend_tag(&self) -> &'static str;

    async fn read_all(&self) -> Result<Table, StoreError>;

    async fn append(&self, row: &[String]) -> Result<(), StoreError>;
}

/// Opens the sheet behind `url`, creating it with the survey header if it is missing.
pub async fn open_or_create(
    url: &str,
    sheet_name: &str,
    service_account: Option<&str>,
) -> Result<Arc<dyn RowStore>, StoreError> {
    let header = header();

    let store: Arc<dyn RowStore> = if let Some(book) = url.strip_prefix(MEMORY_SCHEME) {
        Arc::new(MemoryBook::named(book).open_or_create(sheet_name, &header)?)
    } else if url.starts_with("redis://") || url.starts_with("rediss://") {
        Arc::new(RedisSheet::open_or_create(url, sheet_name, &header).await?)
    } else if let Some(spreadsheet_id) = sheets::spreadsheet_id(url) {
        let key = service_account.ok_or_else(|| {
            StoreError::Misconfigured("Google Sheets needs a service account".to_string())
        })?;
        Arc::new(SheetsSheet::open_or_create(spreadsheet_id, key, sheet_name, &header).await?)
    } else {
        return Err(StoreError::UnsupportedUrl(url.to_string()));
    };

    info!(
        backend = store.backend_tag(),
        sheet = sheet_name,
        "Response store ready"
    );

    Ok(store)
}
