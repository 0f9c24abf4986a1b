//! # Redis
//!
//! Alternative response store for deployments without a spreadsheet.
//!
//! ## Layout
//!
//! - `survey:{sheet}:header`: header row as a JSON array, written once with `SET NX`
//! - `survey:{sheet}:rows`: list of JSON arrays, one per response, appended with `RPUSH`
//!
//! `SET NX` keeps re-opening idempotent even when two processes start together: only one
//! header ever lands. Rows are never updated or deleted.
use std::time::Duration;

use async_trait::async_trait;
use redis::{
    AsyncCommands, Client,
    aio::{ConnectionManager, ConnectionManagerConfig},
};
use tracing::debug;

use crate::store::{RowStore, StoreError, Table};

pub async fn init_redis(redis_url: &str) -> Result<ConnectionManager, StoreError> {
    let config = ConnectionManagerConfig::new()
        .set_number_of_retries(1)
        .set_connection_timeout(Duration::from_secs(1));

    let client =
        Client::open(redis_url).map_err(|e| StoreError::Misconfigured(e.to_string()))?;

    client
        .get_connection_manager_with_config(config)
        .await
        .map_err(|e| StoreError::Unreachable(e.to_string()))
}

pub struct RedisSheet {
    connection: ConnectionManager,
    header_key: String,
    rows_key: String,
}

impl RedisSheet {
    pub async fn open_or_create(
        redis_url: &str,
        sheet: &str,
        header: &[String],
    ) -> Result<Self, StoreError> {
        let mut connection = init_redis(redis_url).await?;
        let (header_key, rows_key) = keys(sheet);

        let created: bool = connection
            .set_nx(&header_key, encode(header)?)
            .await
            .map_err(|e| StoreError::Write(e.to_string()))?;
        debug!(sheet, created, "Opened redis sheet");

        Ok(Self {
            connection,
            header_key,
            rows_key,
        })
    }
}

#[async_trait]
impl RowStore for RedisSheet {
    fn backend_tag(&self) -> &'static str {
        "redis"
    }

    async fn read_all(&self) -> Result<Table, StoreError> {
        let mut connection = self.connection.clone();

        let header: Option<String> = connection
            .get(&self.header_key)
            .await
            .map_err(|e| StoreError::Read(e.to_string()))?;
        let Some(header) = header else {
            return Err(StoreError::Read(format!("{} is missing", self.header_key)));
        };

        let rows: Vec<String> = connection
            .lrange(&self.rows_key, 0, -1)
            .await
            .map_err(|e| StoreError::Read(e.to_string()))?;

        let mut values = Vec::with_capacity(rows.len() + 1);
        values.push(decode(&header)?);
        for row in &rows {
            values.push(decode(row)?);
        }

        Ok(Table::from_values(values))
    }

    async fn append(&self, row: &[String]) -> Result<(), StoreError> {
        let mut connection = self.connection.clone();

        let _: usize = connection
            .rpush(&self.rows_key, encode(row)?)
            .await
            .map_err(|e| StoreError::Write(e.to_string()))?;

        Ok(())
    }
}

fn keys(sheet: &str) -> (String, String) {
    (
        format!("survey:{sheet}:header"),
        format!("survey:{sheet}:rows"),
    )
}

fn encode(row: &[String]) -> Result<String, StoreError> {
    serde_json::to_string(row).map_err(|e| StoreError::Write(e.to_string()))
}

fn decode(raw: &str) -> Result<Vec<String>, StoreError> {
    serde_json::from_str(raw).map_err(|e| StoreError::Read(format!("corrupt row {raw:?}: {e}")))
}
