//! # Google Sheets
//!
//! Production response store: one worksheet of a spreadsheet, addressed by the
//! spreadsheet's browser url and the worksheet title.
//!
//! ## Calls (Sheets API v4)
//! - `GET {id}?fields=sheets.properties.title`: does the worksheet exist
//! - `POST {id}:batchUpdate` with `addSheet`: create it (1000 rows x 50 columns)
//! - `POST {id}/values/{range}:append`: header row on creation, then one row per response
//! - `GET {id}/values/{range}`: every row, header first
//!
//! Opening always reads row 1 and writes the header when it is empty, so a worksheet left
//! headerless by an interrupted creation is repaired on the next start.
//!
//! Values are written `RAW`, so answers are never reinterpreted as formulas or dates.
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Url};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{info, warn};

use super::{RowStore, StoreError, Table, token::TokenSource};

pub const API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets/";
const NEW_SHEET_ROWS: u32 = 1000;
const NEW_SHEET_COLUMNS: u32 = 50;

/// Extracts the spreadsheet id from `https://docs.google.com/spreadsheets/d/<id>/...`.
pub fn spreadsheet_id(url: &str) -> Option<&str> {
    let (_, rest) = url.split_once("/spreadsheets/d/")?;
    let id = rest.split(['/', '?', '#']).next()?;

    (!id.is_empty()).then_some(id)
}

/// Whole-sheet A1 range. Titles are always quoted so spaces and non-ASCII survive.
pub fn a1_range(sheet: &str) -> String {
    format!("'{}'", sheet.replace('\'', "''"))
}

/// Sheets returns formatted values; anything that is not a string is rendered back to text.
pub fn cell_text(value: Value) -> String {
    match value {
        Value::String(text) => text,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[derive(Deserialize)]
struct Spreadsheet {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Deserialize)]
struct SheetProperties {
    title: String,
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

pub struct SheetsSheet {
    http: Client,
    tokens: TokenSource,
    api_base: Url,
    spreadsheet_id: String,
    sheet: String,
}

impl SheetsSheet {
    pub async fn open_or_create(
        spreadsheet_id: &str,
        service_account: &str,
        sheet: &str,
        header: &[String],
    ) -> Result<Self, StoreError> {
        Self::open_or_create_at(API_BASE, spreadsheet_id, service_account, sheet, header).await
    }

    /// [`Self::open_or_create`] against another API root.
    pub async fn open_or_create_at(
        api_base: &str,
        spreadsheet_id: &str,
        service_account: &str,
        sheet: &str,
        header: &[String],
    ) -> Result<Self, StoreError> {
        let api_base = Url::parse(api_base)
            .map_err(|e| StoreError::Misconfigured(format!("{api_base}: {e}")))?;
        if api_base.cannot_be_a_base() {
            return Err(StoreError::Misconfigured(format!("{api_base} cannot be a base")));
        }

        let http = Client::new();
        let tokens = TokenSource::from_json(service_account, http.clone())?;

        let handle = Self {
            http,
            tokens,
            api_base,
            spreadsheet_id: spreadsheet_id.to_string(),
            sheet: sheet.to_string(),
        };

        if !handle.sheet_exists().await? {
            info!(sheet, "Worksheet not found, creating it");
            handle.add_sheet().await?;
        }
        handle.ensure_header(header).await?;

        Ok(handle)
    }

    fn url(&self, segments: &[&str]) -> Result<Url, StoreError> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::Misconfigured(format!("{} cannot be a base", self.api_base)))?
            .pop_if_empty()
            .extend(segments);

        Ok(url)
    }

    async fn ensure_header(&self, header: &[String]) -> Result<(), StoreError> {
        let table = self.read_all().await?;

        if !table.header.is_empty() {
            if table.header != header {
                warn!(sheet = %self.sheet, found = ?table.header, "Unexpected header row");
            }
            return Ok(());
        }

        // Appending would land below the existing rows instead of in row 1.
        if !table.rows.is_empty() {
            return Err(StoreError::Misconfigured(format!(
                "row 1 of {} is empty but later rows hold data",
                self.sheet
            )));
        }

        info!(sheet = %self.sheet, "Writing header row");
        self.append(header).await
    }

    async fn request(&self, method: Method, url: Url) -> Result<RequestBuilder, StoreError> {
        let token = self.tokens.access_token().await?;

        Ok(self.http.request(method, url).bearer_auth(token))
    }

    async fn sheet_exists(&self) -> Result<bool, StoreError> {
        let mut url = self.url(&[self.spreadsheet_id.as_str()])?;
        url.query_pairs_mut().append_pair("fields", "sheets.properties.title");

        let spreadsheet: Spreadsheet = send(self.request(Method::GET, url).await?, StoreError::Read)
            .await?
            .json()
            .await
            .map_err(|e| StoreError::Read(e.to_string()))?;

        Ok(spreadsheet
            .sheets
            .iter()
            .any(|entry| entry.properties.title == self.sheet))
    }

    async fn add_sheet(&self) -> Result<(), StoreError> {
        let url = self.url(&[format!("{}:batchUpdate", self.spreadsheet_id).as_str()])?;
        let body = json!({
            "requests": [{
                "addSheet": {
                    "properties": {
                        "title": self.sheet,
                        "gridProperties": {
                            "rowCount": NEW_SHEET_ROWS,
                            "columnCount": NEW_SHEET_COLUMNS,
                        }
                    }
                }
            }]
        });

        send(
            self.request(Method::POST, url).await?.json(&body),
            StoreError::Write,
        )
        .await?;

        Ok(())
    }
}

#[async_trait]
impl RowStore for SheetsSheet {
    fn backend_tag(&self) -> &'static str {
        "sheets"
    }

    async fn read_all(&self) -> Result<Table, StoreError> {
        let url = self.url(&[
            self.spreadsheet_id.as_str(),
            "values",
            a1_range(&self.sheet).as_str(),
        ])?;

        let range: ValueRange = send(self.request(Method::GET, url).await?, StoreError::Read)
            .await?
            .json()
            .await
            .map_err(|e| StoreError::Read(e.to_string()))?;

        Ok(Table::from_values(
            range
                .values
                .into_iter()
                .map(|row| row.into_iter().map(cell_text).collect())
                .collect(),
        ))
    }

    async fn append(&self, row: &[String]) -> Result<(), StoreError> {
        let mut url = self.url(&[
            self.spreadsheet_id.as_str(),
            "values",
            format!("{}:append", a1_range(&self.sheet)).as_str(),
        ])?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", "RAW")
            .append_pair("insertDataOption", "INSERT_ROWS");

        send(
            self.request(Method::POST, url)
                .await?
                .json(&json!({ "values": [row] })),
            StoreError::Write,
        )
        .await?;

        Ok(())
    }
}

/// Sends a request, mapping transport failures to `Unreachable` and error statuses to `kind`.
async fn send(
    request: RequestBuilder,
    kind: fn(String) -> StoreError,
) -> Result<reqwest::Response, StoreError> {
    let response = request.send().await.map_err(|e| {
        if e.is_connect() || e.is_timeout() {
            StoreError::Unreachable(e.to_string())
        } else {
            kind(e.to_string())
        }
    })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(kind(format!("{status}: {body}")));
    }

    Ok(response)
}
