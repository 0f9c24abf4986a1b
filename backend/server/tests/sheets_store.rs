use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri, header::AUTHORIZATION},
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use server::{
    store::{RowStore, StoreError, sheets::SheetsSheet},
    survey,
};
use tokio::net::TcpListener;

const SPREADSHEET: &str = "sheet-id";
const SPREADSHEET_PATH: &str = "/v4/spreadsheets/sheet-id";
const SHEET: &str = "Responses";
const ACCESS_TOKEN: &str = "local-access-token";
const PRIVATE_KEY: &str = include_str!("fixtures/test_service_account.pem");

/// What the local Sheets API holds and has been asked.
#[derive(Default)]
struct Spreadsheet {
    sheets: BTreeMap<String, Vec<Vec<String>>>,
    calls: Vec<String>,
    values_status: Option<StatusCode>,
}

impl Spreadsheet {
    fn count(&self, suffix: &str) -> usize {
        self.calls.iter().filter(|call| call.ends_with(suffix)).count()
    }
}

type Shared = Arc<Mutex<Spreadsheet>>;

fn title(range: &str) -> String {
    range.replace("%27", "'").trim_matches('\'').replace("''", "'")
}

async fn handle(
    State(shared): State<Shared>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri.path();
    if path == "/token" {
        let token = json!({"access_token": ACCESS_TOKEN, "expires_in": 3600});
        return Json(token).into_response();
    }

    let expected = format!("Bearer {ACCESS_TOKEN}");
    let bearer = headers.get(AUTHORIZATION);
    if bearer.is_none_or(|value| value != expected.as_str()) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let mut spreadsheet = shared.lock().unwrap();
    spreadsheet.calls.push(format!("{method} {path}"));

    let Some(rest) = path.strip_prefix(SPREADSHEET_PATH) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    if let Some(range) = rest.strip_prefix("/values/") {
        if let Some(status) = spreadsheet.values_status {
            return status.into_response();
        }

        if method == Method::POST {
            let Some(range) = range.strip_suffix(":append") else {
                return StatusCode::NOT_FOUND.into_response();
            };
            let body: Value = serde_json::from_slice(&body).unwrap();
            let row: Vec<String> = serde_json::from_value(body["values"][0].clone()).unwrap();

            return match spreadsheet.sheets.get_mut(&title(range)) {
                Some(rows) => {
                    rows.push(row);
                    StatusCode::OK.into_response()
                }
                None => StatusCode::BAD_REQUEST.into_response(),
            };
        }

        let Some(rows) = spreadsheet.sheets.get(&title(range)) else {
            return StatusCode::BAD_REQUEST.into_response();
        };
        if rows.is_empty() {
            return Json(json!({"range": range})).into_response();
        }

        // The API drops trailing empty cells.
        let values: Vec<Vec<String>> = rows
            .iter()
            .map(|row| {
                let last = row.iter().rposition(|cell| !cell.is_empty());
                row[..last.map_or(0, |last| last + 1)].to_vec()
            })
            .collect();
        let range = json!({"range": range, "values": values});
        return Json(range).into_response();
    }

    match (method, rest) {
        (Method::GET, "") => {
            let sheets: Vec<Value> = spreadsheet
                .sheets
                .keys()
                .map(|title| json!({"properties": {"title": title}}))
                .collect();
            Json(json!({"sheets": sheets})).into_response()
        }
        (Method::POST, ":batchUpdate") => {
            let body: Value = serde_json::from_slice(&body).unwrap();
            let title = body["requests"][0]["addSheet"]["properties"]["title"]
                .as_str()
                .unwrap()
                .to_string();
            spreadsheet.sheets.entry(title).or_default();
            Json(json!({"replies": [{}]})).into_response()
        }
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Serves the spreadsheet on a local port and returns its root url.
async fn serve(shared: Shared) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    let app = Router::new().fallback(handle).with_state(shared);

    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

    format!("http://{address}")
}

fn spreadsheet_with(rows: Vec<Vec<String>>) -> Shared {
    let mut spreadsheet = Spreadsheet::default();
    spreadsheet.sheets.insert(SHEET.to_string(), rows);
    Arc::new(Mutex::new(spreadsheet))
}

fn service_account(root: &str) -> String {
    json!({
        "client_email": "survey@project.iam.gserviceaccount.com",
        "private_key": PRIVATE_KEY,
        "token_uri": format!("{root}/token"),
    })
    .to_string()
}

async fn open(root: &str) -> Result<SheetsSheet, StoreError> {
    SheetsSheet::open_or_create_at(
        &format!("{root}/v4/spreadsheets/"),
        SPREADSHEET,
        &service_account(root),
        SHEET,
        &survey::header(),
    )
    .await
}

#[tokio::test]
async fn reopen_keeps_one_sheet_and_header() {
    let shared = Shared::default();
    let root = serve(shared.clone()).await;

    open(&root).await.unwrap();
    open(&root).await.unwrap();

    let spreadsheet = shared.lock().unwrap();
    assert_eq!(spreadsheet.sheets.len(), 1);
    assert_eq!(spreadsheet.sheets[SHEET], vec![survey::header()]);
    assert_eq!(spreadsheet.count(":batchUpdate"), 1);
    assert_eq!(spreadsheet.count(":append"), 1);
}

#[tokio::test]
async fn headerless_sheet_is_repaired() {
    let shared = spreadsheet_with(Vec::new());
    let root = serve(shared.clone()).await;

    let store = open(&root).await.unwrap();

    assert_eq!(store.read_all().await.unwrap().header, survey::header());
    let spreadsheet = shared.lock().unwrap();
    assert_eq!(spreadsheet.count(":batchUpdate"), 0);
    assert_eq!(spreadsheet.count(":append"), 1);
}

#[tokio::test]
async fn data_without_header_is_refused() {
    let stray = vec!["2025-01-01".to_string(), "bayi1".to_string()];
    let shared = spreadsheet_with(vec![Vec::new(), stray]);
    let root = serve(shared.clone()).await;

    assert!(matches!(open(&root).await, Err(StoreError::Misconfigured(_))));
    assert_eq!(shared.lock().unwrap().count(":append"), 0);
}

#[tokio::test]
async fn rows_are_padded_to_the_header() {
    let shared = Shared::default();
    let root = serve(shared.clone()).await;
    let store = open(&root).await.unwrap();

    let mut row = vec![String::new(); survey::COLUMN_COUNT];
    row[0] = "2025-01-01T00:00:00.000000+00:00".to_string();
    row[1] = "bayi1".to_string();
    store.append(&row).await.unwrap();

    let table = store.read_all().await.unwrap();
    assert_eq!(table.header, survey::header());
    assert_eq!(table.rows, vec![row]);
}

#[tokio::test]
async fn server_errors_map_to_read_and_write() {
    let shared = Shared::default();
    let root = serve(shared.clone()).await;
    let store = open(&root).await.unwrap();

    shared.lock().unwrap().values_status = Some(StatusCode::INTERNAL_SERVER_ERROR);

    assert!(matches!(store.read_all().await, Err(StoreError::Read(_))));
    assert!(matches!(
        store.append(&survey::header()).await,
        Err(StoreError::Write(_))
    ));
}

#[tokio::test]
async fn closed_port_is_unreachable() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let root = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    assert!(matches!(open(&root).await, Err(StoreError::Unreachable(_))));
}
