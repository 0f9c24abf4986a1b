//! Documentation of the dealer survey backend.
//!
//! Dealers log in, answer a fixed nine-question survey once, and each answer set is
//! appended as a row to a shared Google Sheet. Admins can list and download every
//! response as CSV.
//!
//!
//!
//! # General Infrastructure
//! - Frontend renders the login form, questionnaire and admin table
//! - This crate is the JSON API behind it, one synchronous request per interaction
//! - No background jobs, no queue; the only state between requests is the session
//!   cookie and the sheet's rows
//!
//!
//!
//! # Sessions
//!
//! - Users, display names, emails and bcrypt hashes come from the `SURVEY_USERS` secret
//! - Successful login sets an HMAC signed cookie holding the username and its expiry
//! - Cookie name and lifetime (days) are configurable, the signing key is a secret
//! - Every request re-checks that the user still exists in the config
//! - Logout just removes the cookie
//!
//!
//!
//! # One Response Per Dealer
//!
//! Before showing the form and again before saving, the whole sheet is read and scanned
//! for the dealer's username. If found and `ALLOW_RESUBMIT` is off, the form is replaced
//! by a notice and submissions answer `409`.
//!
//! Read errors during that check fail open by default: the dealer may submit. Set
//! `DUPLICATE_CHECK_FAIL_CLOSED=true` to block instead.
//!
//! The check is not atomic with the append. Two simultaneous submits from one dealer can
//! both land; acceptable at human form-filling pace.
//!
//!
//!
//! # Routes
//!
//! | Method | Path | Who |
//! |---|---|---|
//! | GET | `/healthz` | anyone |
//! | POST | `/login` | anyone |
//! | POST | `/logout` | anyone |
//! | GET | `/survey` | logged in |
//! | POST | `/survey` | logged in |
//! | GET | `/admin/responses` | admins |
//! | GET | `/admin/responses.csv` | admins |
//!
//!
//!
//! # Setup
//!
//! Secrets are read from `/run/secrets` (override with `SECRETS_DIR`):
//! - `COOKIE_KEY`
//! - `SURVEY_USERS`
//! - `GOOGLE_SERVICE_ACCOUNT` (Sheets backend only)
//!
//! Add a user to a local users file.
//! ```sh
//! cargo run -p tester -- bayi1 'password' --name "Bayi Bir" --email bayi1@example.com
//! ```
//!
//! Run against an in-memory sheet.
//! ```sh
//! SHEETS_URL=memory://local RUST_LOG=info cargo run -p survey
//! ```
//!
//! View current docs.
//! ```sh
//! cargo doc --open
//! ```
use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    http::{Method, header::CONTENT_TYPE},
    routing::{get, post},
};

use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{net::TcpListener, signal};
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

pub mod auth;
pub mod config;
pub mod database;
pub mod error;
pub mod export;
pub mod routes;
pub mod session;
pub mod state;
pub mod store;
pub mod submissions;
pub mod survey;
pub mod utils;

use config::Config;
use routes::{
    export_handler, health_handler, login_handler, logout_handler, responses_handler,
    submit_handler, survey_handler,
};
use state::State;

pub fn build_router(state: Arc<State>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .route("/healthz", get(health_handler))
        .route("/login", post(login_handler))
        .route("/logout", post(logout_handler))
        .route("/survey", get(survey_handler).post(submit_handler))
        .route("/admin/responses", get(responses_handler))
        .route("/admin/responses.csv", get(export_handler))
        .layer(cors)
        .with_state(state)
}

pub async fn start_server() -> anyhow::Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Loading config...");
    let config = Config::load()?;

    info!("Initializing state...");
    let state = State::new(config).await?;

    info!("Starting server...");

    let address = format!("0.0.0.0:{}", state.config.port);
    let app = build_router(state);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address).await?;
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutting down...");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        ctrl_c().await.expect("Failed to install Ctrl+C handler");

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        signal(SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
