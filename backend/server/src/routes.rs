use std::{collections::BTreeMap, sync::Arc};

use axum::{
    Json, extract,
    http::{StatusCode, header::{CONTENT_DISPOSITION, CONTENT_TYPE}},
    response::IntoResponse,
};
use axum_extra::extract::CookieJar;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::task::spawn_blocking;
use tracing::{info, warn};

use crate::{
    auth::{AuthError, Identity, Role},
    error::AppError,
    export::{CSV_CONTENT_TYPE, CSV_DISPOSITION, to_csv},
    state::State,
    store::Table,
    submissions::{check_submitted, submit},
    survey::{
        Answers, NOTICE_ALREADY_SUBMITTED, NOTICE_RECORDED, NOTICE_RESUBMIT_CLOSED,
        NOTICE_RESUBMIT_OPEN, QUESTIONS, Question, ResponseRecord,
    },
    utils::{authenticated, require_privileged, role_of},
};

#[derive(Deserialize)]
pub struct Credentials {
    username: String,
    password: String,
}

#[derive(Deserialize)]
pub struct Submission {
    #[serde(default)]
    answers: BTreeMap<String, String>,
}

#[derive(Serialize)]
pub struct UserView {
    pub username: String,
    pub name: String,
    pub email: String,
    pub role: Role,
}

impl UserView {
    fn new(identity: &Identity, role: Role) -> Self {
        Self {
            username: identity.username.clone(),
            name: identity.display_name.clone(),
            email: identity.email.clone(),
            role,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SurveyStatus {
    Open,
    Closed,
}

#[derive(Serialize)]
pub struct SurveyView {
    pub user: UserView,
    pub status: SurveyStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub questions: Option<&'static [Question]>,
}

#[derive(Serialize)]
pub struct Receipt {
    pub status: &'static str,
    pub notice: &'static str,
    pub resubmit: &'static str,
}

/// Whether the one-response rule closes the survey for this identity.
async fn has_submitted(state: &State, identity: &Identity) -> Result<bool, AppError> {
    if state.config.allow_resubmit {
        return Ok(false);
    }

    let store = state.store.as_ref();
    let failure = state.read_failure();
    Ok(check_submitted(store, &identity.username, failure).await?)
}

pub async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

pub async fn login_handler(
    extract::State(state): extract::State<Arc<State>>,
    jar: CookieJar,
    Json(payload): Json<Credentials>,
) -> Result<(CookieJar, Json<UserView>), AppError> {
    let identities = state.identities.clone();
    let Credentials { username, password } = payload;

    let identity = spawn_blocking(move || identities.authenticate(&username, &password))
        .await
        .map_err(|e| AppError::InternalError(Box::new(e)))?
        .map_err(|e| match e {
            // A stored hash that bcrypt cannot parse is a config fault, not a bad password.
            AuthError::Hash(e) => AppError::InternalError(Box::new(e)),
            e => {
                info!("Login rejected: {e}");
                AppError::CredentialRejected
            }
        })?;

    let (token, session) = state.sessions.issue(&identity.username, Utc::now());
    info!(
        username = %identity.username,
        expires_at = %session.expires_at,
        "Login succeeded"
    );

    let role = role_of(&state, &identity);
    Ok((
        jar.add(state.sessions.cookie(token)),
        Json(UserView::new(&identity, role)),
    ))
}

pub async fn logout_handler(
    extract::State(state): extract::State<Arc<State>>,
    jar: CookieJar,
) -> (CookieJar, StatusCode) {
    (jar.remove(state.sessions.removal()), StatusCode::OK)
}

pub async fn survey_handler(
    extract::State(state): extract::State<Arc<State>>,
    jar: CookieJar,
) -> Result<Json<SurveyView>, AppError> {
    let identity = authenticated(&state, &jar)?;
    let user = UserView::new(&identity, role_of(&state, &identity));

    if has_submitted(&state, &identity).await? {
        return Ok(Json(SurveyView {
            user,
            status: SurveyStatus::Closed,
            notice: Some(NOTICE_ALREADY_SUBMITTED),
            questions: None,
        }));
    }

    Ok(Json(SurveyView {
        user,
        status: SurveyStatus::Open,
        notice: None,
        questions: Some(&QUESTIONS),
    }))
}

pub async fn submit_handler(
    extract::State(state): extract::State<Arc<State>>,
    jar: CookieJar,
    Json(payload): Json<Submission>,
) -> Result<(StatusCode, Json<Receipt>), AppError> {
    let identity = authenticated(&state, &jar)?;
    let answers = Answers::resolve(&payload.answers)?;

    if has_submitted(&state, &identity).await? {
        warn!(username = %identity.username, "Blocked repeat submission");
        return Err(AppError::DuplicateSubmission);
    }

    let record = ResponseRecord::new(&identity, answers, Utc::now());
    submit(state.store.as_ref(), &record).await?;
    info!(username = %identity.username, "Response recorded");

    Ok((
        StatusCode::CREATED,
        Json(Receipt {
            status: "recorded",
            notice: NOTICE_RECORDED,
            resubmit: if state.config.allow_resubmit {
                NOTICE_RESUBMIT_OPEN
            } else {
                NOTICE_RESUBMIT_CLOSED
            },
        }),
    ))
}

pub async fn responses_handler(
    extract::State(state): extract::State<Arc<State>>,
    jar: CookieJar,
) -> Result<Json<Table>, AppError> {
    let identity = authenticated(&state, &jar)?;
    require_privileged(&state, &identity)?;

    Ok(Json(state.store.read_all().await?))
}

pub async fn export_handler(
    extract::State(state): extract::State<Arc<State>>,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    let identity = authenticated(&state, &jar)?;
    require_privileged(&state, &identity)?;

    let table = state.store.read_all().await?;
    let body = to_csv(&table).map_err(|e| AppError::InternalError(e.into()))?;
    info!(
        username = %identity.username,
        rows = table.rows.len(),
        "Exported responses"
    );

    Ok((
        [
            (CONTENT_TYPE, CSV_CONTENT_TYPE),
            (CONTENT_DISPOSITION, CSV_DISPOSITION),
        ],
        body,
    ))
}
