use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::{debug, error};

use crate::{
    store::StoreError,
    survey::{NOTICE_ALREADY_SUBMITTED, SurveyError},
};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Invalid username or password")]
    CredentialRejected,

    #[error("Login required")]
    SessionAbsent,

    #[error("Admin access required")]
    Forbidden,

    #[error("{}", NOTICE_ALREADY_SUBMITTED)]
    DuplicateSubmission,

    #[error("Response store unreachable: {0}")]
    StoreUnreachable(String),

    #[error("Could not read responses: {0}")]
    StoreRead(String),

    #[error("Could not save responses: {0}")]
    StoreWrite(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Unreachable(message) => AppError::StoreUnreachable(message),
            StoreError::Read(message) => AppError::StoreRead(message),
            StoreError::Write(message) => AppError::StoreWrite(message),
            other @ (StoreError::UnsupportedUrl(_) | StoreError::Misconfigured(_)) => {
                AppError::InternalError(Box::new(other))
            }
        }
    }
}

impl From<SurveyError> for AppError {
    fn from(e: SurveyError) -> Self {
        AppError::MalformedPayload(e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::MalformedPayload { .. } => StatusCode::BAD_REQUEST,
            AppError::CredentialRejected | AppError::SessionAbsent => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::DuplicateSubmission => StatusCode::CONFLICT,
            AppError::StoreUnreachable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            AppError::StoreRead { .. } | AppError::StoreWrite { .. } => StatusCode::BAD_GATEWAY,
            AppError::InternalError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            error!("{self}");
        } else {
            debug!("{self}");
        }

        (status, self.to_string()).into_response()
    }
}
