use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;

use crate::repo::RepoError;

/// Response envelope shared by every endpoint, success or failure.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct Envelope {
    pub status: bool,
    pub message: String,
}

impl Envelope {
    pub fn ok(message: impl Into<String>) -> Self {
        Envelope { status: true, message: message.into() }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Envelope { status: false, message: message.into() }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("{0}")] BadRequest(String),
    #[error("{0}")] Unauthorized(String),
    #[error("{0}")] NotFound(String),
    #[error("{0}")] Conflict(String),
    // internal detail is logged at the failure site, never surfaced
    #[error("Internal server error")] Internal,
}

impl ApiError {
    pub fn missing_fields() -> Self {
        ApiError::BadRequest("Missing required fields".into())
    }
}

impl From<RepoError> for ApiError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::NotFound => ApiError::NotFound("Not found".into()),
            RepoError::Conflict => ApiError::Conflict("Conflict".into()),
            RepoError::Internal(detail) => {
                log::error!("repository failure: {detail}");
                ApiError::Internal
            }
        }
    }
}

impl ResponseError for ApiError {
    fn error_response(&self) -> HttpResponse {
        use actix_web::http::StatusCode;
        let status = match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        HttpResponse::build(status).json(Envelope::fail(self.to_string()))
    }
}
