// cohort-service/src/models/mod.rs
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use serde_json::json;

pub mod directory;
pub use directory::*;

pub mod proposal;
pub use proposal::*;

pub mod team;
pub use team::*;

// JWT claims carried by authenticated callers
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Claims {
    pub sub: String,  // Subject (username)
    pub role: CallerRole,
    pub exp: usize,   // Expiration time
    pub iat: usize,   // Issued at
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CallerRole {
    Student,
    Professor,
}

// Custom error types
#[derive(Debug, Display, Clone, PartialEq)]
pub enum ServiceError {
    #[display(fmt = "Internal Server Error")]
    InternalServerError,
    #[display(fmt = "BadRequest: {}", _0)]
    BadRequest(String),
    #[display(fmt = "Unauthorized")]
    Unauthorized,
    #[display(fmt = "Not authorized for this course")]
    NotAuthorized,
    #[display(fmt = "Not Found: {}", _0)]
    NotFound(String),
    #[display(fmt = "Course not enabled: {}", _0)]
    CourseNotEnabled(String),
    #[display(fmt = "Conflict: {}", _0)]
    Conflict(String),
    #[display(fmt = "Invalid cardinality: {}", _0)]
    InvalidCardinality(String),
    #[display(fmt = "Notification dispatch failed: {}", _0)]
    DispatchFailure(String),
    #[display(fmt = "Stale proposal: {}", _0)]
    StaleProposal(String),
}

impl std::error::Error for ServiceError {}

impl ServiceError {
    pub fn token_not_found() -> Self {
        ServiceError::NotFound("response token".to_string())
    }

    fn kind(&self) -> &'static str {
        match self {
            ServiceError::InternalServerError => "internal",
            ServiceError::BadRequest(_) => "bad_request",
            ServiceError::Unauthorized => "unauthorized",
            ServiceError::NotAuthorized => "not_authorized",
            ServiceError::NotFound(_) => "not_found",
            ServiceError::CourseNotEnabled(_) => "course_not_enabled",
            ServiceError::Conflict(_) => "conflict",
            ServiceError::InvalidCardinality(_) => "invalid_cardinality",
            ServiceError::DispatchFailure(_) => "dispatch_failure",
            ServiceError::StaleProposal(_) => "stale_proposal",
        }
    }
}

impl ResponseError for ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::InternalServerError => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::BadRequest(_) | ServiceError::InvalidCardinality(_) => {
                StatusCode::BAD_REQUEST
            }
            ServiceError::Unauthorized => StatusCode::UNAUTHORIZED,
            ServiceError::NotAuthorized | ServiceError::CourseNotEnabled(_) => {
                StatusCode::FORBIDDEN
            }
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Conflict(_) | ServiceError::StaleProposal(_) => StatusCode::CONFLICT,
            ServiceError::DispatchFailure(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "error": self.kind(),
            "message": self.to_string(),
        }))
    }
}
