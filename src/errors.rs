use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use thiserror::Error;

use crate::domain::errors::{DomainError, FieldErrors};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found")]
    NotFound,

    #[error("Validation failed: {0}")]
    Validation(FieldErrors),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<DomainError> for AppError {
    fn from(e: DomainError) -> Self {
        match e {
            DomainError::NotFound => AppError::NotFound,
            DomainError::Validation(errors) => AppError::Validation(errors),
            DomainError::Internal(msg) => AppError::Internal(msg),
        }
    }
}

impl actix_web::ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        match self {
            AppError::Validation(errors) => {
                HttpResponse::build(status).json(serde_json::json!({ "errors": errors }))
            }
            AppError::Internal(msg) => {
                log::error!("request failed: {}", msg);
                HttpResponse::build(status).json(serde_json::json!({
                    "error": "Internal server error"
                }))
            }
            _ => HttpResponse::build(status).json(serde_json::json!({
                "error": self.to_string()
            })),
        }
    }
}
