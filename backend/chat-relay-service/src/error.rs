use crate::store::StoreError;
use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use error_types::{error_codes, ErrorCategory, ErrorResponse};
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error, Clone)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("server start failure: {0}")]
    StartServer(String),

    #[error("{message}")]
    BadRequest {
        code: &'static str,
        message: String,
    },

    #[error("unauthorized")]
    Unauthorized,

    #[error("{message}")]
    Forbidden {
        code: &'static str,
        message: &'static str,
    },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("internal server error")]
    Internal,
}

impl AppError {
    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        AppError::BadRequest {
            code,
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            AppError::BadRequest { .. } => ErrorCategory::Validation,
            AppError::Unauthorized => ErrorCategory::Authentication,
            AppError::Forbidden { .. } => ErrorCategory::Authorization,
            AppError::Config(_)
            | AppError::StartServer(_)
            | AppError::Store(_)
            | AppError::Internal => ErrorCategory::Dependency,
        }
    }

    /// Returns HTTP status code
    pub fn status_code(&self) -> u16 {
        self.category().status_code()
    }

    pub fn error_type(&self) -> &'static str {
        self.category().error_type()
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::BadRequest { code, .. } | AppError::Forbidden { code, .. } => *code,
            AppError::Unauthorized => error_codes::IDENTITY_MISSING,
            AppError::Store(_) => error_codes::STORE_ERROR,
            AppError::Config(_) | AppError::StartServer(_) | AppError::Internal => {
                error_codes::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Client-facing body; 5xx detail stays in the logs.
    pub fn to_response(&self) -> ErrorResponse {
        let category = self.category();
        let message = match category {
            ErrorCategory::Dependency | ErrorCategory::Delivery => {
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        };
        category.to_response(self.error_code(), &message)
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(AppError::status_code(self))
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn error_response(&self) -> HttpResponse {
        if self.category() == ErrorCategory::Dependency {
            tracing::error!(error = %self, "request failed");
        }
        HttpResponse::build(ResponseError::status_code(self)).json(self.to_response())
    }
}
