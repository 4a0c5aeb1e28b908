use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application error types
#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed SQL or malformed ADQL function arguments.
    #[error("Invalid SQL: {0}")]
    InvalidSql(String),

    #[error("Not a SELECT statement: {0}")]
    NotSelect(String),

    /// No database instance could be identified for the query.
    #[error("Resolution error: {0}")]
    Resolution(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Connection error: {0}")]
    Connection(String),

    /// Backend failure while running a query. `state` is the engine's SQLSTATE.
    #[error("Execution error: {message}")]
    Execution {
        message: String,
        state: Option<String>,
        code: Option<i64>,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn execution(message: impl Into<String>) -> Self {
        AppError::Execution {
            message: message.into(),
            state: None,
            code: None,
        }
    }

    /// Short name of the error class, recorded in persisted job errors.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::InvalidSql(_) => "ParsingException",
            AppError::NotSelect(_) => "NotSelectStatementException",
            AppError::Resolution(_) => "ResolutionException",
            AppError::Catalog(_) => "CatalogException",
            AppError::Connection(_) | AppError::Execution { .. } => "SQLException",
            AppError::NotFound(_) => "NotFoundException",
            AppError::Timeout(_) => "TimeoutException",
            AppError::Storage(_) => "StorageException",
            AppError::Io(_) => "IOException",
            AppError::Internal(_) => "InternalException",
        }
    }

    /// The message without the variant prefix.
    pub fn message(&self) -> String {
        match self {
            AppError::InvalidSql(msg)
            | AppError::NotSelect(msg)
            | AppError::Resolution(msg)
            | AppError::Catalog(msg)
            | AppError::Connection(msg)
            | AppError::NotFound(msg)
            | AppError::Timeout(msg)
            | AppError::Storage(msg)
            | AppError::Io(msg)
            | AppError::Internal(msg) => msg.clone(),
            AppError::Execution { message, .. } => message.clone(),
        }
    }
}

/// Error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorDetail {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_detail) = match self {
            AppError::InvalidSql(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorDetail::new("INVALID_SQL", msg).with_details("ParsingException"),
            ),
            AppError::NotSelect(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorDetail::new("NOT_SELECT", "Only Select Queries allowed").with_details(msg),
            ),
            AppError::Resolution(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorDetail::new("RESOLUTION_ERROR", msg),
            ),
            AppError::Catalog(msg) => (
                StatusCode::BAD_GATEWAY,
                ErrorDetail::new("CATALOG_ERROR", msg),
            ),
            AppError::Connection(msg) => (
                StatusCode::BAD_GATEWAY,
                ErrorDetail::new("CONNECTION_ERROR", msg),
            ),
            AppError::Execution {
                message,
                state,
                code,
            } => {
                let mut detail = ErrorDetail::new("EXECUTION_ERROR", message);
                if let Some(state) = state {
                    let details = match code {
                        Some(code) => format!("SQLSTATE {} (code {})", state, code),
                        None => format!("SQLSTATE {}", state),
                    };
                    detail = detail.with_details(details);
                }
                (StatusCode::INTERNAL_SERVER_ERROR, detail)
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, ErrorDetail::new("NOT_FOUND", msg)),
            AppError::Timeout(msg) => (
                StatusCode::GATEWAY_TIMEOUT,
                ErrorDetail::new("TIMEOUT", msg),
            ),
            AppError::Storage(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new("STORAGE_ERROR", msg),
            ),
            AppError::Io(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new("IO_ERROR", msg),
            ),
            AppError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new("INTERNAL_ERROR", msg),
            ),
        };

        let body = Json(ErrorResponse {
            error: error_detail,
        });

        (status, body).into_response()
    }
}

/// Convert anyhow::Error to AppError
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// Convert rusqlite::Error to AppError
impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        AppError::Storage(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal(format!("Serialization failed: {}", err))
    }
}

/// Server errors keep the engine's SQLSTATE and code; everything else from the
/// driver is a connection problem.
impl From<mysql_async::Error> for AppError {
    fn from(err: mysql_async::Error) -> Self {
        match err {
            mysql_async::Error::Server(server) => AppError::Execution {
                message: server.message,
                state: Some(server.state),
                code: Some(i64::from(server.code)),
            },
            other => AppError::Connection(other.to_string()),
        }
    }
}

impl From<tokio_postgres::Error> for AppError {
    fn from(err: tokio_postgres::Error) -> Self {
        if let Some(db_error) = err.as_db_error() {
            return AppError::Execution {
                message: db_error.message().to_string(),
                state: Some(db_error.code().code().to_string()),
                code: None,
            };
        }
        if err.is_closed() {
            AppError::Connection(err.to_string())
        } else {
            AppError::execution(err.to_string())
        }
    }
}
