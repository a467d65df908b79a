use std::fmt::{self, Display};

use serde_json::{json, Value};
use warp::{http::StatusCode, reject::Reject};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpError {
    InvalidRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    InternalServerError,
}

impl HttpError {
    pub fn new(self, info: &str) -> Error {
        Error {
            kind: self,
            info: info.to_string(),
            details: None,
        }
    }

    pub fn default(self) -> Error {
        self.new(self.default_info())
    }

    pub fn status(self) -> StatusCode {
        match self {
            HttpError::InvalidRequest => StatusCode::BAD_REQUEST,
            HttpError::Unauthorized => StatusCode::UNAUTHORIZED,
            HttpError::Forbidden => StatusCode::FORBIDDEN,
            HttpError::NotFound => StatusCode::NOT_FOUND,
            HttpError::InternalServerError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn default_info(self) -> &'static str {
        match self {
            HttpError::InvalidRequest => "Invalid request",
            HttpError::Unauthorized => "Authentication credentials were not provided",
            HttpError::Forbidden => "You don't have permission to perform this action",
            HttpError::NotFound => "Not found",
            HttpError::InternalServerError => "Internal server error",
        }
    }
}

/// Request-scoped failure. Everything the handlers can fail with ends up here
/// and is rendered by the rejection handler.
#[derive(Debug, thiserror::Error)]
#[error("{kind:?}: {info}")]
pub struct Error {
    pub kind: HttpError,
    pub info: String,
    pub details: Option<Value>,
}

impl Error {
    /// Field level messages, rendered verbatim as the response body.
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn status(&self) -> StatusCode {
        self.kind.status()
    }

    pub fn body(&self) -> Value {
        match (&self.kind, &self.details) {
            (_, Some(details)) => details.clone(),
            (HttpError::InternalServerError, None) => {
                json!({ "detail": HttpError::InternalServerError.default_info() })
            }
            (HttpError::InvalidRequest, None) => json!({ "errors": self.info }),
            (_, None) => json!({ "detail": self.info }),
        }
    }
}

impl Reject for Error {}

#[derive(Debug)]
pub struct QueryError {
    info: String,
}

impl QueryError {
    pub fn new(info: String) -> Self {
        Self { info }
    }
}

impl From<sqlx::Error> for QueryError {
    fn from(value: sqlx::Error) -> Self {
        match value {
            sqlx::Error::Database(e) => Self::new(format!(
                "{e} (constraint: {})",
                e.constraint().unwrap_or("none")
            )),
            sqlx::Error::RowNotFound => Self::new(String::from("RowNotFound")),
            sqlx::Error::PoolTimedOut => Self::new(String::from("Pool timed out")),
            sqlx::Error::PoolClosed => Self::new(String::from("Pool closed")),
            sqlx::Error::Migrate(e) => Self::new(format!("Migration failed: {e}")),
            e => Self::new(format!("{e}")),
        }
    }
}

impl From<QueryError> for Error {
    fn from(value: QueryError) -> Self {
        HttpError::InternalServerError.new(&value.info)
    }
}

impl Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", self.info)
    }
}

#[derive(Debug)]
pub struct CacheError {
    info: String,
}

impl From<redis::RedisError> for CacheError {
    fn from(value: redis::RedisError) -> Self {
        Self {
            info: format!("{:?} - {:?}", value.code(), value.detail()),
        }
    }
}

impl From<CacheError> for Error {
    fn from(value: CacheError) -> Self {
        HttpError::InternalServerError.new(&value.info)
    }
}
