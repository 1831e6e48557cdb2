//! Error handling for the site backend

use serde_json::Value;
use std::fmt;
use thiserror::Error;
use topos_auth::AuthError;
use topos_postgrest::PostgrestError;
use topos_storage::StorageError;

/// Unified error type for the site backend
#[derive(Error, Debug)]
pub enum Error {
    /// Network or HTTP related errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization or deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing errors
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// Database query errors
    #[error("{0}")]
    Database(#[from] PostgrestError),

    /// Object storage errors
    #[error("{0}")]
    Storage(#[from] StorageError),

    /// Session resolution errors
    #[error("{0}")]
    Auth(#[from] AuthError),

    /// Missing or malformed settings
    #[error("Configuration error: {0}")]
    Config(String),

    /// Rejected input, optionally with field-level details
    #[error("{message}")]
    Validation {
        message: String,
        details: Option<Value>,
    },

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    /// The primary write happened but a dependent step did not
    #[error("{message}")]
    Partial { message: String, details: String },

    /// Some writes of a batch failed; `failed` names the rows left behind
    #[error("{message}: {} row(s) not written", .failed.len())]
    Incomplete { message: String, failed: Vec<String> },

    /// A step failed and the writes before it were undone
    #[error("{message}: {source}")]
    RolledBack {
        message: String,
        #[source]
        source: Box<Error>,
    },

    /// A failed step, described for the caller, with the underlying cause
    #[error("{message}: {source}")]
    Context {
        message: String,
        #[source]
        source: Box<Error>,
    },

    /// Too many requests from one caller
    #[error("rate limited, retry in {retry_after}s")]
    RateLimited {
        limit: u32,
        retry_after: u64,
        reset_at: u64,
    },

    /// A third-party service refused the request
    #[error("{0}")]
    Upstream(String),

    /// General errors
    #[error("{0}")]
    General(String),
}

impl Error {
    pub fn validation<T: fmt::Display>(msg: T) -> Self {
        Error::Validation {
            message: msg.to_string(),
            details: None,
        }
    }

    pub fn validation_with<T: fmt::Display>(msg: T, details: Value) -> Self {
        Error::Validation {
            message: msg.to_string(),
            details: Some(details),
        }
    }

    pub fn not_found<T: fmt::Display>(msg: T) -> Self {
        Error::NotFound(msg.to_string())
    }

    pub fn upstream<T: fmt::Display>(msg: T) -> Self {
        Error::Upstream(msg.to_string())
    }

    pub fn config<T: fmt::Display>(msg: T) -> Self {
        Error::Config(msg.to_string())
    }

    pub fn general<T: fmt::Display>(msg: T) -> Self {
        Error::General(msg.to_string())
    }

    /// HTTP status this error maps to.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Validation { .. } => 400,
            Error::Unauthorized(_) => 401,
            Error::Forbidden(_) => 403,
            Error::NotFound(_) => 404,
            Error::Partial { .. } => 207,
            Error::RateLimited { .. } => 429,
            Error::Context { source, .. } => match source.status_code() {
                400 | 404 => source.status_code(),
                _ => 500,
            },
            _ => 500,
        }
    }

    /// The innermost error, past any added context.
    pub fn root(&self) -> &Error {
        match self {
            Error::Context { source, .. } => source.root(),
            other => other,
        }
    }

    /// The database error at the root, if any.
    pub fn as_postgrest(&self) -> Option<&PostgrestError> {
        match self.root() {
            Error::Database(err) => Some(err),
            _ => None,
        }
    }

    /// Short message suitable for the response envelope.
    pub fn public_message(&self) -> String {
        match self {
            Error::Context { message, .. } => message.clone(),
            Error::Validation { message, .. } => message.clone(),
            Error::Partial { message, .. } => message.clone(),
            Error::Incomplete { message, .. } => message.clone(),
            Error::RolledBack { message, .. } => message.clone(),
            Error::RateLimited { .. } => "Too many requests. Please try again later.".to_string(),
            Error::NotFound(msg)
            | Error::Unauthorized(msg)
            | Error::Forbidden(msg)
            | Error::Upstream(msg) => msg.clone(),
            _ => "Internal server error".to_string(),
        }
    }

    /// Extra detail for the response envelope.
    pub fn details(&self) -> Option<Value> {
        match self {
            Error::Validation { details, .. } => details.clone(),
            Error::Partial { details, .. } => Some(Value::String(details.clone())),
            Error::Incomplete { failed, .. } => Some(serde_json::json!({ "failedIds": failed })),
            Error::Context { source, .. } => Some(Value::String(source.root().to_string())),
            Error::RolledBack { source, .. } => Some(serde_json::json!({
                "rolledBack": true,
                "cause": source.root().to_string(),
            })),
            Error::NotFound(_)
            | Error::Unauthorized(_)
            | Error::Forbidden(_)
            | Error::RateLimited { .. } => None,
            other => Some(Value::String(other.to_string())),
        }
    }
}

/// Attach a caller-facing message to a failed step.
pub trait ResultExt<T> {
    fn context(self, message: &str) -> Result<T, Error>;
}

impl<T, E: Into<Error>> ResultExt<T> for Result<T, E> {
    fn context(self, message: &str) -> Result<T, Error> {
        self.map_err(|err| Error::Context {
            message: message.to_string(),
            source: Box::new(err.into()),
        })
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
