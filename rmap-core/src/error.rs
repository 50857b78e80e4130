//! Error types for the resource resolution core.

use serde::Serialize;
use thiserror::Error;

/// Structured error payload shared between the HTTP service and its client.
#[derive(Debug, Clone, Serialize, serde::Deserialize)]
pub struct ErrorEnvelope {
    pub code: String,
    pub message: String,
    pub hint: String,
}

impl ErrorEnvelope {
    pub fn new(code: impl Into<String>, message: impl Into<String>, hint: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            hint: hint.into(),
        }
    }

    pub fn internal(msg: &str) -> Self {
        Self::new("internal_error", msg, "check service logs for details")
    }
}

impl From<&MapError> for ErrorEnvelope {
    fn from(err: &MapError) -> Self {
        match err {
            MapError::NotFound(path) => ErrorEnvelope::new(
                "not_found",
                format!("no resource at {path}"),
                "check the path and any mounted provider roots",
            ),
            MapError::Unsupported(what) => ErrorEnvelope::new(
                "unsupported",
                format!("operation not supported: {what}"),
                "no mounted provider advertises this capability for the path",
            ),
            MapError::IllegalArgument(msg) => {
                ErrorEnvelope::new("illegal_argument", msg.clone(), "check the request parameters")
            }
            MapError::Persistence(msg) => ErrorEnvelope::new(
                "persistence",
                msg.clone(),
                "the backing provider rejected the write",
            ),
            MapError::Authentication(msg) => {
                ErrorEnvelope::new("authentication", msg.clone(), "check provider credentials")
            }
            MapError::QuerySyntax(msg) => {
                ErrorEnvelope::new("query_syntax", msg.clone(), "check the query language and syntax")
            }
            MapError::QueryUnsupported(lang) => ErrorEnvelope::new(
                "query_unsupported",
                format!("no provider supports query language {lang}"),
                "use a language one of the mounted providers advertises",
            ),
            MapError::InternalInvariantViolation(msg) => ErrorEnvelope::new(
                "internal_invariant_violation",
                msg.clone(),
                "index construction saw an out-of-order row; file a report",
            ),
            MapError::Disposed => ErrorEnvelope::new(
                "disposed",
                "the resolver session is closed",
                "open a new session before calling it again",
            ),
        }
    }
}

/// Error hierarchy for the mount-tree / alias / vanity-path resolution core.
///
/// Single-provider `Authentication` failures inside union-style operations
/// (`list_children`, `find_resources`, ...) are meant to be caught and the
/// provider skipped, not propagated raw — see `ResourceResolverControl`.
#[derive(Debug, Error)]
pub enum MapError {
    #[error("no resource at {0}")]
    NotFound(String),

    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error("illegal argument: {0}")]
    IllegalArgument(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("authentication error: {0}")]
    Authentication(String),

    #[error("query syntax error: {0}")]
    QuerySyntax(String),

    #[error("query language not supported: {0}")]
    QueryUnsupported(String),

    #[error("internal invariant violation: {0}")]
    InternalInvariantViolation(String),

    #[error("resolver is disposed")]
    Disposed,
}

impl MapError {
    pub fn not_found(path: impl Into<String>) -> Self {
        MapError::NotFound(path.into())
    }

    pub fn envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope::from(self)
    }
}

pub type Result<T> = std::result::Result<T, MapError>;
