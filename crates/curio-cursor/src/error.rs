//! Cursor client error types

use thiserror::Error;

pub type CursorResult<T> = Result<T, CursorError>;

#[derive(Debug, Error)]
pub enum CursorError {
    #[error("malformed credential: {0}")]
    MalformedCredential(String),

    #[error("request cannot be encoded: {0}")]
    SchemaViolation(String),

    #[error("upstream unavailable: {0}")]
    TransportUnavailable(String),

    #[error("upstream returned {status}: {body}")]
    UpstreamStatus { status: u16, body: String },

    #[error("upstream stream interrupted: {0}")]
    Interrupted(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl CursorError {
    /// Whether the failure is attributable to the caller's request rather
    /// than the upstream.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::MalformedCredential(_) | Self::SchemaViolation(_)
        )
    }
}

/// A response run that failed structured decoding and was passed through as
/// raw text instead. Not fatal; logged by the translator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("decode degraded to raw text: {reason}")]
pub struct DecodeDegraded {
    pub reason: String,
}
