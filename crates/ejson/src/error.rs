//! Error types for EJSON encoding and decoding.

use thiserror::Error;

/// Boxed error returned by caller-supplied type hooks.
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur during EJSON encoding.
#[derive(Debug, Error)]
pub enum EjsonEncodeError {
    /// A composite value was reached again while it was still being encoded.
    #[error("circular reference detected")]
    CircularReference,
    /// A custom value that no registered type hook claims.
    #[error("object of type `{0}` is not EJSON serializable")]
    Unsupported(&'static str),
    /// NaN and the infinities have no JSON representation.
    #[error("non-finite float {0} is not JSON serializable")]
    NonFiniteFloat(f64),
    #[error("nesting depth exceeds the limit of {0}")]
    DepthLimitExceeded(usize),
    /// A forward transform returned an error.
    #[error("type hook `{tag}` failed: {source}")]
    Hook {
        tag: String,
        #[source]
        source: HookError,
    },
    #[error("JSON write error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that can occur during EJSON decoding.
#[derive(Debug, Error)]
pub enum EjsonDecodeError {
    /// `{"$type": tag, "$value": ..}` with no reviver registered for `tag`.
    #[error("unknown EJSON type `{0}`")]
    UnknownType(String),
    /// `{"$date": ..}` whose payload is not a representable millisecond count.
    #[error("invalid `$date` payload: {0}")]
    InvalidDate(String),
    /// `{"$binary": ..}` whose payload is not a base64 string.
    #[error("invalid `$binary` payload: {0}")]
    InvalidBinary(String),
    #[error("nesting depth exceeds the limit of {0}")]
    DepthLimitExceeded(usize),
    /// A reverse transform returned an error.
    #[error("type reviver `{tag}` failed: {source}")]
    Hook {
        tag: String,
        #[source]
        source: HookError,
    },
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

impl EjsonDecodeError {
    /// The offending tag, for [`EjsonDecodeError::UnknownType`].
    pub fn unknown_type(&self) -> Option<&str> {
        match self {
            EjsonDecodeError::UnknownType(tag) => Some(tag),
            _ => None,
        }
    }
}

/// Either direction's error, for callers that round-trip.
#[derive(Debug, Error)]
pub enum EjsonError {
    #[error("EJSON encode error: {0}")]
    Encode(#[from] EjsonEncodeError),
    #[error("EJSON decode error: {0}")]
    Decode(#[from] EjsonDecodeError),
}
