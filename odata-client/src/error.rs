//! Error types for the OData client

use thiserror::Error;

/// Errors raised while composing resources or executing requests
#[derive(Error, Debug)]
pub enum ODataError {
    /// Invalid resource transition or an operation the current resource kind cannot perform
    #[error("composition error: {0}")]
    Composition(String),

    /// An operation requires a key the entity does not have yet
    #[error("missing key: {0}")]
    MissingKey(String),

    /// The service answered with a non-success status code
    #[error("request to {url} failed with status {status}")]
    Status {
        status: u16,
        url: String,
        body: serde_json::Value,
    },

    /// Payload could not be interpreted
    #[error("parse error: {0}")]
    Parse(String),

    /// A batch sub-response could not be matched or decoded
    #[error("batch error: {0}")]
    Batch(String),

    /// The request was dropped before a response arrived
    #[error("request cancelled")]
    Cancelled,

    #[error("transport error: {0}")]
    Transport(#[from] anyhow::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ODataError {
    pub fn composition(msg: impl Into<String>) -> Self {
        ODataError::Composition(msg.into())
    }

    pub fn missing_key(msg: impl Into<String>) -> Self {
        ODataError::MissingKey(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        ODataError::Parse(msg.into())
    }

    /// Status code carried by the error, if the service produced one
    pub fn status(&self) -> Option<u16> {
        match self {
            ODataError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Result alias used throughout the crate
pub type ODataResult<T> = Result<T, ODataError>;
