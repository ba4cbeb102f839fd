//! Error types for docgate.

use reqwest::header::InvalidHeaderValue;
use reqwest::StatusCode;
use thiserror::Error;

/// Main error type for docgate operations outside a single submission.
#[derive(Error, Debug)]
pub enum DocgateError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A document file could not be parsed
    #[error("Invalid document: {0}")]
    Document(#[from] serde_json::Error),

    /// Submission errors
    #[error("Submission failed: {0}")]
    Submit(#[from] SubmitError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for docgate operations.
pub type Result<T> = std::result::Result<T, DocgateError>;

/// The wait for a rate gate permit was aborted before a permit was granted.
///
/// The gate's counter is left exactly as it was before the wait started.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("wait for a rate gate permit was cancelled")]
pub struct Cancelled;

/// The downstream call failed or answered with a non-success status.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Connection, TLS, timeout or protocol failure
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The endpoint answered, but not with a 2xx status
    #[error("unexpected status code {0}")]
    Status(StatusCode),

    /// The credential cannot be sent as an `Authorization` header
    #[error("credential is not a valid header value: {0}")]
    InvalidCredential(#[from] InvalidHeaderValue),
}

/// The document could not be encoded into a request body.
#[derive(Error, Debug)]
pub enum SerializationError {
    #[error("JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    /// For [`Serializer`](crate::client::Serializer) implementations that
    /// reject a document without an underlying encoder error.
    #[error("document is not representable: {0}")]
    Unrepresentable(String),
}

/// Everything a single submission can fail with.
#[derive(Error, Debug)]
pub enum SubmitError {
    #[error(transparent)]
    Cancelled(#[from] Cancelled),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("serialization error: {0}")]
    Serialization(#[from] SerializationError),
}
