//! Error taxonomy for transfer operations.
//!
//! Validation errors are raised before any I/O. Transient service failures are
//! absorbed by the retry policy and only surface here once retries are
//! exhausted, as `Service` or `Transport`.

use std::io;

use thiserror::Error;

use crate::http::TransportError;

/// Error returned by every library-facing transfer operation.
#[derive(Debug, Error)]
pub enum TransferError {
    /// Bad caller input (sizes, offsets, buffer too small). No request was sent.
    #[error("invalid argument: {0}")]
    Validation(String),

    /// The service answered with a non-2xx status the retry policy does not handle.
    #[error("service returned HTTP {status}{}", error_code.as_deref().map(|c| format!(" ({c})")).unwrap_or_default())]
    Service {
        status: u16,
        /// Value of the `x-ms-error-code` header when present.
        error_code: Option<String>,
    },

    /// A 2xx response lacked a header the operation depends on, or carried
    /// one that does not parse.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// A body or source ended before producing the declared number of bytes.
    #[error("stream ended early: expected {expected} bytes, got {received}")]
    StreamExhausted { expected: u64, received: u64 },

    #[error("transport: {0}")]
    Transport(#[from] TransportError),

    #[error("io: {0}")]
    Io(#[from] io::Error),

    /// A worker task panicked or was aborted.
    #[error("task failed: {0}")]
    Task(String),
}

impl TransferError {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        TransferError::Validation(msg.into())
    }

    /// HTTP status for `Service` errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            TransferError::Service { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type TransferResult<T> = Result<T, TransferError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_error_display_includes_code() {
        let e = TransferError::Service {
            status: 409,
            error_code: Some("BlobAlreadyExists".to_string()),
        };
        assert_eq!(e.to_string(), "service returned HTTP 409 (BlobAlreadyExists)");
        assert_eq!(e.status(), Some(409));

        let bare = TransferError::Service {
            status: 403,
            error_code: None,
        };
        assert_eq!(bare.to_string(), "service returned HTTP 403");
    }

    #[test]
    fn stream_exhausted_display() {
        let e = TransferError::StreamExhausted {
            expected: 10,
            received: 4,
        };
        assert_eq!(e.to_string(), "stream ended early: expected 10 bytes, got 4");
        assert_eq!(e.status(), None);
    }
}
