//! Client error types.

use crate::config::ConfigError;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use yams_protocol::{ErrorCode, PayloadCase};

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] yams_protocol::ProtocolError),

    #[error("failed to connect to {}: {source}", path.display())]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("connection to {} timed out after {timeout:?}", path.display())]
    ConnectTimeout { path: PathBuf, timeout: Duration },

    #[error("not connected")]
    NotConnected,

    #[error("connection closed")]
    ConnectionClosed,

    #[error("client disposed")]
    Disposed,

    #[error("stream corrupted: {reason}")]
    StreamCorrupted { reason: String },

    #[error("request {request_id} timed out after {timeout:?}")]
    Timeout { request_id: u64, timeout: Duration },

    #[error("daemon error: {code} - {message}")]
    Daemon { code: ErrorCode, message: String },

    #[error("unexpected response: expected {expected}, got {actual}")]
    UnexpectedResponse {
        expected: PayloadCase,
        actual: PayloadCase,
    },

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl ClientError {
    /// Returns whether re-issuing the same call may succeed.
    ///
    /// A timed-out request may or may not have executed on the daemon.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Timeout { .. } => true,
            ClientError::Daemon { code, .. } => code.is_retryable(),
            _ => false,
        }
    }

    /// Returns whether the failure is about the connection rather than the
    /// request, so the caller should wait for reconnection before retrying.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            ClientError::Io(_)
                | ClientError::Connect { .. }
                | ClientError::ConnectTimeout { .. }
                | ClientError::NotConnected
                | ClientError::ConnectionClosed
                | ClientError::StreamCorrupted { .. }
        )
    }
}
