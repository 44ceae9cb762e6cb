//! Protocol error types and daemon error codes.

use std::fmt;
use thiserror::Error;

/// Protocol-level errors that can occur during framing or envelope handling.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("truncated frame header: got {len} bytes, need 20")]
    Truncated { len: usize },

    #[error("invalid magic: expected 0x59414d53, got {0:#010x}")]
    InvalidMagic(u32),

    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u32),

    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: u32, max: u32 },

    #[error("checksum mismatch: expected {expected:#x}, got {actual:#x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProtocolError {
    /// Returns whether the stream can no longer be trusted after this error.
    ///
    /// Header errors are recoverable by skipping ahead; an oversized or
    /// corrupted frame means the byte stream has to be restarted.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ProtocolError::FrameTooLarge { .. } | ProtocolError::ChecksumMismatch { .. }
        )
    }
}

/// Numeric error codes carried by daemon error responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Unknown,
    NotInitialized,
    InvalidArgument,
    InvalidState,
    NotFound,
    Timeout,
    RateLimited,
    InternalError,
    NotImplemented,
    /// A code this client does not know about, kept verbatim.
    Other(u32),
}

impl ErrorCode {
    pub fn from_u32(code: u32) -> Self {
        match code {
            1 => ErrorCode::Unknown,
            2 => ErrorCode::NotInitialized,
            3 => ErrorCode::InvalidArgument,
            4 => ErrorCode::InvalidState,
            5 => ErrorCode::NotFound,
            6 => ErrorCode::Timeout,
            7 => ErrorCode::RateLimited,
            8 => ErrorCode::InternalError,
            9 => ErrorCode::NotImplemented,
            other => ErrorCode::Other(other),
        }
    }

    pub fn as_u32(&self) -> u32 {
        match self {
            ErrorCode::Unknown => 1,
            ErrorCode::NotInitialized => 2,
            ErrorCode::InvalidArgument => 3,
            ErrorCode::InvalidState => 4,
            ErrorCode::NotFound => 5,
            ErrorCode::Timeout => 6,
            ErrorCode::RateLimited => 7,
            ErrorCode::InternalError => 8,
            ErrorCode::NotImplemented => 9,
            ErrorCode::Other(code) => *code,
        }
    }

    /// Returns whether re-issuing the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCode::NotInitialized | ErrorCode::Timeout | ErrorCode::RateLimited
        )
    }
}

impl From<u32> for ErrorCode {
    fn from(code: u32) -> Self {
        ErrorCode::from_u32(code)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::Unknown => write!(f, "UNKNOWN"),
            ErrorCode::NotInitialized => write!(f, "NOT_INITIALIZED"),
            ErrorCode::InvalidArgument => write!(f, "INVALID_ARGUMENT"),
            ErrorCode::InvalidState => write!(f, "INVALID_STATE"),
            ErrorCode::NotFound => write!(f, "NOT_FOUND"),
            ErrorCode::Timeout => write!(f, "TIMEOUT"),
            ErrorCode::RateLimited => write!(f, "RATE_LIMITED"),
            ErrorCode::InternalError => write!(f, "INTERNAL_ERROR"),
            ErrorCode::NotImplemented => write!(f, "NOT_IMPLEMENTED"),
            ErrorCode::Other(code) => write!(f, "CODE_{}", code),
        }
    }
}
