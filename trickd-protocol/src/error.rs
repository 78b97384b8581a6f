//! Protocol error types and error codes.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors raised while reading or writing protocol messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("line too large: {size} bytes (max {max})")]
    LineTooLong { size: usize, max: usize },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid UTF-8 in message")]
    InvalidUtf8,
}

/// Stable error codes returned in error responses.
///
/// These codes are part of the protocol contract and must remain stable
/// across versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Protocol errors
    BadRequest,
    UnsupportedProtocol,

    // Authentication errors
    Unauthenticated,
    AuthFailed,

    // Game rule errors
    NotParticipant,
    WrongRole,
    InvalidPhase,
    AlreadySubmitted,
    MissingClip,
    NotFound,
    AlreadyFull,
    AlreadyJoined,
    InvalidInput,

    // Transient errors
    RateLimited,
    Conflict,

    // System errors
    InternalError,
}

impl ErrorCode {
    /// Returns whether the same request may succeed if retried later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorCode::RateLimited | ErrorCode::Conflict)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::BadRequest => "BAD_REQUEST",
            ErrorCode::UnsupportedProtocol => "UNSUPPORTED_PROTOCOL",
            ErrorCode::Unauthenticated => "UNAUTHENTICATED",
            ErrorCode::AuthFailed => "AUTH_FAILED",
            ErrorCode::NotParticipant => "NOT_PARTICIPANT",
            ErrorCode::WrongRole => "WRONG_ROLE",
            ErrorCode::InvalidPhase => "INVALID_PHASE",
            ErrorCode::AlreadySubmitted => "ALREADY_SUBMITTED",
            ErrorCode::MissingClip => "MISSING_CLIP",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::AlreadyFull => "ALREADY_FULL",
            ErrorCode::AlreadyJoined => "ALREADY_JOINED",
            ErrorCode::InvalidInput => "INVALID_INPUT",
            ErrorCode::RateLimited => "RATE_LIMITED",
            ErrorCode::Conflict => "CONFLICT",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
