//! Server error types.

use trickd_core::GameError;
use trickd_protocol::ErrorCode;
use thiserror::Error;

/// Server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] trickd_protocol::ProtocolError),

    #[error("{0}")]
    Game(#[from] GameError),

    #[error("storage error: {0}")]
    Storage(#[from] trickd_storage::StorageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("unsupported protocol version {0}")]
    UnsupportedProtocol(u16),

    #[error("server shutting down")]
    ShuttingDown,
}

impl ServerError {
    /// Converts to protocol error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            ServerError::Io(_) => ErrorCode::InternalError,
            ServerError::Protocol(_) => ErrorCode::BadRequest,
            ServerError::Game(e) => game_error_code(e),
            ServerError::Storage(_) => ErrorCode::InternalError,
            ServerError::Json(_) => ErrorCode::BadRequest,
            ServerError::AuthFailed(_) => ErrorCode::AuthFailed,
            ServerError::InvalidRequest(_) => ErrorCode::BadRequest,
            ServerError::UnsupportedProtocol(_) => ErrorCode::UnsupportedProtocol,
            ServerError::ShuttingDown => ErrorCode::InternalError,
        }
    }

    /// Returns whether this error is retryable.
    pub fn is_retryable(&self) -> bool {
        self.error_code().is_retryable()
    }

    /// Message safe to show a client. Internal failures are not described.
    pub fn client_message(&self) -> String {
        match self.error_code() {
            ErrorCode::InternalError => "internal error".to_string(),
            _ => self.to_string(),
        }
    }
}

fn game_error_code(e: &GameError) -> ErrorCode {
    match e {
        GameError::Unauthenticated => ErrorCode::Unauthenticated,
        GameError::NotParticipant => ErrorCode::NotParticipant,
        GameError::WrongRole { .. } => ErrorCode::WrongRole,
        GameError::InvalidPhase { .. } => ErrorCode::InvalidPhase,
        GameError::AlreadySubmitted { .. } => ErrorCode::AlreadySubmitted,
        GameError::MissingClip { .. } => ErrorCode::MissingClip,
        GameError::NotFound(_) => ErrorCode::NotFound,
        GameError::AlreadyFull => ErrorCode::AlreadyFull,
        GameError::AlreadyJoined => ErrorCode::AlreadyJoined,
        GameError::InvalidInput(_) => ErrorCode::InvalidInput,
        GameError::RateLimited { .. } => ErrorCode::RateLimited,
        GameError::Contention => ErrorCode::Conflict,
        GameError::Internal(_) => ErrorCode::InternalError,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_game_error_codes_match_core_names() {
        let errors = [
            GameError::Unauthenticated,
            GameError::NotParticipant,
            GameError::invalid_phase("game is over"),
            GameError::AlreadySubmitted { clip: "set" },
            GameError::NotFound("g1".to_string()),
            GameError::AlreadyFull,
            GameError::invalid_input("bad"),
            GameError::RateLimited {
                retry_after_secs: 3,
            },
            GameError::Contention,
            GameError::internal("boom"),
        ];
        for e in errors {
            let core_code = e.error_code();
            let server = ServerError::from(e);
            assert_eq!(server.error_code().as_str(), core_code);
        }
    }

    #[test]
    fn test_retryable() {
        assert!(ServerError::from(GameError::Contention).is_retryable());
        assert!(!ServerError::from(GameError::AlreadyFull).is_retryable());
        assert!(!ServerError::InvalidRequest("x".to_string()).is_retryable());
    }

    #[test]
    fn test_internal_details_hidden() {
        let e = ServerError::from(GameError::internal("disk path /var/lib/x"));
        assert_eq!(e.client_message(), "internal error");

        let io = ServerError::Io(std::io::Error::other("/secret/path"));
        assert_eq!(io.client_message(), "internal error");

        let e = ServerError::from(GameError::AlreadyFull);
        assert_eq!(e.client_message(), "game already has two players");
    }
}
