//! Core error types.

use thiserror::Error;

/// Errors raised by the game rules and the transactional applier.
///
/// Every variant is caller-visible. Messages are written for players and
/// never carry storage paths or internal state; `Internal` keeps its reason
/// for logs only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GameError {
    #[error("not authenticated")]
    Unauthenticated,

    #[error("you are not a player in this game")]
    NotParticipant,

    #[error("wrong role: only the {required} can {action}")]
    WrongRole {
        action: &'static str,
        required: &'static str,
    },

    #[error("invalid phase: {reason}")]
    InvalidPhase { reason: String },

    #[error("{clip} clip already submitted")]
    AlreadySubmitted { clip: &'static str },

    #[error("no {clip} clip to judge")]
    MissingClip { clip: &'static str },

    #[error("game not found: {0}")]
    NotFound(String),

    #[error("game already has two players")]
    AlreadyFull,

    #[error("already joined this game")]
    AlreadyJoined,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("rate limited: retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("game is busy, retry the request")]
    Contention,

    #[error("internal error")]
    Internal(String),
}

impl GameError {
    pub fn invalid_phase(reason: impl Into<String>) -> Self {
        GameError::InvalidPhase {
            reason: reason.into(),
        }
    }

    pub fn invalid_input(reason: impl Into<String>) -> Self {
        GameError::InvalidInput(reason.into())
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        GameError::Internal(reason.into())
    }

    /// Returns whether the caller may retry the same request with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GameError::RateLimited { .. } | GameError::Contention
        )
    }

    /// Returns an error code suitable for protocol responses and metrics.
    pub fn error_code(&self) -> &'static str {
        match self {
            GameError::Unauthenticated => "UNAUTHENTICATED",
            GameError::NotParticipant => "NOT_PARTICIPANT",
            GameError::WrongRole { .. } => "WRONG_ROLE",
            GameError::InvalidPhase { .. } => "INVALID_PHASE",
            GameError::AlreadySubmitted { .. } => "ALREADY_SUBMITTED",
            GameError::MissingClip { .. } => "MISSING_CLIP",
            GameError::NotFound(_) => "NOT_FOUND",
            GameError::AlreadyFull => "ALREADY_FULL",
            GameError::AlreadyJoined => "ALREADY_JOINED",
            GameError::InvalidInput(_) => "INVALID_INPUT",
            GameError::RateLimited { .. } => "RATE_LIMITED",
            GameError::Contention => "CONFLICT",
            GameError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_errors_are_retryable() {
        assert!(GameError::RateLimited {
            retry_after_secs: 3
        }
        .is_retryable());
        assert!(GameError::Contention.is_retryable());

        assert!(!GameError::Unauthenticated.is_retryable());
        assert!(!GameError::NotParticipant.is_retryable());
        assert!(!GameError::invalid_phase("game is over").is_retryable());
        assert!(!GameError::AlreadySubmitted { clip: "set" }.is_retryable());
        assert!(!GameError::internal("corrupt history").is_retryable());
    }

    #[test]
    fn test_internal_message_hides_reason() {
        let err = GameError::internal("last history entry is declined_set");
        assert_eq!(err.to_string(), "internal error");
        assert_eq!(err.error_code(), "INTERNAL_ERROR");
    }

    #[test]
    fn test_messages_are_distinct_per_kind() {
        let errors = [
            GameError::Unauthenticated,
            GameError::NotParticipant,
            GameError::WrongRole {
                action: "judge a set",
                required: "opponent of the setter",
            },
            GameError::invalid_phase("game is over"),
            GameError::AlreadySubmitted { clip: "set" },
            GameError::MissingClip { clip: "set" },
            GameError::NotFound("ABC234".to_string()),
            GameError::AlreadyFull,
            GameError::AlreadyJoined,
            GameError::invalid_input("name is empty"),
            GameError::RateLimited {
                retry_after_secs: 1,
            },
            GameError::Contention,
            GameError::internal("x"),
        ];
        let messages: std::collections::HashSet<_> =
            errors.iter().map(|e| e.to_string()).collect();
        assert_eq!(messages.len(), errors.len());
    }
}
