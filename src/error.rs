use thiserror::Error;

/// Defensive failures of the scoring functions. Correct transition discipline
/// never produces these; they exist so bad input fails loudly instead of
/// turning into NaN scores.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScoringError {
    #[error("invalid timing: tap at {tap_ms}ms, start at {start_ms}ms, target {target_secs}s")]
    InvalidTiming {
        start_ms: u64,
        tap_ms: u64,
        target_secs: f64,
    },

    #[error("cannot score a session with no attempts")]
    EmptyAttemptSet,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    /// Rejected before a session exists; the caller should re-prompt.
    #[error("invalid session config: {0}")]
    InvalidConfig(String),

    #[error("cannot {operation} while {phase}")]
    InvalidTransition {
        operation: &'static str,
        phase: String,
    },

    #[error("session already ended")]
    AlreadyTerminated,

    #[error(transparent)]
    Scoring(#[from] ScoringError),
}

impl SessionError {
    pub(crate) fn transition(operation: &'static str, phase: impl std::fmt::Display) -> Self {
        SessionError::InvalidTransition {
            operation,
            phase: phase.to_string(),
        }
    }

    /// Whether the session that raised this can no longer continue.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            SessionError::AlreadyTerminated | SessionError::InvalidConfig(_)
        )
    }
}

/// Failure reported by a history sink. Logged and dropped by the host.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("history sink unavailable: {0}")]
    Unavailable(String),
}
