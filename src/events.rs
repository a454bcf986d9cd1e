// Events emitted by session transitions, and the sinks that consume them.

use serde::Serialize;

use crate::config::Mode;
use crate::error::SinkError;
use crate::scoring::{Direction, SessionScore, Severity};
use crate::session::{ChallengePhase, PassiveState};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionEvent {
    ChallengePhaseChanged {
        phase: ChallengePhase,
    },
    PassiveStateChanged {
        state: PassiveState,
    },
    /// `index` is 0-based
    AttemptStarted {
        index: u32,
        of: u32,
    },
    FeedbackReady {
        index: u32,
        severity: Severity,
        direction: Direction,
        signed_error: f64,
        percent_error: f64,
    },
    FearPenalty {
        percent_error: f64,
    },
    /// `repetition` is 1-based
    BoundaryReached {
        repetition: u32,
        of: u32,
    },
    SessionComplete(Completion),
    History(HistoryRecord),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Completion {
    Challenge(SessionScore),
    Passive { repetitions_completed: u32 },
}

/// Structured completion record handed to the history sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum HistoryRecord {
    Challenge {
        mode: Mode,
        target_interval_secs: u32,
        attempt_count: u32,
        mean_abs_error: f64,
        score: u8,
    },
    Passive {
        mode: Mode,
        target_interval_secs: u32,
        /// planned
        repetition_count: u32,
        repetitions_completed: u32,
        actual_duration_secs: u64,
    },
}

impl HistoryRecord {
    pub fn mode(&self) -> Mode {
        match self {
            HistoryRecord::Challenge { mode, .. } | HistoryRecord::Passive { mode, .. } => *mode,
        }
    }
}

/// Renders events. Must not feed anything back into the session.
pub trait PresentationSink {
    fn present(&mut self, event: &SessionEvent);
}

/// Stand-in for device haptics and sound
pub trait HapticSink {
    fn pulse(&mut self);
    fn fear_penalty(&mut self);
}

/// Best-effort store for completion records, analogous to a health-data log
pub trait HistorySink {
    fn record(&mut self, record: &HistoryRecord) -> Result<(), SinkError>;
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl PresentationSink for NullSink {
    fn present(&mut self, _event: &SessionEvent) {}
}

impl HapticSink for NullSink {
    fn pulse(&mut self) {}
    fn fear_penalty(&mut self) {}
}

impl HistorySink for NullSink {
    fn record(&mut self, _record: &HistoryRecord) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Writes each record as a structured `tracing` event under the `history` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingHistorySink;

impl HistorySink for TracingHistorySink {
    fn record(&mut self, record: &HistoryRecord) -> Result<(), SinkError> {
        let json =
            serde_json::to_string(record).map_err(|e| SinkError::Unavailable(e.to_string()))?;
        tracing::info!(target: "history", mode = %record.mode(), record = %json, "session logged");
        Ok(())
    }
}
