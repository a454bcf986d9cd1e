use serde::Serialize;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::config::{Mode, SessionConfig};
use crate::error::SessionError;
use crate::events::{Completion, HistoryRecord, SessionEvent};
use crate::scheduler::{Fired, Scheduler, TimerId, Wake};
use crate::scoring::{self, Attempt, SessionScore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum_macros::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ChallengePhase {
    Ready,
    Running,
    Feedback,
    Summary,
    Aborted,
}

impl ChallengePhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, ChallengePhase::Summary | ChallengePhase::Aborted)
    }
}

/// One run of N attempts in Challenge or Fear mode.
///
/// ```text
/// Ready -> Running -> Feedback -> (Running | Summary)
///   \_________\___________\______-> Aborted
/// ```
///
/// Every operation returns the events it produced; nothing is delivered from
/// inside the transition itself.
#[derive(Debug)]
pub struct ChallengeSession<C: Clock> {
    config: SessionConfig,
    clock: C,
    attempts: Vec<Attempt>,
    current_attempt_index: u32,
    phase: ChallengePhase,
    pending_start: Option<u64>,
    feedback_timer: Option<TimerId>,
    score: Option<SessionScore>,
}

impl<C: Clock> ChallengeSession<C> {
    pub fn new(config: SessionConfig, clock: C) -> Result<Self, SessionError> {
        config.validate()?;
        if config.mode.is_passive() {
            return Err(SessionError::InvalidConfig(
                "challenge sessions need challenge or fear mode".to_string(),
            ));
        }

        Ok(Self {
            attempts: Vec::new(),
            config,
            clock,
            current_attempt_index: 0,
            phase: ChallengePhase::Ready,
            pending_start: None,
            feedback_timer: None,
            score: None,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn phase(&self) -> ChallengePhase {
        self.phase
    }

    pub fn attempts(&self) -> &[Attempt] {
        &self.attempts
    }

    /// 0-based index of the attempt running now, or about to run
    pub fn current_attempt_index(&self) -> u32 {
        self.current_attempt_index
    }

    pub fn score(&self) -> Option<&SessionScore> {
        self.score.as_ref()
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    pub fn start(&mut self) -> Result<Vec<SessionEvent>, SessionError> {
        if self.phase != ChallengePhase::Ready {
            return Err(SessionError::transition("start", self.phase));
        }
        let mut events = Vec::new();
        self.begin_attempt(&mut events);
        Ok(events)
    }

    pub fn tap(&mut self, scheduler: &mut dyn Scheduler) -> Result<Vec<SessionEvent>, SessionError> {
        let start_ms = match (self.phase, self.pending_start) {
            (ChallengePhase::Running, Some(start_ms)) => start_ms,
            _ => return Err(SessionError::transition("tap", self.phase)),
        };

        let now = self.clock.now_ms();
        let attempt = scoring::compute_attempt_metrics(
            start_ms,
            now,
            f64::from(self.config.target_interval_secs),
        )?;
        self.attempts.push(attempt);
        self.pending_start = None;

        let severity = attempt.severity();
        let mut events = vec![];
        self.enter(ChallengePhase::Feedback, &mut events);
        events.push(SessionEvent::FeedbackReady {
            index: self.current_attempt_index,
            severity,
            direction: attempt.direction(),
            signed_error: attempt.signed_error,
            percent_error: attempt.percent_error,
        });

        if self.config.mode == Mode::Fear
            && scoring::triggers_fear_penalty(&attempt)
            && self.config.sound_enabled
        {
            events.push(SessionEvent::FearPenalty {
                percent_error: attempt.percent_error,
            });
        }

        debug!(
            attempt = self.current_attempt_index,
            elapsed_secs = attempt.elapsed_secs,
            signed_error = attempt.signed_error,
            %severity,
            "attempt sealed"
        );

        self.feedback_timer = Some(scheduler.schedule_after(
            now,
            self.config.feedback_display,
            Wake::FeedbackElapsed,
        ));

        Ok(events)
    }

    pub fn advance(
        &mut self,
        scheduler: &mut dyn Scheduler,
    ) -> Result<Vec<SessionEvent>, SessionError> {
        if self.phase != ChallengePhase::Feedback {
            return Err(SessionError::transition("advance", self.phase));
        }
        self.cancel_feedback(scheduler);

        let mut events = vec![];
        if self.current_attempt_index + 1 < self.config.repetition_count {
            self.current_attempt_index += 1;
            self.begin_attempt(&mut events);
            return Ok(events);
        }

        let score = scoring::compute_session_score(&self.attempts)?;
        self.score = Some(score);
        self.enter(ChallengePhase::Summary, &mut events);
        events.push(SessionEvent::SessionComplete(Completion::Challenge(score)));

        info!(
            mode = %self.config.mode,
            attempts = self.attempts.len(),
            mean_abs_error = score.mean_abs_error,
            score = score.score,
            "challenge complete"
        );

        if self.config.history_logging_enabled {
            events.push(SessionEvent::History(HistoryRecord::Challenge {
                mode: self.config.mode,
                target_interval_secs: self.config.target_interval_secs,
                attempt_count: self.attempts.len() as u32,
                mean_abs_error: score.mean_abs_error,
                score: score.score,
            }));
        }

        Ok(events)
    }

    /// Ends the run without a score. A second call reports `AlreadyTerminated`
    /// and emits nothing.
    pub fn abort(&mut self, scheduler: &mut dyn Scheduler) -> Result<Vec<SessionEvent>, SessionError> {
        if self.phase.is_terminal() {
            return Err(SessionError::AlreadyTerminated);
        }
        self.cancel_feedback(scheduler);
        self.pending_start = None;

        let mut events = vec![];
        self.enter(ChallengePhase::Aborted, &mut events);
        info!(
            mode = %self.config.mode,
            completed_attempts = self.attempts.len(),
            "challenge aborted"
        );
        Ok(events)
    }

    /// Delivery point for scheduler wakeups. Anything other than the pending
    /// feedback timer is stale and ignored.
    pub fn on_wake(
        &mut self,
        fired: Fired,
        scheduler: &mut dyn Scheduler,
    ) -> Result<Vec<SessionEvent>, SessionError> {
        if fired.wake != Wake::FeedbackElapsed || self.feedback_timer != Some(fired.id) {
            debug!(?fired, "ignoring stale wakeup");
            return Ok(vec![]);
        }
        self.feedback_timer = None;
        self.advance(scheduler)
    }

    fn begin_attempt(&mut self, events: &mut Vec<SessionEvent>) {
        self.pending_start = Some(self.clock.now_ms());
        self.enter(ChallengePhase::Running, events);
        events.push(SessionEvent::AttemptStarted {
            index: self.current_attempt_index,
            of: self.config.repetition_count,
        });
    }

    fn cancel_feedback(&mut self, scheduler: &mut dyn Scheduler) {
        if let Some(id) = self.feedback_timer.take() {
            scheduler.cancel(id);
        }
    }

    fn enter(&mut self, phase: ChallengePhase, events: &mut Vec<SessionEvent>) {
        debug!(from = %self.phase, to = %phase, "challenge phase");
        self.phase = phase;
        events.push(SessionEvent::ChallengePhaseChanged { phase });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::scheduler::TimerQueue;
    use crate::scoring::Severity;
    use assert_matches::assert_matches;
    use std::time::Duration;

    fn session(mode: Mode, target: u32, count: u32) -> (ChallengeSession<ManualClock>, ManualClock) {
        let clock = ManualClock::new(0);
        let cfg = SessionConfig::new(mode, target, count);
        (ChallengeSession::new(cfg, clock.clone()).unwrap(), clock)
    }

    fn attempt(
        s: &mut ChallengeSession<ManualClock>,
        clock: &ManualClock,
        q: &mut TimerQueue,
        secs: u64,
    ) -> Vec<SessionEvent> {
        clock.advance_secs(secs);
        s.tap(q).unwrap()
    }

    #[test]
    fn full_run_reaches_summary() {
        let (mut s, clock) = session(Mode::Challenge, 300, 2);
        let mut q = TimerQueue::new();

        let events = s.start().unwrap();
        assert_eq!(s.phase(), ChallengePhase::Running);
        assert!(events.contains(&SessionEvent::AttemptStarted { index: 0, of: 2 }));

        let events = attempt(&mut s, &clock, &mut q, 330);
        assert_eq!(s.phase(), ChallengePhase::Feedback);
        assert!(events.iter().any(|e| matches!(
            e,
            SessionEvent::FeedbackReady {
                index: 0,
                severity: Severity::Warning,
                ..
            }
        )));
        assert_eq!(q.len(), 1);

        let events = s.advance(&mut q).unwrap();
        assert!(q.is_empty());
        assert_eq!(s.phase(), ChallengePhase::Running);
        assert_eq!(s.current_attempt_index(), 1);
        assert!(events.contains(&SessionEvent::AttemptStarted { index: 1, of: 2 }));

        attempt(&mut s, &clock, &mut q, 270);
        let events = s.advance(&mut q).unwrap();
        assert_eq!(s.phase(), ChallengePhase::Summary);
        assert_eq!(s.score().map(|sc| sc.score), Some(80));
        assert!(events.iter().any(|e| matches!(
            e,
            SessionEvent::SessionComplete(Completion::Challenge(sc)) if sc.score == 80
        )));
        assert!(events.iter().any(|e| matches!(
            e,
            SessionEvent::History(HistoryRecord::Challenge {
                attempt_count: 2,
                score: 80,
                ..
            })
        )));
    }

    #[test]
    fn history_record_respects_flag() {
        let clock = ManualClock::new(0);
        let cfg = SessionConfig::new(Mode::Challenge, 60, 1).with_history_logging(false);
        let mut s = ChallengeSession::new(cfg, clock.clone()).unwrap();
        let mut q = TimerQueue::new();

        s.start().unwrap();
        attempt(&mut s, &clock, &mut q, 60);
        let events = s.advance(&mut q).unwrap();
        assert!(!events
            .iter()
            .any(|e| matches!(e, SessionEvent::History(_))));
        assert_eq!(s.score().map(|sc| sc.score), Some(100));
    }

    #[test]
    fn start_twice_is_invalid() {
        let (mut s, _clock) = session(Mode::Challenge, 60, 3);
        s.start().unwrap();
        assert_matches!(
            s.start(),
            Err(SessionError::InvalidTransition {
                operation: "start",
                ..
            })
        );
        assert_eq!(s.phase(), ChallengePhase::Running);
    }

    #[test]
    fn tap_and_advance_require_their_phase() {
        let (mut s, _clock) = session(Mode::Challenge, 60, 1);
        let mut q = TimerQueue::new();
        assert_matches!(s.tap(&mut q), Err(SessionError::InvalidTransition { .. }));
        assert_matches!(
            s.advance(&mut q),
            Err(SessionError::InvalidTransition { .. })
        );
        s.start().unwrap();
        assert_matches!(
            s.advance(&mut q),
            Err(SessionError::InvalidTransition { .. })
        );
    }

    #[test]
    fn fear_penalty_uses_ten_percent_trigger() {
        let (mut s, clock) = session(Mode::Fear, 100, 2);
        let mut q = TimerQueue::new();
        s.start().unwrap();
        let events = attempt(&mut s, &clock, &mut q, 111);
        assert!(events
            .iter()
            .any(|e| matches!(e, SessionEvent::FearPenalty { .. })));

        s.advance(&mut q).unwrap();
        let events = attempt(&mut s, &clock, &mut q, 105);
        assert!(!events
            .iter()
            .any(|e| matches!(e, SessionEvent::FearPenalty { .. })));
        assert!(events.iter().any(|e| matches!(
            e,
            SessionEvent::FeedbackReady {
                severity: Severity::Warning,
                ..
            }
        )));
    }

    #[test]
    fn fear_penalty_is_gated_on_sound() {
        let clock = ManualClock::new(0);
        let cfg = SessionConfig::new(Mode::Fear, 100, 1).with_sound(false);
        let mut s = ChallengeSession::new(cfg, clock.clone()).unwrap();
        let mut q = TimerQueue::new();
        s.start().unwrap();
        let events = attempt(&mut s, &clock, &mut q, 200);
        assert!(!events
            .iter()
            .any(|e| matches!(e, SessionEvent::FearPenalty { .. })));
    }

    #[test]
    fn challenge_mode_never_penalizes() {
        let (mut s, clock) = session(Mode::Challenge, 100, 1);
        let mut q = TimerQueue::new();
        s.start().unwrap();
        let events = attempt(&mut s, &clock, &mut q, 200);
        assert!(!events
            .iter()
            .any(|e| matches!(e, SessionEvent::FearPenalty { .. })));
    }

    #[test]
    fn feedback_wakeup_advances_and_stale_ones_are_ignored() {
        let clock = ManualClock::new(0);
        let cfg = SessionConfig::new(Mode::Challenge, 30, 2)
            .with_feedback_display(Duration::from_millis(1_500));
        let mut s = ChallengeSession::new(cfg, clock.clone()).unwrap();
        let mut q = TimerQueue::new();

        s.start().unwrap();
        attempt(&mut s, &clock, &mut q, 30);
        assert_eq!(q.next_deadline_ms(), Some(31_500));

        clock.advance_ms(1_500);
        let fired = q.pop_due(clock.now_ms()).unwrap();
        s.on_wake(fired, &mut q).unwrap();
        assert_eq!(s.phase(), ChallengePhase::Running);

        // replaying the same wakeup does nothing
        assert!(s.on_wake(fired, &mut q).unwrap().is_empty());
        assert_eq!(s.phase(), ChallengePhase::Running);
        assert_eq!(s.current_attempt_index(), 1);
    }

    #[test]
    fn abort_cancels_feedback_and_is_idempotent() {
        let (mut s, clock) = session(Mode::Challenge, 30, 3);
        let mut q = TimerQueue::new();
        s.start().unwrap();
        attempt(&mut s, &clock, &mut q, 31);
        assert_eq!(q.len(), 1);

        let events = s.abort(&mut q).unwrap();
        assert!(q.is_empty());
        assert_eq!(s.phase(), ChallengePhase::Aborted);
        assert!(s.score().is_none());
        assert!(!events
            .iter()
            .any(|e| matches!(e, SessionEvent::History(_) | SessionEvent::SessionComplete(_))));

        let err = s.abort(&mut q).unwrap_err();
        assert_eq!(err, SessionError::AlreadyTerminated);
        assert!(!err.is_fatal());
    }

    #[test]
    fn abort_after_summary_reports_already_terminated() {
        let (mut s, clock) = session(Mode::Challenge, 10, 1);
        let mut q = TimerQueue::new();
        s.start().unwrap();
        attempt(&mut s, &clock, &mut q, 10);
        s.advance(&mut q).unwrap();
        assert_matches!(s.abort(&mut q), Err(SessionError::AlreadyTerminated));
        assert_eq!(s.phase(), ChallengePhase::Summary);
    }

    #[test]
    fn passive_mode_is_rejected() {
        let cfg = SessionConfig::new(Mode::Passive, 30, 1);
        assert_matches!(
            ChallengeSession::new(cfg, ManualClock::new(0)),
            Err(SessionError::InvalidConfig(_))
        );
    }

    #[test]
    fn huge_attempt_count_allocates_nothing_up_front() {
        let (mut s, clock) = session(Mode::Challenge, 10, u32::MAX);
        let mut q = TimerQueue::new();
        assert!(s.attempts().is_empty());

        s.start().unwrap();
        attempt(&mut s, &clock, &mut q, 10);
        assert_eq!(s.attempts().len(), 1);
        assert_eq!(s.config().repetition_count, u32::MAX);
    }
}
