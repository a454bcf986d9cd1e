use serde::Serialize;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::config::{Mode, SessionConfig};
use crate::error::SessionError;
use crate::events::{Completion, HistoryRecord, SessionEvent};
use crate::scheduler::{Fired, Scheduler, TimerId, Wake};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum_macros::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PassiveState {
    Idle,
    Running,
    Completed,
    Stopped,
}

impl PassiveState {
    pub fn is_terminal(self) -> bool {
        matches!(self, PassiveState::Completed | PassiveState::Stopped)
    }
}

/// Fires `repetition_count` boundary reminders, one every target interval.
///
/// Boundary k is always due at `start + k * interval`, no matter how late the
/// previous one was delivered, so lateness never accumulates.
#[derive(Debug)]
pub struct PassiveSession<C: Clock> {
    config: SessionConfig,
    clock: C,
    state: PassiveState,
    start_ms: Option<u64>,
    end_ms: Option<u64>,
    repetitions_completed: u32,
    boundary_timer: Option<TimerId>,
}

impl<C: Clock> PassiveSession<C> {
    pub fn new(config: SessionConfig, clock: C) -> Result<Self, SessionError> {
        config.validate()?;
        if config.mode != Mode::Passive {
            return Err(SessionError::InvalidConfig(
                "passive sessions need passive mode".to_string(),
            ));
        }

        Ok(Self {
            config,
            clock,
            state: PassiveState::Idle,
            start_ms: None,
            end_ms: None,
            repetitions_completed: 0,
            boundary_timer: None,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> PassiveState {
        self.state
    }

    pub fn repetitions_completed(&self) -> u32 {
        self.repetitions_completed
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Ideal clock reading of the next boundary while running
    pub fn next_boundary_ms(&self) -> Option<u64> {
        match (self.state, self.start_ms) {
            (PassiveState::Running, Some(start)) => {
                Some(self.boundary_due(start, self.repetitions_completed + 1))
            }
            _ => None,
        }
    }

    /// Time since start, frozen once the session ends. Safe to poll at any rate.
    pub fn elapsed_ms(&self) -> u64 {
        match self.start_ms {
            Some(start) => self
                .end_ms
                .unwrap_or_else(|| self.clock.now_ms())
                .saturating_sub(start),
            None => 0,
        }
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.elapsed_ms() / 1000
    }

    pub fn start(&mut self, scheduler: &mut dyn Scheduler) -> Result<Vec<SessionEvent>, SessionError> {
        if self.state != PassiveState::Idle {
            return Err(SessionError::transition("start", self.state));
        }

        let now = self.clock.now_ms();
        self.start_ms = Some(now);
        self.repetitions_completed = 0;
        self.boundary_timer =
            Some(scheduler.schedule_at(self.boundary_due(now, 1), Wake::PassiveBoundary));

        let mut events = vec![];
        self.enter(PassiveState::Running, &mut events);
        info!(
            interval_secs = self.config.target_interval_secs,
            repetitions = self.config.repetition_count,
            "passive session started"
        );
        Ok(events)
    }

    /// Delivery point for scheduler wakeups. Anything other than the pending
    /// boundary timer is stale and ignored.
    pub fn on_wake(
        &mut self,
        fired: Fired,
        scheduler: &mut dyn Scheduler,
    ) -> Result<Vec<SessionEvent>, SessionError> {
        if fired.wake != Wake::PassiveBoundary || self.boundary_timer != Some(fired.id) {
            debug!(?fired, "ignoring stale wakeup");
            return Ok(vec![]);
        }
        self.boundary_timer = None;

        let Some(start) = self.start_ms else {
            return Err(SessionError::transition("fire a boundary", self.state));
        };

        self.repetitions_completed += 1;
        let mut events = vec![SessionEvent::BoundaryReached {
            repetition: self.repetitions_completed,
            of: self.config.repetition_count,
        }];
        debug!(
            repetition = self.repetitions_completed,
            lateness_ms = self.clock.now_ms().saturating_sub(fired.deadline_ms),
            "boundary reached"
        );

        if self.repetitions_completed >= self.config.repetition_count {
            self.finish(PassiveState::Completed, &mut events);
            events.push(SessionEvent::SessionComplete(Completion::Passive {
                repetitions_completed: self.repetitions_completed,
            }));
            self.push_history(&mut events);
        } else {
            let due = self.boundary_due(start, self.repetitions_completed + 1);
            self.boundary_timer = Some(scheduler.schedule_at(due, Wake::PassiveBoundary));
        }

        Ok(events)
    }

    pub fn stop(&mut self, scheduler: &mut dyn Scheduler) -> Result<Vec<SessionEvent>, SessionError> {
        match self.state {
            PassiveState::Running => {}
            state if state.is_terminal() => return Err(SessionError::AlreadyTerminated),
            state => return Err(SessionError::transition("stop", state)),
        }

        if let Some(id) = self.boundary_timer.take() {
            scheduler.cancel(id);
        }

        let mut events = vec![];
        self.finish(PassiveState::Stopped, &mut events);
        self.push_history(&mut events);
        Ok(events)
    }

    fn boundary_due(&self, start: u64, k: u32) -> u64 {
        start + u64::from(k) * self.config.interval_ms()
    }

    fn finish(&mut self, state: PassiveState, events: &mut Vec<SessionEvent>) {
        self.end_ms = Some(self.clock.now_ms());
        self.enter(state, events);

        info!(
            %state,
            planned = self.config.repetition_count,
            completed = self.repetitions_completed,
            duration_secs = self.elapsed_secs(),
            "passive session ended"
        );
    }

    /// Carries the planned count next to what actually happened, so an early
    /// stop is visible in the record.
    fn push_history(&self, events: &mut Vec<SessionEvent>) {
        if self.config.history_logging_enabled {
            events.push(SessionEvent::History(HistoryRecord::Passive {
                mode: Mode::Passive,
                target_interval_secs: self.config.target_interval_secs,
                repetition_count: self.config.repetition_count,
                repetitions_completed: self.repetitions_completed,
                actual_duration_secs: self.elapsed_secs(),
            }));
        }
    }

    fn enter(&mut self, state: PassiveState, events: &mut Vec<SessionEvent>) {
        debug!(from = %self.state, to = %state, "passive state");
        self.state = state;
        events.push(SessionEvent::PassiveStateChanged { state });
    }
}
