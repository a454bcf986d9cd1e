// Owns the clock, the timer queue, the one live session and the sinks.

use tracing::{info, warn};

use crate::clock::Clock;
use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::events::{HapticSink, HistorySink, NullSink, PresentationSink, SessionEvent};
use crate::scheduler::TimerQueue;
use crate::session::{ChallengePhase, ChallengeSession, PassiveSession, PassiveState};

#[derive(Debug)]
pub enum ActiveSession<C: Clock> {
    Challenge(ChallengeSession<C>),
    Passive(PassiveSession<C>),
}

impl<C: Clock> ActiveSession<C> {
    pub fn is_terminal(&self) -> bool {
        match self {
            ActiveSession::Challenge(s) => s.is_terminal(),
            ActiveSession::Passive(s) => s.is_terminal(),
        }
    }

    pub fn phase(&self) -> HostPhase {
        match self {
            ActiveSession::Challenge(s) => HostPhase::Challenge(s.phase()),
            ActiveSession::Passive(s) => HostPhase::Passive(s.state()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostPhase {
    Idle,
    Challenge(ChallengePhase),
    Passive(PassiveState),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum UserAction {
    Start,
    Tap,
    Advance,
    Abort,
    Stop,
    /// Dismiss a finished session
    Acknowledge,
}

pub struct SessionHost<C: Clock + Clone> {
    clock: C,
    timers: TimerQueue,
    active: Option<ActiveSession<C>>,
    presentation: Box<dyn PresentationSink>,
    haptics: Box<dyn HapticSink>,
    history: Box<dyn HistorySink>,
}

impl<C: Clock + Clone> SessionHost<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            timers: TimerQueue::new(),
            active: None,
            presentation: Box::new(NullSink),
            haptics: Box::new(NullSink),
            history: Box::new(NullSink),
        }
    }

    pub fn with_presentation(mut self, sink: impl PresentationSink + 'static) -> Self {
        self.presentation = Box::new(sink);
        self
    }

    pub fn with_haptics(mut self, sink: impl HapticSink + 'static) -> Self {
        self.haptics = Box::new(sink);
        self
    }

    pub fn with_history(mut self, sink: impl HistorySink + 'static) -> Self {
        self.history = Box::new(sink);
        self
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn session(&self) -> Option<&ActiveSession<C>> {
        self.active.as_ref()
    }

    pub fn current_phase(&self) -> HostPhase {
        self.active
            .as_ref()
            .map_or(HostPhase::Idle, ActiveSession::phase)
    }

    /// Earliest pending wakeup, so an event loop can sleep until exactly then
    pub fn next_deadline_ms(&self) -> Option<u64> {
        self.timers.next_deadline_ms()
    }

    /// Replaces whatever session is live. Challenge sessions wait in `Ready`
    /// for the first `Start`; passive sessions begin immediately.
    pub fn start_session(&mut self, config: SessionConfig) -> Result<(), SessionError> {
        config.validate()?;
        self.teardown();

        info!(
            mode = %config.mode,
            interval_secs = config.target_interval_secs,
            count = config.repetition_count,
            "starting session"
        );

        if config.mode.is_passive() {
            let mut session = PassiveSession::new(config, self.clock.clone())?;
            let events = session.start(&mut self.timers)?;
            self.active = Some(ActiveSession::Passive(session));
            self.deliver(events);
        } else {
            let session = ChallengeSession::new(config, self.clock.clone())?;
            self.active = Some(ActiveSession::Challenge(session));
            self.presentation.present(&SessionEvent::ChallengePhaseChanged {
                phase: ChallengePhase::Ready,
            });
        }
        Ok(())
    }

    /// Forwards a user action to the live session. An invalid transition
    /// ends the session before the error is returned.
    pub fn dispatch(&mut self, action: UserAction) -> Result<(), SessionError> {
        let operation: &'static str = action.into();

        let mut dismiss = false;
        let timers = &mut self.timers;
        let result = match (self.active.as_mut(), action) {
            (None, _) => return Err(SessionError::transition(operation, "idle")),
            (Some(active), UserAction::Acknowledge) => {
                if active.is_terminal() {
                    dismiss = true;
                    Ok(Vec::new())
                } else {
                    Err(SessionError::transition(operation, phase_name(active)))
                }
            }
            (Some(ActiveSession::Challenge(s)), UserAction::Start) => s.start(),
            (Some(ActiveSession::Challenge(s)), UserAction::Tap) => s.tap(timers),
            (Some(ActiveSession::Challenge(s)), UserAction::Advance) => s.advance(timers),
            (Some(ActiveSession::Challenge(s)), UserAction::Abort | UserAction::Stop) => {
                s.abort(timers)
            }
            (Some(ActiveSession::Passive(s)), UserAction::Start) => s.start(timers),
            (Some(ActiveSession::Passive(s)), UserAction::Stop | UserAction::Abort) => {
                s.stop(timers)
            }
            (Some(ActiveSession::Passive(s)), UserAction::Tap | UserAction::Advance) => {
                Err(SessionError::transition(operation, s.state()))
            }
        };

        if dismiss {
            self.active = None;
        }

        match result {
            Ok(events) => {
                self.deliver(events);
                Ok(())
            }
            Err(err) if err.is_fatal() => {
                warn!(%err, "fatal session error, ending session");
                self.force_end();
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Delivers every wakeup that is due now. Returns how many were handled.
    pub fn poll_timers(&mut self) -> usize {
        let mut handled = 0;
        loop {
            let now = self.clock.now_ms();
            let Some(fired) = self.timers.pop_due(now) else {
                break;
            };
            handled += 1;

            let timers = &mut self.timers;
            let result = match self.active.as_mut() {
                Some(ActiveSession::Challenge(s)) => s.on_wake(fired, timers),
                Some(ActiveSession::Passive(s)) => s.on_wake(fired, timers),
                None => continue,
            };

            match result {
                Ok(events) => self.deliver(events),
                Err(err) => {
                    warn!(%err, "wakeup failed, ending session");
                    self.force_end();
                }
            }
        }
        handled
    }

    fn teardown(&mut self) {
        self.force_end();
        self.active = None;
        self.timers.clear();
    }

    /// Aborts or stops the live session if it is still going. Sessions that
    /// cannot be ended through a transition are dropped.
    fn force_end(&mut self) {
        let timers = &mut self.timers;
        let outcome = match self.active.as_mut() {
            Some(active) if active.is_terminal() => return,
            Some(ActiveSession::Challenge(s)) => s.abort(timers),
            Some(ActiveSession::Passive(s)) => s.stop(timers),
            None => return,
        };

        match outcome {
            Ok(events) => self.deliver(events),
            Err(_) => self.active = None,
        }
    }

    fn deliver(&mut self, events: Vec<SessionEvent>) {
        for event in events {
            self.presentation.present(&event);
            match &event {
                SessionEvent::FearPenalty { .. } => self.haptics.fear_penalty(),
                SessionEvent::BoundaryReached { .. } => self.haptics.pulse(),
                SessionEvent::History(record) => {
                    if let Err(err) = self.history.record(record) {
                        warn!(%err, "history sink failed, record dropped");
                    }
                }
                _ => {}
            }
        }
    }
}

fn phase_name<C: Clock>(active: &ActiveSession<C>) -> String {
    match active {
        ActiveSession::Challenge(s) => s.phase().to_string(),
        ActiveSession::Passive(s) => s.state().to_string(),
    }
}
