use std::cell::RefCell;
use std::rc::Rc;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::clock::Clock;
use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::events::{Completion, HapticSink, HistorySink, PresentationSink, SessionEvent};
use crate::host::{HostPhase, SessionHost, UserAction};
use crate::runtime::AppEvent;
use crate::scoring::{Direction, SessionScore, Severity};
use crate::session::{ChallengePhase, PassiveState};
use crate::ui::needs_ticking;

/// How many ticks a screen flash stays visible
pub const FLASH_TICKS: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashKind {
    Pulse,
    Penalty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Flash {
    pub kind: FlashKind,
    pub ticks_left: u8,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeedbackView {
    pub index: u32,
    pub severity: Severity,
    pub direction: Direction,
    pub signed_error: f64,
}

/// What the screen shows beyond the session's own phase: transient feedback,
/// the last summary and flashes. Filled only from emitted events.
#[derive(Debug, Default)]
pub struct ScreenModel {
    pub feedback: Option<FeedbackView>,
    pub summary: Option<SessionScore>,
    pub passive_completed: Option<u32>,
    pub flash: Option<Flash>,
    pub bell: bool,
    pub pulsed: bool,
    pub status: Option<String>,
}

impl ScreenModel {
    fn flash(&mut self, kind: FlashKind) {
        self.flash = Some(Flash {
            kind,
            ticks_left: FLASH_TICKS,
        });
    }

    fn on_tick(&mut self) {
        if let Some(flash) = self.flash.as_mut() {
            flash.ticks_left = flash.ticks_left.saturating_sub(1);
            if flash.ticks_left == 0 {
                self.flash = None;
            }
        }
    }
}

/// Handle given to the host as presentation and haptic sink
#[derive(Debug, Clone, Default)]
pub struct SharedScreen(Rc<RefCell<ScreenModel>>);

impl PresentationSink for SharedScreen {
    fn present(&mut self, event: &SessionEvent) {
        let mut screen = self.0.borrow_mut();
        match event {
            SessionEvent::ChallengePhaseChanged {
                phase: ChallengePhase::Ready,
            } => {
                screen.feedback = None;
                screen.summary = None;
            }
            SessionEvent::PassiveStateChanged {
                state: PassiveState::Running,
            } => screen.passive_completed = None,
            SessionEvent::AttemptStarted { .. } => screen.feedback = None,
            SessionEvent::FeedbackReady {
                index,
                severity,
                direction,
                signed_error,
                ..
            } => {
                screen.feedback = Some(FeedbackView {
                    index: *index,
                    severity: *severity,
                    direction: *direction,
                    signed_error: *signed_error,
                });
            }
            SessionEvent::SessionComplete(Completion::Challenge(score)) => {
                screen.summary = Some(*score);
            }
            SessionEvent::SessionComplete(Completion::Passive {
                repetitions_completed,
            }) => screen.passive_completed = Some(*repetitions_completed),
            _ => {}
        }
    }
}

impl HapticSink for SharedScreen {
    fn pulse(&mut self) {
        let mut screen = self.0.borrow_mut();
        screen.flash(FlashKind::Pulse);
        screen.pulsed = true;
    }

    fn fear_penalty(&mut self) {
        let mut screen = self.0.borrow_mut();
        screen.flash(FlashKind::Penalty);
        screen.bell = true;
    }
}

/// Terminal application state: the session host plus what the UI needs to draw it
pub struct App<C: Clock + Clone> {
    pub host: SessionHost<C>,
    pub config: SessionConfig,
    screen: SharedScreen,
    should_quit: bool,
}

impl<C: Clock + Clone> App<C> {
    pub fn new(config: SessionConfig, clock: C, history: impl HistorySink + 'static) -> Self {
        let screen = SharedScreen::default();
        let host = SessionHost::new(clock)
            .with_presentation(screen.clone())
            .with_haptics(screen.clone())
            .with_history(history);

        Self {
            host,
            config,
            screen,
            should_quit: false,
        }
    }

    pub fn screen(&self) -> std::cell::Ref<'_, ScreenModel> {
        self.screen.0.borrow()
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    pub fn new_session(&mut self) {
        let result = self.host.start_session(self.config.clone());
        self.report(result);
    }

    /// Ages screen flashes, then delivers due wakeups
    pub fn on_tick(&mut self) {
        self.screen.0.borrow_mut().on_tick();
        self.host.poll_timers();
    }

    /// Applies one loop event and reports whether the screen needs a redraw.
    /// Due wakeups are delivered after every event, so a stream of key repeats
    /// cannot hold them back.
    pub fn handle_event(&mut self, event: AppEvent) -> bool {
        match event {
            AppEvent::Key(key) => {
                self.handle_key(key);
                self.host.poll_timers();
                true
            }
            AppEvent::Resize => {
                self.host.poll_timers();
                true
            }
            AppEvent::Tick => {
                let flashing = self.screen().flash.is_some();
                let before = self.host.current_phase();
                self.on_tick();
                flashing || before != self.host.current_phase() || needs_ticking(before)
            }
        }
    }

    /// Passive boundaries ring the bell only when sound is on; fear penalties
    /// are already gated by the session.
    pub fn take_bell(&mut self) -> bool {
        let mut screen = self.screen.0.borrow_mut();
        let pulsed = std::mem::take(&mut screen.pulsed);
        std::mem::take(&mut screen.bell) || (pulsed && self.config.sound_enabled)
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.quit();
            return;
        }

        let phase = self.host.current_phase();
        let action = match (key.code, phase) {
            (KeyCode::Esc | KeyCode::Char('q'), _) => {
                self.quit();
                return;
            }
            (KeyCode::Char('n'), _) => {
                self.new_session();
                return;
            }
            (KeyCode::Char(' ') | KeyCode::Enter, HostPhase::Idle) => {
                self.new_session();
                return;
            }
            (KeyCode::Char(' ') | KeyCode::Enter, HostPhase::Challenge(ChallengePhase::Ready)) => {
                UserAction::Start
            }
            (KeyCode::Char(' ') | KeyCode::Enter, HostPhase::Challenge(ChallengePhase::Running)) => {
                UserAction::Tap
            }
            (KeyCode::Enter, HostPhase::Challenge(p)) if p.is_terminal() => UserAction::Acknowledge,
            (KeyCode::Enter, HostPhase::Passive(s)) if s.is_terminal() => UserAction::Acknowledge,
            (KeyCode::Char('s'), HostPhase::Passive(PassiveState::Running)) => UserAction::Stop,
            (KeyCode::Char('a'), HostPhase::Challenge(p)) if !p.is_terminal() => UserAction::Abort,
            (KeyCode::Char('a'), HostPhase::Passive(PassiveState::Running)) => UserAction::Stop,
            _ => return,
        };

        let result = self.host.dispatch(action);
        self.report(result);
    }

    /// Ends a live session (a passive run still gets its history record), then
    /// flags the loop to exit
    pub fn quit(&mut self) {
        let live = match self.host.current_phase() {
            HostPhase::Idle => false,
            HostPhase::Challenge(p) => !p.is_terminal(),
            HostPhase::Passive(s) => !s.is_terminal(),
        };
        if live {
            let result = self.host.dispatch(UserAction::Abort);
            self.report(result);
        }
        self.should_quit = true;
    }

    fn report(&mut self, result: Result<(), SessionError>) {
        self.screen.0.borrow_mut().status = result.err().map(|err| err.to_string());
    }
}
