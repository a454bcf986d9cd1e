use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Paragraph, Widget, Wrap},
};

use crate::{
    app::{App, FlashKind, ScreenModel},
    clock::Clock,
    config::{Mode, SessionConfig},
    format::{format_clock, format_error, format_short, plural},
    host::{ActiveSession, HostPhase},
    scoring::{Direction as ErrorDirection, Severity},
    session::{ChallengePhase, ChallengeSession, PassiveSession, PassiveState},
};

const HORIZONTAL_MARGIN: u16 = 5;
const VERTICAL_MARGIN: u16 = 2;

pub fn severity_color(severity: Severity) -> Color {
    match severity {
        Severity::Good => Color::Green,
        Severity::Warning => Color::Yellow,
        Severity::Severe => Color::Red,
    }
}

impl<C: Clock + Clone> Widget for &App<C> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let screen = self.screen();

        let background = match screen.flash.map(|f| f.kind) {
            Some(FlashKind::Penalty) => Some(Color::Red),
            Some(FlashKind::Pulse) => Some(Color::DarkGray),
            None => None,
        };
        if let Some(bg) = background {
            Block::default().style(Style::default().bg(bg)).render(area, buf);
        }

        let (body, legend) = match self.host.session() {
            None => idle_lines(&self.config),
            Some(ActiveSession::Challenge(s)) => challenge_lines(s, &screen),
            Some(ActiveSession::Passive(s)) => passive_lines(s, &screen),
        };

        let body_height = body.len() as u16;
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .horizontal_margin(HORIZONTAL_MARGIN)
            .vertical_margin(VERTICAL_MARGIN)
            .constraints([
                Constraint::Min(0),
                Constraint::Length(body_height),
                Constraint::Min(0),
                Constraint::Length(1), // status
                Constraint::Length(1), // legend
            ])
            .split(area);

        Paragraph::new(body)
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true })
            .render(chunks[1], buf);

        if let Some(status) = &screen.status {
            Paragraph::new(Span::styled(
                status.clone(),
                Style::default().fg(Color::Red).add_modifier(Modifier::ITALIC),
            ))
            .alignment(Alignment::Center)
            .render(chunks[3], buf);
        }

        Paragraph::new(Span::styled(
            legend,
            Style::default().add_modifier(Modifier::ITALIC),
        ))
        .render(chunks[4], buf);
    }
}

fn bold() -> Style {
    Style::default().add_modifier(Modifier::BOLD)
}

fn dim() -> Style {
    Style::default().add_modifier(Modifier::DIM)
}

fn mode_title(mode: Mode) -> &'static str {
    match mode {
        Mode::Challenge => "Challenge",
        Mode::Fear => "Fear",
        Mode::Passive => "Passive",
    }
}

fn count_label(config: &SessionConfig) -> String {
    if config.mode.is_passive() {
        plural(config.repetition_count, "repetition")
    } else {
        plural(config.repetition_count, "attempt")
    }
}

fn idle_lines(config: &SessionConfig) -> (Vec<Line<'static>>, &'static str) {
    let lines = vec![
        Line::from(Span::styled("acuity", bold().fg(Color::Cyan))),
        Line::from(""),
        Line::from(format!(
            "{} · {} · {}",
            mode_title(config.mode),
            format_short(u64::from(config.target_interval_secs)),
            count_label(config)
        )),
    ];
    (lines, "(space) start / (esc)ape")
}

fn challenge_lines<C: Clock>(
    session: &ChallengeSession<C>,
    screen: &ScreenModel,
) -> (Vec<Line<'static>>, &'static str) {
    let config = session.config();
    let target = format_short(u64::from(config.target_interval_secs));
    let progress = format!(
        "Attempt {} / {}",
        session.current_attempt_index() + 1,
        config.repetition_count
    );

    match session.phase() {
        ChallengePhase::Ready => (
            vec![
                Line::from(Span::styled(mode_title(config.mode), dim())),
                Line::from(""),
                Line::from(Span::styled(format!("Target: {target}"), bold())),
                Line::from(count_label(config)),
                Line::from(""),
                Line::from("press space to begin the first attempt"),
            ],
            "(space) start / (a)bort / (esc)ape",
        ),
        ChallengePhase::Running => (
            vec![
                Line::from(Span::styled(progress, dim())),
                Line::from(""),
                Line::from(Span::styled(
                    format!("press space when {target} has passed"),
                    bold(),
                )),
            ],
            "(space) tap / (a)bort / (esc)ape",
        ),
        ChallengePhase::Feedback => {
            let headline = match screen.feedback {
                Some(fb) => Span::styled(
                    format_error(fb.direction, fb.signed_error),
                    bold().fg(severity_color(fb.severity)),
                ),
                None => Span::raw(""),
            };
            (
                vec![
                    Line::from(Span::styled(progress, dim())),
                    Line::from(""),
                    Line::from(headline),
                ],
                "(a)bort / (esc)ape",
            )
        }
        ChallengePhase::Summary => {
            let mut lines = vec![Line::from(Span::styled("Session complete", dim()))];
            if let Some(score) = session.score() {
                let bias = if score.mean_signed_error > 0.0 {
                    ErrorDirection::Late
                } else if score.mean_signed_error < 0.0 {
                    ErrorDirection::Early
                } else {
                    ErrorDirection::OnTime
                };
                lines.extend([
                    Line::from(""),
                    Line::from(Span::styled(
                        format!("Score {}", score.score),
                        bold().fg(Color::Cyan),
                    )),
                    Line::from(format!(
                        "mean error {}",
                        format_short(score.mean_abs_error.round() as u64)
                    )),
                    Line::from(Span::styled(
                        format!("tendency: {}", format_error(bias, score.mean_signed_error)),
                        dim(),
                    )),
                ]);
            }
            (lines, "(enter) done / (n)ew / (esc)ape")
        }
        ChallengePhase::Aborted => (
            vec![
                Line::from(Span::styled("Session aborted", bold())),
                Line::from(format!(
                    "{} of {} attempts completed",
                    session.attempts().len(),
                    config.repetition_count
                )),
            ],
            "(enter) done / (n)ew / (esc)ape",
        ),
    }
}

fn passive_lines<C: Clock>(
    session: &PassiveSession<C>,
    screen: &ScreenModel,
) -> (Vec<Line<'static>>, &'static str) {
    let config = session.config();
    let reps = format!(
        "{} / {} reminders",
        screen
            .passive_completed
            .unwrap_or_else(|| session.repetitions_completed()),
        config.repetition_count
    );
    let clock = Span::styled(format_clock(session.elapsed_secs()), bold());

    match session.state() {
        PassiveState::Idle | PassiveState::Running => (
            vec![
                Line::from(Span::styled(
                    format!(
                        "Passive · every {}",
                        format_short(u64::from(config.target_interval_secs))
                    ),
                    dim(),
                )),
                Line::from(""),
                Line::from(clock),
                Line::from(reps),
            ],
            "(s)top / (esc)ape",
        ),
        state => (
            vec![
                Line::from(Span::styled(
                    if state == PassiveState::Completed {
                        "Passive session complete"
                    } else {
                        "Passive session stopped"
                    },
                    bold(),
                )),
                Line::from(""),
                Line::from(clock),
                Line::from(reps),
            ],
            "(enter) done / (n)ew / (esc)ape",
        ),
    }
}

/// Whether the current phase shows a live clock and needs redrawing every tick
pub fn needs_ticking(phase: HostPhase) -> bool {
    matches!(phase, HostPhase::Passive(PassiveState::Running))
}
