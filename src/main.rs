use acuity::{
    app::App,
    app_dirs::AppDirs,
    clock::{Clock, MonotonicClock},
    config::{FileSettingsStore, Mode, Settings, SettingsStore},
    events::TracingHistorySink,
    runtime::{CrosstermEventSource, FixedTicker, Runner},
};
use clap::{error::ErrorKind, CommandFactory, Parser};
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use std::{
    error::Error,
    fs::{self, OpenOptions},
    io::{self, stdin, Write},
    sync::Mutex,
    time::Duration,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const TICK_RATE_MS: u64 = 100;
const DEFAULT_LOG_FILTER: &str = "acuity=info,history=info";

/// train your internal clock: estimate intervals without looking
#[derive(Parser, Debug, Clone)]
#[clap(
    name = "acuity",
    version,
    about,
    long_about = "A terminal trainer for time perception. Challenge and fear modes score how closely you can judge an interval; passive mode pulses at every interval boundary so you can calibrate against it."
)]
pub struct Cli {
    /// session mode
    #[clap(short = 'm', long, value_enum)]
    mode: Option<Mode>,

    /// target interval in seconds (at least 10)
    #[clap(short = 'i', long)]
    interval: Option<u32>,

    /// attempts (challenge/fear) or repetitions (passive)
    #[clap(short = 'n', long)]
    count: Option<u32>,

    /// disable the bell for fear penalties and passive boundaries
    #[clap(long)]
    no_sound: bool,

    /// do not log finished sessions to history
    #[clap(long)]
    no_history: bool,

    /// how long feedback stays on screen after a tap, in milliseconds
    #[clap(long)]
    feedback_ms: Option<u64>,

    /// remember these options as the new defaults
    #[clap(long)]
    save: bool,
}

impl Cli {
    /// Overlays the given options on stored settings
    fn apply(&self, settings: &mut Settings) {
        if let Some(mode) = self.mode {
            settings.mode = mode;
        }
        if let Some(secs) = self.interval {
            settings.target_interval_secs = secs;
        }
        if let Some(count) = self.count {
            settings.set_count_for(settings.mode, count);
        }
        if self.no_sound {
            settings.sound_enabled = false;
        }
        if self.no_history {
            settings.history_logging_enabled = false;
        }
        if let Some(ms) = self.feedback_ms {
            settings.feedback_display_ms = ms;
        }
    }
}

fn init_tracing() {
    let Some(path) = AppDirs::log_path() else {
        return;
    };
    if let Some(dir) = path.parent() {
        if fs::create_dir_all(dir).is_err() {
            return;
        }
    }
    let Ok(file) = OpenOptions::new().create(true).append(true).open(&path) else {
        return;
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init();
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_tracing();

    let store = FileSettingsStore::new();
    let mut settings = store.load();
    cli.apply(&mut settings);

    let config = settings.session_config();
    if let Err(err) = config.validate() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::ValueValidation, err).exit();
    }

    if cli.save {
        if let Err(err) = store.save(&settings) {
            warn!(path = %store.path().display(), %err, "could not save settings");
        }
    }

    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    enable_raw_mode()?;

    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(config, MonotonicClock::new(), TracingHistorySink);
    app.new_session();
    let result = start_tui(&mut terminal, &mut app);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    info!("exiting");
    result
}

fn start_tui<B: Backend + Write, C: Clock + Clone>(
    terminal: &mut Terminal<B>,
    app: &mut App<C>,
) -> Result<(), Box<dyn Error>> {
    let runner = Runner::new(
        CrosstermEventSource::new(),
        FixedTicker::new(Duration::from_millis(TICK_RATE_MS)),
    );

    terminal.draw(|f| f.render_widget(&*app, f.area()))?;

    while !app.should_quit() {
        let until_wakeup = app.host.next_deadline_ms().map(|deadline| {
            Duration::from_millis(deadline.saturating_sub(app.host.clock().now_ms()))
        });

        let redraw = app.handle_event(runner.step_within(until_wakeup));

        if app.take_bell() {
            let backend = terminal.backend_mut();
            backend.write_all(b"\x07")?;
            Write::flush(backend)?;
        }

        if redraw && !app.should_quit() {
            terminal.draw(|f| f.render_widget(&*app, f.area()))?;
        }
    }

    Ok(())
}
