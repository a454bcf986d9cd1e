use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::SessionError;

pub const MIN_INTERVAL_SECS: u32 = 10;
pub const DEFAULT_FEEDBACK_MS: u64 = 2_000;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    clap::ValueEnum,
    strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Mode {
    Challenge,
    Fear,
    Passive,
}

impl Mode {
    pub fn is_passive(self) -> bool {
        self == Mode::Passive
    }
}

/// Everything a session needs to run. Immutable once the session exists.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub mode: Mode,
    pub target_interval_secs: u32,
    /// attempts for Challenge/Fear, boundaries for Passive
    pub repetition_count: u32,
    pub sound_enabled: bool,
    pub history_logging_enabled: bool,
    pub feedback_display: Duration,
}

impl SessionConfig {
    pub fn new(mode: Mode, target_interval_secs: u32, repetition_count: u32) -> Self {
        Self {
            mode,
            target_interval_secs,
            repetition_count,
            sound_enabled: true,
            history_logging_enabled: true,
            feedback_display: Duration::from_millis(DEFAULT_FEEDBACK_MS),
        }
    }

    pub fn with_sound(mut self, enabled: bool) -> Self {
        self.sound_enabled = enabled;
        self
    }

    pub fn with_history_logging(mut self, enabled: bool) -> Self {
        self.history_logging_enabled = enabled;
        self
    }

    pub fn with_feedback_display(mut self, display: Duration) -> Self {
        self.feedback_display = display;
        self
    }

    pub fn validate(&self) -> Result<(), SessionError> {
        if self.target_interval_secs < MIN_INTERVAL_SECS {
            return Err(SessionError::InvalidConfig(format!(
                "interval must be at least {MIN_INTERVAL_SECS} seconds, got {}",
                self.target_interval_secs
            )));
        }
        if self.repetition_count < 1 {
            return Err(SessionError::InvalidConfig(
                "count must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn interval_ms(&self) -> u64 {
        u64::from(self.target_interval_secs) * 1000
    }
}

/// User preferences remembered between runs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub mode: Mode,
    pub target_interval_secs: u32,
    pub attempt_count: u32,
    pub repetition_count: u32,
    pub sound_enabled: bool,
    pub history_logging_enabled: bool,
    pub feedback_display_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mode: Mode::Challenge,
            target_interval_secs: 300,
            attempt_count: 1,
            repetition_count: 1,
            sound_enabled: true,
            history_logging_enabled: true,
            feedback_display_ms: DEFAULT_FEEDBACK_MS,
        }
    }
}

impl Settings {
    /// Passive sessions and challenges keep separate counters.
    pub fn count_for(&self, mode: Mode) -> u32 {
        if mode.is_passive() {
            self.repetition_count
        } else {
            self.attempt_count
        }
    }

    pub fn set_count_for(&mut self, mode: Mode, count: u32) {
        if mode.is_passive() {
            self.repetition_count = count;
        } else {
            self.attempt_count = count;
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::new(
            self.mode,
            self.target_interval_secs,
            self.count_for(self.mode),
        )
        .with_sound(self.sound_enabled)
        .with_history_logging(self.history_logging_enabled)
        .with_feedback_display(Duration::from_millis(self.feedback_display_ms))
    }
}

pub trait SettingsStore {
    fn load(&self) -> Settings;
    fn save(&self, settings: &Settings) -> std::io::Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileSettingsStore {
    path: PathBuf,
}

impl FileSettingsStore {
    pub fn new() -> Self {
        let path = if let Some(pd) = ProjectDirs::from("", "", "acuity") {
            pd.config_dir().join("settings.json")
        } else {
            PathBuf::from("acuity_settings.json")
        };
        Self { path }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileSettingsStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SettingsStore for FileSettingsStore {
    fn load(&self) -> Settings {
        match fs::read(&self.path) {
            Ok(bytes) => match serde_json::from_slice::<Settings>(&bytes) {
                Ok(settings) => settings,
                Err(err) => {
                    tracing::warn!(path = %self.path.display(), %err, "ignoring unreadable settings");
                    Settings::default()
                }
            },
            Err(_) => Settings::default(),
        }
    }

    fn save(&self, settings: &Settings) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(settings)?;
        fs::write(&self.path, data)
    }
}
