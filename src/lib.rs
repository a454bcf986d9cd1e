// Library surface for headless/integration tests and reuse.
// The binary in main.rs only adds argument parsing and terminal setup.
pub mod app;
pub mod app_dirs;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod format;
pub mod host;
pub mod runtime;
pub mod scheduler;
pub mod scoring;
pub mod session;
pub mod ui;
