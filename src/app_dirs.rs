use directories::ProjectDirs;
use std::path::PathBuf;

/// Centralized application directory resolution
pub struct AppDirs;

impl AppDirs {
    /// Diagnostic log; the terminal belongs to the UI so tracing output goes here.
    pub fn log_path() -> Option<PathBuf> {
        Self::state_dir().map(|dir| dir.join("acuity.log"))
    }

    fn state_dir() -> Option<PathBuf> {
        if let Ok(home) = std::env::var("HOME") {
            Some(PathBuf::from(home).join(".local").join("state").join("acuity"))
        } else {
            ProjectDirs::from("", "", "acuity").map(|proj_dirs| proj_dirs.data_local_dir().to_path_buf())
        }
    }
}
