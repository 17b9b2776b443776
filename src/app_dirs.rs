use directories::ProjectDirs;
use std::path::PathBuf;

/// Centralized application directory resolution
pub struct AppDirs;

impl AppDirs {
    pub fn preferences_path() -> PathBuf {
        ProjectDirs::from("", "", "nback")
            .map(|proj_dirs| proj_dirs.config_dir().join("preferences.json"))
            .unwrap_or_else(|| PathBuf::from("nback_preferences.json"))
    }

    pub fn history_path() -> PathBuf {
        Self::state_dir().join("history.db")
    }

    pub fn log_path() -> PathBuf {
        Self::state_dir().join("nback.log")
    }

    fn state_dir() -> PathBuf {
        if let Ok(home) = std::env::var("HOME") {
            PathBuf::from(home).join(".local").join("state").join("nback")
        } else {
            ProjectDirs::from("", "", "nback")
                .map(|proj_dirs| proj_dirs.data_local_dir().to_path_buf())
                .unwrap_or_else(|| PathBuf::from("."))
        }
    }
}
