use directories::ProjectDirs;
use std::path::PathBuf;

/// Centralized application directory resolution
pub struct AppDirs;

impl AppDirs {
    pub fn history_db_path() -> Option<PathBuf> {
        if let Ok(home) = std::env::var("HOME") {
            let state_dir = PathBuf::from(home)
                .join(".local")
                .join("state")
                .join("bilat");
            Some(state_dir.join("history.db"))
        } else {
            ProjectDirs::from("", "", "bilat")
                .map(|proj_dirs| proj_dirs.data_local_dir().join("history.db"))
        }
    }

    pub fn config_path() -> PathBuf {
        if let Some(pd) = ProjectDirs::from("", "", "bilat") {
            pd.config_dir().join("config.json")
        } else {
            PathBuf::from("bilat_config.json")
        }
    }
}
