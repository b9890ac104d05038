use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

const APP_DIR: &str = "mailsweep";

/// Per-user locations for profile settings and externally issued tokens.
#[derive(Debug, Clone)]
pub struct AppPaths {
    profiles_dir: PathBuf,
    tokens_dir: PathBuf,
}

impl AppPaths {
    pub fn discover() -> AppResult<Self> {
        let config_root = dirs::config_dir()
            .ok_or_else(|| AppError::Config("unable to resolve config directory".to_string()))?;
        let data_root = dirs::data_dir()
            .ok_or_else(|| AppError::Config("unable to resolve data directory".to_string()))?;

        Self::under(&config_root.join(APP_DIR), &data_root.join(APP_DIR))
    }

    /// Lays the directories out below explicit roots. Only the profiles
    /// directory is created; the token directory belongs to the sign-in tool.
    pub fn under(config_dir: &Path, data_dir: &Path) -> AppResult<Self> {
        let profiles_dir = config_dir.join("profiles");
        fs::create_dir_all(&profiles_dir)?;

        Ok(Self {
            profiles_dir,
            tokens_dir: data_dir.join("tokens"),
        })
    }

    pub fn settings_file(&self, profile: &str) -> PathBuf {
        self.profiles_dir.join(format!("{profile}.json"))
    }

    /// Where an external sign-in tool is expected to leave the access token.
    pub fn token_file(&self, profile: &str) -> PathBuf {
        self.tokens_dir.join(format!("{profile}.json"))
    }
}
