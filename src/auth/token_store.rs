use std::fs;
use std::path::PathBuf;

use crate::error::{AppError, AppResult};

use super::TokenSet;

pub const ACCESS_TOKEN_ENV: &str = "MAILSWEEP_ACCESS_TOKEN";

pub trait TokenStore {
    fn load(&self) -> AppResult<Option<TokenSet>>;
}

/// Reads a token JSON file, with the environment taking priority.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
    env_token: Option<String>,
}

impl FileTokenStore {
    pub fn new(path: PathBuf) -> Self {
        let env_token = std::env::var(ACCESS_TOKEN_ENV).ok();
        Self::with_env_token(path, env_token)
    }

    pub fn with_env_token(path: PathBuf, env_token: Option<String>) -> Self {
        let env_token = env_token
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty());
        Self { path, env_token }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> AppResult<Option<TokenSet>> {
        if let Some(token) = self.env_token.as_ref() {
            return Ok(Some(TokenSet::bare(token.clone())));
        }

        if !self.path.exists() {
            return Ok(None);
        }

        let raw = fs::read_to_string(&self.path)?;
        let token: TokenSet = serde_json::from_str(&raw).map_err(|err| {
            AppError::Auth(format!(
                "unreadable token file {}: {err}",
                self.path.display()
            ))
        })?;
        Ok(Some(token))
    }
}
