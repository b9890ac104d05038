use std::time::SystemTime;

use crate::api::GmailClient;
use crate::auth::{ACCESS_TOKEN_ENV, FileTokenStore, TokenSet, TokenStore};
use crate::config::{self, AppPaths, Settings};
use crate::error::{AppError, AppResult};
use crate::output::Output;

#[derive(Debug)]
pub struct AppContext {
    pub profile: String,
    pub verbose: u8,
    pub paths: AppPaths,
    pub settings: Settings,
    pub token_store: FileTokenStore,
    pub gmail_client: GmailClient,
    pub output: Output,
}

impl AppContext {
    pub fn bootstrap(profile: String, json: bool, verbose: u8) -> AppResult<Self> {
        let profile = config::resolve_profile(&profile)?;
        let paths = AppPaths::discover()?;
        let settings = config::load_settings(&paths, &profile)?;
        let token_path = settings
            .token_file
            .clone()
            .unwrap_or_else(|| paths.token_file(&profile));
        let token_store = FileTokenStore::new(token_path);
        let gmail_client = GmailClient::new();
        let output = Output::new(json);

        Ok(Self {
            profile,
            verbose,
            paths,
            settings,
            token_store,
            gmail_client,
            output,
        })
    }

    /// Access token for read-only calls.
    pub fn access_token(&self) -> AppResult<String> {
        Ok(self.load_token()?.access_token)
    }

    /// Access token that must allow moving mail to trash.
    pub fn modify_token(&self) -> AppResult<String> {
        let token = self.load_token()?;
        if !token.can_modify() {
            return Err(AppError::Auth(
                "access token lacks the gmail.modify scope needed to move mail to trash"
                    .to_string(),
            ));
        }
        Ok(token.access_token)
    }

    fn load_token(&self) -> AppResult<TokenSet> {
        let token = self.token_store.load()?.ok_or_else(|| {
            AppError::Auth(format!(
                "no access token for profile `{}`. set {} or write {}",
                self.profile,
                ACCESS_TOKEN_ENV,
                self.token_store.path().display()
            ))
        })?;

        if token.is_expired(SystemTime::now()) {
            return Err(AppError::Auth(
                "access token expired. sign in again and refresh the token file".to_string(),
            ));
        }

        Ok(token)
    }
}
