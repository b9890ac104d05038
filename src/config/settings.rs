use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::engine::batch::BatchPolicy;
use crate::engine::classify::Thresholds;
use crate::engine::feed::ScanDepth;
use crate::engine::rules::MarketingRules;
use crate::error::{AppError, AppResult};
use crate::retry::Backoff;

const DEFAULT_FETCH_CONCURRENCY: usize = 8;
const MAX_FETCH_CONCURRENCY: usize = 16;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub thresholds: Thresholds,
    #[serde(default)]
    pub rules: MarketingRules,
    #[serde(default)]
    pub batch: BatchPolicy,
    #[serde(default)]
    pub scan: ScanSettings,
    #[serde(default)]
    pub token_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    pub depth: ScanDepth,
    /// Detail requests in flight while reading one page of the mailbox.
    pub fetch_concurrency: usize,
    /// Provider search query applied to every scan.
    pub query: Option<String>,
    #[serde(flatten)]
    pub retry: Backoff,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            depth: ScanDepth::default(),
            fetch_concurrency: DEFAULT_FETCH_CONCURRENCY,
            query: None,
            retry: Backoff::default(),
        }
    }
}

impl ScanSettings {
    pub fn fetch_concurrency(&self) -> usize {
        self.fetch_concurrency.clamp(1, MAX_FETCH_CONCURRENCY)
    }
}

impl Settings {
    pub fn validate(&self) -> AppResult<()> {
        let thresholds = &self.thresholds;
        if !(0.0..=1.0).contains(&thresholds.rarely_opened_rate) {
            return Err(AppError::Config(format!(
                "thresholds.rarely_opened_rate must be between 0 and 1, got {}",
                thresholds.rarely_opened_rate
            )));
        }
        if thresholds.old_email_days < 0 {
            return Err(AppError::Config(format!(
                "thresholds.old_email_days must not be negative, got {}",
                thresholds.old_email_days
            )));
        }
        if self.batch.batch_size == 0 {
            return Err(AppError::Config(
                "batch.batch_size must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

pub fn load(path: PathBuf) -> AppResult<Settings> {
    if !path.exists() {
        return Ok(Settings::default());
    }

    let raw = fs::read_to_string(path)?;
    let settings: Settings = serde_json::from_str(&raw)?;
    settings.validate()?;
    Ok(settings)
}

pub fn save(path: PathBuf, settings: &Settings) -> AppResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let payload = serde_json::to_string_pretty(settings)?;
    fs::write(&path, payload)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_profile_uses_documented_defaults() {
        let settings: Settings = serde_json::from_str("{}").expect("parse");

        assert_eq!(settings.thresholds.never_opened, 5);
        assert_eq!(settings.thresholds.rarely_opened_rate, 0.20);
        assert_eq!(settings.thresholds.bulk_sender, 20);
        assert_eq!(settings.thresholds.old_email_days, 30);
        assert_eq!(settings.batch.batch_size, 1_000);
        assert_eq!(settings.scan.depth, ScanDepth::Normal);
        assert!(settings.token_file.is_none());
    }

    #[test]
    fn partial_thresholds_keep_other_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{"thresholds":{"bulk_sender":50},"scan":{"depth":"deep"}}"#)
                .expect("parse");

        assert_eq!(settings.thresholds.bulk_sender, 50);
        assert_eq!(settings.thresholds.never_opened, 5);
        assert_eq!(settings.scan.depth, ScanDepth::Deep);
    }

    #[test]
    fn rejects_out_of_range_rate() {
        let settings: Settings =
            serde_json::from_str(r#"{"thresholds":{"rarely_opened_rate":1.5}}"#).expect("parse");
        assert!(matches!(settings.validate(), Err(AppError::Config(_))));
    }

    #[test]
    fn round_trips_through_disk() {
        let dir = std::env::temp_dir().join(format!("mailsweep-settings-{}", std::process::id()));
        let path = dir.join("profile.json");
        let mut settings = Settings::default();
        settings.thresholds.never_opened = 9;

        save(path.clone(), &settings).expect("save");
        let loaded = load(path).expect("load");
        assert_eq!(loaded.thresholds.never_opened, 9);

        let _ = fs::remove_dir_all(dir);
    }
}
