use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::AppError;

use super::message::RawMessage;

/// How many of the most recent messages one run considers.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ScanDepth {
    Quick,
    #[default]
    Normal,
    Deep,
    Full,
}

impl ScanDepth {
    pub fn limit(self) -> Option<usize> {
        match self {
            Self::Quick => Some(1_000),
            Self::Normal => Some(5_000),
            Self::Deep => Some(10_000),
            Self::Full => None,
        }
    }
}

impl fmt::Display for ScanDepth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Quick => "quick",
            Self::Normal => "normal",
            Self::Deep => "deep",
            Self::Full => "full",
        };
        f.write_str(name)
    }
}

impl FromStr for ScanDepth {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        <Self as ValueEnum>::from_str(value, true)
            .map_err(|_| AppError::InvalidInput(format!("unknown scan depth `{value}`")))
    }
}

#[derive(Debug, Error)]
pub enum FeedError {
    /// The feed stopped early for a reason that may clear up on a later run.
    #[error("feed interrupted: {0}")]
    Interrupted(String),
    /// The feed cannot continue at all (for example, the credentials were refused).
    #[error("feed failed: {0}")]
    Fatal(#[source] AppError),
}

#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
#[error("scan stopped after {scanned} of {} messages: {reason}", depth_label(.depth))]
pub struct IncompleteFeedError {
    pub scanned: usize,
    pub depth: Option<usize>,
    pub reason: String,
}

fn depth_label(depth: &Option<usize>) -> String {
    depth.map_or_else(|| "all".to_string(), |depth| depth.to_string())
}

/// A lazy, finite, per-run sequence of message records.
///
/// Pagination and credentials belong to the implementor. `None` means the
/// mailbox is exhausted; an `Err` ends the sequence early.
#[async_trait]
pub trait MessageFeed: Send {
    async fn next_record(&mut self) -> Option<Result<RawMessage, FeedError>>;
}

/// Adapts any iterator of records into a feed.
#[derive(Debug)]
pub struct IterFeed<I> {
    inner: I,
}

impl<I> IterFeed<I> {
    pub fn new(inner: I) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<I> MessageFeed for IterFeed<I>
where
    I: Iterator<Item = Result<RawMessage, FeedError>> + Send,
{
    async fn next_record(&mut self) -> Option<Result<RawMessage, FeedError>> {
        self.inner.next()
    }
}
