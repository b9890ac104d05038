use std::collections::VecDeque;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tracing::{debug, warn};

use crate::config::ScanSettings;
use crate::engine::feed::{FeedError, MessageFeed};
use crate::engine::message::RawMessage;
use crate::error::AppError;
use crate::retry::{Backoff, with_retry};

use super::client::{ApiError, ApiErrorKind, GmailClient};
use super::messages::MAX_PAGE_SIZE;

/// Newest-first mailbox feed backed by `messages.list` + `messages.get`.
///
/// Pages are listed lazily. Details for one page are fetched concurrently
/// but yielded in listing order.
pub struct GmailFeed {
    client: GmailClient,
    access_token: String,
    query: Option<String>,
    limit: Option<usize>,
    fetch_concurrency: usize,
    retry: Backoff,
    buffered: VecDeque<Result<RawMessage, FeedError>>,
    next_page: Option<String>,
    listed: usize,
    exhausted: bool,
}

impl GmailFeed {
    pub fn new(
        client: GmailClient,
        access_token: impl Into<String>,
        limit: Option<usize>,
        settings: &ScanSettings,
    ) -> Self {
        Self {
            client,
            access_token: access_token.into(),
            query: settings.query.clone().filter(|query| !query.trim().is_empty()),
            limit,
            fetch_concurrency: settings.fetch_concurrency(),
            retry: settings.retry,
            buffered: VecDeque::new(),
            next_page: None,
            listed: 0,
            exhausted: false,
        }
    }

    fn remaining(&self) -> usize {
        self.limit
            .map_or(usize::MAX, |limit| limit.saturating_sub(self.listed))
    }

    async fn fill_page(&mut self) {
        let page_size = self.remaining().min(MAX_PAGE_SIZE);
        if page_size == 0 {
            self.exhausted = true;
            return;
        }

        let client = &self.client;
        let access_token = self.access_token.as_str();
        let query = self.query.as_deref();
        let page_token = self.next_page.as_deref();
        let page = with_retry(&self.retry, "list messages", ApiError::is_transient, || {
            client.list_page(access_token, page_size, query, page_token)
        })
        .await;

        let page = match page {
            Ok(page) => page,
            Err(err) => {
                self.exhausted = true;
                self.buffered.push_back(Err(feed_error(err)));
                return;
            }
        };

        debug!(ids = page.ids.len(), "listed message page");
        self.listed += page.ids.len();
        self.next_page = page.next_page_token;
        if self.next_page.is_none() || page.ids.is_empty() {
            self.exhausted = true;
        }

        let client = &self.client;
        let access_token = &self.access_token;
        let retry = self.retry;
        let details = stream::iter(page.ids)
            .map(|id| fetch_detail(client.clone(), access_token.clone(), retry, id))
            .buffered(self.fetch_concurrency)
            .collect::<Vec<_>>()
            .await;

        for (id, detail) in details {
            match detail {
                Ok(raw) => self.buffered.push_back(Ok(raw)),
                Err(err) if err.kind == ApiErrorKind::NotFound => {
                    debug!(id = %id, "message disappeared while scanning, skipping");
                }
                Err(err) => {
                    warn!(id = %id, "stopping scan: {err}");
                    self.exhausted = true;
                    self.buffered.push_back(Err(feed_error(err)));
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl MessageFeed for GmailFeed {
    async fn next_record(&mut self) -> Option<Result<RawMessage, FeedError>> {
        loop {
            if let Some(record) = self.buffered.pop_front() {
                return Some(record);
            }
            if self.exhausted {
                return None;
            }
            self.fill_page().await;
        }
    }
}

async fn fetch_detail(
    client: GmailClient,
    access_token: String,
    retry: Backoff,
    id: String,
) -> (String, Result<RawMessage, ApiError>) {
    let detail = with_retry(&retry, "fetch message", ApiError::is_transient, || {
        client.get_metadata(&id, &access_token)
    })
    .await;
    (id, detail)
}

fn feed_error(err: ApiError) -> FeedError {
    if err.is_transient() {
        FeedError::Interrupted(err.to_string())
    } else {
        FeedError::Fatal(AppError::from(err))
    }
}
