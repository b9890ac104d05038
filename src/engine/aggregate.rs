use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::feed::{FeedError, IncompleteFeedError, MessageFeed};
use super::message::{MessageMetadata, RawMessage, ValidationError};
use crate::error::AppError;

const PROGRESS_EVERY: usize = 200;

/// Per-sender totals for one scan. Never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct SenderStats {
    pub address: String,
    pub display_name: String,
    pub total_count: usize,
    pub read_count: usize,
    pub unread_count: usize,
    pub earliest: DateTime<Utc>,
    pub latest: DateTime<Utc>,
    /// Any message from this sender carried a provider promotional hint.
    pub marketing_hint: bool,
    pub message_ids: Vec<String>,
}

impl SenderStats {
    fn new(message: &MessageMetadata) -> Self {
        Self {
            address: message.sender.clone(),
            display_name: message.sender_name.clone(),
            total_count: 0,
            read_count: 0,
            unread_count: 0,
            earliest: message.received_at,
            latest: message.received_at,
            marketing_hint: false,
            message_ids: Vec::new(),
        }
    }

    /// Zero when the sender has no messages.
    pub fn read_rate(&self) -> f64 {
        if self.total_count == 0 {
            return 0.0;
        }
        self.read_count as f64 / self.total_count as f64
    }

    fn record(&mut self, message: &MessageMetadata, hint_labels: &[String]) {
        self.total_count += 1;
        if message.is_read {
            self.read_count += 1;
        } else {
            self.unread_count += 1;
        }

        self.earliest = self.earliest.min(message.received_at);
        self.latest = self.latest.max(message.received_at);
        if message.received_at >= self.latest && message.sender_name != message.sender {
            self.display_name = message.sender_name.clone();
        }

        if hint_labels.iter().any(|label| message.has_label(label)) {
            self.marketing_hint = true;
        }
        self.message_ids.push(message.id.clone());
    }
}

/// The result of folding one feed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Aggregation {
    pub messages: Vec<MessageMetadata>,
    pub senders: BTreeMap<String, SenderStats>,
    pub rejected: Vec<ValidationError>,
    /// Set when the feed stopped before the requested depth.
    pub incomplete: Option<IncompleteFeedError>,
}

impl Aggregation {
    pub fn is_partial(&self) -> bool {
        self.incomplete.is_some()
    }

    pub fn sender(&self, address: &str) -> Option<&SenderStats> {
        self.senders.get(address)
    }

    pub fn total_unread(&self) -> usize {
        self.senders.values().map(|stats| stats.unread_count).sum()
    }

    /// Senders ordered by message count, busiest first.
    pub fn top_senders(&self, limit: usize) -> Vec<&SenderStats> {
        let mut senders = self.senders.values().collect::<Vec<_>>();
        senders.sort_by(|a, b| {
            b.total_count
                .cmp(&a.total_count)
                .then_with(|| a.address.cmp(&b.address))
        });
        senders.truncate(limit);
        senders
    }
}

/// Single-pass fold of message records into sender statistics.
#[derive(Debug)]
pub struct SenderAggregator {
    depth: Option<usize>,
    hint_labels: Vec<String>,
    aggregation: Aggregation,
}

impl SenderAggregator {
    pub fn new(depth: Option<usize>, hint_labels: Vec<String>) -> Self {
        Self {
            depth,
            hint_labels,
            aggregation: Aggregation::default(),
        }
    }

    pub fn is_full(&self) -> bool {
        self.depth
            .is_some_and(|depth| self.aggregation.messages.len() >= depth)
    }

    pub fn scanned(&self) -> usize {
        self.aggregation.messages.len()
    }

    /// Folds one record. Malformed records are kept aside and the fold goes on.
    pub fn accept(&mut self, raw: RawMessage) -> Result<(), ValidationError> {
        if self.is_full() {
            return Ok(());
        }

        let message = match raw.validate() {
            Ok(message) => message,
            Err(err) => {
                warn!("skipping record: {err}");
                self.aggregation.rejected.push(err.clone());
                return Err(err);
            }
        };

        self.aggregation
            .senders
            .entry(message.sender.clone())
            .or_insert_with(|| SenderStats::new(&message))
            .record(&message, &self.hint_labels);
        self.aggregation.messages.push(message);

        let scanned = self.scanned();
        if scanned % PROGRESS_EVERY == 0 {
            info!(scanned, "scan progress");
        }
        Ok(())
    }

    pub fn finish(self) -> Aggregation {
        let aggregation = self.aggregation;
        debug!(
            messages = aggregation.messages.len(),
            senders = aggregation.senders.len(),
            rejected = aggregation.rejected.len(),
            "aggregation complete"
        );
        aggregation
    }

    /// Ends the fold early, keeping what was gathered and tagging it partial.
    pub fn interrupt(self, reason: impl Into<String>) -> Aggregation {
        let reason = reason.into();
        let scanned = self.scanned();
        let depth = self.depth;
        let mut aggregation = self.finish();

        let incomplete = IncompleteFeedError {
            scanned,
            depth,
            reason,
        };
        warn!("{incomplete}; continuing with partial results");
        aggregation.incomplete = Some(incomplete);
        aggregation
    }
}

/// Folds an in-memory record sequence.
pub fn aggregate<I>(records: I, depth: Option<usize>, hint_labels: &[String]) -> Aggregation
where
    I: IntoIterator<Item = Result<RawMessage, FeedError>>,
{
    let mut aggregator = SenderAggregator::new(depth, hint_labels.to_vec());
    for record in records {
        if aggregator.is_full() {
            break;
        }
        match record {
            Ok(raw) => {
                let _ = aggregator.accept(raw);
            }
            Err(err) => return aggregator.interrupt(err.to_string()),
        }
    }
    aggregator.finish()
}

/// Drains a feed up to `depth` records.
///
/// A fatal feed error is returned only when nothing was gathered yet.
pub async fn collect_feed<F>(
    feed: &mut F,
    depth: Option<usize>,
    hint_labels: &[String],
) -> Result<Aggregation, AppError>
where
    F: MessageFeed + ?Sized,
{
    let mut aggregator = SenderAggregator::new(depth, hint_labels.to_vec());
    while !aggregator.is_full() {
        match feed.next_record().await {
            Some(Ok(raw)) => {
                let _ = aggregator.accept(raw);
            }
            Some(Err(FeedError::Fatal(err))) if aggregator.scanned() == 0 => {
                return Err(err);
            }
            Some(Err(err)) => return Ok(aggregator.interrupt(err.to_string())),
            None => break,
        }
    }
    Ok(aggregator.finish())
}

#[cfg(test)]
mod tests {
    use chrono::{Datelike, Duration, TimeZone};

    use super::*;
    use crate::engine::feed::IterFeed;

    fn message(id: &str, from: &str, read: bool, day: u32) -> RawMessage {
        RawMessage {
            id: id.to_string(),
            from: Some(from.to_string()),
            received_at: Some(Utc.with_ymd_and_hms(2026, 3, day, 12, 0, 0).unwrap()),
            is_read: read,
            ..RawMessage::default()
        }
    }

    fn promo_labels() -> Vec<String> {
        vec!["CATEGORY_PROMOTIONS".to_string()]
    }

    #[test]
    fn read_and_unread_counts_sum_to_total() {
        let records = vec![
            Ok(message("1", "a@x.com", true, 1)),
            Ok(message("2", "A <A@x.com>", false, 2)),
            Ok(message("3", "a@x.com", false, 3)),
            Ok(message("4", "b@y.com", true, 4)),
        ];

        let aggregation = aggregate(records, None, &promo_labels());

        assert_eq!(aggregation.senders.len(), 2);
        for stats in aggregation.senders.values() {
            assert_eq!(stats.read_count + stats.unread_count, stats.total_count);
        }
        let a = aggregation.sender("a@x.com").expect("sender a");
        assert_eq!(a.total_count, 3);
        assert_eq!(a.read_count, 1);
        assert_eq!(a.earliest.day(), 1);
        assert_eq!(a.latest.day(), 3);
    }

    #[test]
    fn read_rate_of_empty_sender_is_zero() {
        let records = vec![Ok(message("1", "a@x.com", true, 1))];
        let aggregation = aggregate(records, None, &[]);
        let mut stats = aggregation.sender("a@x.com").expect("sender").clone();
        stats.total_count = 0;
        stats.read_count = 0;
        assert_eq!(stats.read_rate(), 0.0);
    }

    #[test]
    fn marks_marketing_hint_from_labels() {
        let mut promo = message("1", "deals@shop.com", false, 1);
        promo.labels = vec!["category_promotions".to_string()];
        let records = vec![Ok(promo), Ok(message("2", "friend@home.org", false, 1))];

        let aggregation = aggregate(records, None, &promo_labels());

        assert!(aggregation.sender("deals@shop.com").expect("deals").marketing_hint);
        assert!(!aggregation.sender("friend@home.org").expect("friend").marketing_hint);
    }

    #[test]
    fn rejects_malformed_records_and_keeps_going() {
        let mut broken = message("2", "a@x.com", false, 1);
        broken.received_at = None;
        let records = vec![
            Ok(message("1", "a@x.com", false, 1)),
            Ok(broken),
            Ok(message("3", "a@x.com", false, 2)),
        ];

        let aggregation = aggregate(records, None, &[]);

        assert_eq!(aggregation.messages.len(), 2);
        assert_eq!(aggregation.rejected.len(), 1);
        assert_eq!(aggregation.rejected[0].field, "received_at");
        assert!(!aggregation.is_partial());
    }

    #[test]
    fn stops_at_scan_depth() {
        let records = (0..10).map(|i| Ok(message(&i.to_string(), "a@x.com", false, 1)));
        let aggregation = aggregate(records, Some(4), &[]);
        assert_eq!(aggregation.messages.len(), 4);
        assert!(!aggregation.is_partial());
    }

    #[test]
    fn interrupted_feed_returns_partial_stats() {
        let records = vec![
            Ok(message("1", "a@x.com", false, 1)),
            Ok(message("2", "a@x.com", true, 2)),
            Err(FeedError::Interrupted("rate limited".to_string())),
            Ok(message("3", "a@x.com", true, 3)),
        ];

        let aggregation = aggregate(records, Some(100), &[]);

        assert!(aggregation.is_partial());
        let incomplete = aggregation.incomplete.as_ref().expect("tagged partial");
        assert_eq!(incomplete.scanned, 2);
        assert_eq!(incomplete.depth, Some(100));
        assert_eq!(aggregation.sender("a@x.com").expect("a").total_count, 2);
    }

    #[test]
    fn keeps_latest_display_name() {
        let mut older = message("1", "Old Name <a@x.com>", false, 1);
        older.received_at = older.received_at.map(|at| at - Duration::days(1));
        let records = vec![
            Ok(message("2", "New Name <a@x.com>", false, 5)),
            Ok(older),
        ];

        let aggregation = aggregate(records, None, &[]);
        assert_eq!(
            aggregation.sender("a@x.com").expect("a").display_name,
            "New Name"
        );
    }

    #[tokio::test]
    async fn fatal_error_before_any_record_is_returned() {
        let mut feed = IterFeed::new(
            vec![Err(FeedError::Fatal(crate::error::AppError::Auth(
                "token refused".to_string(),
            )))]
            .into_iter(),
        );

        let result = collect_feed(&mut feed, None, &[]).await;
        assert!(matches!(result, Err(AppError::Auth(_))));
    }

    #[tokio::test]
    async fn fatal_error_after_records_degrades_to_partial() {
        let mut feed = IterFeed::new(
            vec![
                Ok(message("1", "a@x.com", false, 1)),
                Err(FeedError::Fatal(crate::error::AppError::Auth(
                    "token expired".to_string(),
                ))),
            ]
            .into_iter(),
        );

        let aggregation = collect_feed(&mut feed, Some(10), &[])
            .await
            .expect("partial result");
        assert!(aggregation.is_partial());
        assert_eq!(aggregation.messages.len(), 1);
    }
}
