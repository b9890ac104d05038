use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::aggregate::{Aggregation, SenderStats};
use super::message::MessageMetadata;
use super::rules::{MarketingRules, MarketingSignal};

pub const DEFAULT_NEVER_OPENED: usize = 5;
pub const DEFAULT_RARELY_OPENED_RATE: f64 = 0.20;
pub const DEFAULT_BULK_SENDER: usize = 20;
pub const DEFAULT_OLD_EMAIL_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Minimum message count for a sender with zero reads to count as never opened.
    pub never_opened: usize,
    /// Read rate strictly below which a sender counts as rarely opened.
    pub rarely_opened_rate: f64,
    pub bulk_sender: usize,
    /// Unread messages strictly older than this many days are old.
    pub old_email_days: i64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            never_opened: DEFAULT_NEVER_OPENED,
            rarely_opened_rate: DEFAULT_RARELY_OPENED_RATE,
            bulk_sender: DEFAULT_BULK_SENDER,
            old_email_days: DEFAULT_OLD_EMAIL_DAYS,
        }
    }
}

#[derive(
    Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Marketing,
    NeverOpened,
    RarelyOpened,
    OldUnread,
    BulkSender,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Marketing,
        Category::NeverOpened,
        Category::RarelyOpened,
        Category::OldUnread,
        Category::BulkSender,
    ];

    pub fn title(self) -> &'static str {
        match self {
            Self::Marketing => "MARKETING & NEWSLETTERS",
            Self::NeverOpened => "NEVER OPENED",
            Self::RarelyOpened => "RARELY OPENED",
            Self::OldUnread => "OLD UNREAD",
            Self::BulkSender => "BULK SENDERS",
        }
    }

    pub fn describe(self, thresholds: &Thresholds) -> String {
        match self {
            Self::Marketing => {
                "promotional labels, marketing senders, or unsubscribe-style content".to_string()
            }
            Self::NeverOpened => format!(
                "senders with {}+ messages you have never opened",
                thresholds.never_opened
            ),
            Self::RarelyOpened => format!(
                "senders you read less than {:.0}% of the time",
                thresholds.rarely_opened_rate * 100.0
            ),
            Self::OldUnread => format!(
                "unread messages older than {} days",
                thresholds.old_email_days
            ),
            Self::BulkSender => format!(
                "senders with {}+ messages in the scan",
                thresholds.bulk_sender
            ),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Marketing => "marketing",
            Self::NeverOpened => "never-opened",
            Self::RarelyOpened => "rarely-opened",
            Self::OldUnread => "old-unread",
            Self::BulkSender => "bulk-sender",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct CategoryAssignment {
    pub message_id: String,
    pub category: Category,
    pub sender: String,
}

/// One category's view: which messages and which senders it touches.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CategoryGroup {
    pub message_ids: Vec<String>,
    pub senders: Vec<String>,
    /// Per sender, the flagged message ids in this category.
    #[serde(skip)]
    pub by_sender: BTreeMap<String, Vec<String>>,
}

impl CategoryGroup {
    fn add(&mut self, sender: &str, message_id: &str) {
        let ids = self.by_sender.entry(sender.to_string()).or_default();
        if !ids.iter().any(|id| id == message_id) {
            ids.push(message_id.to_string());
        }
    }

    fn seal(&mut self) {
        let mut seen = BTreeSet::new();
        self.message_ids = self
            .by_sender
            .values()
            .flatten()
            .filter(|id| seen.insert(id.as_str()))
            .cloned()
            .collect();

        let mut senders = self
            .by_sender
            .iter()
            .map(|(sender, ids)| (sender.clone(), ids.len()))
            .collect::<Vec<_>>();
        senders.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        self.senders = senders.into_iter().map(|(sender, _)| sender).collect();
    }

    pub fn message_count(&self) -> usize {
        self.message_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.message_ids.is_empty()
    }

    pub fn sender_message_ids(&self, sender: &str) -> &[String] {
        self.by_sender
            .get(sender)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Classification {
    pub assignments: Vec<CategoryAssignment>,
    pub categories: BTreeMap<Category, CategoryGroup>,
    /// Why each marketing message was flagged.
    pub marketing_signals: BTreeMap<String, MarketingSignal>,
}

impl Classification {
    pub fn group(&self, category: Category) -> Option<&CategoryGroup> {
        self.categories.get(&category)
    }

    pub fn non_empty(&self) -> impl Iterator<Item = (Category, &CategoryGroup)> {
        self.categories
            .iter()
            .filter(|(_, group)| !group.is_empty())
            .map(|(category, group)| (*category, group))
    }

    /// Distinct flagged messages across every category.
    pub fn flagged_message_ids(&self) -> BTreeSet<&str> {
        self.categories
            .values()
            .flat_map(|group| group.message_ids.iter().map(String::as_str))
            .collect()
    }

    /// Every category the sender was flagged under.
    pub fn categories_for_sender(&self, sender: &str) -> Vec<Category> {
        self.categories
            .iter()
            .filter(|(_, group)| group.by_sender.contains_key(sender))
            .map(|(category, _)| *category)
            .collect()
    }
}

/// Applies the category rules to one aggregated scan.
#[derive(Debug, Clone)]
pub struct Classifier {
    thresholds: Thresholds,
    rules: MarketingRules,
}

impl Classifier {
    pub fn new(thresholds: Thresholds, rules: MarketingRules) -> Self {
        Self { thresholds, rules }
    }

    pub fn is_never_opened(&self, stats: &SenderStats) -> bool {
        stats.total_count >= self.thresholds.never_opened && stats.read_count == 0
    }

    /// Never-opened senders take precedence and are excluded here.
    pub fn is_rarely_opened(&self, stats: &SenderStats) -> bool {
        stats.total_count > 0
            && stats.read_rate() < self.thresholds.rarely_opened_rate
            && !self.is_never_opened(stats)
    }

    pub fn is_bulk_sender(&self, stats: &SenderStats) -> bool {
        stats.total_count >= self.thresholds.bulk_sender
    }

    /// An age threshold too large to represent never matches.
    pub fn is_old_unread(&self, message: &MessageMetadata, now: DateTime<Utc>) -> bool {
        let Some(max_age) = Duration::try_days(self.thresholds.old_email_days) else {
            return false;
        };
        !message.is_read && now.signed_duration_since(message.received_at) > max_age
    }

    pub fn sender_categories(&self, stats: &SenderStats) -> Vec<Category> {
        let mut categories = Vec::new();
        if self.is_never_opened(stats) {
            categories.push(Category::NeverOpened);
        } else if self.is_rarely_opened(stats) {
            categories.push(Category::RarelyOpened);
        }
        if self.is_bulk_sender(stats) {
            categories.push(Category::BulkSender);
        }
        categories
    }

    pub fn classify(&self, aggregation: &Aggregation, now: DateTime<Utc>) -> Classification {
        let mut classification = Classification::default();
        let mut groups: BTreeMap<Category, CategoryGroup> = Category::ALL
            .into_iter()
            .map(|category| (category, CategoryGroup::default()))
            .collect();

        let sender_categories = aggregation
            .senders
            .iter()
            .map(|(address, stats)| (address.as_str(), self.sender_categories(stats)))
            .collect::<BTreeMap<_, _>>();

        for message in &aggregation.messages {
            let mut matched = Vec::new();

            if let Some(signal) = self.rules.evaluate(message) {
                classification
                    .marketing_signals
                    .insert(message.id.clone(), signal);
                matched.push(Category::Marketing);
            }
            if let Some(categories) = sender_categories.get(message.sender.as_str()) {
                matched.extend(categories.iter().copied());
            }
            if self.is_old_unread(message, now) {
                matched.push(Category::OldUnread);
            }

            matched.sort();
            matched.dedup();
            for category in matched {
                if let Some(group) = groups.get_mut(&category) {
                    group.add(&message.sender, &message.id);
                }
                classification.assignments.push(CategoryAssignment {
                    message_id: message.id.clone(),
                    category,
                    sender: message.sender.clone(),
                });
            }
        }

        for (category, group) in &mut groups {
            group.seal();
            debug!(
                category = %category,
                messages = group.message_ids.len(),
                senders = group.senders.len(),
                "classified"
            );
        }
        classification.categories = groups;
        classification
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(Thresholds::default(), MarketingRules::default())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::engine::aggregate::aggregate;
    use crate::engine::message::RawMessage;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap()
    }

    fn raw(id: &str, from: &str, read: bool, age: Duration) -> RawMessage {
        RawMessage {
            id: id.to_string(),
            from: Some(from.to_string()),
            received_at: Some(now() - age),
            is_read: read,
            ..RawMessage::default()
        }
    }

    fn sender_messages(from: &str, total: usize, read: usize) -> Vec<RawMessage> {
        (0..total)
            .map(|i| raw(&format!("{from}-{i}"), from, i < read, Duration::days(1)))
            .collect()
    }

    fn classify(records: Vec<RawMessage>, thresholds: Thresholds) -> Classification {
        let aggregation = aggregate(records.into_iter().map(Ok), None, &[]);
        Classifier::new(thresholds, MarketingRules::default()).classify(&aggregation, now())
    }

    fn senders(classification: &Classification, category: Category) -> Vec<String> {
        classification
            .group(category)
            .map(|group| group.senders.clone())
            .unwrap_or_default()
    }

    #[test]
    fn never_opened_boundary_at_threshold() {
        let mut records = sender_messages("carol@example.org", 5, 0);
        records.extend(sender_messages("dave@example.org", 4, 0));

        let result = classify(records, Thresholds::default());
        assert_eq!(
            senders(&result, Category::NeverOpened),
            ["carol@example.org"]
        );
    }

    #[test]
    fn never_opened_threshold_is_injected() {
        let records = sender_messages("dave@example.org", 4, 0);
        let thresholds = Thresholds {
            never_opened: 4,
            ..Thresholds::default()
        };

        let result = classify(records, thresholds);
        assert_eq!(senders(&result, Category::NeverOpened), ["dave@example.org"]);
    }

    #[test]
    fn never_opened_sender_is_not_also_rarely_opened() {
        let mut records = sender_messages("carol@example.org", 6, 0);
        records.extend(sender_messages("erin@example.org", 10, 1));
        records.extend(sender_messages("frank@example.org", 3, 0));

        let result = classify(records, Thresholds::default());

        assert_eq!(senders(&result, Category::NeverOpened), ["carol@example.org"]);
        let rarely = senders(&result, Category::RarelyOpened);
        assert!(!rarely.contains(&"carol@example.org".to_string()));
        assert!(rarely.contains(&"erin@example.org".to_string()));
        assert!(rarely.contains(&"frank@example.org".to_string()));
    }

    #[test]
    fn read_rate_at_threshold_is_not_rarely_opened() {
        let records = sender_messages("gina@example.org", 5, 1);
        let result = classify(records, Thresholds::default());
        assert!(senders(&result, Category::RarelyOpened).is_empty());
    }

    #[test]
    fn old_unread_uses_strict_inequality() {
        let records = vec![
            raw("old", "hank@example.org", false, Duration::days(31)),
            raw("edge", "hank@example.org", false, Duration::days(30)),
            raw("old-read", "hank@example.org", true, Duration::days(90)),
        ];

        let result = classify(records, Thresholds::default());
        let group = result.group(Category::OldUnread).expect("group");
        assert_eq!(group.message_ids, ["old"]);
    }

    #[test]
    fn unrepresentable_age_threshold_flags_nothing_old() {
        let records = vec![raw("ancient", "hank@example.org", false, Duration::days(3_650))];
        let thresholds = Thresholds {
            old_email_days: 200_000_000_000,
            ..Thresholds::default()
        };

        let result = classify(records, thresholds);
        assert!(result.group(Category::OldUnread).expect("group").is_empty());
    }

    #[test]
    fn bulk_sender_ignores_read_rate() {
        let records = sender_messages("ivy@example.org", 20, 20);
        let result = classify(records, Thresholds::default());
        assert_eq!(senders(&result, Category::BulkSender), ["ivy@example.org"]);
        assert_eq!(
            result.group(Category::BulkSender).expect("bulk").message_count(),
            20
        );
    }

    #[test]
    fn message_may_hold_several_categories() {
        let records = sender_messages("news@shop.com", 6, 0);
        let result = classify(records, Thresholds::default());

        let first = result
            .assignments
            .iter()
            .filter(|assignment| assignment.message_id == "news@shop.com-0")
            .map(|assignment| assignment.category)
            .collect::<Vec<_>>();
        assert_eq!(first, [Category::Marketing, Category::NeverOpened]);
        assert_eq!(result.flagged_message_ids().len(), 6);
        assert_eq!(
            result.categories_for_sender("news@shop.com"),
            [Category::Marketing, Category::NeverOpened]
        );
    }

    #[test]
    fn marketing_reason_is_recorded() {
        let records = sender_messages("news@shop.com", 1, 1);
        let result = classify(records, Thresholds::default());
        assert_eq!(
            result.marketing_signals.get("news@shop.com-0"),
            Some(&MarketingSignal::SenderPattern("news@".to_string()))
        );
    }

    #[test]
    fn senders_sorted_by_volume() {
        let mut records = sender_messages("a@example.org", 5, 0);
        records.extend(sender_messages("b@example.org", 7, 0));

        let result = classify(records, Thresholds::default());
        assert_eq!(
            senders(&result, Category::NeverOpened),
            ["b@example.org", "a@example.org"]
        );
    }

    #[test]
    fn empty_scan_classifies_to_empty_groups() {
        let result = Classifier::default().classify(&Aggregation::default(), now());
        assert!(result.assignments.is_empty());
        assert_eq!(result.non_empty().count(), 0);
        assert_eq!(result.categories.len(), Category::ALL.len());
    }
}
