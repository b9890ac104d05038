//! Declarative marketing rule table.
//!
//! The table is plain data loaded from profile settings, so the lists can be
//! edited without touching the classifier. Matching is case-insensitive.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::message::MessageMetadata;

const DEFAULT_SENDER_PATTERNS: &[&str] = &[
    "noreply",
    "no-reply",
    "donotreply",
    "do-not-reply",
    "newsletter",
    "marketing",
    "promo",
    "offers",
    "deals",
    "news@",
    "info@",
    "hello@",
    "support@",
    "team@",
    "updates@",
    "notifications@",
    "alert@",
    "mailer",
    "campaign",
    "bulk",
];

const DEFAULT_DOMAINS: &[&str] = &[
    "linkedin.com",
    "facebookmail.com",
    "twitter.com",
    "pinterest.com",
    "quora.com",
    "medium.com",
    "substack.com",
    "mailchimp.com",
    "sendgrid.net",
    "amazonses.com",
    "constantcontact.com",
    "hubspot.com",
    "salesforce.com",
    "marketo.com",
    "pardot.com",
    "groupon.com",
    "retailmenot.com",
    "slickdeals.net",
    "wish.com",
    "aliexpress.com",
    "banggood.com",
    "shein.com",
    "spotify.com",
    "netflix.com",
    "hulu.com",
    "discord.com",
    "uber.com",
    "lyft.com",
    "doordash.com",
    "grubhub.com",
    "yelp.com",
    "tripadvisor.com",
    "booking.com",
    "expedia.com",
    "youtube.com",
    "tiktok.com",
    "instagram.com",
    "snapchat.com",
];

const DEFAULT_LABEL_HINTS: &[&str] = &["CATEGORY_PROMOTIONS", "CATEGORY_SOCIAL"];

const DEFAULT_CONTENT_MARKERS: &[&str] = &[
    "unsubscribe",
    "view in browser",
    "view online",
    "manage preferences",
    "email preferences",
    "manage subscriptions",
    "update your preferences",
];

const DEFAULT_CONTENT_KEYWORDS: &[&str] = &[
    "opt-out",
    "opt out",
    "click here",
    "limited time",
    "act now",
    "don't miss",
    "exclusive offer",
    "special offer",
    "discount",
    "sale",
    "free shipping",
    "order now",
    "buy now",
    "shop now",
    "deal",
    "promo",
    "newsletter",
    "weekly digest",
    "daily digest",
    "notification settings",
    "email settings",
];

const DEFAULT_CONTENT_KEYWORD_THRESHOLD: usize = 3;

fn owned(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| (*value).to_string()).collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketingRules {
    /// Prefixes of the address local part. A trailing `@` requires the
    /// whole local part to match, so `team@` skips `teamlead@`.
    pub sender_patterns: Vec<String>,
    /// Matched against the sender domain and its parents.
    pub domains: Vec<String>,
    /// Provider labels that already mark a message as promotional.
    pub label_hints: Vec<String>,
    /// Phrases in subject or snippet that flag a message on their own.
    pub content_markers: Vec<String>,
    /// Weaker phrases; flag once `content_keyword_threshold` distinct ones appear.
    pub content_keywords: Vec<String>,
    pub content_keyword_threshold: usize,
}

impl Default for MarketingRules {
    fn default() -> Self {
        Self {
            sender_patterns: owned(DEFAULT_SENDER_PATTERNS),
            domains: owned(DEFAULT_DOMAINS),
            label_hints: owned(DEFAULT_LABEL_HINTS),
            content_markers: owned(DEFAULT_CONTENT_MARKERS),
            content_keywords: owned(DEFAULT_CONTENT_KEYWORDS),
            content_keyword_threshold: DEFAULT_CONTENT_KEYWORD_THRESHOLD,
        }
    }
}

/// The signal that made a message count as marketing.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum MarketingSignal {
    LabelHint(String),
    SenderPattern(String),
    KnownDomain(String),
    ContentMarker(String),
    ContentKeywords(usize),
}

impl fmt::Display for MarketingSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LabelHint(label) => write!(f, "provider label {label}"),
            Self::SenderPattern(pattern) => write!(f, "sender pattern `{pattern}`"),
            Self::KnownDomain(domain) => write!(f, "known marketing domain {domain}"),
            Self::ContentMarker(marker) => write!(f, "contains `{marker}`"),
            Self::ContentKeywords(count) => write!(f, "{count} marketing keywords"),
        }
    }
}

impl MarketingRules {
    /// Evaluates sender and label signals first; content is only read when
    /// none of them fire.
    pub fn evaluate(&self, message: &MessageMetadata) -> Option<MarketingSignal> {
        self.sender_signal(message)
            .or_else(|| self.content_signal(&message.subject, &message.snippet))
    }

    pub fn sender_signal(&self, message: &MessageMetadata) -> Option<MarketingSignal> {
        if let Some(label) = self
            .label_hints
            .iter()
            .find(|label| message.has_label(label))
        {
            return Some(MarketingSignal::LabelHint(label.clone()));
        }

        if let Some(pattern) = self.matching_sender_pattern(message.sender_local_part()) {
            return Some(MarketingSignal::SenderPattern(pattern.to_string()));
        }

        self.matching_domain(message.sender_domain())
            .map(|domain| MarketingSignal::KnownDomain(domain.to_string()))
    }

    pub fn content_signal(&self, subject: &str, snippet: &str) -> Option<MarketingSignal> {
        let snippet = html_escape::decode_html_entities(snippet);
        let text = format!("{subject} {snippet}").to_lowercase();

        if let Some(marker) = self
            .content_markers
            .iter()
            .find(|marker| text.contains(&marker.to_lowercase()))
        {
            return Some(MarketingSignal::ContentMarker(marker.clone()));
        }

        let hits = self
            .content_keywords
            .iter()
            .filter(|keyword| text.contains(&keyword.to_lowercase()))
            .count();
        if self.content_keyword_threshold > 0 && hits >= self.content_keyword_threshold {
            return Some(MarketingSignal::ContentKeywords(hits));
        }

        None
    }

    fn matching_sender_pattern(&self, local_part: &str) -> Option<&str> {
        let local_part = local_part.to_lowercase();
        self.sender_patterns
            .iter()
            .map(|pattern| pattern.trim())
            .filter(|pattern| !pattern.is_empty())
            .find(|pattern| {
                let pattern = pattern.to_lowercase();
                match pattern.strip_suffix('@') {
                    Some(exact) => local_part == exact,
                    None => local_part.starts_with(&pattern),
                }
            })
    }

    fn matching_domain(&self, domain: &str) -> Option<&str> {
        let domain = domain.to_lowercase();
        self.domains
            .iter()
            .map(|known| known.trim())
            .filter(|known| !known.is_empty())
            .find(|known| {
                let known = known.to_lowercase();
                domain == known || domain.ends_with(&format!(".{known}"))
            })
    }
}
