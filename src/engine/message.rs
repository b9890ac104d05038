use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

/// A record as the feed yields it, before any checks.
#[derive(Debug, Clone, Default)]
pub struct RawMessage {
    pub id: String,
    pub from: Option<String>,
    pub subject: Option<String>,
    pub snippet: Option<String>,
    pub received_at: Option<DateTime<Utc>>,
    pub is_read: bool,
    pub labels: Vec<String>,
    pub size_estimate: Option<i64>,
}

/// One validated message. Read-only downstream of the aggregator.
#[derive(Debug, Clone, Serialize)]
pub struct MessageMetadata {
    pub id: String,
    pub sender: String,
    pub sender_name: String,
    pub subject: String,
    pub snippet: String,
    pub received_at: DateTime<Utc>,
    pub is_read: bool,
    pub labels: Vec<String>,
    pub size: Option<u64>,
}

impl MessageMetadata {
    pub fn has_label(&self, label: &str) -> bool {
        self.labels
            .iter()
            .any(|candidate| candidate.eq_ignore_ascii_case(label))
    }

    pub fn sender_local_part(&self) -> &str {
        self.sender
            .split_once('@')
            .map(|(local, _)| local)
            .unwrap_or(&self.sender)
    }

    pub fn sender_domain(&self) -> &str {
        self.sender
            .rsplit_once('@')
            .map(|(_, domain)| domain)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
#[error("invalid message {}: field `{field}` {reason}", .message_id.as_deref().unwrap_or("(no id)"))]
pub struct ValidationError {
    pub message_id: Option<String>,
    pub field: &'static str,
    pub reason: String,
}

impl ValidationError {
    fn new(message_id: &str, field: &'static str, reason: impl Into<String>) -> Self {
        let message_id = Some(message_id.trim())
            .filter(|id| !id.is_empty())
            .map(ToOwned::to_owned);
        Self {
            message_id,
            field,
            reason: reason.into(),
        }
    }
}

impl RawMessage {
    pub fn validate(self) -> Result<MessageMetadata, ValidationError> {
        let id = self.id.trim().to_string();
        if id.is_empty() {
            return Err(ValidationError::new(&id, "id", "is empty"));
        }

        let from = self
            .from
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| ValidationError::new(&id, "from", "is missing"))?;
        let (sender, sender_name) = parse_sender(from)
            .ok_or_else(|| ValidationError::new(&id, "from", format!("has no address: `{from}`")))?;

        let received_at = self
            .received_at
            .ok_or_else(|| ValidationError::new(&id, "received_at", "is missing"))?;

        let size = match self.size_estimate {
            Some(size) if size < 0 => {
                return Err(ValidationError::new(
                    &id,
                    "size",
                    format!("is negative ({size})"),
                ));
            }
            Some(size) => Some(size as u64),
            None => None,
        };

        Ok(MessageMetadata {
            id,
            sender,
            sender_name,
            subject: self.subject.unwrap_or_default(),
            snippet: self.snippet.unwrap_or_default(),
            received_at,
            is_read: self.is_read,
            labels: self.labels,
            size,
        })
    }
}

/// Splits a `From` header into a normalized address and a display name.
///
/// `"News" <News@Shop.com>` and `news@shop.com` both yield `news@shop.com`.
/// The display name falls back to the address when absent.
pub fn parse_sender(header: &str) -> Option<(String, String)> {
    let header = header.trim();

    if let Some(start) = header.rfind('<') {
        let end = header[start..].find('>')? + start;
        let address = normalize_address(&header[start + 1..end])?;
        let name = header[..start].trim().trim_matches('"').trim();
        let name = if name.is_empty() {
            address.clone()
        } else {
            name.to_string()
        };
        return Some((address, name));
    }

    let address = normalize_address(header)?;
    Some((address.clone(), address))
}

pub fn normalize_address(raw: &str) -> Option<String> {
    let address = raw
        .trim()
        .trim_start_matches('<')
        .trim_end_matches('>')
        .trim()
        .to_lowercase();
    let (local, domain) = address.split_once('@')?;
    if local.is_empty() || domain.is_empty() || address.contains(char::is_whitespace) {
        return None;
    }
    Some(address)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn raw(id: &str, from: &str) -> RawMessage {
        RawMessage {
            id: id.to_string(),
            from: Some(from.to_string()),
            received_at: Some(Utc.with_ymd_and_hms(2026, 1, 5, 9, 0, 0).unwrap()),
            ..RawMessage::default()
        }
    }

    #[test]
    fn decorated_and_bare_addresses_normalize_together() {
        let decorated = parse_sender("\"Newsletter\" <News@X.com>").expect("parse");
        let bare = parse_sender("news@x.com").expect("parse");

        assert_eq!(decorated.0, "news@x.com");
        assert_eq!(decorated.1, "Newsletter");
        assert_eq!(bare.0, decorated.0);
        assert_eq!(bare.1, "news@x.com");
    }

    #[test]
    fn header_without_address_is_rejected() {
        assert!(parse_sender("Mail Delivery Subsystem").is_none());
        assert!(parse_sender("<>").is_none());
    }

    #[test]
    fn validation_names_missing_timestamp() {
        let mut message = raw("m1", "a@b.com");
        message.received_at = None;

        let err = message.validate().expect_err("should reject");
        assert_eq!(err.field, "received_at");
        assert_eq!(err.message_id.as_deref(), Some("m1"));
    }

    #[test]
    fn validation_rejects_negative_size() {
        let mut message = raw("m2", "a@b.com");
        message.size_estimate = Some(-4);

        let err = message.validate().expect_err("should reject");
        assert_eq!(err.field, "size");
    }

    #[test]
    fn validation_rejects_blank_id() {
        let err = raw("  ", "a@b.com").validate().expect_err("should reject");
        assert_eq!(err.field, "id");
        assert!(err.message_id.is_none());
    }

    #[test]
    fn splits_local_part_and_domain() {
        let message = raw("m3", "Promo <promo-team@mail.shop.com>")
            .validate()
            .expect("valid");
        assert_eq!(message.sender_local_part(), "promo-team");
        assert_eq!(message.sender_domain(), "mail.shop.com");
    }
}
