use serde::Serialize;

/// One page of message ids from the mailbox listing.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MessagePage {
    pub ids: Vec<String>,
    pub next_page_token: Option<String>,
}

/// Labels applied and removed by the trash move.
pub const TRASH_ADD_LABELS: &[&str] = &["TRASH"];
pub const TRASH_REMOVE_LABELS: &[&str] = &["INBOX"];
pub const UNREAD_LABEL: &str = "UNREAD";
