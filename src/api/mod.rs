//! Gmail REST collaborator: mailbox feed and trash store.

pub mod client;
pub mod feed;
pub mod messages;
pub mod models;
pub mod store;

pub use client::{ApiError, ApiErrorKind, GmailClient};
pub use feed::GmailFeed;
pub use store::GmailTrashStore;
