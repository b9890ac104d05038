//! Provider-independent cleanup core.
//!
//! Feed → aggregate → classify → select → batch trash.

pub mod aggregate;
pub mod batch;
pub mod classify;
pub mod feed;
pub mod message;
pub mod rules;
pub mod selection;

pub use aggregate::{Aggregation, SenderAggregator, SenderStats};
pub use batch::{BatchCoordinator, BatchOutcome, BatchPolicy, TrashStore};
pub use classify::{Category, Classification, Classifier, Thresholds};
pub use feed::{FeedError, MessageFeed, ScanDepth};
pub use message::{MessageMetadata, RawMessage};
pub use rules::MarketingRules;
pub use selection::{Selection, SelectionSet};
