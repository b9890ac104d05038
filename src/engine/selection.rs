use std::collections::BTreeSet;

use serde::Serialize;

use super::classify::{Category, Classification};
use super::message::normalize_address;

/// What the reviewer picked. Parts are unioned.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub categories: Vec<Category>,
    pub senders: Vec<String>,
    pub all_flagged: bool,
}

impl Selection {
    pub fn all() -> Self {
        Self {
            all_flagged: true,
            ..Self::default()
        }
    }

    pub fn category(category: Category) -> Self {
        Self {
            categories: vec![category],
            ..Self::default()
        }
    }

    pub fn sender(address: impl Into<String>) -> Self {
        Self {
            senders: vec![address.into()],
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.all_flagged && self.categories.is_empty() && self.senders.is_empty()
    }

    /// Resolves to the distinct message ids to act on.
    ///
    /// A sender pulls in its flagged messages from every category it appears
    /// under. Unknown senders and empty categories contribute nothing.
    pub fn resolve(&self, classification: &Classification) -> SelectionSet {
        let mut ids = BTreeSet::new();

        if self.all_flagged {
            ids.extend(
                classification
                    .flagged_message_ids()
                    .into_iter()
                    .map(ToOwned::to_owned),
            );
        }

        for category in &self.categories {
            if let Some(group) = classification.group(*category) {
                ids.extend(group.message_ids.iter().cloned());
            }
        }

        for sender in &self.senders {
            let Some(address) = normalize_address(sender) else {
                continue;
            };
            for group in classification.categories.values() {
                ids.extend(group.sender_message_ids(&address).iter().cloned());
            }
        }

        SelectionSet { ids }
    }
}

/// Distinct message ids chosen for one cleanup run.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize)]
#[serde(transparent)]
pub struct SelectionSet {
    ids: BTreeSet<String>,
}

impl SelectionSet {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn into_vec(self) -> Vec<String> {
        self.ids.into_iter().collect()
    }
}

impl FromIterator<String> for SelectionSet {
    fn from_iter<T: IntoIterator<Item = String>>(iter: T) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}
