use async_trait::async_trait;

use crate::engine::batch::{ActionError, BatchResponse, MAX_BATCH_SIZE, TrashStore};

use super::client::GmailClient;

/// Moves messages to the Gmail trash through `messages.batchModify`.
///
/// A batch call is all-or-nothing, so failures always apply to the whole batch.
pub struct GmailTrashStore {
    client: GmailClient,
    access_token: String,
}

impl GmailTrashStore {
    pub fn new(client: GmailClient, access_token: impl Into<String>) -> Self {
        Self {
            client,
            access_token: access_token.into(),
        }
    }
}

#[async_trait]
impl TrashStore for GmailTrashStore {
    fn max_batch_size(&self) -> usize {
        MAX_BATCH_SIZE
    }

    async fn move_to_trash(&self, ids: &[String]) -> Result<BatchResponse, ActionError> {
        self.client.batch_trash(ids, &self.access_token).await?;
        Ok(BatchResponse::all_succeeded(ids))
    }
}
