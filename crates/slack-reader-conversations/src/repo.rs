use async_trait::async_trait;

use crate::domain::{ConversationListing, LimitSpec, MessageResult, Record};
use crate::error::RepoResult;

#[async_trait]
pub trait ConversationRepository: Send + Sync {
    async fn resolve_reference(&self, input: &str) -> RepoResult<String>;

    async fn resolve_channel(&self, input: &str) -> RepoResult<String>;

    async fn resolve_user(&self, input: &str) -> RepoResult<String>;

    async fn channel_history(&self, channel_id: &str, limit: LimitSpec)
        -> RepoResult<Vec<Record>>;

    async fn thread(
        &self,
        channel_id: &str,
        root_ts: &str,
        limit: LimitSpec,
    ) -> RepoResult<Vec<Record>>;

    async fn message(&self, channel_id: &str, ts: &str) -> RepoResult<MessageResult>;

    async fn list_user_conversations(
        &self,
        user: Option<&str>,
        limit: i64,
        cursor: Option<&str>,
    ) -> RepoResult<ConversationListing>;

    async fn list_all_conversations(
        &self,
        limit: i64,
        cursor: Option<&str>,
    ) -> RepoResult<ConversationListing>;

    async fn auth_test(&self) -> RepoResult<Record>;
}
