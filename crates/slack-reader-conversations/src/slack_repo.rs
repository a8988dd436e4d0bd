use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use slack_reader_client::{Params, SlackApi};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::domain::{
    ConversationListing, LimitSpec, MessageResult, PageRequest, Record, RepoConfig, ThreadSummary,
};
use crate::error::{RepoError, RepoResult};
use crate::limit::LimitPolicy;
use crate::paginate::{into_page, Aggregator, ListEndpoint, PageSizing};
use crate::repo::ConversationRepository;
use crate::resolve::{ReferenceKind, ReferenceResolver};
use crate::timestamp::{normalize_timestamp, sort_chronologically};

const HISTORY_METHOD: &str = "conversations.history";
const REPLIES_METHOD: &str = "conversations.replies";
const LIST_TYPES: &str = "public_channel,private_channel,im,mpim";

#[derive(Clone)]
pub struct SlackConversationRepository {
    api: Arc<dyn SlackApi>,
    cfg: RepoConfig,
    cancel: CancellationToken,
}

impl SlackConversationRepository {
    pub fn new(api: Arc<dyn SlackApi>, cfg: RepoConfig) -> Self {
        Self {
            api,
            cfg,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &RepoConfig {
        &self.cfg
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    fn resolver(&self) -> ReferenceResolver<'_> {
        ReferenceResolver::new(self.api.as_ref(), &self.cancel, self.cfg.page_size_ceiling)
    }

    fn validate_channel_id(channel_id: &str) -> RepoResult<()> {
        if channel_id.trim().is_empty() {
            return Err(RepoError::invalid_argument("channel id is empty"));
        }
        Ok(())
    }

    async fn list_conversations(
        &self,
        method: &'static str,
        mut params: Params,
        limit: i64,
        cursor: Option<&str>,
    ) -> RepoResult<ConversationListing> {
        params.insert(
            "limit".to_string(),
            self.cfg.normalized_list_limit(limit).to_string(),
        );
        params.insert("types".to_string(), LIST_TYPES.to_string());
        params.insert("exclude_archived".to_string(), "true".to_string());
        if let Some(cursor) = cursor.filter(|c| !c.is_empty()) {
            params.insert("cursor".to_string(), cursor.to_string());
        }

        let body = self.api.call(method, &params).await?;
        let page = into_page(method, body, "channels")?;
        Ok(ConversationListing {
            channels: page.items,
            next_cursor: page.next_cursor,
        })
    }
}

fn thread_summary(message: &Record, ts: &str) -> Option<ThreadSummary> {
    let reply_count = message
        .get("reply_count")
        .and_then(|count| count.as_u64().or_else(|| count.as_f64().map(|f| f as u64)))
        .unwrap_or(0);
    if reply_count == 0 {
        return None;
    }

    let root = message
        .get("thread_ts")
        .and_then(Value::as_str)
        .filter(|root| !root.is_empty())
        .unwrap_or(ts);
    Some(ThreadSummary {
        ts: root.to_string(),
        length: reply_count,
    })
}

#[async_trait]
impl ConversationRepository for SlackConversationRepository {
    async fn resolve_reference(&self, input: &str) -> RepoResult<String> {
        self.resolver().resolve(input).await
    }

    async fn resolve_channel(&self, input: &str) -> RepoResult<String> {
        self.resolver()
            .resolve_as(ReferenceKind::Channel, input)
            .await
    }

    async fn resolve_user(&self, input: &str) -> RepoResult<String> {
        self.resolver().resolve_as(ReferenceKind::User, input).await
    }

    async fn channel_history(
        &self,
        channel_id: &str,
        limit: LimitSpec,
    ) -> RepoResult<Vec<Record>> {
        Self::validate_channel_id(channel_id)?;

        let endpoint = ListEndpoint::new(self.api.as_ref(), HISTORY_METHOD, "messages");
        let policy = LimitPolicy::new(limit, self.cfg.page_size_ceiling);
        let messages = Aggregator::new(&endpoint, &self.cancel)
            .collect(
                &PageRequest::for_channel(channel_id),
                policy,
                PageSizing::Adaptive,
            )
            .await?;

        debug!(channel = channel_id, count = messages.len(), "channel history fetched");
        Ok(sort_chronologically(messages))
    }

    async fn thread(
        &self,
        channel_id: &str,
        root_ts: &str,
        limit: LimitSpec,
    ) -> RepoResult<Vec<Record>> {
        Self::validate_channel_id(channel_id)?;
        let root_ts = normalize_timestamp(root_ts);

        // Threads are small, so every request asks for the ceiling and the
        // limit is only applied to what comes back.
        let endpoint = ListEndpoint::new(self.api.as_ref(), REPLIES_METHOD, "messages");
        let policy = LimitPolicy::new(limit, self.cfg.page_size_ceiling);
        let messages = Aggregator::new(&endpoint, &self.cancel)
            .collect(
                &PageRequest::for_channel(channel_id).in_thread(root_ts.as_str()),
                policy,
                PageSizing::Ceiling,
            )
            .await?;

        debug!(
            channel = channel_id,
            thread_ts = %root_ts,
            count = messages.len(),
            "thread fetched"
        );
        Ok(sort_chronologically(messages))
    }

    async fn message(&self, channel_id: &str, ts: &str) -> RepoResult<MessageResult> {
        Self::validate_channel_id(channel_id)?;
        if self.cancel.is_cancelled() {
            return Err(RepoError::Cancelled);
        }
        let ts = normalize_timestamp(ts);

        let mut params = Params::new();
        params.insert("channel".to_string(), channel_id.to_string());
        params.insert("latest".to_string(), ts.clone());
        params.insert("oldest".to_string(), ts.clone());
        params.insert("inclusive".to_string(), "true".to_string());
        params.insert("limit".to_string(), "1".to_string());

        let mut body = self.api.call(HISTORY_METHOD, &params).await?;
        let first = match body.get_mut("messages").map(Value::take) {
            Some(Value::Array(messages)) => messages.into_iter().next(),
            Some(Value::Null) | None => None,
            Some(_) => {
                return Err(RepoError::malformed(
                    HISTORY_METHOD,
                    "`messages` is not a list",
                ))
            }
        };

        let message = match first {
            None => return Err(RepoError::not_found(format!("message not found at ts={ts}"))),
            Some(Value::Object(message)) => message,
            Some(_) => {
                return Err(RepoError::malformed(
                    HISTORY_METHOD,
                    "invalid message format",
                ))
            }
        };

        let thread = thread_summary(&message, &ts);
        Ok(MessageResult { message, thread })
    }

    async fn list_user_conversations(
        &self,
        user: Option<&str>,
        limit: i64,
        cursor: Option<&str>,
    ) -> RepoResult<ConversationListing> {
        let mut params = Params::new();
        if let Some(user) = user {
            let user = user.trim();
            let user = user.strip_prefix('@').unwrap_or(user);
            if !user.is_empty() {
                params.insert("user".to_string(), user.to_string());
            }
        }
        self.list_conversations("users.conversations", params, limit, cursor)
            .await
    }

    async fn list_all_conversations(
        &self,
        limit: i64,
        cursor: Option<&str>,
    ) -> RepoResult<ConversationListing> {
        self.list_conversations("conversations.list", Params::new(), limit, cursor)
            .await
    }

    async fn auth_test(&self) -> RepoResult<Record> {
        match self.api.call("auth.test", &Params::new()).await? {
            Value::Object(body) => Ok(body),
            _ => Err(RepoError::malformed("auth.test", "response is not an object")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn thread_summary_prefers_thread_ts() {
        let summary = thread_summary(
            &record(json!({"ts": "1770000005.000000", "thread_ts": "1770000001.000000", "reply_count": 4})),
            "1770000005.000000",
        )
        .expect("summary");
        assert_eq!(summary.ts, "1770000001.000000");
        assert_eq!(summary.length, 4);
    }

    #[test]
    fn thread_summary_falls_back_to_message_ts() {
        let summary = thread_summary(
            &record(json!({"ts": "1770000005.000000", "reply_count": 2.0})),
            "1770000005.000000",
        )
        .expect("summary");
        assert_eq!(summary.ts, "1770000005.000000");
        assert_eq!(summary.length, 2);
    }

    #[test]
    fn thread_summary_absent_without_replies() {
        assert!(thread_summary(&record(json!({"ts": "1.0"})), "1.0").is_none());
        assert!(thread_summary(&record(json!({"ts": "1.0", "reply_count": 0})), "1.0").is_none());
    }
}
