use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use slack_reader_client::{Params, SlackApi};
use slack_reader_conversations::Record;
use tokio::sync::Mutex;
use tracing::debug;

#[async_trait]
pub trait UserResolver: Send + Sync {
    async fn username_for_id(&self, id: &str) -> String;

    async fn username_for_message(&self, message: &Record) -> String {
        if let Some(user_id) = str_field(message, "user") {
            return self.username_for_id(user_id).await;
        }
        if let Some(bot_id) = str_field(message, "bot_id") {
            let bot_name = message
                .get("bot_profile")
                .and_then(|profile| profile.get("name"))
                .and_then(Value::as_str)
                .filter(|name| !name.is_empty());
            return match bot_name {
                Some(name) => name.to_string(),
                None => format!("bot {bot_id}"),
            };
        }
        if let Some(username) = str_field(message, "username") {
            return username.to_string();
        }
        "unknown".to_string()
    }
}

fn str_field<'a>(record: &'a Record, key: &str) -> Option<&'a str> {
    record
        .get(key)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
}

pub fn display_name(user: &Record) -> String {
    let profile = user.get("profile").and_then(Value::as_object);
    profile
        .and_then(|profile| str_field(profile, "display_name"))
        .or_else(|| profile.and_then(|profile| str_field(profile, "real_name")))
        .or_else(|| str_field(user, "real_name"))
        .or_else(|| str_field(user, "name"))
        .or_else(|| str_field(user, "id"))
        .unwrap_or("unknown")
        .to_string()
}

/// Memoizing `users.info` lookups for rendering. Failed lookups are cached
/// as the raw ID so a broken user is only asked about once.
pub struct UserDirectory {
    api: Arc<dyn SlackApi>,
    cache: Mutex<HashMap<String, String>>,
}

impl UserDirectory {
    pub fn new(api: Arc<dyn SlackApi>) -> Self {
        Self {
            api,
            cache: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl UserResolver for UserDirectory {
    async fn username_for_id(&self, id: &str) -> String {
        let mut cache = self.cache.lock().await;
        if let Some(name) = cache.get(id) {
            return name.clone();
        }

        let mut params = Params::new();
        params.insert("user".to_string(), id.to_string());
        let name = match self.api.call("users.info", &params).await {
            Ok(body) => match body.get("user").and_then(Value::as_object) {
                Some(user) => display_name(user),
                None => id.to_string(),
            },
            Err(err) => {
                debug!("users.info for {} failed, using raw id: {}", id, err);
                id.to_string()
            }
        };

        cache.insert(id.to_string(), name.clone());
        name
    }
}
