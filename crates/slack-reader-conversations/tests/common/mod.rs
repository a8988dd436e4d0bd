#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use slack_reader_client::{ApiError, ApiResult, Params, SlackApi};
use slack_reader_conversations::{RepoConfig, SlackConversationRepository};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: String,
    pub params: Params,
}

impl RecordedCall {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}

/// Replays canned responses in order and records every call it receives.
#[derive(Default)]
pub struct ScriptedApi {
    calls: Mutex<Vec<RecordedCall>>,
    responses: Mutex<VecDeque<ApiResult<Value>>>,
    cancel_on: Mutex<Option<(usize, CancellationToken)>>,
}

impl ScriptedApi {
    pub fn new(responses: Vec<ApiResult<Value>>) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            responses: Mutex::new(responses.into()),
            cancel_on: Mutex::new(None),
        })
    }

    pub fn pages(pages: Vec<Value>) -> Arc<Self> {
        Self::new(pages.into_iter().map(Ok).collect())
    }

    /// Cancels `token` while serving the `call_number`-th call (1-based),
    /// as if the user interrupted mid-request.
    pub fn cancel_during_call(&self, call_number: usize, token: CancellationToken) {
        *self.cancel_on.lock().expect("cancel lock") = Some((call_number, token));
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn methods(&self) -> Vec<String> {
        self.calls().into_iter().map(|call| call.method).collect()
    }
}

#[async_trait]
impl SlackApi for ScriptedApi {
    async fn call(&self, method: &str, params: &Params) -> ApiResult<Value> {
        let index = {
            let mut calls = self.calls.lock().expect("calls lock");
            calls.push(RecordedCall {
                method: method.to_string(),
                params: params.clone(),
            });
            calls.len() - 1
        };

        if let Some((call_number, token)) = self.cancel_on.lock().expect("cancel lock").as_ref() {
            if index + 1 == *call_number {
                token.cancel();
            }
        }

        self.responses
            .lock()
            .expect("responses lock")
            .pop_front()
            .unwrap_or_else(|| Err(ApiError::transport(method, format!("unexpected call #{index}"))))
    }
}

pub fn repo_for(api: &Arc<ScriptedApi>) -> SlackConversationRepository {
    SlackConversationRepository::new(api.clone(), RepoConfig::default())
}

fn with_cursor(mut body: Value, next_cursor: &str) -> Value {
    if !next_cursor.is_empty() {
        body["has_more"] = json!(true);
        body["response_metadata"] = json!({ "next_cursor": next_cursor });
    }
    body
}

/// A `conversations.history`-shaped page of `n` messages.
pub fn message_page(n: usize, next_cursor: &str) -> Value {
    let messages: Vec<Value> = (0..n)
        .map(|i| json!({ "ts": format!("1770000000.{i:06}"), "type": "message" }))
        .collect();
    with_cursor(json!({ "ok": true, "messages": messages }), next_cursor)
}

pub fn messages_with_ts(ts: &[&str], next_cursor: &str) -> Value {
    let messages: Vec<Value> = ts
        .iter()
        .enumerate()
        .map(|(i, ts)| json!({ "ts": ts, "text": format!("m{i}") }))
        .collect();
    with_cursor(json!({ "ok": true, "messages": messages }), next_cursor)
}

pub fn channel_page(channels: &[(&str, &str)], next_cursor: &str) -> Value {
    let channels: Vec<Value> = channels
        .iter()
        .map(|(id, name)| json!({ "id": id, "name": name, "is_channel": true }))
        .collect();
    with_cursor(json!({ "ok": true, "channels": channels }), next_cursor)
}

pub fn member_page(members: &[(&str, &str)], next_cursor: &str) -> Value {
    let members: Vec<Value> = members
        .iter()
        .map(|(id, name)| json!({ "id": id, "name": name }))
        .collect();
    with_cursor(json!({ "ok": true, "members": members }), next_cursor)
}

pub fn search_hit(channel_id: &str) -> Value {
    json!({
        "ok": true,
        "messages": {
            "total": 1,
            "matches": [
                { "ts": "1770000000.000001", "channel": { "id": channel_id, "name": "general" } }
            ]
        }
    })
}

pub fn search_miss() -> Value {
    json!({ "ok": true, "messages": { "total": 0, "matches": [] } })
}
