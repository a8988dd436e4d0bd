use async_trait::async_trait;
use serde_json::Value;
use slack_reader_client::{Params, SlackApi};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::domain::{Page, PageRequest, Record};
use crate::error::{RepoError, RepoResult};
use crate::limit::{LimitPolicy, NextPage};

/// Issues exactly one page request. A single call is never interrupted;
/// cancellation is only observed between calls.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    fn method(&self) -> &str;

    async fn fetch_page(&self, req: &PageRequest) -> RepoResult<Page<Record>>;
}

/// A cursor-paginated Web API list method, e.g. `conversations.history`
/// returning its records under `messages`.
pub struct ListEndpoint<'a> {
    api: &'a dyn SlackApi,
    method: &'static str,
    records_field: &'static str,
    fixed: Params,
}

impl<'a> ListEndpoint<'a> {
    pub fn new(api: &'a dyn SlackApi, method: &'static str, records_field: &'static str) -> Self {
        Self {
            api,
            method,
            records_field,
            fixed: Params::new(),
        }
    }

    pub fn with_param(mut self, key: &str, value: impl Into<String>) -> Self {
        self.fixed.insert(key.to_string(), value.into());
        self
    }

    fn params_for(&self, req: &PageRequest) -> Params {
        let mut params = self.fixed.clone();
        if let Some(channel) = &req.channel {
            params.insert("channel".to_string(), channel.clone());
        }
        if let Some(thread_ts) = &req.thread_ts {
            params.insert("ts".to_string(), thread_ts.clone());
        }
        params.insert("limit".to_string(), req.limit.to_string());
        if let Some(cursor) = req.cursor.as_deref().filter(|c| !c.is_empty()) {
            params.insert("cursor".to_string(), cursor.to_string());
        }
        params
    }
}

#[async_trait]
impl PageFetcher for ListEndpoint<'_> {
    fn method(&self) -> &str {
        self.method
    }

    async fn fetch_page(&self, req: &PageRequest) -> RepoResult<Page<Record>> {
        let body = self.api.call(self.method, &self.params_for(req)).await?;
        into_page(self.method, body, self.records_field)
    }
}

pub fn next_cursor(body: &Value) -> Option<String> {
    body.get("response_metadata")
        .and_then(|meta| meta.get("next_cursor"))
        .and_then(Value::as_str)
        .filter(|cursor| !cursor.is_empty())
        .map(str::to_string)
}

pub fn into_page(method: &str, mut body: Value, records_field: &str) -> RepoResult<Page<Record>> {
    let next_cursor = next_cursor(&body);
    let raw = match body.get_mut(records_field).map(Value::take) {
        Some(Value::Array(items)) => items,
        Some(other) => {
            return Err(RepoError::malformed(
                method,
                format!("`{records_field}` is not a list (got {})", value_kind(&other)),
            ))
        }
        None => {
            return Err(RepoError::malformed(
                method,
                format!("missing `{records_field}` field"),
            ))
        }
    };

    let total = raw.len();
    let items: Vec<Record> = raw
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(record) => Some(record),
            _ => None,
        })
        .collect();
    if items.len() < total {
        debug!(
            method,
            skipped = total - items.len(),
            "skipped non-object records in list response"
        );
    }

    Ok(Page { items, next_cursor })
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSizing {
    /// Shrink the last request to exactly what is still needed.
    Adaptive,
    /// Always ask for the ceiling and truncate afterwards.
    Ceiling,
}

pub struct Aggregator<'a> {
    fetcher: &'a dyn PageFetcher,
    cancel: &'a CancellationToken,
}

impl<'a> Aggregator<'a> {
    pub fn new(fetcher: &'a dyn PageFetcher, cancel: &'a CancellationToken) -> Self {
        Self { fetcher, cancel }
    }

    fn ensure_not_cancelled(&self) -> RepoResult<()> {
        if self.cancel.is_cancelled() {
            debug!(method = self.fetcher.method(), "pagination cancelled");
            return Err(RepoError::Cancelled);
        }
        Ok(())
    }

    /// Follows the cursor chain until the limit is met or the remote runs
    /// out of pages. Any failed page discards everything collected so far.
    pub async fn collect(
        &self,
        template: &PageRequest,
        policy: LimitPolicy,
        sizing: PageSizing,
    ) -> RepoResult<Vec<Record>> {
        let mut collected: Vec<Record> = Vec::new();
        let mut cursor: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let size = match (sizing, policy.next_page(collected.len())) {
                (_, NextPage::Stop) => break,
                (PageSizing::Adaptive, NextPage::Request(size)) => size,
                (PageSizing::Ceiling, NextPage::Request(_)) => policy.ceiling(),
            };
            self.ensure_not_cancelled()?;

            let request = PageRequest {
                limit: size,
                cursor: cursor.take(),
                ..template.clone()
            };
            let page = self.fetcher.fetch_page(&request).await?;
            pages += 1;

            let received = page.items.len();
            collected.extend(page.items);
            debug!(
                method = self.fetcher.method(),
                page = pages,
                requested = size,
                received,
                total = collected.len(),
                has_more = page.next_cursor.is_some(),
                "fetched page"
            );

            if let Some(n) = policy.limit().bound() {
                if collected.len() >= n {
                    collected.truncate(n);
                    break;
                }
            }

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        Ok(collected)
    }

    /// Walks every page at a fixed size and returns the first value `matcher`
    /// extracts, in remote order. Stops requesting as soon as one is found.
    pub async fn scan<F>(
        &self,
        template: &PageRequest,
        page_size: u16,
        mut matcher: F,
    ) -> RepoResult<Option<String>>
    where
        F: FnMut(&Record) -> Option<String> + Send,
    {
        let mut cursor: Option<String> = None;
        let mut pages = 0usize;

        loop {
            self.ensure_not_cancelled()?;

            let request = PageRequest {
                limit: page_size,
                cursor: cursor.take(),
                ..template.clone()
            };
            let page = self.fetcher.fetch_page(&request).await?;
            pages += 1;
            debug!(
                method = self.fetcher.method(),
                page = pages,
                received = page.items.len(),
                has_more = page.next_cursor.is_some(),
                "scanned page"
            );

            if let Some(found) = page.items.iter().find_map(&mut matcher) {
                return Ok(Some(found));
            }

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => return Ok(None),
            }
        }
    }
}
