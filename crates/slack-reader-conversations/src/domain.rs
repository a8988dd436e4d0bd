use serde::Serialize;
use serde_json::{Map, Value};

/// One conversation entry as returned by the remote. Only `ts` is read by the
/// pagination engine; everything else is passed through untouched.
pub type Record = Map<String, Value>;

pub const DEFAULT_PAGE_SIZE_CEILING: u16 = 200;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LimitSpec {
    #[default]
    Unlimited,
    AtMost(usize),
}

impl LimitSpec {
    pub fn from_requested(raw: i64) -> Self {
        if raw <= 0 {
            Self::Unlimited
        } else {
            Self::AtMost(usize::try_from(raw).unwrap_or(usize::MAX))
        }
    }

    pub fn bound(self) -> Option<usize> {
        match self {
            Self::Unlimited => None,
            Self::AtMost(n) => Some(n),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageRequest {
    pub channel: Option<String>,
    pub limit: u16,
    pub cursor: Option<String>,
    pub thread_ts: Option<String>,
}

impl PageRequest {
    pub fn for_channel(channel: impl Into<String>) -> Self {
        Self {
            channel: Some(channel.into()),
            ..Self::default()
        }
    }

    pub fn in_thread(mut self, thread_ts: impl Into<String>) -> Self {
        self.thread_ts = Some(thread_ts.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThreadSummary {
    pub ts: String,
    pub length: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageResult {
    pub message: Record,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread: Option<ThreadSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationListing {
    pub channels: Vec<Record>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RepoConfig {
    pub page_size_ceiling: u16,
    pub list_default_limit: u16,
    pub list_max_limit: u16,
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            page_size_ceiling: DEFAULT_PAGE_SIZE_CEILING,
            list_default_limit: 100,
            list_max_limit: 1000,
        }
    }
}

impl RepoConfig {
    pub fn normalized_list_limit(&self, requested: i64) -> u16 {
        if requested <= 0 {
            return self.list_default_limit;
        }
        u16::try_from(requested)
            .unwrap_or(u16::MAX)
            .min(self.list_max_limit)
    }
}
