use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use slack_reader_client::{Params, SlackApi};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::{PageRequest, Record};
use crate::error::{RepoError, RepoResult};
use crate::paginate::{Aggregator, ListEndpoint};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    Channel,
    User,
}

impl ReferenceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Channel => "channel",
            Self::User => "user",
        }
    }

    fn sigil(self) -> char {
        match self {
            Self::Channel => '#',
            Self::User => '@',
        }
    }

    fn id_re(self) -> &'static Regex {
        match self {
            Self::Channel => channel_id_re(),
            Self::User => user_id_re(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    Canonical(String),
    Name(String),
}

fn channel_id_re() -> &'static Regex {
    static CHANNEL_ID_RE: OnceLock<Regex> = OnceLock::new();
    CHANNEL_ID_RE
        .get_or_init(|| Regex::new(r"^[CDG][A-Z0-9]{8,}$").expect("valid channel id regex"))
}

fn user_id_re() -> &'static Regex {
    static USER_ID_RE: OnceLock<Regex> = OnceLock::new();
    USER_ID_RE.get_or_init(|| Regex::new(r"^[UW][A-Z0-9]{8,}$").expect("valid user id regex"))
}

/// Purely syntactic: strips one leading `#` or `@` and checks the remainder
/// against the canonical ID shape for `kind`.
pub fn classify(kind: ReferenceKind, input: &str) -> Reference {
    let trimmed = input.trim();
    let bare = trimmed
        .strip_prefix(['#', '@'])
        .unwrap_or(trimmed)
        .trim();
    if kind.id_re().is_match(bare) {
        Reference::Canonical(bare.to_string())
    } else {
        Reference::Name(bare.to_string())
    }
}

/// Picks channel or user for a free-form reference: `@handle` and bare user
/// IDs are users, everything else is a channel.
pub fn infer_kind(input: &str) -> ReferenceKind {
    let trimmed = input.trim();
    if trimmed.starts_with('@') || user_id_re().is_match(trimmed) {
        ReferenceKind::User
    } else {
        ReferenceKind::Channel
    }
}

pub struct ResolveContext<'a> {
    pub api: &'a dyn SlackApi,
    pub cancel: &'a CancellationToken,
    pub page_size: u16,
}

/// One way of turning a name into an ID. `Ok(None)` yields to the next
/// strategy in the chain.
#[async_trait]
pub trait ResolveStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn resolve(&self, ctx: &ResolveContext<'_>, name: &str) -> RepoResult<Option<String>>;
}

/// Single `search.messages` call scoped to the channel. The first ranked
/// match is trusted as-is; its channel name is not cross-checked.
pub struct SearchMessagesStrategy;

#[async_trait]
impl ResolveStrategy for SearchMessagesStrategy {
    fn name(&self) -> &'static str {
        "search.messages"
    }

    async fn resolve(&self, ctx: &ResolveContext<'_>, name: &str) -> RepoResult<Option<String>> {
        if ctx.cancel.is_cancelled() {
            return Err(RepoError::Cancelled);
        }

        let mut params = Params::new();
        params.insert("query".to_string(), format!("in:#{name}"));
        params.insert("count".to_string(), "1".to_string());
        params.insert("sort".to_string(), "timestamp".to_string());
        params.insert("sort_dir".to_string(), "desc".to_string());

        let body = ctx.api.call(self.name(), &params).await?;
        let matches = body
            .get("messages")
            .and_then(|messages| messages.get("matches"))
            .and_then(Value::as_array)
            .ok_or_else(|| RepoError::malformed(self.name(), "missing `messages.matches`"))?;

        Ok(matches
            .first()
            .and_then(|first| first.get("channel"))
            .and_then(|channel| channel.get("id"))
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_string))
    }
}

/// Exact, case-sensitive `name` match over a full cursor-paginated listing.
pub struct ListingScanStrategy {
    method: &'static str,
    records_field: &'static str,
    fixed: &'static [(&'static str, &'static str)],
}

impl ListingScanStrategy {
    pub fn channels() -> Self {
        Self {
            method: "conversations.list",
            records_field: "channels",
            fixed: &[
                ("exclude_archived", "true"),
                ("types", "public_channel,private_channel"),
            ],
        }
    }

    pub fn members() -> Self {
        Self {
            method: "users.list",
            records_field: "members",
            fixed: &[],
        }
    }
}

fn id_if_named(record: &Record, name: &str) -> Option<String> {
    if record.get("name").and_then(Value::as_str) != Some(name) {
        return None;
    }
    record
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl ResolveStrategy for ListingScanStrategy {
    fn name(&self) -> &'static str {
        self.method
    }

    async fn resolve(&self, ctx: &ResolveContext<'_>, name: &str) -> RepoResult<Option<String>> {
        let endpoint = self
            .fixed
            .iter()
            .fold(
                ListEndpoint::new(ctx.api, self.method, self.records_field),
                |endpoint, (key, value)| endpoint.with_param(key, *value),
            );

        Aggregator::new(&endpoint, ctx.cancel)
            .scan(&PageRequest::default(), ctx.page_size, |record| {
                id_if_named(record, name)
            })
            .await
    }
}

pub struct StrategyChain {
    kind: ReferenceKind,
    strategies: Vec<Box<dyn ResolveStrategy>>,
}

impl StrategyChain {
    pub fn new(kind: ReferenceKind, strategies: Vec<Box<dyn ResolveStrategy>>) -> Self {
        Self { kind, strategies }
    }

    pub fn channels() -> Self {
        Self::new(
            ReferenceKind::Channel,
            vec![
                Box::new(SearchMessagesStrategy),
                Box::new(ListingScanStrategy::channels()),
            ],
        )
    }

    pub fn users() -> Self {
        Self::new(
            ReferenceKind::User,
            vec![Box::new(ListingScanStrategy::members())],
        )
    }

    pub fn for_kind(kind: ReferenceKind) -> Self {
        match kind {
            ReferenceKind::Channel => Self::channels(),
            ReferenceKind::User => Self::users(),
        }
    }

    /// Tries each strategy in order. Failures of all but the last strategy
    /// are logged and fall through; the last strategy's failure is returned.
    pub async fn resolve(&self, ctx: &ResolveContext<'_>, name: &str) -> RepoResult<String> {
        let last = self.strategies.len().saturating_sub(1);

        for (idx, strategy) in self.strategies.iter().enumerate() {
            match strategy.resolve(ctx, name).await {
                Ok(Some(id)) => {
                    info!(
                        kind = self.kind.as_str(),
                        name,
                        id = %id,
                        strategy = strategy.name(),
                        "resolved reference"
                    );
                    return Ok(id);
                }
                Ok(None) => {
                    debug!(
                        kind = self.kind.as_str(),
                        name,
                        strategy = strategy.name(),
                        "strategy found no match"
                    );
                }
                Err(RepoError::Cancelled) => return Err(RepoError::Cancelled),
                Err(err) if idx < last => {
                    warn!(
                        "{} lookup for {}{} failed, falling back: {}",
                        strategy.name(),
                        self.kind.sigil(),
                        name,
                        err
                    );
                }
                Err(err) => return Err(err),
            }
        }

        Err(RepoError::not_found(match self.kind {
            ReferenceKind::Channel => format!("could not resolve channel name: #{name}"),
            ReferenceKind::User => format!("could not resolve user: @{name}"),
        }))
    }
}

pub struct ReferenceResolver<'a> {
    ctx: ResolveContext<'a>,
}

impl<'a> ReferenceResolver<'a> {
    pub fn new(api: &'a dyn SlackApi, cancel: &'a CancellationToken, page_size: u16) -> Self {
        Self {
            ctx: ResolveContext {
                api,
                cancel,
                page_size,
            },
        }
    }

    pub async fn resolve_as(&self, kind: ReferenceKind, input: &str) -> RepoResult<String> {
        let name = match classify(kind, input) {
            Reference::Canonical(id) => return Ok(id),
            Reference::Name(name) => name,
        };
        if name.is_empty() {
            return Err(RepoError::invalid_argument(format!(
                "{} name is empty",
                kind.as_str()
            )));
        }

        StrategyChain::for_kind(kind).resolve(&self.ctx, &name).await
    }

    pub async fn resolve(&self, input: &str) -> RepoResult<String> {
        self.resolve_as(infer_kind(input), input).await
    }
}
