mod domain;
mod error;
mod limit;
mod paginate;
mod repo;
mod resolve;
mod slack_repo;
mod timestamp;

pub use domain::{
    ConversationListing, LimitSpec, MessageResult, Page, PageRequest, Record, RepoConfig,
    ThreadSummary, DEFAULT_PAGE_SIZE_CEILING,
};
pub use error::{RepoError, RepoResult};
pub use limit::{LimitPolicy, NextPage};
pub use paginate::{Aggregator, ListEndpoint, PageFetcher, PageSizing};
pub use repo::ConversationRepository;
pub use resolve::{
    classify, infer_kind, ListingScanStrategy, Reference, ReferenceKind, ReferenceResolver,
    ResolveContext, ResolveStrategy, SearchMessagesStrategy, StrategyChain,
};
pub use slack_repo::SlackConversationRepository;
pub use timestamp::{normalize_timestamp, record_ts, sort_chronologically};
