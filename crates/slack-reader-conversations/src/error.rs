use slack_reader_client::ApiError;
use thiserror::Error;

pub type RepoResult<T> = Result<T, RepoError>;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{method}: {message}")]
    Transport { method: String, message: String },
    #[error("{method}: slack API error: {code}")]
    RemoteRejection { method: String, code: String },
    #[error("{method}: malformed response: {message}")]
    MalformedResponse { method: String, message: String },
    #[error("operation cancelled")]
    Cancelled,
}

impl RepoError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn malformed(method: &str, message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            method: method.to_string(),
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<ApiError> for RepoError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Transport { method, message } => Self::Transport { method, message },
            ApiError::Rejected { method, code } => Self::RemoteRejection { method, code },
            ApiError::Decode { method, message } => Self::MalformedResponse { method, message },
        }
    }
}
