use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("invalid article: {field}: {reason}")]
    InvalidArticle { field: &'static str, reason: String },

    #[error("invalid article signature")]
    InvalidSignature,

    #[error("invalid or malformed key")]
    InvalidKey,

    #[error("wrong password")]
    BadPassword,

    #[error("unsupported key format (expected v1 AES-GCM envelope)")]
    UnsupportedKeyFormat,

    #[error("invalid feed: {0}")]
    InvalidFeed(String),

    #[error("invalid user: {0}")]
    InvalidUser(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("forbidden")]
    Forbidden,

    #[error("{0} already exists")]
    Conflict(&'static str),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl DomainError {
    pub fn invalid_article(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArticle {
            field,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DomainError>;
