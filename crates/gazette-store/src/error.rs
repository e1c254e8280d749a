use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("kv store error: {0}")]
    Sled(#[from] sled::Error),

    #[error("record not found")]
    NotFound,

    #[error("{0} already exists")]
    Conflict(&'static str),

    #[error("migration error: {0}")]
    Migration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("UUID error: {0}")]
    Uuid(#[from] uuid::Error),

    #[error("timestamp parse error: {0}")]
    ChronoParse(#[from] chrono::ParseError),

    #[error("unknown store mode: {0}")]
    UnknownMode(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
