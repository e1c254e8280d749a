use thiserror::Error;

use gazette_shared::DomainError;
use gazette_store::{BlobError, StoreError};

#[derive(Error, Debug)]
pub enum NodeError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Blob(#[from] BlobError),

    #[error("broadcast failed: {0}")]
    Broadcast(String),
}

impl NodeError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            NodeError::Store(StoreError::NotFound)
                | NodeError::Domain(DomainError::NotFound(_))
                | NodeError::Blob(BlobError::NotFound(_))
        )
    }

    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            NodeError::Store(StoreError::Conflict(_)) | NodeError::Domain(DomainError::Conflict(_))
        )
    }

    pub fn is_forbidden(&self) -> bool {
        matches!(self, NodeError::Domain(DomainError::Forbidden))
    }
}

pub type Result<T> = std::result::Result<T, NodeError>;
