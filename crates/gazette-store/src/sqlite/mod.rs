//! SQLite-backed repositories (single-file relational store, WAL journal).

mod articles;
mod feeds;
mod users;

pub use articles::SqliteArticleRepo;
pub use feeds::SqliteFeedRepo;
pub use users::SqliteUserRepo;

use crate::error::StoreError;

/// Map a unique-constraint violation onto `Conflict`, everything else
/// through unchanged.
pub(crate) fn map_conflict(err: rusqlite::Error, what: &'static str) -> StoreError {
    match err {
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            StoreError::Conflict(what)
        }
        other => StoreError::Sqlite(other),
    }
}
