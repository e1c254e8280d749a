pub mod blobs;
pub mod database;
pub mod kv;
pub mod migrations;
pub mod repo;
pub mod sqlite;

mod error;

pub use blobs::{BlobError, BlobStore, DagStore, FsDagStore};
pub use database::Database;
pub use error::{Result, StoreError};
pub use repo::{
    open_stores, ArticleRepository, FeedRepository, StoreMode, Stores, UserRepository,
};
