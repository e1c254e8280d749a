pub mod article;
pub mod constants;
pub mod feed;
pub mod identity;
pub mod keystore;
pub mod user;

mod error;

pub use article::{Article, ArticleCreateRequest, ArticleListFilter, ArticleUpdateRequest};
pub use error::{DomainError, Result};
pub use feed::{Feed, FeedCreateRequest, FeedManifest};
pub use identity::Identity;
pub use user::User;
