//! Company news feed.

#[cfg(test)]
pub(crate) mod memory;
mod postgres;

pub use postgres::*;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::paging::Pagination;

/// News item, as saved on database.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct News {
    pub id: i32,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// `None` once the author has been deleted.
    pub author_id: Option<String>,
}

impl News {
    /// Create a new [`News`] dated now. The repository assigns the id.
    pub fn new(content: impl Into<String>, author_id: Option<String>) -> Self {
        Self {
            id: 0,
            content: content.into(),
            created_at: Utc::now(),
            author_id,
        }
    }
}

/// Port for news persistence.
#[async_trait]
pub trait NewsRepository: Send + Sync {
    /// Newest first, optionally restricted to one author.
    async fn list(
        &self,
        author_id: Option<&str>,
        pagination: Pagination,
    ) -> Result<Vec<News>>;

    async fn find(&self, id: i32) -> Result<Option<News>>;

    /// Insert `news` and return it with its id.
    async fn add(&self, news: &News) -> Result<News>;

    /// Replace content, date and author of an existing item.
    async fn update(&self, news: &News) -> Result<()>;

    async fn remove(&self, id: i32) -> Result<()>;
}
