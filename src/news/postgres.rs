//! PostgreSQL news repository.

use async_trait::async_trait;
use sqlx::{Pool, Postgres};

use crate::error::{Result, ServerError};
use crate::news::{News, NewsRepository};
use crate::paging::Pagination;

#[derive(Clone)]
pub struct PgNewsRepository {
    pool: Pool<Postgres>,
}

impl PgNewsRepository {
    /// Create a new [`PgNewsRepository`].
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NewsRepository for PgNewsRepository {
    async fn list(
        &self,
        author_id: Option<&str>,
        pagination: Pagination,
    ) -> Result<Vec<News>> {
        let news = sqlx::query_as::<_, News>(
            r#"SELECT id, content, created_at, author_id FROM news
                WHERE $1::TEXT IS NULL OR author_id = $1
                ORDER BY created_at DESC, id DESC
                LIMIT $2 OFFSET $3"#,
        )
        .bind(author_id.filter(|id| !id.is_empty()))
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok(news)
    }

    async fn find(&self, id: i32) -> Result<Option<News>> {
        let news = sqlx::query_as::<_, News>(
            r#"SELECT id, content, created_at, author_id FROM news WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(news)
    }

    async fn add(&self, news: &News) -> Result<News> {
        let news = sqlx::query_as::<_, News>(
            r#"INSERT INTO news (content, created_at, author_id)
                VALUES ($1, $2, $3)
                RETURNING id, content, created_at, author_id"#,
        )
        .bind(&news.content)
        .bind(news.created_at)
        .bind(&news.author_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(news)
    }

    async fn update(&self, news: &News) -> Result<()> {
        let result = sqlx::query(
            r#"UPDATE news SET content = $1, created_at = $2, author_id = $3
                WHERE id = $4"#,
        )
        .bind(&news.content)
        .bind(news.created_at)
        .bind(&news.author_id)
        .bind(news.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ServerError::UnknownNews { id: news.id });
        }

        Ok(())
    }

    async fn remove(&self, id: i32) -> Result<()> {
        let result = sqlx::query(r#"DELETE FROM news WHERE id = $1"#)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ServerError::UnknownNews { id });
        }

        Ok(())
    }
}
