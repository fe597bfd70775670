//! In-memory news repository used by tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use crate::error::{Result, ServerError};
use crate::news::{News, NewsRepository};
use crate::paging::Pagination;

#[derive(Default)]
pub struct MemoryNews {
    items: Mutex<Vec<News>>,
    faulty: AtomicBool,
}

impl MemoryNews {
    /// Make every write fail with a store fault.
    pub fn faulty(self) -> Self {
        self.faulty.store(true, Ordering::SeqCst);
        self
    }

    pub fn len(&self) -> usize {
        self.items.lock().unwrap().len()
    }

    fn check(&self) -> Result<()> {
        if self.faulty.load(Ordering::SeqCst) {
            return Err(ServerError::internal("injected news fault"));
        }
        Ok(())
    }
}

#[async_trait]
impl NewsRepository for MemoryNews {
    async fn list(
        &self,
        author_id: Option<&str>,
        pagination: Pagination,
    ) -> Result<Vec<News>> {
        let mut news: Vec<News> = self
            .items
            .lock()
            .unwrap()
            .iter()
            .filter(|n| match author_id.filter(|id| !id.is_empty()) {
                Some(author) => n.author_id.as_deref() == Some(author),
                None => true,
            })
            .cloned()
            .collect();
        news.sort_by(|a, b| {
            b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id))
        });

        Ok(pagination.apply(news))
    }

    async fn find(&self, id: i32) -> Result<Option<News>> {
        let items = self.items.lock().unwrap();
        Ok(items.iter().find(|n| n.id == id).cloned())
    }

    async fn add(&self, news: &News) -> Result<News> {
        self.check()?;

        let mut items = self.items.lock().unwrap();
        let mut created = news.clone();
        created.id = items.iter().map(|n| n.id).max().unwrap_or(0) + 1;
        items.push(created.clone());

        Ok(created)
    }

    async fn update(&self, news: &News) -> Result<()> {
        self.check()?;

        let mut items = self.items.lock().unwrap();
        let Some(stored) = items.iter_mut().find(|n| n.id == news.id) else {
            return Err(ServerError::UnknownNews { id: news.id });
        };
        *stored = news.clone();

        Ok(())
    }

    async fn remove(&self, id: i32) -> Result<()> {
        self.check()?;

        let mut items = self.items.lock().unwrap();
        let before = items.len();
        items.retain(|n| n.id != id);
        if items.len() == before {
            return Err(ServerError::UnknownNews { id });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;

    async fn fixture() -> MemoryNews {
        let repo = MemoryNews::default();
        let now = Utc::now();
        for (i, author) in ["alice", "bob", "alice", "carol"].iter().enumerate() {
            let mut news = News::new(format!("news {i}"), Some(author.to_string()));
            news.created_at = now + Duration::minutes(i as i64);
            repo.add(&news).await.unwrap();
        }
        repo
    }

    #[tokio::test]
    async fn test_newest_first() {
        let repo = fixture().await;

        let news = repo.list(None, Pagination::unbounded()).await.unwrap();
        let contents: Vec<_> = news.iter().map(|n| n.content.as_str()).collect();
        assert_eq!(contents, vec!["news 3", "news 2", "news 1", "news 0"]);
    }

    #[tokio::test]
    async fn test_author_filter_and_paging() {
        let repo = fixture().await;

        let news = repo.list(Some("alice"), Pagination::unbounded()).await.unwrap();
        assert_eq!(news.len(), 2);
        assert!(news.iter().all(|n| n.author_id.as_deref() == Some("alice")));

        let page = repo.list(None, Pagination::new(2, 3)).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].content, "news 0");

        let all = repo.list(Some(""), Pagination::new(3, -1)).await.unwrap();
        assert_eq!(all.len(), 4);
    }

    #[tokio::test]
    async fn test_remove_unknown() {
        let repo = fixture().await;

        assert!(matches!(
            repo.remove(42).await,
            Err(ServerError::UnknownNews { id: 42 })
        ));
        repo.remove(1).await.unwrap();
        assert_eq!(repo.len(), 3);
    }
}
