//! Sentinel paging shared by user and news listings.

use serde::{Deserialize, Serialize};

/// Value disabling a paging clause.
pub const UNBOUNDED: i64 = -1;

/// Serde default for paging parameters.
pub(crate) fn unbounded_clause() -> i64 {
    UNBOUNDED
}

/// One-based page request.
///
/// `page == -1` disables the skip clause, `page_size == -1` disables the take
/// clause. Skip is computed from the page size, so it is disabled as well when
/// the page size is unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    #[serde(default = "unbounded_clause")]
    pub page: i64,
    #[serde(default = "unbounded_clause")]
    pub page_size: i64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl Pagination {
    pub fn new(page: i64, page_size: i64) -> Self {
        Self { page, page_size }
    }

    /// Every row, in order.
    pub fn unbounded() -> Self {
        Self::new(UNBOUNDED, UNBOUNDED)
    }

    /// Rows to skip, `None` when the clause is disabled.
    pub fn offset(&self) -> Option<i64> {
        if self.page == UNBOUNDED || self.page_size == UNBOUNDED {
            return None;
        }

        Some(self.page.saturating_sub(1).saturating_mul(self.page_size).max(0))
    }

    /// Rows to take, `None` when the clause is disabled.
    pub fn limit(&self) -> Option<i64> {
        (self.page_size != UNBOUNDED).then(|| self.page_size.max(0))
    }

    /// Apply both clauses to an already ordered sequence.
    pub fn apply<T>(&self, items: impl IntoIterator<Item = T>) -> Vec<T> {
        let skip = self.offset().unwrap_or(0) as usize;
        let take = self.limit().map_or(usize::MAX, |limit| limit as usize);

        items.into_iter().skip(skip).take(take).collect()
    }
}
