use serde::{Deserialize, Serialize};

use crate::MAX_PAGE_SIZE;

/// `?page=N&limit=M` as sent by list endpoints. Pages are 1-based.
#[derive(Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl PageQuery {
    pub fn new(page: i64, limit: i64) -> Self {
        Self {
            page: Some(page),
            limit: Some(limit),
        }
    }

    pub fn limit(&self, default: i64) -> i64 {
        self.limit.unwrap_or(default).clamp(1, MAX_PAGE_SIZE)
    }

    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn offset(&self, default: i64) -> i64 {
        (self.page() - 1).saturating_mul(self.limit(default))
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct Page<T> {
    pub count: i64,
    pub next: Option<i64>,
    pub previous: Option<i64>,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    pub fn from_rows(results: Vec<T>, count: i64, query: PageQuery, default_limit: i64) -> Self {
        let page = query.page();
        let limit = query.limit(default_limit);

        let next = if page.saturating_mul(limit) < count {
            Some(page + 1)
        } else {
            None
        };
        let previous = if page > 1 { Some(page - 1) } else { None };

        Self {
            count,
            next,
            previous,
            results,
        }
    }

    pub fn no_rows() -> Self {
        Self {
            count: 0,
            next: None,
            previous: None,
            results: vec![],
        }
    }
}
