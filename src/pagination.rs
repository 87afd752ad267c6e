//! Page/limit query parameters and the paged response shape.

use serde::{Deserialize, Serialize};

use crate::context::QueryParams;

/// Page used when the query has none.
pub const DEFAULT_PAGE: u64 = 1;
/// Page size used when the query has none.
pub const DEFAULT_LIMIT: u64 = 10;

/// Pagination request as it arrives in the query string.
///
/// Both fields are optional; [`page`](Self::page) and [`limit`](Self::limit)
/// resolve the defaults so that `?` and `?page=1&limit=10` describe the same page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

impl PageQuery {
    pub fn new(page: u64, limit: u64) -> Self {
        Self {
            page: Some(page),
            limit: Some(limit),
        }
    }

    /// Reads `page` and `limit` from the query string. Values that are not
    /// positive integers are treated as absent.
    pub fn from_query(query: &QueryParams) -> Self {
        let positive = |name: &str| {
            query
                .get(name)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .filter(|v| *v > 0)
        };
        Self {
            page: positive("page"),
            limit: positive("limit"),
        }
    }

    /// Requested page, `DEFAULT_PAGE` when absent.
    pub fn page(&self) -> u64 {
        self.page.unwrap_or(DEFAULT_PAGE).max(1)
    }

    /// Requested page size, `DEFAULT_LIMIT` when absent.
    pub fn limit(&self) -> u64 {
        self.limit.unwrap_or(DEFAULT_LIMIT).max(1)
    }

    /// Number of items to skip for this page.
    pub fn offset(&self) -> u64 {
        (self.page() - 1).saturating_mul(self.limit())
    }
}

/// Position of a page within the full collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u64,
    pub limit: u64,
    pub total: u64,
    pub total_pages: u64,
}

/// One page of a collection: `{ items, pagination }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub pagination: Pagination,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, query: PageQuery, total: u64) -> Self {
        let limit = query.limit();
        Self {
            items,
            pagination: Pagination {
                page: query.page(),
                limit,
                total,
                total_pages: total.div_ceil(limit),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_values_use_defaults() {
        let q = PageQuery::from_query(&QueryParams::new());
        assert_eq!((q.page(), q.limit()), (1, 10));
        assert_eq!(q.offset(), 0);
    }

    #[test]
    fn invalid_values_are_ignored() {
        let query: QueryParams = [("page", "0"), ("limit", "ten")].into_iter().collect();
        let q = PageQuery::from_query(&query);
        assert_eq!(q, PageQuery::default());
    }

    #[test]
    fn page_counts_round_up() {
        let page = Page::new(vec![1, 2, 3], PageQuery::new(2, 3), 7);
        assert_eq!(page.pagination.total_pages, 3);
        assert_eq!(PageQuery::new(3, 5).offset(), 10);
    }
}
