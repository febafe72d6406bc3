//! Paginated result pages.
//!
//! [`Paginator`] knows the total (it costs a COUNT query); [`SimplePaginator`]
//! only knows whether another page exists, found by fetching one extra row.

use serde::Serialize;

/// Normalize user supplied paging input: pages are 1-based and a page holds
/// at least one item.
pub fn normalize(per_page: u64, page: u64) -> (u64, u64) {
    (per_page.max(1), page.max(1))
}

/// A page with a known total.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Paginator<T> {
    #[serde(rename = "data")]
    items: Vec<T>,
    total: u64,
    per_page: u64,
    current_page: u64,
    last_page: u64,
}

impl<T> Paginator<T> {
    /// Build a page. `last_page` is at least 1, even for an empty result.
    pub fn new(items: Vec<T>, total: u64, per_page: u64, current_page: u64) -> Self {
        let (per_page, current_page) = normalize(per_page, current_page);
        let last_page = total.div_ceil(per_page).max(1);
        Self {
            items,
            total,
            per_page,
            current_page,
            last_page,
        }
    }

    /// Items on this page.
    pub fn items(&self) -> &[T] {
        &self.items
    }

    /// Consume into the items.
    pub fn into_items(self) -> Vec<T> {
        self.items
    }

    /// Total matching rows.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Page size.
    pub fn per_page(&self) -> u64 {
        self.per_page
    }

    /// 1-based page number.
    pub fn current_page(&self) -> u64 {
        self.current_page
    }

    /// Number of the final page.
    pub fn last_page(&self) -> u64 {
        self.last_page
    }

    /// Whether pages follow this one.
    pub fn has_more_pages(&self) -> bool {
        self.current_page < self.last_page
    }

    /// 1-based position of the first item on this page, if any.
    pub fn from(&self) -> Option<u64> {
        (!self.items.is_empty()).then(|| (self.current_page - 1) * self.per_page + 1)
    }

    /// 1-based position of the last item on this page, if any.
    pub fn to(&self) -> Option<u64> {
        self.from().map(|from| from + self.items.len() as u64 - 1)
    }

    /// Transform the items, keeping the page metadata.
    pub fn map<U, F: FnMut(T) -> U>(self, f: F) -> Paginator<U> {
        Paginator {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            per_page: self.per_page,
            current_page: self.current_page,
            last_page: self.last_page,
        }
    }
}

/// A page without a total.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimplePaginator<T> {
    #[serde(rename = "data")]
    items: Vec<T>,
    per_page: u64,
    current_page: u64,
    has_more: bool,
}

impl<T> SimplePaginator<T> {
    /// Build from up to `per_page + 1` fetched items; the surplus item only
    /// signals that another page exists and is dropped.
    pub fn from_overfetch(mut items: Vec<T>, per_page: u64, current_page: u64) -> Self {
        let (per_page, current_page) = normalize(per_page, current_page);
        let limit = usize::try_from(per_page).unwrap_or(usize::MAX);
        let has_more = items.len() > limit;
        items.truncate(limit);
        Self {
            items,
            per_page,
            current_page,
            has_more,
        }
    }

    /// Items on this page.
    pub fn items(&self) -> &[T] {
        &self.items
    }

    /// Consume into the items.
    pub fn into_items(self) -> Vec<T> {
        self.items
    }

    /// Page size.
    pub fn per_page(&self) -> u64 {
        self.per_page
    }

    /// 1-based page number.
    pub fn current_page(&self) -> u64 {
        self.current_page
    }

    /// Whether pages follow this one.
    pub fn has_more_pages(&self) -> bool {
        self.has_more
    }

    /// Transform the items, keeping the page metadata.
    pub fn map<U, F: FnMut(T) -> U>(self, f: F) -> SimplePaginator<U> {
        SimplePaginator {
            items: self.items.into_iter().map(f).collect(),
            per_page: self.per_page,
            current_page: self.current_page,
            has_more: self.has_more,
        }
    }
}
