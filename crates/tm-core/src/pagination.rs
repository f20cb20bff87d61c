//! Page slicing and the metadata returned with every listing.

use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_LIMIT: u32 = 10;

/// A 1-based page request. Construction clamps `page` and `limit` to at least 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: u32,
    limit: u32,
}

impl PageRequest {
    pub fn new(page: u32, limit: u32) -> Self {
        Self {
            page: page.max(1),
            limit: limit.max(1),
        }
    }

    /// Caps the page size; used to keep a single request bounded.
    pub fn with_max_limit(self, max_limit: u32) -> Self {
        Self::new(self.page, self.limit.min(max_limit.max(1)))
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Number of ranked items before this page.
    pub fn skip(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(1, DEFAULT_PAGE_LIMIT)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub current_page: u32,
    pub total_pages: u64,
    pub total_count: u64,
    pub has_more: bool,
}

impl PageMeta {
    pub fn new(request: PageRequest, total_count: u64, returned: usize) -> Self {
        Self {
            current_page: request.page(),
            total_pages: total_count.div_ceil(u64::from(request.limit())),
            total_count,
            has_more: request.skip().saturating_add(returned as u64) < total_count,
        }
    }
}

/// A single page of results.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub meta: PageMeta,
}

/// Slices an already ranked, fully materialized list.
pub fn paginate<T>(items: Vec<T>, request: PageRequest) -> Page<T> {
    let total = items.len() as u64;
    let skip = usize::try_from(request.skip()).unwrap_or(usize::MAX);
    let items: Vec<T> = items
        .into_iter()
        .skip(skip)
        .take(request.limit() as usize)
        .collect();
    let meta = PageMeta::new(request, total, items.len());
    Page { items, meta }
}
