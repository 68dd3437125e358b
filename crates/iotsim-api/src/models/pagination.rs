//! Page-based listing support for `GET /api/v1/devices`.

use serde::{Deserialize, Serialize};

fn default_page() -> usize {
    1
}

fn default_page_size() -> usize {
    20
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaginationParams {
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_page_size", rename = "pageSize")]
    pub page_size: usize,
}

impl PaginationParams {
    pub fn offset(&self) -> usize {
        self.page.saturating_sub(1).saturating_mul(self.page_size.max(1))
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
    pub has_more: bool,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: usize, page: usize, page_size: usize) -> Self {
        let has_more = page.saturating_mul(page_size.max(1)) < total;
        Page {
            items,
            total,
            page,
            page_size,
            has_more,
        }
    }
}
