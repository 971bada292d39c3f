//! Page/limit pagination shared by every list endpoint.

use serde::{Deserialize, Serialize};

use crate::config::LimitsConfig;

/// Raw `?page=&limit=` query values. Out-of-range values fall back to defaults.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// A resolved page window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// 1-based page number
    pub page: i64,
    pub limit: i64,
}

impl PageRequest {
    pub fn new(page: i64, limit: i64) -> Self {
        Self {
            page: page.max(1),
            limit: limit.max(1),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.limit
    }
}

impl PageQuery {
    pub fn resolve(&self, limits: &LimitsConfig) -> PageRequest {
        let page = self.page.filter(|p| *p > 0).unwrap_or(1);
        let limit = self
            .limit
            .filter(|l| *l > 0 && *l <= limits.max_page_size as i64)
            .unwrap_or(limits.default_page_size as i64);
        PageRequest::new(page, limit)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageMeta {
    pub current: i64,
    pub total: i64,
    pub page_size: i64,
}

/// Paginated response envelope: `{ items, meta: { current, total, page_size } }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub meta: PageMeta,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: i64, request: PageRequest) -> Self {
        Self {
            items,
            meta: PageMeta {
                current: request.page,
                total,
                page_size: request.limit,
            },
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            meta: self.meta,
        }
    }
}
