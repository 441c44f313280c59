//! Offset pagination shared by every listing endpoint.

use serde::{Deserialize, Serialize};

pub const DEFAULT_PER_PAGE: u32 = 20;
pub const MAX_PER_PAGE: u32 = 100;

/// Raw `page` / `perPage` query values as sent by clients.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// Normalized page request: `page >= 1`, `per_page` within `1..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub per_page: u32,
}

impl PageRequest {
    pub fn new(page: Option<i64>, per_page: Option<i64>) -> Self {
        let page = page
            .filter(|value| *value >= 1)
            .map(|value| value.min(u32::MAX as i64) as u32)
            .unwrap_or(1);
        let per_page = per_page
            .map(|value| value.clamp(1, MAX_PER_PAGE as i64) as u32)
            .unwrap_or(DEFAULT_PER_PAGE);
        Self { page, per_page }
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.per_page)
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.per_page)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

impl From<PageQuery> for PageRequest {
    fn from(query: PageQuery) -> Self {
        Self::new(query.page, query.per_page)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub total: u64,
    pub last_page: u64,
    pub current_page: u32,
    pub per_page: u32,
    pub prev: Option<u32>,
    pub next: Option<u32>,
}

impl PageMeta {
    pub fn new(total: u64, request: PageRequest) -> Self {
        let last_page = total.div_ceil(u64::from(request.per_page));
        let prev = (request.page > 1).then(|| request.page - 1);
        let next = (u64::from(request.page) < last_page).then(|| request.page + 1);
        Self {
            total,
            last_page,
            current_page: request.page,
            per_page: request.per_page,
            prev,
            next,
        }
    }
}

/// `{ data, meta }` envelope returned by paginated endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub meta: PageMeta,
}

impl<T> Paginated<T> {
    pub fn new(data: Vec<T>, total: u64, request: PageRequest) -> Self {
        Self {
            data,
            meta: PageMeta::new(total, request),
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Paginated<U> {
        Paginated {
            data: self.data.into_iter().map(f).collect(),
            meta: self.meta,
        }
    }
}
