//! Offset pagination for file listings.

use serde::Serialize;

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_LIMIT: u32 = 10;
pub const MAX_LIMIT: u32 = 100;

/// A validated page window. Construction never fails: out-of-range input
/// falls back to the defaults and oversized limits are capped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: u32,
    limit: u32,
}

impl PageRequest {
    pub fn new(page: Option<i64>, limit: Option<i64>) -> Self {
        let page = page
            .filter(|value| *value > 0)
            .and_then(|value| u32::try_from(value).ok())
            .unwrap_or(DEFAULT_PAGE);
        let limit = limit
            .filter(|value| *value > 0)
            .map(|value| value.min(i64::from(MAX_LIMIT)) as u32)
            .unwrap_or(DEFAULT_LIMIT);
        Self { page, limit }
    }

    /// Parse raw query values; anything that is not a positive integer is ignored.
    pub fn from_query(page: Option<&str>, limit: Option<&str>) -> Self {
        let parse = |raw: Option<&str>| raw.and_then(|value| value.trim().parse::<i64>().ok());
        Self::new(parse(page), parse(limit))
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageInfo {
    pub page: u32,
    pub limit: u32,
    pub total_rows: u64,
    pub total_pages: u64,
}

impl PageInfo {
    pub fn new(request: PageRequest, total_rows: u64) -> Self {
        Self {
            page: request.page,
            limit: request.limit,
            total_rows,
            total_pages: total_rows.div_ceil(u64::from(request.limit)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OffsetPage<T> {
    pub items: Vec<T>,
    pub total_rows: u64,
}

impl<T> OffsetPage<T> {
    pub fn new(items: Vec<T>, total_rows: u64) -> Self {
        Self { items, total_rows }
    }
}
