use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Raw `page` / `page_size` query parameters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
}

impl Pagination {
    pub fn new(page: u32, page_size: u32) -> Self {
        Self { page, page_size }
    }

    /// Out-of-range values fall back to the defaults rather than erroring.
    pub fn from_query(query: &PageQuery) -> Self {
        let page = match query.page {
            Some(p) if p >= 1 => p.min(u32::MAX as i64) as u32,
            _ => 1,
        };
        let page_size = match query.page_size {
            Some(s) if s >= 1 && s <= MAX_PAGE_SIZE as i64 => s as u32,
            _ => DEFAULT_PAGE_SIZE,
        };
        Self { page, page_size }
    }

    pub fn limit(&self) -> u32 {
        self.page_size
    }

    pub fn offset(&self) -> u64 {
        (self.page as u64 - 1) * self.page_size as u64
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(1, DEFAULT_PAGE_SIZE)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total_count: i64,
    pub page: u32,
    pub page_size: u32,
}

impl<T> PaginatedResponse<T> {
    pub fn new(items: Vec<T>, total_count: i64, pagination: Pagination) -> Self {
        Self {
            items,
            total_count,
            page: pagination.page,
            page_size: pagination.page_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_missing_or_invalid() {
        let p = Pagination::from_query(&PageQuery { page: Some(0), page_size: Some(500) });
        assert_eq!(p, Pagination::new(1, DEFAULT_PAGE_SIZE));

        let p = Pagination::from_query(&PageQuery::default());
        assert_eq!(p, Pagination::default());
    }

    #[test]
    fn offset_is_zero_based() {
        let p = Pagination::from_query(&PageQuery { page: Some(3), page_size: Some(25) });
        assert_eq!(p.limit(), 25);
        assert_eq!(p.offset(), 50);
    }
}
