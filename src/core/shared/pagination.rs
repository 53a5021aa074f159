use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 200;

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl PageParams {
    pub fn new(limit: Option<i64>, offset: Option<i64>) -> Self {
        Self { limit, offset }
    }

    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub count: i64,
    pub limit: i64,
    pub offset: i64,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    pub fn new(count: i64, params: PageParams, results: Vec<T>) -> Self {
        Self {
            count,
            limit: params.limit(),
            offset: params.offset(),
            results,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            count: self.count,
            limit: self.limit,
            offset: self.offset,
            results: self.results.into_iter().map(f).collect(),
        }
    }
}

/// Splits an ordering parameter such as `-votes_count` into field and direction.
pub fn parse_ordering(ordering: &str) -> (&str, bool) {
    match ordering.strip_prefix('-') {
        Some(field) => (field, true),
        None => (ordering, false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_bounds_are_clamped() {
        let params = PageParams::new(Some(10_000), Some(-5));
        assert_eq!(params.limit(), MAX_PAGE_SIZE);
        assert_eq!(params.offset(), 0);
        assert_eq!(PageParams::default().limit(), DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn test_parse_ordering() {
        assert_eq!(parse_ordering("-created_at"), ("created_at", true));
        assert_eq!(parse_ordering("votes_count"), ("votes_count", false));
    }
}
