//! Paging and ordering shared by list endpoints.

use serde::Serialize;

pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;
pub const MAX_PAGE: i64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    /// Anything other than `asc`/`desc` falls back to descending.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|value| value.trim().to_ascii_lowercase()).as_deref() {
            Some("asc") => SortDirection::Asc,
            _ => SortDirection::Desc,
        }
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Normalised page request: `page` is 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub page_size: i64,
}

impl PageRequest {
    pub fn new(page: Option<i64>, page_size: Option<i64>) -> Self {
        Self {
            page: page.unwrap_or(DEFAULT_PAGE).clamp(1, MAX_PAGE),
            page_size: page_size
                .unwrap_or(DEFAULT_PAGE_SIZE)
                .clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.page_size
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageMetadata {
    pub total_count: i64,
    pub total_pages: i64,
    pub page: i64,
    pub page_size: i64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl PageMetadata {
    pub fn new(request: PageRequest, total_count: i64) -> Self {
        let total_count = total_count.max(0);
        let total_pages = (total_count + request.page_size - 1) / request.page_size;
        Self {
            total_count,
            total_pages,
            page: request.page,
            page_size: request.page_size,
            has_next: request.page < total_pages,
            has_prev: request.page > 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_request_clamps_out_of_range_values() {
        let request = PageRequest::new(Some(0), Some(5_000));
        assert_eq!(request.page, 1);
        assert_eq!(request.page_size, MAX_PAGE_SIZE);
        assert_eq!(request.offset(), 0);

        let request = PageRequest::new(None, None);
        assert_eq!(request.page_size, DEFAULT_PAGE_SIZE);

        let request = PageRequest::new(Some(3), Some(10));
        assert_eq!(request.offset(), 20);
    }

    #[test]
    fn metadata_rounds_pages_up() {
        let meta = PageMetadata::new(PageRequest::new(Some(2), Some(10)), 21);
        assert_eq!(meta.total_pages, 3);
        assert!(meta.has_next);
        assert!(meta.has_prev);

        let meta = PageMetadata::new(PageRequest::new(Some(1), Some(10)), 0);
        assert_eq!(meta.total_pages, 0);
        assert!(!meta.has_next);
        assert!(!meta.has_prev);
    }

    #[test]
    fn unknown_direction_defaults_to_descending() {
        assert_eq!(SortDirection::parse(Some("ASC")), SortDirection::Asc);
        assert_eq!(SortDirection::parse(Some("sideways")), SortDirection::Desc);
        assert_eq!(SortDirection::parse(None), SortDirection::Desc);
    }
}
