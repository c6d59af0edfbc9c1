//! Pagination arithmetic for listing queries

use serde::Serialize;

/// Requested page, 1-indexed, with a non-zero size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PageRequest {
    pub number: u32,
    pub size: u32,
}

impl PageRequest {
    /// Construct a request, raising zero values to 1
    pub fn new(number: u32, size: u32) -> Self {
        Self {
            number: number.max(1),
            size: size.max(1),
        }
    }

    /// Offset for SQL LIMIT/OFFSET
    pub fn offset(&self) -> i64 {
        (i64::from(self.number) - 1) * i64::from(self.size)
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.size)
    }
}

/// Pagination metadata calculated from total results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    /// Current page number (1-indexed), as requested
    pub page: u32,
    pub page_size: u32,
    pub total_items: i64,
    pub total_pages: i64,
    pub offset: i64,
}

impl Pagination {
    /// Whether the requested page lies past the last result
    pub fn is_beyond_end(&self) -> bool {
        self.offset >= self.total_items
    }
}

/// Calculate pagination metadata from total results and requested page
///
/// The page number is not clamped: a page past the end keeps its number and
/// selects zero rows.
///
/// # Examples
/// ```
/// use mlib_catalog::query::pagination::{calculate_pagination, PageRequest};
///
/// // 25 total results at 10 per page = 3 pages (10 + 10 + 5)
/// let p = calculate_pagination(25, PageRequest::new(2, 10));
/// assert_eq!(p.total_pages, 3);
/// assert_eq!(p.offset, 10);
///
/// // Page 4 is past the end
/// let p = calculate_pagination(25, PageRequest::new(4, 10));
/// assert_eq!(p.page, 4);
/// assert!(p.is_beyond_end());
/// ```
pub fn calculate_pagination(total_items: i64, request: PageRequest) -> Pagination {
    let size = i64::from(request.size);
    let total_items = total_items.max(0);
    let total_pages = (total_items + size - 1) / size;

    Pagination {
        page: request.number,
        page_size: request.size,
        total_items,
        total_pages,
        offset: request.offset(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_normal() {
        let p = calculate_pagination(250, PageRequest::new(2, 100));
        assert_eq!(p.page, 2);
        assert_eq!(p.total_pages, 3);
        assert_eq!(p.offset, 100);
        assert!(!p.is_beyond_end());
    }

    #[test]
    fn test_pagination_last_partial_page() {
        let p = calculate_pagination(25, PageRequest::new(3, 10));
        assert_eq!(p.total_pages, 3);
        assert_eq!(p.offset, 20);
        assert!(!p.is_beyond_end());
    }

    #[test]
    fn test_pagination_beyond_end_is_not_clamped() {
        let p = calculate_pagination(25, PageRequest::new(4, 10));
        assert_eq!(p.page, 4);
        assert_eq!(p.total_pages, 3);
        assert_eq!(p.offset, 30);
        assert!(p.is_beyond_end());
    }

    #[test]
    fn test_pagination_empty() {
        let p = calculate_pagination(0, PageRequest::new(1, 10));
        assert_eq!(p.page, 1);
        assert_eq!(p.total_pages, 0);
        assert_eq!(p.offset, 0);
        assert!(p.is_beyond_end());
    }

    #[test]
    fn test_pagination_exact_page_boundary() {
        let p = calculate_pagination(200, PageRequest::new(2, 100));
        assert_eq!(p.total_pages, 2);
        assert_eq!(p.offset, 100);
    }

    #[test]
    fn test_page_request_raises_zero() {
        let request = PageRequest::new(0, 0);
        assert_eq!(request.number, 1);
        assert_eq!(request.size, 1);
        assert_eq!(request.offset(), 0);
    }
}
