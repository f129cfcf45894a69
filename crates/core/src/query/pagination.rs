use serde::Serialize;

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

/// A normalized page request. Out-of-range input is replaced by defaults, never rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub page_size: i64,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageRequest {
    pub fn new(page: i64, page_size: i64) -> Self {
        Self {
            page: if page < 1 { 1 } else { page },
            page_size: if (1..=MAX_PAGE_SIZE).contains(&page_size) {
                page_size
            } else {
                DEFAULT_PAGE_SIZE
            },
        }
    }

    /// Raw query-string values; anything unparsable falls back to the defaults.
    pub fn parse(page: Option<&str>, page_size: Option<&str>) -> Self {
        let page = page.and_then(|s| s.trim().parse().ok()).unwrap_or(1);
        let page_size = page_size
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(DEFAULT_PAGE_SIZE);
        Self::new(page, page_size)
    }

    pub fn limit(&self) -> i64 {
        self.page_size
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.page_size)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PaginationMeta {
    pub page: i64,
    pub page_size: i64,
    pub total_items: i64,
    pub total_pages: i64,
    pub has_next: bool,
    pub has_previous: bool,
}

impl PaginationMeta {
    /// An empty result still reports one (empty) page.
    pub fn new(req: PageRequest, total_items: i64) -> Self {
        let total_items = total_items.max(0);
        let total_pages = ((total_items + req.page_size - 1) / req.page_size).max(1);
        Self {
            page: req.page,
            page_size: req.page_size,
            total_items,
            total_pages,
            has_next: req.page < total_pages,
            has_previous: req.page > 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Paged<T> {
    pub data: Vec<T>,
    pub meta: PaginationMeta,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_values_normalize_to_defaults() {
        assert_eq!(PageRequest::new(0, 0), PageRequest::default());
        assert_eq!(PageRequest::new(-3, 101), PageRequest::default());
        assert_eq!(PageRequest::new(4, 100), PageRequest { page: 4, page_size: 100 });
        assert_eq!(PageRequest::new(2, 1).offset(), 1);
    }

    #[test]
    fn parse_ignores_garbage() {
        assert_eq!(PageRequest::parse(Some("abc"), Some("")), PageRequest::default());
        assert_eq!(PageRequest::parse(None, None), PageRequest::default());
        assert_eq!(
            PageRequest::parse(Some(" 3 "), Some("50")),
            PageRequest { page: 3, page_size: 50 }
        );
    }

    #[test]
    fn empty_result_has_a_single_page() {
        let meta = PaginationMeta::new(PageRequest::default(), 0);
        assert_eq!(meta.total_pages, 1);
        assert!(!meta.has_next);
        assert!(!meta.has_previous);
    }

    #[test]
    fn total_pages_round_up() {
        let meta = PaginationMeta::new(PageRequest::new(1, 20), 101);
        assert_eq!(meta.total_pages, 6);
        assert!(meta.has_next);

        let last = PaginationMeta::new(PageRequest::new(6, 20), 101);
        assert!(!last.has_next);
        assert!(last.has_previous);

        let exact = PaginationMeta::new(PageRequest::new(1, 20), 100);
        assert_eq!(exact.total_pages, 5);
    }

    #[test]
    fn page_past_the_end_reports_no_next() {
        let meta = PaginationMeta::new(PageRequest::new(9, 20), 30);
        assert_eq!(meta.total_pages, 2);
        assert!(!meta.has_next);
        assert!(meta.has_previous);
    }
}
