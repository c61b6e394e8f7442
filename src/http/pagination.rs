//! Offset pagination for list routes.

use serde::{Deserialize, Serialize};

use crate::store::Window;

pub const DEFAULT_LIMIT: u64 = 20;
pub const MAX_LIMIT: u64 = 100;

/// Raw `?page=&limit=` query. Kept as text so junk values fall back to
/// defaults instead of rejecting the request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u64,
    pub limit: u64,
    pub skip: u64,
}

impl Pagination {
    pub fn window(&self) -> Window {
        Window {
            skip: self.skip,
            limit: self.limit,
        }
    }

    pub fn meta(&self, total: u64) -> PaginationMeta {
        let total_pages = total.div_ceil(self.limit);
        PaginationMeta {
            page: self.page,
            limit: self.limit,
            total,
            total_pages,
            has_next_page: self.page < total_pages,
            has_prev_page: self.page > 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationMeta {
    pub page: u64,
    pub limit: u64,
    pub total: u64,
    pub total_pages: u64,
    pub has_next_page: bool,
    pub has_prev_page: bool,
}

/// Leading-integer parse: "3abc" → 3, "-2" → -2, "x" → None.
fn parse_leading_int(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    let end = raw
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || (i == 0 && (c == '-' || c == '+'))))
        .map(|(i, _)| i)
        .unwrap_or(raw.len());
    raw[..end].parse().ok()
}

/// Clamp `page` to at least 1 and `limit` to `1..=100`, default 20.
pub fn validate_pagination(query: &PageQuery) -> Pagination {
    let page = query
        .page
        .as_deref()
        .and_then(parse_leading_int)
        .unwrap_or(1)
        .max(1) as u64;
    let limit = query
        .limit
        .as_deref()
        .and_then(parse_leading_int)
        .unwrap_or(DEFAULT_LIMIT as i64)
        .clamp(1, MAX_LIMIT as i64) as u64;

    Pagination {
        page,
        limit,
        skip: (page - 1).saturating_mul(limit),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(page: Option<&str>, limit: Option<&str>) -> PageQuery {
        PageQuery {
            page: page.map(String::from),
            limit: limit.map(String::from),
        }
    }

    #[test]
    fn test_defaults() {
        let p = validate_pagination(&PageQuery::default());
        assert_eq!(p, Pagination { page: 1, limit: 20, skip: 0 });
    }

    #[test]
    fn test_clamping() {
        assert_eq!(validate_pagination(&query(Some("0"), Some("500"))).limit, 100);
        assert_eq!(validate_pagination(&query(Some("-4"), Some("0"))).page, 1);
        assert_eq!(validate_pagination(&query(None, Some("0"))).limit, 1);
        assert_eq!(validate_pagination(&query(Some("3"), Some("10"))).skip, 20);
    }

    #[test]
    fn test_junk_falls_back_to_defaults() {
        let p = validate_pagination(&query(Some("abc"), Some("")));
        assert_eq!((p.page, p.limit), (1, 20));
        assert_eq!(validate_pagination(&query(Some("2x"), None)).page, 2);
    }

    #[test]
    fn test_meta() {
        let p = validate_pagination(&query(Some("2"), Some("10")));
        let meta = p.meta(25);
        assert_eq!(meta.total_pages, 3);
        assert!(meta.has_next_page);
        assert!(meta.has_prev_page);

        let last = validate_pagination(&query(Some("3"), Some("10"))).meta(25);
        assert!(!last.has_next_page);
    }
}
