//! Request preprocessing
//!
//! Normalizes pagination, resolves the sort, and decides whether
//! highlighting applies, before any query is built.

use crate::query::{SearchRequest, SortOrder};
use crate::schema::names;

/// Hard upper bound on the page size.
pub const MAX_PAGE_SIZE: usize = 1000;

/// Page size when the request does not specify one.
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Resolved sort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sort {
    /// Score order; always descending.
    Relevance,
    /// Fast-field order.
    Field { name: String, order: SortOrder },
}

/// A normalized request ready for query building.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub query: String,
    pub page: usize,
    pub page_size: usize,
    pub sort: Sort,
    pub highlight: bool,
    pub facets: Vec<(String, String)>,
    pub fields: Vec<(String, String)>,
    pub seckey: Option<String>,
}

impl PreparedRequest {
    /// Zero-based document offset of the requested page.
    #[must_use]
    pub const fn offset(&self) -> usize {
        (self.page - 1) * self.page_size
    }
}

/// Normalize a raw request.
///
/// An empty query with no sort is a browsing request: newest releases
/// first. A non-empty query with no sort ranks by relevance. Explicit
/// sorts are honored with descending order as the default. `release_date`
/// is a stored display string; sorting on it means the `release_time`
/// fast field.
#[must_use]
pub fn preprocess(request: &SearchRequest) -> PreparedRequest {
    let query = request.query.trim().to_string();

    let page = usize::try_from(request.page.unwrap_or(1).max(1)).unwrap_or(1);
    let page_size = request.page_size.map_or(DEFAULT_PAGE_SIZE, |raw| {
        usize::try_from(raw.clamp(1, MAX_PAGE_SIZE as i64)).unwrap_or(DEFAULT_PAGE_SIZE)
    });

    let order = request.sort_order.unwrap_or(SortOrder::Desc);
    let sort = match request.sort_by.as_deref().map(str::trim) {
        None | Some("") => {
            if query.is_empty() {
                Sort::Field {
                    name: names::RELEASE_TIME.to_string(),
                    order: SortOrder::Desc,
                }
            } else {
                Sort::Relevance
            }
        }
        Some("relevance") => Sort::Relevance,
        Some(name) if name == names::RELEASE_DATE || name == names::RELEASE_TIME => Sort::Field {
            name: names::RELEASE_TIME.to_string(),
            order,
        },
        Some(name) => Sort::Field {
            name: name.to_string(),
            order,
        },
    };

    let highlight = !query.is_empty();

    PreparedRequest {
        query,
        page,
        page_size,
        sort,
        highlight,
        facets: request.facets.clone(),
        fields: request.fields.clone(),
        seckey: request.seckey.clone(),
    }
}
