//! Query pipeline: request preprocessing, registry-aware query building,
//! security filtering, execution, and document mapping.

pub mod builder;
pub mod executor;
pub mod preprocess;
pub mod security;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use builder::QueryBuilder;
pub use executor::QueryEngine;
pub use preprocess::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, PreparedRequest, Sort, preprocess};
pub use security::apply_security;

/// Sort direction; descending is the default everywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

/// An incoming search request, as the REST layer would deliver it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub query: String,
    /// 1-based page; values below 1 normalize to 1.
    pub page: Option<i64>,
    /// Clamped to [1, 1000], default 20.
    pub page_size: Option<i64>,
    pub sort_by: Option<String>,
    pub sort_order: Option<SortOrder>,
    /// `facet.<name>` / `<facet>[]` parameters, conjunctive.
    #[serde(default)]
    pub facets: Vec<(String, String)>,
    /// `<field>=value` parameters matching registry properties.
    #[serde(default)]
    pub fields: Vec<(String, String)>,
    /// Secret key unlocking otherwise-invisible submissions.
    pub seckey: Option<String>,
}

impl SearchRequest {
    /// Free-text query only, everything else defaulted.
    #[must_use]
    pub fn with_query(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }
}

/// One mapped search hit.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchHit {
    pub accession: String,
    #[serde(rename = "type")]
    pub submission_type: String,
    pub title: String,
    pub author: String,
    pub links: i64,
    pub files: i64,
    pub release_date: String,
    pub views: i64,
    #[serde(rename = "isPublic")]
    pub is_public: bool,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub highlight: Option<String>,
}

/// Count of one facet value within the result set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FacetValueCount {
    pub value: String,
    pub count: u64,
}

/// The complete search response.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchResponse {
    pub total: usize,
    pub page: usize,
    #[serde(rename = "pageSize")]
    pub page_size: usize,
    pub hits: Vec<SearchHit>,
    pub facets: BTreeMap<String, Vec<FacetValueCount>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}
