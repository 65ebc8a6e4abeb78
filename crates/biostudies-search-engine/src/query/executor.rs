//! Query execution and document mapping
//!
//! Acquires a SUBMISSION searcher, runs the composed query with pagination
//! and sort, maps hits to result DTOs, computes facet counts and highlight
//! snippets, and falls back to the spell cascade when nothing matched. The
//! searcher lease is released on every exit path.

use std::collections::BTreeMap;
use std::sync::Arc;

use tantivy::collector::{Count, FacetCollector, MultiCollector, TopDocs};
use tantivy::query::Query;
use tantivy::schema::{Facet, Value};
use tantivy::snippet::SnippetGenerator;
use tantivy::{DocAddress, Order, TantivyDocument};
use tracing::warn;

use biostudies_search_core::UserContext;

use crate::error::SearchResult;
use crate::index_manager::{IndexManager, IndexName, SearcherLease};
use crate::query::preprocess::{PreparedRequest, Sort, preprocess};
use crate::query::{
    FacetValueCount, QueryBuilder, SearchHit, SearchRequest, SearchResponse, SortOrder,
};
use crate::registry::{CollectionRegistry, FieldType};
use crate::schema::SubmissionSchema;
use crate::suggest::SpellSuggester;

/// Number of spell suggestions attached to empty result sets.
const SUGGESTION_LIMIT: usize = 5;

/// Highlight fragment budget, in characters.
const SNIPPET_MAX_CHARS: usize = 220;

/// Executes search requests against the SUBMISSION index.
pub struct QueryEngine {
    manager: Arc<IndexManager>,
    registry: Arc<CollectionRegistry>,
    builder: QueryBuilder,
    suggester: SpellSuggester,
}

impl QueryEngine {
    #[must_use]
    pub fn new(
        manager: Arc<IndexManager>,
        registry: Arc<CollectionRegistry>,
        builder: QueryBuilder,
    ) -> Self {
        let suggester = SpellSuggester::new(Arc::clone(&manager));
        Self {
            manager,
            registry,
            builder,
            suggester,
        }
    }

    /// Run one search request for one user.
    pub fn search(
        &self,
        request: &SearchRequest,
        user: &UserContext,
    ) -> SearchResult<SearchResponse> {
        let prepared = preprocess(request);
        let query = self.builder.build(&prepared, user)?;
        let lease = self.manager.acquire_searcher(IndexName::Submission);

        let (total, addresses, facets) = self.execute(&lease, &prepared, &*query)?;

        let schema = &self.manager.schemas().submission;
        let snippets = if prepared.highlight {
            match SnippetGenerator::create(&lease, &*query, schema.content) {
                Ok(mut generator) => {
                    generator.set_max_num_chars(SNIPPET_MAX_CHARS);
                    Some(generator)
                }
                Err(e) => {
                    warn!(error = %e, "snippet generator unavailable");
                    None
                }
            }
        } else {
            None
        };

        let mut hits = Vec::with_capacity(addresses.len());
        for address in addresses {
            let doc: TantivyDocument = lease.doc(address)?;
            let mut hit = self.map_document(schema, &doc);
            if let Some(generator) = &snippets {
                let html = generator.snippet_from_doc(&doc).to_html();
                if !html.is_empty() {
                    hit.highlight = Some(html);
                }
            }
            hits.push(hit);
        }
        drop(lease);

        let suggestions = if total == 0 && !prepared.query.is_empty() {
            self.suggester.suggest_similar(&prepared.query, SUGGESTION_LIMIT)
        } else {
            Vec::new()
        };

        Ok(SearchResponse {
            total,
            page: prepared.page,
            page_size: prepared.page_size,
            hits,
            facets,
            suggestions,
        })
    }

    #[allow(clippy::type_complexity)]
    fn execute(
        &self,
        lease: &SearcherLease,
        prepared: &PreparedRequest,
        query: &dyn Query,
    ) -> SearchResult<(usize, Vec<DocAddress>, BTreeMap<String, Vec<FacetValueCount>>)> {
        let schema = &self.manager.schemas().submission;
        let limit = prepared.page_size.max(1);
        let offset = prepared.offset();

        let sort_field = self.resolve_sort(&prepared.sort);
        let mut multi = MultiCollector::new();
        let count_handle = multi.add_collector(Count);
        let facet_handles: Vec<(String, _)> = schema
            .facet_names()
            .iter()
            .map(|name| {
                let mut collector = FacetCollector::for_field(name.clone());
                collector.add_facet(Facet::root());
                (name.clone(), multi.add_collector(collector))
            })
            .collect();

        let addresses: Vec<DocAddress>;
        let mut fruits;
        match &sort_field {
            None => {
                let top_handle =
                    multi.add_collector(TopDocs::with_limit(limit).and_offset(offset));
                fruits = lease.search(query, &multi)?;
                addresses = top_handle
                    .extract(&mut fruits)
                    .into_iter()
                    .map(|(_score, address)| address)
                    .collect();
            }
            Some((name, order)) => {
                let collector = TopDocs::with_limit(limit)
                    .and_offset(offset)
                    .order_by_fast_field::<i64>(name.as_str(), order.clone());
                let top_handle = multi.add_collector(collector);
                fruits = lease.search(query, &multi)?;
                addresses = top_handle
                    .extract(&mut fruits)
                    .into_iter()
                    .map(|(_value, address)| address)
                    .collect();
            }
        }

        let total = count_handle.extract(&mut fruits);

        let mut facets = BTreeMap::new();
        for (name, handle) in facet_handles {
            let counts = handle.extract(&mut fruits);
            let values: Vec<FacetValueCount> = counts
                .get(Facet::root())
                .map(|(facet, count)| FacetValueCount {
                    value: facet.to_path().join("/"),
                    count,
                })
                .collect();
            if !values.is_empty() {
                facets.insert(name, values);
            }
        }

        Ok((total, addresses, facets))
    }

    /// Resolve a field sort to a sortable LONG fast field; anything else
    /// falls back to relevance.
    fn resolve_sort(&self, sort: &Sort) -> Option<(String, Order)> {
        let Sort::Field { name, order } = sort else {
            return None;
        };
        let sortable_long = self
            .registry
            .property(name)
            .is_some_and(|p| p.field_type == FieldType::Long);
        if !sortable_long {
            warn!(field = %name, "sort field is not a numeric property; using relevance");
            return None;
        }
        let order = match order {
            SortOrder::Asc => Order::Asc,
            SortOrder::Desc => Order::Desc,
        };
        Some((name.clone(), order))
    }

    fn map_document(&self, schema: &SubmissionSchema, doc: &TantivyDocument) -> SearchHit {
        let text = |name: &str| -> String {
            schema
                .field(name)
                .and_then(|field| doc.get_first(field))
                .and_then(|value| value.as_str())
                .unwrap_or_default()
                .to_string()
        };
        let number = |name: &str| -> i64 {
            schema
                .field(name)
                .and_then(|field| doc.get_first(field))
                .and_then(|value| value.as_i64())
                .unwrap_or_default()
        };

        SearchHit {
            accession: text("accession"),
            submission_type: text("type"),
            title: text("title"),
            author: text("author"),
            links: number("links"),
            files: number("files"),
            release_date: text("release_date"),
            views: number("views"),
            is_public: doc
                .get_first(schema.is_public)
                .and_then(|value| value.as_str())
                == Some("true"),
            content: text("content"),
            highlight: None,
        }
    }
}
