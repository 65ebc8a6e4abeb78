//! Exact page-tab retrieval
//!
//! The PAGE_TAB index carries one document per submission with its
//! normalized JSON representation; this is the exact-retrieval path the
//! REST layer serves for `pagetab` downloads.

use std::sync::Arc;

use tantivy::TantivyDocument;
use tantivy::collector::TopDocs;
use tantivy::query::TermQuery;
use tantivy::schema::{IndexRecordOption, Term, Value};

use crate::error::SearchResult;
use crate::index_manager::{IndexManager, IndexName};

/// Reads the PAGE_TAB index.
pub struct PageTabStore {
    manager: Arc<IndexManager>,
}

impl PageTabStore {
    #[must_use]
    pub const fn new(manager: Arc<IndexManager>) -> Self {
        Self { manager }
    }

    /// The stored page-tab JSON of an accession, or `None` when the
    /// submission is not indexed.
    pub fn fetch(&self, acc_no: &str) -> SearchResult<Option<String>> {
        let page_tab = self.manager.schemas().page_tab;
        let query = TermQuery::new(
            Term::from_field_text(page_tab.accession, acc_no),
            IndexRecordOption::Basic,
        );

        let lease = self.manager.acquire_searcher(IndexName::PageTab);
        let top = lease.search(&query, &TopDocs::with_limit(1))?;
        let Some((_score, address)) = top.into_iter().next() else {
            return Ok(None);
        };
        let doc: TantivyDocument = lease.doc(address)?;
        Ok(doc
            .get_first(page_tab.page_tab)
            .and_then(|v| v.as_str())
            .map(ToString::to_string))
    }
}
