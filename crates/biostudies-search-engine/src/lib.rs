//! Search and indexing engine for BioStudies submission records
//!
//! Four coordinated tantivy indices (SUBMISSION, FILES, PAGE_TAB, EFO)
//! behind a single service container:
//! - [`CollectionRegistry`] — schema-directed field extraction (JSONPath →
//!   typed, analyzed fields)
//! - [`IndexManager`] — writers, manually-reloaded readers, background
//!   reopen workers, ref-counted searcher leases
//! - [`SubmissionIndexer`] — extended submissions → documents for the three
//!   submission-related indices
//! - [`efo`] — the ontology subsystem: arena model, index build, query
//!   expansion, in-memory matcher
//! - [`query`] — preprocessing, registry-aware building, security
//!   filtering, execution, document mapping
//! - [`TaxonomySearch`] — hierarchical facet autocomplete with counts
//! - [`SpellSuggester`] — cascading direct spell checker

#![forbid(unsafe_code)]

pub mod analyzers;
pub mod container;
pub mod efo;
pub mod error;
pub mod file_search;
pub mod index_manager;
pub mod json_path;
pub mod page_tab;
pub mod parsers;
pub mod query;
pub mod registry;
pub mod schema;
pub mod submission_indexer;
pub mod suggest;
pub mod taxonomy;
pub mod txn;

pub use analyzers::{AnalyzerDispatch, AnalyzerKind};
pub use container::SearchService;
pub use error::{SearchError, SearchResult};
pub use file_search::{FileHit, FilePage, FileSearch};
pub use page_tab::PageTabStore;
pub use index_manager::{IndexManager, IndexName, SearcherLease};
pub use parsers::ParserKind;
pub use query::{QueryEngine, SearchHit, SearchRequest, SearchResponse, SortOrder};
pub use registry::{CollectionDescriptor, CollectionRegistry, FieldType, PropertyDescriptor};
pub use submission_indexer::SubmissionIndexer;
pub use suggest::SpellSuggester;
pub use taxonomy::{TaxonomyEntry, TaxonomySearch};
pub use txn::TransactionManager;
