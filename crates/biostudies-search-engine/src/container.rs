//! Top-level service container
//!
//! Owns the registry, analyzer dispatch, index manager, EFO matcher, and
//! the components built on top of them. Everything is initialized before
//! the container is handed out, so callers never observe a half-built
//! engine; process-wide mutable state does not exist.

use std::sync::Arc;

use tracing::info;

use biostudies_search_core::{Config, UserContext};

use crate::analyzers::AnalyzerDispatch;
use crate::efo::{EfoIndexer, EfoTermMatcher, OntologySource};
use crate::error::SearchResult;
use crate::file_search::FileSearch;
use crate::index_manager::IndexManager;
use crate::page_tab::PageTabStore;
use crate::query::{QueryBuilder, QueryEngine, SearchRequest, SearchResponse};
use crate::registry::CollectionRegistry;
use crate::submission_indexer::SubmissionIndexer;
use crate::suggest::SpellSuggester;
use crate::taxonomy::{TaxonomyEntry, TaxonomySearch};
use crate::txn::TransactionManager;

/// The assembled search engine.
pub struct SearchService {
    config: Config,
    registry: Arc<CollectionRegistry>,
    manager: Arc<IndexManager>,
    matcher: Arc<EfoTermMatcher>,
    indexer: SubmissionIndexer,
    efo_indexer: EfoIndexer,
    engine: QueryEngine,
    taxonomy: TaxonomySearch,
    suggester: SpellSuggester,
    file_search: FileSearch,
    page_tab: PageTabStore,
    txn: TransactionManager,
}

impl SearchService {
    /// Open the service, loading the registry from the configured path.
    pub fn open(config: Config) -> SearchResult<Self> {
        let registry = CollectionRegistry::load(&config.registry_path)?;
        Self::open_with_registry(config, registry)
    }

    /// Open the service with an already-loaded registry.
    pub fn open_with_registry(
        config: Config,
        registry: CollectionRegistry,
    ) -> SearchResult<Self> {
        Self::open_inner(config, registry, true)
    }

    /// Test variant without background reopen workers: commits become
    /// visible through explicit refreshes only.
    pub fn open_for_testing(config: Config, registry: CollectionRegistry) -> SearchResult<Self> {
        Self::open_inner(config, registry, false)
    }

    fn open_inner(
        config: Config,
        registry: CollectionRegistry,
        reopen_workers: bool,
    ) -> SearchResult<Self> {
        let registry = Arc::new(registry);
        let dispatch = AnalyzerDispatch::from_registry(&registry);
        let manager = if reopen_workers {
            IndexManager::open(
                &config.index_base_dir,
                &registry,
                &dispatch,
                &config.stopwords,
            )?
        } else {
            IndexManager::open_without_reopen(
                &config.index_base_dir,
                &registry,
                &dispatch,
                &config.stopwords,
            )?
        };
        let manager = Arc::new(manager);

        // Rebuild the matcher from whatever EFO state survived on disk;
        // empty indices initialize to an empty matcher.
        let matcher = Arc::new(EfoTermMatcher::new());
        matcher.initialize(&manager)?;

        let indexer = SubmissionIndexer::new(
            Arc::clone(&manager),
            Arc::clone(&registry),
            Arc::clone(&matcher),
        );
        let efo_indexer = EfoIndexer::new(Arc::clone(&manager), &config.stopwords);
        let builder = QueryBuilder::new(
            Arc::clone(&manager),
            Arc::clone(&registry),
            dispatch,
            config.excluded_document_types.clone(),
        );
        let engine = QueryEngine::new(Arc::clone(&manager), Arc::clone(&registry), builder);
        let taxonomy = TaxonomySearch::new(Arc::clone(&manager), Arc::clone(&matcher));
        let suggester = SpellSuggester::new(Arc::clone(&manager));
        let file_search = FileSearch::new(Arc::clone(&manager));
        let page_tab = PageTabStore::new(Arc::clone(&manager));
        let txn = TransactionManager::new(Arc::clone(&manager));

        info!(
            collections = registry.collections().len(),
            properties = registry.property_count(),
            "search service ready"
        );
        Ok(Self {
            config,
            registry,
            manager,
            matcher,
            indexer,
            efo_indexer,
            engine,
            taxonomy,
            suggester,
            file_search,
            page_tab,
            txn,
        })
    }

    /// Load an ontology, rebuild the EFO index, and refresh the matcher.
    pub fn load_ontology(&self, source: &dyn OntologySource) -> SearchResult<()> {
        let model = source.load()?;
        self.efo_indexer.index_model(&model)?;
        self.matcher.initialize(&self.manager)
    }

    /// Run a search for a user.
    pub fn search(
        &self,
        request: &SearchRequest,
        user: &UserContext,
    ) -> SearchResult<SearchResponse> {
        self.engine.search(request, user)
    }

    /// Hierarchical keyword autocomplete, one formatted line per entry.
    pub fn autocomplete(&self, prefix: &str, limit: usize) -> SearchResult<String> {
        let entries = self.taxonomy.search_all_depths(prefix, limit)?;
        Ok(entries
            .iter()
            .map(TaxonomyEntry::format_line)
            .collect::<Vec<_>>()
            .join("\n"))
    }

    /// Spell suggestions for a query.
    #[must_use]
    pub fn suggest(&self, query: &str, max: usize) -> Vec<String> {
        self.suggester.suggest_similar(query, max)
    }

    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn registry(&self) -> &CollectionRegistry {
        &self.registry
    }

    #[must_use]
    pub const fn manager(&self) -> &Arc<IndexManager> {
        &self.manager
    }

    #[must_use]
    pub const fn matcher(&self) -> &Arc<EfoTermMatcher> {
        &self.matcher
    }

    #[must_use]
    pub const fn indexer(&self) -> &SubmissionIndexer {
        &self.indexer
    }

    #[must_use]
    pub const fn taxonomy(&self) -> &TaxonomySearch {
        &self.taxonomy
    }

    #[must_use]
    pub const fn files(&self) -> &FileSearch {
        &self.file_search
    }

    #[must_use]
    pub const fn page_tab(&self) -> &PageTabStore {
        &self.page_tab
    }

    #[must_use]
    pub const fn txn(&self) -> &TransactionManager {
        &self.txn
    }

    /// Flush and shut everything down. A no-op for the index manager when
    /// another holder still keeps it alive.
    pub fn close(self) -> SearchResult<()> {
        let Self {
            manager,
            indexer,
            efo_indexer,
            engine,
            taxonomy,
            suggester,
            file_search,
            page_tab,
            txn,
            ..
        } = self;
        drop((indexer, efo_indexer, engine, taxonomy, suggester, file_search, page_tab, txn));
        match Arc::into_inner(manager) {
            Some(manager) => manager.close(),
            None => Ok(()),
        }
    }
}
