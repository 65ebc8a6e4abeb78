//! Submission-write transaction manager
//!
//! Commits the SUBMISSION, FILES, and PAGE_TAB writers in that order.
//! Commits are not cross-writer atomic: a failing commit aborts the batch
//! and leaves partial state that becomes visible only after a restart. The
//! contract callers rely on is "all three writers are flushed before
//! searchers refresh".

use std::sync::Arc;

use tracing::warn;

use crate::error::SearchResult;
use crate::index_manager::{IndexManager, IndexName};

/// Coordinates commits across the three submission-related writers.
#[derive(Clone)]
pub struct TransactionManager {
    manager: Arc<IndexManager>,
}

impl TransactionManager {
    #[must_use]
    pub const fn new(manager: Arc<IndexManager>) -> Self {
        Self { manager }
    }

    /// Commit SUBMISSION, FILES, and PAGE_TAB, in that order. The first
    /// failure aborts the sequence.
    pub fn commit(&self) -> SearchResult<()> {
        for name in IndexName::SUBMISSION_RELATED {
            self.manager.commit(name)?;
        }
        Ok(())
    }

    /// Advisory rollback of uncommitted changes on all three writers.
    /// Failures are logged; the underlying writers only guarantee
    /// best-effort discards.
    pub fn rollback(&self) {
        for name in IndexName::SUBMISSION_RELATED {
            if let Err(e) = self.manager.rollback(name) {
                warn!(index = name.dir_name(), error = %e, "rollback failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::AnalyzerDispatch;
    use crate::registry::CollectionRegistry;
    use tantivy::TantivyDocument;
    use tantivy::collector::Count;
    use tantivy::query::AllQuery;

    fn manager() -> (tempfile::TempDir, Arc<IndexManager>) {
        let dir = tempfile::tempdir().unwrap();
        let registry = CollectionRegistry::from_json_str(
            r#"[{"collectionName": "public", "properties": [
                {"name": "accession", "fieldType": "untokenized_string", "jsonPath": ["$.accNo"]}
            ]}]"#,
        )
        .unwrap();
        let dispatch = AnalyzerDispatch::from_registry(&registry);
        let manager =
            IndexManager::open_without_reopen(dir.path(), &registry, &dispatch, &[]).unwrap();
        (dir, Arc::new(manager))
    }

    #[test]
    fn commit_flushes_all_three_writers() {
        let (_dir, manager) = manager();
        let txn = TransactionManager::new(Arc::clone(&manager));
        let schemas = manager.schemas();

        let mut sub = TantivyDocument::default();
        sub.add_text(schemas.submission.accession, "S-BSST1");
        manager
            .writer(IndexName::Submission)
            .add_document(sub)
            .unwrap();

        let mut file = TantivyDocument::default();
        file.add_text(schemas.files.accession, "S-BSST1");
        manager.writer(IndexName::Files).add_document(file).unwrap();

        let mut page_tab = TantivyDocument::default();
        page_tab.add_text(schemas.page_tab.accession, "S-BSST1");
        manager
            .writer(IndexName::PageTab)
            .add_document(page_tab)
            .unwrap();

        txn.commit().unwrap();
        manager.refresh_all();

        for name in IndexName::SUBMISSION_RELATED {
            let lease = manager.acquire_searcher(name);
            assert_eq!(lease.search(&AllQuery, &Count).unwrap(), 1);
        }
    }

    #[test]
    fn rollback_is_best_effort_and_quiet() {
        let (_dir, manager) = manager();
        let txn = TransactionManager::new(Arc::clone(&manager));
        let schemas = manager.schemas();

        let mut sub = TantivyDocument::default();
        sub.add_text(schemas.submission.accession, "S-BSST2");
        manager
            .writer(IndexName::Submission)
            .add_document(sub)
            .unwrap();

        txn.rollback();
        txn.commit().unwrap();
        manager.refresh_all();

        let lease = manager.acquire_searcher(IndexName::Submission);
        assert_eq!(lease.search(&AllQuery, &Count).unwrap(), 0);
    }
}
