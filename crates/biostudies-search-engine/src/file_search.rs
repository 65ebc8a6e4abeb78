//! File-level search over the FILES index
//!
//! Every submission contributes one document per referenced file; this
//! module serves the per-submission file listing with optional name
//! filtering and pagination.

use std::sync::Arc;

use tantivy::TantivyDocument;
use tantivy::collector::{Count, TopDocs};
use tantivy::query::{BooleanQuery, Occur, Query, TermQuery};
use tantivy::schema::{IndexRecordOption, Term, Value};
use serde::Serialize;

use crate::analyzers::{AnalyzerKind, analyze};
use crate::error::SearchResult;
use crate::index_manager::{IndexManager, IndexName};

/// One file of a submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileHit {
    #[serde(rename = "fileName")]
    pub file_name: String,
    #[serde(rename = "filePath")]
    pub file_path: String,
    #[serde(rename = "relPath")]
    pub rel_path: String,
    #[serde(rename = "fullPath")]
    pub full_path: String,
    pub md5: String,
    pub size: i64,
    #[serde(rename = "type")]
    pub file_type: String,
    #[serde(rename = "extType")]
    pub ext_type: String,
    #[serde(rename = "isDirectory")]
    pub is_directory: bool,
}

/// Paginated file listing.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FilePage {
    pub total: usize,
    pub files: Vec<FileHit>,
}

/// Reads the FILES index.
pub struct FileSearch {
    manager: Arc<IndexManager>,
}

impl FileSearch {
    #[must_use]
    pub const fn new(manager: Arc<IndexManager>) -> Self {
        Self { manager }
    }

    /// Files of one submission, optionally filtered by file-name tokens,
    /// paginated with a zero-based offset.
    pub fn files_of(
        &self,
        acc_no: &str,
        name_query: Option<&str>,
        offset: usize,
        limit: usize,
    ) -> SearchResult<FilePage> {
        let files = self.manager.schemas().files;
        let index = self.manager.index(IndexName::Files);

        let mut clauses: Vec<(Occur, Box<dyn Query>)> = vec![(
            Occur::Must,
            Box::new(TermQuery::new(
                Term::from_field_text(files.accession, acc_no),
                IndexRecordOption::Basic,
            )),
        )];
        if let Some(name_query) = name_query.map(str::trim).filter(|q| !q.is_empty()) {
            for token in analyze(index, AnalyzerKind::Attribute.tokenizer_name(), name_query) {
                clauses.push((
                    Occur::Must,
                    Box::new(TermQuery::new(
                        Term::from_field_text(files.file_name, &token),
                        IndexRecordOption::Basic,
                    )),
                ));
            }
        }
        let query = BooleanQuery::new(clauses);

        let lease = self.manager.acquire_searcher(IndexName::Files);
        let (total, top) = lease.search(
            &query,
            &(Count, TopDocs::with_limit(limit.max(1)).and_offset(offset)),
        )?;

        let mut hits = Vec::with_capacity(top.len());
        for (_score, address) in top {
            let doc: TantivyDocument = lease.doc(address)?;
            let text = |field: tantivy::schema::Field| {
                doc.get_first(field)
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string()
            };
            hits.push(FileHit {
                file_name: text(files.file_name),
                file_path: text(files.file_path),
                rel_path: text(files.rel_path),
                full_path: text(files.full_path),
                md5: text(files.md5),
                size: doc
                    .get_first(files.size)
                    .and_then(|v| v.as_i64())
                    .unwrap_or_default(),
                file_type: text(files.file_type),
                ext_type: text(files.ext_type),
                is_directory: doc
                    .get_first(files.is_directory)
                    .and_then(|v| v.as_str())
                    == Some("true"),
            });
        }
        Ok(FilePage { total, files: hits })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::AnalyzerDispatch;
    use crate::efo::EfoTermMatcher;
    use crate::registry::CollectionRegistry;
    use crate::submission_indexer::SubmissionIndexer;
    use serde_json::json;

    fn setup() -> (tempfile::TempDir, Arc<IndexManager>, FileSearch) {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(
            CollectionRegistry::from_json_str(
                r#"[{"collectionName": "public", "properties": [
                    {"name": "accession", "fieldType": "untokenized_string", "jsonPath": ["$.accNo"]}
                ]}]"#,
            )
            .unwrap(),
        );
        let dispatch = AnalyzerDispatch::from_registry(&registry);
        let manager = Arc::new(
            IndexManager::open_without_reopen(dir.path(), &registry, &dispatch, &[]).unwrap(),
        );
        let indexer = SubmissionIndexer::new(
            Arc::clone(&manager),
            registry,
            Arc::new(EfoTermMatcher::new()),
        );
        indexer
            .index_one(&json!({
                "accNo": "S-BSST1",
                "released": true,
                "files": [
                    {"fileName": "counts_matrix.csv", "filePath": "u/counts_matrix.csv",
                     "relPath": "counts_matrix.csv", "size": 2048, "type": "file",
                     "extType": "csv", "md5": "aa11"},
                    {"fileName": "raw", "filePath": "u/raw", "relPath": "raw",
                     "size": 0, "type": "directory", "extType": "",
                     "isDirectory": true},
                    {"fileName": "readme.txt", "filePath": "u/readme.txt",
                     "relPath": "readme.txt", "size": 12, "type": "file",
                     "extType": "txt", "md5": "bb22"}
                ]
            }))
            .unwrap();
        let files = FileSearch::new(Arc::clone(&manager));
        (dir, manager, files)
    }

    #[test]
    fn lists_all_files_of_an_accession() {
        let (_dir, _manager, files) = setup();
        let page = files.files_of("S-BSST1", None, 0, 10).unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.files.len(), 3);
    }

    #[test]
    fn name_filter_narrows_results() {
        let (_dir, _manager, files) = setup();
        let page = files.files_of("S-BSST1", Some("counts"), 0, 10).unwrap();
        assert_eq!(page.total, 1);
        let hit = &page.files[0];
        assert_eq!(hit.file_name, "counts_matrix.csv");
        assert_eq!(hit.size, 2048);
        assert_eq!(hit.ext_type, "csv");
        assert!(!hit.is_directory);
    }

    #[test]
    fn directories_are_flagged() {
        let (_dir, _manager, files) = setup();
        let page = files.files_of("S-BSST1", Some("raw"), 0, 10).unwrap();
        assert_eq!(page.total, 1);
        assert!(page.files[0].is_directory);
    }

    #[test]
    fn pagination_offsets() {
        let (_dir, _manager, files) = setup();
        let page = files.files_of("S-BSST1", None, 2, 2).unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.files.len(), 1);
    }

    #[test]
    fn unknown_accession_is_empty() {
        let (_dir, _manager, files) = setup();
        let page = files.files_of("S-NONE", None, 0, 10).unwrap();
        assert_eq!(page.total, 0);
        assert!(page.files.is_empty());
    }
}
