//! Submission indexer
//!
//! Turns one extended submission JSON tree into documents for the
//! SUBMISSION, FILES, and PAGE_TAB indices, driven by the collection
//! registry. Prior documents with the same accession are deleted before the
//! new ones are added; `index_one` then commits the three writers through
//! the transaction manager and refreshes searchers, while the
//! `index_without_commit` variant participates in a caller-driven batch.

use std::sync::Arc;

use serde_json::Value as Json;
use tantivy::TantivyDocument;
use tantivy::schema::{Facet, Term};
use tracing::{debug, warn};

use biostudies_search_core::PUBLIC_ACCESS_TAG;

use crate::efo::EfoTermMatcher;
use crate::error::{SearchError, SearchResult};
use crate::index_manager::{IndexManager, IndexName};
use crate::json_path;
use crate::parsers::NOT_AVAILABLE;
use crate::registry::{CollectionRegistry, FieldType, PropertyDescriptor};
use crate::schema::names;
use crate::txn::TransactionManager;

/// Writes submissions into the three submission-related indices.
pub struct SubmissionIndexer {
    manager: Arc<IndexManager>,
    registry: Arc<CollectionRegistry>,
    matcher: Arc<EfoTermMatcher>,
    txn: TransactionManager,
}

impl SubmissionIndexer {
    #[must_use]
    pub fn new(
        manager: Arc<IndexManager>,
        registry: Arc<CollectionRegistry>,
        matcher: Arc<EfoTermMatcher>,
    ) -> Self {
        let txn = TransactionManager::new(Arc::clone(&manager));
        Self {
            manager,
            registry,
            matcher,
            txn,
        }
    }

    /// Index one submission and commit: delete prior documents, add the new
    /// ones, commit SUBMISSION/FILES/PAGE_TAB atomically per the transaction
    /// manager's contract, refresh searchers. Returns the accession.
    pub fn index_one(&self, submission: &Json) -> SearchResult<String> {
        let acc_no = self.write_documents(submission, true)?;
        self.txn.commit()?;
        self.manager.refresh_all();
        Ok(acc_no)
    }

    /// Index one submission without committing; the caller owns the batch
    /// commit. When `remove_file_documents` is false (bulk re-index over
    /// truncated indices) the per-accession FILES delete is skipped.
    pub fn index_without_commit(
        &self,
        submission: &Json,
        remove_file_documents: bool,
    ) -> SearchResult<String> {
        self.write_documents(submission, remove_file_documents)
    }

    /// Remove a submission from all three indices (deletion signal or
    /// tombstone after a backend 404), then commit and refresh.
    pub fn delete_submission(&self, acc_no: &str) -> SearchResult<()> {
        self.delete_by_accession(acc_no, true);
        self.txn.commit()?;
        self.manager.refresh_all();
        debug!(acc_no, "submission deleted");
        Ok(())
    }

    fn delete_by_accession(&self, acc_no: &str, remove_file_documents: bool) {
        let schemas = self.manager.schemas();
        self.manager
            .writer(IndexName::Submission)
            .delete_term(Term::from_field_text(schemas.submission.accession, acc_no));
        self.manager
            .writer(IndexName::PageTab)
            .delete_term(Term::from_field_text(schemas.page_tab.accession, acc_no));
        if remove_file_documents {
            self.manager
                .writer(IndexName::Files)
                .delete_term(Term::from_field_text(schemas.files.accession, acc_no));
        }
    }

    fn write_documents(
        &self,
        submission: &Json,
        remove_file_documents: bool,
    ) -> SearchResult<String> {
        let acc_no = submission
            .get("accNo")
            .and_then(Json::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(SearchError::BlankAccession)?
            .to_string();

        let released = submission.get("released").and_then(Json::as_bool) == Some(true);
        let collection = collection_of(submission);
        let properties = self.registry.effective_properties(collection.as_deref());

        let schemas = self.manager.schemas();
        let sub = &schemas.submission;
        let mut doc = TantivyDocument::default();
        doc.add_text(sub.accession, &acc_no);

        let mut content_parts: Vec<String> = Vec::new();
        let mut access_tokens: Vec<String> = Vec::new();
        let mut seckey_values: Vec<String> = Vec::new();

        for property in &properties {
            if property.name == names::ACCESSION {
                continue; // written above, exactly once
            }
            let values = self.extract_values(submission, property);

            match property.name.as_str() {
                names::CONTENT => {
                    content_parts.extend(values);
                    continue;
                }
                names::ACCESS => {
                    access_tokens = values;
                    continue;
                }
                names::SECKEY => {
                    seckey_values = values;
                    continue;
                }
                _ => {}
            }

            let Some(field) = sub.field(&property.name) else {
                continue;
            };
            match property.field_type {
                FieldType::UntokenizedString | FieldType::TokenizedString => {
                    for value in &values {
                        doc.add_text(field, value);
                    }
                    if property.is_searchable() {
                        content_parts.extend(values);
                    }
                }
                FieldType::Long => {
                    for value in &values {
                        match value.parse::<i64>() {
                            Ok(number) => doc.add_i64(field, number),
                            Err(_) => {
                                warn!(
                                    %acc_no,
                                    property = %property.name,
                                    %value,
                                    "long field value not numeric; omitted"
                                );
                            }
                        }
                    }
                }
                FieldType::Facet => {
                    for value in &values {
                        let segments: Vec<String> = value
                            .to_lowercase()
                            .split('/')
                            .map(str::trim)
                            .filter(|s| !s.is_empty())
                            .map(ToString::to_string)
                            .collect();
                        if !segments.is_empty() {
                            doc.add_facet(field, Facet::from_path(segments));
                        }
                    }
                }
            }
        }

        // Unreleased submissions keep their raw fields but must never carry
        // the public grant.
        if !released {
            access_tokens.retain(|token| !token.eq_ignore_ascii_case(PUBLIC_ACCESS_TAG));
        }
        let is_public = released
            && access_tokens
                .iter()
                .any(|token| token.eq_ignore_ascii_case(PUBLIC_ACCESS_TAG));
        for token in &access_tokens {
            doc.add_text(sub.access, token);
        }
        doc.add_text(sub.is_public, if is_public { "true" } else { "false" });

        if seckey_values.is_empty() {
            if let Some(seckey) = submission
                .get("secretKey")
                .or_else(|| submission.get("seckey"))
                .and_then(Json::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
            {
                seckey_values.push(seckey.to_string());
            }
        }
        for seckey in &seckey_values {
            doc.add_text(sub.seckey, seckey);
        }

        let content = content_parts.join(" ");
        doc.add_text(sub.content, &content);

        // Every EFO term mentioned in the aggregated content becomes a
        // root-to-term facet path.
        for term in self.matcher.find_efo_terms(&content) {
            let mut segments: Vec<String> = self
                .matcher
                .ancestors(&term)
                .iter()
                .map(|t| t.to_lowercase())
                .collect();
            segments.push(term);
            doc.add_facet(sub.efo_facet, Facet::from_path(segments));
        }

        let file_docs = build_file_documents(&acc_no, submission, schemas);
        let page_tab_doc = build_page_tab_document(&acc_no, submission, schemas)?;

        self.delete_by_accession(&acc_no, remove_file_documents);

        self.manager.writer(IndexName::Submission).add_document(doc)?;
        {
            let writer = self.manager.writer(IndexName::Files);
            for file_doc in file_docs {
                writer.add_document(file_doc)?;
            }
        }
        self.manager
            .writer(IndexName::PageTab)
            .add_document(page_tab_doc)?;

        debug!(%acc_no, collection = collection.as_deref().unwrap_or(""), "submission indexed");
        Ok(acc_no)
    }

    fn extract_values(&self, submission: &Json, property: &PropertyDescriptor) -> Vec<String> {
        let mut values = if let Some(parser) = property.parser {
            match parser.apply(submission) {
                Ok(value) => value.into_iter().collect(),
                Err(e) => {
                    warn!(property = %property.name, error = %e, "date parse failed");
                    match property.field_type {
                        FieldType::Long => Vec::new(),
                        _ => vec![NOT_AVAILABLE.to_string()],
                    }
                }
            }
        } else {
            json_path::evaluate_strings(submission, &property.json_paths)
        };

        if let Some(pattern) = &property.match_pattern {
            values = values
                .into_iter()
                .filter_map(|value| {
                    pattern.captures(&value).map(|caps| {
                        caps.get(1)
                            .map_or_else(|| value.clone(), |m| m.as_str().to_string())
                    })
                })
                .collect();
        }

        if values.is_empty() {
            if let Some(default) = &property.default_value {
                values.push(default.clone());
            }
        }

        if property.to_lower_case {
            for value in &mut values {
                *value = value.to_lowercase();
            }
        }

        if !property.multi_valued && values.len() > 1 {
            values.truncate(1);
        }
        values
    }
}

fn collection_of(submission: &Json) -> Option<String> {
    if let Some(name) = submission.get("collection").and_then(Json::as_str) {
        return Some(name.to_string());
    }
    let first = submission.get("collections")?.as_array()?.first()?;
    match first {
        Json::String(name) => Some(name.clone()),
        Json::Object(map) => map
            .get("accNo")
            .and_then(Json::as_str)
            .map(ToString::to_string),
        _ => None,
    }
}

fn build_file_documents(
    acc_no: &str,
    submission: &Json,
    schemas: &crate::index_manager::IndexSchemas,
) -> Vec<TantivyDocument> {
    let files = &schemas.files;
    let Some(entries) = submission.get("files").and_then(Json::as_array) else {
        return Vec::new();
    };
    entries
        .iter()
        .map(|entry| {
            let text = |key: &str| entry.get(key).and_then(Json::as_str).unwrap_or_default();
            let mut doc = TantivyDocument::default();
            doc.add_text(files.accession, acc_no);
            doc.add_text(files.file_name, text("fileName"));
            doc.add_text(files.file_path, text("filePath"));
            doc.add_text(files.rel_path, text("relPath"));
            doc.add_text(files.full_path, text("fullPath"));
            doc.add_text(files.md5, text("md5"));
            doc.add_i64(
                files.size,
                entry.get("size").and_then(Json::as_i64).unwrap_or(0),
            );
            doc.add_text(files.file_type, text("type"));
            doc.add_text(files.ext_type, text("extType"));
            let is_directory = entry.get("isDirectory").and_then(Json::as_bool) == Some(true);
            doc.add_text(files.is_directory, if is_directory { "true" } else { "false" });
            doc
        })
        .collect()
}

fn build_page_tab_document(
    acc_no: &str,
    submission: &Json,
    schemas: &crate::index_manager::IndexSchemas,
) -> SearchResult<TantivyDocument> {
    let page_tab = &schemas.page_tab;
    let source = submission.get("pageTab").unwrap_or(submission);
    let mut doc = TantivyDocument::default();
    doc.add_text(page_tab.accession, acc_no);
    doc.add_text(page_tab.page_tab, serde_json::to_string(source)?);
    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::AnalyzerDispatch;
    use serde_json::json;
    use tantivy::Document;
    use tantivy::collector::Count;
    use tantivy::query::{AllQuery, TermQuery};
    use tantivy::schema::{IndexRecordOption, Value};

    const REGISTRY_JSON: &str = r#"[
      {"collectionName": "public", "properties": [
        {"name": "accession", "fieldType": "untokenized_string", "jsonPath": ["$.accNo"]},
        {"name": "title", "fieldType": "tokenized_string", "jsonPath": ["$.title"], "expanded": true},
        {"name": "type", "fieldType": "untokenized_string", "jsonPath": ["$.section.type"], "toLowerCase": true},
        {"name": "author", "fieldType": "tokenized_string", "jsonPath": ["$.authors[*].name"], "multiValued": true},
        {"name": "access", "fieldType": "tokenized_string", "analyzer": "access", "jsonPath": ["$.access[*]"], "multiValued": true, "private": true},
        {"name": "release_time", "fieldType": "long", "parser": "release_time", "sortable": true, "retrieved": false},
        {"name": "release_date", "fieldType": "untokenized_string", "parser": "release_date"},
        {"name": "links", "fieldType": "long", "jsonPath": ["$.stats.links"]},
        {"name": "files", "fieldType": "long", "jsonPath": ["$.stats.files"]},
        {"name": "views", "fieldType": "long", "jsonPath": ["$.stats.views"]},
        {"name": "facet.file_type", "fieldType": "facet", "jsonPath": ["$.files[*].extType"], "multiValued": true}
      ]}
    ]"#;

    fn setup() -> (tempfile::TempDir, Arc<IndexManager>, SubmissionIndexer) {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(CollectionRegistry::from_json_str(REGISTRY_JSON).unwrap());
        let dispatch = AnalyzerDispatch::from_registry(&registry);
        let manager = Arc::new(
            IndexManager::open_without_reopen(dir.path(), &registry, &dispatch, &[]).unwrap(),
        );
        let indexer = SubmissionIndexer::new(
            Arc::clone(&manager),
            registry,
            Arc::new(EfoTermMatcher::new()),
        );
        (dir, manager, indexer)
    }

    fn submission() -> Json {
        json!({
            "accNo": "S-BSST1",
            "title": "Cancer of the Lung",
            "access": ["PUBLIC"],
            "released": true,
            "releaseTime": {"$date": "2024-01-15T00:00:00Z"},
            "section": {"type": "Study"},
            "stats": {"links": 2, "files": 1, "views": 7},
            "files": [
                {"fileName": "data.csv", "filePath": "u/data.csv", "relPath": "data.csv",
                 "size": 100, "type": "file", "extType": "csv", "md5": "d41d8"}
            ]
        })
    }

    #[test]
    fn index_one_writes_all_three_indices() {
        let (_dir, manager, indexer) = setup();
        let acc = indexer.index_one(&submission()).unwrap();
        assert_eq!(acc, "S-BSST1");

        for name in IndexName::SUBMISSION_RELATED {
            let lease = manager.acquire_searcher(name);
            assert_eq!(lease.search(&AllQuery, &Count).unwrap(), 1, "{name:?}");
        }
    }

    #[test]
    fn reindex_replaces_prior_documents() {
        let (_dir, manager, indexer) = setup();
        indexer.index_one(&submission()).unwrap();
        indexer.index_one(&submission()).unwrap();

        let schemas = manager.schemas();
        let lease = manager.acquire_searcher(IndexName::Submission);
        let query = TermQuery::new(
            Term::from_field_text(schemas.submission.accession, "S-BSST1"),
            IndexRecordOption::Basic,
        );
        assert_eq!(lease.search(&query, &Count).unwrap(), 1);
    }

    #[test]
    fn reindex_is_idempotent_on_stored_fields() {
        let (_dir, manager, indexer) = setup();
        indexer.index_one(&submission()).unwrap();
        let first = stored_fields(&manager);
        indexer.index_one(&submission()).unwrap();
        let second = stored_fields(&manager);
        assert_eq!(first, second);
    }

    fn stored_fields(manager: &IndexManager) -> Vec<String> {
        let schemas = manager.schemas();
        let lease = manager.acquire_searcher(IndexName::Submission);
        let addresses = lease
            .search(&AllQuery, &tantivy::collector::DocSetCollector)
            .unwrap();
        let mut out: Vec<String> = addresses
            .into_iter()
            .map(|address| {
                let doc: TantivyDocument = lease.doc(address).unwrap();
                doc.to_json(&schemas.submission.schema)
            })
            .collect();
        out.sort();
        out
    }

    #[test]
    fn blank_accession_rejected() {
        let (_dir, _manager, indexer) = setup();
        let err = indexer.index_one(&json!({"title": "no accession"})).unwrap_err();
        assert!(matches!(err, SearchError::BlankAccession));
        let err = indexer.index_one(&json!({"accNo": "  "})).unwrap_err();
        assert!(matches!(err, SearchError::BlankAccession));
    }

    #[test]
    fn unreleased_submission_loses_public_grant() {
        let (_dir, manager, indexer) = setup();
        let mut sub = submission();
        sub["released"] = json!(false);
        sub["access"] = json!(["PUBLIC", "TEAM_A"]);
        indexer.index_one(&sub).unwrap();

        let schemas = manager.schemas();
        let lease = manager.acquire_searcher(IndexName::Submission);
        let addresses = lease
            .search(&AllQuery, &tantivy::collector::DocSetCollector)
            .unwrap();
        let doc: TantivyDocument = lease.doc(addresses.into_iter().next().unwrap()).unwrap();
        assert_eq!(
            doc.get_first(schemas.submission.is_public)
                .and_then(|v| v.as_str()),
            Some("false")
        );
        let access: Vec<&str> = doc
            .get_all(schemas.submission.access)
            .filter_map(|v| v.as_str())
            .collect();
        assert_eq!(access, vec!["TEAM_A"]);
    }

    #[test]
    fn release_date_stored_day_resolution() {
        let (_dir, manager, indexer) = setup();
        indexer.index_one(&submission()).unwrap();

        let schemas = manager.schemas();
        let lease = manager.acquire_searcher(IndexName::Submission);
        let addresses = lease
            .search(&AllQuery, &tantivy::collector::DocSetCollector)
            .unwrap();
        let doc: TantivyDocument = lease.doc(addresses.into_iter().next().unwrap()).unwrap();
        let field = schemas.submission.field("release_date").unwrap();
        assert_eq!(
            doc.get_first(field).and_then(|v| v.as_str()),
            Some("2024-01-15")
        );
    }

    #[test]
    fn delete_submission_clears_all_indices() {
        let (_dir, manager, indexer) = setup();
        indexer.index_one(&submission()).unwrap();
        indexer.delete_submission("S-BSST1").unwrap();

        for name in IndexName::SUBMISSION_RELATED {
            let lease = manager.acquire_searcher(name);
            assert_eq!(lease.search(&AllQuery, &Count).unwrap(), 0, "{name:?}");
        }
    }

    #[test]
    fn bulk_mode_skips_file_delete() {
        let (_dir, manager, indexer) = setup();
        indexer.index_one(&submission()).unwrap();
        // Bulk re-index: caller truncated FILES upfront, per-accession file
        // deletes are skipped, so the old file doc survives here.
        indexer.index_without_commit(&submission(), false).unwrap();
        indexer.txn.commit().unwrap();
        manager.refresh_all();

        let lease = manager.acquire_searcher(IndexName::Files);
        assert_eq!(lease.search(&AllQuery, &Count).unwrap(), 2);
    }
}
