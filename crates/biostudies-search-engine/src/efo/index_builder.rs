//! EFO index build
//!
//! Materializes an in-memory ontology model into the EFO index:
//! node documents (depth-first from the root, deduplicated by lowercase
//! term), standalone alternative-term documents, frequent submission
//! content tokens appended as further alternative terms, and the
//! query-expansion documents.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tantivy::TantivyDocument;
use tracing::{debug, info};

use crate::efo::expansion::expansion_doc;
use crate::efo::model::EfoModel;
use crate::error::SearchResult;
use crate::index_manager::{IndexManager, IndexName};

/// Content tokens shorter than this never become alternative terms.
const MIN_CONTENT_TOKEN_LEN: usize = 4;

/// Content tokens must appear in at least this many submissions.
const MIN_CONTENT_DOC_FREQ: u64 = 10;

/// Builds the EFO index from an ontology model.
pub struct EfoIndexer {
    manager: Arc<IndexManager>,
    stopwords: HashSet<String>,
}

impl EfoIndexer {
    #[must_use]
    pub fn new(manager: Arc<IndexManager>, stopwords: &[String]) -> Self {
        Self {
            manager,
            stopwords: stopwords.iter().map(|w| w.to_lowercase()).collect(),
        }
    }

    /// Rebuild the EFO index from scratch: delete everything, write node,
    /// alternative-term, and expansion documents, commit, refresh.
    pub fn index_model(&self, model: &EfoModel) -> SearchResult<()> {
        let efo = self.manager.schemas().efo;

        {
            let writer = self.manager.writer(IndexName::Efo);
            writer.delete_all_documents()?;

            let mut seen_terms: HashSet<String> = HashSet::new();
            let mut node_docs = 0usize;
            let mut alt_docs = 0usize;

            for node_id in model.depth_first() {
                let node = model.node(node_id);
                let term_lower = node.term.to_lowercase();
                if !seen_terms.insert(term_lower) {
                    continue;
                }

                let efo_id = node.id.to_lowercase();
                let mut doc = TantivyDocument::default();
                doc.add_text(
                    efo.id,
                    node.uri.as_deref().unwrap_or(&node.id).to_lowercase(),
                );
                doc.add_text(efo.efo_id, &efo_id);
                doc.add_text(efo.term, &node.term);
                for &parent in &node.parents {
                    doc.add_text(efo.parent, model.node(parent).id.to_lowercase());
                }
                for &child in &node.children {
                    doc.add_text(efo.child, model.node(child).id.to_lowercase());
                }
                writer.add_document(doc)?;
                node_docs += 1;

                for alt in &node.alt_terms {
                    if seen_terms.insert(alt.to_lowercase()) {
                        let mut alt_doc = TantivyDocument::default();
                        alt_doc.add_text(efo.alt_term, alt);
                        alt_doc.add_text(efo.efo_id, &efo_id);
                        writer.add_document(alt_doc)?;
                        alt_docs += 1;
                    }
                }
            }

            // Frequent submission content tokens become searchable
            // alternative terms of their own.
            let harvested = self.harvest_content_terms(&seen_terms)?;
            for token in &harvested {
                let mut alt_doc = TantivyDocument::default();
                alt_doc.add_text(efo.alt_term, token);
                writer.add_document(alt_doc)?;
            }

            let mut expansion_docs = 0usize;
            for node_id in model.depth_first() {
                let Some(expansion) = expansion_doc(model, node_id, &self.stopwords) else {
                    continue;
                };
                let mut doc = TantivyDocument::default();
                for key in &expansion.keys {
                    doc.add_text(efo.qe_term, key);
                }
                for value in &expansion.values {
                    doc.add_text(efo.qe_efo, value);
                }
                writer.add_document(doc)?;
                expansion_docs += 1;
            }

            info!(
                node_docs,
                alt_docs,
                content_terms = harvested.len(),
                expansion_docs,
                "EFO index rebuilt"
            );
        }

        self.manager.commit(IndexName::Efo)?;
        self.manager.refresh_all();
        Ok(())
    }

    /// Tokens of the submission `content` field with document frequency and
    /// length above the thresholds, excluding terms already present.
    fn harvest_content_terms(&self, present: &HashSet<String>) -> SearchResult<Vec<String>> {
        let content = self.manager.schemas().submission.content;
        let lease = self.manager.acquire_searcher(IndexName::Submission);

        let mut freqs: HashMap<String, u64> = HashMap::new();
        for segment_reader in lease.segment_readers() {
            let inverted = segment_reader.inverted_index(content)?;
            let mut stream = inverted.terms().stream()?;
            while stream.advance() {
                let Ok(token) = std::str::from_utf8(stream.key()) else {
                    continue;
                };
                *freqs.entry(token.to_string()).or_insert(0) += u64::from(stream.value().doc_freq);
            }
        }
        drop(lease);

        let mut harvested: Vec<String> = freqs
            .into_iter()
            .filter(|(token, freq)| {
                token.chars().count() >= MIN_CONTENT_TOKEN_LEN
                    && *freq >= MIN_CONTENT_DOC_FREQ
                    && !present.contains(token)
            })
            .map(|(token, _)| token)
            .collect();
        harvested.sort();
        debug!(count = harvested.len(), "harvested content terms");
        Ok(harvested)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::AnalyzerDispatch;
    use crate::efo::matcher::EfoTermMatcher;
    use crate::efo::model::{JsonOntologySource, OntologySource};
    use crate::registry::CollectionRegistry;
    use serde_json::json;
    use tantivy::collector::{Count, DocSetCollector};
    use tantivy::query::{AllQuery, TermQuery};
    use tantivy::schema::{IndexRecordOption, Term, Value};

    fn setup() -> (tempfile::TempDir, Arc<IndexManager>) {
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

    fn disease_model() -> EfoModel {
        JsonOntologySource::new(json!([
            {"id": "EFO_D", "term": "disease", "children": [
                {"id": "EFO_C", "term": "cancer", "synonyms": ["neoplasm"], "children": [
                    {"id": "EFO_LC", "term": "lung cancer"}
                ]}
            ]}
        ]))
        .load()
        .unwrap()
    }

    #[test]
    fn writes_node_alt_and_expansion_docs() {
        let (_dir, manager) = setup();
        let indexer = EfoIndexer::new(Arc::clone(&manager), &[]);
        indexer.index_model(&disease_model()).unwrap();

        let efo = manager.schemas().efo;
        let lease = manager.acquire_searcher(IndexName::Efo);

        // 3 node docs + 1 alt doc (neoplasm) + 2 expansion docs.
        assert_eq!(lease.search(&AllQuery, &Count).unwrap(), 6);

        // Expansion doc for "disease" carries the child synonym group.
        let query = TermQuery::new(
            Term::from_field_text(efo.qe_term, "disease"),
            IndexRecordOption::Basic,
        );
        let addresses = lease.search(&query, &DocSetCollector).unwrap();
        assert_eq!(addresses.len(), 1);
        let doc: TantivyDocument = lease.doc(addresses.into_iter().next().unwrap()).unwrap();
        let mut values: Vec<&str> = doc.get_all(efo.qe_efo).filter_map(|v| v.as_str()).collect();
        values.sort_unstable();
        assert_eq!(values, vec!["cancer", "neoplasm"]);
    }

    #[test]
    fn rebuild_replaces_previous_content() {
        let (_dir, manager) = setup();
        let indexer = EfoIndexer::new(Arc::clone(&manager), &[]);
        indexer.index_model(&disease_model()).unwrap();
        indexer.index_model(&disease_model()).unwrap();

        let lease = manager.acquire_searcher(IndexName::Efo);
        assert_eq!(lease.search(&AllQuery, &Count).unwrap(), 6);
    }

    #[test]
    fn duplicate_terms_deduplicated_by_lowercase() {
        let (_dir, manager) = setup();
        let model = JsonOntologySource::new(json!([
            {"id": "A", "term": "Heart"},
            {"id": "B", "term": "heart"}
        ]))
        .load()
        .unwrap();
        let indexer = EfoIndexer::new(Arc::clone(&manager), &[]);
        indexer.index_model(&model).unwrap();

        let lease = manager.acquire_searcher(IndexName::Efo);
        assert_eq!(lease.search(&AllQuery, &Count).unwrap(), 1);
    }

    #[test]
    fn matcher_initializes_from_built_index() {
        let (_dir, manager) = setup();
        let indexer = EfoIndexer::new(Arc::clone(&manager), &[]);
        indexer.index_model(&disease_model()).unwrap();

        let matcher = EfoTermMatcher::new();
        matcher.initialize(&manager).unwrap();
        assert_eq!(matcher.term_count(), 3);
        assert_eq!(matcher.efo_id("Cancer").as_deref(), Some("efo_c"));
        assert_eq!(
            matcher.ancestors("lung cancer"),
            vec!["disease".to_string(), "cancer".to_string()]
        );
        assert_eq!(
            matcher.find_efo_terms("a study of Lung Cancer tissue"),
            vec!["cancer".to_string(), "lung cancer".to_string()]
        );
    }

    #[test]
    fn frequent_content_tokens_become_alt_terms() {
        let (_dir, manager) = setup();
        let accession = manager.schemas().submission.accession;
        let content = manager.schemas().submission.content;
        {
            let writer = manager.writer(IndexName::Submission);
            for i in 0..10 {
                let mut doc = TantivyDocument::default();
                doc.add_text(accession, format!("S-HV{i}"));
                doc.add_text(content, "zebrafish embryo cohort");
                writer.add_document(doc).unwrap();
            }
            let mut rare = TantivyDocument::default();
            rare.add_text(accession, "S-RARE");
            rare.add_text(content, "axolotl");
            writer.add_document(rare).unwrap();
        }
        manager.commit(IndexName::Submission).unwrap();
        manager.refresh_all();

        let indexer = EfoIndexer::new(Arc::clone(&manager), &[]);
        // "embryo" is an ontology term already; it must not be harvested
        // a second time.
        let model = JsonOntologySource::new(json!([{"id": "E", "term": "embryo"}]))
            .load()
            .unwrap();
        indexer.index_model(&model).unwrap();

        let efo = manager.schemas().efo;
        let lease = manager.acquire_searcher(IndexName::Efo);
        let addresses = lease.search(&AllQuery, &DocSetCollector).unwrap();
        let mut alt_terms: Vec<String> = addresses
            .into_iter()
            .filter_map(|address| {
                let doc: TantivyDocument = lease.doc(address).unwrap();
                doc.get_first(efo.alt_term)
                    .and_then(|v| v.as_str())
                    .map(ToString::to_string)
            })
            .collect();
        alt_terms.sort();

        // doc_freq >= 10 and len >= 4: "zebrafish" and "cohort" qualify;
        // "axolotl" (df 1) and "embryo" (already present) do not.
        assert_eq!(alt_terms, vec!["cohort".to_string(), "zebrafish".to_string()]);
    }

    #[test]
    fn searcher_leases_released_after_build() {
        let (_dir, manager) = setup();
        let indexer = EfoIndexer::new(Arc::clone(&manager), &[]);
        indexer.index_model(&disease_model()).unwrap();
        assert_eq!(manager.outstanding_leases(IndexName::Submission), 0);
        assert_eq!(manager.outstanding_leases(IndexName::Efo), 0);
    }
}
