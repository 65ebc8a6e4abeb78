//! Spell-check suggestions
//!
//! A three-level cascade over a direct spell checker that reads term
//! dictionaries straight from the index:
//!
//! 1. accession-shaped queries are corrected against the SUBMISSION
//!    `accession` field;
//! 2. everything else is corrected against the EFO `term` field;
//! 3. when that yields nothing, against the submission `content` field.
//!
//! Suggestions are only produced for words absent from the index, ranked by
//! edit distance then document frequency. I/O errors yield an empty list,
//! never an error, and searchers are released on every exit path.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use strsim::levenshtein;
use tantivy::schema::{Field, Term};
use tracing::warn;

use crate::error::SearchResult;
use crate::index_manager::{IndexManager, IndexName};

/// Maximum edit distance for a suggestion.
const MAX_EDITS: usize = 2;

static ACCESSION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"^[ES]-\w{2,6}(-\d+)?").expect("accession regex"),
        Regex::new(r"^S-\w{4}\d+").expect("accession regex"),
    ]
});

/// Whether a query looks like a submission accession.
#[must_use]
pub fn is_accession_like(query: &str) -> bool {
    ACCESSION_PATTERNS.iter().any(|re| re.is_match(query))
}

/// Cascading direct spell checker.
pub struct SpellSuggester {
    manager: Arc<IndexManager>,
}

impl SpellSuggester {
    #[must_use]
    pub const fn new(manager: Arc<IndexManager>) -> Self {
        Self { manager }
    }

    /// Suggest up to `max` similar terms for a query.
    #[must_use]
    pub fn suggest_similar(&self, query: &str, max: usize) -> Vec<String> {
        let query = query.trim();
        if query.is_empty() || max == 0 {
            return Vec::new();
        }
        let schemas = self.manager.schemas();

        if is_accession_like(query) {
            return self
                .suggest_in(IndexName::Submission, schemas.submission.accession, query, max)
                .unwrap_or_else(|e| {
                    warn!(error = %e, "accession spell check failed");
                    Vec::new()
                });
        }

        let word = query.to_lowercase();
        match self.suggest_in(IndexName::Efo, schemas.efo.term, &word, max) {
            Ok(suggestions) if !suggestions.is_empty() => suggestions,
            Ok(_) => self
                .suggest_in(IndexName::Submission, schemas.submission.content, &word, max)
                .unwrap_or_else(|e| {
                    warn!(error = %e, "content spell check failed");
                    Vec::new()
                }),
            Err(e) => {
                warn!(error = %e, "EFO spell check failed");
                self.suggest_in(IndexName::Submission, schemas.submission.content, &word, max)
                    .unwrap_or_default()
            }
        }
    }

    /// Direct spell check of one word against one field's term dictionary,
    /// suggesting only when the word itself is not in the index.
    fn suggest_in(
        &self,
        index: IndexName,
        field: Field,
        word: &str,
        max: usize,
    ) -> SearchResult<Vec<String>> {
        let lease = self.manager.acquire_searcher(index);

        if lease.doc_freq(&Term::from_field_text(field, word))? > 0 {
            return Ok(Vec::new());
        }

        let mut freqs: HashMap<String, u64> = HashMap::new();
        for segment_reader in lease.segment_readers() {
            let inverted = segment_reader.inverted_index(field)?;
            let mut stream = inverted.terms().stream()?;
            while stream.advance() {
                let Ok(candidate) = std::str::from_utf8(stream.key()) else {
                    continue;
                };
                if plausible(word, candidate) {
                    *freqs.entry(candidate.to_string()).or_insert(0) +=
                        u64::from(stream.value().doc_freq);
                }
            }
        }
        drop(lease);

        let mut ranked: Vec<(usize, u64, String)> = freqs
            .into_iter()
            .filter_map(|(candidate, freq)| {
                let distance = levenshtein(word, &candidate);
                (distance <= MAX_EDITS).then_some((distance, freq, candidate))
            })
            .collect();
        ranked.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)).then(a.2.cmp(&b.2)));
        Ok(ranked.into_iter().take(max).map(|(_, _, term)| term).collect())
    }
}

/// Cheap prefilter before the edit-distance computation: shared first
/// character and a length difference within the edit budget.
fn plausible(word: &str, candidate: &str) -> bool {
    if word.chars().next() != candidate.chars().next() {
        return false;
    }
    let (wl, cl) = (word.chars().count(), candidate.chars().count());
    wl.abs_diff(cl) <= MAX_EDITS
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::AnalyzerDispatch;
    use crate::efo::{EfoIndexer, JsonOntologySource, OntologySource};
    use crate::registry::CollectionRegistry;
    use serde_json::json;
    use tantivy::TantivyDocument;

    fn setup() -> (tempfile::TempDir, Arc<IndexManager>, SpellSuggester) {
        let dir = tempfile::tempdir().unwrap();
        let registry = CollectionRegistry::from_json_str(
            r#"[{"collectionName": "public", "properties": [
                {"name": "accession", "fieldType": "untokenized_string", "jsonPath": ["$.accNo"]}
            ]}]"#,
        )
        .unwrap();
        let dispatch = AnalyzerDispatch::from_registry(&registry);
        let manager = Arc::new(
            IndexManager::open_without_reopen(dir.path(), &registry, &dispatch, &[]).unwrap(),
        );
        let suggester = SpellSuggester::new(Arc::clone(&manager));
        (dir, manager, suggester)
    }

    fn index_content(manager: &IndexManager, accession: &str, content: &str) {
        let schemas = manager.schemas();
        {
            let writer = manager.writer(IndexName::Submission);
            let mut doc = TantivyDocument::default();
            doc.add_text(schemas.submission.accession, accession);
            doc.add_text(schemas.submission.content, content);
            writer.add_document(doc).unwrap();
        }
        manager.commit(IndexName::Submission).unwrap();
        manager.refresh_all();
    }

    #[test]
    fn accession_patterns() {
        assert!(is_accession_like("S-BSST1"));
        assert!(is_accession_like("E-MTAB-1234"));
        assert!(is_accession_like("S-EPMC7293056"));
        assert!(!is_accession_like("melanogaster"));
        assert!(!is_accession_like("cancer"));
    }

    #[test]
    fn cascade_falls_back_to_content() {
        let (_dir, manager, suggester) = setup();
        // EFO index is empty; content carries the correct spelling.
        index_content(&manager, "S-BSST1", "drosophila melanogaster wings");

        let suggestions = suggester.suggest_similar("melanogaste", 5);
        assert_eq!(suggestions, vec!["melanogaster".to_string()]);
        assert_eq!(manager.outstanding_leases(IndexName::Submission), 0);
        assert_eq!(manager.outstanding_leases(IndexName::Efo), 0);
    }

    #[test]
    fn efo_level_wins_when_it_has_suggestions() {
        let (_dir, manager, suggester) = setup();
        let model = JsonOntologySource::new(json!([
            {"id": "EFO_M", "term": "melanoma"}
        ]))
        .load()
        .unwrap();
        EfoIndexer::new(Arc::clone(&manager), &[]).index_model(&model).unwrap();
        index_content(&manager, "S-BSST1", "melanosome studies");

        // One edit away from the EFO term: the cascade stops at level two.
        let suggestions = suggester.suggest_similar("melanomma", 5);
        assert_eq!(suggestions, vec!["melanoma".to_string()]);
    }

    #[test]
    fn no_suggestions_for_words_already_indexed() {
        let (_dir, manager, suggester) = setup();
        index_content(&manager, "S-BSST1", "melanogaster");
        assert!(suggester.suggest_similar("melanogaster", 5).is_empty());
    }

    #[test]
    fn accession_queries_use_accession_dictionary() {
        let (_dir, manager, suggester) = setup();
        index_content(&manager, "S-BSST12", "unrelated words");

        let suggestions = suggester.suggest_similar("S-BSST13", 5);
        assert_eq!(suggestions, vec!["S-BSST12".to_string()]);
    }

    #[test]
    fn respects_max_and_ranking() {
        let (_dir, manager, suggester) = setup();
        index_content(&manager, "S-A1", "mouse");
        index_content(&manager, "S-A2", "mouse");
        index_content(&manager, "S-A3", "moose");

        // "mousse" is distance 1 from both; "mouse" is more frequent.
        let suggestions = suggester.suggest_similar("mousse", 1);
        assert_eq!(suggestions, vec!["mouse".to_string()]);
    }

    #[test]
    fn empty_query_suggests_nothing() {
        let (_dir, _manager, suggester) = setup();
        assert!(suggester.suggest_similar("   ", 5).is_empty());
        assert!(suggester.suggest_similar("melanogaste", 0).is_empty());
    }
}
