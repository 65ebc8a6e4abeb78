//! In-memory EFO term matcher
//!
//! Rebuilt from the EFO index by scanning all live node documents. After
//! `initialize` the caches are read-only and all lookups are lock-free in
//! the read path. Rebuild is O(N) in the number of node documents; ancestor
//! chains are memoized during the build.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use tantivy::TantivyDocument;
use tantivy::collector::DocSetCollector;
use tantivy::query::AllQuery;
use tantivy::schema::Value;
use tracing::info;

use crate::error::SearchResult;
use crate::index_manager::{IndexManager, IndexName};

#[derive(Debug, Default)]
struct MatcherState {
    /// lowercased term → efo id
    term_to_id: HashMap<String, String>,
    /// efo id → original-case term
    id_to_term: HashMap<String, String>,
    /// lowercased term → root-to-parent ancestor terms
    ancestors: HashMap<String, Vec<String>>,
}

/// Term ↔ id ↔ ancestry lookups over the indexed ontology.
#[derive(Debug, Default)]
pub struct EfoTermMatcher {
    state: RwLock<MatcherState>,
}

impl EfoTermMatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild all caches from the live documents of the EFO index.
    pub fn initialize(&self, manager: &IndexManager) -> SearchResult<()> {
        let efo = manager.schemas().efo;
        let lease = manager.acquire_searcher(IndexName::Efo);

        let mut term_to_id: HashMap<String, String> = HashMap::new();
        let mut id_to_term: HashMap<String, String> = HashMap::new();
        let mut parent_of: HashMap<String, String> = HashMap::new();

        let addresses = lease.search(&AllQuery, &DocSetCollector)?;
        for address in addresses {
            let doc: TantivyDocument = lease.doc(address)?;
            let Some(term) = doc.get_first(efo.term).and_then(|v| v.as_str()) else {
                continue; // alt_term or expansion doc
            };
            let Some(efo_id) = doc.get_first(efo.efo_id).and_then(|v| v.as_str()) else {
                continue;
            };
            term_to_id.insert(term.to_lowercase(), efo_id.to_string());
            id_to_term.insert(efo_id.to_string(), term.to_string());
            if let Some(parent) = doc.get_first(efo.parent).and_then(|v| v.as_str()) {
                parent_of.insert(efo_id.to_string(), parent.to_string());
            }
        }
        drop(lease);

        // Memoized first-parent ancestor chains, ids root-first.
        let mut memo: HashMap<String, Vec<String>> = HashMap::new();
        for efo_id in id_to_term.keys() {
            ancestor_ids(efo_id, &parent_of, &id_to_term, &mut memo);
        }

        let ancestors = term_to_id
            .iter()
            .map(|(term_lower, efo_id)| {
                let chain = memo.get(efo_id).cloned().unwrap_or_default();
                let terms = chain
                    .iter()
                    .filter_map(|id| id_to_term.get(id).cloned())
                    .collect();
                (term_lower.clone(), terms)
            })
            .collect();

        let mut state = self.state.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        info!(terms = term_to_id.len(), "EFO matcher initialized");
        *state = MatcherState {
            term_to_id,
            id_to_term,
            ancestors,
        };
        Ok(())
    }

    /// All known terms (lowercased) appearing in the text with word
    /// boundaries on both sides, sorted for determinism.
    #[must_use]
    pub fn find_efo_terms(&self, text: &str) -> Vec<String> {
        let haystack = text.to_lowercase();
        let state = self.state.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut found: Vec<String> = state
            .term_to_id
            .keys()
            .filter(|term| contains_word(&haystack, term))
            .cloned()
            .collect();
        found.sort();
        found
    }

    /// Root-to-parent chain of terms for a known term; empty for top-level
    /// or unknown terms.
    #[must_use]
    pub fn ancestors(&self, term: &str) -> Vec<String> {
        let state = self.state.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        state
            .ancestors
            .get(&term.to_lowercase())
            .cloned()
            .unwrap_or_default()
    }

    /// EFO id for a term, case-insensitive.
    #[must_use]
    pub fn efo_id(&self, term: &str) -> Option<String> {
        let state = self.state.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        state.term_to_id.get(&term.to_lowercase()).cloned()
    }

    /// Original-case term for an EFO id.
    #[must_use]
    pub fn term_by_id(&self, efo_id: &str) -> Option<String> {
        let state = self.state.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        state.id_to_term.get(efo_id).cloned()
    }

    /// Whether the term is known, case-insensitive.
    #[must_use]
    pub fn is_known(&self, term: &str) -> bool {
        let state = self.state.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        state.term_to_id.contains_key(&term.to_lowercase())
    }

    /// Number of known primary terms.
    #[must_use]
    pub fn term_count(&self) -> usize {
        let state = self.state.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        state.term_to_id.len()
    }
}

fn ancestor_ids(
    efo_id: &str,
    parent_of: &HashMap<String, String>,
    known: &HashMap<String, String>,
    memo: &mut HashMap<String, Vec<String>>,
) -> Vec<String> {
    if let Some(chain) = memo.get(efo_id) {
        return chain.clone();
    }
    let mut chain = Vec::new();
    let mut seen: HashSet<&str> = HashSet::from([efo_id]);
    let mut current = efo_id;
    while let Some(parent) = parent_of.get(current) {
        if !known.contains_key(parent) || !seen.insert(parent) {
            break; // root sentinel or cycle
        }
        chain.push(parent.clone());
        current = parent;
    }
    chain.reverse();
    memo.insert(efo_id.to_string(), chain.clone());
    chain
}

/// Word-boundary containment: the needle occurs with non-alphanumeric (or
/// string-edge) characters on both sides.
fn contains_word(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    for (start, matched) in haystack.match_indices(needle) {
        let before_ok = haystack[..start]
            .chars()
            .next_back()
            .is_none_or(|c| !c.is_alphanumeric());
        let after_ok = haystack[start + matched.len()..]
            .chars()
            .next()
            .is_none_or(|c| !c.is_alphanumeric());
        if before_ok && after_ok {
            return true;
        }
    }
    false
}
