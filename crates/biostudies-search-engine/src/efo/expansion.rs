//! Query-expansion document computation and lookup
//!
//! For each ontology node the expansion sub-index carries one document
//! mapping search keys (`qe.term`) to broader terms (`qe.efo`):
//!
//! - values: the node's eligible synonyms, plus each non-organizational
//!   child's term and eligible synonyms (organizational classes contribute
//!   no children);
//! - keys: the node's term and eligible synonyms, plus the term and
//!   synonyms of every synonym-bearing child (so searching any spelling of
//!   a child concept reaches the same values).
//!
//! Synonyms carrying qualifiers (`(NOS)`, `[obsolete]`, commas, ` - `,
//! slashes) or shorter than three characters are excluded. All keys and
//! values are cleaned to `[a-z0-9-]` plus space and lowercased. Nodes whose
//! term is a stop word, and nodes with an empty value set, produce no
//! document.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use tantivy::TantivyDocument;
use tantivy::collector::DocSetCollector;
use tantivy::query::TermQuery;
use tantivy::schema::{IndexRecordOption, Term, Value};

use crate::efo::model::{EfoModel, NodeId};
use crate::error::SearchResult;
use crate::index_manager::{IndexManager, IndexName};

/// Minimum length of a synonym participating in expansion.
const MIN_SYNONYM_LEN: usize = 3;

/// Keys and values of one expansion document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpansionDoc {
    pub keys: BTreeSet<String>,
    pub values: BTreeSet<String>,
}

/// Clean a term for use as an expansion key or value.
#[must_use]
pub fn clean_value(raw: &str) -> String {
    let mapped: String = raw
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' {
                c
            } else {
                ' '
            }
        })
        .collect();
    mapped.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_qualified(synonym: &str) -> bool {
    let lower = synonym.to_lowercase();
    lower.contains("(nos)")
        || lower.contains("[obsolete]")
        || synonym.contains(',')
        || synonym.contains(" - ")
        || synonym.contains('/')
}

fn eligible_synonyms(alt_terms: &[String]) -> Vec<&String> {
    alt_terms
        .iter()
        .filter(|s| s.chars().count() >= MIN_SYNONYM_LEN && !is_qualified(s))
        .collect()
}

/// Compute the expansion document for a node, or `None` when the node
/// should not contribute one.
#[must_use]
pub fn expansion_doc(
    model: &EfoModel,
    node_id: NodeId,
    stopwords: &HashSet<String>,
) -> Option<ExpansionDoc> {
    let node = model.node(node_id);
    let term = clean_value(&node.term);
    if term.is_empty() || stopwords.contains(&term) {
        return None;
    }

    let keep = |cleaned: String| -> Option<String> {
        (!cleaned.is_empty() && !stopwords.contains(&cleaned)).then_some(cleaned)
    };

    let mut keys: BTreeSet<String> = BTreeSet::new();
    let mut values: BTreeSet<String> = BTreeSet::new();

    keys.insert(term);
    for synonym in eligible_synonyms(&node.alt_terms) {
        if let Some(cleaned) = keep(clean_value(synonym)) {
            keys.insert(cleaned.clone());
            values.insert(cleaned);
        }
    }

    if !node.organizational {
        for &child_id in &node.children {
            let child = model.node(child_id);
            if child.organizational {
                continue;
            }
            let child_synonyms = eligible_synonyms(&child.alt_terms);
            let child_term = keep(clean_value(&child.term));
            if let Some(cleaned) = &child_term {
                values.insert(cleaned.clone());
            }
            for synonym in &child_synonyms {
                if let Some(cleaned) = keep(clean_value(synonym)) {
                    values.insert(cleaned);
                }
            }
            // A synonym-bearing child is itself a searchable key: any of
            // its spellings should reach this document's values.
            if !child_synonyms.is_empty() {
                if let Some(cleaned) = child_term {
                    keys.insert(cleaned);
                }
                for synonym in child_synonyms {
                    if let Some(cleaned) = keep(clean_value(synonym)) {
                        keys.insert(cleaned);
                    }
                }
            }
        }
    }

    if values.is_empty() {
        return None;
    }
    Some(ExpansionDoc { keys, values })
}

// ── Query-side lookup ────────────────────────────────────────────────────────

/// Resolves free-text tokens to expansion values at query time.
#[derive(Clone)]
pub struct QueryExpander {
    manager: Arc<IndexManager>,
}

impl QueryExpander {
    #[must_use]
    pub const fn new(manager: Arc<IndexManager>) -> Self {
        Self { manager }
    }

    /// Expansion values for a query key, excluding the key itself. Unknown
    /// keys expand to nothing.
    pub fn expand(&self, key: &str) -> SearchResult<Vec<String>> {
        let cleaned = clean_value(key);
        if cleaned.is_empty() {
            return Ok(Vec::new());
        }
        let efo = self.manager.schemas().efo;
        let lease = self.manager.acquire_searcher(IndexName::Efo);
        let query = TermQuery::new(
            Term::from_field_text(efo.qe_term, &cleaned),
            IndexRecordOption::Basic,
        );
        let addresses = lease.search(&query, &DocSetCollector)?;
        let mut out: BTreeSet<String> = BTreeSet::new();
        for address in addresses {
            let doc: TantivyDocument = lease.doc(address)?;
            for value in doc.get_all(efo.qe_efo) {
                if let Some(text) = value.as_str() {
                    if text != cleaned {
                        out.insert(text.to_string());
                    }
                }
            }
        }
        Ok(out.into_iter().collect())
    }
}
