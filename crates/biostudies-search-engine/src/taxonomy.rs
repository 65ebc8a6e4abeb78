//! Taxonomy facet search
//!
//! The `efo` facet of every submission stores full hierarchical paths
//! (`root/.../term`). Prefix search is depth-agnostic and aggregates counts
//! per term with **sum** across paths; child expansion aggregates with
//! **max** so a submission appearing in several branches of the same term
//! is not double-counted. Both orderings are alphabetical.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use tantivy::collector::FacetCollector;
use tantivy::query::AllQuery;
use tantivy::schema::Facet;

use crate::efo::EfoTermMatcher;
use crate::error::SearchResult;
use crate::index_manager::{IndexManager, IndexName};
use crate::schema::names;

/// One taxonomy suggestion or child entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaxonomyEntry {
    pub term: String,
    pub efo_id: Option<String>,
    pub count: u64,
    pub has_children: bool,
}

impl TaxonomyEntry {
    /// Autocomplete line format: `term|o|efo_id_or_empty|count`.
    #[must_use]
    pub fn format_line(&self) -> String {
        format!(
            "{}|o|{}|{}",
            self.term,
            self.efo_id.as_deref().unwrap_or(""),
            self.count
        )
    }
}

type FacetPath = (Vec<String>, u64);

/// Hierarchical autocomplete with submission counts.
pub struct TaxonomySearch {
    manager: Arc<IndexManager>,
    matcher: Arc<EfoTermMatcher>,
}

impl TaxonomySearch {
    #[must_use]
    pub const fn new(manager: Arc<IndexManager>, matcher: Arc<EfoTermMatcher>) -> Self {
        Self { manager, matcher }
    }

    /// Prefix search over the last segment of every facet path, counts
    /// summed per term across paths, alphabetical, limited to `max`.
    pub fn search_all_depths(&self, prefix: &str, max: usize) -> SearchResult<Vec<TaxonomyEntry>> {
        let facets = self.collect_facets()?;
        let parents = parent_paths(&facets);
        let prefix_lower = prefix.to_lowercase();

        let mut by_term: BTreeMap<String, (u64, bool)> = BTreeMap::new();
        for (path, count) in &facets {
            let Some(last) = path.last() else { continue };
            if !last.starts_with(&prefix_lower) {
                continue;
            }
            let entry = by_term.entry(last.clone()).or_insert((0, false));
            entry.0 += count;
            entry.1 |= parents.contains(path);
        }

        Ok(self.materialize(by_term, max))
    }

    /// Direct children of every path ending in `parent_term`, counts
    /// aggregated with max across parent paths, alphabetical, limited to
    /// `max`. The parent itself is never part of the result.
    pub fn children(&self, parent_term: &str, max: usize) -> SearchResult<Vec<TaxonomyEntry>> {
        let facets = self.collect_facets()?;
        let parents = parent_paths(&facets);
        let term_lower = parent_term.to_lowercase();

        let mut by_child: BTreeMap<String, (u64, bool)> = BTreeMap::new();
        for (path, count) in &facets {
            let depth = path.len();
            if depth < 2 || path[depth - 2] != term_lower {
                continue;
            }
            let child = path[depth - 1].clone();
            let entry = by_child.entry(child).or_insert((0, false));
            entry.0 = entry.0.max(*count);
            entry.1 |= parents.contains(path);
        }

        Ok(self.materialize(by_child, max))
    }

    /// Child expansion addressed by EFO id instead of term.
    pub fn children_by_efo_id(&self, efo_id: &str, max: usize) -> SearchResult<Vec<TaxonomyEntry>> {
        match self.matcher.term_by_id(efo_id) {
            Some(term) => self.children(&term, max),
            None => Ok(Vec::new()),
        }
    }

    fn materialize(
        &self,
        by_term: BTreeMap<String, (u64, bool)>,
        max: usize,
    ) -> Vec<TaxonomyEntry> {
        by_term
            .into_iter()
            .take(max)
            .map(|(term, (count, has_children))| TaxonomyEntry {
                efo_id: self.matcher.efo_id(&term),
                term,
                count,
                has_children,
            })
            .collect()
    }

    /// Breadth-first enumeration of every facet path with its submission
    /// count, via one facet collection per depth.
    fn collect_facets(&self) -> SearchResult<Vec<FacetPath>> {
        let lease = self.manager.acquire_searcher(IndexName::Submission);
        let mut results: Vec<FacetPath> = Vec::new();
        let mut frontier: Vec<Vec<String>> = vec![Vec::new()];

        while !frontier.is_empty() {
            let mut collector = FacetCollector::for_field(names::EFO_FACET);
            for path in &frontier {
                collector.add_facet(facet_of(path));
            }
            let counts = lease.search(&AllQuery, &collector)?;

            let mut next: Vec<Vec<String>> = Vec::new();
            for path in &frontier {
                for (facet, count) in counts.get(facet_of(path)) {
                    let segments: Vec<String> =
                        facet.to_path().into_iter().map(ToString::to_string).collect();
                    results.push((segments.clone(), count));
                    next.push(segments);
                }
            }
            frontier = next;
        }
        Ok(results)
    }
}

fn facet_of(path: &[String]) -> Facet {
    if path.is_empty() {
        Facet::root()
    } else {
        Facet::from_path(path)
    }
}

/// Set of paths that have at least one child path.
fn parent_paths(facets: &[FacetPath]) -> HashSet<Vec<String>> {
    facets
        .iter()
        .filter(|(path, _)| path.len() >= 2)
        .map(|(path, _)| path[..path.len() - 1].to_vec())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::AnalyzerDispatch;
    use crate::registry::CollectionRegistry;
    use tantivy::TantivyDocument;

    fn setup() -> (tempfile::TempDir, Arc<IndexManager>, TaxonomySearch) {
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
        let taxonomy = TaxonomySearch::new(Arc::clone(&manager), Arc::new(EfoTermMatcher::new()));
        (dir, manager, taxonomy)
    }

    fn index_paths(manager: &IndexManager, paths: &[(&str, usize)]) {
        let schemas = manager.schemas();
        let mut serial = 0;
        {
            let writer = manager.writer(IndexName::Submission);
            for (path, count) in paths {
                for _ in 0..*count {
                    serial += 1;
                    let mut doc = TantivyDocument::default();
                    doc.add_text(schemas.submission.accession, format!("S-TAX{serial}"));
                    let facet = Facet::from_path(path.split('/'));
                    doc.add_facet(schemas.submission.efo_facet, facet);
                    writer.add_document(doc).unwrap();
                }
            }
        }
        manager.commit(IndexName::Submission).unwrap();
        manager.refresh_all();
    }

    #[test]
    fn children_aggregate_with_max_and_sort_alphabetically() {
        let (_dir, manager, taxonomy) = setup();
        index_paths(
            &manager,
            &[
                ("ef/cell type", 5),
                ("ef/sample/cell type", 3),
                ("ef/cell type/t cell", 2),
                ("ef/cell type/b cell", 4),
            ],
        );

        let children = taxonomy.children("cell type", 10).unwrap();
        let summary: Vec<(&str, u64, bool)> = children
            .iter()
            .map(|e| (e.term.as_str(), e.count, e.has_children))
            .collect();
        assert_eq!(summary, vec![("b cell", 4, false), ("t cell", 2, false)]);
    }

    #[test]
    fn children_never_contain_the_parent() {
        let (_dir, manager, taxonomy) = setup();
        index_paths(&manager, &[("a/b", 1), ("a/b/b", 2)]);
        let children = taxonomy.children("b", 10).unwrap();
        // The nested "b" is a legitimate child of the outer one; the parent
        // path itself never shows up as its own child.
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].count, 2);
    }

    #[test]
    fn prefix_search_sums_across_paths() {
        let (_dir, manager, taxonomy) = setup();
        index_paths(&manager, &[("x/alpha", 2), ("y/alpha", 3), ("y/beta", 1)]);

        let entries = taxonomy.search_all_depths("al", 10).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].term, "alpha");
        assert_eq!(entries[0].count, 5);
        assert!(!entries[0].has_children);
    }

    #[test]
    fn prefix_search_is_case_insensitive_and_limited() {
        let (_dir, manager, taxonomy) = setup();
        index_paths(&manager, &[("r/apple", 1), ("r/apricot", 1), ("r/banana", 1)]);

        let entries = taxonomy.search_all_depths("AP", 1).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].term, "apple");
    }

    #[test]
    fn has_children_reflects_deeper_paths() {
        let (_dir, manager, taxonomy) = setup();
        index_paths(&manager, &[("r/node", 1), ("r/node/leaf", 1)]);

        let entries = taxonomy.search_all_depths("node", 10).unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].has_children);

        let children = taxonomy.children("node", 10).unwrap();
        assert_eq!(children[0].term, "leaf");
        assert!(!children[0].has_children);
    }

    #[test]
    fn autocomplete_line_format() {
        let entry = TaxonomyEntry {
            term: "cell type".to_string(),
            efo_id: Some("efo_0000324".to_string()),
            count: 7,
            has_children: true,
        };
        assert_eq!(entry.format_line(), "cell type|o|efo_0000324|7");

        let anonymous = TaxonomyEntry {
            term: "beads".to_string(),
            efo_id: None,
            count: 2,
            has_children: false,
        };
        assert_eq!(anonymous.format_line(), "beads|o||2");
    }

    #[test]
    fn empty_index_yields_nothing() {
        let (_dir, _manager, taxonomy) = setup();
        assert!(taxonomy.search_all_depths("x", 10).unwrap().is_empty());
        assert!(taxonomy.children("x", 10).unwrap().is_empty());
    }
}
