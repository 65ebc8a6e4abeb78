//! In-memory EFO ontology model
//!
//! Nodes live in an arena (`Vec<EfoNode>`); parents and children are stable
//! indices, so the graph can be a DAG without shared mutability. The root
//! is a sentinel node with id `efo-root`. Ancestor computation always takes
//! the first parent when several exist.

use std::collections::{HashMap, HashSet};

use serde::Deserialize;
use serde_json::Value;

use crate::error::SearchResult;

/// Sentinel identifier of the synthetic root node.
pub const EFO_ROOT_ID: &str = "efo-root";

/// Stable arena index of a node.
pub type NodeId = usize;

/// One ontology class.
#[derive(Debug, Clone)]
pub struct EfoNode {
    /// Immutable accession-style identifier (e.g. `EFO_0000311`).
    pub id: String,
    /// Primary term.
    pub term: String,
    /// Full IRI, when known.
    pub uri: Option<String>,
    /// Alternative terms (synonyms).
    pub alt_terms: Vec<String>,
    pub parents: Vec<NodeId>,
    pub children: Vec<NodeId>,
    /// Organizational classes group other classes; they contribute no
    /// children to query expansion.
    pub organizational: bool,
}

/// Arena-backed ontology graph.
#[derive(Debug, Clone)]
pub struct EfoModel {
    nodes: Vec<EfoNode>,
    by_id: HashMap<String, NodeId>,
}

impl EfoModel {
    /// Empty model containing only the root sentinel.
    #[must_use]
    pub fn new() -> Self {
        let root = EfoNode {
            id: EFO_ROOT_ID.to_string(),
            term: "root".to_string(),
            uri: None,
            alt_terms: Vec::new(),
            parents: Vec::new(),
            children: Vec::new(),
            organizational: true,
        };
        Self {
            nodes: vec![root],
            by_id: HashMap::from([(EFO_ROOT_ID.to_string(), 0)]),
        }
    }

    /// The sentinel root.
    #[must_use]
    pub const fn root(&self) -> NodeId {
        0
    }

    /// Insert a node, or return the existing one with the same id.
    pub fn add_node(
        &mut self,
        id: impl Into<String>,
        term: impl Into<String>,
        uri: Option<String>,
        alt_terms: Vec<String>,
        organizational: bool,
    ) -> NodeId {
        let id = id.into();
        if let Some(&existing) = self.by_id.get(&id) {
            return existing;
        }
        let node_id = self.nodes.len();
        self.nodes.push(EfoNode {
            id: id.clone(),
            term: term.into(),
            uri,
            alt_terms,
            parents: Vec::new(),
            children: Vec::new(),
            organizational,
        });
        self.by_id.insert(id, node_id);
        node_id
    }

    /// Link a parent/child pair; duplicate links are ignored.
    pub fn link(&mut self, parent: NodeId, child: NodeId) {
        if !self.nodes[parent].children.contains(&child) {
            self.nodes[parent].children.push(child);
        }
        if !self.nodes[child].parents.contains(&parent) {
            self.nodes[child].parents.push(parent);
        }
    }

    #[must_use]
    pub fn node(&self, id: NodeId) -> &EfoNode {
        &self.nodes[id]
    }

    /// Arena lookup by string id.
    #[must_use]
    pub fn resolve(&self, id: &str) -> Option<NodeId> {
        self.by_id.get(id).copied()
    }

    /// Number of nodes, root sentinel included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// Order every node's children alphabetically by term. Call once after
    /// the graph is fully linked.
    pub fn sort_children_by_term(&mut self) {
        let terms: Vec<String> = self.nodes.iter().map(|n| n.term.to_lowercase()).collect();
        for node in &mut self.nodes {
            node.children.sort_by(|a, b| terms[*a].cmp(&terms[*b]));
            node.parents.sort_by(|a, b| terms[*a].cmp(&terms[*b]));
        }
    }

    /// Pre-order depth-first traversal from the root, cycle-safe. The root
    /// sentinel itself is not yielded.
    #[must_use]
    pub fn depth_first(&self) -> Vec<NodeId> {
        let mut visited: HashSet<NodeId> = HashSet::new();
        let mut order = Vec::new();
        let mut stack: Vec<NodeId> = self.nodes[self.root()]
            .children
            .iter()
            .rev()
            .copied()
            .collect();
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            order.push(id);
            for &child in self.nodes[id].children.iter().rev() {
                stack.push(child);
            }
        }
        order
    }

    /// First-parent chain from the root down to the node's direct parent.
    /// Empty for root children and unknown nodes. The root sentinel is not
    /// part of the chain.
    #[must_use]
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut chain = Vec::new();
        let mut seen: HashSet<NodeId> = HashSet::from([id]);
        let mut current = id;
        while let Some(&parent) = self.nodes[current].parents.first() {
            if parent == self.root() || !seen.insert(parent) {
                break;
            }
            chain.push(parent);
            current = parent;
        }
        chain.reverse();
        chain
    }
}

impl Default for EfoModel {
    fn default() -> Self {
        Self::new()
    }
}

// ── Sources ──────────────────────────────────────────────────────────────────

/// Ontology parsing is an external collaborator: anything that can produce
/// an [`EfoModel`] can drive the EFO index build.
pub trait OntologySource {
    fn load(&self) -> SearchResult<EfoModel>;
}

#[derive(Debug, Deserialize)]
struct JsonNode {
    id: String,
    term: String,
    #[serde(default)]
    uri: Option<String>,
    #[serde(default)]
    synonyms: Vec<String>,
    #[serde(default)]
    organizational: bool,
    #[serde(default)]
    children: Vec<JsonNode>,
}

/// Loads a model from a JSON tree of `{id, term, uri?, synonyms?,
/// organizational?, children?}` nodes rooted at a top-level array.
pub struct JsonOntologySource {
    value: Value,
}

impl JsonOntologySource {
    #[must_use]
    pub const fn new(value: Value) -> Self {
        Self { value }
    }

    /// Read the JSON document from a file.
    pub fn from_path(path: &std::path::Path) -> SearchResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(crate::error::SearchError::from)?;
        Ok(Self {
            value: serde_json::from_str(&raw).map_err(crate::error::SearchError::from)?,
        })
    }
}

impl OntologySource for JsonOntologySource {
    fn load(&self) -> SearchResult<EfoModel> {
        let roots: Vec<JsonNode> = serde_json::from_value(self.value.clone())?;
        let mut model = EfoModel::new();
        let root = model.root();
        for node in roots {
            insert_tree(&mut model, root, node);
        }
        model.sort_children_by_term();
        Ok(model)
    }
}

fn insert_tree(model: &mut EfoModel, parent: NodeId, node: JsonNode) {
    let id = model.add_node(
        node.id,
        node.term,
        node.uri,
        node.synonyms,
        node.organizational,
    );
    model.link(parent, id);
    for child in node.children {
        insert_tree(model, id, child);
    }
}
