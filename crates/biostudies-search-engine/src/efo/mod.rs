//! EFO ontology subsystem: in-memory model, index build, query expansion,
//! and the term matcher rebuilt from the index.

pub mod expansion;
pub mod index_builder;
pub mod matcher;
pub mod model;

pub use expansion::{ExpansionDoc, QueryExpander, clean_value, expansion_doc};
pub use index_builder::EfoIndexer;
pub use matcher::EfoTermMatcher;
pub use model::{EFO_ROOT_ID, EfoModel, EfoNode, JsonOntologySource, NodeId, OntologySource};
