//! Collection registry
//!
//! The registry JSON declares, per collection, how fields are extracted
//! from submission trees (JSONPaths), how they are analyzed, and how they
//! are indexed. Validation happens at load time; a bad property aborts the
//! load with an error naming it. After load the registry is immutable and
//! all lookups are lock-free.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use crate::analyzers::AnalyzerKind;
use crate::error::{SearchError, SearchResult};
use crate::json_path;
use crate::parsers::ParserKind;

/// Name of the collection whose properties apply to every other collection.
pub const PUBLIC_COLLECTION: &str = "public";

// ── Field types ──────────────────────────────────────────────────────────────

/// How a property is written into the SUBMISSION index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// Indexed as a single exact term.
    UntokenizedString,
    /// Analyzed full-text field.
    TokenizedString,
    /// Signed 64-bit numeric field.
    Long,
    /// Hierarchical facet field.
    Facet,
}

impl FieldType {
    /// Parse a registry field type name, case-insensitively.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "untokenized_string" | "untokenizedstring" => Some(Self::UntokenizedString),
            "tokenized_string" | "tokenizedstring" => Some(Self::TokenizedString),
            "long" => Some(Self::Long),
            "facet" => Some(Self::Facet),
            _ => None,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::UntokenizedString => "untokenized_string",
            Self::TokenizedString => "tokenized_string",
            Self::Long => "long",
            Self::Facet => "facet",
        };
        f.write_str(name)
    }
}

// ── Property descriptor ──────────────────────────────────────────────────────

/// One validated schema entry: how to extract and index a single field.
#[derive(Debug, Clone)]
pub struct PropertyDescriptor {
    /// Field name, unique across all collections.
    pub name: String,
    /// Display title.
    pub title: String,
    pub field_type: FieldType,
    /// Explicit analyzer; `None` means the attribute default.
    pub analyzer: Option<AnalyzerKind>,
    /// Value parser applied after JSONPath extraction.
    pub parser: Option<ParserKind>,
    /// OR-combined extraction paths, evaluated in order.
    pub json_paths: Vec<String>,
    pub sortable: bool,
    pub multi_valued: bool,
    /// Whether the value is stored for retrieval in search hits.
    pub retrieved: bool,
    /// Whether free-text queries against this field go through EFO expansion.
    pub expanded: bool,
    /// Private fields never participate in free-text search.
    pub private: bool,
    pub to_lower_case: bool,
    pub facet_type: Option<String>,
    /// Used when extraction produces no values.
    pub default_value: Option<String>,
    /// Extracted values must match; capture group 1 wins when present.
    pub match_pattern: Option<Regex>,
}

impl PropertyDescriptor {
    /// Derived from the field type.
    #[must_use]
    pub const fn is_facet(&self) -> bool {
        matches!(self.field_type, FieldType::Facet)
    }

    /// Whether free-text queries should search this field.
    #[must_use]
    pub const fn is_searchable(&self) -> bool {
        !self.private
            && matches!(
                self.field_type,
                FieldType::TokenizedString | FieldType::UntokenizedString
            )
    }
}

impl PartialEq for PropertyDescriptor {
    fn eq(&self, other: &Self) -> bool {
        let pattern = |p: &Option<Regex>| p.as_ref().map(|r| r.as_str().to_string());
        self.name == other.name
            && self.title == other.title
            && self.field_type == other.field_type
            && self.analyzer == other.analyzer
            && self.parser == other.parser
            && self.json_paths == other.json_paths
            && self.sortable == other.sortable
            && self.multi_valued == other.multi_valued
            && self.retrieved == other.retrieved
            && self.expanded == other.expanded
            && self.private == other.private
            && self.to_lower_case == other.to_lower_case
            && self.facet_type == other.facet_type
            && self.default_value == other.default_value
            && pattern(&self.match_pattern) == pattern(&other.match_pattern)
    }
}

/// One collection: a name plus its ordered property list.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionDescriptor {
    pub name: String,
    pub properties: Vec<PropertyDescriptor>,
}

impl CollectionDescriptor {
    /// Property lookup by exact name.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.properties.iter().find(|p| p.name == name)
    }
}

// ── Raw (unvalidated) JSON shapes ────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCollection {
    collection_name: String,
    #[serde(default)]
    properties: Vec<RawProperty>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawProperty {
    name: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    field_type: Option<String>,
    #[serde(default)]
    analyzer: Option<String>,
    #[serde(default)]
    parser: Option<String>,
    #[serde(default, alias = "jsonPaths")]
    json_path: Vec<String>,
    #[serde(default)]
    sortable: bool,
    #[serde(default)]
    multi_valued: bool,
    #[serde(default)]
    retrieved: Option<bool>,
    #[serde(default)]
    expanded: bool,
    #[serde(default)]
    private: bool,
    #[serde(default)]
    to_lower_case: bool,
    #[serde(default)]
    facet_type: Option<String>,
    #[serde(default)]
    default_value: Option<String>,
    #[serde(default, rename = "match")]
    match_pattern: Option<String>,
}

// ── Registry ─────────────────────────────────────────────────────────────────

/// The loaded, validated registry with its derived caches.
#[derive(Debug, Clone)]
pub struct CollectionRegistry {
    collections: Vec<CollectionDescriptor>,
    /// Union of all collection property maps; duplicates are a load error.
    global: IndexMap<String, PropertyDescriptor>,
    /// Properties of the public collection, appended to every other
    /// collection's effective list.
    public: Vec<PropertyDescriptor>,
    /// Lowercased collection name → position in `collections`.
    by_name: HashMap<String, usize>,
    /// Global field names eligible for free-text search.
    searchable: Vec<String>,
}

impl CollectionRegistry {
    /// Load and validate the registry from a JSON file.
    ///
    /// # Errors
    ///
    /// I/O and JSON errors, plus [`SearchError::InvalidRegistry`] /
    /// [`SearchError::DuplicateProperty`] for semantic problems.
    pub fn load(path: &Path) -> SearchResult<Self> {
        let raw = fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Parse and validate registry JSON.
    pub fn from_json_str(raw: &str) -> SearchResult<Self> {
        let value: Value = serde_json::from_str(raw)?;
        Self::from_value(value)
    }

    /// Validate an already-parsed registry document.
    pub fn from_value(value: Value) -> SearchResult<Self> {
        let raw_collections: Vec<RawCollection> = serde_json::from_value(value)?;

        let mut collections = Vec::with_capacity(raw_collections.len());
        for raw in raw_collections {
            let mut properties = Vec::with_capacity(raw.properties.len());
            for prop in raw.properties {
                properties.push(validate_property(prop)?);
            }
            collections.push(CollectionDescriptor {
                name: raw.collection_name,
                properties,
            });
        }

        let mut global: IndexMap<String, PropertyDescriptor> = IndexMap::new();
        for collection in &collections {
            for property in &collection.properties {
                if global
                    .insert(property.name.clone(), property.clone())
                    .is_some()
                {
                    return Err(SearchError::DuplicateProperty(property.name.clone()));
                }
            }
        }

        let by_name = collections
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name.to_lowercase(), i))
            .collect();

        let public = collections
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(PUBLIC_COLLECTION))
            .map(|c| c.properties.clone())
            .unwrap_or_default();

        let searchable = global
            .values()
            .filter(|p| p.is_searchable())
            .map(|p| p.name.clone())
            .collect();

        Ok(Self {
            collections,
            global,
            public,
            by_name,
            searchable,
        })
    }

    /// All collections in declaration order.
    #[must_use]
    pub fn collections(&self) -> &[CollectionDescriptor] {
        &self.collections
    }

    /// Case-insensitive collection lookup.
    #[must_use]
    pub fn collection(&self, name: &str) -> Option<&CollectionDescriptor> {
        self.by_name
            .get(&name.to_lowercase())
            .map(|&i| &self.collections[i])
    }

    /// Iterate the global property map in declaration order.
    pub fn global_properties(&self) -> impl Iterator<Item = &PropertyDescriptor> {
        self.global.values()
    }

    /// Global property lookup by field name.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.global.get(name)
    }

    /// Number of properties across all collections.
    #[must_use]
    pub fn property_count(&self) -> usize {
        self.global.len()
    }

    /// Effective property list for a collection: its own properties plus the
    /// public ones (the public collection gets no duplicate append). Unknown
    /// collections fall back to the public list.
    #[must_use]
    pub fn effective_properties(&self, collection: Option<&str>) -> Vec<&PropertyDescriptor> {
        match collection.and_then(|name| self.collection(name)) {
            Some(desc) if desc.name.eq_ignore_ascii_case(PUBLIC_COLLECTION) => {
                desc.properties.iter().collect()
            }
            Some(desc) => desc
                .properties
                .iter()
                .chain(self.public.iter())
                .collect(),
            None => self.public.iter().collect(),
        }
    }

    /// Field names searched by free-text queries.
    #[must_use]
    pub fn searchable_fields(&self) -> &[String] {
        &self.searchable
    }

    /// Facet properties in declaration order.
    pub fn facet_properties(&self) -> impl Iterator<Item = &PropertyDescriptor> {
        self.global.values().filter(|p| p.is_facet())
    }
}

fn validate_property(raw: RawProperty) -> SearchResult<PropertyDescriptor> {
    let invalid = |reason: String| SearchError::InvalidRegistry {
        property: raw.name.clone(),
        reason,
    };

    let field_type_name = raw
        .field_type
        .as_deref()
        .ok_or_else(|| invalid("missing fieldType".to_string()))?;
    let field_type = FieldType::parse(field_type_name)
        .ok_or_else(|| invalid(format!("unknown fieldType {field_type_name:?}")))?;

    let analyzer = raw
        .analyzer
        .as_deref()
        .map(|name| {
            AnalyzerKind::parse(name).ok_or_else(|| invalid(format!("unknown analyzer {name:?}")))
        })
        .transpose()?;

    let parser = raw
        .parser
        .as_deref()
        .map(|name| {
            ParserKind::parse(name).ok_or_else(|| invalid(format!("unknown parser {name:?}")))
        })
        .transpose()?;

    for path in &raw.json_path {
        json_path::compile(path)
            .map_err(|reason| invalid(format!("invalid JSONPath {path:?}: {reason}")))?;
    }

    let match_pattern = raw
        .match_pattern
        .as_deref()
        .map(|pattern| {
            Regex::new(pattern).map_err(|e| invalid(format!("invalid match regex: {e}")))
        })
        .transpose()?;

    Ok(PropertyDescriptor {
        title: raw.title.unwrap_or_else(|| raw.name.clone()),
        name: raw.name,
        field_type,
        analyzer,
        parser,
        json_paths: raw.json_path,
        sortable: raw.sortable,
        multi_valued: raw.multi_valued,
        retrieved: raw.retrieved.unwrap_or(true),
        expanded: raw.expanded,
        private: raw.private,
        to_lower_case: raw.to_lower_case,
        facet_type: raw.facet_type,
        default_value: raw.default_value,
        match_pattern,
    })
}
