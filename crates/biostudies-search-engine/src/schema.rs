//! Index schemas and field handles
//!
//! The SUBMISSION schema is derived from the collection registry at startup:
//! every global property becomes a field of its declared type, analyzed by
//! its dispatched analyzer. The FILES, PAGE_TAB, and EFO schemas are fixed.

use std::collections::HashMap;

use tantivy::schema::{
    FAST, FacetOptions, Field, INDEXED, IndexRecordOption, NumericOptions, STORED, STRING, Schema,
    SchemaBuilder, TextFieldIndexing, TextOptions,
};

use crate::analyzers::{AnalyzerDispatch, AnalyzerKind};
use crate::registry::{CollectionRegistry, FieldType};

/// Well-known field names the engine itself depends on. They are created
/// even when the registry does not declare them.
pub mod names {
    pub const ACCESSION: &str = "accession";
    pub const CONTENT: &str = "content";
    pub const ACCESS: &str = "access";
    pub const SECKEY: &str = "seckey";
    pub const IS_PUBLIC: &str = "isPublic";
    pub const EFO_FACET: &str = "efo";
    pub const RELEASE_TIME: &str = "release_time";
    pub const RELEASE_DATE: &str = "release_date";
}

fn text_options(tokenizer: &str, stored: bool) -> TextOptions {
    let indexing = TextFieldIndexing::default()
        .set_tokenizer(tokenizer)
        .set_index_option(IndexRecordOption::WithFreqsAndPositions);
    let options = TextOptions::default().set_indexing_options(indexing);
    if stored { options.set_stored() } else { options }
}

// ── SUBMISSION ───────────────────────────────────────────────────────────────

/// Registry-driven schema for the SUBMISSION index, with handles for the
/// fields the engine addresses directly.
#[derive(Debug, Clone)]
pub struct SubmissionSchema {
    pub schema: Schema,
    pub accession: Field,
    pub content: Field,
    pub access: Field,
    pub seckey: Field,
    pub is_public: Field,
    pub efo_facet: Field,
    fields: HashMap<String, Field>,
    facet_names: Vec<String>,
}

impl SubmissionSchema {
    /// Build the schema from the registry's global property map.
    #[must_use]
    pub fn build(registry: &CollectionRegistry, dispatch: &AnalyzerDispatch) -> Self {
        let mut builder = SchemaBuilder::new();
        let mut fields: HashMap<String, Field> = HashMap::new();
        let mut facet_names: Vec<String> = Vec::new();

        for property in registry.global_properties() {
            let field = match property.field_type {
                FieldType::UntokenizedString => {
                    let mut options = STRING;
                    if property.retrieved {
                        options = options | STORED;
                    }
                    if property.sortable {
                        options = options.set_fast(Some("raw"));
                    }
                    builder.add_text_field(&property.name, options)
                }
                FieldType::TokenizedString => builder.add_text_field(
                    &property.name,
                    text_options(dispatch.tokenizer_for(&property.name), property.retrieved),
                ),
                FieldType::Long => {
                    let mut options = NumericOptions::default().set_indexed().set_fast();
                    if property.retrieved {
                        options = options.set_stored();
                    }
                    builder.add_i64_field(&property.name, options)
                }
                FieldType::Facet => {
                    facet_names.push(property.name.clone());
                    builder.add_facet_field(&property.name, FacetOptions::default().set_stored())
                }
            };
            fields.insert(property.name.clone(), field);
        }

        // Fields the engine needs regardless of registry contents.
        let mut ensure_text = |name: &str, options: TextOptions| {
            if let Some(field) = fields.get(name) {
                *field
            } else {
                let field = builder.add_text_field(name, options);
                fields.insert(name.to_string(), field);
                field
            }
        };

        let accession = ensure_text(names::ACCESSION, STRING | STORED);
        let content = ensure_text(
            names::CONTENT,
            text_options(AnalyzerKind::Attribute.tokenizer_name(), true),
        );
        let access = ensure_text(
            names::ACCESS,
            text_options(AnalyzerKind::Access.tokenizer_name(), true),
        );
        let seckey = ensure_text(names::SECKEY, STRING);
        let is_public = ensure_text(names::IS_PUBLIC, STRING | STORED);

        let efo_facet = if let Some(field) = fields.get(names::EFO_FACET) {
            *field
        } else {
            let field =
                builder.add_facet_field(names::EFO_FACET, FacetOptions::default().set_stored());
            fields.insert(names::EFO_FACET.to_string(), field);
            facet_names.push(names::EFO_FACET.to_string());
            field
        };

        let schema = builder.build();
        Self {
            schema,
            accession,
            content,
            access,
            seckey,
            is_public,
            efo_facet,
            fields,
            facet_names,
        }
    }

    /// Handle for a registry field.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<Field> {
        self.fields.get(name).copied()
    }

    /// Names of all facet fields, `efo` included.
    #[must_use]
    pub fn facet_names(&self) -> &[String] {
        &self.facet_names
    }
}

// ── FILES ────────────────────────────────────────────────────────────────────

/// Fixed schema for the FILES index: one document per referenced file.
#[derive(Debug, Clone, Copy)]
pub struct FilesSchema {
    pub accession: Field,
    pub file_name: Field,
    pub file_path: Field,
    pub rel_path: Field,
    pub full_path: Field,
    pub md5: Field,
    pub size: Field,
    pub file_type: Field,
    pub ext_type: Field,
    pub is_directory: Field,
}

impl FilesSchema {
    #[must_use]
    pub fn build() -> (Schema, Self) {
        let mut builder = SchemaBuilder::new();
        let accession = builder.add_text_field("accession", STRING | STORED);
        let file_name = builder.add_text_field(
            "fileName",
            text_options(AnalyzerKind::Attribute.tokenizer_name(), true),
        );
        let file_path = builder.add_text_field("filePath", STRING | STORED);
        let rel_path = builder.add_text_field("relPath", STRING | STORED);
        let full_path = builder.add_text_field("fullPath", STRING | STORED);
        let md5 = builder.add_text_field("md5", STRING | STORED);
        let size = builder.add_i64_field("size", INDEXED | STORED | FAST);
        let file_type = builder.add_text_field("type", STRING | STORED);
        let ext_type = builder.add_text_field("extType", STRING | STORED);
        let is_directory = builder.add_text_field("isDirectory", STRING | STORED);
        (
            builder.build(),
            Self {
                accession,
                file_name,
                file_path,
                rel_path,
                full_path,
                md5,
                size,
                file_type,
                ext_type,
                is_directory,
            },
        )
    }
}

// ── PAGE_TAB ─────────────────────────────────────────────────────────────────

/// Fixed schema for the PAGE_TAB index: the normalized JSON representation
/// of each submission, for exact retrieval.
#[derive(Debug, Clone, Copy)]
pub struct PageTabSchema {
    pub accession: Field,
    pub page_tab: Field,
}

impl PageTabSchema {
    #[must_use]
    pub fn build() -> (Schema, Self) {
        let mut builder = SchemaBuilder::new();
        let accession = builder.add_text_field("accession", STRING | STORED);
        let page_tab = builder.add_text_field("pageTab", STORED);
        (builder.build(), Self { accession, page_tab })
    }
}

// ── EFO ──────────────────────────────────────────────────────────────────────

/// Fixed schema for the EFO index: ontology node documents, standalone
/// alternative-term documents, and query-expansion documents.
#[derive(Debug, Clone, Copy)]
pub struct EfoSchema {
    pub id: Field,
    pub efo_id: Field,
    pub term: Field,
    pub parent: Field,
    pub child: Field,
    pub alt_term: Field,
    pub qe_term: Field,
    pub qe_efo: Field,
}

impl EfoSchema {
    #[must_use]
    pub fn build() -> (Schema, Self) {
        let mut builder = SchemaBuilder::new();
        let id = builder.add_text_field("id", STRING | STORED);
        let efo_id = builder.add_text_field("efo_id", STRING | STORED);
        let term = builder.add_text_field(
            "term",
            text_options(AnalyzerKind::ExperimentText.tokenizer_name(), true),
        );
        let parent = builder.add_text_field("parent", STRING | STORED);
        let child = builder.add_text_field("child", STRING | STORED);
        let alt_term = builder.add_text_field(
            "alt_term",
            text_options(AnalyzerKind::ExperimentText.tokenizer_name(), true),
        );
        let qe_term = builder.add_text_field("qe.term", STRING | STORED);
        let qe_efo = builder.add_text_field("qe.efo", STRING | STORED);
        (
            builder.build(),
            Self {
                id,
                efo_id,
                term,
                parent,
                child,
                alt_term,
                qe_term,
                qe_efo,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::CollectionRegistry;

    fn registry() -> CollectionRegistry {
        CollectionRegistry::from_json_str(
            r#"[{"collectionName": "public", "properties": [
                {"name": "accession", "fieldType": "untokenized_string", "jsonPath": ["$.accNo"]},
                {"name": "title", "fieldType": "tokenized_string", "jsonPath": ["$.title"]},
                {"name": "links", "fieldType": "long", "sortable": true},
                {"name": "facet.file_type", "fieldType": "facet"}
            ]}]"#,
        )
        .unwrap()
    }

    #[test]
    fn registry_fields_materialize() {
        let registry = registry();
        let dispatch = AnalyzerDispatch::from_registry(&registry);
        let schema = SubmissionSchema::build(&registry, &dispatch);
        assert!(schema.field("title").is_some());
        assert!(schema.field("links").is_some());
        assert!(schema.field("facet.file_type").is_some());
        assert!(schema.field("unknown").is_none());
    }

    #[test]
    fn engine_fields_always_exist() {
        let registry = registry();
        let dispatch = AnalyzerDispatch::from_registry(&registry);
        let schema = SubmissionSchema::build(&registry, &dispatch);
        // accession came from the registry; the rest are engine-created.
        assert_eq!(schema.field(names::ACCESSION), Some(schema.accession));
        assert!(schema.field(names::CONTENT).is_some());
        assert!(schema.field(names::ACCESS).is_some());
        assert!(schema.field(names::SECKEY).is_some());
        assert!(schema.field(names::EFO_FACET).is_some());
    }

    #[test]
    fn facet_names_include_efo() {
        let registry = registry();
        let dispatch = AnalyzerDispatch::from_registry(&registry);
        let schema = SubmissionSchema::build(&registry, &dispatch);
        assert!(schema.facet_names().contains(&"facet.file_type".to_string()));
        assert!(schema.facet_names().contains(&"efo".to_string()));
    }

    #[test]
    fn fixed_schemas_build() {
        let (files_schema, files) = FilesSchema::build();
        assert_eq!(files_schema.get_field_name(files.file_name), "fileName");

        let (pt_schema, pt) = PageTabSchema::build();
        assert_eq!(pt_schema.get_field_name(pt.page_tab), "pageTab");

        let (efo_schema, efo) = EfoSchema::build();
        assert_eq!(efo_schema.get_field_name(efo.qe_term), "qe.term");
        assert_eq!(efo_schema.get_field_name(efo.alt_term), "alt_term");
    }
}
