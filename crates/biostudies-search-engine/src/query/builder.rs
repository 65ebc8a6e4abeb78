//! Registry-aware query building
//!
//! Free text is parsed across the global searchable-field array with each
//! field's own analyzer; facet parameters become conjunctive facet term
//! filters; field parameters matching registry properties become term
//! filters under the field's analyzer; configured excluded document types
//! are subtracted; EFO expansion widens free text over the `expanded`
//! fields; finally the security clause is conjoined.

use std::sync::Arc;

use tantivy::query::{AllQuery, BooleanQuery, Occur, Query, QueryParser, TermQuery};
use tantivy::schema::{Facet, IndexRecordOption, Term};
use tracing::{debug, warn};

use biostudies_search_core::UserContext;

use crate::analyzers::{AnalyzerDispatch, analyze};
use crate::efo::QueryExpander;
use crate::error::{SearchError, SearchResult};
use crate::index_manager::{IndexManager, IndexName};
use crate::query::preprocess::PreparedRequest;
use crate::query::security::apply_security;
use crate::registry::{CollectionRegistry, FieldType};

/// Builds executable queries from prepared requests.
pub struct QueryBuilder {
    manager: Arc<IndexManager>,
    registry: Arc<CollectionRegistry>,
    dispatch: AnalyzerDispatch,
    expander: QueryExpander,
    /// Query-syntax string of excluded document types, e.g.
    /// `type:compound type:project`.
    excluded_document_types: String,
}

impl QueryBuilder {
    #[must_use]
    pub fn new(
        manager: Arc<IndexManager>,
        registry: Arc<CollectionRegistry>,
        dispatch: AnalyzerDispatch,
        excluded_document_types: String,
    ) -> Self {
        let expander = QueryExpander::new(Arc::clone(&manager));
        Self {
            manager,
            registry,
            dispatch,
            expander,
            excluded_document_types,
        }
    }

    /// Compose the full query for a prepared request and user.
    pub fn build(
        &self,
        prepared: &PreparedRequest,
        user: &UserContext,
    ) -> SearchResult<Box<dyn Query>> {
        let schema = &self.manager.schemas().submission;
        let index = self.manager.index(IndexName::Submission);

        let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();
        clauses.push((Occur::Must, self.free_text_clause(&prepared.query)?));

        for (name, value) in &prepared.facets {
            let Some(property) = self.registry.property(name).filter(|p| p.is_facet()) else {
                warn!(facet = %name, "unknown facet parameter ignored");
                continue;
            };
            let Some(field) = schema.field(&property.name) else {
                continue;
            };
            let segments: Vec<String> = value
                .to_lowercase()
                .split('/')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToString::to_string)
                .collect();
            if segments.is_empty() {
                continue;
            }
            clauses.push((
                Occur::Must,
                Box::new(TermQuery::new(
                    Term::from_facet(field, &Facet::from_path(segments)),
                    IndexRecordOption::Basic,
                )),
            ));
        }

        for (name, value) in &prepared.fields {
            let Some(property) = self.registry.property(name).filter(|p| !p.is_facet()) else {
                warn!(field = %name, "unknown field parameter ignored");
                continue;
            };
            let Some(field) = schema.field(&property.name) else {
                continue;
            };
            match property.field_type {
                FieldType::UntokenizedString => {
                    let term = if property.to_lower_case {
                        value.to_lowercase()
                    } else {
                        value.clone()
                    };
                    clauses.push((
                        Occur::Must,
                        Box::new(TermQuery::new(
                            Term::from_field_text(field, &term),
                            IndexRecordOption::Basic,
                        )),
                    ));
                }
                FieldType::TokenizedString => {
                    let tokenizer = self.dispatch.tokenizer_for(&property.name);
                    for token in analyze(index, tokenizer, value) {
                        clauses.push((
                            Occur::Must,
                            Box::new(TermQuery::new(
                                Term::from_field_text(field, &token),
                                IndexRecordOption::Basic,
                            )),
                        ));
                    }
                }
                FieldType::Long => match value.parse::<i64>() {
                    Ok(number) => clauses.push((
                        Occur::Must,
                        Box::new(TermQuery::new(
                            Term::from_field_i64(field, number),
                            IndexRecordOption::Basic,
                        )),
                    )),
                    Err(_) => {
                        return Err(SearchError::QueryBuild(format!(
                            "field {name} expects a number, got {value:?}"
                        )));
                    }
                },
                FieldType::Facet => unreachable!("filtered above"),
            }
        }

        if let Some(excluded) = self.excluded_types_clause()? {
            clauses.push((Occur::MustNot, excluded));
        }

        let composed: Box<dyn Query> = Box::new(BooleanQuery::new(clauses));
        apply_security(index, schema, composed, user, prepared.seckey.as_deref())
    }

    /// Free text across the searchable fields, widened by expansion values
    /// over the `expanded` fields. Empty queries match everything.
    fn free_text_clause(&self, query: &str) -> SearchResult<Box<dyn Query>> {
        if query.is_empty() {
            return Ok(Box::new(AllQuery));
        }
        let schema = &self.manager.schemas().submission;
        let index = self.manager.index(IndexName::Submission);

        let searchable: Vec<tantivy::schema::Field> = self
            .registry
            .searchable_fields()
            .iter()
            .filter_map(|name| schema.field(name))
            .collect();
        if searchable.is_empty() {
            return Err(SearchError::QueryBuild(
                "registry declares no searchable fields".to_string(),
            ));
        }
        let parser = QueryParser::for_index(index, searchable);
        let parsed = parser.parse_query(query)?;

        let expanded_fields: Vec<tantivy::schema::Field> = self
            .registry
            .global_properties()
            .filter(|p| p.expanded)
            .filter_map(|p| schema.field(&p.name))
            .collect();

        let mut alternatives: Vec<Box<dyn Query>> = vec![parsed];
        if !expanded_fields.is_empty() {
            let expansion_parser = QueryParser::for_index(index, expanded_fields);
            for synonym in self.expansions_for(query)? {
                let quoted = format!("\"{synonym}\"");
                match expansion_parser.parse_query(&quoted) {
                    Ok(q) => alternatives.push(q),
                    Err(e) => debug!(%synonym, error = %e, "expansion term skipped"),
                }
            }
        }

        if alternatives.len() == 1 {
            Ok(alternatives.swap_remove(0))
        } else {
            Ok(Box::new(BooleanQuery::union(alternatives)))
        }
    }

    /// Expansion values for the whole query and for each of its tokens.
    fn expansions_for(&self, query: &str) -> SearchResult<Vec<String>> {
        let mut out = self.expander.expand(query)?;
        for token in query.split_whitespace() {
            if token.len() < 2 {
                continue;
            }
            for value in self.expander.expand(token)? {
                if !out.contains(&value) {
                    out.push(value);
                }
            }
        }
        Ok(out)
    }

    fn excluded_types_clause(&self) -> SearchResult<Option<Box<dyn Query>>> {
        let raw = self.excluded_document_types.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        let index = self.manager.index(IndexName::Submission);
        let parser = QueryParser::for_index(index, Vec::new());
        let parsed = parser
            .parse_query(raw)
            .map_err(|e| SearchError::QueryBuild(format!("excluded document types: {e}")))?;
        Ok(Some(parsed))
    }
}
