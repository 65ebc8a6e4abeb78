//! Security query builder
//!
//! Every query is conjoined with the caller's access constraints:
//! an OR of the user's allow tokens (anonymous callers get the single
//! `PUBLIC` token), optionally widened by a secret key matched exactly on
//! the `seckey` field, minus a MUST_NOT of the user's deny tokens. Super
//! users bypass the clause entirely.

use tantivy::Index;
use tantivy::query::{BooleanQuery, Occur, Query, TermQuery};
use tantivy::schema::{IndexRecordOption, Term};

use biostudies_search_core::UserContext;

use crate::analyzers::{AnalyzerKind, analyze};
use crate::error::{SearchError, SearchResult};
use crate::schema::SubmissionSchema;

fn access_terms(
    index: &Index,
    schema: &SubmissionSchema,
    tokens: &[&str],
) -> SearchResult<Vec<Box<dyn Query>>> {
    let mut queries: Vec<Box<dyn Query>> = Vec::new();
    for raw in tokens {
        let analyzed = analyze(index, AnalyzerKind::Access.tokenizer_name(), raw);
        if analyzed.is_empty() {
            return Err(SearchError::QueryBuild(format!(
                "access token {raw:?} has no searchable form"
            )));
        }
        for token in analyzed {
            queries.push(Box::new(TermQuery::new(
                Term::from_field_text(schema.access, &token),
                IndexRecordOption::Basic,
            )));
        }
    }
    Ok(queries)
}

/// Conjoin a query with the user's security constraints.
pub fn apply_security(
    index: &Index,
    schema: &SubmissionSchema,
    query: Box<dyn Query>,
    user: &UserContext,
    seckey: Option<&str>,
) -> SearchResult<Box<dyn Query>> {
    if user.super_user {
        return Ok(query);
    }

    let mut allow = access_terms(index, schema, &user.effective_allow())?;
    if let Some(seckey) = seckey.map(str::trim).filter(|s| !s.is_empty()) {
        allow.push(Box::new(TermQuery::new(
            Term::from_field_text(schema.seckey, seckey),
            IndexRecordOption::Basic,
        )));
    }

    let mut clauses: Vec<(Occur, Box<dyn Query>)> = vec![
        (Occur::Must, query),
        (Occur::Must, Box::new(BooleanQuery::union(allow))),
    ];

    if !user.deny.is_empty() {
        let deny_tokens: Vec<&str> = user.deny.iter().map(String::as_str).collect();
        let deny = access_terms(index, schema, &deny_tokens)?;
        clauses.push((Occur::MustNot, Box::new(BooleanQuery::union(deny))));
    }

    Ok(Box::new(BooleanQuery::new(clauses)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::{AnalyzerDispatch, register_analyzers};
    use crate::registry::CollectionRegistry;
    use tantivy::TantivyDocument;
    use tantivy::collector::Count;
    use tantivy::query::AllQuery;

    struct Fixture {
        index: Index,
        schema: SubmissionSchema,
    }

    fn fixture() -> Fixture {
        let registry = CollectionRegistry::from_json_str(
            r#"[{"collectionName": "public", "properties": [
                {"name": "accession", "fieldType": "untokenized_string", "jsonPath": ["$.accNo"]}
            ]}]"#,
        )
        .unwrap();
        let dispatch = AnalyzerDispatch::from_registry(&registry);
        let schema = SubmissionSchema::build(&registry, &dispatch);
        let index = Index::create_in_ram(schema.schema.clone());
        register_analyzers(&index, &[]);
        Fixture { index, schema }
    }

    fn add_submission(fixture: &Fixture, accession: &str, access: &[&str], seckey: Option<&str>) {
        let mut writer: tantivy::IndexWriter = fixture.index.writer(15_000_000).unwrap();
        let mut doc = TantivyDocument::default();
        doc.add_text(fixture.schema.accession, accession);
        for token in access {
            doc.add_text(fixture.schema.access, token);
        }
        if let Some(key) = seckey {
            doc.add_text(fixture.schema.seckey, key);
        }
        writer.add_document(doc).unwrap();
        writer.commit().unwrap();
    }

    fn count(fixture: &Fixture, query: &dyn Query) -> usize {
        let reader = fixture.index.reader().unwrap();
        reader.searcher().search(query, &Count).unwrap()
    }

    #[test]
    fn anonymous_sees_only_public() {
        let fixture = fixture();
        add_submission(&fixture, "S-PUB", &["PUBLIC"], None);
        add_submission(&fixture, "S-PRIV", &["TEAM_A"], None);

        let query = apply_security(
            &fixture.index,
            &fixture.schema,
            Box::new(AllQuery),
            &UserContext::anonymous(),
            None,
        )
        .unwrap();
        assert_eq!(count(&fixture, &*query), 1);
    }

    #[test]
    fn allow_token_grants_access() {
        let fixture = fixture();
        add_submission(&fixture, "S-PRIV", &["TEAM_A"], None);

        let user = UserContext::with_allow("alice", vec!["TEAM_A".to_string()]);
        let query = apply_security(
            &fixture.index,
            &fixture.schema,
            Box::new(AllQuery),
            &user,
            None,
        )
        .unwrap();
        assert_eq!(count(&fixture, &*query), 1);
    }

    #[test]
    fn deny_overrides_allow() {
        let fixture = fixture();
        add_submission(&fixture, "S-PRIV", &["TEAM_A"], None);

        let mut user = UserContext::with_allow("alice", vec!["TEAM_A".to_string()]);
        user.deny = vec!["TEAM_A".to_string()];
        let query = apply_security(
            &fixture.index,
            &fixture.schema,
            Box::new(AllQuery),
            &user,
            None,
        )
        .unwrap();
        assert_eq!(count(&fixture, &*query), 0);
    }

    #[test]
    fn super_user_bypasses_security() {
        let fixture = fixture();
        add_submission(&fixture, "S-PRIV", &["TEAM_A"], None);

        let query = apply_security(
            &fixture.index,
            &fixture.schema,
            Box::new(AllQuery),
            &UserContext::super_user("root"),
            None,
        )
        .unwrap();
        assert_eq!(count(&fixture, &*query), 1);
    }

    #[test]
    fn seckey_widens_the_allow_clause() {
        let fixture = fixture();
        add_submission(&fixture, "S-SECRET", &["TEAM_A"], Some("k3y-abc"));

        let without = apply_security(
            &fixture.index,
            &fixture.schema,
            Box::new(AllQuery),
            &UserContext::anonymous(),
            None,
        )
        .unwrap();
        assert_eq!(count(&fixture, &*without), 0);

        let with = apply_security(
            &fixture.index,
            &fixture.schema,
            Box::new(AllQuery),
            &UserContext::anonymous(),
            Some("k3y-abc"),
        )
        .unwrap();
        assert_eq!(count(&fixture, &*with), 1);
    }

    #[test]
    fn access_tokens_are_matched_case_insensitively() {
        let fixture = fixture();
        add_submission(&fixture, "S-PUB", &["public"], None);

        let query = apply_security(
            &fixture.index,
            &fixture.schema,
            Box::new(AllQuery),
            &UserContext::anonymous(),
            None,
        )
        .unwrap();
        assert_eq!(count(&fixture, &*query), 1);
    }
}
