//! JSONPath evaluation boundary
//!
//! The engine depends on exactly two operations: "does this path compile"
//! and "given a compiled path and a JSON node, return an ordered set of
//! string values". Everything else about JSONPath stays behind this module.

use indexmap::IndexSet;
use jsonpath_rust::JsonPath;
use jsonpath_rust::parser::parse_json_path;
use serde_json::Value;

/// Check that a JSONPath expression compiles.
///
/// # Errors
///
/// Returns the parser's message when the expression is malformed.
pub fn compile(path: &str) -> Result<(), String> {
    parse_json_path(path).map(|_| ()).map_err(|e| e.to_string())
}

/// Evaluate one path against a document, returning matched nodes in order.
/// Malformed paths evaluate to no matches (validation happens at registry
/// load, not here).
#[must_use]
pub fn evaluate<'a>(doc: &'a Value, path: &str) -> Vec<&'a Value> {
    doc.query(path).unwrap_or_default()
}

/// Evaluate several OR-combined paths, flattening matched arrays one level
/// and collecting trimmed, non-empty, deduplicated string values in
/// encounter order.
#[must_use]
pub fn evaluate_strings(doc: &Value, paths: &[String]) -> Vec<String> {
    let mut out: IndexSet<String> = IndexSet::new();
    for path in paths {
        for node in evaluate(doc, path) {
            match node {
                Value::Array(items) => {
                    for item in items {
                        push_scalar(&mut out, item);
                    }
                }
                other => push_scalar(&mut out, other),
            }
        }
    }
    out.into_iter().collect()
}

fn push_scalar(out: &mut IndexSet<String>, node: &Value) {
    let text = match node {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null | Value::Array(_) | Value::Object(_) => return,
    };
    if !text.is_empty() {
        out.insert(text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn compile_accepts_valid_paths() {
        assert!(compile("$.accNo").is_ok());
        assert!(compile("$.section.attributes[*].value").is_ok());
    }

    #[test]
    fn compile_rejects_garbage() {
        assert!(compile("$[").is_err());
    }

    #[test]
    fn evaluate_strings_flattens_and_dedupes() {
        let doc = json!({
            "a": "x",
            "b": ["y", "x", ""],
            "c": {"d": "z"}
        });
        let paths = vec!["$.a".to_string(), "$.b".to_string(), "$.c.d".to_string()];
        assert_eq!(evaluate_strings(&doc, &paths), vec!["x", "y", "z"]);
    }

    #[test]
    fn evaluate_strings_trims_and_skips_empty() {
        let doc = json!({"a": "  padded  ", "b": "   "});
        let paths = vec!["$.a".to_string(), "$.b".to_string()];
        assert_eq!(evaluate_strings(&doc, &paths), vec!["padded"]);
    }

    #[test]
    fn evaluate_strings_stringifies_numbers_and_bools() {
        let doc = json!({"n": 42, "f": true});
        let paths = vec!["$.n".to_string(), "$.f".to_string()];
        assert_eq!(evaluate_strings(&doc, &paths), vec!["42", "true"]);
    }

    #[test]
    fn missing_path_yields_nothing() {
        let doc = json!({"a": 1});
        assert!(evaluate_strings(&doc, &["$.nope".to_string()]).is_empty());
    }
}
