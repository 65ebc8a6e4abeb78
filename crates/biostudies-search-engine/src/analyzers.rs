//! Analyzer catalog and per-field dispatch
//!
//! A fixed set of four analyzers shared by all indices:
//! - `Attribute` (default) — letter/digit tokens, ASCII folding, lowercase,
//!   stop words
//! - `Access` — like `Attribute` but keeps `@ . ~ # - _` inside tokens, so
//!   access tags and e-mail-shaped grants survive tokenization
//! - `Lowercase` — letter-only tokens, lowercased, no stop words
//! - `ExperimentText` — alphanumeric tokens, lowercased, no stop words
//!
//! Analyzers are registered once per index right after open; the dispatch
//! table is immutable afterwards.

use std::collections::HashMap;
use std::str::CharIndices;

use tantivy::Index;
use tantivy::tokenizer::{
    AsciiFoldingFilter, LowerCaser, RemoveLongFilter, StopWordFilter, TextAnalyzer, Token,
    TokenStream, Tokenizer,
};

use crate::registry::CollectionRegistry;

/// Tokens longer than this are dropped outright.
const MAX_TOKEN_BYTES: usize = 256;

// ── Analyzer enum ────────────────────────────────────────────────────────────

/// The fixed analyzer set. Registry properties may name one; fields without
/// an explicit analyzer use [`AnalyzerKind::Attribute`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnalyzerKind {
    Attribute,
    Access,
    Lowercase,
    ExperimentText,
}

impl AnalyzerKind {
    pub const ALL: [Self; 4] = [
        Self::Attribute,
        Self::Access,
        Self::Lowercase,
        Self::ExperimentText,
    ];

    /// Parse a registry analyzer name. Accepts both the short form
    /// (`attribute`) and the legacy class-name form
    /// (`AttributeFieldAnalyzer`), case-insensitively.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "attribute" | "attributefieldanalyzer" => Some(Self::Attribute),
            "access" | "accessfieldanalyzer" => Some(Self::Access),
            "lowercase" | "lowercaseanalyzer" => Some(Self::Lowercase),
            "experiment_text" | "experimenttext" | "experimenttextanalyzer" => {
                Some(Self::ExperimentText)
            }
            _ => None,
        }
    }

    /// Name under which the analyzer is registered with every index.
    #[must_use]
    pub const fn tokenizer_name(self) -> &'static str {
        match self {
            Self::Attribute => "attribute_field",
            Self::Access => "access_field",
            Self::Lowercase => "lowercase_field",
            Self::ExperimentText => "experiment_text",
        }
    }
}

// ── Character-class tokenizer ────────────────────────────────────────────────

type KeepFn = fn(char) -> bool;

fn keep_alnum(c: char) -> bool {
    c.is_alphanumeric()
}

fn keep_access(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '@' | '.' | '~' | '#' | '-' | '_')
}

fn keep_letters(c: char) -> bool {
    c.is_alphabetic()
}

/// Tokenizer emitting maximal runs of characters satisfying a predicate.
#[derive(Clone)]
pub struct CharGroupTokenizer {
    keep: KeepFn,
    token: Token,
}

impl CharGroupTokenizer {
    fn new(keep: KeepFn) -> Self {
        Self {
            keep,
            token: Token::default(),
        }
    }
}

pub struct CharGroupTokenStream<'a> {
    text: &'a str,
    chars: CharIndices<'a>,
    keep: KeepFn,
    token: &'a mut Token,
}

impl Tokenizer for CharGroupTokenizer {
    type TokenStream<'a> = CharGroupTokenStream<'a>;

    fn token_stream<'a>(&'a mut self, text: &'a str) -> CharGroupTokenStream<'a> {
        self.token = Token::default();
        CharGroupTokenStream {
            text,
            chars: text.char_indices(),
            keep: self.keep,
            token: &mut self.token,
        }
    }
}

impl CharGroupTokenStream<'_> {
    fn search_token_end(&mut self) -> usize {
        let keep = self.keep;
        (&mut self.chars)
            .filter(|(_, c)| !keep(*c))
            .map(|(offset, _)| offset)
            .next()
            .unwrap_or(self.text.len())
    }
}

impl TokenStream for CharGroupTokenStream<'_> {
    fn advance(&mut self) -> bool {
        self.token.text.clear();
        self.token.position = self.token.position.wrapping_add(1);
        while let Some((offset_from, c)) = self.chars.next() {
            if (self.keep)(c) {
                let offset_to = self.search_token_end();
                self.token.offset_from = offset_from;
                self.token.offset_to = offset_to;
                self.token.text.push_str(&self.text[offset_from..offset_to]);
                return true;
            }
        }
        false
    }

    fn token(&self) -> &Token {
        self.token
    }

    fn token_mut(&mut self) -> &mut Token {
        self.token
    }
}

// ── Registration ─────────────────────────────────────────────────────────────

/// Register all four analyzers with an index.
///
/// Must be called after `Index::create_in_dir` / `Index::open_in_dir` but
/// before any indexing or searching against fields that reference them.
pub fn register_analyzers(index: &Index, stopwords: &[String]) {
    let stop: Vec<String> = stopwords.iter().map(|w| w.to_lowercase()).collect();

    let attribute = TextAnalyzer::builder(CharGroupTokenizer::new(keep_alnum))
        .filter(RemoveLongFilter::limit(MAX_TOKEN_BYTES))
        .filter(AsciiFoldingFilter)
        .filter(LowerCaser)
        .filter(StopWordFilter::remove(stop.clone()))
        .build();
    index
        .tokenizers()
        .register(AnalyzerKind::Attribute.tokenizer_name(), attribute);

    let access = TextAnalyzer::builder(CharGroupTokenizer::new(keep_access))
        .filter(RemoveLongFilter::limit(MAX_TOKEN_BYTES))
        .filter(AsciiFoldingFilter)
        .filter(LowerCaser)
        .filter(StopWordFilter::remove(stop))
        .build();
    index
        .tokenizers()
        .register(AnalyzerKind::Access.tokenizer_name(), access);

    let lowercase = TextAnalyzer::builder(CharGroupTokenizer::new(keep_letters))
        .filter(LowerCaser)
        .build();
    index
        .tokenizers()
        .register(AnalyzerKind::Lowercase.tokenizer_name(), lowercase);

    let experiment_text = TextAnalyzer::builder(CharGroupTokenizer::new(keep_alnum))
        .filter(RemoveLongFilter::limit(MAX_TOKEN_BYTES))
        .filter(LowerCaser)
        .build();
    index
        .tokenizers()
        .register(AnalyzerKind::ExperimentText.tokenizer_name(), experiment_text);
}

/// Run a registered analyzer over a text, returning its token strings.
#[must_use]
pub fn analyze(index: &Index, tokenizer_name: &str, text: &str) -> Vec<String> {
    let Some(mut analyzer) = index.tokenizers().get(tokenizer_name) else {
        return Vec::new();
    };
    let mut stream = analyzer.token_stream(text);
    let mut tokens = Vec::new();
    while stream.advance() {
        tokens.push(stream.token().text.clone());
    }
    tokens
}

// ── Per-field dispatch ───────────────────────────────────────────────────────

/// Maps registry field names to analyzers; unmapped fields fall back to the
/// default [`AnalyzerKind::Attribute`].
#[derive(Debug, Clone, Default)]
pub struct AnalyzerDispatch {
    by_field: HashMap<String, AnalyzerKind>,
}

impl AnalyzerDispatch {
    /// Build the dispatch table from registry property declarations.
    #[must_use]
    pub fn from_registry(registry: &CollectionRegistry) -> Self {
        let by_field = registry
            .global_properties()
            .filter_map(|p| p.analyzer.map(|a| (p.name.clone(), a)))
            .collect();
        Self { by_field }
    }

    /// Analyzer for a field, falling back to the default.
    #[must_use]
    pub fn kind_for(&self, field: &str) -> AnalyzerKind {
        self.by_field
            .get(field)
            .copied()
            .unwrap_or(AnalyzerKind::Attribute)
    }

    /// Registered tokenizer name for a field.
    #[must_use]
    pub fn tokenizer_for(&self, field: &str) -> &'static str {
        self.kind_for(field).tokenizer_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tantivy::schema::Schema;

    fn test_index(stopwords: &[&str]) -> Index {
        let index = Index::create_in_ram(Schema::builder().build());
        let stop: Vec<String> = stopwords.iter().map(ToString::to_string).collect();
        register_analyzers(&index, &stop);
        index
    }

    #[test]
    fn attribute_splits_folds_and_lowercases() {
        let index = test_index(&["the", "of"]);
        let tokens = analyze(&index, "attribute_field", "Cancer of the Lung-Études");
        assert_eq!(tokens, vec!["cancer", "lung", "etudes"]);
    }

    #[test]
    fn access_preserves_grant_characters() {
        let index = test_index(&[]);
        let tokens = analyze(&index, "access_field", "alice@ebi.ac.uk TEAM-A_1~x #tag");
        assert_eq!(tokens, vec!["alice@ebi.ac.uk", "team-a_1~x", "#tag"]);
    }

    #[test]
    fn lowercase_keeps_letters_only() {
        let index = test_index(&[]);
        let tokens = analyze(&index, "lowercase_field", "ABC-123 Def");
        assert_eq!(tokens, vec!["abc", "def"]);
    }

    #[test]
    fn experiment_text_keeps_digits_without_stopwords() {
        let index = test_index(&["the"]);
        let tokens = analyze(&index, "experiment_text", "The 3 Mice");
        assert_eq!(tokens, vec!["the", "3", "mice"]);
    }

    #[test]
    fn stop_words_are_removed_after_folding() {
        let index = test_index(&["und"]);
        let tokens = analyze(&index, "attribute_field", "Katzen und Hunde");
        assert_eq!(tokens, vec!["katzen", "hunde"]);
    }

    #[test]
    fn parse_accepts_short_and_class_names() {
        assert_eq!(AnalyzerKind::parse("access"), Some(AnalyzerKind::Access));
        assert_eq!(
            AnalyzerKind::parse("AccessFieldAnalyzer"),
            Some(AnalyzerKind::Access)
        );
        assert_eq!(
            AnalyzerKind::parse("ExperimentTextAnalyzer"),
            Some(AnalyzerKind::ExperimentText)
        );
        assert_eq!(AnalyzerKind::parse("nope"), None);
    }

    #[test]
    fn dispatch_falls_back_to_attribute() {
        let dispatch = AnalyzerDispatch::default();
        assert_eq!(dispatch.kind_for("anything"), AnalyzerKind::Attribute);
        assert_eq!(dispatch.tokenizer_for("anything"), "attribute_field");
    }

    #[test]
    fn unmapped_field_tokens_match_default_analyzer() {
        let index = test_index(&[]);
        let dispatch = AnalyzerDispatch::default();
        let via_dispatch = analyze(&index, dispatch.tokenizer_for("unmapped"), "Alpha Beta-1");
        let via_default = analyze(
            &index,
            AnalyzerKind::Attribute.tokenizer_name(),
            "Alpha Beta-1",
        );
        assert_eq!(via_dispatch, via_default);
    }

    #[test]
    fn long_tokens_are_dropped() {
        let index = test_index(&[]);
        let long = "a".repeat(300);
        let tokens = analyze(&index, "attribute_field", &format!("short {long}"));
        assert_eq!(tokens, vec!["short"]);
    }
}
