//! Match-offset extraction for highlighting
//!
//! Tantivy keeps no per-document term vectors, so match locations are
//! recomputed at query time: the stored body is run back through the text
//! field's analyzer and every token that appears in the query's term set
//! yields its byte offsets. Query terms and token text have passed the same
//! analyzer chain, so they compare equal directly.

use std::collections::HashSet;

use tantivy::query::Query;
use tantivy::schema::Field;
use tantivy::tokenizer::TextAnalyzer;
use tantivy::Term;

use crate::types::TokenMatch;

/// Collect the query's analyzed terms targeting `field`.
pub(crate) fn query_terms(query: &dyn Query, field: Field) -> HashSet<String> {
    let mut terms = HashSet::new();
    query.query_terms(&mut |term: &Term, _need_positions: bool| {
        if term.field() == field {
            if let Some(text) = term.value().as_str() {
                terms.insert(text.to_string());
            }
        }
    });
    terms
}

/// Byte offsets of every token of `text` present in `terms`, in text order.
pub(crate) fn token_matches(
    analyzer: &mut TextAnalyzer,
    text: &str,
    terms: &HashSet<String>,
) -> Vec<TokenMatch> {
    if terms.is_empty() || text.is_empty() {
        return Vec::new();
    }
    let mut matches = Vec::new();
    let mut stream = analyzer.token_stream(text);
    while let Some(token) = stream.next() {
        if terms.contains(&token.text) {
            matches.push(TokenMatch {
                start: token.offset_from,
                end: token.offset_to,
            });
        }
    }
    matches
}
