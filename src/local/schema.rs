//! Tantivy schema and analyzers for comment documents
//!
//! One schema per site index: the comment body under a selectable language
//! analyzer, permalink and username as lowercased keywords, the timestamp
//! as a fast field so pages can be sorted by it.

use tantivy::schema::{
    DateOptions, Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, STORED, STRING,
};
use tantivy::tokenizer::{
    Language, LowerCaser, RawTokenizer, SimpleTokenizer, Stemmer, TextAnalyzer, TokenizerManager,
};

use crate::config::Analyzer;

pub(crate) const ID_FIELD: &str = "id";
pub(crate) const URL_FIELD: &str = "url";
pub(crate) const USERNAME_FIELD: &str = "username";
pub(crate) const TEXT_FIELD: &str = "text";
pub(crate) const TIMESTAMP_FIELD: &str = "timestamp";

/// Single-token tokenizer + lowercase filter, for exact-match fields
const KEYWORD_LOWER_TOKENIZER: &str = "keyword_lower";

const TEXT_STANDARD_TOKENIZER: &str = "comment_text_standard";
const TEXT_ENGLISH_TOKENIZER: &str = "comment_text_english";
const TEXT_RUSSIAN_TOKENIZER: &str = "comment_text_russian";

/// Comment document schema with direct field handles.
#[derive(Debug, Clone)]
pub(crate) struct CommentSchema {
    pub schema: Schema,
    pub id: Field,
    pub url: Field,
    pub username: Field,
    pub text: Field,
    pub timestamp: Field,
}

fn text_tokenizer_name(analyzer: Analyzer) -> &'static str {
    match analyzer {
        Analyzer::Standard => TEXT_STANDARD_TOKENIZER,
        Analyzer::English => TEXT_ENGLISH_TOKENIZER,
        Analyzer::Russian => TEXT_RUSSIAN_TOKENIZER,
    }
}

/// Build the comment schema for the selected text analyzer.
///
/// The body is stored alongside its postings: match offsets for
/// highlighting are recomputed from the stored text at query time.
pub(crate) fn build(analyzer: Analyzer) -> CommentSchema {
    let mut builder = Schema::builder();

    let id = builder.add_text_field(ID_FIELD, STRING | STORED);

    let keyword_options = TextOptions::default().set_stored().set_indexing_options(
        TextFieldIndexing::default()
            .set_tokenizer(KEYWORD_LOWER_TOKENIZER)
            .set_index_option(IndexRecordOption::Basic),
    );
    let url = builder.add_text_field(URL_FIELD, keyword_options.clone());
    let username = builder.add_text_field(USERNAME_FIELD, keyword_options);

    let text_options = TextOptions::default().set_stored().set_indexing_options(
        TextFieldIndexing::default()
            .set_tokenizer(text_tokenizer_name(analyzer))
            .set_index_option(IndexRecordOption::WithFreqsAndPositions),
    );
    let text = builder.add_text_field(TEXT_FIELD, text_options);

    let timestamp = builder.add_date_field(
        TIMESTAMP_FIELD,
        DateOptions::default().set_stored().set_indexed().set_fast(),
    );

    CommentSchema {
        schema: builder.build(),
        id,
        url,
        username,
        text,
        timestamp,
    }
}

/// Register every analyzer the schema may reference.
///
/// All three text analyzers are registered regardless of configuration so
/// an existing index created under a different analyzer still opens.
pub(crate) fn register_tokenizers(manager: &TokenizerManager) {
    let keyword_lower = TextAnalyzer::builder(RawTokenizer::default())
        .filter(LowerCaser)
        .build();
    manager.register(KEYWORD_LOWER_TOKENIZER, keyword_lower);

    let standard = TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(LowerCaser)
        .build();
    manager.register(TEXT_STANDARD_TOKENIZER, standard);

    let english = TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(LowerCaser)
        .filter(Stemmer::new(Language::English))
        .build();
    manager.register(TEXT_ENGLISH_TOKENIZER, english);

    let russian = TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(LowerCaser)
        .filter(Stemmer::new(Language::Russian))
        .build();
    manager.register(TEXT_RUSSIAN_TOKENIZER, russian);
}
