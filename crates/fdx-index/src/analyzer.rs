//! Text analysis pipeline for the fdx index.
//!
//! Names, relative directories and file content all pass through the same
//! three-stage pipeline:
//! 1. `SimpleTokenizer` - splits on anything that is not alphanumeric
//! 2. `LowerCaser` - case-folds tokens
//! 3. `RemoveLongFilter` - drops tokens longer than 40 bytes
//!
//! There is no stemming: file names and identifiers are matched as written.

use std::ops::Range;

use tantivy::tokenizer::{LowerCaser, RemoveLongFilter, SimpleTokenizer, TextAnalyzer};

/// Name of the custom tokenizer registered with Tantivy.
pub const FDX_TOKENIZER: &str = "fdx_text";

/// Maximum token length in bytes before filtering.
const MAX_TOKEN_LENGTH: usize = 40;

/// Builds the fdx text analyzer.
pub fn build_analyzer() -> TextAnalyzer {
    TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(LowerCaser)
        .filter(RemoveLongFilter::limit(MAX_TOKEN_LENGTH))
        .build()
}

/// Tokenizes text into case-folded tokens, in order of occurrence.
pub fn tokenize(analyzer: &TextAnalyzer, text: &str) -> Vec<String> {
    token_spans(analyzer, text)
        .into_iter()
        .map(|(token, _)| token)
        .collect()
}

/// Tokenizes text, keeping the byte span of each token in the original text.
pub fn token_spans(analyzer: &TextAnalyzer, text: &str) -> Vec<(String, Range<usize>)> {
    let mut analyzer = analyzer.clone();
    let mut stream = analyzer.token_stream(text);
    let mut tokens = Vec::new();
    while let Some(token) = stream.next() {
        tokens.push((token.text.clone(), token.offset_from..token.offset_to));
    }
    tokens
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn analyzer_lowercases() {
        let analyzer = build_analyzer();
        assert_eq!(tokenize(&analyzer, "HELLO World"), vec!["hello", "world"]);
    }

    #[test]
    fn splits_on_path_punctuation() {
        let analyzer = build_analyzer();
        assert_eq!(
            tokenize(&analyzer, "src/cli/my_file-v2.rs"),
            vec!["src", "cli", "my", "file", "v2", "rs"]
        );
    }

    #[test]
    fn does_not_stem() {
        let analyzer = build_analyzer();
        assert_eq!(tokenize(&analyzer, "running"), vec!["running"]);
    }

    #[test]
    fn removes_long_tokens() {
        let analyzer = build_analyzer();
        let long = "a".repeat(41);
        let text = format!("short {long} end");
        assert_eq!(tokenize(&analyzer, &text), vec!["short", "end"]);
    }

    #[test]
    fn spans_point_into_original_text() {
        let analyzer = build_analyzer();
        let text = "Report_FINAL.txt";
        let spans = token_spans(&analyzer, text);
        assert_eq!(spans[1].0, "final");
        assert_eq!(&text[spans[1].1.clone()], "FINAL");
    }
}
