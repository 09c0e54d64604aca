//! Full-text analysis and scoring
//!
//! Tokenization (case folding, word splitting, optional stop-word removal,
//! optional light suffix stemming) used identically at index and query time,
//! plus a BM25 variant computed entirely from posting data: every posting
//! stores the term frequency and the document token count, so scoring needs
//! no second pass over the documents.

use crate::core::index::catalog::FullTextOptions;
use std::collections::HashMap;

/// BM25 term-frequency saturation.
pub const BM25_K1: f64 = 1.2;
/// BM25 length-normalization strength.
pub const BM25_B: f64 = 0.75;

const STOPWORDS_EN: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "from", "has", "have", "he",
    "her", "his", "i", "if", "in", "into", "is", "it", "its", "no", "not", "of", "on", "or",
    "she", "so", "such", "that", "the", "their", "then", "there", "these", "they", "this", "to",
    "was", "we", "were", "will", "with", "you",
];

/// Split, fold, and filter a text into index terms.
#[must_use]
pub fn tokenize(text: &str, options: &FullTextOptions) -> Vec<String> {
    let use_stopwords = options.remove_stopwords && options.language.starts_with("en");
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .filter(|w| !use_stopwords || !STOPWORDS_EN.contains(&w.as_str()))
        .map(|w| if options.stem { stem(&w) } else { w })
        .collect()
}

/// Token counts of one document plus its total length.
#[must_use]
pub fn term_frequencies(tokens: &[String]) -> HashMap<String, u32> {
    let mut tf = HashMap::new();
    for token in tokens {
        *tf.entry(token.clone()).or_insert(0u32) += 1;
    }
    tf
}

/// Light English suffix stemmer: plural and participle endings only.
/// Deliberately conservative so index and query terms agree; this is not a
/// full Porter stemmer.
#[must_use]
pub fn stem(word: &str) -> String {
    let w = word;
    if let Some(base) = w.strip_suffix("sses") {
        return format!("{base}ss");
    }
    if let Some(base) = w.strip_suffix("ies") {
        if base.len() >= 2 {
            return format!("{base}y");
        }
    }
    if w.ends_with('s') && !w.ends_with("ss") && w.len() > 3 {
        return w[..w.len() - 1].to_string();
    }
    if let Some(base) = w.strip_suffix("ing") {
        if base.len() >= 3 {
            return base.to_string();
        }
    }
    if let Some(base) = w.strip_suffix("ed") {
        if base.len() >= 3 {
            return base.to_string();
        }
    }
    w.to_string()
}

/// BM25 contribution of one term in one document.
///
/// `tf`: term frequency in the document; `doc_len`: document token count;
/// `avg_doc_len`: mean token count over the candidate set; `n_docs`: number
/// of documents in the table; `doc_freq`: documents containing the term.
#[must_use]
pub fn bm25_score(tf: u32, doc_len: u32, avg_doc_len: f64, n_docs: usize, doc_freq: usize) -> f64 {
    if tf == 0 || doc_freq == 0 {
        return 0.0;
    }
    let n = n_docs.max(doc_freq) as f64;
    let df = doc_freq as f64;
    // Plus-one form keeps the idf positive even for very common terms.
    let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();

    let tf = f64::from(tf);
    let dl = f64::from(doc_len);
    let avgdl = if avg_doc_len > 0.0 { avg_doc_len } else { 1.0 };
    let norm = BM25_K1 * (1.0 - BM25_B + BM25_B * dl / avgdl);
    idf * (tf * (BM25_K1 + 1.0)) / (tf + norm)
}

/// Posting payload: term frequency and document length, 8 bytes LE.
#[must_use]
pub fn encode_posting(tf: u32, doc_len: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(8);
    out.extend_from_slice(&tf.to_le_bytes());
    out.extend_from_slice(&doc_len.to_le_bytes());
    out
}

/// Decode a posting payload; `None` for foreign/corrupt values.
#[must_use]
pub fn decode_posting(bytes: &[u8]) -> Option<(u32, u32)> {
    if bytes.len() != 8 {
        return None;
    }
    let tf = u32::from_le_bytes(bytes[0..4].try_into().ok()?);
    let doc_len = u32::from_le_bytes(bytes[4..8].try_into().ok()?);
    Some((tf, doc_len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn opts(stopwords: bool, stem: bool) -> FullTextOptions {
        FullTextOptions { language: "en".to_string(), remove_stopwords: stopwords, stem }
    }

    #[test]
    fn test_tokenize_folds_and_splits() {
        let tokens = tokenize("Hello, World! hello-world 42", &opts(false, false));
        assert_eq!(tokens, vec!["hello", "world", "hello", "world", "42"]);
    }

    #[test]
    fn test_tokenize_removes_stopwords() {
        let tokens = tokenize("the quick fox and the dog", &opts(true, false));
        assert_eq!(tokens, vec!["quick", "fox", "dog"]);
    }

    #[test]
    fn test_stopwords_only_for_english() {
        let mut options = opts(true, false);
        options.language = "de".to_string();
        let tokens = tokenize("the quick fox", &options);
        assert_eq!(tokens, vec!["the", "quick", "fox"]);
    }

    #[test]
    fn test_stemmer() {
        assert_eq!(stem("classes"), "class");
        assert_eq!(stem("stories"), "story");
        assert_eq!(stem("databases"), "database");
        assert_eq!(stem("running"), "runn");
        assert_eq!(stem("indexed"), "index");
        assert_eq!(stem("miss"), "miss");
        assert_eq!(stem("bus"), "bus");
    }

    #[test]
    fn test_index_and_query_tokens_agree() {
        let options = opts(true, true);
        let indexed = tokenize("Databases are indexing documents", &options);
        let queried = tokenize("database indexing document", &options);
        for term in &queried {
            assert!(indexed.contains(term), "query term {term} missing from index terms");
        }
    }

    #[test]
    fn test_term_frequencies() {
        let tokens = tokenize("red red blue", &opts(false, false));
        let tf = term_frequencies(&tokens);
        assert_eq!(tf["red"], 2);
        assert_eq!(tf["blue"], 1);
    }

    #[test]
    fn test_bm25_prefers_higher_tf() {
        let low = bm25_score(1, 100, 100.0, 1000, 10);
        let high = bm25_score(5, 100, 100.0, 1000, 10);
        assert!(high > low);
    }

    #[test]
    fn test_bm25_prefers_rare_terms() {
        let common = bm25_score(2, 100, 100.0, 1000, 900);
        let rare = bm25_score(2, 100, 100.0, 1000, 3);
        assert!(rare > common);
    }

    #[test]
    fn test_bm25_penalizes_long_docs() {
        let short = bm25_score(2, 50, 100.0, 1000, 10);
        let long = bm25_score(2, 400, 100.0, 1000, 10);
        assert!(short > long);
    }

    #[test]
    fn test_bm25_never_negative() {
        // df close to n would turn a classic idf negative.
        let score = bm25_score(1, 10, 10.0, 10, 10);
        assert!(score > 0.0);
    }

    #[test]
    fn test_bm25_zero_tf_is_zero() {
        assert_relative_eq!(bm25_score(0, 10, 10.0, 100, 5), 0.0);
    }

    #[test]
    fn test_posting_round_trip() {
        let bytes = encode_posting(3, 128);
        assert_eq!(decode_posting(&bytes), Some((3, 128)));
        assert_eq!(decode_posting(b"short"), None);
    }
}
