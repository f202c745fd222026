//! Shared text analysis helpers.
//!
//! Tokenization, stopword filtering, salient-token extraction, and a
//! word-level sequence similarity used by reranking, the evaluation triad,
//! and synthetic question validation.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;
use unicode_segmentation::UnicodeSegmentation;

/// English stopwords ignored by content-term matching.
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "been", "but", "by", "can", "could", "did", "do",
    "does", "for", "from", "had", "has", "have", "how", "i", "if", "in", "into", "is", "it",
    "its", "many", "may", "more", "most", "much", "my", "no", "not", "of", "on", "or", "our",
    "shall", "should", "so", "some", "such", "than", "that", "the", "their", "them", "then",
    "there", "these", "they", "this", "those", "to", "up", "was", "we", "were", "what",
    "when", "where", "which", "who", "why", "will", "with", "would", "you", "your",
];

#[allow(clippy::unwrap_used)]
static NUMBER_UNIT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b\d+(?:\.\d+)?\s?(?:ml|mg|mcg|iu|mm|cm|%|weeks?|days?|months?|sessions?)\b")
        .unwrap()
});

/// Whether a lowercased token is a stopword.
#[must_use]
pub fn is_stopword(token: &str) -> bool {
    STOPWORDS.contains(&token)
}

/// Lowercased word tokens of a text (Unicode word boundaries).
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    text.unicode_words().map(str::to_lowercase).collect()
}

/// Lowercased non-stopword tokens of a text.
#[must_use]
pub fn content_terms(text: &str) -> Vec<String> {
    tokenize(text)
        .into_iter()
        .filter(|t| !is_stopword(t))
        .collect()
}

/// Crude plural folding so "sessions" matches "session" and "areas"
/// matches "area".
#[must_use]
pub fn singularize(term: &str) -> String {
    if term.len() > 3 && term.ends_with('s') && !term.ends_with("ss") {
        term[..term.len() - 1].to_string()
    } else {
        term.to_string()
    }
}

/// Extracts salient tokens from a text: capitalized words (product and
/// proper names, sentence-initial words excluded by requiring a non-start
/// position or a second capital), and numeric-plus-unit tokens like "2ml"
/// or "20 mg".
#[must_use]
pub fn salient_tokens(text: &str) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for m in NUMBER_UNIT_RE.find_iter(text) {
        let token = m.as_str().to_lowercase();
        if seen.insert(token.clone()) {
            tokens.push(token);
        }
    }

    let mut sentence_start = true;
    for raw in text.split_whitespace() {
        let word: String = raw
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '®')
            .collect();
        let starts_upper = word.chars().next().is_some_and(char::is_uppercase);
        if starts_upper && !sentence_start && word.chars().count() >= 3 {
            let token = word.trim_end_matches('®').to_lowercase();
            if !is_stopword(&token) && seen.insert(token.clone()) {
                tokens.push(token);
            }
        }
        sentence_start = raw.ends_with('.') || raw.ends_with('!') || raw.ends_with('?')
            || raw.ends_with(':');
    }

    tokens
}

/// Word-level sequence similarity in [0, 1].
///
/// Ratio of shared tokens (multiset intersection) to total tokens,
/// `2·common / (len_a + len_b)`; order-insensitive, deterministic.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn sequence_similarity(a: &str, b: &str) -> f32 {
    let tokens_a = tokenize(a);
    let tokens_b = tokenize(b);
    if tokens_a.is_empty() && tokens_b.is_empty() {
        return 1.0;
    }
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }

    let mut counts: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
    for token in &tokens_a {
        *counts.entry(token.as_str()).or_insert(0) += 1;
    }
    let mut common = 0usize;
    for token in &tokens_b {
        if let Some(count) = counts.get_mut(token.as_str())
            && *count > 0
        {
            *count -= 1;
            common += 1;
        }
    }

    2.0 * common as f32 / (tokens_a.len() + tokens_b.len()) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize() {
        assert_eq!(tokenize("Hello, world!"), vec!["hello", "world"]);
        assert_eq!(tokenize("2ml-dose"), vec!["2ml", "dose"]);
        assert!(tokenize("").is_empty());
    }

    #[test]
    fn test_content_terms_drop_stopwords() {
        let terms = content_terms("What is the dose for Newest?");
        assert_eq!(terms, vec!["dose", "newest"]);
    }

    #[test]
    fn test_salient_tokens_capitalized() {
        let tokens = salient_tokens("The product Newest combines polynucleotides with Plinest technology.");
        assert!(tokens.contains(&"newest".to_string()));
        assert!(tokens.contains(&"plinest".to_string()));
        // Sentence-initial "The" excluded
        assert!(!tokens.contains(&"the".to_string()));
    }

    #[test]
    fn test_salient_tokens_number_units() {
        let tokens = salient_tokens("Inject 2ml per session; repeat with 20 mg weekly.");
        assert!(tokens.contains(&"2ml".to_string()));
        assert!(tokens.contains(&"20 mg".to_string()));
    }

    #[test]
    fn test_salient_tokens_sentence_start_excluded() {
        let tokens = salient_tokens("Newest is great. Products vary.");
        // "Newest" opens the text, "Products" opens a sentence
        assert!(!tokens.contains(&"products".to_string()));
    }

    #[test]
    fn test_salient_tokens_trademark_normalized() {
        let tokens = salient_tokens("Apply the Newest® gel twice.");
        assert!(tokens.contains(&"newest".to_string()));
    }

    #[test]
    fn test_sequence_similarity_identical() {
        assert!((sequence_similarity("how many sessions", "how many sessions") - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_sequence_similarity_disjoint() {
        assert!(sequence_similarity("alpha beta", "gamma delta").abs() < 1e-6);
    }

    #[test]
    fn test_sequence_similarity_partial() {
        let sim = sequence_similarity("how many sessions are needed", "how many sessions required");
        assert!(sim > 0.5 && sim < 1.0);
    }

    #[test]
    fn test_sequence_similarity_empty() {
        assert!((sequence_similarity("", "") - 1.0).abs() < 1e-6);
        assert!(sequence_similarity("words", "").abs() < 1e-6);
    }

    #[test]
    fn test_is_stopword() {
        assert!(is_stopword("the"));
        assert!(!is_stopword("polynucleotide"));
        assert!(!is_stopword("und"));
    }

    #[test]
    fn test_singularize() {
        assert_eq!(singularize("sessions"), "session");
        assert_eq!(singularize("areas"), "area");
        assert_eq!(singularize("gel"), "gel");
        // Short words and double-s endings stay as-is
        assert_eq!(singularize("vs"), "vs");
        assert_eq!(singularize("loss"), "loss");
    }
}
