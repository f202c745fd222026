//! Abbreviation-aware sentence segmentation.
//!
//! Clinical text is dense with constructs that defeat naive splitting on
//! periods: honorifics (Dr., Mr.), Latin abbreviations (e.g., i.e., etc.),
//! dose units written with a trailing period (mg., ml., mcg.) and product
//! names carrying a trademark sigil ("Newest®."). The splitter treats none
//! of those as sentence ends.

use std::ops::Range;

/// Tokens that do not end a sentence when followed by a period.
///
/// Compared lowercased, without the trailing period.
const ABBREVIATIONS: &[&str] = &[
    // Honorifics
    "dr", "mr", "mrs", "ms", "prof", "st",
    // Latin
    "e.g", "i.e", "etc", "vs", "al", "cf", "ca",
    // Reference shorthand
    "fig", "no", "approx",
    // Dose units
    "mg", "ml", "mcg", "cm", "mm", "iu",
];

/// Splits text into sentence spans.
///
/// The returned byte ranges are contiguous and cover the whole input:
/// terminators and the whitespace that follows them belong to the
/// preceding span. Newlines always end a span so headings and list items
/// stay separate from running prose.
#[must_use]
pub fn sentence_spans(text: &str) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut start = 0;
    let bytes = text.as_bytes();
    let mut iter = text.char_indices().peekable();

    while let Some((i, c)) = iter.next() {
        let is_terminator = matches!(c, '.' | '!' | '?');
        let is_newline = c == '\n';
        if !is_terminator && !is_newline {
            continue;
        }

        if is_terminator {
            // Next char must be whitespace or end-of-text for a boundary
            let next = iter.peek().map(|&(_, n)| n);
            let followed_by_space = next.is_none_or(char::is_whitespace);
            if !followed_by_space || is_abbreviation_before(text, i) {
                continue;
            }
        }

        // Attach trailing whitespace (but not past the next newline run)
        let mut end = i + c.len_utf8();
        while end < bytes.len() && (bytes[end] == b' ' || bytes[end] == b'\t') {
            end += 1;
        }
        if end < bytes.len() && bytes[end] == b'\n' && !is_newline {
            end += 1;
        }

        if end > start {
            spans.push(start..end);
            start = end;
        }
        // Skip chars consumed as trailing whitespace
        while let Some(&(j, _)) = iter.peek() {
            if j < end {
                iter.next();
            } else {
                break;
            }
        }
    }

    if start < text.len() {
        spans.push(start..text.len());
    }
    spans
}

/// Whether the token ending at byte `period_pos` (exclusive) is an
/// abbreviation, an initial, or a trademark-suffixed product name.
fn is_abbreviation_before(text: &str, period_pos: usize) -> bool {
    let head = &text[..period_pos];
    let token_start = head
        .char_indices()
        .rev()
        .take_while(|&(_, c)| c.is_alphanumeric() || c == '.' || c == '®' || c == '™')
        .last()
        .map_or(period_pos, |(i, _)| i);
    let token = head[token_start..].trim_matches('.');

    if token.is_empty() {
        return false;
    }
    if token.ends_with('®') || token.ends_with('™') {
        return true;
    }
    // Single-letter initials ("J. Smith")
    if token.chars().count() == 1 && token.chars().all(char::is_alphabetic) {
        return true;
    }
    let lowered = token.to_lowercase();
    ABBREVIATIONS.contains(&lowered.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sentences(text: &str) -> Vec<&str> {
        sentence_spans(text).into_iter().map(|r| &text[r]).collect()
    }

    #[test]
    fn test_basic_split() {
        let s = sentences("First sentence. Second sentence. Third.");
        assert_eq!(s.len(), 3);
        assert_eq!(s[0], "First sentence. ");
        assert_eq!(s[2], "Third.");
    }

    #[test]
    fn test_spans_cover_text() {
        let text = "One. Two!\nThree? Dr. Smith treated the patient.";
        let joined: String = sentences(text).concat();
        assert_eq!(joined, text);
    }

    #[test]
    fn test_honorific_does_not_split() {
        let s = sentences("Dr. Smith treated the area. Results were good.");
        assert_eq!(s.len(), 2);
        assert!(s[0].starts_with("Dr. Smith"));
    }

    #[test]
    fn test_latin_abbreviations() {
        let s = sentences("Use on thin skin, e.g. the periocular area. Avoid lips.");
        assert_eq!(s.len(), 2);
        let s = sentences("Deep wrinkles, i.e. static lines, respond slowly. Fine lines do not.");
        assert_eq!(s.len(), 2);
        let s = sentences("Cheeks, chin, etc. are suitable. The neck is too.");
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn test_dose_units_do_not_split() {
        let s = sentences("Inject 2 ml. per session into the dermis. Repeat monthly.");
        assert_eq!(s.len(), 2);
        let s = sentences("The dose is 20 mg. daily for adults. Reduce for elderly patients.");
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn test_trademark_sigil_does_not_split() {
        let s = sentences("The treatment uses Newest®. gel for facial areas. It is well tolerated.");
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn test_single_initial_does_not_split() {
        let s = sentences("Reported by J. Smith in 2021. Confirmed later.");
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn test_newline_ends_span() {
        let s = sentences("Indications\nFacial rejuvenation. Neck treatment.");
        assert_eq!(s[0], "Indications\n");
        assert_eq!(s.len(), 3);
    }

    #[test]
    fn test_question_and_exclamation() {
        let s = sentences("Is it safe? Yes! Entirely.");
        assert_eq!(s.len(), 3);
    }

    #[test]
    fn test_empty_text() {
        assert!(sentence_spans("").is_empty());
    }

    #[test]
    fn test_no_terminator() {
        let s = sentences("a fragment without punctuation");
        assert_eq!(s, vec!["a fragment without punctuation"]);
    }

    #[test]
    fn test_period_without_space_not_boundary() {
        // Version-like token: "2.5" must not split
        let s = sentences("Apply 2.5 ml of gel per session. Repeat as needed.");
        assert_eq!(s.len(), 2);
    }
}
