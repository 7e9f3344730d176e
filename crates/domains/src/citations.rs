//! Citation extraction
//!
//! A post cites another by quoting its number after a `>>` marker. Bodies are
//! escaped once at intake and stored in that form, so the marker as matched
//! is `&gt;&gt;`.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{Citation, PostId};

static CITATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&gt;&gt;[ \t]*(\d+)").expect("invalid citation regex"));

/// Escapes a raw body for storage and rendering. Entities the poster typed
/// are escaped like any other text, so a literal `&gt;&gt;5` never reads as
/// a citation.
pub fn escape_body(body: &str) -> String {
    html_escape::encode_safe(body).into_owned()
}

/// Extracts the posts cited by `post_id`'s escaped body, in order of first
/// mention.
///
/// Cited IDs are not checked for existence; a dangling citation simply never
/// produces a back-link.
pub fn extract_citations(board_id: &str, post_id: PostId, body: &str) -> Vec<Citation> {
    let mut citations: Vec<Citation> = Vec::new();

    for caps in CITATION_RE.captures_iter(body) {
        let Ok(cites) = caps[1].parse::<PostId>() else {
            continue;
        };
        if citations.iter().any(|c| c.cites == cites) {
            continue;
        }
        citations.push(Citation {
            board_id: board_id.to_owned(),
            post_id,
            cites,
        });
    }

    citations
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cited(raw: &str) -> Vec<PostId> {
        extract_citations("b", 100, &escape_body(raw))
            .into_iter()
            .map(|c| c.cites)
            .collect()
    }

    #[test]
    fn escaped_markers_with_space() {
        let citations = extract_citations("b", 9, "see &gt;&gt; 42 and &gt;&gt; 7");
        assert_eq!(
            citations,
            vec![
                Citation { board_id: "b".into(), post_id: 9, cites: 42 },
                Citation { board_id: "b".into(), post_id: 9, cites: 7 },
            ]
        );
    }

    #[test]
    fn raw_markers_match_once_escaped() {
        assert_eq!(cited(">>3\n>>15 agreed"), vec![3, 15]);
    }

    #[test]
    fn greentext_is_not_a_citation() {
        assert_eq!(cited(">implying\n> 12"), Vec::<PostId>::new());
    }

    #[test]
    fn repeated_citation_is_recorded_once() {
        assert_eq!(cited(">>5 >>5 >>6"), vec![5, 6]);
    }

    #[test]
    fn overflowing_number_is_skipped() {
        assert_eq!(cited(">>99999999999999999999999 >>1"), vec![1]);
    }

    #[test]
    fn typed_entities_are_not_citations() {
        assert_eq!(cited("&gt;&gt;5 and &gt;&gt; 6"), Vec::<PostId>::new());
        assert_eq!(escape_body("&gt;&gt;5"), "&amp;gt;&amp;gt;5");
    }

    #[test]
    fn escaping_covers_markup() {
        let escaped = escape_body("<b>hi</b> >>1");
        assert!(!escaped.contains('<'));
        assert!(escaped.contains("&gt;&gt;1"));
    }
}
