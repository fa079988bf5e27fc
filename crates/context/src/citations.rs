//! Citation extraction from generated answers
//!
//! Generators are asked to cite passages by number. Markers look like
//! `[2]` or `<2>`, matching the numbering used in the prompt.

use docqa_search::RerankedPassage;
use regex_lite::Regex;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::OnceLock;

/// Maximum characters of passage text kept in a citation
pub const EXCERPT_CHARS: usize = 200;

/// A passage referenced by the answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Citation {
    /// 1-based passage number
    pub index: usize,
    pub source: String,
    pub excerpt: String,
}

fn marker_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\[(\d+)\]|<(\d+)>").expect("citation pattern is valid"))
}

/// Collect the distinct passages cited in `answer`, ordered by number.
///
/// Markers outside `1..=passages.len()` are ignored.
pub fn extract_citations(answer: &str, passages: &[RerankedPassage]) -> Vec<Citation> {
    let indices: BTreeSet<usize> = marker_pattern()
        .captures_iter(answer)
        .filter_map(|cap| cap.get(1).or_else(|| cap.get(2)))
        .filter_map(|m| m.as_str().parse::<usize>().ok())
        .filter(|&n| n >= 1 && n <= passages.len())
        .collect();

    indices
        .into_iter()
        .map(|n| {
            let passage = &passages[n - 1].passage;
            Citation {
                index: n,
                source: passage.source.clone(),
                excerpt: passage.text.chars().take(EXCERPT_CHARS).collect(),
            }
        })
        .collect()
}
