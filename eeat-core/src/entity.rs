//! Main-entity surface statistics
//!
//! These statistics are evidence for the judge, not a replacement for its own
//! entity detection. Mentions are case-insensitive, non-overlapping substring
//! matches; each mention is bucketed by where it starts when the cleaned text is
//! cut into three equal-length spans.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::LazyLock;

/// Mention counts per positional span of the text
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDistribution {
    pub intro: usize,
    pub body: usize,
    pub conclusion: usize,
}

impl EntityDistribution {
    pub fn covers_all_sections(&self) -> bool {
        self.intro > 0 && self.body > 0 && self.conclusion > 0
    }

    /// Names of spans with no mention
    pub fn missing_sections(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.intro == 0 {
            missing.push("introduction");
        }
        if self.body == 0 {
            missing.push("body");
        }
        if self.conclusion == 0 {
            missing.push("conclusion");
        }
        missing
    }
}

/// The primary subject of a page and how it is covered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MainEntity {
    pub name: String,
    pub in_title: bool,
    pub mention_count: usize,
    pub distribution: EntityDistribution,
    /// 0-100, best when mention density sits between 1% and 3%
    pub coverage_score: f64,
}

impl MainEntity {
    /// Compute surface statistics for `name` over a page
    pub fn analyze(name: &str, title: &str, text: &str) -> Self {
        let name = name.trim();
        let in_title = !name.is_empty() && contains_ignore_case(title, name);
        let positions = mention_positions(text, name);
        let text_len = text.chars().count();

        let mut distribution = EntityDistribution::default();
        for pos in &positions {
            match pos * 3 / text_len.max(1) {
                0 => distribution.intro += 1,
                1 => distribution.body += 1,
                _ => distribution.conclusion += 1,
            }
        }

        Self {
            name: name.to_string(),
            in_title,
            mention_count: positions.len(),
            distribution,
            coverage_score: coverage_score(positions.len(), text_len),
        }
    }
}

/// Case-insensitive substring test
pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn fold(text: &str) -> Vec<char> {
    // One char in, one char out, so indices stay aligned with the original text
    text.chars()
        .map(|c| c.to_lowercase().next().unwrap_or(c))
        .collect()
}

/// Char offsets of non-overlapping, case-insensitive occurrences of `needle`
fn mention_positions(text: &str, needle: &str) -> Vec<usize> {
    let needle = fold(needle);
    if needle.is_empty() {
        return Vec::new();
    }
    let hay = fold(text);

    let mut positions = Vec::new();
    let mut i = 0;
    while i + needle.len() <= hay.len() {
        if hay[i..i + needle.len()] == needle[..] {
            positions.push(i);
            i += needle.len();
        } else {
            i += 1;
        }
    }
    positions
}

fn coverage_score(mentions: usize, text_chars: usize) -> f64 {
    // Roughly five characters per word
    let words = if text_chars == 0 {
        1.0
    } else {
        text_chars as f64 / 5.0
    };
    let density = mentions as f64 / words * 100.0;

    if (1.0..=3.0).contains(&density) {
        100.0
    } else if density < 1.0 {
        (density * 100.0).floor()
    } else {
        (100.0 - ((density - 3.0) * 10.0).floor()).max(0.0)
    }
}

const STOP_WORDS: &[&str] = &[
    "le", "la", "les", "de", "du", "des", "à", "au", "aux", "et", "ou", "un", "une", "the", "a",
    "an", "of", "in", "on", "at", "to", "for", "and", "or", "is", "are", "guide", "complet",
    "complete", "tout", "tous", "comment", "pourquoi", "best", "top",
];

static CAPITALIZED_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\p{Lu}\p{Ll}+\b").expect("valid regex"));

fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.contains(&word.to_lowercase().as_str())
}

fn strip_punctuation(word: &str) -> &str {
    word.trim_matches(|c| matches!(c, ':' | ',' | ';' | '.' | '!' | '?'))
}

/// Heuristic main-entity candidate for a page.
///
/// Prefers the capitalized title phrase mentioned most in the content, falls back
/// to the most frequent capitalized content word, then to the first significant
/// title words.
pub fn guess_main_entity(title: &str, text: &str) -> Option<String> {
    let mut sequences = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for word in title.split_whitespace() {
        let word = strip_punctuation(word);
        let capitalized = word.chars().next().is_some_and(char::is_uppercase);
        if capitalized && !is_stop_word(word) {
            current.push(word);
        } else if !current.is_empty() {
            sequences.push(current.join(" "));
            current.clear();
        }
    }
    if !current.is_empty() {
        sequences.push(current.join(" "));
    }

    let mut best: Option<String> = None;
    let mut best_count = 0;
    for sequence in sequences {
        let count = mention_positions(text, &sequence).len();
        if count > best_count {
            best_count = count;
            best = Some(sequence);
        }
    }

    if best.is_none() || best_count < 2 {
        let mut order: Vec<&str> = Vec::new();
        let mut freq: HashMap<&str, usize> = HashMap::new();
        for m in CAPITALIZED_WORD.find_iter(text) {
            let word = m.as_str();
            if word.chars().count() > 3 && !is_stop_word(word) {
                let count = freq.entry(word).or_insert(0);
                if *count == 0 {
                    order.push(word);
                }
                *count += 1;
            }
        }
        // First word reaching the highest count wins
        let mut top: Option<(&str, usize)> = None;
        for word in order {
            let count = freq[word];
            if top.map_or(true, |(_, c)| count > c) {
                top = Some((word, count));
            }
        }
        if let Some((word, _)) = top {
            best = Some(word.to_string());
        }
    }

    if best.is_none() {
        let significant: Vec<&str> = title
            .split_whitespace()
            .map(strip_punctuation)
            .filter(|w| !w.is_empty() && !is_stop_word(w))
            .take(3)
            .collect();
        let fallback = if significant.is_empty() {
            title.chars().take(50).collect::<String>()
        } else {
            significant.join(" ")
        };
        if !fallback.trim().is_empty() {
            best = Some(fallback.trim().to_string());
        }
    }

    best
}
