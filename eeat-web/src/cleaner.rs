//! Text normalization for extracted page content

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

static HORIZONTAL_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\S\n]+").expect("valid regex"));

static SENTENCE_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]+(?:\s|$)").expect("valid regex"));

static TITLE_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+[-|•]\s+[^-|•]*$").expect("valid regex"));

static TITLE_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^-|•]*\s+[-|•]\s+").expect("valid regex"));

const MAX_TITLE_CHARS: usize = 100;

/// Lines this short (menu labels, prices) may legitimately repeat
const DEDUP_MIN_LINE: usize = 10;

/// Cleans extracted text: typography, whitespace, repeated lines, length
#[derive(Debug, Clone)]
pub struct TextCleaner {
    chunk_size: usize,
}

impl Default for TextCleaner {
    fn default() -> Self {
        Self { chunk_size: 8000 }
    }
}

impl TextCleaner {
    pub fn new(chunk_size: usize) -> Self {
        Self { chunk_size }
    }

    pub fn clean(&self, text: &str) -> String {
        truncate_sentences(&dedup_lines(&normalize(text)), self.chunk_size)
    }
}

/// Replace typographic characters and collapse whitespace, keeping line breaks
pub fn normalize(text: &str) -> String {
    let replaced: String = text
        .chars()
        .map(|c| match c {
            '\u{00a0}' => ' ',
            '\u{2013}' | '\u{2014}' => '-',
            '\u{2019}' => '\'',
            '\u{201c}' | '\u{201d}' => '"',
            other => other,
        })
        .collect();

    let collapsed = HORIZONTAL_SPACE.replace_all(&replaced, " ");
    let mut lines = Vec::new();
    let mut blank = false;
    for line in collapsed.lines().map(str::trim) {
        if line.is_empty() {
            if !blank && !lines.is_empty() {
                lines.push("");
            }
            blank = true;
        } else {
            lines.push(line);
            blank = false;
        }
    }
    lines.join("\n").trim().to_string()
}

/// Drop empty lines and repeats of lines longer than a few characters
pub fn dedup_lines(text: &str) -> String {
    let mut seen = HashSet::new();
    text.lines()
        .map(str::trim)
        .filter(|line| {
            !line.is_empty() && (seen.insert(*line) || line.chars().count() <= DEDUP_MIN_LINE)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Sentences longer than ten characters
pub fn sentences(text: &str) -> Vec<&str> {
    SENTENCE_END
        .split(text)
        .map(str::trim)
        .filter(|s| s.chars().count() > 10)
        .collect()
}

/// Cut at a sentence boundary so the result fits in `max_chars`
pub fn truncate_sentences(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let mut result = String::new();
    let mut len = 0;
    for sentence in sentences(text) {
        let n = sentence.chars().count();
        if len + n + 2 > max_chars {
            break;
        }
        result.push_str(sentence);
        result.push_str(". ");
        len += n + 2;
    }
    result.trim().to_string()
}

/// Strip a site-name suffix (or prefix) and cap the length
pub fn clean_title(title: &str) -> String {
    let stripped = if TITLE_SUFFIX.is_match(title) {
        TITLE_SUFFIX.replace(title, "").into_owned()
    } else if TITLE_PREFIX.is_match(title) {
        TITLE_PREFIX.replace(title, "").into_owned()
    } else {
        title.to_string()
    };

    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() > MAX_TITLE_CHARS {
        let head: String = collapsed.chars().take(MAX_TITLE_CHARS - 3).collect();
        format!("{}...", head)
    } else {
        collapsed
    }
}
