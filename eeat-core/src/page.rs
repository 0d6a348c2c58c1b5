//! Page content and the judge's page-level enumerations

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::MAX_TITLE_CHARS;

/// A page as delivered by a fetcher, before preprocessing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPage {
    pub url: String,
    pub title: String,
    /// Extracted text before cleaning
    pub raw_text: String,
    /// Normalized, de-duplicated and truncated text
    pub cleaned_text: String,
    /// `<html lang>` or content-language meta, if any
    pub html_lang: Option<String>,
    pub meta_description: Option<String>,
}

/// Preprocessed page handed down the pipeline by value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageContent {
    pub url: String,
    pub title: String,
    pub raw_text: String,
    pub cleaned_text: String,
    /// Language code used for prompts (`FR`, `EN`, `PT-BR`, ...)
    pub language: String,
    pub category: Category,
    #[serde(default)]
    pub meta_description: Option<String>,
}

const MIN_TITLE_CHARS: usize = 10;
/// Below this many characters of cleaned text a page is considered thin
pub const MIN_CONTENT_CHARS: usize = 300;

/// Surface measurements of a page, computed without the judge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentMetrics {
    pub content_chars: usize,
    pub content_words: usize,
    pub title_chars: usize,
    pub title_words: usize,
    pub avg_word_length: f64,
    pub meta_description_chars: Option<usize>,
    /// Title between 10 and 60 characters
    pub title_appropriate_length: bool,
    pub content_sufficient: bool,
}

impl PageContent {
    /// First `max_chars` characters of the cleaned text
    pub fn excerpt(&self, max_chars: usize) -> String {
        self.cleaned_text.chars().take(max_chars).collect()
    }

    pub fn word_count(&self) -> usize {
        self.cleaned_text.split_whitespace().count()
    }

    pub fn metrics(&self) -> ContentMetrics {
        let content_chars = self.cleaned_text.chars().count();
        let content_words = self.word_count();
        let title_chars = self.title.chars().count();
        ContentMetrics {
            content_chars,
            content_words,
            title_chars,
            title_words: self.title.split_whitespace().count(),
            avg_word_length: if content_words == 0 {
                0.0
            } else {
                content_chars as f64 / content_words as f64
            },
            meta_description_chars: self
                .meta_description
                .as_deref()
                .map(|d| d.chars().count())
                .filter(|n| *n > 0),
            title_appropriate_length: (MIN_TITLE_CHARS..=MAX_TITLE_CHARS).contains(&title_chars),
            content_sufficient: content_chars >= MIN_CONTENT_CHARS,
        }
    }
}

/// Page category, as pre-classified by the preprocessor or returned by the judge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Brand,
    Destination,
    Experience,
    Informational,
    Transactional,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Brand => "Brand",
            Category::Destination => "Destination",
            Category::Experience => "Experience",
            Category::Informational => "Informational",
            Category::Transactional => "Transactional",
        }
    }

    pub fn parse(value: &str) -> Option<Category> {
        match value {
            "Brand" => Some(Category::Brand),
            "Destination" => Some(Category::Destination),
            "Experience" => Some(Category::Experience),
            "Informational" => Some(Category::Informational),
            "Transactional" => Some(Category::Transactional),
            _ => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Overall tone of the page as judged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

impl Sentiment {
    pub fn as_str(self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Neutral => "neutral",
            Sentiment::Negative => "negative",
        }
    }

    pub fn parse(value: &str) -> Option<Sentiment> {
        match value {
            "positive" => Some(Sentiment::Positive),
            "neutral" => Some(Sentiment::Neutral),
            "negative" => Some(Sentiment::Negative),
            _ => None,
        }
    }

    /// Contribution to the composite score
    pub fn score(self) -> f64 {
        match self {
            Sentiment::Positive => 75.0,
            Sentiment::Neutral => 50.0,
            Sentiment::Negative => 25.0,
        }
    }
}

/// Readability band (`lisibilite.label`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadabilityLabel {
    Facile,
    Moyen,
    Difficile,
}

impl ReadabilityLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            ReadabilityLabel::Facile => "facile",
            ReadabilityLabel::Moyen => "moyen",
            ReadabilityLabel::Difficile => "difficile",
        }
    }

    pub fn parse(value: &str) -> Option<ReadabilityLabel> {
        match value {
            "facile" => Some(ReadabilityLabel::Facile),
            "moyen" => Some(ReadabilityLabel::Moyen),
            "difficile" => Some(ReadabilityLabel::Difficile),
            _ => None,
        }
    }
}

/// Readability as rated by the judge
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Readability {
    pub score: f64,
    pub label: ReadabilityLabel,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content(title: &str, text: &str, meta: Option<&str>) -> PageContent {
        PageContent {
            url: "https://example.com".to_string(),
            title: title.to_string(),
            raw_text: text.to_string(),
            cleaned_text: text.to_string(),
            language: "EN".to_string(),
            category: Category::Informational,
            meta_description: meta.map(String::from),
        }
    }

    #[test]
    fn test_content_metrics() {
        let text = "word ".repeat(80);
        let metrics = content("Eiffel Tower Guide", text.trim(), Some("Plan your visit")).metrics();

        assert_eq!(metrics.content_words, 80);
        assert_eq!(metrics.content_chars, 399);
        assert!(metrics.content_sufficient);
        assert_eq!(metrics.title_words, 3);
        assert!(metrics.title_appropriate_length);
        assert_eq!(metrics.meta_description_chars, Some(15));
        assert!((metrics.avg_word_length - 399.0 / 80.0).abs() < 1e-9);
    }

    #[test]
    fn test_thin_page_metrics() {
        let metrics = content("Tour", "Short text.", Some("")).metrics();
        assert!(!metrics.content_sufficient);
        assert!(!metrics.title_appropriate_length);
        assert_eq!(metrics.meta_description_chars, None);

        let empty = content("", "", None).metrics();
        assert_eq!(empty.content_words, 0);
        assert_eq!(empty.avg_word_length, 0.0);
    }
}
