//! Language and category pre-classification

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::Category;

/// Language codes the prompts support
pub const SUPPORTED_LANGUAGES: &[&str] = &["FR", "DE", "ES", "EN", "JA", "PT-BR"];

const DEFAULT_LANGUAGE: &str = "EN";

const KEYWORDS: &[(&str, &[&str])] = &[
    (
        "FR",
        &[
            "le", "la", "les", "une", "des", "dans", "pour", "avec", "sur", "par", "est", "sont",
            "que", "qui", "où",
        ],
    ),
    (
        "DE",
        &[
            "der", "die", "das", "und", "ist", "sind", "mit", "für", "auf", "von", "zu", "bei",
            "nach", "über",
        ],
    ),
    (
        "ES",
        &[
            "el", "la", "los", "las", "una", "con", "por", "para", "en", "de", "que", "es", "son",
            "como",
        ],
    ),
    (
        "EN",
        &[
            "the", "and", "for", "are", "with", "this", "that", "from", "they", "have", "had",
            "you", "can",
        ],
    ),
    ("JA", &["です", "である", "します", "これ", "それ", "ここ", "この", "その"]),
    (
        "PT-BR",
        &[
            "para", "com", "por", "são", "uma", "que", "não", "mais", "como", "seu", "sua", "você",
        ],
    ),
];

/// How the language was decided
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    Forced,
    HtmlConfirmed,
    Html,
    Keywords,
    Default,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageDetection {
    pub code: String,
    pub method: DetectionMethod,
    pub confidence: f64,
}

/// Map an html `lang` attribute (`fr-FR`, `en_us`, `pt-br`) to a supported code
pub fn normalize_html_lang(lang: &str) -> Option<&'static str> {
    let lang = lang.trim().to_lowercase().replace('_', "-");
    match lang.as_str() {
        "fr" | "fr-fr" | "fr-be" | "fr-ca" | "fr-ch" => Some("FR"),
        "de" | "de-de" | "de-at" | "de-ch" => Some("DE"),
        "es" | "es-es" | "es-mx" => Some("ES"),
        "en" | "en-us" | "en-gb" | "en-au" | "en-ca" => Some("EN"),
        "ja" | "ja-jp" => Some("JA"),
        "pt" | "pt-br" | "pt-pt" => Some("PT-BR"),
        _ => None,
    }
}

/// Keyword vote over content and title; needs at least three hits
pub fn detect_by_keywords(text: &str, title: &str) -> Option<&'static str> {
    let full = format!("{} {}", text, title).to_lowercase();
    let tokens: HashSet<&str> = full
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();

    let mut best: Option<(&'static str, usize)> = None;
    for (code, words) in KEYWORDS {
        let hits = words
            .iter()
            .filter(|w| {
                if *code == "JA" {
                    full.contains(*w)
                } else {
                    tokens.contains(*w)
                }
            })
            .count();
        if best.map_or(true, |(_, h)| hits > h) {
            best = Some((code, hits));
        }
    }

    best.filter(|(_, hits)| *hits >= 3).map(|(code, _)| code)
}

/// Decide the page language
pub fn detect_language(
    forced: Option<&str>,
    html_lang: Option<&str>,
    text: &str,
    title: &str,
) -> LanguageDetection {
    if let Some(code) = forced.and_then(|f| SUPPORTED_LANGUAGES.iter().find(|s| **s == f)) {
        return LanguageDetection {
            code: code.to_string(),
            method: DetectionMethod::Forced,
            confidence: 1.0,
        };
    }

    let html = html_lang.and_then(normalize_html_lang);
    let keywords = detect_by_keywords(text, title);

    let (code, method, confidence) = match (html, keywords) {
        (Some(h), Some(k)) if h == k => (h, DetectionMethod::HtmlConfirmed, 0.9),
        (_, Some(k)) => (k, DetectionMethod::Keywords, 0.6),
        (Some(h), None) => (h, DetectionMethod::Html, 0.8),
        (None, None) => (DEFAULT_LANGUAGE, DetectionMethod::Default, 0.3),
    };

    LanguageDetection {
        code: code.to_string(),
        method,
        confidence,
    }
}

/// Rough page category from intent keywords
pub fn detect_category(text: &str, title: &str) -> Category {
    let low = format!("{} {}", text, title).to_lowercase();
    let any = |words: &[&str]| words.iter().any(|w| low.contains(w));

    if any(&["acheter", "prix", "commande", "panier", "buy", "price", "order"]) {
        Category::Transactional
    } else if any(&["comment", "pourquoi", "qu'est-ce", "guide", "tutorial"]) {
        Category::Informational
    } else if any(&["avis", "test", "review", "expérience"]) {
        Category::Experience
    } else {
        Category::Informational
    }
}
