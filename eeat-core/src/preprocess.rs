//! Language/entity preprocessing
//!
//! Turns a fetched page into the immutable [`PageContent`] handed down the
//! pipeline, together with an entity candidate and its surface statistics.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::{
    detect_category, detect_language, guess_main_entity, LanguageDetection, MainEntity,
    PageContent, RawPage,
};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PreprocessError {
    #[error("no usable content for {url}")]
    ContentUnavailable { url: String },
}

/// Output of the preprocessor for one page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreparedPage {
    pub content: PageContent,
    /// Heuristic candidate; evidence for the judge, never authoritative
    pub candidate: Option<MainEntity>,
    pub language: LanguageDetection,
}

#[derive(Debug, Clone, Default)]
pub struct Preprocessor {
    forced_language: Option<String>,
}

impl Preprocessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Skip detection and use this language code for every page
    pub fn with_forced_language(mut self, code: impl Into<String>) -> Self {
        self.forced_language = Some(code.into().to_uppercase());
        self
    }

    pub fn prepare(&self, raw: RawPage) -> Result<PreparedPage, PreprocessError> {
        if raw.cleaned_text.trim().is_empty() {
            return Err(PreprocessError::ContentUnavailable { url: raw.url });
        }

        let language = detect_language(
            self.forced_language.as_deref(),
            raw.html_lang.as_deref(),
            &raw.cleaned_text,
            &raw.title,
        );
        let category = detect_category(&raw.cleaned_text, &raw.title);
        let candidate = guess_main_entity(&raw.title, &raw.cleaned_text)
            .map(|name| entity_stats(&name, &raw.title, &raw.cleaned_text));

        debug!(
            url = %raw.url,
            language = %language.code,
            candidate = candidate.as_ref().map(|e| e.name.as_str()).unwrap_or("-"),
            "Preprocessed page"
        );

        Ok(PreparedPage {
            content: PageContent {
                url: raw.url,
                title: raw.title,
                raw_text: raw.raw_text,
                cleaned_text: raw.cleaned_text,
                language: language.code.clone(),
                category,
                meta_description: raw.meta_description,
            },
            candidate,
            language,
        })
    }
}

/// Surface statistics for `name` over a page's title and cleaned text
pub fn entity_stats(name: &str, title: &str, cleaned_text: &str) -> MainEntity {
    MainEntity::analyze(name, title, cleaned_text)
}
