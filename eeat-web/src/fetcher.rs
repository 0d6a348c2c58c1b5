//! Page fetcher
//!
//! Downloads a page, extracts its main text and metadata, and cleans it into
//! a [`RawPage`] for the preprocessor.

use async_trait::async_trait;
use reqwest::Client;
use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;
use tracing::{debug, warn};

use eeat_core::RawPage;

use crate::{clean_title, create_client, validate_url, FetchConfig, FetchError, TextCleaner};

/// Subtrees whose text never counts as content
const EXCLUDED_TAGS: &[&str] = &[
    "script", "style", "noscript", "nav", "header", "footer", "aside",
];

/// Candidate containers for the main content, in order of preference
const MAIN_SELECTORS: &[&str] = &[
    "main",
    "article",
    "[role=\"main\"]",
    ".main-content",
    ".content",
    ".post-content",
    ".entry-content",
    ".article-content",
    "#main",
    "#content",
    "#article",
];

/// A main container needs more text than this to be preferred over `<body>`
const MIN_MAIN_CHARS: usize = 100;

/// Capability to turn a URL into page content
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<RawPage, FetchError>;
}

/// HTML metadata and text pulled from a document
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedPage {
    pub title: String,
    pub text: String,
    pub html_lang: Option<String>,
    pub meta_description: Option<String>,
}

/// Fetches over HTTP with retry and backoff
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    config: FetchConfig,
    cleaner: TextCleaner,
}

impl HttpFetcher {
    pub fn new(config: FetchConfig) -> Result<Self, FetchError> {
        Ok(Self {
            client: create_client(&config)?,
            cleaner: TextCleaner::new(config.chunk_size),
            config,
        })
    }

    async fn get_html(&self, url: &str) -> Result<String, FetchError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.text().await?)
    }

    fn build_page(&self, url: &str, html: &str) -> RawPage {
        let extracted = extract_page(html, url);
        let cleaned_text = self.cleaner.clean(&extracted.text);
        debug!(
            "Extracted {} chars ({} after cleaning) from {}",
            extracted.text.len(),
            cleaned_text.len(),
            url
        );

        RawPage {
            url: url.to_string(),
            title: clean_title(&extracted.title),
            raw_text: extracted.text,
            cleaned_text,
            html_lang: extracted.html_lang,
            meta_description: extracted.meta_description,
        }
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<RawPage, FetchError> {
        validate_url(url)?;

        let mut attempt = 0;
        loop {
            match self.get_html(url).await {
                Ok(html) => return Ok(self.build_page(url, &html)),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = self.config.retry_base_ms * 2u64.pow(attempt);
                    warn!("GET {} attempt {} failed: {}", url, attempt + 1, e);
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn first_element<'a>(document: &'a Html, css: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(css).ok()?;
    document.select(&selector).next()
}

fn meta_content(document: &Html, css: &str) -> Option<String> {
    first_element(document, css)
        .and_then(|el| el.value().attr("content"))
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// Text of `root`, one line per text node, skipping excluded subtrees
fn visible_text(root: ElementRef<'_>) -> String {
    let mut parts = Vec::new();

    for node_ref in root.descendants() {
        if let Node::Text(text_node) = node_ref.value() {
            let in_excluded = node_ref.ancestors().any(|ancestor| {
                ancestor
                    .value()
                    .as_element()
                    .is_some_and(|el| EXCLUDED_TAGS.contains(&el.name()))
            });

            if !in_excluded {
                let trimmed = text_node.trim();
                if !trimmed.is_empty() {
                    parts.push(trimmed.to_string());
                }
            }
        }
    }

    parts.join("\n")
}

/// Extract title, language, description and main text from HTML
pub fn extract_page(html: &str, url: &str) -> ExtractedPage {
    let document = Html::parse_document(html);

    let title = first_element(&document, "title")
        .map(element_text)
        .filter(|t| !t.is_empty())
        .or_else(|| meta_content(&document, "meta[property=\"og:title\"]"))
        .or_else(|| {
            first_element(&document, "h1")
                .map(element_text)
                .filter(|t| !t.is_empty())
        })
        .or_else(|| meta_content(&document, "meta[name=\"title\"]"))
        .unwrap_or_else(|| url.to_string());

    let html_lang = first_element(&document, "html")
        .and_then(|el| el.value().attr("lang"))
        .map(|l| l.trim().to_lowercase())
        .filter(|l| !l.is_empty())
        .or_else(|| meta_content(&document, "meta[http-equiv=\"content-language\"]"))
        .or_else(|| meta_content(&document, "meta[http-equiv=\"Content-Language\"]"))
        .or_else(|| meta_content(&document, "meta[name=\"language\"]"))
        .map(|l| l.to_lowercase());

    let meta_description = meta_content(&document, "meta[name=\"description\"]")
        .or_else(|| meta_content(&document, "meta[property=\"og:description\"]"));

    let main_text = MAIN_SELECTORS.iter().find_map(|css| {
        first_element(&document, css)
            .map(visible_text)
            .filter(|t| t.chars().count() > MIN_MAIN_CHARS)
    });

    let text = main_text
        .or_else(|| first_element(&document, "body").map(visible_text))
        .unwrap_or_default();

    ExtractedPage {
        title,
        text,
        html_lang,
        meta_description,
    }
}
