//! EEAT Lens Web Layer
//!
//! Provides the page-fetch capability of the pipeline:
//! - HTTP client with rotating user agents
//! - Main-content extraction from HTML
//! - Text normalization, de-duplication and truncation

pub mod client;
pub mod cleaner;
pub mod fetcher;

pub use client::*;
pub use cleaner::*;
pub use fetcher::*;
