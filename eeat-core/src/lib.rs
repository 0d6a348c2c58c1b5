//! EEAT Lens Core - Domain model and pure scoring for content-quality audits
//!
//! This crate provides the building blocks shared by every other crate:
//! - The nine E-E-A-T sub-scores and the configurable scorer
//! - A rule-based improvement plan from weaknesses and entity placement
//! - Language detection and main-entity surface statistics
//! - Recommendation types and priority ordering
//! - The content-addressed result cache

pub mod metrics;
pub mod config;
pub mod score;
pub mod improvement;
pub mod page;
pub mod entity;
pub mod language;
pub mod preprocess;
pub mod recommendation;
pub mod cache;
pub mod deadline;

pub use metrics::*;
pub use config::*;
pub use score::*;
pub use improvement::*;
pub use page::*;
pub use entity::*;
pub use language::*;
pub use preprocess::*;
pub use recommendation::*;
pub use cache::*;
pub use deadline::*;

/// Minimum number of recommendations a judge response must carry
pub const MIN_RECOMMENDATIONS: usize = 5;

/// Recommendations kept from a judge response, in judge order
pub const MAX_RECOMMENDATIONS: usize = 8;

/// Maximum length of a suggested title
pub const MAX_TITLE_CHARS: usize = 60;
