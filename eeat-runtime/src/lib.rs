//! EEAT Lens Runtime
//!
//! Runs the scoring pipeline over a batch of URLs:
//! - **Config**: TOML run configuration with defaults for every field
//! - **Pipeline**: per-page stage sequencing, bounded fan-out, per-page deadlines
//! - **Report**: per-page status, run summary, JSON and Markdown export

pub mod config;
pub mod error;
pub mod pipeline;
pub mod report;

pub use config::*;
pub use error::*;
pub use pipeline::*;
pub use report::*;
