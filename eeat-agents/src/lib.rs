//! EEAT Lens Agents
//!
//! The two LLM judge calls of the pipeline and everything around them:
//! - **Backends**: OpenAI-compatible (via `async-openai`) and Anthropic
//! - **Judge**: capability trait plus retry, rate-limit, validation and cache decorators
//! - **Analyzer**: evaluation prompt in, validated sub-scores out
//! - **Recommender**: weaknesses in, prioritized recommendations out
//!
//! ## Prompt templates
//!
//! Prompts are TOML files in `prompts/`, see [`prompts::PromptRegistry`].

pub mod backend;
pub mod prompts;
pub mod judge;
pub mod retry;
pub mod limiter;
pub mod schema;
pub mod cached;
pub mod stack;
pub mod analyzer;
pub mod recommender;

#[cfg(test)]
pub(crate) mod testing;

pub use backend::*;
pub use prompts::*;
pub use judge::*;
pub use retry::*;
pub use limiter::*;
pub use schema::*;
pub use cached::*;
pub use stack::*;
pub use analyzer::*;
pub use recommender::*;
