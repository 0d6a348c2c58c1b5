//! Prompt templates for the judge
//!
//! Templates are TOML files in `prompts/`, embedded at build time and
//! overridable from a directory. The template version is part of every cache
//! key, so bumping it invalidates cached judge results.

use regex::Regex;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;
use tracing::debug;

use crate::GenerationOptions;

/// Id of the evaluation prompt
pub const EVALUATE_PROMPT: &str = "evaluate";

/// Id of the recommendation prompt
pub const RECOMMEND_PROMPT: &str = "recommend";

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{([a-z_]+)\}\}").expect("valid regex"));

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("prompt template `{0}` not found")]
    NotFound(String),

    #[error("prompt `{id}` references unknown variable `{name}`")]
    MissingVariable { id: String, name: String },

    #[error("failed to parse prompt {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("failed to read prompts: {0}")]
    Io(#[from] std::io::Error),
}

/// A prompt template loaded from TOML
#[derive(Debug, Clone, Deserialize)]
pub struct PromptTemplate {
    pub prompt: PromptMetadata,
    pub template: TemplateConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PromptMetadata {
    pub id: String,
    pub name: String,
    pub version: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TemplateConfig {
    pub system: String,
    pub user: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u16,
}

fn default_enabled() -> bool {
    true
}

fn default_max_tokens() -> u16 {
    2048
}

/// Values substituted into `{{name}}` placeholders
pub type PromptVars = BTreeMap<&'static str, String>;

impl PromptTemplate {
    /// `id@version`, the prompt component of cache keys
    pub fn version_tag(&self) -> String {
        format!("{}@{}", self.prompt.id, self.prompt.version)
    }

    pub fn system_prompt(&self) -> &str {
        self.template.system.trim()
    }

    pub fn options(&self) -> GenerationOptions {
        GenerationOptions {
            temperature: self.output.temperature,
            max_tokens: self.output.max_tokens,
            json_mode: true,
        }
    }

    /// Fill the user template in a single pass; substituted values are not rescanned
    pub fn render(&self, vars: &PromptVars) -> Result<String, PromptError> {
        let user = self.template.user.trim();

        if let Some(missing) = PLACEHOLDER
            .captures_iter(user)
            .filter_map(|c| c.get(1))
            .find(|name| !vars.contains_key(name.as_str()))
        {
            return Err(PromptError::MissingVariable {
                id: self.prompt.id.clone(),
                name: missing.as_str().to_string(),
            });
        }

        Ok(PLACEHOLDER
            .replace_all(user, |caps: &regex::Captures<'_>| {
                vars.get(&caps[1]).cloned().unwrap_or_default()
            })
            .into_owned())
    }
}

/// Registry of loaded prompt templates
#[derive(Debug, Default)]
pub struct PromptRegistry {
    templates: HashMap<String, PromptTemplate>,
}

impl PromptRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the templates shipped with the crate
    pub fn load_embedded() -> Result<Self, PromptError> {
        let mut registry = Self::new();

        let embedded = [
            ("prompts/evaluate.toml", include_str!("../prompts/evaluate.toml")),
            ("prompts/recommend.toml", include_str!("../prompts/recommend.toml")),
        ];

        for (path, toml_str) in embedded {
            let template =
                toml::from_str::<PromptTemplate>(toml_str).map_err(|source| PromptError::Parse {
                    path: PathBuf::from(path),
                    source,
                })?;
            if template.prompt.enabled {
                registry.register(template);
            }
        }

        Ok(registry)
    }

    /// Replace or add templates from `*.toml` files in a directory
    pub fn with_overrides_from_dir<P: AsRef<Path>>(mut self, dir: P) -> Result<Self, PromptError> {
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();

            if path.extension().is_some_and(|ext| ext == "toml") {
                let content = std::fs::read_to_string(&path)?;
                let template = toml::from_str::<PromptTemplate>(&content)
                    .map_err(|source| PromptError::Parse {
                        path: path.clone(),
                        source,
                    })?;
                if template.prompt.enabled {
                    debug!("Loaded prompt override {} from {}", template.version_tag(), path.display());
                    self.register(template);
                }
            }
        }

        Ok(self)
    }

    /// Register a template
    pub fn register(&mut self, template: PromptTemplate) {
        self.templates.insert(template.prompt.id.clone(), template);
    }

    /// Get a template by id
    pub fn get(&self, id: &str) -> Result<&PromptTemplate, PromptError> {
        self.templates
            .get(id)
            .ok_or_else(|| PromptError::NotFound(id.to_string()))
    }

    /// All templates sorted by id
    pub fn list(&self) -> Vec<&PromptTemplate> {
        let mut templates: Vec<_> = self.templates.values().collect();
        templates.sort_by(|a, b| a.prompt.id.cmp(&b.prompt.id));
        templates
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}
