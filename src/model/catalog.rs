use serde::{Deserialize, Serialize};

use crate::config::ModelConfig;

/// Model tags the kernel accepts out of the box.
pub const BUILTIN_MODELS: &[&str] = &[
    "llama3.2:1b",
    "llama3.2:3b",
    "llama3.1:8b",
    "qwen2.5:0.5b",
    "qwen2.5:1.5b",
    "qwen2.5:3b",
    "qwen2.5:7b",
    "qwen2.5-coder:1.5b",
    "qwen2.5-coder:7b",
    "phi3.5:3.8b",
    "phi4-mini:3.8b",
    "gemma2:2b",
    "gemma2:9b",
    "gemma3:1b",
    "gemma3:4b",
    "mistral:7b",
    "smollm2:135m",
    "smollm2:360m",
    "smollm2:1.7b",
    "tinyllama:1.1b",
    "deepseek-r1:1.5b",
    "deepseek-r1:7b",
    "granite3.1-dense:2b",
    "hermes3:3b",
];

pub const BUILTIN_DEFAULT_MODEL: &str = "llama3.2:1b";

/// Static list of selectable models plus the one used when nothing else is chosen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelCatalog {
    models: Vec<String>,
    default_model: String,
}

impl ModelCatalog {
    /// Builds a catalog. A default that is missing from `models` is appended
    /// so that the default always validates.
    pub fn new<S: Into<String>>(models: Vec<S>, default_model: impl Into<String>) -> Self {
        let mut models: Vec<String> = models.into_iter().map(Into::into).collect();
        let default_model = default_model.into();
        if !models.contains(&default_model) {
            models.push(default_model.clone());
        }
        Self {
            models,
            default_model,
        }
    }

    pub fn builtin() -> Self {
        Self::new(BUILTIN_MODELS.to_vec(), BUILTIN_DEFAULT_MODEL)
    }

    pub fn from_config(config: &ModelConfig) -> Self {
        let models = config
            .catalog
            .clone()
            .unwrap_or_else(|| BUILTIN_MODELS.iter().map(|m| m.to_string()).collect());
        let default_model = config
            .default_model
            .clone()
            .or_else(|| models.first().cloned())
            .unwrap_or_else(|| BUILTIN_DEFAULT_MODEL.to_string());
        Self::new(models, default_model)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.models.iter().any(|model| model == name)
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}
