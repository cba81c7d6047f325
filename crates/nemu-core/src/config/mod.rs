//! Configuration system for nemu.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{NemuError, NemuResult};
use crate::types::SharingMode;

/// Knowledge store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeConfig {
    /// Per-conversation or global knowledge.
    pub sharing: SharingMode,
    /// Path to the SQLite knowledge database (`:memory:` for ephemeral).
    pub db_path: PathBuf,
    /// Minimum BM25 score for the relevance tier.
    pub relevance_threshold: f32,
    /// How many index hits the relevance tier considers.
    pub relevance_candidates: usize,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        let nemu_dir = dirs::home_dir()
            .map(|h| h.join(".nemu"))
            .unwrap_or_else(|| PathBuf::from(".nemu"));

        Self {
            sharing: SharingMode::PerConversation,
            db_path: nemu_dir.join("knowledge.db"),
            relevance_threshold: 0.3,
            relevance_candidates: 10,
        }
    }
}

/// Query extraction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Word that addresses the bot in group conversations.
    pub trigger_token: String,
    /// Words removed together with the trigger token ("hey nemu", "nemu ok").
    pub address_words: Vec<String>,
    /// Queries shorter than this (in characters) are ignored.
    pub min_query_chars: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            trigger_token: "nemu".to_string(),
            address_words: ["hey", "hi", "hello", "yo", "oh", "ok", "okay"]
                .iter()
                .map(|w| w.to_string())
                .collect(),
            min_query_chars: 2,
        }
    }
}

/// Teaching correlator capacities.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrelatorConfig {
    /// Pending teaching prompts kept before the oldest are dropped.
    pub pending_capacity: usize,
    /// Outgoing message ids remembered as reply targets.
    pub system_capacity: usize,
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        Self {
            pending_capacity: 100,
            system_capacity: 200,
        }
    }
}

/// Response decoration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediatorConfig {
    /// Chance that an answer gets a marker prepended.
    pub decoration_probability: f64,
    /// Markers to choose from.
    pub markers: Vec<String>,
}

impl Default for MediatorConfig {
    fn default() -> Self {
        Self {
            decoration_probability: 0.1,
            markers: ["😊 ", "✨ ", "🌟 ", "💫 "]
                .iter()
                .map(|m| m.to_string())
                .collect(),
        }
    }
}

/// Main nemu configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NemuConfig {
    pub knowledge: KnowledgeConfig,
    pub extractor: ExtractorConfig,
    pub correlator: CorrelatorConfig,
    pub mediator: MediatorConfig,
}

impl NemuConfig {
    /// Load configuration from a file (TOML, JSON, or YAML).
    pub fn from_file(path: impl AsRef<std::path::Path>) -> NemuResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let ext = path.as_ref().extension().and_then(|e| e.to_str());

        let config: Self = match ext {
            Some("toml") => {
                toml::from_str(&content).map_err(|e| NemuError::Configuration(e.to_string()))?
            }
            Some("json") => serde_json::from_str(&content)
                .map_err(|e| NemuError::Configuration(e.to_string()))?,
            Some("yaml" | "yml") => serde_yaml::from_str(&content)
                .map_err(|e| NemuError::Configuration(e.to_string()))?,
            _ => {
                return Err(NemuError::Configuration(
                    "Unsupported config file format. Use .toml, .json, or .yaml".to_string(),
                ))
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables.
    ///
    /// Reads:
    /// - `NEMU_SHARING` (`per_conversation` or `global`)
    /// - `NEMU_DB_PATH`
    /// - `NEMU_RELEVANCE_THRESHOLD`
    /// - `NEMU_TRIGGER_TOKEN`
    /// - `NEMU_DECORATION_PROBABILITY`
    /// - `NEMU_PENDING_CAPACITY`, `NEMU_SYSTEM_CAPACITY`
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(mode) = std::env::var("NEMU_SHARING") {
            if let Some(mode) = SharingMode::parse(&mode) {
                config.knowledge.sharing = mode;
            }
        }

        if let Ok(path) = std::env::var("NEMU_DB_PATH") {
            config.knowledge.db_path = PathBuf::from(path);
        }

        if let Ok(threshold) = std::env::var("NEMU_RELEVANCE_THRESHOLD") {
            if let Ok(threshold) = threshold.parse() {
                config.knowledge.relevance_threshold = threshold;
            }
        }

        if let Ok(token) = std::env::var("NEMU_TRIGGER_TOKEN") {
            config.extractor.trigger_token = token;
        }

        if let Ok(probability) = std::env::var("NEMU_DECORATION_PROBABILITY") {
            if let Ok(probability) = probability.parse() {
                config.mediator.decoration_probability = probability;
            }
        }

        if let Ok(capacity) = std::env::var("NEMU_PENDING_CAPACITY") {
            if let Ok(capacity) = capacity.parse() {
                config.correlator.pending_capacity = capacity;
            }
        }

        if let Ok(capacity) = std::env::var("NEMU_SYSTEM_CAPACITY") {
            if let Ok(capacity) = capacity.parse() {
                config.correlator.system_capacity = capacity;
            }
        }

        config
    }

    /// Check values that would otherwise panic or silently disable a feature.
    pub fn validate(&self) -> NemuResult<()> {
        if self.extractor.trigger_token.trim().is_empty() {
            return Err(NemuError::validation_with_suggestion(
                "trigger_token must not be blank",
                "Set extractor.trigger_token, e.g. \"nemu\"",
            ));
        }
        if !(0.0..=1.0).contains(&self.mediator.decoration_probability) {
            return Err(NemuError::validation(format!(
                "decoration_probability must be within [0, 1], got {}",
                self.mediator.decoration_probability
            )));
        }
        if self.correlator.pending_capacity == 0 || self.correlator.system_capacity == 0 {
            return Err(NemuError::validation("correlator capacities must be at least 1"));
        }
        if self.knowledge.relevance_threshold < 0.0 {
            return Err(NemuError::validation("relevance_threshold must not be negative"));
        }
        Ok(())
    }

    /// Build configuration using builder pattern.
    pub fn builder() -> NemuConfigBuilder {
        NemuConfigBuilder::default()
    }
}

/// Builder for NemuConfig.
#[derive(Default)]
pub struct NemuConfigBuilder {
    config: NemuConfig,
}

impl NemuConfigBuilder {
    /// Set the knowledge sharing mode.
    pub fn sharing(mut self, mode: SharingMode) -> Self {
        self.config.knowledge.sharing = mode;
        self
    }

    /// Set the knowledge database path.
    pub fn db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.knowledge.db_path = path.into();
        self
    }

    /// Set the relevance tier threshold.
    pub fn relevance_threshold(mut self, threshold: f32) -> Self {
        self.config.knowledge.relevance_threshold = threshold;
        self
    }

    /// Set the trigger token.
    pub fn trigger_token(mut self, token: impl Into<String>) -> Self {
        self.config.extractor.trigger_token = token.into();
        self
    }

    /// Set correlator capacities.
    pub fn capacities(mut self, pending: usize, system: usize) -> Self {
        self.config.correlator.pending_capacity = pending;
        self.config.correlator.system_capacity = system;
        self
    }

    /// Set the decoration probability.
    pub fn decoration_probability(mut self, probability: f64) -> Self {
        self.config.mediator.decoration_probability = probability;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> NemuConfig {
        self.config
    }
}
