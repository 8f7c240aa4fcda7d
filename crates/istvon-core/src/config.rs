//! Engine settings loaded from an optional file and `ISTVON__*` environment variables.
//!
//! | Key | Env | Default | Description |
//! |-----|-----|---------|-------------|
//! | max_prompt_length | ISTVON__MAX_PROMPT_LENGTH | 5000 | Prompts longer than this (in characters) are rejected before classification. |
//! | fix_threshold | ISTVON__FIX_THRESHOLD | medium | Lowest severity that forces NEEDS_FIX. |
//! | block_threshold | ISTVON__BLOCK_THRESHOLD | high | Lowest severity that forces BLOCK. |
//! | placeholder | ISTVON__PLACEHOLDER | [REDACTED] | Token substituted for redacted spans. |
//! | enhancement_timeout_secs | ISTVON__ENHANCEMENT_TIMEOUT_SECS | 30 | Upper bound on one enhancement call. |
//! | policy_dir | ISTVON__POLICY_DIR | unset | Directory whose policy files override the built-in copies. |

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;
use crate::security::Severity;

/// Sentence-shape thresholds for complexity bucketing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ComplexityThresholds {
    /// At or above this many sentences the prompt is `high` complexity.
    pub high_sentence_count: usize,
    /// At or above this average words per sentence the prompt is `high` complexity.
    pub high_average_words: f64,
    /// At or below this many sentences (and short sentences) the prompt is `low` complexity.
    pub low_sentence_count: usize,
    pub low_average_words: f64,
}

impl Default for ComplexityThresholds {
    fn default() -> Self {
        Self {
            high_sentence_count: 4,
            high_average_words: 22.0,
            low_sentence_count: 1,
            low_average_words: 10.0,
        }
    }
}

/// Marker-count thresholds for specificity bucketing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SpecificityThresholds {
    /// Marker count at which a prompt stops being `vague`.
    pub moderate: usize,
    /// Marker count at which a prompt becomes `specific`.
    pub specific: usize,
}

impl Default for SpecificityThresholds {
    fn default() -> Self {
        Self {
            moderate: 1,
            specific: 3,
        }
    }
}

/// Engine settings. Every field has a default, so an empty environment yields a working engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub max_prompt_length: usize,
    pub fix_threshold: Severity,
    pub block_threshold: Severity,
    pub placeholder: String,
    pub enhancement_timeout_secs: u64,
    pub policy_dir: Option<PathBuf>,
    pub complexity: ComplexityThresholds,
    pub specificity: SpecificityThresholds,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_prompt_length: 5000,
            fix_threshold: Severity::Medium,
            block_threshold: Severity::High,
            placeholder: "[REDACTED]".to_string(),
            enhancement_timeout_secs: 30,
            policy_dir: None,
            complexity: ComplexityThresholds::default(),
            specificity: SpecificityThresholds::default(),
        }
    }
}

impl EngineSettings {
    /// Load settings. Precedence: env `ISTVON_CONFIG` path > `config/istvon` > defaults, then
    /// `ISTVON__*` environment variables on top.
    pub fn load() -> Result<Self, ConfigurationError> {
        let config_path =
            std::env::var("ISTVON_CONFIG").unwrap_or_else(|_| "config/istvon".to_string());
        Self::load_from(Path::new(&config_path))
    }

    /// Load settings from a specific file (TOML, extension optional) plus the environment.
    pub fn load_from(path: &Path) -> Result<Self, ConfigurationError> {
        let builder = config::Config::builder();
        let builder = if path.exists() || path.with_extension("toml").exists() {
            builder.add_source(config::File::from(path).required(false))
        } else {
            builder
        };

        let built = builder
            .add_source(config::Environment::with_prefix("ISTVON").separator("__"))
            .build()?;

        let settings: EngineSettings = built.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject threshold combinations the broker cannot honor.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.max_prompt_length == 0 {
            return Err(ConfigurationError::Thresholds(
                "max_prompt_length must be positive".to_string(),
            ));
        }
        if self.fix_threshold > self.block_threshold {
            return Err(ConfigurationError::Thresholds(format!(
                "fix_threshold ({}) is above block_threshold ({})",
                self.fix_threshold, self.block_threshold
            )));
        }
        if self.placeholder.trim().is_empty() {
            return Err(ConfigurationError::Thresholds(
                "placeholder must not be empty".to_string(),
            ));
        }
        if self.specificity.moderate > self.specificity.specific {
            return Err(ConfigurationError::Thresholds(
                "specificity.moderate must not exceed specificity.specific".to_string(),
            ));
        }
        if self.complexity.low_sentence_count >= self.complexity.high_sentence_count {
            return Err(ConfigurationError::Thresholds(
                "complexity.low_sentence_count must be below high_sentence_count".to_string(),
            ));
        }
        Ok(())
    }

    pub fn enhancement_timeout(&self) -> Duration {
        Duration::from_secs(self.enhancement_timeout_secs)
    }
}
