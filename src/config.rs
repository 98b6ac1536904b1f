//! TOML-backed configuration.
//!
//! Every field has a default so a bare `seshat train` runs without a
//! config file; a TOML file overrides whatever it mentions.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, SeshatResult};

/// Curriculum and evaluation knobs for the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JointerConfig {
    /// Consecutive epochs the perception module is active per cycle.
    pub perception_steps: u32,
    /// Consecutive epochs the syntax module is active per cycle.
    /// Zero when the parser is deterministic and has nothing to learn.
    pub syntax_steps: u32,
    /// Consecutive epochs the semantics module is active per cycle.
    pub semantics_steps: u32,
    /// Depth bound for tree evaluation.
    pub max_eval_depth: usize,
    /// Seed for every stochastic component owned by the learner.
    pub seed: u64,
}

impl Default for JointerConfig {
    fn default() -> Self {
        Self {
            perception_steps: 1,
            syntax_steps: 0,
            semantics_steps: 0,
            max_eval_depth: 1000,
            seed: 157,
        }
    }
}

/// Outer training-loop knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrainConfig {
    pub epochs: u32,
    pub batch_size: usize,
    /// Probability that a glyph's perception prior starts out corrupted.
    pub perception_noise: f64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            epochs: 10,
            batch_size: 64,
            perception_noise: 0.3,
        }
    }
}

/// Synthetic dataset generation knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatasetConfig {
    pub samples: usize,
    /// Maximum operator nesting depth of generated expressions.
    pub max_expr_depth: usize,
    /// Probability of wrapping a subexpression in parentheses.
    pub paren_prob: f64,
    pub seed: u64,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            samples: 2000,
            max_expr_depth: 3,
            paren_prob: 0.25,
            seed: 777,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SeshatConfig {
    pub jointer: JointerConfig,
    pub train: TrainConfig,
    pub dataset: DatasetConfig,
}

impl SeshatConfig {
    pub fn from_toml_file(path: &Path) -> SeshatResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: SeshatConfig = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> SeshatResult<()> {
        if self.jointer.max_eval_depth == 0 {
            return Err(ConfigError::Invalid {
                message: "max_eval_depth must be positive".into(),
            }
            .into());
        }
        if self.train.batch_size == 0 {
            return Err(ConfigError::Invalid {
                message: "batch_size must be positive".into(),
            }
            .into());
        }
        if !(0.0..=1.0).contains(&self.train.perception_noise) {
            return Err(ConfigError::Invalid {
                message: "perception_noise must lie in [0, 1]".into(),
            }
            .into());
        }
        if !(0.0..=1.0).contains(&self.dataset.paren_prob) {
            return Err(ConfigError::Invalid {
                message: "paren_prob must lie in [0, 1]".into(),
            }
            .into());
        }
        if self.dataset.samples == 0 {
            return Err(ConfigError::Invalid {
                message: "dataset.samples must be positive".into(),
            }
            .into());
        }
        Ok(())
    }
}
