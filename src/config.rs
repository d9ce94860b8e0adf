//! Default parameters and the configuration structs built from them.
//!
//! Both structs deserialize from JSON with every field optional, so a config
//! file only needs to name what it overrides:
//!
//! ```
//! use seqdex::config::IndexerConfig;
//!
//! let config: IndexerConfig = serde_json::from_str(r#"{ "max_gram_length": 2 }"#).unwrap();
//! assert_eq!(config.max_gram_length, 2);
//! assert_eq!(config.match_batch_size, seqdex::config::MATCH_BATCH_SIZE);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// =============================================================================
// Indexing
// =============================================================================

/// Longest n-gram extracted by the parser.
pub const DEFAULT_MAX_GRAM_LENGTH: usize = 3;

/// Number of strings sent to the store per `matching` lookup.
///
/// Stores backed by SQL engines cap bound parameters (SQLite: 999), so the
/// indexer never sends an unbounded list.
pub const MATCH_BATCH_SIZE: usize = 500;

/// Tokens shown on each side of a concordance hit.
pub const DEFAULT_WINDOW: usize = 5;

// =============================================================================
// Neural network
// =============================================================================

pub const DEFAULT_LEARNING_RATE: f64 = 0.2;

/// Charge of an input node whose object is in the activation set.
pub const ACTIVE_CHARGE: f64 = 1.0;

/// Baseline charge of every other input node.
pub const INACTIVE_CHARGE: f64 = 0.0;

/// Initial link weights are drawn uniformly from this range.
pub const DEFAULT_WEIGHT_RANGE: (f64, f64) = (-1.0, 1.0);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    pub max_gram_length: usize,
    pub match_batch_size: usize,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            max_gram_length: DEFAULT_MAX_GRAM_LENGTH,
            match_batch_size: MATCH_BATCH_SIZE,
        }
    }
}

impl IndexerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_gram_length == 0 {
            return Err(ConfigError::Invalid {
                name: "max_gram_length",
                reason: "must be at least 1".into(),
            });
        }
        if self.match_batch_size == 0 {
            return Err(ConfigError::Invalid {
                name: "match_batch_size",
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub learning_rate: f64,
    pub active: f64,
    pub inactive: f64,
    pub weight_range: (f64, f64),
    /// Seed for the weight generator; `None` draws from OS entropy
    pub seed: Option<u64>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            learning_rate: DEFAULT_LEARNING_RATE,
            active: ACTIVE_CHARGE,
            inactive: INACTIVE_CHARGE,
            weight_range: DEFAULT_WEIGHT_RANGE,
            seed: None,
        }
    }
}

impl NetworkConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let (lo, hi) = self.weight_range;
        if !(lo.is_finite() && hi.is_finite()) || lo > hi {
            return Err(ConfigError::WeightRange(lo, hi));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(ConfigError::Invalid {
                name: "learning_rate",
                reason: format!("{} is not a positive number", self.learning_rate),
            });
        }
        Ok(())
    }
}

/// Everything the CLI reads from `--config`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub indexer: IndexerConfig,
    pub network: NetworkConfig,
    pub window: Option<usize>,
}
