//! Static per-run configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("cannot read config '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Algorithm {
    /// Monte-Carlo REINFORCE with a learned value baseline.
    Reinforce,
    /// One-step online actor-critic.
    ActorCritic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub algorithm: Algorithm,
    pub state_size: usize,
    pub action_size: usize,
    pub discount_factor: f64,
    pub policy_learning_rate: f64,
    pub value_learning_rate: f64,
    /// Online variant only.
    pub learning_rate_decay: f64,
    /// Online variant only.
    pub learning_rate_floor: f64,
    pub max_episodes: usize,
    /// Per-episode step budget.
    pub max_steps: usize,
    pub solved_threshold: f64,
    pub average_window: usize,
    pub seed: u64,
    pub policy_hidden: Vec<usize>,
    pub value_hidden: Vec<usize>,
    pub telemetry_path: Option<PathBuf>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self::for_algorithm(Algorithm::Reinforce)
    }
}

impl TrainingConfig {
    /// Defaults for CartPole-v1 under each learner.
    pub fn for_algorithm(algorithm: Algorithm) -> Self {
        let (max_steps, hidden) = match algorithm {
            Algorithm::Reinforce => (5000, vec![12]),
            Algorithm::ActorCritic => (10_000_000, vec![20, 20]),
        };

        Self {
            algorithm,
            state_size: 4,
            action_size: 2,
            discount_factor: 0.99,
            policy_learning_rate: 0.001,
            value_learning_rate: 0.01,
            learning_rate_decay: 0.999,
            learning_rate_floor: 1e-4,
            max_episodes: 5000,
            max_steps,
            solved_threshold: 475.,
            average_window: 100,
            seed: 1,
            policy_hidden: hidden.clone(),
            value_hidden: hidden,
            telemetry_path: None,
        }
    }

    /// Reads a JSON file; fields it omits take the defaults of the algorithm it names.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_json_str(text: &str) -> Result<Self, serde_json::Error> {
        #[derive(Deserialize)]
        struct Head {
            #[serde(default)]
            algorithm: Option<Algorithm>,
        }

        let mut value: serde_json::Value = serde_json::from_str(text)?;
        let head: Head = serde_json::from_value(value.clone())?;
        let defaults =
            serde_json::to_value(Self::for_algorithm(head.algorithm.unwrap_or(Algorithm::Reinforce)))?;

        if let (Some(obj), serde_json::Value::Object(base)) = (value.as_object_mut(), defaults) {
            for (k, v) in base {
                obj.entry(k).or_insert(v);
            }
        }
        serde_json::from_value(value)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(field: &'static str, reason: impl Into<String>) -> Result<(), ConfigError> {
            Err(ConfigError::Invalid {
                field,
                reason: reason.into(),
            })
        }

        if self.state_size == 0 {
            return invalid("state_size", "must be at least 1");
        }
        if self.action_size == 0 {
            return invalid("action_size", "must be at least 1");
        }
        if !(self.discount_factor > 0. && self.discount_factor <= 1.) {
            return invalid("discount_factor", format!("{} not in (0, 1]", self.discount_factor));
        }
        if !(self.policy_learning_rate > 0. && self.policy_learning_rate.is_finite()) {
            return invalid("policy_learning_rate", "must be positive");
        }
        if !(self.value_learning_rate > 0. && self.value_learning_rate.is_finite()) {
            return invalid("value_learning_rate", "must be positive");
        }
        if !(self.learning_rate_decay > 0. && self.learning_rate_decay <= 1.) {
            return invalid(
                "learning_rate_decay",
                format!("{} not in (0, 1]", self.learning_rate_decay),
            );
        }
        if !(self.learning_rate_floor >= 0. && self.learning_rate_floor.is_finite()) {
            return invalid("learning_rate_floor", "must be non-negative");
        }
        if self.max_episodes == 0 {
            return invalid("max_episodes", "must be at least 1");
        }
        if self.max_steps == 0 {
            return invalid("max_steps", "must be at least 1");
        }
        if self.average_window == 0 {
            return invalid("average_window", "must be at least 1");
        }
        if self.solved_threshold.is_nan() {
            return invalid("solved_threshold", "must be a number");
        }
        if self.policy_hidden.contains(&0) || self.value_hidden.contains(&0) {
            return invalid("policy_hidden/value_hidden", "layer widths must be positive");
        }

        Ok(())
    }
}
