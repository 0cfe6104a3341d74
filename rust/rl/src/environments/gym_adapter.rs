//! Remote environment served by a gymnasium-http-api instance.

use super::{EnvError, Environment, StepOutcome};
use gymnasium::{Discrete, ObsActSpace};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Step limit requested from the server when none is configured. Episodes are then bounded
/// by the collector's step budget alone.
pub const UNLIMITED_EPISODE_STEPS: Discrete = Discrete::MAX;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GymConfig {
    pub api_url: String,
    pub env_id: String,
    /// Seed passed to the first reset only; later resets continue the server's stream.
    pub seed: Option<u64>,
    /// Server-side time limit; `None` requests [`UNLIMITED_EPISODE_STEPS`].
    pub max_episode_steps: Option<Discrete>,
}

impl Default for GymConfig {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:40004".to_string(),
            env_id: "CartPole-v1".to_string(),
            seed: Some(1),
            max_episode_steps: None,
        }
    }
}

pub struct GymAdapter {
    name: String,
    env: gymnasium::Environment,
    state_size: usize,
    action_size: usize,
    pending_seed: Option<u64>,
}

impl GymAdapter {
    /// Creates the environment. The id's registered time limit is replaced by
    /// `config.max_episode_steps`, or by [`UNLIMITED_EPISODE_STEPS`] when unset.
    pub fn new(config: &GymConfig) -> Result<Self, EnvError> {
        let env = gymnasium::Environment::new(
            &config.api_url,
            &config.env_id,
            Some(config.max_episode_steps.unwrap_or(UNLIMITED_EPISODE_STEPS)),
            Some(false),
            None,
        )?;
        Self::wrap(env, config.env_id.clone(), config.seed)
    }

    /// Takes ownership of `env`; it is closed on the server if its spaces are unsupported.
    pub fn wrap(
        env: gymnasium::Environment,
        name: String,
        seed: Option<u64>,
    ) -> Result<Self, EnvError> {
        match space_sizes(env.observation_space(), env.action_space()) {
            Ok((state_size, action_size)) => Ok(Self {
                name,
                env,
                state_size,
                action_size,
                pending_seed: seed,
            }),
            Err(reason) => {
                if let Err(e) = env.close() {
                    warn!(env = %name, error = %e, "failed to close remote environment");
                }
                Err(EnvError::Unsupported { name, reason })
            }
        }
    }
}

/// `(state_size, action_size)` for a Box observation space and a Discrete action space.
fn space_sizes(obs: &ObsActSpace, act: &ObsActSpace) -> Result<(usize, usize), String> {
    let state_size = match obs {
        ObsActSpace::Box { .. } => obs.flat_len(),
        other => return Err(format!("observation space must be a Box, got {other:?}")),
    };

    match act {
        ObsActSpace::Discrete { n } if *n > 0 => Ok((state_size, *n as usize)),
        other => Err(format!("action space must be Discrete, got {other:?}")),
    }
}

impl Environment for GymAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn state_size(&self) -> usize {
        self.state_size
    }

    fn action_size(&self) -> usize {
        self.action_size
    }

    fn reset(&mut self) -> Result<Vec<f64>, EnvError> {
        Ok(self.env.reset(self.pending_seed.take())?)
    }

    fn step(&mut self, action: usize) -> Result<StepOutcome, EnvError> {
        if action >= self.action_size {
            return Err(EnvError::InvalidAction {
                action,
                size: self.action_size,
            });
        }

        let si = self.env.step(action as Discrete)?;
        Ok(StepOutcome {
            next_state: si.observation,
            reward: si.reward,
            done: si.terminated || si.truncated,
        })
    }
}

impl Drop for GymAdapter {
    fn drop(&mut self) {
        if let Err(e) = self.env.close() {
            warn!(env = %self.name, error = %e, "failed to close remote environment");
        }
    }
}
