//! State/reward/termination sources the collector drives.

pub mod cartpole;
pub mod gym_adapter;

use gymnasium::GymError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnvError {
    #[error(transparent)]
    Gym(#[from] GymError),

    #[error("'{name}' is not supported: {reason}")]
    Unsupported { name: String, reason: String },

    #[error("action {action} out of range for {size} actions")]
    InvalidAction { action: usize, size: usize },

    #[error("step called on a finished episode; reset first")]
    EpisodeFinished,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub next_state: Vec<f64>,
    pub reward: f64,
    pub done: bool,
}

pub trait Environment {
    fn name(&self) -> &str;

    fn state_size(&self) -> usize;

    fn action_size(&self) -> usize;

    /// Starts a new episode and returns its initial state.
    fn reset(&mut self) -> Result<Vec<f64>, EnvError>;

    fn step(&mut self, action: usize) -> Result<StepOutcome, EnvError>;
}

impl<E: Environment + ?Sized> Environment for Box<E> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn state_size(&self) -> usize {
        (**self).state_size()
    }

    fn action_size(&self) -> usize {
        (**self).action_size()
    }

    fn reset(&mut self) -> Result<Vec<f64>, EnvError> {
        (**self).reset()
    }

    fn step(&mut self, action: usize) -> Result<StepOutcome, EnvError> {
        (**self).step(action)
    }
}
