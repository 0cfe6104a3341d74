#![allow(dead_code)]

use pgrl::approximators::{ApproxError, PolicyApproximator, ValueApproximator};
use pgrl::environments::{EnvError, Environment, StepOutcome};
use pgrl::TrainingConfig;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Every step pays `reward` and ends the episode.
pub struct OneStepEnv {
    pub reward: f64,
    pub resets: Rc<Cell<usize>>,
}

impl OneStepEnv {
    pub fn new(reward: f64) -> Self {
        Self {
            reward,
            resets: Rc::default(),
        }
    }
}

impl Environment for OneStepEnv {
    fn name(&self) -> &str {
        "one-step"
    }

    fn state_size(&self) -> usize {
        4
    }

    fn action_size(&self) -> usize {
        2
    }

    fn reset(&mut self) -> Result<Vec<f64>, EnvError> {
        self.resets.set(self.resets.get() + 1);
        Ok(vec![0.; 4])
    }

    fn step(&mut self, action: usize) -> Result<StepOutcome, EnvError> {
        if action >= 2 {
            return Err(EnvError::InvalidAction { action, size: 2 });
        }
        Ok(StepOutcome {
            next_state: vec![1.; 4],
            reward: self.reward,
            done: true,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PolicyStep {
    pub advantage: f64,
    pub learning_rate: f64,
}

/// Uniform over two actions; remembers every update.
#[derive(Default)]
pub struct RecordingPolicy {
    pub steps: Rc<RefCell<Vec<PolicyStep>>>,
    pub poisoned: bool,
}

impl PolicyApproximator for RecordingPolicy {
    fn action_size(&self) -> usize {
        2
    }

    fn predict(&self, _state: &[f64]) -> Result<Vec<f64>, ApproxError> {
        if self.poisoned {
            Ok(vec![f64::NAN, f64::NAN])
        } else {
            Ok(vec![0.5, 0.5])
        }
    }

    fn update(
        &mut self,
        _state: &[f64],
        _action: &[f64],
        advantage: f64,
        learning_rate: f64,
    ) -> Result<f64, ApproxError> {
        self.steps.borrow_mut().push(PolicyStep {
            advantage,
            learning_rate,
        });
        Ok(advantage.abs())
    }
}

/// Always estimates zero.
#[derive(Default)]
pub struct ZeroValue {
    pub targets: Rc<RefCell<Vec<f64>>>,
}

impl ValueApproximator for ZeroValue {
    fn predict(&self, _state: &[f64]) -> Result<f64, ApproxError> {
        Ok(0.)
    }

    fn update(&mut self, _state: &[f64], target: f64) -> Result<f64, ApproxError> {
        self.targets.borrow_mut().push(target);
        Ok(target * target)
    }
}

pub fn config(algorithm: pgrl::Algorithm, max_episodes: usize) -> TrainingConfig {
    TrainingConfig {
        max_episodes,
        ..TrainingConfig::for_algorithm(algorithm)
    }
}

/// Fails every reset with the given reason.
pub struct BrokenEnv(pub &'static str);

impl Environment for BrokenEnv {
    fn name(&self) -> &str {
        "broken"
    }

    fn state_size(&self) -> usize {
        4
    }

    fn action_size(&self) -> usize {
        2
    }

    fn reset(&mut self) -> Result<Vec<f64>, EnvError> {
        Err(EnvError::Unsupported {
            name: "broken".to_string(),
            reason: self.0.to_string(),
        })
    }

    fn step(&mut self, _action: usize) -> Result<StepOutcome, EnvError> {
        Err(EnvError::EpisodeFinished)
    }
}

/// Accepts writes, fails every flush.
#[derive(Default)]
pub struct UnflushableSink {
    pub flush_attempts: usize,
}

impl pgrl::telemetry::TelemetrySink for UnflushableSink {
    fn write(&mut self, _episode: usize, _metrics: &pgrl::telemetry::Metrics) -> pgrl::PgResult<()> {
        Ok(())
    }

    fn flush(&mut self) -> pgrl::PgResult<()> {
        self.flush_attempts += 1;
        Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full").into())
    }
}
