//! Classic cart-pole balancing with `CartPole-v1` dynamics.
//! Ref: https://gymnasium.farama.org/environments/classic_control/cart_pole/
//!
//! There is no built-in time limit; episode length is bounded by the collector's step budget.

use super::{EnvError, Environment, StepOutcome};
use rand::distributions::Uniform;
use rand::prelude::*;
use serde::{Deserialize, Serialize};

const GRAVITY: f64 = 9.8;
const CART_MASS: f64 = 1.0;
const POLE_MASS: f64 = 0.1;
const TOTAL_MASS: f64 = CART_MASS + POLE_MASS;
const POLE_HALF_LENGTH: f64 = 0.5;
const POLE_MASS_LENGTH: f64 = POLE_MASS * POLE_HALF_LENGTH;
const FORCE_MAG: f64 = 10.0;
const TAU: f64 = 0.02;
const X_THRESHOLD: f64 = 2.4;
const THETA_THRESHOLD: f64 = 12.0 * 2.0 * std::f64::consts::PI / 360.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CartPoleConfig {
    pub seed: u64,
    /// Initial state entries are drawn from `[-init_range, init_range]`.
    pub init_range: f64,
}

impl Default for CartPoleConfig {
    fn default() -> Self {
        Self {
            seed: 1,
            init_range: 0.05,
        }
    }
}

#[derive(Debug)]
pub struct CartPole {
    rng: StdRng,
    init: Uniform<f64>,
    /// `[x, x_dot, theta, theta_dot]`
    state: [f64; 4],
    done: bool,
}

impl CartPole {
    pub fn new(config: CartPoleConfig) -> Self {
        Self {
            rng: StdRng::seed_from_u64(config.seed),
            init: Uniform::new_inclusive(-config.init_range, config.init_range),
            state: [0.; 4],
            done: true,
        }
    }
}

impl Environment for CartPole {
    fn name(&self) -> &str {
        "CartPole-v1"
    }

    fn state_size(&self) -> usize {
        4
    }

    fn action_size(&self) -> usize {
        2
    }

    fn reset(&mut self) -> Result<Vec<f64>, EnvError> {
        for x in self.state.iter_mut() {
            *x = self.init.sample(&mut self.rng);
        }
        self.done = false;

        Ok(self.state.to_vec())
    }

    fn step(&mut self, action: usize) -> Result<StepOutcome, EnvError> {
        if action >= self.action_size() {
            return Err(EnvError::InvalidAction {
                action,
                size: self.action_size(),
            });
        }
        if self.done {
            return Err(EnvError::EpisodeFinished);
        }

        let [x, x_dot, theta, theta_dot] = self.state;
        let force = if action == 1 { FORCE_MAG } else { -FORCE_MAG };
        let (sin, cos) = theta.sin_cos();

        let temp = (force + POLE_MASS_LENGTH * theta_dot * theta_dot * sin) / TOTAL_MASS;
        let theta_acc = (GRAVITY * sin - cos * temp)
            / (POLE_HALF_LENGTH * (4.0 / 3.0 - POLE_MASS * cos * cos / TOTAL_MASS));
        let x_acc = temp - POLE_MASS_LENGTH * theta_acc * cos / TOTAL_MASS;

        // Explicit Euler, as in the reference environment.
        self.state = [
            x + TAU * x_dot,
            x_dot + TAU * x_acc,
            theta + TAU * theta_dot,
            theta_dot + TAU * theta_acc,
        ];

        let [x, _, theta, _] = self.state;
        self.done = x.abs() > X_THRESHOLD || theta.abs() > THETA_THRESHOLD;

        Ok(StepOutcome {
            next_state: self.state.to_vec(),
            reward: 1.0,
            done: self.done,
        })
    }
}
