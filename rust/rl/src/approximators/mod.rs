//! Parametric predictors the learners train.
//!
//! The controller only sees [`PolicyApproximator`] and [`ValueApproximator`];
//! the multilayer perceptron in [`mlp`] is one backend for both.

pub mod adam;
pub mod mlp;
pub mod policy;
pub mod value;

pub use policy::SoftmaxPolicy;
pub use value::ValueNetwork;

use itertools::Itertools;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ApproxError {
    #[error("state has {got} entries, approximator expects {expected}")]
    StateSize { expected: usize, got: usize },

    #[error("action {action:?} is not one-hot over {size} actions")]
    NotOneHot { size: usize, action: Vec<f64> },

    #[error("action index {index} out of range for {size} actions")]
    ActionOutOfRange { index: usize, size: usize },

    #[error("invalid layer sizes {0:?}")]
    Layout(Vec<usize>),
}

pub trait PolicyApproximator {
    fn action_size(&self) -> usize;

    /// Categorical distribution over actions for `state`.
    fn predict(&self, state: &[f64]) -> Result<Vec<f64>, ApproxError>;

    /// One policy-gradient step on `advantage × cross_entropy(π(state), action)`.
    /// Returns the loss measured before the step.
    fn update(
        &mut self,
        state: &[f64],
        action: &[f64],
        advantage: f64,
        learning_rate: f64,
    ) -> Result<f64, ApproxError>;
}

pub trait ValueApproximator {
    /// Expected return from `state`.
    fn predict(&self, state: &[f64]) -> Result<f64, ApproxError>;

    /// One regression step on `(V(state) - target)²`. Returns the loss measured before the step.
    fn update(&mut self, state: &[f64], target: f64) -> Result<f64, ApproxError>;
}

pub fn one_hot(index: usize, size: usize) -> Result<Vec<f64>, ApproxError> {
    if index >= size {
        return Err(ApproxError::ActionOutOfRange { index, size });
    }

    let mut v = vec![0.; size];
    v[index] = 1.;
    Ok(v)
}

/// Index of the single set entry of a one-hot vector.
pub fn hot_index(action: &[f64], size: usize) -> Result<usize, ApproxError> {
    let not_one_hot = || ApproxError::NotOneHot {
        size,
        action: action.to_vec(),
    };

    if action.len() != size || action.iter().any(|&x| x != 0. && x != 1.) {
        return Err(not_one_hot());
    }

    let mut set = action.iter().positions(|&x| x == 1.);
    match (set.next(), set.next()) {
        (Some(i), None) => Ok(i),
        _ => Err(not_one_hot()),
    }
}
