use super::mlp::Mlp;
use super::{ApproxError, ValueApproximator};
use ndarray::Array1;
use rand::rngs::StdRng;

/// State-value estimate with a fixed learning rate.
#[derive(Debug, Clone)]
pub struct ValueNetwork {
    net: Mlp,
    learning_rate: f64,
}

impl ValueNetwork {
    pub fn new(
        state_size: usize,
        hidden: &[usize],
        learning_rate: f64,
        rng: &mut StdRng,
    ) -> Result<Self, ApproxError> {
        let sizes = [&[state_size][..], hidden, &[1][..]].concat();
        Ok(Self {
            net: Mlp::new(&sizes, rng)?,
            learning_rate,
        })
    }
}

impl ValueApproximator for ValueNetwork {
    fn predict(&self, state: &[f64]) -> Result<f64, ApproxError> {
        Ok(self.net.forward(state)?[0])
    }

    fn update(&mut self, state: &[f64], target: f64) -> Result<f64, ApproxError> {
        self.net.train_step(state, self.learning_rate, |out| {
            let err = out[0] - target;
            (err * err, Array1::from_elem(1, 2. * err))
        })
    }
}
