use super::mlp::Mlp;
use super::{hot_index, ApproxError, PolicyApproximator};
use ndarray::Array1;
use rand::rngs::StdRng;

/// Softmax policy over a perceptron's logits.
#[derive(Debug, Clone)]
pub struct SoftmaxPolicy {
    net: Mlp,
}

impl SoftmaxPolicy {
    pub fn new(
        state_size: usize,
        hidden: &[usize],
        action_size: usize,
        rng: &mut StdRng,
    ) -> Result<Self, ApproxError> {
        let sizes = [&[state_size][..], hidden, &[action_size][..]].concat();
        Ok(Self {
            net: Mlp::new(&sizes, rng)?,
        })
    }
}

pub fn softmax(logits: &Array1<f64>) -> Array1<f64> {
    let max = logits.fold(f64::NEG_INFINITY, |m, &x| m.max(x));
    let exp = logits.mapv(|x| (x - max).exp());
    let sum = exp.sum();
    exp / sum
}

/// `-log softmax(logits)[index]`, computed through log-sum-exp.
fn neg_log_prob(logits: &Array1<f64>, index: usize) -> f64 {
    let max = logits.fold(f64::NEG_INFINITY, |m, &x| m.max(x));
    let lse = max + logits.mapv(|x| (x - max).exp()).sum().ln();
    lse - logits[index]
}

impl PolicyApproximator for SoftmaxPolicy {
    fn action_size(&self) -> usize {
        self.net.output_size()
    }

    fn predict(&self, state: &[f64]) -> Result<Vec<f64>, ApproxError> {
        Ok(softmax(&self.net.forward(state)?).to_vec())
    }

    fn update(
        &mut self,
        state: &[f64],
        action: &[f64],
        advantage: f64,
        learning_rate: f64,
    ) -> Result<f64, ApproxError> {
        let index = hot_index(action, self.action_size())?;
        let target = Array1::from_vec(action.to_vec());

        self.net.train_step(state, learning_rate, |logits| {
            let loss = advantage * neg_log_prob(logits, index);
            let grad = (softmax(logits) - &target) * advantage;
            (loss, grad)
        })
    }
}
