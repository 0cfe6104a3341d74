//! Dense multilayer perceptron with single-sample backpropagation.

use super::adam::{Adam, Moments};
use super::ApproxError;
use itertools::Itertools;
use ndarray::{Array1, Array2, Axis, Ix1, Ix2};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::rngs::StdRng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    ReLU,
    Linear,
}

impl Activation {
    fn apply(&self, x: f64) -> f64 {
        match self {
            Activation::ReLU => x.max(0.),
            Activation::Linear => x,
        }
    }

    /// Derivative expressed through the activation's output.
    fn derivative_at_output(&self, y: f64) -> f64 {
        match self {
            Activation::ReLU => {
                if y > 0. {
                    1.
                } else {
                    0.
                }
            }
            Activation::Linear => 1.,
        }
    }
}

#[derive(Debug, Clone)]
struct Layer {
    weights: Array2<f64>,
    biases: Array1<f64>,
    activation: Activation,
    weight_moments: Moments<Ix2>,
    bias_moments: Moments<Ix1>,
}

impl Layer {
    /// Xavier (Glorot) uniform weights, zero biases.
    fn new(n_in: usize, n_out: usize, activation: Activation, rng: &mut StdRng) -> Self {
        let limit = (6. / (n_in + n_out) as f64).sqrt();
        let weights = Array2::random_using((n_in, n_out), Uniform::new(-limit, limit), rng);
        let biases = Array1::zeros(n_out);

        Self {
            weight_moments: Moments::zeros(weights.raw_dim()),
            bias_moments: Moments::zeros(biases.raw_dim()),
            weights,
            biases,
            activation,
        }
    }

    fn forward(&self, input: &Array1<f64>) -> Array1<f64> {
        let z = input.dot(&self.weights) + &self.biases;
        z.mapv(|x| self.activation.apply(x))
    }
}

#[derive(Debug, Clone)]
pub struct Mlp {
    layers: Vec<Layer>,
    adam: Adam,
}

impl Mlp {
    /// `sizes` lists input width, hidden widths and output width. Hidden layers use ReLU, the
    /// output layer is linear.
    pub fn new(sizes: &[usize], rng: &mut StdRng) -> Result<Self, ApproxError> {
        if sizes.len() < 2 || sizes.contains(&0) {
            return Err(ApproxError::Layout(sizes.to_vec()));
        }

        let last = sizes.len() - 2;
        let layers = sizes
            .iter()
            .tuple_windows()
            .enumerate()
            .map(|(i, (&n_in, &n_out))| {
                let activation = if i == last {
                    Activation::Linear
                } else {
                    Activation::ReLU
                };
                Layer::new(n_in, n_out, activation, rng)
            })
            .collect();

        Ok(Self {
            layers,
            adam: Adam::default(),
        })
    }

    pub fn input_size(&self) -> usize {
        self.layers[0].weights.nrows()
    }

    pub fn output_size(&self) -> usize {
        self.layers[self.layers.len() - 1].weights.ncols()
    }

    pub fn forward(&self, input: &[f64]) -> Result<Array1<f64>, ApproxError> {
        let input = self.check_input(input)?;
        Ok(self
            .layers
            .iter()
            .fold(input, |x, layer| layer.forward(&x)))
    }

    /// Runs one forward pass, asks `loss_fn` for the loss and its gradient with respect to the
    /// network output, then backpropagates and takes one Adam step. Returns the loss.
    pub fn train_step<F>(
        &mut self,
        input: &[f64],
        learning_rate: f64,
        loss_fn: F,
    ) -> Result<f64, ApproxError>
    where
        F: FnOnce(&Array1<f64>) -> (f64, Array1<f64>),
    {
        let input = self.check_input(input)?;

        let mut activations = Vec::with_capacity(self.layers.len() + 1);
        activations.push(input);
        for layer in &self.layers {
            let next = layer.forward(&activations[activations.len() - 1]);
            activations.push(next);
        }

        let (loss, mut grad) = loss_fn(&activations[activations.len() - 1]);

        self.adam.tick();
        for (i, layer) in self.layers.iter_mut().enumerate().rev() {
            let output = &activations[i + 1];
            let delta = &grad * &output.mapv(|y| layer.activation.derivative_at_output(y));

            let input = activations[i].view().insert_axis(Axis(1));
            let grad_w = input.dot(&delta.view().insert_axis(Axis(0)));
            // Gradient for the layer below uses the weights before this step.
            grad = layer.weights.dot(&delta);

            self.adam
                .apply(&mut layer.weights, &grad_w, &mut layer.weight_moments, learning_rate);
            self.adam
                .apply(&mut layer.biases, &delta, &mut layer.bias_moments, learning_rate);
        }

        Ok(loss)
    }

    fn check_input(&self, input: &[f64]) -> Result<Array1<f64>, ApproxError> {
        if input.len() != self.input_size() {
            return Err(ApproxError::StateSize {
                expected: self.input_size(),
                got: input.len(),
            });
        }
        Ok(Array1::from_vec(input.to_vec()))
    }
}
