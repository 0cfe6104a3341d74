//! Adam (Adaptive Moment Estimation).
//! Ref: https://arxiv.org/abs/1412.6980

use ndarray::{Array, Dimension, Zip};

#[derive(Debug, Clone)]
pub struct Adam {
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
    t: i32,
}

impl Default for Adam {
    fn default() -> Self {
        Self {
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            t: 0,
        }
    }
}

/// First and second moment estimates for one parameter tensor.
#[derive(Debug, Clone)]
pub struct Moments<D: Dimension> {
    m: Array<f64, D>,
    v: Array<f64, D>,
}

impl<D: Dimension> Moments<D> {
    pub fn zeros(shape: D) -> Self {
        Self {
            m: Array::zeros(shape.clone()),
            v: Array::zeros(shape),
        }
    }
}

impl Adam {
    /// Starts a new optimisation step; all tensors touched until the next call share its bias correction.
    pub fn tick(&mut self) {
        self.t = self.t.saturating_add(1);
    }

    pub fn steps(&self) -> i32 {
        self.t
    }

    pub fn apply<D: Dimension>(
        &self,
        param: &mut Array<f64, D>,
        grad: &Array<f64, D>,
        moments: &mut Moments<D>,
        learning_rate: f64,
    ) {
        let (b1, b2, eps) = (self.beta1, self.beta2, self.epsilon);
        let c1 = 1. - b1.powi(self.t.max(1));
        let c2 = 1. - b2.powi(self.t.max(1));

        Zip::from(param)
            .and(grad)
            .and(&mut moments.m)
            .and(&mut moments.v)
            .for_each(|p, &g, m, v| {
                *m = b1 * *m + (1. - b1) * g;
                *v = b2 * *v + (1. - b2) * g * g;
                let m_hat = *m / c1;
                let v_hat = *v / c2;
                *p -= learning_rate * m_hat / (v_hat.sqrt() + eps);
            });
    }
}
