//! Per-episode total rewards and the trailing average used as the solved criterion.

/// Append-only, indexed by episode number.
#[derive(Debug, Clone)]
pub struct RewardHistory {
    totals: Vec<f64>,
    window: usize,
}

impl RewardHistory {
    pub fn new(window: usize) -> Self {
        Self {
            totals: Vec::new(),
            window,
        }
    }

    pub fn push(&mut self, total: f64) {
        self.totals.push(total);
    }

    pub fn len(&self) -> usize {
        self.totals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.totals.is_empty()
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn totals(&self) -> &[f64] {
        &self.totals
    }

    pub fn into_totals(self) -> Vec<f64> {
        self.totals
    }

    /// Mean of the trailing `window` totals; `None` until that many episodes have completed.
    pub fn moving_average(&self) -> Option<f64> {
        let n = self.totals.len();
        if self.window == 0 || n < self.window {
            return None;
        }
        let tail = &self.totals[n - self.window..];
        Some(tail.iter().sum::<f64>() / self.window as f64)
    }

    /// The average [`moving_average`](Self::moving_average) would report after pushing `total`.
    pub fn average_with(&self, total: f64) -> Option<f64> {
        let n = self.totals.len() + 1;
        if self.window == 0 || n < self.window {
            return None;
        }
        let tail = &self.totals[n - self.window..];
        Some((tail.iter().sum::<f64>() + total) / self.window as f64)
    }
}
