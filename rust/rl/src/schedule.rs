//! Policy learning rate per episode.

/// `Decaying` yields `max(floor, initial × decay^episode)`; the rate is read once per episode and
/// held for all of its steps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LearningRateSchedule {
    Fixed(f64),
    Decaying { initial: f64, decay: f64, floor: f64 },
}

impl LearningRateSchedule {
    pub fn rate(&self, episode: usize) -> f64 {
        match *self {
            LearningRateSchedule::Fixed(rate) => rate,
            LearningRateSchedule::Decaying {
                initial,
                decay,
                floor,
            } => floor.max(initial * decay.powf(episode as f64)),
        }
    }
}
