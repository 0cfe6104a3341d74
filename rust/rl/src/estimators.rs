//! Training targets from transitions, and the update calls they drive.
//!
//! Two temporal policies, chosen at construction:
//! - [`MonteCarloBaseline`]: discounted returns of a finished episode, baseline-corrected by the
//!   value approximator, replayed one transition at a time in increasing `t`.
//! - [`OnlineTd`]: TD(0) targets per step, with the policy's advantage scaled by the
//!   per-episode eligibility discount.

use crate::approximators::{PolicyApproximator, ValueApproximator};
use crate::error::{ensure_finite, PgResult};
use crate::telemetry::RunningMean;
use crate::trajectory::{Episode, Transition};
use tracing::debug;

/// `R_t = Σ_k γ^k · r_{t+k}` for every `t`, accumulated from the end of the episode.
/// Ref: Sutton & Barto 2018, eq. 3.9.
pub fn discounted_returns(rewards: &[f64], gamma: f64) -> Vec<f64> {
    let mut returns = vec![0.; rewards.len()];
    let mut g = 0.;
    for t in (0..rewards.len()).rev() {
        g = rewards[t] + gamma * g;
        returns[t] = g;
    }
    returns
}

/// `r + γ·V(s')`, with `V(s') = 0` past a terminal state.
pub fn td_target(reward: f64, gamma: f64, next_value: Option<f64>) -> f64 {
    reward + gamma * next_value.unwrap_or(0.)
}

/// Per-episode cumulative discount `I`: 1 at the first step, `γ^t` at step `t`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EligibilityDiscount {
    value: f64,
    gamma: f64,
}

impl EligibilityDiscount {
    pub fn new(gamma: f64) -> Self {
        Self { value: 1., gamma }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn advance(&mut self) {
        self.value *= self.gamma;
    }
}

/// Running loss averages reported per episode.
#[derive(Debug, Clone, Default)]
pub struct Losses {
    pub policy: RunningMean,
    pub value: RunningMean,
}

impl Losses {
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonteCarloBaseline {
    pub gamma: f64,
}

impl MonteCarloBaseline {
    /// For each `t` in order: `A_t = R_t − V(s_t)` with the value parameters as left by step
    /// `t − 1`, then a value step toward `R_t`, then a policy step weighted by `A_t`.
    pub fn replay<P, V>(
        &self,
        episode: &Episode,
        policy: &mut P,
        value: &mut V,
        learning_rate: f64,
        losses: &mut Losses,
    ) -> PgResult<()>
    where
        P: PolicyApproximator + ?Sized,
        V: ValueApproximator + ?Sized,
    {
        let returns = discounted_returns(&episode.rewards(), self.gamma);

        for (t, (transition, &ret)) in episode.transitions.iter().zip(&returns).enumerate() {
            let baseline = ensure_finite("value estimate", value.predict(&transition.state)?)?;
            let advantage = ret - baseline;

            let value_loss = ensure_finite("value loss", value.update(&transition.state, ret)?)?;
            let policy_loss = ensure_finite(
                "policy loss",
                policy.update(&transition.state, &transition.action, advantage, learning_rate)?,
            )?;

            debug!(t, ret, advantage, value_loss, policy_loss, "replayed transition");
            losses.value.push(value_loss);
            losses.policy.push(policy_loss);
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OnlineTd {
    pub gamma: f64,
}

impl OnlineTd {
    pub fn eligibility(&self) -> EligibilityDiscount {
        EligibilityDiscount::new(self.gamma)
    }

    /// One actor-critic step for a single transition. Both values are read before either
    /// approximator moves; the policy's advantage is `td_error × I`, after which `I` advances.
    pub fn update<P, V>(
        &self,
        transition: &Transition,
        eligibility: &mut EligibilityDiscount,
        policy: &mut P,
        value: &mut V,
        learning_rate: f64,
        losses: &mut Losses,
    ) -> PgResult<()>
    where
        P: PolicyApproximator + ?Sized,
        V: ValueApproximator + ?Sized,
    {
        let v_s = ensure_finite("value estimate", value.predict(&transition.state)?)?;
        let v_next = if transition.done {
            None
        } else {
            Some(ensure_finite(
                "value estimate",
                value.predict(&transition.next_state)?,
            )?)
        };

        let target = td_target(transition.reward, self.gamma, v_next);
        let td_error = target - v_s;

        let value_loss = ensure_finite("value loss", value.update(&transition.state, target)?)?;
        let policy_loss = ensure_finite(
            "policy loss",
            policy.update(
                &transition.state,
                &transition.action,
                td_error * eligibility.value(),
                learning_rate,
            )?,
        )?;

        debug!(target, td_error, i = eligibility.value(), value_loss, policy_loss, "td step");
        losses.value.push(value_loss);
        losses.policy.push(policy_loss);
        eligibility.advance();

        Ok(())
    }
}

/// Target computation strategy, which also fixes the collection mode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Estimator {
    /// Episodic collection, replay after the episode.
    MonteCarloBaseline(MonteCarloBaseline),
    /// Streaming collection, update after every step.
    OnlineTd(OnlineTd),
}

impl Estimator {
    pub fn gamma(&self) -> f64 {
        match self {
            Estimator::MonteCarloBaseline(e) => e.gamma,
            Estimator::OnlineTd(e) => e.gamma,
        }
    }

    /// Whether loss averages restart with every episode (online) or span the run (episodic).
    pub fn per_episode_losses(&self) -> bool {
        matches!(self, Estimator::OnlineTd(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approximators::{one_hot, ApproxError};
    use float_eq::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        ValuePredict(f64),
        ValueUpdate(f64, f64),
        PolicyUpdate(f64, f64, f64),
    }

    type Log = Rc<RefCell<Vec<Call>>>;

    /// Predicts `bias + state[0]`; every update adds one to `bias`.
    struct CountingValue {
        bias: f64,
        log: Log,
    }

    impl ValueApproximator for CountingValue {
        fn predict(&self, state: &[f64]) -> Result<f64, ApproxError> {
            let v = self.bias + state[0];
            self.log.borrow_mut().push(Call::ValuePredict(v));
            Ok(v)
        }

        fn update(&mut self, state: &[f64], target: f64) -> Result<f64, ApproxError> {
            self.log.borrow_mut().push(Call::ValueUpdate(state[0], target));
            let err = self.bias + state[0] - target;
            self.bias += 1.;
            Ok(err * err)
        }
    }

    struct RecordingPolicy {
        log: Log,
    }

    impl PolicyApproximator for RecordingPolicy {
        fn action_size(&self) -> usize {
            2
        }

        fn predict(&self, _state: &[f64]) -> Result<Vec<f64>, ApproxError> {
            Ok(vec![0.5, 0.5])
        }

        fn update(
            &mut self,
            state: &[f64],
            _action: &[f64],
            advantage: f64,
            learning_rate: f64,
        ) -> Result<f64, ApproxError> {
            self.log
                .borrow_mut()
                .push(Call::PolicyUpdate(state[0], advantage, learning_rate));
            Ok(advantage)
        }
    }

    fn transition(s: f64, reward: f64, done: bool) -> Transition {
        Transition {
            state: vec![s],
            action: one_hot(0, 2).unwrap(),
            reward,
            next_state: vec![s + 1.],
            done,
        }
    }

    #[test]
    fn discounted_returns_half_discount() {
        let r = discounted_returns(&[1., 1., 1.], 0.5);
        assert_float_eq!(r, vec![1.75, 1.5, 1.0], abs_all <= 1e-12);
    }

    #[test]
    fn discounted_returns_empty_and_undiscounted() {
        assert!(discounted_returns(&[], 0.99).is_empty());
        assert_float_eq!(
            discounted_returns(&[1., 2., 3.], 1.0),
            vec![6., 5., 3.],
            abs_all <= 1e-12
        );
    }

    #[test]
    fn eligibility_after_three_steps() {
        let mut i = EligibilityDiscount::new(0.9);
        assert_float_eq!(i.value(), 1.0, abs <= 0.);
        for _ in 0..3 {
            i.advance();
        }
        assert_float_eq!(i.value(), 0.729, abs <= 1e-12);
    }

    #[test]
    fn td_target_cuts_bootstrap_at_terminal() {
        assert_float_eq!(td_target(1., 0.9, Some(2.)), 2.8, abs <= 1e-12);
        assert_float_eq!(td_target(1., 0.9, None), 1.0, abs <= 0.);
    }

    #[test]
    fn replay_sees_earlier_value_updates() {
        let log = Log::default();
        let value = &mut CountingValue {
            bias: 0.,
            log: Rc::clone(&log),
        };
        let policy = &mut RecordingPolicy { log: Rc::clone(&log) };
        let episode = Episode {
            transitions: vec![
                transition(0., 1., false),
                transition(1., 1., false),
                transition(2., 1., true),
            ],
            truncated: false,
        };
        let mut losses = Losses::default();

        MonteCarloBaseline { gamma: 0.5 }
            .replay(&episode, policy, value, 0.001, &mut losses)
            .unwrap();

        // V(s_t) = t (bias after t updates) + t (state) = 2t.
        assert_eq!(
            *log.borrow(),
            vec![
                Call::ValuePredict(0.),
                Call::ValueUpdate(0., 1.75),
                Call::PolicyUpdate(0., 1.75, 0.001),
                Call::ValuePredict(2.),
                Call::ValueUpdate(1., 1.5),
                Call::PolicyUpdate(1., -0.5, 0.001),
                Call::ValuePredict(4.),
                Call::ValueUpdate(2., 1.0),
                Call::PolicyUpdate(2., -3.0, 0.001),
            ]
        );
        assert_eq!(losses.policy.count(), 3);
        assert_eq!(losses.value.count(), 3);
    }

    #[test]
    fn td_scales_advantage_by_eligibility() {
        let log = Log::default();
        let value = &mut CountingValue {
            bias: 0.,
            log: Rc::clone(&log),
        };
        let policy = &mut RecordingPolicy { log: Rc::clone(&log) };
        let td = OnlineTd { gamma: 0.9 };
        let mut i = td.eligibility();
        let mut losses = Losses::default();

        td.update(&transition(0., 1., false), &mut i, policy, value, 0.01, &mut losses)
            .unwrap();
        td.update(&transition(1., 1., true), &mut i, policy, value, 0.01, &mut losses)
            .unwrap();

        // Step 0: V(s)=0, V(s')=1, target=1.9, error=1.9, I=1.
        // Step 1: bias=1 so V(s)=2, terminal so target=1, error=-1, I=0.9.
        let calls = log.borrow();
        assert_eq!(calls[0], Call::ValuePredict(0.));
        assert_eq!(calls[1], Call::ValuePredict(1.));
        match calls[2] {
            Call::ValueUpdate(s, target) => {
                assert_float_eq!(s, 0., abs <= 0.);
                assert_float_eq!(target, 1.9, abs <= 1e-12);
            }
            ref c => panic!("unexpected {c:?}"),
        }
        match calls[3] {
            Call::PolicyUpdate(_, advantage, lr) => {
                assert_float_eq!(advantage, 1.9, abs <= 1e-12);
                assert_float_eq!(lr, 0.01, abs <= 0.);
            }
            ref c => panic!("unexpected {c:?}"),
        }
        assert_eq!(calls[4], Call::ValuePredict(2.));
        assert_eq!(calls[5], Call::ValueUpdate(1., 1.));
        match calls[6] {
            Call::PolicyUpdate(_, advantage, _) => assert_float_eq!(advantage, -0.9, abs <= 1e-12),
            ref c => panic!("unexpected {c:?}"),
        }
        assert_eq!(calls.len(), 7);
        assert_float_eq!(i.value(), 0.81, abs <= 1e-12);
    }

    #[test]
    fn non_finite_loss_is_divergence() {
        struct NanValue;

        impl ValueApproximator for NanValue {
            fn predict(&self, _: &[f64]) -> Result<f64, ApproxError> {
                Ok(0.)
            }

            fn update(&mut self, _: &[f64], _: f64) -> Result<f64, ApproxError> {
                Ok(f64::NAN)
            }
        }

        let policy = &mut RecordingPolicy {
            log: Log::default(),
        };
        let episode = Episode {
            transitions: vec![transition(0., 1., true)],
            truncated: false,
        };

        let err = MonteCarloBaseline { gamma: 0.99 }
            .replay(&episode, policy, &mut NanValue, 0.001, &mut Losses::default())
            .unwrap_err();

        assert!(matches!(err, crate::PgError::Divergence(what) if what.starts_with("value loss")));
    }
}
