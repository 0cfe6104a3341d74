//! Environment interaction: full-episode collection and single-step streaming.

use crate::approximators::{one_hot, PolicyApproximator};
use crate::environments::Environment;
use crate::error::{ensure_finite, PgError, PgResult};
use rand::distributions::WeightedIndex;
use rand::prelude::*;
use std::cell::RefCell;
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub state: Vec<f64>,
    /// One-hot over the action space.
    pub action: Vec<f64>,
    pub reward: f64,
    pub next_state: Vec<f64>,
    pub done: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Episode {
    pub transitions: Vec<Transition>,
    /// Ended by the step budget rather than a terminal signal.
    pub truncated: bool,
}

impl Episode {
    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    pub fn rewards(&self) -> Vec<f64> {
        self.transitions.iter().map(|t| t.reward).collect()
    }

    pub fn total_reward(&self) -> f64 {
        self.transitions.iter().map(|t| t.reward).sum()
    }
}

/// What remains of a streamed episode once its transitions are consumed.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EpisodeSummary {
    pub total_reward: f64,
    pub steps: usize,
    pub truncated: bool,
}

/// Draws an action index from a categorical distribution.
pub fn sample_action<R: Rng + ?Sized>(distribution: &[f64], rng: &mut R) -> PgResult<usize> {
    for &p in distribution {
        ensure_finite("action probability", p)?;
    }
    let dist = WeightedIndex::new(distribution)
        .map_err(|e| PgError::Divergence(format!("action distribution {distribution:?}: {e}")))?;
    Ok(dist.sample(rng))
}

#[derive(Debug, Clone, Copy)]
pub struct Collector {
    max_steps: usize,
}

impl Collector {
    pub fn new(max_steps: usize) -> Self {
        Self { max_steps }
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    /// Runs one episode under the current policy without touching any parameters.
    pub fn collect_episode<E, P, R>(&self, env: &mut E, policy: &P, rng: &mut R) -> PgResult<Episode>
    where
        E: Environment + ?Sized,
        P: PolicyApproximator + ?Sized,
        R: Rng + ?Sized,
    {
        let mut episode = Episode::default();
        let summary = self.drive(
            env,
            |s| policy.predict(s).map_err(PgError::from),
            rng,
            |t| {
                episode.transitions.push(t);
                Ok(())
            },
        )?;
        episode.truncated = summary.truncated;

        Ok(episode)
    }

    /// Runs one episode, handing every transition to `on_step` before the next action is chosen.
    /// Nothing is buffered; the next action is sampled from whatever the policy predicts after
    /// `on_step` returns.
    pub fn stream_episode<E, P, R, F>(
        &self,
        env: &mut E,
        policy: &mut P,
        rng: &mut R,
        mut on_step: F,
    ) -> PgResult<EpisodeSummary>
    where
        E: Environment + ?Sized,
        P: PolicyApproximator + ?Sized,
        R: Rng + ?Sized,
        F: FnMut(&mut P, Transition) -> PgResult<()>,
    {
        let policy = RefCell::new(policy);
        self.drive(
            env,
            |s| policy.borrow().predict(s).map_err(PgError::from),
            rng,
            |t| on_step(&mut **policy.borrow_mut(), t),
        )
    }

    fn drive<E, R, D, F>(
        &self,
        env: &mut E,
        mut distribution: D,
        rng: &mut R,
        mut on_step: F,
    ) -> PgResult<EpisodeSummary>
    where
        E: Environment + ?Sized,
        R: Rng + ?Sized,
        D: FnMut(&[f64]) -> PgResult<Vec<f64>>,
        F: FnMut(Transition) -> PgResult<()>,
    {
        let n_a = env.action_size();
        let mut state = env.reset()?;
        let mut summary = EpisodeSummary::default();

        for _ in 0..self.max_steps {
            let action = sample_action(&distribution(&state)?, rng)?;
            let out = env.step(action)?;

            summary.total_reward += out.reward;
            summary.steps += 1;

            let done = out.done;
            let transition = Transition {
                state,
                action: one_hot(action, n_a)?,
                reward: out.reward,
                next_state: out.next_state.clone(),
                done,
            };
            on_step(transition)?;

            if done {
                return Ok(summary);
            }
            state = out.next_state;
        }

        warn!(
            env = env.name(),
            steps = self.max_steps,
            "step budget exhausted before a terminal state"
        );
        summary.truncated = true;
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approximators::{hot_index, ApproxError};
    use crate::environments::{EnvError, StepOutcome};
    use float_eq::*;

    /// Never terminates; state is the step counter.
    struct Endless {
        t: usize,
        resets: usize,
    }

    impl Environment for Endless {
        fn name(&self) -> &str {
            "endless"
        }

        fn state_size(&self) -> usize {
            1
        }

        fn action_size(&self) -> usize {
            3
        }

        fn reset(&mut self) -> Result<Vec<f64>, EnvError> {
            self.t = 0;
            self.resets += 1;
            Ok(vec![0.])
        }

        fn step(&mut self, _action: usize) -> Result<StepOutcome, EnvError> {
            self.t += 1;
            Ok(StepOutcome {
                next_state: vec![self.t as f64],
                reward: 0.5,
                done: self.t == 1000,
            })
        }
    }

    struct Fixed(Vec<f64>);

    impl PolicyApproximator for Fixed {
        fn action_size(&self) -> usize {
            self.0.len()
        }

        fn predict(&self, _state: &[f64]) -> Result<Vec<f64>, ApproxError> {
            Ok(self.0.clone())
        }

        fn update(&mut self, _: &[f64], _: &[f64], _: f64, _: f64) -> Result<f64, ApproxError> {
            Ok(0.)
        }
    }

    #[test]
    fn step_budget_ends_episode_cleanly() {
        let env = &mut Endless { t: 0, resets: 0 };
        let rng = &mut StdRng::seed_from_u64(1);

        let ep = Collector::new(25)
            .collect_episode(env, &Fixed(vec![0.2, 0.3, 0.5]), rng)
            .unwrap();

        assert_eq!(ep.len(), 25);
        assert!(ep.truncated);
        assert!(ep.transitions.iter().all(|t| !t.done));
        assert_float_eq!(ep.total_reward(), 12.5, abs <= 1e-12);
        assert_eq!(env.resets, 1);
    }

    #[test]
    fn transitions_chain_states() {
        let env = &mut Endless { t: 0, resets: 0 };
        let rng = &mut StdRng::seed_from_u64(1);

        let ep = Collector::new(5)
            .collect_episode(env, &Fixed(vec![0.2, 0.3, 0.5]), rng)
            .unwrap();

        for (t, tr) in ep.transitions.iter().enumerate() {
            assert_eq!(tr.state, vec![t as f64]);
            assert_eq!(tr.next_state, vec![(t + 1) as f64]);
            assert!(hot_index(&tr.action, 3).is_ok());
        }
    }

    #[test]
    fn terminal_signal_stops_streaming() {
        let env = &mut Endless { t: 0, resets: 0 };
        let rng = &mut StdRng::seed_from_u64(1);
        let mut seen = 0;

        let summary = Collector::new(5000)
            .stream_episode(env, &mut Fixed(vec![1., 0., 0.]), rng, |_, t| {
                seen += 1;
                assert_eq!(t.action, vec![1., 0., 0.]);
                Ok(())
            })
            .unwrap();

        assert_eq!(seen, 1000);
        assert_eq!(summary.steps, 1000);
        assert!(!summary.truncated);
    }

    #[test]
    fn handler_sees_updates_before_next_action() {
        let env = &mut Endless { t: 0, resets: 0 };
        let rng = &mut StdRng::seed_from_u64(1);
        let policy = &mut Fixed(vec![1., 0., 0.]);
        let mut actions = vec![];

        Collector::new(3)
            .stream_episode(env, policy, rng, |p, t| {
                actions.push(hot_index(&t.action, 3).unwrap());
                // Shift all mass to the next action.
                p.0.rotate_right(1);
                Ok(())
            })
            .unwrap();

        assert_eq!(actions, vec![0, 1, 2]);
    }

    #[test]
    fn sampling_is_categorical_not_greedy() {
        let rng = &mut StdRng::seed_from_u64(2718);
        let p = [0.2, 0.8];
        let n = 10000;

        let ones = (0..n).filter(|_| sample_action(&p, rng).unwrap() == 1).count();

        assert_float_eq!(ones as f64 / n as f64, 0.8, abs <= 2e-2);
    }

    #[test]
    fn non_finite_distribution_is_divergence() {
        let rng = &mut StdRng::seed_from_u64(1);
        assert!(matches!(
            sample_action(&[f64::NAN, 0.5], rng),
            Err(PgError::Divergence(_))
        ));
        assert!(matches!(
            sample_action(&[0., 0.], rng),
            Err(PgError::Divergence(_))
        ));
    }
}
