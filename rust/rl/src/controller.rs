//! Episode loop, bookkeeping and termination.

use crate::approximators::{PolicyApproximator, ValueApproximator};
use crate::config::{Algorithm, ConfigError, TrainingConfig};
use crate::environments::Environment;
use crate::error::{PgError, PgResult};
use crate::estimators::{Estimator, Losses, MonteCarloBaseline, OnlineTd};
use crate::history::RewardHistory;
use crate::schedule::LearningRateSchedule;
use crate::telemetry::{self, Metrics, TelemetrySink};
use crate::trajectory::{Collector, EpisodeSummary};
use rand::rngs::StdRng;
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum TrainingState {
    Running,
    /// Trailing average exceeded the threshold after `episode` (0-based).
    Solved { episode: usize },
    /// Episode budget used up without solving.
    Exhausted,
    /// A non-finite loss, value or distribution appeared during `episode`.
    Diverged { episode: usize, what: String },
}

impl TrainingState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TrainingState::Running)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingReport {
    pub outcome: TrainingState,
    pub episodes_run: usize,
    pub episode_rewards: Vec<f64>,
    pub final_average: Option<f64>,
}

/// Owns the environment, both approximators and the random stream for the whole run.
pub struct TrainingController<E, P, V, T> {
    env: E,
    policy: P,
    value: V,
    telemetry: T,
    rng: StdRng,
    estimator: Estimator,
    collector: Collector,
    schedule: LearningRateSchedule,
    history: RewardHistory,
    losses: Losses,
    episode: usize,
    max_episodes: usize,
    solved_threshold: f64,
    state: TrainingState,
}

impl<E, P, V, T> TrainingController<E, P, V, T>
where
    E: Environment,
    P: PolicyApproximator,
    V: ValueApproximator,
    T: TelemetrySink,
{
    /// `rng` must be the same stream that seeded the approximators.
    pub fn new(
        config: &TrainingConfig,
        env: E,
        policy: P,
        value: V,
        telemetry: T,
        rng: StdRng,
    ) -> PgResult<Self> {
        config.validate()?;
        if env.state_size() != config.state_size {
            return Err(ConfigError::Invalid {
                field: "state_size",
                reason: format!(
                    "{} but '{}' produces {}",
                    config.state_size,
                    env.name(),
                    env.state_size()
                ),
            }
            .into());
        }
        if env.action_size() != config.action_size || policy.action_size() != config.action_size {
            return Err(ConfigError::Invalid {
                field: "action_size",
                reason: format!(
                    "{} but '{}' has {} and the policy {}",
                    config.action_size,
                    env.name(),
                    env.action_size(),
                    policy.action_size()
                ),
            }
            .into());
        }

        let gamma = config.discount_factor;
        let (estimator, schedule) = match config.algorithm {
            Algorithm::Reinforce => (
                Estimator::MonteCarloBaseline(MonteCarloBaseline { gamma }),
                LearningRateSchedule::Fixed(config.policy_learning_rate),
            ),
            Algorithm::ActorCritic => (
                Estimator::OnlineTd(OnlineTd { gamma }),
                LearningRateSchedule::Decaying {
                    initial: config.policy_learning_rate,
                    decay: config.learning_rate_decay,
                    floor: config.learning_rate_floor,
                },
            ),
        };

        Ok(Self {
            env,
            policy,
            value,
            telemetry,
            rng,
            estimator,
            collector: Collector::new(config.max_steps),
            schedule,
            history: RewardHistory::new(config.average_window),
            losses: Losses::default(),
            episode: 0,
            max_episodes: config.max_episodes,
            solved_threshold: config.solved_threshold,
            state: TrainingState::Running,
        })
    }

    pub fn state(&self) -> &TrainingState {
        &self.state
    }

    pub fn episodes_run(&self) -> usize {
        self.episode
    }

    pub fn history(&self) -> &RewardHistory {
        &self.history
    }

    pub fn telemetry(&self) -> &T {
        &self.telemetry
    }

    /// Runs one episode unless training has already ended.
    pub fn run_episode(&mut self) -> PgResult<&TrainingState> {
        if self.state.is_terminal() {
            return Ok(&self.state);
        }

        let episode = self.episode;
        let mut metrics = Metrics::new();

        match self.episode_body(&mut metrics) {
            Ok(summary) => self.finish_episode(episode, summary, metrics)?,
            Err(PgError::Divergence(what)) => self.diverge(episode, what, metrics)?,
            Err(e) => {
                if let Err(flush) = self.telemetry.flush() {
                    warn!(episode, error = %flush, "telemetry flush failed after episode error");
                }
                return Err(e);
            }
        }

        Ok(&self.state)
    }

    /// Runs until solved, exhausted or diverged, then hands back the run's record.
    pub fn run(mut self) -> PgResult<TrainingReport> {
        info!(
            env = self.env.name(),
            estimator = ?self.estimator,
            max_episodes = self.max_episodes,
            "training started"
        );
        while !self.run_episode()?.is_terminal() {}

        Ok(TrainingReport {
            final_average: self.history.moving_average(),
            outcome: self.state,
            episodes_run: self.episode,
            episode_rewards: self.history.into_totals(),
        })
    }

    /// Collects one episode and applies this estimator's updates. For the episodic learner the
    /// replay is skipped when the episode itself solves the task.
    fn episode_body(&mut self, metrics: &mut Metrics) -> PgResult<EpisodeSummary> {
        let Self {
            env,
            policy,
            value,
            rng,
            estimator,
            collector,
            schedule,
            history,
            losses,
            episode,
            solved_threshold,
            ..
        } = self;

        let learning_rate = schedule.rate(*episode);
        if estimator.per_episode_losses() {
            losses.clear();
        }

        let summary = match estimator {
            Estimator::MonteCarloBaseline(mc) => {
                let trajectory = collector.collect_episode(env, policy, rng)?;
                let summary = EpisodeSummary {
                    total_reward: trajectory.total_reward(),
                    steps: trajectory.len(),
                    truncated: trajectory.truncated,
                };

                let solving = history
                    .average_with(summary.total_reward)
                    .map_or(false, |a| a > *solved_threshold);
                if !solving {
                    mc.replay(&trajectory, policy, value, learning_rate, losses)?;
                }
                summary
            }

            Estimator::OnlineTd(td) => {
                let mut eligibility = td.eligibility();
                metrics.insert(telemetry::POLICY_LEARNING_RATE.to_string(), learning_rate);
                collector.stream_episode(env, policy, rng, |policy, transition| {
                    td.update(
                        &transition,
                        &mut eligibility,
                        policy,
                        value,
                        learning_rate,
                        losses,
                    )
                })?
            }
        };

        Ok(summary)
    }

    fn finish_episode(
        &mut self,
        episode: usize,
        summary: EpisodeSummary,
        mut metrics: Metrics,
    ) -> PgResult<()> {
        self.history.push(summary.total_reward);
        let average = self.history.moving_average();
        self.episode += 1;

        info!(
            steps = summary.steps,
            truncated = summary.truncated,
            "Episode {} Reward: {} Average over {} episodes: {:.2}",
            episode,
            summary.total_reward,
            self.history.window(),
            average.unwrap_or(0.)
        );

        if let Some(m) = self.losses.policy.mean() {
            metrics.insert(telemetry::POLICY_LOSS.to_string(), m);
        }
        if let Some(m) = self.losses.value.mean() {
            metrics.insert(telemetry::VALUE_LOSS.to_string(), m);
        }
        metrics.insert(telemetry::TOTAL_REWARD.to_string(), summary.total_reward);
        metrics.insert(telemetry::STEPS.to_string(), summary.steps as f64);
        if let Some(a) = average {
            metrics.insert(telemetry::AVERAGE_REWARD.to_string(), a);
        }
        self.telemetry.write(episode, &metrics)?;

        if average.map_or(false, |a| a > self.solved_threshold) {
            info!(episode, ?average, "solved");
            self.state = TrainingState::Solved { episode };
        } else if self.episode >= self.max_episodes {
            info!(episodes = self.episode, ?average, "episode budget exhausted");
            self.state = TrainingState::Exhausted;
        }

        if self.state.is_terminal() {
            self.telemetry.flush()?;
        }
        Ok(())
    }

    fn diverge(&mut self, episode: usize, what: String, mut metrics: Metrics) -> PgResult<()> {
        error!(episode, %what, "training diverged");
        self.episode += 1;

        metrics.insert(telemetry::DIVERGENCE.to_string(), 1.);
        self.telemetry.write(episode, &metrics)?;
        self.telemetry.flush()?;

        self.state = TrainingState::Diverged { episode, what };
        Ok(())
    }
}
