use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use pgrl::approximators::{SoftmaxPolicy, ValueNetwork};
use pgrl::environments::cartpole::{CartPole, CartPoleConfig};
use pgrl::environments::gym_adapter::{GymAdapter, GymConfig};
use pgrl::environments::Environment;
use pgrl::telemetry::{JsonLinesSink, NullSink, TelemetrySink};
use pgrl::{Algorithm, TrainingConfig, TrainingController, TrainingState};
use rand::prelude::*;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pgrl", about = "Policy-gradient learners for discrete-action control")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Train until the task is solved or the episode budget runs out.
    Train(TrainArgs),
}

#[derive(Clone, Copy, ValueEnum)]
enum EnvKind {
    /// Built-in CartPole-v1 dynamics.
    Cartpole,
    /// Remote environment on a gymnasium-http-api server.
    Gym,
}

#[derive(clap::Args)]
struct TrainArgs {
    #[arg(long, value_enum)]
    algorithm: Option<Algorithm>,

    /// JSON file with any subset of the training configuration.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "cartpole")]
    env: EnvKind,

    #[arg(long, default_value = "http://127.0.0.1:40004")]
    gym_url: String,

    #[arg(long, default_value = "CartPole-v1")]
    gym_env_id: String,

    #[arg(long)]
    max_episodes: Option<usize>,

    #[arg(long)]
    seed: Option<u64>,

    /// JSON-lines metrics output.
    #[arg(long)]
    telemetry: Option<PathBuf>,
}

fn load_config(args: &TrainArgs) -> Result<TrainingConfig> {
    let mut config = match &args.config {
        Some(path) => TrainingConfig::from_json_file(path)?,
        None => TrainingConfig::for_algorithm(args.algorithm.unwrap_or(Algorithm::Reinforce)),
    };

    if let Some(algorithm) = args.algorithm {
        if args.config.is_some() && algorithm != config.algorithm {
            info!(?algorithm, "overriding algorithm from config file");
        }
        config.algorithm = algorithm;
    }
    if let Some(n) = args.max_episodes {
        config.max_episodes = n;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if args.telemetry.is_some() {
        config.telemetry_path = args.telemetry.clone();
    }

    config.validate()?;
    Ok(config)
}

fn train(args: TrainArgs) -> Result<TrainingState> {
    let config = load_config(&args)?;

    let env: Box<dyn Environment> = match args.env {
        EnvKind::Cartpole => Box::new(CartPole::new(CartPoleConfig {
            seed: config.seed,
            ..Default::default()
        })),
        EnvKind::Gym => Box::new(
            GymAdapter::new(&GymConfig {
                api_url: args.gym_url.clone(),
                env_id: args.gym_env_id.clone(),
                seed: Some(config.seed),
                ..Default::default()
            })
            .with_context(|| format!("connecting to {}", args.gym_url))?,
        ),
    };

    let telemetry: Box<dyn TelemetrySink> = match &config.telemetry_path {
        Some(path) => Box::new(
            JsonLinesSink::create(path)
                .with_context(|| format!("creating telemetry file {}", path.display()))?,
        ),
        None => Box::new(NullSink),
    };

    // One stream for parameter initialisation and action sampling, seeded once.
    let mut rng = StdRng::seed_from_u64(config.seed);
    let policy = SoftmaxPolicy::new(
        config.state_size,
        &config.policy_hidden,
        config.action_size,
        &mut rng,
    )?;
    let value = ValueNetwork::new(
        config.state_size,
        &config.value_hidden,
        config.value_learning_rate,
        &mut rng,
    )?;

    let controller = TrainingController::new(&config, env, policy, value, telemetry, rng)?;
    let report = controller.run()?;

    info!(
        outcome = ?report.outcome,
        episodes = report.episodes_run,
        final_average = ?report.final_average,
        "training finished"
    );
    Ok(report.outcome)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Train(args) => match train(args)? {
            TrainingState::Diverged { episode, what } => {
                bail!("training diverged in episode {episode}: {what}")
            }
            _ => Ok(()),
        },
    }
}
