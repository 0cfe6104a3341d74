//! Policy-gradient training for discrete-action control tasks.
//!
//! Two learners share one controller: Monte-Carlo REINFORCE with a learned
//! value baseline, and one-step online actor-critic with TD(0) targets.

pub mod approximators;
pub mod config;
pub mod controller;
pub mod environments;
pub mod error;
pub mod estimators;
pub mod history;
pub mod schedule;
pub mod telemetry;
pub mod trajectory;

pub use config::{Algorithm, TrainingConfig};
pub use controller::{TrainingController, TrainingReport, TrainingState};
pub use error::{PgError, PgResult};
