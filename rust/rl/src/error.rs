use crate::approximators::ApproxError;
use crate::config::ConfigError;
use crate::environments::EnvError;
use thiserror::Error;

pub type PgResult<T> = Result<T, PgError>;

#[derive(Debug, Error)]
pub enum PgError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Approx(#[from] ApproxError),

    #[error(transparent)]
    Env(#[from] EnvError),

    #[error("telemetry sink failed: {0}")]
    Telemetry(#[from] std::io::Error),

    /// A prediction, loss or action distribution stopped being finite.
    #[error("training diverged: non-finite {0}")]
    Divergence(String),
}

/// Passes `value` through, or reports `what` as diverged.
pub fn ensure_finite(what: &str, value: f64) -> PgResult<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(PgError::Divergence(format!("{what} ({value})")))
    }
}
