//! Error taxonomy for a single scaling cycle.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for engine operations.
pub type ScaleResult<T> = Result<T, ScaleError>;

/// Errors that abort one target's scaling cycle.
///
/// None of these are fatal to the process; the periodic driver retries
/// on its next tick.
#[derive(Debug, Error)]
pub enum ScaleError {
    #[error("no pods matched target {0}")]
    NoMatchingPods(String),

    #[error("insufficient data for forecast: have {have} samples, need {need}")]
    InsufficientData { have: usize, need: usize },

    #[error("metrics provider failed: {0}")]
    MetricsUnavailable(String),

    #[error("orchestrator unavailable: {0}")]
    OrchestratorUnavailable(String),

    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("scaling cycle cancelled")]
    Cancelled,

    #[error("external call timed out after {0:?}")]
    Timeout(Duration),
}

impl ScaleError {
    /// Build a `ConfigInvalid` from anything printable.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigInvalid(msg.into())
    }
}
