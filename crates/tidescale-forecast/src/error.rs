//! Forecasting errors.

use thiserror::Error;

use tidescale_core::ScaleError;

#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("insufficient data points for prediction: have {have}, need {need}")]
    InsufficientData { have: usize, need: usize },

    #[error("prediction service: {0}")]
    Remote(String),
}

impl From<ForecastError> for ScaleError {
    fn from(e: ForecastError) -> Self {
        match e {
            ForecastError::InsufficientData { have, need } => {
                ScaleError::InsufficientData { have, need }
            }
            ForecastError::Remote(msg) => {
                ScaleError::MetricsUnavailable(format!("prediction service: {msg}"))
            }
        }
    }
}
