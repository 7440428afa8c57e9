//! Forecast backend selection.

use tidescale_core::{EngineConfig, ForecastOrders, ScaleError, ScaleResult};

use crate::remote::RemoteForecaster;

/// Where an engine's load forecasts come from.
#[derive(Debug, Clone)]
pub enum ForecastBackend {
    /// A [`LoadForecaster`](crate::LoadForecaster) per workload, fed by the
    /// engine's own samples.
    Embedded(ForecastOrders),
    /// An external prediction service queried every cycle.
    Remote(RemoteForecaster),
}

impl ForecastBackend {
    /// The remote service when `predictor_url` is set, else the embedded
    /// model with the configured orders.
    pub fn from_config(config: &EngineConfig) -> ScaleResult<Self> {
        match &config.predictor_url {
            Some(url) => RemoteForecaster::new(url, config.call_timeout()?)
                .map(Self::Remote)
                .map_err(|e| ScaleError::config(e.to_string())),
            None => Ok(Self::Embedded(config.forecast)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Embedded(_) => "embedded",
            Self::Remote(_) => "remote",
        }
    }
}
