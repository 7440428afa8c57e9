//! tidescale-forecast: short-horizon load forecasting.
//!
//! # Model
//!
//! ```text
//! series   = load samples, oldest first
//! diffed   = difference(series, d)
//! coef[i]  = autocorrelation(diffed, i + 1)        for i in 0..p
//! ar       = Σ coef[j] * diffed[len - 1 - j]        for j in 0..p
//! forecast = ar + d * series.last()                 (every step)
//! stamp[k] = last_timestamp + (k + 1) * last_interval
//! ```
//!
//! `q` is accepted for configuration symmetry; no moving-average term is
//! fitted. Re-integration adds the last raw value `d` times instead of a
//! cumulative sum over differencing levels.
//!
//! [`RemoteForecaster`] is the alternative backend that asks an external
//! prediction service over HTTP; [`ForecastBackend`] picks one of the two
//! from the engine config.

pub mod backend;
pub mod error;
pub mod forecaster;
pub mod remote;

pub use backend::ForecastBackend;
pub use error::ForecastError;
pub use forecaster::LoadForecaster;
pub use remote::{PredictionResponse, RemoteForecaster};
