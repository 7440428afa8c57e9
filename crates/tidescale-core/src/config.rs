//! Engine configuration (`tidescale.toml`).

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{ScaleError, ScaleResult};

/// Tunables for the decision engine and its periodic driver.
///
/// Durations are written as strings: `"500ms"`, `"30s"`, `"5m"`, `"24h"`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// How much history the pattern analyzer and forecaster keep.
    pub history_window: String,
    /// Expected spacing between samples of one workload.
    pub sample_interval: String,
    /// Upper bound on each metrics / orchestrator call.
    pub call_timeout: String,
    /// Drop per-workload state not touched for this long.
    pub idle_eviction: String,
    /// Period of the reconcile loop.
    pub tick_interval: String,
    /// Base URL of an external prediction service. When set, forecasts come
    /// from `GET {predictor_url}/predict` instead of the embedded model.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predictor_url: Option<String>,
    /// Autoregressive model orders.
    pub forecast: ForecastOrders,
}

/// `(p, d, q)` orders of the forecaster.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ForecastOrders {
    pub p: usize,
    pub d: usize,
    pub q: usize,
}

impl Default for ForecastOrders {
    fn default() -> Self {
        Self { p: 2, d: 1, q: 1 }
    }
}

impl ForecastOrders {
    /// Samples needed before a forecast can be produced.
    pub fn min_samples(&self) -> usize {
        self.p + self.d + self.q
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            history_window: "24h".to_string(),
            sample_interval: "5m".to_string(),
            call_timeout: "10s".to_string(),
            idle_eviction: "1h".to_string(),
            tick_interval: "10s".to_string(),
            predictor_url: None,
            forecast: ForecastOrders::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: EngineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn history_window(&self) -> ScaleResult<Duration> {
        parse_duration(&self.history_window)
    }

    pub fn sample_interval(&self) -> ScaleResult<Duration> {
        parse_duration(&self.sample_interval)
    }

    pub fn call_timeout(&self) -> ScaleResult<Duration> {
        parse_duration(&self.call_timeout)
    }

    pub fn idle_eviction(&self) -> ScaleResult<Duration> {
        parse_duration(&self.idle_eviction)
    }

    pub fn tick_interval(&self) -> ScaleResult<Duration> {
        parse_duration(&self.tick_interval)
    }

    /// Number of samples kept per workload: `history_window / sample_interval`.
    pub fn window_size(&self) -> ScaleResult<usize> {
        let window = self.history_window()?;
        let interval = self.sample_interval()?;
        if interval.is_zero() {
            return Err(ScaleError::config("sample_interval must be non-zero"));
        }
        Ok((window.as_millis() / interval.as_millis()) as usize)
    }

    /// Check every field parses and the window holds at least one sample.
    pub fn validate(&self) -> ScaleResult<()> {
        let size = self.window_size()?;
        if size == 0 {
            return Err(ScaleError::config(format!(
                "history_window {} is shorter than sample_interval {}",
                self.history_window, self.sample_interval
            )));
        }
        if size < self.forecast.min_samples() {
            return Err(ScaleError::config(format!(
                "history window holds {size} samples, forecaster needs {}",
                self.forecast.min_samples()
            )));
        }
        self.call_timeout()?;
        self.idle_eviction()?;
        if self.tick_interval()?.is_zero() {
            return Err(ScaleError::config("tick_interval must be non-zero"));
        }
        if let Some(url) = &self.predictor_url {
            let host = url.strip_prefix("http://").unwrap_or_default();
            if host.trim_matches('/').is_empty() {
                return Err(ScaleError::config(format!(
                    "predictor_url {url:?} must be an http:// URL"
                )));
            }
        }
        Ok(())
    }
}

/// Parse a duration string like `"500ms"`, `"30s"`, `"5m"`, `"24h"`.
///
/// A bare number is read as seconds.
pub fn parse_duration(s: &str) -> ScaleResult<Duration> {
    let s = s.trim();
    let invalid = || ScaleError::config(format!("invalid duration {s:?}"));

    if let Some(ms) = s.strip_suffix("ms") {
        ms.parse::<u64>().map(Duration::from_millis).map_err(|_| invalid())
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse::<u64>().map(Duration::from_secs).map_err(|_| invalid())
    } else if let Some(mins) = s.strip_suffix('m') {
        let m = mins.parse::<u64>().map_err(|_| invalid())?;
        m.checked_mul(60)
            .map(Duration::from_secs)
            .ok_or_else(invalid)
    } else if let Some(hours) = s.strip_suffix('h') {
        let h = hours.parse::<u64>().map_err(|_| invalid())?;
        h.checked_mul(3600)
            .map(Duration::from_secs)
            .ok_or_else(invalid)
    } else {
        s.parse::<u64>().map(Duration::from_secs).map_err(|_| invalid())
    }
}
