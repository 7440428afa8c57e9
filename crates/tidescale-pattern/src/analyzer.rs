//! Pattern analyzer: keyed load history and shape classification.
//!
//! Each workload key owns its own bounded history behind its own lock, so
//! analyses for different workloads never contend beyond the brief map
//! lookup.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::debug;

use tidescale_core::stats;
use tidescale_core::{EngineConfig, ScaleResult, UsageSample, WorkloadHistory};

/// Observed usage shape of a workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkloadPattern {
    /// Usage varies little around its mean.
    Stable,
    /// Usage rises and falls on a recurring cycle.
    Periodic,
    /// Usage has sudden short spikes.
    Burst,
}

impl std::fmt::Display for WorkloadPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Stable => "stable",
            Self::Periodic => "periodic",
            Self::Burst => "burst",
        };
        f.write_str(name)
    }
}

/// Maintains per-workload history and classifies it.
#[derive(Debug)]
pub struct PatternAnalyzer {
    window_size: usize,
    histories: RwLock<HashMap<String, Arc<Mutex<WorkloadHistory>>>>,
}

impl PatternAnalyzer {
    /// Keep `history_window / sample_interval` samples per workload.
    pub fn new(history_window: Duration, sample_interval: Duration) -> Self {
        let size = if sample_interval.is_zero() {
            1
        } else {
            (history_window.as_millis() / sample_interval.as_millis()) as usize
        };
        Self::with_window_size(size)
    }

    pub fn with_window_size(window_size: usize) -> Self {
        Self {
            window_size: window_size.max(1),
            histories: RwLock::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &EngineConfig) -> ScaleResult<Self> {
        Ok(Self::with_window_size(config.window_size()?))
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Record `value` for `workload_key` at the current time and classify.
    pub fn analyze_pattern(&self, workload_key: &str, value: f64) -> WorkloadPattern {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        self.analyze_sample(workload_key, UsageSample { timestamp, value })
    }

    /// Record a timestamped sample for `workload_key` and classify.
    pub fn analyze_sample(&self, workload_key: &str, sample: UsageSample) -> WorkloadPattern {
        let history = self.history_for(workload_key);
        let mut history = history.lock().unwrap_or_else(PoisonError::into_inner);
        history.push(sample);

        let pattern = classify(&history.values());
        debug!(
            workload = %workload_key,
            samples = history.len(),
            %pattern,
            "classified workload"
        );
        pattern
    }

    /// Number of samples currently held for `workload_key`.
    pub fn history_len(&self, workload_key: &str) -> Option<usize> {
        let histories = self.histories.read().unwrap_or_else(PoisonError::into_inner);
        histories.get(workload_key).map(|h| {
            h.lock().unwrap_or_else(PoisonError::into_inner).len()
        })
    }

    /// Forget a workload's history.
    pub fn remove(&self, workload_key: &str) -> bool {
        let mut histories = self.histories.write().unwrap_or_else(PoisonError::into_inner);
        histories.remove(workload_key).is_some()
    }

    /// Number of workloads with history.
    pub fn tracked(&self) -> usize {
        self.histories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn history_for(&self, workload_key: &str) -> Arc<Mutex<WorkloadHistory>> {
        {
            let histories = self.histories.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(h) = histories.get(workload_key) {
                return h.clone();
            }
        }
        let mut histories = self.histories.write().unwrap_or_else(PoisonError::into_inner);
        histories
            .entry(workload_key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(WorkloadHistory::new(self.window_size))))
            .clone()
    }
}

/// Classify a load series, oldest sample first.
pub fn classify(data: &[f64]) -> WorkloadPattern {
    if data.len() < 2 {
        return WorkloadPattern::Stable;
    }

    let mean = stats::mean(data);
    let std_dev = stats::std_dev(data, mean);
    // An all-zero history has no variation to speak of.
    let cv = if mean == 0.0 { 0.0 } else { std_dev / mean.abs() };

    if is_burst(data) {
        WorkloadPattern::Burst
    } else if is_periodic(data) {
        WorkloadPattern::Periodic
    } else if cv < 0.2 {
        WorkloadPattern::Stable
    } else {
        WorkloadPattern::Periodic
    }
}

/// Bursty when the step sizes are far more spread than their average,
/// or when one step dwarfs all the others combined.
fn is_burst(data: &[f64]) -> bool {
    let changes: Vec<f64> = data.windows(2).map(|w| (w[1] - w[0]).abs()).collect();
    if changes.is_empty() {
        return false;
    }

    let change_mean = stats::mean(&changes);
    let change_std = stats::std_dev(&changes, change_mean);
    if change_std > 2.0 * change_mean {
        return true;
    }

    if changes.len() >= 3 {
        let total: f64 = changes.iter().sum();
        let largest = changes.iter().copied().fold(0.0, f64::max);
        return largest > 2.0 * (total - largest);
    }
    false
}

/// Periodic when the autocorrelation function has at least two local
/// maxima above 0.5.
fn is_periodic(data: &[f64]) -> bool {
    if data.len() < 4 {
        return false;
    }

    // Slot 0 stays 0 so that lag 1 can register as a peak.
    let slots = data.len() / 2;
    let mut acf = vec![0.0; slots];
    for (lag, slot) in acf.iter_mut().enumerate().skip(1) {
        *slot = stats::autocorrelation(data, lag);
    }

    let peaks = (1..slots.saturating_sub(1))
        .filter(|&i| acf[i] > acf[i - 1] && acf[i] > acf[i + 1] && acf[i] > 0.5)
        .count();
    peaks >= 2
}
