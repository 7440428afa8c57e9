//! Embedded autoregressive-integrated forecaster.

use std::collections::VecDeque;

use tidescale_core::stats;
use tidescale_core::{ForecastOrders, ForecastPoint, UsageSample};

use crate::error::ForecastError;

/// Accumulates load samples and forecasts the next steps.
///
/// The buffer is unbounded; callers bound it with [`retain_latest`].
///
/// [`retain_latest`]: LoadForecaster::retain_latest
#[derive(Debug, Clone)]
pub struct LoadForecaster {
    orders: ForecastOrders,
    samples: VecDeque<UsageSample>,
}

impl LoadForecaster {
    pub fn new(orders: ForecastOrders) -> Self {
        Self {
            orders,
            samples: VecDeque::new(),
        }
    }

    pub fn orders(&self) -> ForecastOrders {
        self.orders
    }

    /// Append a sample to the buffer.
    pub fn add_data_point(&mut self, timestamp: u64, value: f64) {
        self.samples.push_back(UsageSample { timestamp, value });
    }

    /// Drop all but the `keep` most recent samples.
    pub fn retain_latest(&mut self, keep: usize) {
        while self.samples.len() > keep {
            self.samples.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Forecast `steps` points past the last sample.
    pub fn predict(&self, steps: usize) -> Result<Vec<ForecastPoint>, ForecastError> {
        let need = self.orders.min_samples().max(1);
        let (Some(last), true) = (self.samples.back(), self.samples.len() >= need) else {
            return Err(ForecastError::InsufficientData {
                have: self.samples.len(),
                need,
            });
        };

        let series: Vec<f64> = self.samples.iter().map(|s| s.value).collect();
        let diffed = stats::difference(&series, self.orders.d);

        let coefficients: Vec<f64> = (1..=self.orders.p)
            .map(|lag| stats::autocorrelation(&diffed, lag))
            .collect();

        let ar: f64 = coefficients
            .iter()
            .enumerate()
            .filter_map(|(j, coef)| {
                diffed
                    .len()
                    .checked_sub(j + 1)
                    .map(|idx| coef * diffed[idx])
            })
            .sum();
        let value = ar + last.value * self.orders.d as f64;

        let interval = self.last_interval();
        Ok((1..=steps as u64)
            .map(|k| ForecastPoint {
                timestamp: last.timestamp.saturating_add(interval.saturating_mul(k)),
                value,
            })
            .collect())
    }

    /// Relative forecast error `|actual - predicted| / actual`.
    ///
    /// Not defined for `actual == 0`; callers must guard.
    pub fn calculate_error(actual: f64, predicted: f64) -> f64 {
        (actual - predicted).abs() / actual
    }

    /// Spacing between the two most recent samples, 0 with fewer than two.
    fn last_interval(&self) -> u64 {
        let n = self.samples.len();
        if n < 2 {
            return 0;
        }
        self.samples[n - 1]
            .timestamp
            .saturating_sub(self.samples[n - 2].timestamp)
    }
}
