//! Domain types for Tidescale.
//!
//! The scaling target mirrors an HPA-style resource: an operator-owned
//! spec plus a status block that only the decision engine writes.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

use crate::error::{ScaleError, ScaleResult};

/// Workload key, `namespace/name`.
pub type WorkloadKey = String;

/// Longest prediction window a target may ask for: one week.
pub const MAX_PREDICTION_WINDOW_SECS: u64 = 7 * 24 * 3600;

// ── Scaling target ───────────────────────────────────────────────

/// Reference to the scalable workload (e.g. a deployment).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct TargetRef {
    pub name: String,
    pub namespace: String,
}

impl TargetRef {
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
        }
    }

    /// The `namespace/name` key used to index per-workload state.
    pub fn key(&self) -> WorkloadKey {
        format!("{}/{}", self.namespace, self.name)
    }
}

/// Operator-owned configuration of a scaling target.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScalingTargetSpec {
    pub target_ref: TargetRef,
    pub min_replicas: u32,
    pub max_replicas: u32,
    /// CPU usage per pod (cores) that counts as full load.
    pub cpu_threshold: f64,
    /// Memory usage per pod (GiB) that counts as full load.
    pub mem_threshold: f64,
    /// How far ahead the forecast should look.
    pub prediction_window_secs: u64,
}

/// Engine-owned observed state of a scaling target.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScalingTargetStatus {
    #[serde(default)]
    pub current_replicas: u32,
    /// Load ratio used for the last applied decision.
    #[serde(default)]
    pub predicted_load: f64,
    /// Unix timestamp (seconds) of the last successful scale action.
    #[serde(default)]
    pub last_scaled_time: Option<u64>,
}

/// A scaling target: spec plus status.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScalingTarget {
    pub name: String,
    pub spec: ScalingTargetSpec,
    #[serde(default)]
    pub status: ScalingTargetStatus,
}

impl ScalingTarget {
    /// Key of the workload this target scales.
    pub fn workload_key(&self) -> WorkloadKey {
        self.spec.target_ref.key()
    }

    /// Reject configurations the engine cannot act on.
    pub fn validate(&self) -> ScaleResult<()> {
        let spec = &self.spec;
        if spec.target_ref.name.is_empty() {
            return Err(ScaleError::config(format!(
                "target {}: targetRef.name is empty",
                self.name
            )));
        }
        if spec.min_replicas > spec.max_replicas {
            return Err(ScaleError::config(format!(
                "target {}: minReplicas {} exceeds maxReplicas {}",
                self.name, spec.min_replicas, spec.max_replicas
            )));
        }
        if !(spec.cpu_threshold.is_finite() && spec.cpu_threshold > 0.0) {
            return Err(ScaleError::config(format!(
                "target {}: cpuThreshold must be positive, got {}",
                self.name, spec.cpu_threshold
            )));
        }
        if !(spec.mem_threshold.is_finite() && spec.mem_threshold > 0.0) {
            return Err(ScaleError::config(format!(
                "target {}: memThreshold must be positive, got {}",
                self.name, spec.mem_threshold
            )));
        }
        if spec.prediction_window_secs > MAX_PREDICTION_WINDOW_SECS {
            return Err(ScaleError::config(format!(
                "target {}: predictionWindow {}s exceeds the {}s limit",
                self.name, spec.prediction_window_secs, MAX_PREDICTION_WINDOW_SECS
            )));
        }
        Ok(())
    }

    /// Clamp a replica count into `[minReplicas, maxReplicas]`.
    pub fn clamp_replicas(&self, replicas: u32) -> u32 {
        replicas.clamp(self.spec.min_replicas, self.spec.max_replicas)
    }
}

// ── Samples and history ──────────────────────────────────────────

/// A scalar load observation. Immutable once recorded.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct UsageSample {
    /// Unix timestamp (seconds).
    pub timestamp: u64,
    pub value: f64,
}

/// One step of a forecast.
pub type ForecastPoint = UsageSample;

/// Sliding window of samples for one workload, oldest first.
#[derive(Debug, Clone)]
pub struct WorkloadHistory {
    capacity: usize,
    samples: VecDeque<UsageSample>,
}

impl WorkloadHistory {
    /// Create a history that keeps at most `capacity` samples.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity.min(1024)),
        }
    }

    /// Append a sample, evicting the oldest entries beyond capacity.
    pub fn push(&mut self, sample: UsageSample) {
        self.samples.push_back(sample);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    pub fn values(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.value).collect()
    }

    pub fn latest(&self) -> Option<&UsageSample> {
        self.samples.back()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

// ── Pod metrics ──────────────────────────────────────────────────

/// Usage of one container, as reported by the metrics provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContainerUsage {
    pub name: String,
    pub cpu_milli_cores: u64,
    pub memory_bytes: u64,
}

/// Usage of one pod, as reported by the metrics provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PodMetrics {
    pub name: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub containers: Vec<ContainerUsage>,
}

impl PodMetrics {
    /// A pod belongs to `workload` if its `app` label equals the workload
    /// name or its name starts with `"<workload>-"`.
    pub fn belongs_to(&self, workload: &str) -> bool {
        self.labels.get("app").is_some_and(|app| app == workload)
            || self
                .name
                .strip_prefix(workload)
                .is_some_and(|rest| rest.starts_with('-'))
    }

    pub fn cpu_milli_cores(&self) -> u64 {
        self.containers.iter().map(|c| c.cpu_milli_cores).sum()
    }

    pub fn memory_bytes(&self) -> u64 {
        self.containers.iter().map(|c| c.memory_bytes).sum()
    }
}
