//! Scenario files: targets plus the usage observed at each tick.
//!
//! ```toml
//! [[target]]
//! name = "web-scaler"
//! workload = "web"
//! min_replicas = 1
//! max_replicas = 10
//! cpu_threshold = 0.7
//! mem_threshold = 0.8
//! prediction_window = "5m"
//! initial_replicas = 1
//!
//! [[tick]]
//! pods = [{ name = "web-0", app = "web", cpu_milli = 700, memory_mib = 1024 }]
//! ```

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use tidescale_core::{
    ContainerUsage, PodMetrics, ScaleError, ScaleResult, ScalingTarget, ScalingTargetSpec,
    ScalingTargetStatus, TargetRef, parse_duration,
};

fn default_namespace() -> String {
    "default".to_string()
}

fn default_window() -> String {
    "5m".to_string()
}

fn default_replicas() -> u32 {
    1
}

/// A complete simulation input.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Scenario {
    #[serde(default, rename = "target")]
    pub targets: Vec<ScenarioTarget>,
    #[serde(default, rename = "tick")]
    pub ticks: Vec<Tick>,
}

/// One scaling target as written in a scenario.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScenarioTarget {
    pub name: String,
    /// Name of the scaled workload; pods belong to it by `app` label or
    /// name prefix.
    pub workload: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    pub min_replicas: u32,
    pub max_replicas: u32,
    pub cpu_threshold: f64,
    pub mem_threshold: f64,
    #[serde(default = "default_window")]
    pub prediction_window: String,
    /// Replica count the workload starts with.
    #[serde(default = "default_replicas")]
    pub initial_replicas: u32,
}

/// Pod usage observed at one tick. Pods absent from a tick do not exist
/// at that tick.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Tick {
    #[serde(default)]
    pub pods: Vec<PodSample>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PodSample {
    pub name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default)]
    pub app: Option<String>,
    #[serde(default)]
    pub cpu_milli: u64,
    #[serde(default)]
    pub memory_mib: u64,
}

impl Scenario {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let scenario: Scenario = toml::from_str(content)?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Check every target is one the engine can act on and names are
    /// unique.
    pub fn validate(&self) -> ScaleResult<()> {
        let mut seen = HashSet::new();
        for target in &self.targets {
            if !seen.insert(target.name.as_str()) {
                return Err(ScaleError::config(format!(
                    "duplicate target name {}",
                    target.name
                )));
            }
            target.to_target()?.validate()?;
        }
        Ok(())
    }

    /// Engine targets, in file order.
    pub fn scaling_targets(&self) -> ScaleResult<Vec<ScalingTarget>> {
        self.targets.iter().map(ScenarioTarget::to_target).collect()
    }
}

impl ScenarioTarget {
    pub fn target_ref(&self) -> TargetRef {
        TargetRef::new(&self.namespace, &self.workload)
    }

    /// Build the engine target. Status starts at `initial_replicas` with no
    /// scale recorded.
    pub fn to_target(&self) -> ScaleResult<ScalingTarget> {
        let window = parse_duration(&self.prediction_window)?;
        Ok(ScalingTarget {
            name: self.name.clone(),
            spec: ScalingTargetSpec {
                target_ref: self.target_ref(),
                min_replicas: self.min_replicas,
                max_replicas: self.max_replicas,
                cpu_threshold: self.cpu_threshold,
                mem_threshold: self.mem_threshold,
                prediction_window_secs: window.as_secs(),
            },
            status: ScalingTargetStatus {
                current_replicas: self.initial_replicas,
                ..Default::default()
            },
        })
    }
}

impl Tick {
    /// Pods grouped by namespace, as a metrics provider reports them.
    pub fn pods_by_namespace(&self) -> HashMap<String, Vec<PodMetrics>> {
        let mut by_ns: HashMap<String, Vec<PodMetrics>> = HashMap::new();
        for pod in &self.pods {
            by_ns
                .entry(pod.namespace.clone())
                .or_default()
                .push(pod.to_metrics());
        }
        by_ns
    }
}

impl PodSample {
    pub fn to_metrics(&self) -> PodMetrics {
        let labels = self
            .app
            .iter()
            .map(|app| ("app".to_string(), app.clone()))
            .collect();
        PodMetrics {
            name: self.name.clone(),
            labels,
            containers: vec![ContainerUsage {
                name: "main".to_string(),
                cpu_milli_cores: self.cpu_milli,
                memory_bytes: self.memory_mib * 1024 * 1024,
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[[target]]
name = "web-scaler"
workload = "web"
min_replicas = 1
max_replicas = 10
cpu_threshold = 0.7
mem_threshold = 0.8
prediction_window = "10m"

[[target]]
name = "api-scaler"
workload = "api"
namespace = "prod"
min_replicas = 2
max_replicas = 4
cpu_threshold = 0.5
mem_threshold = 1.0
initial_replicas = 3

[[tick]]
pods = [
    { name = "web-0", app = "web", cpu_milli = 700, memory_mib = 1024 },
    { name = "api-0", namespace = "prod", cpu_milli = 200 },
]

[[tick]]
"#;

    #[test]
    fn parses_targets_and_ticks() {
        let scenario = Scenario::from_toml_str(SAMPLE).unwrap();
        assert_eq!(scenario.targets.len(), 2);
        assert_eq!(scenario.ticks.len(), 2);
        assert!(scenario.ticks[1].pods.is_empty());

        let targets = scenario.scaling_targets().unwrap();
        assert_eq!(targets[0].workload_key(), "default/web");
        assert_eq!(targets[0].spec.prediction_window_secs, 600);
        assert_eq!(targets[0].status.current_replicas, 1);
        assert_eq!(targets[1].workload_key(), "prod/api");
        assert_eq!(targets[1].spec.prediction_window_secs, 300);
        assert_eq!(targets[1].status.current_replicas, 3);
        assert_eq!(targets[1].status.last_scaled_time, None);
    }

    #[test]
    fn groups_pods_by_namespace() {
        let scenario = Scenario::from_toml_str(SAMPLE).unwrap();
        let by_ns = scenario.ticks[0].pods_by_namespace();
        assert_eq!(by_ns.len(), 2);

        let web = &by_ns["default"][0];
        assert!(web.belongs_to("web"));
        assert_eq!(web.memory_bytes(), 1 << 30);

        let api = &by_ns["prod"][0];
        assert!(api.labels.is_empty());
        assert!(api.belongs_to("api"));
        assert_eq!(api.cpu_milli_cores(), 200);
    }

    #[test]
    fn rejects_invalid_targets() {
        let bounds = SAMPLE.replace("max_replicas = 4", "max_replicas = 1");
        let err = Scenario::from_toml_str(&bounds).unwrap_err();
        assert!(err.to_string().contains("api-scaler"), "{err}");

        let window = SAMPLE.replace("\"10m\"", "\"soon\"");
        assert!(Scenario::from_toml_str(&window).is_err());

        let dup = SAMPLE.replace("api-scaler", "web-scaler");
        let err = Scenario::from_toml_str(&dup).unwrap_err();
        assert!(err.to_string().contains("duplicate"), "{err}");
    }
}
