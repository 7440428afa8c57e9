//! In-memory collaborators.
//!
//! Back the simulator and the test suites: usage is whatever was last
//! published, replica writes are recorded for inspection, and both can be
//! told to fail or to respond slowly.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};
use std::time::Duration;

use anyhow::{anyhow, bail};

use tidescale_core::{ContainerUsage, PodMetrics, TargetRef};

use crate::provider::{BoxFuture, MetricsProvider, WorkloadOrchestrator};

/// Build a single-container pod owned by `app`.
pub fn pod_usage(name: &str, app: &str, cpu_milli_cores: u64, memory_bytes: u64) -> PodMetrics {
    PodMetrics {
        name: name.to_string(),
        labels: HashMap::from([("app".to_string(), app.to_string())]),
        containers: vec![ContainerUsage {
            name: "main".to_string(),
            cpu_milli_cores,
            memory_bytes,
        }],
    }
}

/// Metrics provider serving published per-namespace pod usage.
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    pods: RwLock<HashMap<String, Vec<PodMetrics>>>,
    failing: AtomicBool,
    latency: Mutex<Option<Duration>>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the pods reported for `namespace`.
    pub fn publish(&self, namespace: &str, pods: Vec<PodMetrics>) {
        let mut map = self.pods.write().unwrap_or_else(PoisonError::into_inner);
        map.insert(namespace.to_string(), pods);
    }

    /// Make every subsequent fetch fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Delay every subsequent fetch.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock().unwrap_or_else(PoisonError::into_inner) = latency;
    }
}

impl MetricsProvider for InMemoryMetrics {
    fn pod_metrics<'a>(
        &'a self,
        namespace: &'a str,
    ) -> BoxFuture<'a, anyhow::Result<Vec<PodMetrics>>> {
        Box::pin(async move {
            let latency = *self.latency.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(latency) = latency {
                tokio::time::sleep(latency).await;
            }
            if self.failing.load(Ordering::SeqCst) {
                bail!("metrics API unreachable");
            }
            let map = self.pods.read().unwrap_or_else(PoisonError::into_inner);
            Ok(map.get(namespace).cloned().unwrap_or_default())
        })
    }
}

/// Orchestrator holding replica counts in a map.
#[derive(Debug, Default)]
pub struct InMemoryOrchestrator {
    replicas: Mutex<HashMap<TargetRef, u32>>,
    writes: Mutex<Vec<(TargetRef, u32)>>,
    failing_writes: AtomicBool,
    latency: Mutex<Option<Duration>>,
}

impl InMemoryOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a workload with its current replica count.
    pub fn insert(&self, target: TargetRef, replicas: u32) {
        self.replicas
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(target, replicas);
    }

    pub fn replicas(&self, target: &TargetRef) -> Option<u32> {
        self.replicas
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(target)
            .copied()
    }

    /// Every successful `set_replicas` call, in order.
    pub fn writes(&self) -> Vec<(TargetRef, u32)> {
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Make every subsequent `set_replicas` fail.
    pub fn set_failing_writes(&self, failing: bool) {
        self.failing_writes.store(failing, Ordering::SeqCst);
    }

    /// Delay every subsequent call.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock().unwrap_or_else(PoisonError::into_inner) = latency;
    }

    async fn pause(&self) {
        let latency = *self.latency.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

impl WorkloadOrchestrator for InMemoryOrchestrator {
    fn get_replicas<'a>(&'a self, target: &'a TargetRef) -> BoxFuture<'a, anyhow::Result<u32>> {
        Box::pin(async move {
            self.pause().await;
            self.replicas(target)
                .ok_or_else(|| anyhow!("workload {} not found", target.key()))
        })
    }

    fn set_replicas<'a>(
        &'a self,
        target: &'a TargetRef,
        replicas: u32,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            self.pause().await;
            if self.failing_writes.load(Ordering::SeqCst) {
                bail!("scale subresource update rejected");
            }
            let mut map = self.replicas.lock().unwrap_or_else(PoisonError::into_inner);
            let Some(current) = map.get_mut(target) else {
                bail!("workload {} not found", target.key());
            };
            *current = replicas;
            drop(map);

            self.writes
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((target.clone(), replicas));
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn metrics_serve_published_pods() {
        let metrics = InMemoryMetrics::new();
        metrics.publish("default", vec![pod_usage("web-1", "web", 100, 1024)]);

        let pods = metrics.pod_metrics("default").await.unwrap();
        assert_eq!(pods.len(), 1);
        assert!(metrics.pod_metrics("other").await.unwrap().is_empty());

        metrics.set_failing(true);
        assert!(metrics.pod_metrics("default").await.is_err());
    }

    #[tokio::test]
    async fn orchestrator_records_writes() {
        let orch = InMemoryOrchestrator::new();
        let web = TargetRef::new("default", "web");
        orch.insert(web.clone(), 2);

        assert_eq!(orch.get_replicas(&web).await.unwrap(), 2);
        orch.set_replicas(&web, 5).await.unwrap();
        assert_eq!(orch.replicas(&web), Some(5));
        assert_eq!(orch.writes(), vec![(web.clone(), 5)]);

        orch.set_failing_writes(true);
        assert!(orch.set_replicas(&web, 6).await.is_err());
        assert_eq!(orch.replicas(&web), Some(5));
    }

    #[tokio::test]
    async fn unknown_workload_is_an_error() {
        let orch = InMemoryOrchestrator::new();
        let ghost = TargetRef::new("default", "ghost");
        assert!(orch.get_replicas(&ghost).await.is_err());
        assert!(orch.set_replicas(&ghost, 1).await.is_err());
    }
}
