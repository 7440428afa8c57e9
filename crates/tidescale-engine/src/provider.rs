//! Collaborator contracts: where usage comes from and where replica
//! counts go.
//!
//! Both traits return boxed futures so they stay object-safe; the engine
//! holds them as `Arc<dyn ...>`.

use std::future::Future;
use std::pin::Pin;

use tidescale_core::{PodMetrics, TargetRef};

/// Boxed future alias for collaborator calls.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Source of per-pod resource usage.
pub trait MetricsProvider: Send + Sync {
    /// Usage of every pod in `namespace`.
    fn pod_metrics<'a>(&'a self, namespace: &'a str)
    -> BoxFuture<'a, anyhow::Result<Vec<PodMetrics>>>;
}

/// The platform that owns the workload's replica count.
pub trait WorkloadOrchestrator: Send + Sync {
    /// Replica count currently requested for the workload.
    fn get_replicas<'a>(&'a self, target: &'a TargetRef) -> BoxFuture<'a, anyhow::Result<u32>>;

    /// Request a new replica count for the workload.
    fn set_replicas<'a>(
        &'a self,
        target: &'a TargetRef,
        replicas: u32,
    ) -> BoxFuture<'a, anyhow::Result<()>>;
}
