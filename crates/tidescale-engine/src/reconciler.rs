//! Periodic driver: runs a decision cycle for every registered target.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use tidescale_core::{ScaleError, ScaleResult, ScalingTarget};

use crate::context::CycleContext;
use crate::engine::{CycleOutcome, ScalingDecisionEngine};

/// Result of one target's cycle, keyed by target name.
pub type TargetOutcome = (String, ScaleResult<CycleOutcome>);

/// Owns the scaling targets and drives the engine over them.
pub struct Reconciler {
    engine: Arc<ScalingDecisionEngine>,
    targets: Vec<ScalingTarget>,
    idle_eviction: Duration,
}

impl Reconciler {
    pub fn new(engine: Arc<ScalingDecisionEngine>, targets: Vec<ScalingTarget>) -> Self {
        Self {
            engine,
            targets,
            idle_eviction: Duration::from_secs(3600),
        }
    }

    pub fn with_idle_eviction(mut self, idle_eviction: Duration) -> Self {
        self.idle_eviction = idle_eviction;
        self
    }

    pub fn engine(&self) -> &Arc<ScalingDecisionEngine> {
        &self.engine
    }

    pub fn targets(&self) -> &[ScalingTarget] {
        &self.targets
    }

    pub fn target(&self, name: &str) -> Option<&ScalingTarget> {
        self.targets.iter().find(|t| t.name == name)
    }

    /// Add a target or replace the spec of an existing one with the same
    /// name. The status of a replaced target is kept.
    pub fn upsert_target(&mut self, target: ScalingTarget) {
        match self.targets.iter_mut().find(|t| t.name == target.name) {
            Some(existing) => existing.spec = target.spec,
            None => self.targets.push(target),
        }
    }

    pub fn remove_target(&mut self, name: &str) -> Option<ScalingTarget> {
        let idx = self.targets.iter().position(|t| t.name == name)?;
        Some(self.targets.remove(idx))
    }

    /// Run one cycle for every target concurrently.
    ///
    /// Each target's status reflects its own cycle; a failing target does
    /// not affect the others. Outcomes come back in target order.
    pub async fn reconcile_all(&mut self, ctx: &CycleContext) -> Vec<TargetOutcome> {
        let mut tasks = JoinSet::new();
        for (idx, target) in self.targets.iter().enumerate() {
            let engine = self.engine.clone();
            let ctx = ctx.clone();
            let mut target = target.clone();
            tasks.spawn(async move {
                let res = engine.scale_workload(&ctx, &mut target).await;
                (idx, target, res)
            });
        }

        let mut results: Vec<Option<ScaleResult<CycleOutcome>>> =
            (0..self.targets.len()).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, target, res)) => {
                    if let Err(e) = &res {
                        warn!(scaler = %target.name, error = %e, "scaling cycle failed");
                    }
                    self.targets[idx] = target;
                    results[idx] = Some(res);
                }
                Err(e) => warn!(error = %e, "scaling task aborted"),
            }
        }

        self.targets
            .iter()
            .zip(results)
            .map(|(target, res)| {
                let res = res.unwrap_or(Err(ScaleError::Cancelled));
                (target.name.clone(), res)
            })
            .collect()
    }

    /// Reconcile every `interval` until `shutdown` flips to `true`.
    pub async fn run(&mut self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(
            targets = self.targets.len(),
            interval_secs = interval.as_secs(),
            "reconciler started"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    let ctx = CycleContext::new(shutdown.clone());
                    let outcomes = self.reconcile_all(&ctx).await;
                    let scaled = outcomes
                        .iter()
                        .filter(|(_, r)| matches!(r, Ok(CycleOutcome::Scaled { .. })))
                        .count();
                    debug!(targets = outcomes.len(), scaled, "reconcile tick complete");

                    let evicted = self.engine.evict_idle(self.idle_eviction);
                    if evicted > 0 {
                        debug!(evicted, "evicted idle workload state");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("reconciler shutting down");
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::memory::{InMemoryMetrics, InMemoryOrchestrator, pod_usage};
    use tidescale_core::{EngineConfig, ScalingTargetSpec, ScalingTargetStatus, TargetRef};

    fn target(name: &str) -> ScalingTarget {
        ScalingTarget {
            name: name.to_string(),
            spec: ScalingTargetSpec {
                target_ref: TargetRef::new("default", name),
                min_replicas: 1,
                max_replicas: 10,
                cpu_threshold: 0.5,
                mem_threshold: 1.0,
                prediction_window_secs: 300,
            },
            status: ScalingTargetStatus {
                current_replicas: 1,
                ..Default::default()
            },
        }
    }

    fn setup() -> (Reconciler, Arc<InMemoryMetrics>, Arc<InMemoryOrchestrator>, Arc<ManualClock>) {
        let metrics = Arc::new(InMemoryMetrics::new());
        let orch = Arc::new(InMemoryOrchestrator::new());
        let clock = Arc::new(ManualClock::new(1_700_000_000));
        let engine = ScalingDecisionEngine::new(
            &EngineConfig::default(),
            metrics.clone(),
            orch.clone(),
        )
        .unwrap()
        .with_clock(clock.clone());
        (Reconciler::new(Arc::new(engine), Vec::new()), metrics, orch, clock)
    }

    #[test]
    fn upsert_keeps_status() {
        let (mut rec, ..) = setup();
        let mut t = target("web");
        t.status.current_replicas = 4;
        rec.upsert_target(t);

        let mut updated = target("web");
        updated.spec.max_replicas = 20;
        rec.upsert_target(updated);

        assert_eq!(rec.targets().len(), 1);
        let t = rec.target("web").unwrap();
        assert_eq!(t.spec.max_replicas, 20);
        assert_eq!(t.status.current_replicas, 4);

        assert!(rec.remove_target("web").is_some());
        assert!(rec.remove_target("web").is_none());
    }

    #[tokio::test]
    async fn failing_target_does_not_block_others() {
        let (mut rec, metrics, orch, clock) = setup();
        metrics.publish("default", vec![pod_usage("web-0", "web", 1000, 0)]);
        orch.insert(TargetRef::new("default", "web"), 1);
        orch.insert(TargetRef::new("default", "api"), 1);
        rec.upsert_target(target("web"));
        rec.upsert_target(target("api"));

        let ctx = CycleContext::background();
        let mut last = Vec::new();
        for _ in 0..4 {
            last = rec.reconcile_all(&ctx).await;
            clock.advance(Duration::from_secs(300));
        }

        assert_eq!(last.len(), 2);
        assert_eq!(last[0].0, "web");
        assert!(matches!(last[0].1, Ok(CycleOutcome::Scaled { from: 1, to: 2 })));
        assert_eq!(last[1].0, "api");
        assert!(matches!(last[1].1, Err(ScaleError::NoMatchingPods(_))));

        assert_eq!(rec.target("web").unwrap().status.current_replicas, 2);
        assert_eq!(rec.target("api").unwrap().status.current_replicas, 1);
        assert_eq!(orch.writes(), vec![(TargetRef::new("default", "web"), 2)]);
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let (mut rec, ..) = setup();
        rec.upsert_target(target("web"));
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            rec.run(Duration::from_millis(10), rx).await;
            rec
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();

        let rec = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("reconciler did not stop")
            .unwrap();
        assert_eq!(rec.targets().len(), 1);
    }
}
