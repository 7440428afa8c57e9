//! Replay a scenario through the reconciler on a virtual clock.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use tidescale_core::{EngineConfig, ScaleResult};
use tidescale_engine::{
    Clock, CycleContext, CycleOutcome, InMemoryMetrics, InMemoryOrchestrator, ManualClock, Reconciler,
    ScalingDecisionEngine,
};

use crate::scenario::Scenario;

/// Every decision of a simulation run, tick by tick.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SimulationReport {
    pub ticks: Vec<TickReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TickReport {
    pub tick: usize,
    /// Seconds since the start of the simulation.
    pub timestamp: u64,
    pub decisions: Vec<Decision>,
}

/// What happened to one target at one tick.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Decision {
    pub target: String,
    /// `scaled`, `unchanged`, `gated` or `error`.
    pub outcome: String,
    /// Replica count of the workload after the tick.
    pub replicas: u32,
    pub predicted_load: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl SimulationReport {
    /// Decision for `target` at `tick`.
    pub fn decision(&self, tick: usize, target: &str) -> Option<&Decision> {
        self.ticks
            .get(tick)?
            .decisions
            .iter()
            .find(|d| d.target == target)
    }

    /// Number of scale actions applied across the run.
    pub fn scale_events(&self) -> usize {
        self.ticks
            .iter()
            .flat_map(|t| &t.decisions)
            .filter(|d| d.outcome == "scaled")
            .count()
    }
}

/// Run `scenario` to completion.
///
/// The virtual clock starts at 0 and advances by `sample_interval` after
/// each tick.
pub async fn run(config: &EngineConfig, scenario: &Scenario) -> ScaleResult<SimulationReport> {
    config.validate()?;
    scenario.validate()?;

    let metrics = Arc::new(InMemoryMetrics::new());
    let orchestrator = Arc::new(InMemoryOrchestrator::new());
    let clock = Arc::new(ManualClock::new(0));
    let engine = ScalingDecisionEngine::new(config, metrics.clone(), orchestrator.clone())?
        .with_clock(clock.clone());

    let targets = scenario.scaling_targets()?;
    for target in &targets {
        orchestrator.insert(target.spec.target_ref.clone(), target.status.current_replicas);
    }
    let mut reconciler =
        Reconciler::new(Arc::new(engine), targets).with_idle_eviction(config.idle_eviction()?);

    // Every namespace is republished each tick so pods that disappear stop
    // being reported.
    let namespaces: BTreeSet<String> = scenario
        .targets
        .iter()
        .map(|t| t.namespace.clone())
        .chain(
            scenario
                .ticks
                .iter()
                .flat_map(|t| t.pods.iter().map(|p| p.namespace.clone())),
        )
        .collect();

    let interval = config.sample_interval()?;
    let ctx = CycleContext::background();
    let mut report = SimulationReport::default();

    info!(
        targets = scenario.targets.len(),
        ticks = scenario.ticks.len(),
        "simulation started"
    );

    for (idx, tick) in scenario.ticks.iter().enumerate() {
        let mut pods = tick.pods_by_namespace();
        for ns in &namespaces {
            metrics.publish(ns, pods.remove(ns).unwrap_or_default());
        }

        let outcomes = reconciler.reconcile_all(&ctx).await;
        let mut decisions = Vec::with_capacity(outcomes.len());
        for (name, res) in outcomes {
            let Some(target) = reconciler.target(&name) else {
                continue;
            };
            let replicas = orchestrator
                .replicas(&target.spec.target_ref)
                .unwrap_or(target.status.current_replicas);

            let (outcome, detail) = match &res {
                Ok(CycleOutcome::Scaled { from, to }) => {
                    ("scaled", Some(format!("{from} -> {to}")))
                }
                Ok(CycleOutcome::Unchanged { .. }) => ("unchanged", None),
                Ok(CycleOutcome::Gated {
                    desired, remaining, ..
                }) => (
                    "gated",
                    Some(format!("wants {desired}, {}s left", remaining.as_secs())),
                ),
                Err(e) => ("error", Some(e.to_string())),
            };

            info!(
                tick = idx,
                scaler = %name,
                outcome,
                replicas,
                detail = detail.as_deref().unwrap_or(""),
                "decision"
            );
            decisions.push(Decision {
                target: name,
                outcome: outcome.to_string(),
                replicas,
                predicted_load: target.status.predicted_load,
                detail,
            });
        }

        report.ticks.push(TickReport {
            tick: idx,
            timestamp: clock.now_secs(),
            decisions,
        });

        let evicted = reconciler.engine().evict_idle(config.idle_eviction()?);
        if evicted > 0 {
            warn!(tick = idx, evicted, "workload state evicted mid-simulation");
        }
        clock.advance(interval);
    }

    info!(scale_events = report.scale_events(), "simulation finished");
    Ok(report)
}
