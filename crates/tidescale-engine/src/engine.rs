//! Scaling decision engine: one target, one cycle per call.
//!
//! Owns all per-workload mutable state: a forecaster per workload key and
//! (through the strategy factory) the pattern history. Each key has its
//! own cycle lock, so two ticks for the same workload never overlap while
//! different workloads proceed independently.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info};

use tidescale_core::{
    EngineConfig, ForecastOrders, ScaleError, ScaleResult, ScalingTarget, UsageSample,
};
use tidescale_forecast::{ForecastBackend, LoadForecaster};
use tidescale_pattern::{ScalingPolicy, StrategyFactory};

use crate::clock::{Clock, SystemClock};
use crate::context::CycleContext;
use crate::provider::{MetricsProvider, WorkloadOrchestrator};

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// What a completed cycle did.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// The orchestrator was told to change the replica count.
    Scaled { from: u32, to: u32 },
    /// The desired count already matches the current one.
    Unchanged { replicas: u32 },
    /// A change is wanted but the policy's scaling delay has not elapsed.
    Gated {
        desired: u32,
        current: u32,
        remaining: Duration,
    },
}

/// Per-workload state.
struct WorkloadState {
    /// Held for the whole cycle.
    cycle: Arc<tokio::sync::Mutex<()>>,
    slot: Mutex<WorkloadSlot>,
}

struct WorkloadSlot {
    forecaster: LoadForecaster,
    /// Unix seconds of the last sample fed to the forecaster.
    last_seen: u64,
}

/// Computes and applies scaling decisions.
pub struct ScalingDecisionEngine {
    metrics: Arc<dyn MetricsProvider>,
    orchestrator: Arc<dyn WorkloadOrchestrator>,
    strategies: StrategyFactory,
    backend: ForecastBackend,
    orders: ForecastOrders,
    window_size: usize,
    history_window: Duration,
    sample_interval: Duration,
    call_timeout: Duration,
    clock: Arc<dyn Clock>,
    workloads: RwLock<HashMap<String, Arc<WorkloadState>>>,
}

impl ScalingDecisionEngine {
    /// Create an engine from a validated config.
    ///
    /// Forecasts come from the embedded model unless `predictor_url` names
    /// a prediction service.
    pub fn new(
        config: &EngineConfig,
        metrics: Arc<dyn MetricsProvider>,
        orchestrator: Arc<dyn WorkloadOrchestrator>,
    ) -> ScaleResult<Self> {
        config.validate()?;
        Ok(Self {
            metrics,
            orchestrator,
            strategies: StrategyFactory::from_config(config)?,
            backend: ForecastBackend::from_config(config)?,
            orders: config.forecast,
            window_size: config.window_size()?,
            history_window: config.history_window()?,
            sample_interval: config.sample_interval()?,
            call_timeout: config.call_timeout()?,
            clock: Arc::new(SystemClock),
            workloads: RwLock::new(HashMap::new()),
        })
    }

    /// Replace the wall clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the forecast backend chosen from the config.
    pub fn with_forecast_backend(mut self, backend: ForecastBackend) -> Self {
        if let ForecastBackend::Embedded(orders) = backend {
            self.orders = orders;
        }
        self.backend = backend;
        self
    }

    pub fn forecast_backend(&self) -> &ForecastBackend {
        &self.backend
    }

    pub fn strategies(&self) -> &StrategyFactory {
        &self.strategies
    }

    /// Average per-pod usage of the target's pods: `(cpu cores, memory GiB)`.
    pub async fn collect_metrics(
        &self,
        ctx: &CycleContext,
        target: &ScalingTarget,
    ) -> ScaleResult<(f64, f64)> {
        let target_ref = &target.spec.target_ref;
        let ctx = ctx.clone().or_timeout(self.call_timeout);

        let pods = ctx
            .guard(self.metrics.pod_metrics(&target_ref.namespace))
            .await?
            .map_err(|e| ScaleError::MetricsUnavailable(format!("{e:#}")))?;

        let (mut cpu_milli, mut memory_bytes, mut matched) = (0u64, 0u64, 0u64);
        for pod in pods.iter().filter(|p| p.belongs_to(&target_ref.name)) {
            cpu_milli += pod.cpu_milli_cores();
            memory_bytes += pod.memory_bytes();
            matched += 1;
        }

        if matched == 0 {
            return Err(ScaleError::NoMatchingPods(target_ref.key()));
        }

        let cpu = cpu_milli as f64 / matched as f64 / 1000.0;
        let memory = memory_bytes as f64 / matched as f64 / GIB;
        debug!(
            workload = %target_ref.key(),
            pods = matched,
            cpu,
            memory,
            "collected usage"
        );
        Ok((cpu, memory))
    }

    /// Forecast the target's load ratio over its prediction window and size
    /// the workload for the peak.
    ///
    /// With the embedded backend the current load ratio is recorded as the
    /// next sample first; the remote backend asks the prediction service
    /// for CPU and memory forecasts. Returns `(desired_replicas,
    /// load_ratio)`; the count is always within `[min_replicas,
    /// max_replicas]`.
    pub async fn calculate_desired_replicas(
        &self,
        ctx: &CycleContext,
        target: &ScalingTarget,
        cpu_usage: f64,
        memory_usage: f64,
    ) -> ScaleResult<(u32, f64)> {
        self.check_target(target)?;
        let key = target.workload_key();
        let spec = &target.spec;
        let now = self.clock.now_secs();
        let steps = self.forecast_steps(spec.prediction_window_secs);
        let state = self.state_for(&key);

        let load_ratio = match &self.backend {
            ForecastBackend::Embedded(_) => {
                let ratio =
                    (cpu_usage / spec.cpu_threshold).max(memory_usage / spec.mem_threshold);
                let peak = record_and_forecast(&state, self.window_size, now, ratio, steps)?;
                debug!(workload = %key, sample = ratio, steps, peak, "forecast load");
                peak
            }
            ForecastBackend::Remote(remote) => {
                touch(&state, now);
                let ctx = ctx.clone().or_timeout(self.call_timeout);
                let peak = ctx
                    .guard(remote.peak_load_ratio(spec.cpu_threshold, spec.mem_threshold))
                    .await??;
                debug!(workload = %key, peak, "remote forecast load");
                peak
            }
        };

        // Float-to-int casts saturate: negative or NaN forecasts become 0
        // before the clamp.
        let raw = (target.status.current_replicas as f64 * load_ratio).ceil() as u32;
        let desired = target.clamp_replicas(raw);
        debug!(workload = %key, load_ratio, desired, "desired replicas");
        Ok((desired, load_ratio))
    }

    /// Run one full decision cycle for `target`, updating its status if a
    /// scale action was applied.
    pub async fn scale_workload(
        &self,
        ctx: &CycleContext,
        target: &mut ScalingTarget,
    ) -> ScaleResult<CycleOutcome> {
        self.check_target(target)?;
        let key = target.workload_key();
        let _cycle = self.lock_cycle(&key).await;

        let (cpu, memory) = self.collect_metrics(ctx, target).await?;

        let policy = self.strategies.strategy_for_sample(
            &key,
            UsageSample {
                timestamp: self.clock.now_secs(),
                value: cpu,
            },
        );

        let (desired, load_ratio) = self
            .calculate_desired_replicas(ctx, target, cpu, memory)
            .await?;
        let desired = self.pre_warm(target, &policy, desired, load_ratio);

        let ctx = ctx.clone().or_timeout(self.call_timeout);
        let target_ref = target.spec.target_ref.clone();
        let current = ctx
            .guard(self.orchestrator.get_replicas(&target_ref))
            .await?
            .map_err(|e| ScaleError::OrchestratorUnavailable(format!("{e:#}")))?;

        if desired == current {
            debug!(workload = %key, replicas = current, "replica count unchanged");
            return Ok(CycleOutcome::Unchanged { replicas: current });
        }

        let now = self.clock.now_secs();
        if let Some(last) = target.status.last_scaled_time {
            let elapsed = Duration::from_secs(now.saturating_sub(last));
            if elapsed < policy.scaling_delay {
                let remaining = policy.scaling_delay - elapsed;
                debug!(
                    workload = %key,
                    pattern = %policy.pattern,
                    desired,
                    current,
                    remaining_secs = remaining.as_secs(),
                    "scaling delayed"
                );
                return Ok(CycleOutcome::Gated {
                    desired,
                    current,
                    remaining,
                });
            }
        }

        ctx.guard(self.orchestrator.set_replicas(&target_ref, desired))
            .await?
            .map_err(|e| ScaleError::OrchestratorUnavailable(format!("{e:#}")))?;

        let status = &mut target.status;
        status.last_scaled_time = Some(status.last_scaled_time.map_or(now, |t| t.max(now)));
        status.current_replicas = desired;
        status.predicted_load = load_ratio;

        info!(
            workload = %key,
            pattern = %policy.pattern,
            backend = self.backend.name(),
            from = current,
            to = desired,
            load_ratio,
            "scaled workload"
        );
        Ok(CycleOutcome::Scaled {
            from: current,
            to: desired,
        })
    }

    /// Drop state of workloads not sampled within `max_idle`.
    ///
    /// Workloads with a cycle in flight are skipped. Returns the number of
    /// workloads evicted.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let now = self.clock.now_secs();
        let mut workloads = self.workloads.write().unwrap_or_else(PoisonError::into_inner);

        let stale: Vec<String> = workloads
            .iter()
            .filter(|(_, state)| {
                let slot = state.slot.lock().unwrap_or_else(PoisonError::into_inner);
                now.saturating_sub(slot.last_seen) > max_idle.as_secs()
                    && state.cycle.try_lock().is_ok()
            })
            .map(|(key, _)| key.clone())
            .collect();

        for key in &stale {
            workloads.remove(key);
            self.strategies.analyzer().remove(key);
            debug!(workload = %key, "evicted idle workload state");
        }
        stale.len()
    }

    /// Number of workloads with engine state.
    pub fn tracked_workloads(&self) -> usize {
        self.workloads
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Samples buffered in the workload's forecaster.
    pub fn forecast_samples(&self, workload_key: &str) -> Option<usize> {
        let workloads = self.workloads.read().unwrap_or_else(PoisonError::into_inner);
        workloads.get(workload_key).map(|state| {
            state
                .slot
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .forecaster
                .len()
        })
    }

    /// Reject targets the engine cannot act on, including prediction
    /// windows longer than the history it keeps.
    fn check_target(&self, target: &ScalingTarget) -> ScaleResult<()> {
        target.validate()?;
        let window = target.spec.prediction_window_secs;
        if window > self.history_window.as_secs() {
            return Err(ScaleError::config(format!(
                "target {}: predictionWindow {window}s exceeds history_window {}s",
                target.name,
                self.history_window.as_secs()
            )));
        }
        Ok(())
    }

    /// Raise `desired` to cover the forecast peak ahead of time when the
    /// policy asks for it.
    fn pre_warm(
        &self,
        target: &ScalingTarget,
        policy: &ScalingPolicy,
        desired: u32,
        peak: f64,
    ) -> u32 {
        if !policy.pre_warm || peak <= policy.scaling_threshold {
            return desired;
        }
        let warm = (target.spec.min_replicas as f64 * peak).ceil() as u32;
        if warm <= desired {
            return desired;
        }
        let warm = target.clamp_replicas(warm);
        debug!(
            workload = %target.workload_key(),
            peak,
            threshold = policy.scaling_threshold,
            lead_secs = policy.pre_warm_lead.as_secs(),
            from = desired,
            to = warm,
            "pre-warming ahead of forecast peak"
        );
        warm
    }

    /// Forecast steps covering `window_secs`: at least one, at most one
    /// history window's worth.
    fn forecast_steps(&self, window_secs: u64) -> usize {
        let interval_ms = self.sample_interval.as_millis().max(1);
        let window_ms = u128::from(window_secs) * 1000;
        let steps = window_ms.div_ceil(interval_ms).max(1);
        usize::try_from(steps)
            .unwrap_or(usize::MAX)
            .min(self.window_size.max(1))
    }

    /// Take the workload's cycle lock.
    ///
    /// Eviction may replace the state between the lookup and the lock, so
    /// the lock only counts once the locked state is still the one in the
    /// map. Eviction never removes a state whose lock is held.
    async fn lock_cycle(&self, key: &str) -> OwnedMutexGuard<()> {
        loop {
            let state = self.state_for(key);
            let guard = state.cycle.clone().lock_owned().await;
            let workloads = self.workloads.read().unwrap_or_else(PoisonError::into_inner);
            if workloads
                .get(key)
                .is_some_and(|current| Arc::ptr_eq(current, &state))
            {
                return guard;
            }
        }
    }

    fn state_for(&self, key: &str) -> Arc<WorkloadState> {
        {
            let workloads = self.workloads.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(state) = workloads.get(key) {
                return state.clone();
            }
        }
        let now = self.clock.now_secs();
        let mut workloads = self.workloads.write().unwrap_or_else(PoisonError::into_inner);
        workloads
            .entry(key.to_string())
            .or_insert_with(|| {
                Arc::new(WorkloadState {
                    cycle: Arc::new(tokio::sync::Mutex::new(())),
                    slot: Mutex::new(WorkloadSlot {
                        forecaster: LoadForecaster::new(self.orders),
                        last_seen: now,
                    }),
                })
            })
            .clone()
    }
}

/// Feed `ratio` to the workload's forecaster and return the forecast peak.
fn record_and_forecast(
    state: &WorkloadState,
    window_size: usize,
    now: u64,
    ratio: f64,
    steps: usize,
) -> ScaleResult<f64> {
    let mut slot = state.slot.lock().unwrap_or_else(PoisonError::into_inner);
    slot.forecaster.add_data_point(now, ratio);
    slot.forecaster.retain_latest(window_size);
    slot.last_seen = now;
    let forecast = slot.forecaster.predict(steps)?;
    Ok(forecast
        .iter()
        .map(|p| p.value)
        .fold(f64::NEG_INFINITY, f64::max))
}

fn touch(state: &WorkloadState, now: u64) {
    state
        .slot
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .last_seen = now;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::memory::{InMemoryMetrics, InMemoryOrchestrator, pod_usage};
    use tidescale_core::{ScalingTargetSpec, ScalingTargetStatus, TargetRef};
    use tidescale_pattern::WorkloadPattern;

    const START: u64 = 1_700_000_000;

    struct Harness {
        engine: ScalingDecisionEngine,
        metrics: Arc<InMemoryMetrics>,
        orch: Arc<InMemoryOrchestrator>,
        clock: Arc<ManualClock>,
    }

    fn harness() -> Harness {
        let metrics = Arc::new(InMemoryMetrics::new());
        let orch = Arc::new(InMemoryOrchestrator::new());
        let clock = Arc::new(ManualClock::new(START));
        let engine = ScalingDecisionEngine::new(
            &EngineConfig::default(),
            metrics.clone(),
            orch.clone(),
        )
        .unwrap()
        .with_clock(clock.clone());
        Harness {
            engine,
            metrics,
            orch,
            clock,
        }
    }

    fn target(name: &str, min: u32, max: u32) -> ScalingTarget {
        ScalingTarget {
            name: format!("{name}-scaler"),
            spec: ScalingTargetSpec {
                target_ref: TargetRef::new("default", name),
                min_replicas: min,
                max_replicas: max,
                cpu_threshold: 0.5,
                mem_threshold: 1.0,
                prediction_window_secs: 300,
            },
            status: ScalingTargetStatus {
                current_replicas: 2,
                ..Default::default()
            },
        }
    }

    async fn desired(
        h: &Harness,
        t: &ScalingTarget,
        cpu: f64,
        memory: f64,
    ) -> ScaleResult<(u32, f64)> {
        h.engine
            .calculate_desired_replicas(&CycleContext::background(), t, cpu, memory)
            .await
    }

    /// Feed the forecaster until it can predict.
    async fn warm_up(h: &Harness, t: &ScalingTarget, cpu: f64) -> (u32, f64) {
        for _ in 0..3 {
            assert!(matches!(
                desired(h, t, cpu, 0.0).await,
                Err(ScaleError::InsufficientData { .. })
            ));
            h.clock.advance(Duration::from_secs(300));
        }
        desired(h, t, cpu, 0.0).await.unwrap()
    }

    #[tokio::test]
    async fn desired_follows_load_ratio() {
        let h = harness();
        let t = target("web", 1, 10);
        // 1.0 cores against a 0.5 threshold: twice the load.
        let (desired, ratio) = warm_up(&h, &t, 1.0).await;
        assert_eq!(ratio, 2.0);
        assert_eq!(desired, 4);
    }

    #[tokio::test]
    async fn memory_ratio_wins_when_larger() {
        let h = harness();
        let t = target("web", 1, 10);
        for _ in 0..3 {
            let _ = desired(&h, &t, 0.1, 3.0).await;
        }
        let (replicas, ratio) = desired(&h, &t, 0.1, 3.0).await.unwrap();
        assert_eq!(ratio, 3.0);
        assert_eq!(replicas, 6);
    }

    #[tokio::test]
    async fn desired_is_clamped() {
        let h = harness();
        let high = target("hot", 1, 3);
        assert_eq!(warm_up(&h, &high, 5.0).await.0, 3);

        let low = target("cold", 2, 10);
        assert_eq!(warm_up(&h, &low, 0.0).await.0, 2);
    }

    #[tokio::test]
    async fn bounds_hold_across_inputs() {
        let h = harness();
        for (i, cpu) in [0.0, 0.01, 0.3, 0.5, 0.9, 2.5, 40.0].into_iter().enumerate() {
            for current in [0, 1, 5, 50] {
                let mut t = target(&format!("w{i}-{current}"), 2, 8);
                t.status.current_replicas = current;
                for _ in 0..3 {
                    let _ = desired(&h, &t, cpu, cpu / 2.0).await;
                }
                let (replicas, _) = desired(&h, &t, cpu, cpu / 2.0).await.unwrap();
                assert!((2..=8).contains(&replicas), "cpu {cpu} current {current} → {replicas}");
            }
        }
    }

    #[tokio::test]
    async fn forecaster_history_is_bounded() {
        let h = harness();
        let t = target("web", 1, 10);
        for _ in 0..(h.engine.window_size + 20) {
            let _ = desired(&h, &t, 0.4, 0.0).await;
        }
        assert_eq!(
            h.engine.forecast_samples("default/web"),
            Some(h.engine.window_size)
        );
    }

    #[tokio::test]
    async fn invalid_target_is_rejected() {
        let h = harness();
        let mut t = target("web", 5, 1);
        assert!(matches!(
            desired(&h, &t, 0.5, 0.5).await,
            Err(ScaleError::ConfigInvalid(_))
        ));
        t.spec.min_replicas = 1;
        t.spec.cpu_threshold = 0.0;
        assert!(matches!(
            desired(&h, &t, 0.5, 0.5).await,
            Err(ScaleError::ConfigInvalid(_))
        ));
        assert_eq!(h.engine.tracked_workloads(), 0);
    }

    #[tokio::test]
    async fn window_beyond_history_is_rejected() {
        let h = harness();
        let mut t = target("web", 1, 10);

        // Default history is 24h.
        t.spec.prediction_window_secs = 24 * 3600;
        assert!(matches!(
            desired(&h, &t, 0.5, 0.5).await,
            Err(ScaleError::InsufficientData { .. })
        ));

        for window in [24 * 3600 + 1, u64::MAX / 1000, u64::MAX] {
            t.spec.prediction_window_secs = window;
            assert!(
                matches!(
                    desired(&h, &t, 0.5, 0.5).await,
                    Err(ScaleError::ConfigInvalid(_))
                ),
                "window {window}"
            );
            let err = h
                .engine
                .scale_workload(&CycleContext::background(), &mut t.clone())
                .await
                .unwrap_err();
            assert!(matches!(err, ScaleError::ConfigInvalid(_)), "window {window}");
        }
        assert_eq!(h.engine.forecast_samples("default/web"), Some(1));
    }

    #[test]
    fn forecast_steps_cover_window() {
        let h = harness();
        // 5m sample interval.
        assert_eq!(h.engine.forecast_steps(0), 1);
        assert_eq!(h.engine.forecast_steps(300), 1);
        assert_eq!(h.engine.forecast_steps(301), 2);
        assert_eq!(h.engine.forecast_steps(3600), 12);
        assert_eq!(h.engine.forecast_steps(24 * 3600), 288);
    }

    #[test]
    fn forecast_steps_stop_at_history_length() {
        let h = harness();
        assert_eq!(h.engine.forecast_steps(48 * 3600), h.engine.window_size);
        assert_eq!(h.engine.forecast_steps(u64::MAX), h.engine.window_size);
    }

    #[test]
    fn pre_warm_only_for_periodic_above_threshold() {
        let h = harness();
        let t = target("web", 4, 10);

        let periodic = WorkloadPattern::Periodic.policy();
        assert_eq!(h.engine.pre_warm(&t, &periodic, 4, 2.0), 8);
        assert_eq!(h.engine.pre_warm(&t, &periodic, 4, 0.7), 4);
        assert_eq!(h.engine.pre_warm(&t, &periodic, 9, 2.0), 9);
        assert_eq!(h.engine.pre_warm(&t, &periodic, 4, 5.0), 10);

        let stable = WorkloadPattern::Stable.policy();
        assert_eq!(h.engine.pre_warm(&t, &stable, 4, 2.0), 4);
    }

    #[tokio::test]
    async fn collect_metrics_averages_matched_pods() {
        let h = harness();
        h.metrics.publish(
            "default",
            vec![
                pod_usage("web-a", "web", 300, 1 << 30),
                pod_usage("web-b", "other", 500, 3 << 30),
                pod_usage("api-a", "api", 9000, 9 << 30),
            ],
        );
        let t = target("web", 1, 10);
        let (cpu, mem) = h
            .engine
            .collect_metrics(&CycleContext::background(), &t)
            .await
            .unwrap();
        assert!((cpu - 0.4).abs() < 1e-12, "cpu was {cpu}");
        assert!((mem - 2.0).abs() < 1e-12, "mem was {mem}");
    }

    #[tokio::test]
    async fn collect_metrics_without_pods_fails() {
        let h = harness();
        h.metrics
            .publish("default", vec![pod_usage("api-a", "api", 100, 1 << 20)]);
        let t = target("web", 1, 10);
        let err = h
            .engine
            .collect_metrics(&CycleContext::background(), &t)
            .await
            .unwrap_err();
        assert!(matches!(err, ScaleError::NoMatchingPods(ref k) if k == "default/web"));
    }

    #[tokio::test]
    async fn provider_failure_is_metrics_unavailable() {
        let h = harness();
        h.metrics.set_failing(true);
        let t = target("web", 1, 10);
        assert!(matches!(
            h.engine.collect_metrics(&CycleContext::background(), &t).await,
            Err(ScaleError::MetricsUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn evicts_only_idle_workloads() {
        let h = harness();
        let web = target("web", 1, 10);
        let api = target("api", 1, 10);

        let _ = desired(&h, &web, 0.4, 0.0).await;
        h.engine.strategies().get_strategy("default/web", 0.4);
        h.clock.advance(Duration::from_secs(2 * 3600));
        let _ = desired(&h, &api, 0.4, 0.0).await;

        assert_eq!(h.engine.evict_idle(Duration::from_secs(3600)), 1);
        assert_eq!(h.engine.tracked_workloads(), 1);
        assert_eq!(h.engine.forecast_samples("default/web"), None);
        assert_eq!(h.engine.strategies().analyzer().history_len("default/web"), None);
        assert_eq!(h.engine.forecast_samples("default/api"), Some(1));
        assert!(h.orch.writes().is_empty());
    }

    #[tokio::test]
    async fn busy_workloads_survive_eviction() {
        let h = harness();
        let web = target("web", 1, 10);
        let _ = desired(&h, &web, 0.4, 0.0).await;
        h.clock.advance(Duration::from_secs(2 * 3600));

        let held = h.engine.lock_cycle("default/web").await;
        assert_eq!(h.engine.evict_idle(Duration::from_secs(3600)), 0);
        drop(held);
        assert_eq!(h.engine.evict_idle(Duration::from_secs(3600)), 1);
    }

    #[tokio::test]
    async fn cycle_lock_follows_state_replaced_while_waiting() {
        let h = harness();
        let key = "default/web";
        let old = h.engine.state_for(key);
        let held = old.cycle.clone().lock_owned().await;

        let (guard, ()) = tokio::join!(h.engine.lock_cycle(key), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            // What eviction does once the old lock is observed free.
            h.engine
                .workloads
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(key);
            drop(held);
        });

        let current = h.engine.state_for(key);
        assert!(!Arc::ptr_eq(&current, &old));
        // The returned guard locks the state now in the map.
        assert!(current.cycle.try_lock().is_err());
        assert!(old.cycle.try_lock().is_ok());
        drop(guard);
        assert!(current.cycle.try_lock().is_ok());
    }
}
