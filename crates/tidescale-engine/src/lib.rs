//! tidescale-engine: forecast-driven replica scaling.
//!
//! Collects per-pod usage from a [`MetricsProvider`], classifies the
//! workload's usage pattern, forecasts its load ratio, and sets a bounded
//! replica count through a [`WorkloadOrchestrator`].
//!
//! # Scaling Algorithm
//!
//! ```text
//! cpu, mem     = per-pod average usage of the target's pods
//! policy       = strategy(pattern(cpu history))
//! sample       = max(cpu / cpu_threshold, mem / mem_threshold)
//! load_ratio   = max(forecast(sample history, prediction_window))
//!                or, with a prediction service configured,
//!                max(peak(cpu) / cpu_threshold, peak(mem) / mem_threshold)
//! desired      = clamp(ceil(status.current_replicas * load_ratio), min, max)
//!
//! if policy.pre_warm and load_ratio > policy.threshold:
//!     desired = clamp(max(desired, ceil(min * load_ratio)), min, max)
//!
//! current = orchestrator.get_replicas()
//! if desired == current:                        no-op
//! if now - last_scaled_time < policy.delay:     gated, retry next tick
//! orchestrator.set_replicas(desired); write status
//! ```
//!
//! Cycles for the same workload are serialized; cycles for different
//! workloads run concurrently.

pub mod clock;
pub mod context;
pub mod engine;
pub mod memory;
pub mod provider;
pub mod reconciler;

pub use clock::{Clock, ManualClock, SystemClock};
pub use context::CycleContext;
pub use engine::{CycleOutcome, ScalingDecisionEngine};
pub use memory::{InMemoryMetrics, InMemoryOrchestrator};
pub use provider::{BoxFuture, MetricsProvider, WorkloadOrchestrator};
pub use reconciler::{Reconciler, TargetOutcome};
