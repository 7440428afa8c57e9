//! tidescale-pattern: classify a workload's load shape and pick a policy.
//!
//! # Classification
//!
//! ```text
//! len < 2                                   → Stable
//! spread(|Δ|) > 2 * mean(|Δ|)               → Burst
//! lone spike dominates all other |Δ|        → Burst
//! ≥ 2 autocorrelation peaks above 0.5       → Periodic
//! stddev / mean < 0.2                       → Stable
//! otherwise                                 → Periodic
//! ```
//!
//! # Policies
//!
//! | Pattern  | Delay | Threshold | Pre-warm lead |
//! |----------|-------|-----------|---------------|
//! | Stable   | 5m    | 0.8       | no            |
//! | Periodic | 2m    | 0.7       | 15m           |
//! | Burst    | 30s   | 0.6       | no            |

pub mod analyzer;
pub mod strategy;

pub use analyzer::{PatternAnalyzer, WorkloadPattern, classify};
pub use strategy::{ScalingPolicy, StrategyFactory};
