//! Scaling strategies: one fixed policy per workload pattern.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use tidescale_core::{EngineConfig, ScaleResult, UsageSample};

use crate::analyzer::{PatternAnalyzer, WorkloadPattern};

/// How aggressively to scale a workload of a given pattern.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScalingPolicy {
    pub pattern: WorkloadPattern,
    /// Minimum time between two scale actions.
    pub scaling_delay: Duration,
    /// Predicted load above which pre-warming kicks in.
    pub scaling_threshold: f64,
    /// Whether to add replicas ahead of forecast demand.
    pub pre_warm: bool,
    /// How far ahead pre-warming looks.
    pub pre_warm_lead: Duration,
}

impl WorkloadPattern {
    /// The policy table.
    pub fn policy(self) -> ScalingPolicy {
        match self {
            WorkloadPattern::Stable => ScalingPolicy {
                pattern: self,
                scaling_delay: Duration::from_secs(5 * 60),
                scaling_threshold: 0.8,
                pre_warm: false,
                pre_warm_lead: Duration::ZERO,
            },
            WorkloadPattern::Periodic => ScalingPolicy {
                pattern: self,
                scaling_delay: Duration::from_secs(2 * 60),
                scaling_threshold: 0.7,
                pre_warm: true,
                pre_warm_lead: Duration::from_secs(15 * 60),
            },
            WorkloadPattern::Burst => ScalingPolicy {
                pattern: self,
                scaling_delay: Duration::from_secs(30),
                scaling_threshold: 0.6,
                pre_warm: false,
                pre_warm_lead: Duration::ZERO,
            },
        }
    }
}

impl Default for ScalingPolicy {
    fn default() -> Self {
        WorkloadPattern::Stable.policy()
    }
}

/// Classifies workloads and hands out the matching policy.
#[derive(Debug)]
pub struct StrategyFactory {
    analyzer: PatternAnalyzer,
}

impl StrategyFactory {
    pub fn new(history_window: Duration, sample_interval: Duration) -> Self {
        Self {
            analyzer: PatternAnalyzer::new(history_window, sample_interval),
        }
    }

    pub fn from_config(config: &EngineConfig) -> ScaleResult<Self> {
        Ok(Self {
            analyzer: PatternAnalyzer::from_config(config)?,
        })
    }

    /// Record `value` for the workload and return the policy for its pattern.
    pub fn get_strategy(&self, workload_key: &str, value: f64) -> ScalingPolicy {
        self.analyzer.analyze_pattern(workload_key, value).policy()
    }

    /// Like [`get_strategy`](Self::get_strategy) with an explicit timestamp.
    pub fn strategy_for_sample(&self, workload_key: &str, sample: UsageSample) -> ScalingPolicy {
        self.analyzer.analyze_sample(workload_key, sample).policy()
    }

    pub fn analyzer(&self) -> &PatternAnalyzer {
        &self.analyzer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_table() {
        let stable = WorkloadPattern::Stable.policy();
        assert_eq!(stable.scaling_delay, Duration::from_secs(300));
        assert_eq!(stable.scaling_threshold, 0.8);
        assert!(!stable.pre_warm);

        let periodic = WorkloadPattern::Periodic.policy();
        assert_eq!(periodic.scaling_delay, Duration::from_secs(120));
        assert_eq!(periodic.scaling_threshold, 0.7);
        assert!(periodic.pre_warm);
        assert_eq!(periodic.pre_warm_lead, Duration::from_secs(900));

        let burst = WorkloadPattern::Burst.policy();
        assert_eq!(burst.scaling_delay, Duration::from_secs(30));
        assert_eq!(burst.scaling_threshold, 0.6);
        assert!(!burst.pre_warm);
        assert_eq!(burst.pre_warm_lead, Duration::ZERO);
    }

    #[test]
    fn default_policy_is_stable() {
        assert_eq!(ScalingPolicy::default().pattern, WorkloadPattern::Stable);
    }

    #[test]
    fn first_sample_gets_stable_policy() {
        let factory = StrategyFactory::new(Duration::from_secs(3600), Duration::from_secs(60));
        let policy = factory.get_strategy("default/web", 0.9);
        assert_eq!(policy.pattern, WorkloadPattern::Stable);
    }

    #[test]
    fn spike_switches_to_burst_policy() {
        let factory = StrategyFactory::from_config(&EngineConfig::default()).unwrap();
        for (i, v) in [1.0, 1.0, 1.0, 1.0].into_iter().enumerate() {
            factory.strategy_for_sample("default/web", UsageSample { timestamp: i as u64, value: v });
        }
        let policy = factory.strategy_for_sample(
            "default/web",
            UsageSample {
                timestamp: 4,
                value: 10.0,
            },
        );
        assert_eq!(policy.pattern, WorkloadPattern::Burst);
        assert_eq!(policy.scaling_delay, Duration::from_secs(30));
        assert_eq!(factory.analyzer().history_len("default/web"), Some(5));
    }
}
