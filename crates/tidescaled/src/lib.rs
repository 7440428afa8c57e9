//! tidescaled: drives the Tidescale engine outside a cluster.
//!
//! A scenario file describes scaling targets and the pod usage observed at
//! each tick. [`simulate::run`] replays it through the reconciler against
//! in-memory collaborators on a virtual clock, one `sample_interval` per
//! tick, and reports every decision.

pub mod scenario;
pub mod simulate;

pub use scenario::{PodSample, Scenario, ScenarioTarget, Tick};
pub use simulate::{Decision, SimulationReport, TickReport};
