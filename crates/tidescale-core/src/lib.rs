//! tidescale-core: data model shared by every Tidescale crate.
//!
//! Holds the scaling target record, usage samples and bounded workload
//! history, the engine configuration, the error taxonomy, and the small
//! set of statistics used by both the forecaster and the pattern analyzer.

pub mod config;
pub mod error;
pub mod stats;
pub mod types;

pub use config::{EngineConfig, ForecastOrders, parse_duration};
pub use error::{ScaleError, ScaleResult};
pub use types::*;
