//! Event sources for tracemerge.
//!
//! Decides which targets a trace session runs over ([`TargetProvider`],
//! [`TraceConfig`]) and produces per-target events for them. The
//! [`SimulationSource`] drives randomized message exchanges between
//! simulated targets when no hardware observers are attached.

pub mod config;
pub mod error;
pub mod provider;
pub mod simulation;

pub use config::{TargetConfig, TraceConfig};
pub use error::{SourceError, SourceResult};
pub use provider::{
    ConfigTargetProvider, SimulationTargetProvider, StaticTargetProvider, TargetProvider,
};
pub use simulation::{SimulationConfig, SimulationHandle, SimulationSource};
