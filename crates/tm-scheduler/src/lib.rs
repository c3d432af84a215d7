//! Causal merge of per-target event streams.
//!
//! Each traced target feeds an [`EventQueue`]. The [`Scheduler`] pulls from
//! all queues in barrier rounds and emits one totally ordered sequence in
//! which every receive follows its send, stamping each event with a global
//! sequence number and a vector clock. Sends waiting for their receives are
//! kept in a [`CorrelationTable`], pruned periodically by an
//! [`EvictionSweep`].

pub mod correlation;
pub mod error;
pub mod eviction;
pub mod queue;
pub mod scheduler;
pub mod stats;
pub mod target;

pub use correlation::{CorrelatedSend, CorrelationTable};
pub use error::{Result, SchedulerError};
pub use eviction::{EvictionReport, EvictionSweep};
pub use queue::EventQueue;
pub use scheduler::{EventStream, Scheduler, SchedulerConfig, StopHandle};
pub use stats::{SchedulerStats, StatsSnapshot};
pub use target::{Target, TargetHandle};
