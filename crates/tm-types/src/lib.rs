//! Foundation types for tracemerge.
//!
//! This crate provides the clock algebra and event model shared by the
//! scheduler, the event sources, and the outputs. Every other tracemerge
//! crate depends on `tm-types`.
//!
//! # Key Types
//!
//! - [`Clock`] — Immutable scalar logical counter
//! - [`VectorClock`] — Persistent per-target map of [`Clock`]s capturing happened-before
//! - [`TargetId`] / [`MessageId`] — Identities of traced targets and exchanged messages
//! - [`TraceEvent`] — One captured event, stamped by the scheduler
//! - [`TracePacket`] — Compact observer record decoded into a [`TraceEvent`]

pub mod clock;
pub mod error;
pub mod event;
pub mod identity;
pub mod packet;
pub mod vector_clock;

pub use clock::Clock;
pub use error::TypeError;
pub use event::{EventKind, EventPayload, Participants, TraceEvent};
pub use identity::{MessageId, TargetId};
pub use packet::TracePacket;
pub use vector_clock::VectorClock;
