//! Outputs for the merged trace.
//!
//! Events leaving the scheduler pass through a [`Pipeline`]: zero or more
//! [`PostProcessingStep`]s, then one [`TraceOutput`] such as the console
//! ([`PrintOutput`]) or a ShiViz log file ([`ShiVizOutput`]).

pub mod error;
pub mod output;
pub mod pipeline;
pub mod post;
pub mod print;
pub mod shiviz;

pub use error::{OutputError, OutputResult};
pub use output::{NullOutput, TraceOutput};
pub use pipeline::Pipeline;
pub use post::PostProcessingStep;
pub use print::{format_event, PrintOutput, PrintStep};
pub use shiviz::{ShiVizOutput, DEFAULT_SHIVIZ_PATH, SHIVIZ_PATTERN};
