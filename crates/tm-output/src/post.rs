use tm_types::TraceEvent;

/// Transformation or side effect applied to each event after it leaves the
/// scheduler and before it reaches the output.
pub trait PostProcessingStep: Send {
    fn name(&self) -> &str;

    fn apply(&mut self, event: &mut TraceEvent);
}
