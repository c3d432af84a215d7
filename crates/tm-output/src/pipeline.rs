use tracing::debug;

use tm_scheduler::EventStream;
use tm_types::TraceEvent;

use crate::error::OutputResult;
use crate::output::TraceOutput;
use crate::post::PostProcessingStep;

/// Post-processing steps followed by one output.
pub struct Pipeline {
    steps: Vec<Box<dyn PostProcessingStep>>,
    output: Box<dyn TraceOutput>,
    delivered: u64,
}

impl Pipeline {
    pub fn new(output: Box<dyn TraceOutput>) -> Self {
        Self {
            steps: Vec::new(),
            output,
            delivered: 0,
        }
    }

    pub fn with_step(mut self, step: Box<dyn PostProcessingStep>) -> Self {
        self.steps.push(step);
        self
    }

    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    pub async fn init(&mut self) -> OutputResult<()> {
        self.output.init().await
    }

    /// Run the steps over `event`, then hand it to the output.
    pub async fn deliver(&mut self, mut event: TraceEvent) -> OutputResult<()> {
        for step in &mut self.steps {
            step.apply(&mut event);
        }
        self.output.put(&event).await?;
        self.delivered += 1;
        Ok(())
    }

    /// Deliver events from `stream` until it ends or `limit` events were
    /// delivered. Returns the number delivered by this call.
    pub async fn consume(&mut self, stream: &mut EventStream, limit: Option<u64>) -> OutputResult<u64> {
        let mut count = 0;
        while limit.map_or(true, |limit| count < limit) {
            let Some(event) = stream.recv().await else {
                debug!("event stream ended");
                break;
            };
            self.deliver(event).await?;
            count += 1;
        }
        Ok(count)
    }

    pub async fn close(&mut self) -> OutputResult<()> {
        self.output.close().await
    }
}
