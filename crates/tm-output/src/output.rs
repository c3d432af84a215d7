use async_trait::async_trait;

use tm_types::{TraceEvent, TracePacket};

use crate::error::OutputResult;

/// Destination for the merged, causally ordered event stream.
#[async_trait]
pub trait TraceOutput: Send {
    async fn init(&mut self) -> OutputResult<()>;

    /// Write one scheduled event.
    async fn put(&mut self, event: &TraceEvent) -> OutputResult<()>;

    /// Write an undecoded packet. Most outputs ignore these.
    async fn put_raw(&mut self, _packet: &TracePacket) -> OutputResult<()> {
        Ok(())
    }

    async fn close(&mut self) -> OutputResult<()>;
}

/// Discards everything; counts what it was given.
#[derive(Debug, Default)]
pub struct NullOutput {
    received: u64,
}

impl NullOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn received(&self) -> u64 {
        self.received
    }
}

#[async_trait]
impl TraceOutput for NullOutput {
    async fn init(&mut self) -> OutputResult<()> {
        Ok(())
    }

    async fn put(&mut self, _event: &TraceEvent) -> OutputResult<()> {
        self.received += 1;
        Ok(())
    }

    async fn close(&mut self) -> OutputResult<()> {
        Ok(())
    }
}
