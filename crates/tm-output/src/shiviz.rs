use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::info;

use tm_types::TraceEvent;

use crate::error::{OutputError, OutputResult};
use crate::output::TraceOutput;

/// Log parsing pattern ShiViz is given as the first line of the file.
pub const SHIVIZ_PATTERN: &str = r"(?<host>\w+)\|(?<event>.*)\|(?<clock>\{.*\})";

pub const DEFAULT_SHIVIZ_PATH: &str = "shiviz_trace.txt";

/// Writes a log file the ShiViz visualizer can load.
///
/// Layout: the parsing pattern, a blank line, then one
/// `host|description|{"a":1,"b":0}` line per event. Transient events are
/// skipped. ShiViz' `\w+` host group means target names should stick to
/// word characters.
pub struct ShiVizOutput {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    written: u64,
}

impl ShiVizOutput {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: None,
            written: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    /// Render one event line without the trailing newline.
    pub fn format_line(event: &TraceEvent) -> OutputResult<String> {
        let clock = match event.vector_clock() {
            Some(clock) => serde_json::to_string(&clock.to_map())?,
            None => "{}".to_owned(),
        };
        Ok(format!("{}|{}|{}", event.target(), event.describe(), clock))
    }
}

impl Default for ShiVizOutput {
    fn default() -> Self {
        Self::new(DEFAULT_SHIVIZ_PATH)
    }
}

#[async_trait]
impl TraceOutput for ShiVizOutput {
    async fn init(&mut self) -> OutputResult<()> {
        let file = File::create(&self.path)
            .await
            .map_err(|source| OutputError::Open {
                path: self.path.clone(),
                source,
            })?;
        let mut writer = BufWriter::new(file);
        writer.write_all(SHIVIZ_PATTERN.as_bytes()).await?;
        writer.write_all(b"\n\n").await?;
        self.writer = Some(writer);
        Ok(())
    }

    async fn put(&mut self, event: &TraceEvent) -> OutputResult<()> {
        if event.is_transient() {
            return Ok(());
        }
        let line = Self::format_line(event)?;
        let writer = self
            .writer
            .as_mut()
            .ok_or(OutputError::NotInitialized("shiviz"))?;
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        self.written += 1;
        Ok(())
    }

    async fn close(&mut self) -> OutputResult<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush().await?;
            info!(path = %self.path.display(), events = self.written, "shiviz trace written");
        }
        Ok(())
    }
}
