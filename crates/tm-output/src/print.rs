use std::io::{self, Write};

use async_trait::async_trait;
use colored::Colorize;

use tm_types::{EventKind, TraceEvent};

use crate::error::OutputResult;
use crate::output::TraceOutput;
use crate::post::PostProcessingStep;

/// One console line: `[target] seq description  {clock}`.
pub fn format_event(event: &TraceEvent, color: bool) -> String {
    let clock = event
        .vector_clock()
        .map(ToString::to_string)
        .unwrap_or_default();
    if !color {
        return format!("{event}  {clock}").trim_end().to_owned();
    }
    let seq = event
        .sequence()
        .map(|s| format!("{s} "))
        .unwrap_or_default();
    let description = match event.kind() {
        EventKind::Send => event.describe().yellow(),
        EventKind::Receive => event.describe().green(),
        EventKind::Internal => event.describe().normal(),
    };
    format!(
        "{} {}{}  {}",
        format!("[{}]", event.target()).cyan().bold(),
        seq.dimmed(),
        description,
        clock.dimmed()
    )
    .trim_end()
    .to_owned()
}

/// Writes every event as one line, by default to stdout.
pub struct PrintOutput<W = io::Stdout> {
    writer: W,
    color: bool,
}

impl PrintOutput {
    pub fn stdout() -> Self {
        Self::new(io::stdout(), true)
    }
}

impl<W: Write + Send> PrintOutput<W> {
    pub fn new(writer: W, color: bool) -> Self {
        Self { writer, color }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[async_trait]
impl<W: Write + Send> TraceOutput for PrintOutput<W> {
    async fn init(&mut self) -> OutputResult<()> {
        Ok(())
    }

    async fn put(&mut self, event: &TraceEvent) -> OutputResult<()> {
        if event.is_transient() {
            return Ok(());
        }
        writeln!(self.writer, "{}", format_event(event, self.color))?;
        Ok(())
    }

    async fn close(&mut self) -> OutputResult<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Post-processing step that prints each event to stdout, for use next to an
/// output that does not print.
#[derive(Debug, Default)]
pub struct PrintStep;

impl PostProcessingStep for PrintStep {
    fn name(&self) -> &str {
        "print"
    }

    fn apply(&mut self, event: &mut TraceEvent) {
        println!("{}", format_event(event, true));
    }
}
