use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(
    name = "tracemerge",
    about = "Causal merge of multi-target traces",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Merge the event streams of a target set and write the result
    Run(RunArgs),
    /// Load a trace configuration and print its target set
    CheckConfig(CheckConfigArgs),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum SourceKind {
    /// Simulated targets named 0..N-1
    Sim,
    /// Targets from a configuration file, driven by the simulator
    Config,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputKind {
    Null,
    Print,
    Shiviz,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum PostKind {
    Print,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    #[arg(long, value_enum, default_value = "sim")]
    pub source: SourceKind,

    /// Number of simulated targets
    #[arg(long, default_value = "3")]
    pub targets: usize,

    /// Trace configuration (.toml or .json), required with `--source config`
    #[arg(long, required_if_eq("source", "config"))]
    pub config: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "print")]
    pub output: OutputKind,

    #[arg(long, default_value = tm_output::DEFAULT_SHIVIZ_PATH)]
    pub shiviz_path: PathBuf,

    /// Post-processing steps, applied in order
    #[arg(long, value_enum)]
    pub post: Vec<PostKind>,

    /// Stop after this many merged events (default: until Ctrl-C)
    #[arg(short = 'n', long)]
    pub limit: Option<u64>,

    /// Emitted events between two eviction sweeps (0 disables eviction)
    #[arg(long)]
    pub eviction_interval: Option<u64>,

    /// Upper bound of a simulated target's pause between steps
    #[arg(long, default_value = "1000")]
    pub period_ms: u64,

    /// Seed for a reproducible simulation
    #[arg(long)]
    pub seed: Option<u64>,
}

#[derive(Args, Debug)]
pub struct CheckConfigArgs {
    pub path: PathBuf,
}
