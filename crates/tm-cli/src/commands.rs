use std::path::Path;

use anyhow::Context;
use colored::Colorize;
use tracing::{info, warn};

use tm_output::{NullOutput, Pipeline, PrintOutput, PrintStep, ShiVizOutput, TraceOutput};
use tm_scheduler::{Scheduler, SchedulerConfig, StatsSnapshot, Target};
use tm_source::{
    ConfigTargetProvider, SimulationConfig, SimulationSource, SimulationTargetProvider,
    TargetProvider, TraceConfig,
};

use crate::cli::*;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Run(args) => cmd_run(args).await,
        Command::CheckConfig(args) => cmd_check_config(&args.path),
    }
}

/// Target set and scheduler settings for a run.
fn prepare(args: &RunArgs) -> anyhow::Result<(Vec<Target>, SchedulerConfig)> {
    let (targets, mut config) = match args.source {
        SourceKind::Sim => (
            SimulationTargetProvider::new(args.targets).targets()?,
            SchedulerConfig::default(),
        ),
        SourceKind::Config => {
            let path = args
                .config
                .as_deref()
                .context("--config is required with --source config")?;
            let trace = TraceConfig::load(path)
                .with_context(|| format!("loading {}", path.display()))?;
            let scheduler = trace.scheduler_config();
            (ConfigTargetProvider::new(trace)?.targets()?, scheduler)
        }
    };
    if let Some(interval) = args.eviction_interval {
        config.eviction_interval = interval;
    }
    Ok((targets, config))
}

fn build_output(args: &RunArgs) -> Box<dyn TraceOutput> {
    match args.output {
        OutputKind::Null => Box::new(NullOutput::new()),
        OutputKind::Print => Box::new(PrintOutput::stdout()),
        OutputKind::Shiviz => Box::new(ShiVizOutput::new(&args.shiviz_path)),
    }
}

fn build_pipeline(args: &RunArgs) -> Pipeline {
    args.post
        .iter()
        .fold(Pipeline::new(build_output(args)), |pipeline, post| match post {
            PostKind::Print => pipeline.with_step(Box::new(PrintStep)),
        })
}

async fn cmd_run(args: RunArgs) -> anyhow::Result<()> {
    let (targets, config) = prepare(&args)?;
    let scheduler = Scheduler::new(targets, config)?;
    let handles = scheduler.handles();
    let target_count = handles.len();

    let mut pipeline = build_pipeline(&args);
    pipeline.init().await?;

    let (mut stream, stop, task) = scheduler.spawn();
    let simulation = SimulationSource::new(
        handles,
        SimulationConfig {
            period_ms: args.period_ms,
            seed: args.seed,
        },
    )?
    .start();
    info!(targets = target_count, limit = ?args.limit, "trace session started");

    let delivered = tokio::select! {
        delivered = pipeline.consume(&mut stream, args.limit) => delivered?,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted");
            pipeline.delivered()
        }
    };

    let produced = simulation.join().await?;
    stop.stop();
    let stats = task.await.context("scheduler task panicked")??;
    pipeline.close().await?;

    print_summary(delivered, produced, &stats);
    Ok(())
}

fn print_summary(delivered: u64, produced: u64, stats: &StatsSnapshot) {
    eprintln!("{} Merged {} events", "✓".green().bold(), delivered.to_string().bold());
    eprintln!("  Produced:          {produced}");
    eprintln!("  Scheduled:         {}", stats.emitted);
    eprintln!("  Deferred receives: {}", stats.deferred_receives);
    eprintln!("  Stalled rounds:    {}", stats.stalled_rounds);
    eprintln!(
        "  Eviction:          {} sweeps, {} evicted, {} retained",
        stats.sweeps, stats.evicted, stats.correlation_table_size
    );
}

fn cmd_check_config(path: &Path) -> anyhow::Result<()> {
    let config =
        TraceConfig::load(path).with_context(|| format!("loading {}", path.display()))?;
    println!(
        "{} {} targets in {}",
        "✓".green().bold(),
        config.targets.len(),
        path.display().to_string().bold()
    );
    for target in &config.targets {
        let host = target.host.as_deref().unwrap_or("-");
        println!("  {}  host: {}", target.name.yellow(), host.cyan());
        if let Some(elf) = &target.elf_path {
            println!("      elf: {}", elf.display());
        }
        if !target.watched_vars.is_empty() {
            println!("      watching: {}", target.watched_vars.join(", "));
        }
    }
    let scheduler = config.scheduler_config();
    println!(
        "  scheduler: eviction every {} events, stall backoff {} ms",
        scheduler.eviction_interval, scheduler.stall_backoff_ms
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn run_args(argv: &[&str]) -> RunArgs {
        let mut full = vec!["tracemerge", "run"];
        full.extend_from_slice(argv);
        match Cli::try_parse_from(full).unwrap().command {
            Command::Run(args) => args,
            _ => panic!("wrong command"),
        }
    }

    #[test]
    fn prepare_simulated_targets() {
        let (targets, config) = prepare(&run_args(&["--targets", "4", "--eviction-interval", "7"])).unwrap();
        assert_eq!(targets.len(), 4);
        assert_eq!(config.eviction_interval, 7);
    }

    #[test]
    fn prepare_from_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.toml");
        std::fs::write(
            &path,
            "[scheduler]\neviction_interval = 12\n\n[[targets]]\nname = \"a\"\n\n[[targets]]\nname = \"b\"\n",
        )
        .unwrap();
        let path_str = path.to_str().unwrap();

        let (targets, config) = prepare(&run_args(&["--source", "config", "--config", path_str])).unwrap();
        assert_eq!(targets.len(), 2);
        assert_eq!(config.eviction_interval, 12);

        let (_, overridden) = prepare(&run_args(&[
            "--source",
            "config",
            "--config",
            path_str,
            "--eviction-interval",
            "3",
        ]))
        .unwrap();
        assert_eq!(overridden.eviction_interval, 3);
    }

    #[test]
    fn check_config_reports_bad_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.json");
        std::fs::write(&path, r#"{"targets":[]}"#).unwrap();
        assert!(cmd_check_config(&path).is_err());
    }

    #[tokio::test]
    async fn run_with_limit_finishes() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("trace.txt");
        let args = run_args(&[
            "--targets",
            "2",
            "--output",
            "shiviz",
            "--shiviz-path",
            out.to_str().unwrap(),
            "-n",
            "10",
            "--period-ms",
            "8",
            "--seed",
            "3",
        ]);
        cmd_run(args).await.unwrap();

        let text = std::fs::read_to_string(&out).unwrap();
        assert_eq!(text.lines().count(), 12);
    }
}
