//! batch_etl - load staging detections into the warehouse without duplicates
//!
//! Each run:
//! 1. Lists `*.csv` staging files in path order
//! 2. Skips files already recorded in the checkpoint
//! 3. Cleans, batches (images: one batch, video: 10 s windows per source)
//!    and publishes each remaining file
//! 4. Records each fully published file in the checkpoint before moving on
//!
//! Per-file failures are logged and counted; the process only exits non-zero
//! when the checkpoint cannot be read or written.

use anyhow::{Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;

use detection_etl::{
    Batcher, CheckpointStore, EtlConfig, FileCheckpointStore, FileOutcome, InMemoryCheckpointStore,
    Pipeline, PipelineOptions, PublishKind, RecordingLoader, RunStamp, RunSummary,
};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Config file (JSON, or TOML with a .toml extension). Falls back to ETL_CONFIG.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Directory holding staging CSV files.
    #[arg(long, value_name = "DIR")]
    staging_dir: Option<PathBuf>,
    /// Local directory for batch files before publishing.
    #[arg(long, value_name = "DIR")]
    processed_dir: Option<PathBuf>,
    /// Checkpoint file listing processed staging files.
    #[arg(long, value_name = "PATH")]
    checkpoint: Option<PathBuf>,
    /// Publish target location (directory path or HDFS path).
    #[arg(long, value_name = "DIR")]
    publish_dir: Option<String>,
    /// Publish target kind (directory|hdfs).
    #[arg(long, value_name = "KIND")]
    publish_kind: Option<String>,
    /// Clean and batch only: publish nothing, write no checkpoint.
    #[arg(long)]
    dry_run: bool,
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = ui::Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty);

    let cfg = {
        let _stage = ui.stage("Load configuration");
        let mut cfg = EtlConfig::load_from(args.config.as_deref())?;
        apply_args(&mut cfg, &args)?;
        cfg.validate()?;
        cfg
    };
    log::info!(
        "staging={} processed={} checkpoint={} publish={}",
        cfg.staging_dir.display(),
        cfg.processed_dir.display(),
        cfg.checkpoint_path.display(),
        cfg.publish.target().describe()
    );

    let stamp = RunStamp::now();
    let summary = if args.dry_run {
        let _stage = ui.stage("Plan batches (dry run)");
        dry_run(&cfg, &stamp)?
    } else {
        let _stage = ui.stage("Ingest staging files");
        Pipeline::from_config(&cfg)
            .run(&stamp)
            .context("ETL run aborted")?
    };

    print_summary(&summary);
    Ok(())
}

fn apply_args(cfg: &mut EtlConfig, args: &Args) -> Result<()> {
    if let Some(dir) = &args.staging_dir {
        cfg.staging_dir = dir.clone();
    }
    if let Some(dir) = &args.processed_dir {
        cfg.processed_dir = dir.clone();
    }
    if let Some(path) = &args.checkpoint {
        cfg.checkpoint_path = path.clone();
    }
    if let Some(dir) = &args.publish_dir {
        cfg.publish.dir = dir.clone();
    }
    if let Some(kind) = &args.publish_kind {
        cfg.publish.kind = PublishKind::parse(kind)?;
    }
    Ok(())
}

fn dry_run(cfg: &EtlConfig, stamp: &RunStamp) -> Result<RunSummary> {
    let recorded = FileCheckpointStore::new(&cfg.checkpoint_path).load()?;
    let mut pipeline = Pipeline::new(
        &cfg.staging_dir,
        Batcher::new(cfg.window_secs),
        RecordingLoader::new(),
        InMemoryCheckpointStore::with_ids(recorded),
    )
    .with_options(PipelineOptions {
        checkpoint_empty_files: cfg.checkpoint_empty_files,
        abort_on_file_error: cfg.abort_on_file_error,
    });
    let summary = pipeline.run(stamp)?;
    for batch in pipeline.loader().published() {
        println!(
            "would publish {} ({})",
            batch.name,
            batch.describe(cfg.window_secs)
        );
    }
    Ok(summary)
}

fn print_summary(summary: &RunSummary) {
    for file in &summary.files {
        if let FileOutcome::Failed {
            stage,
            kind,
            reason,
        } = &file.outcome
        {
            println!(
                "failed: {} (before {}, {}): {}",
                file.path.display(),
                stage,
                kind,
                reason
            );
        }
    }
    println!("{}", summary);
}
