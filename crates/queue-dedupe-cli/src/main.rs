mod commands;
mod logging;
mod progress;
mod report;

use std::path::{Path, PathBuf};
use std::process;

use anyhow::{bail, Context, Result};
use clap::{CommandFactory, Parser};
use colored::*;
use commands::{Cli, Commands};
use dotenv::dotenv;
use progress::CliReporter;
use queue_dedupe_core::scanner::collect_batch;
use queue_dedupe_core::{AppConfig, CancelToken, ClassifiedFile, DedupEngine, IngestReport, Status, VerifyStats};
use tracing::{error, info, warn};

fn main() -> Result<()> {
    dotenv().ok();

    let _guard = logging::init_logger();

    let config = match queue_dedupe_core::config::load_configuration() {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(1);
        }
    };

    let args = Cli::parse();

    match args.command {
        Some(Commands::Process { paths, report }) => {
            if let Err(err) = run_process(&config, &paths, report.as_deref()) {
                error!("Error: {:#}", err);
                process::exit(1);
            }
        }
        Some(Commands::PrintConfig) => {
            println!("Configuration: {:#?}", config);
        }
        None => {
            let _ = Cli::command().print_long_help();
        }
    }

    Ok(())
}

fn run_process(config: &AppConfig, paths: &[PathBuf], report_path: Option<&Path>) -> Result<()> {
    let folders: Vec<PathBuf> = if paths.is_empty() {
        config.batches.iter().map(PathBuf::from).collect()
    } else {
        paths.to_vec()
    };
    if folders.is_empty() {
        bail!("No folders to process: pass paths or set `batches` in the configuration");
    }

    let engine = DedupEngine::new(config.engine_settings())?;
    let reporter = CliReporter::new();
    let cancel = CancelToken::new();

    for folder in &folders {
        let files = collect_batch(folder, &config.ignore_patterns)
            .with_context(|| format!("scanning {}", folder.display()))?;
        info!("Selected {} files from {}", files.len(), folder.display());

        let (ingest, stats) = engine.process_batch(files, &cancel, &reporter)?;
        print_batch_summary(folder, &ingest, &stats);
    }

    let snapshot = engine.snapshot()?;
    print_queue_summary(&snapshot);

    if let Some(path) = report_path {
        let rows = report::write_report(path, &snapshot)?;
        info!("Wrote {} rows to {}", rows, path.display());
    }

    Ok(())
}

fn print_batch_summary(folder: &Path, ingest: &IngestReport, stats: &VerifyStats) {
    info!(
        "Batch {} ({}): {} added, {} redundant purged, {} path promotions",
        ingest.batch_order,
        folder.display(),
        format!("{}", ingest.added.len()).cyan(),
        format!("{}", ingest.prefilter.redundant_removed).cyan(),
        format!("{}", ingest.prefilter.path_promotions).cyan(),
    );
    if let Some(matched) = &ingest.matched {
        info!(
            "Matched against queue: {} ready, {} duplicates, {} copies, {} promotions",
            matched.ready.len(),
            matched.duplicates.len(),
            matched.copies.len(),
            matched.promotions.len(),
        );
    }
    info!(
        "Verify: {} hashed in {}, {} redundant, {} promoted",
        format!("{}", stats.hashed).green(),
        format!("{:.2}s", stats.elapsed.as_secs_f64()).green(),
        format!("{}", stats.redundant).red(),
        format!("{}", stats.upgraded_to_primary).yellow(),
    );
    if stats.read_errors > 0 {
        warn!("{} files could not be read", format!("{}", stats.read_errors).red());
    }
}

fn print_queue_summary(snapshot: &[ClassifiedFile]) {
    let count = |status: Status| snapshot.iter().filter(|f| f.status == Some(status)).count();
    let upload_bytes: u64 = snapshot
        .iter()
        .filter(|f| f.status == Some(Status::Primary))
        .map(|f| f.size)
        .sum();

    println!();
    info!(
        "Queue: {} files, {} to upload ({} bytes), {} copies, {} redundant, {} unreadable",
        snapshot.len(),
        format!("{}", count(Status::Primary)).green(),
        upload_bytes,
        format!("{}", count(Status::Copy)).cyan(),
        format!("{}", count(Status::Redundant)).red(),
        format!("{}", count(Status::ReadError)).yellow(),
    );
}
