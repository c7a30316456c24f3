//! # Media Compressor - Main Entry Point
//!
//! Questo è il punto di ingresso principale dell'applicazione.
//!
//! ## Responsabilità:
//! - Parsing degli argomenti della command line con `clap` (sottocomandi `run` e `analyze`)
//! - Inizializzazione del sistema di logging con `tracing` (stderr, `RUST_LOG` rispettato)
//! - Validazione degli input dell'utente
//! - Avvio del controller e osservazione degli eventi di progresso
//! - Ctrl+C mette in pausa la run: il ledger resta su disco per `--resume`
//!
//! ## Flusso di esecuzione (`run`):
//! 1. Carica la configurazione (file opzionale + override da CLI)
//! 2. Stima preliminare dell'albero per dimensionare la progress bar in byte
//! 3. Avvia il worker tramite `PipelineController`
//! 4. Aggiorna progress bar (o emette JSON) a ogni evento
//! 5. Stampa il riepilogo con gli elenchi dei file copiati
//!
//! ## Esempio di utilizzo:
//! ```bash
//! media-compressor analyze /path/to/media --speed slow
//! media-compressor run /path/to/media --speed slow --quality 30 --resume
//! ```

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use media_compressor::json_output::{JsonConfig, JsonMessage};
use media_compressor::platform::PlatformCommands;
use media_compressor::progress::ProgressManager;
use media_compressor::{
    CompressError, CompressionEstimator, Config, EstimationReport, FfmpegVideoCompressor,
    ImageCompressor, PipelineController, ProgressEvent, RunOutcome, SpeedPreset, StartRequest,
};

#[derive(Parser)]
#[command(name = "media-compressor")]
#[command(about = "Resumable batch compression of image and video folders")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Compress a folder into the output directory
    Run(RunArgs),
    /// Count files and estimate the compression time
    Analyze(AnalyzeArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Folder containing the media to compress
    folder: PathBuf,

    /// Output directory (default: `output` next to the folder)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Continue a previous run instead of starting over
    #[arg(long)]
    resume: bool,

    /// Video encoder speed preset
    #[arg(short, long, value_enum)]
    speed: Option<SpeedPreset>,

    /// JPEG quality (1-100)
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(1..=100))]
    quality: Option<u8>,

    /// Progress file location
    #[arg(long)]
    state_file: Option<PathBuf>,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output progress and status as JSON lines on stdout
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct AnalyzeArgs {
    /// Folder to analyze
    folder: PathBuf,

    /// Video encoder speed preset used for the estimate
    #[arg(short, long, value_enum, default_value_t = SpeedPreset::Fast)]
    speed: SpeedPreset,

    /// Output the report as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging; stderr keeps stdout clean for JSON mode
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let (json, result) = match cli.command {
        Command::Run(args) => (args.json, run(args).await),
        Command::Analyze(args) => (args.json, analyze(args).await),
    };

    if let Err(ref e) = result {
        if json {
            JsonMessage::error(e.to_string(), Some(format!("{:#}", e))).emit();
        }
    }
    result
}

async fn analyze_tree(folder: PathBuf, speed: SpeedPreset) -> Result<EstimationReport> {
    let report = tokio::task::spawn_blocking(move || CompressionEstimator::analyze(&folder, speed))
        .await
        .context("Analysis task failed")??;
    Ok(report)
}

async fn analyze(args: AnalyzeArgs) -> Result<()> {
    let spinner = (!args.json).then(|| ProgressManager::spinner("Analyzing folder..."));
    let report = analyze_tree(args.folder, args.speed).await;
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }
    let report = report?;

    if args.json {
        JsonMessage::Analysis(report).emit();
    } else {
        println!("{}", report.format_report());
    }
    Ok(())
}

async fn load_config(args: &RunArgs) -> Result<Config> {
    let mut config = match args.config {
        Some(ref path) => Config::from_file(path)
            .await
            .with_context(|| format!("Invalid configuration file {}", path.display()))?,
        None => Config::default(),
    };

    if let Some(ref output) = args.output {
        config.output_path = Some(output.clone());
    }
    if let Some(ref state_file) = args.state_file {
        config.state_file = Some(state_file.clone());
    }
    if let Some(speed) = args.speed {
        config.speed = speed;
    }
    if let Some(quality) = args.quality {
        config.image_quality = quality;
    }
    config.json_output |= args.json;
    config.validate()?;
    Ok(config)
}

async fn run(args: RunArgs) -> Result<()> {
    if !args.folder.is_dir() {
        return Err(anyhow::anyhow!(
            "Source folder does not exist: {}",
            args.folder.display()
        ));
    }
    let config = load_config(&args).await?;
    let json = config.json_output;

    if !PlatformCommands::instance().is_command_available("ffmpeg").await {
        warn!("ffmpeg not found on PATH, large videos will fail and be retried on the next run");
    }

    let source = args.folder.canonicalize()?;
    let destination = config.destination_for(&source);
    let estimate = analyze_tree(source.clone(), config.speed).await?;
    info!(
        "{} files ({}) to process, estimated time: {}",
        estimate.total_files,
        media_compressor::file_manager::FileManager::format_size(estimate.total_bytes),
        media_compressor::estimator::format_time(estimate.total_minutes)
    );

    let mut controller = PipelineController::new(
        config.clone(),
        Arc::new(ImageCompressor::new(config.preserve_metadata)),
        Arc::new(FfmpegVideoCompressor::new(Duration::from_millis(
            config.cancel_poll_interval_ms,
        ))),
    );

    let request = StartRequest {
        destination: Some(destination.clone()),
        resume: args.resume,
        total_bytes_hint: Some(estimate.total_bytes),
        ..StartRequest::new(&source)
    };
    let events = match controller.start(request).await {
        Ok(events) => events,
        Err(e @ CompressError::LedgerCorrupt { .. }) => {
            return Err(anyhow::anyhow!(
                "{}. Run without --resume to start over.",
                e
            ));
        }
        Err(e) => return Err(e.into()),
    };

    if json {
        JsonMessage::start(
            source,
            destination,
            args.resume,
            estimate.total_bytes,
            JsonConfig::from(&config),
        )
        .emit();
    }

    let started = Instant::now();
    let bar = (!json).then(|| ProgressManager::new(estimate.total_bytes));
    let mut observer = tokio::spawn(observe(events, estimate.total_bytes, bar.clone()));

    let interrupted = tokio::select! {
        _ = tokio::signal::ctrl_c() => true,
        _ = &mut observer => false,
    };

    let report = if interrupted {
        warn!("Interrupted, pausing. Use --resume to continue.");
        let report = controller.pause().await?;
        let _ = observer.await;
        report
    } else {
        controller.wait().await?
    }
    .context("Compression worker ended without a report")?;

    let stopped = report.outcome == RunOutcome::Stopped;
    let summary_line = report.summary.format_summary();
    match bar {
        Some(ref bar) if stopped => bar.abandon(&format!("Paused. {}", summary_line)),
        Some(ref bar) => bar.finish(&summary_line),
        None => {}
    }

    if json {
        JsonMessage::complete(stopped, report.summary, started.elapsed().as_secs_f64()).emit();
    } else {
        let details = report.summary.format_details();
        if !details.is_empty() {
            eprint!("{}", details);
        }
        info!(
            "All runs so far: {} files, {} -> {}",
            report.counters.processed_files.len(),
            media_compressor::file_manager::FileManager::format_size(
                report.counters.total_original_bytes()
            ),
            media_compressor::file_manager::FileManager::format_size(
                report.counters.total_final_bytes()
            )
        );
    }

    Ok(())
}

/// Mirror progress events onto the bar, or stdout in JSON mode, until the worker ends
async fn observe(
    mut events: watch::Receiver<ProgressEvent>,
    total_bytes: u64,
    bar: Option<ProgressManager>,
) {
    if let Some(ref bar) = bar {
        bar.set_position(events.borrow().total_original_bytes);
    }

    while events.changed().await.is_ok() {
        let event = events.borrow_and_update().clone();
        match bar {
            Some(ref bar) => {
                bar.set_position(event.total_original_bytes);
                if let Some(name) = event.current_file.as_ref().and_then(|path| path.file_name()) {
                    bar.set_message(&name.to_string_lossy());
                }
            }
            None => JsonMessage::progress(event, total_bytes).emit(),
        }
    }
}
