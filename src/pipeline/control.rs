//! # Run Control Module
//!
//! Superficie di controllo della pipeline: flag di esecuzione condiviso e controller
//! che gestisce il worker in background.
//!
//! ## Responsabilità:
//! - `RunControl`: booleano atomico letto dal worker, scritto dal controller (o da un
//!   throttle esterno). Lo stop viene osservato entro il tempo di un file, o entro
//!   `cancel_poll_interval_ms` durante un transcode.
//! - `PipelineController`: `start`, `pause` (stop, ledger conservato), `cancel` (stop +
//!   ledger eliminato), `wait`.
//!
//! ## Canali:
//! - Outbound: `watch::Receiver<ProgressEvent>` restituito da `start` (latest-value-wins)
//! - Inbound: `RunControl`
//!
//! Un solo worker alla volta: `start` fallisce se una run è già attiva.

use crate::backend::{ImageBackend, VideoBackend};
use crate::config::{Config, SpeedPreset};
use crate::error::CompressError;
use crate::pipeline::media_pipeline::{FileProcessingPipeline, RunReport};
use crate::pipeline::progress_tracker::{ProgressEvent, ProgressTracker};
use crate::state::ProgressLedger;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Cooperative run/stop flag shared between the controller and the worker
#[derive(Debug, Clone)]
pub struct RunControl {
    running: Arc<AtomicBool>,
}

impl RunControl {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Ask the worker to stop at the next check
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.running.store(true, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Default for RunControl {
    fn default() -> Self {
        Self::new()
    }
}

/// Parameters of one `start` call
#[derive(Debug, Clone)]
pub struct StartRequest {
    pub source: PathBuf,
    /// Destination root, None = configured or sibling `output` folder
    pub destination: Option<PathBuf>,
    /// Continue from the saved ledger instead of discarding it
    pub resume: bool,
    pub speed: Option<SpeedPreset>,
    pub quality: Option<u8>,
    /// Total bytes expected in the tree, used for the persisted percentage
    pub total_bytes_hint: Option<u64>,
}

impl StartRequest {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: None,
            resume: false,
            speed: None,
            quality: None,
            total_bytes_hint: None,
        }
    }
}

type Worker = JoinHandle<Result<RunReport, CompressError>>;

/// Owns the background worker of a compression run
pub struct PipelineController {
    config: Config,
    image_backend: Arc<dyn ImageBackend>,
    video_backend: Arc<dyn VideoBackend>,
    control: RunControl,
    worker: Option<Worker>,
    ledger_path: Option<PathBuf>,
}

impl PipelineController {
    pub fn new(
        config: Config,
        image_backend: Arc<dyn ImageBackend>,
        video_backend: Arc<dyn VideoBackend>,
    ) -> Self {
        Self {
            config,
            image_backend,
            video_backend,
            control: RunControl::new(),
            worker: None,
            ledger_path: None,
        }
    }

    /// Handle on the run flag, for external schedulers
    pub fn control(&self) -> RunControl {
        self.control.clone()
    }

    /// Ledger file used by the current or last run
    pub fn ledger_path(&self) -> Option<&PathBuf> {
        self.ledger_path.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.worker
            .as_ref()
            .map(|worker| !worker.is_finished())
            .unwrap_or(false)
    }

    /// Spawn the worker. Returns the progress event stream.
    pub async fn start(
        &mut self,
        request: StartRequest,
    ) -> Result<watch::Receiver<ProgressEvent>, CompressError> {
        if self.is_active() {
            return Err(CompressError::Validation(
                "A compression run is already in progress".to_string(),
            ));
        }
        if let Some(finished) = self.worker.take() {
            // Previous run ended without being awaited
            if let Ok(Err(e)) = finished.await {
                warn!("Previous run ended with an error: {}", e);
            }
        }

        let mut config = self.config.clone();
        if let Some(speed) = request.speed {
            config.speed = speed;
        }
        if let Some(quality) = request.quality {
            config.image_quality = quality;
        }
        config.validate()?;

        if !request.source.is_dir() {
            return Err(CompressError::Validation(format!(
                "Source folder does not exist: {}",
                request.source.display()
            )));
        }
        let source = request.source.canonicalize()?;
        let destination = match request.destination {
            Some(destination) => destination,
            None => config.destination_for(&source),
        };
        let destination = std::path::absolute(&destination)?;

        let ledger_path = match config.state_file {
            Some(ref path) => path.clone(),
            None => ProgressLedger::default_path(&source, &destination)?,
        };
        let ledger = if request.resume {
            ProgressLedger::load(&ledger_path).await?
        } else {
            ProgressLedger::fresh(&ledger_path).await?
        };

        info!(
            "Starting run: {} -> {} (speed: {}, quality: {}, resume: {})",
            source.display(),
            destination.display(),
            config.speed,
            config.image_quality,
            request.resume
        );

        let (tracker, events) = ProgressTracker::new(ProgressEvent::from_ledger(ledger.data()));
        let mut pipeline = FileProcessingPipeline::new(
            source,
            destination,
            Arc::new(config),
            self.image_backend.clone(),
            self.video_backend.clone(),
            ledger,
            self.control.clone(),
            tracker,
        );
        if let Some(total) = request.total_bytes_hint {
            pipeline = pipeline.with_total_bytes(total);
        }

        self.control.resume();
        self.ledger_path = Some(ledger_path);
        self.worker = Some(tokio::spawn(async move { pipeline.run().await }));

        Ok(events)
    }

    /// Stop the worker and keep the ledger for a later resume
    pub async fn pause(&mut self) -> Result<Option<RunReport>, CompressError> {
        debug!("Pause requested");
        self.control.stop();
        self.join().await
    }

    /// Stop the worker and delete the saved ledger
    pub async fn cancel(&mut self) -> Result<Option<RunReport>, CompressError> {
        debug!("Cancel requested");
        self.control.stop();
        let report = self.join().await;
        if let Some(ref path) = self.ledger_path {
            ProgressLedger::discard(path).await?;
        }
        report
    }

    /// Wait for the worker to finish on its own
    pub async fn wait(&mut self) -> Result<Option<RunReport>, CompressError> {
        self.join().await
    }

    async fn join(&mut self) -> Result<Option<RunReport>, CompressError> {
        match self.worker.take() {
            Some(worker) => {
                let report = worker
                    .await
                    .map_err(|e| CompressError::Io(std::io::Error::other(e)))??;
                Ok(Some(report))
            }
            None => Ok(None),
        }
    }
}
