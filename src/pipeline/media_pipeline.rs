//! # Media Pipeline Orchestrator
//!
//! Macchina a stati che processa un albero sorgente un file alla volta.
//!
//! ## Stati:
//! `Idle → Scanning → (Classifying → Acting → Recording)* → Idle`, con `Stopped`
//! raggiungibile da ogni passo quando `RunControl` viene disattivato. `Stopped` non è
//! terminale: una nuova chiamata a `run()` riparte da `Scanning` con lo stesso ledger,
//! saltando i file già registrati.
//!
//! ## Per ogni file (ordine deterministico della walk):
//! 1. Identità + path di output (path relativo replicato sotto la destinazione)
//! 2. Skip se già nel ledger
//! 3. Azione terminale tramite `TaskProcessor`
//! 4. Registrazione nel ledger, persistenza, evento di progresso
//! 5. Controllo del flag di esecuzione
//!
//! Nessun errore per-file interrompe la walk. Un transcode cancellato non viene
//! registrato, così viene rifatto da capo alla ripresa.

use crate::backend::{ImageBackend, VideoBackend};
use crate::config::Config;
use crate::error::CompressError;
use crate::file_manager::FileManager;
use crate::pipeline::control::RunControl;
use crate::pipeline::path_resolver::PathResolver;
use crate::pipeline::progress_tracker::ProgressTracker;
use crate::pipeline::task_processor::{TaskProcessor, TaskResult};
use crate::progress::RunSummary;
use crate::state::{FileIdentity, FileOutcome, LedgerData, ProgressLedger};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Scanning,
    Classifying,
    Acting,
    Recording,
    Stopped,
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every file in the tree is recorded or failed
    Completed,
    /// The run flag was cleared; the ledger keeps what was done
    Stopped,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub summary: RunSummary,
    /// Ledger counters at the end of the run, earlier runs included
    pub counters: LedgerData,
}

/// Walk-classify-act-record loop over one source tree
pub struct FileProcessingPipeline {
    source: PathBuf,
    destination: PathBuf,
    processor: TaskProcessor,
    ledger: ProgressLedger,
    control: RunControl,
    tracker: ProgressTracker,
    total_bytes_hint: Option<u64>,
    state: PipelineState,
}

impl FileProcessingPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: PathBuf,
        destination: PathBuf,
        config: Arc<Config>,
        image_backend: Arc<dyn ImageBackend>,
        video_backend: Arc<dyn VideoBackend>,
        ledger: ProgressLedger,
        control: RunControl,
        tracker: ProgressTracker,
    ) -> Self {
        Self {
            source,
            destination,
            processor: TaskProcessor::new(config, image_backend, video_backend),
            ledger,
            control,
            tracker,
            total_bytes_hint: None,
            state: PipelineState::Idle,
        }
    }

    /// Total bytes of the tree, from the estimator. Enables the persisted percentage.
    pub fn with_total_bytes(mut self, total_bytes: u64) -> Self {
        self.total_bytes_hint = Some(total_bytes);
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn ledger(&self) -> &ProgressLedger {
        &self.ledger
    }

    fn transition(&mut self, next: PipelineState) {
        if self.state != next {
            debug!("Pipeline state: {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }

    /// Process every file not yet in the ledger, until done or stopped
    pub async fn run(&mut self) -> Result<RunReport, CompressError> {
        self.transition(PipelineState::Scanning);

        let source = self.source.canonicalize()?;
        let destination = std::path::absolute(&self.destination)?;
        self.ledger.set_folders(&source, &destination);

        // An existing destination inside the source must not be fed back into the walk
        let exclude = destination.canonicalize().ok();
        let files = FileManager::find_files(&source, exclude.as_deref());
        info!("Found {} files under {}", files.len(), source.display());

        let mut summary = RunSummary::new(files.len());

        for file in files {
            if !self.control.is_running() {
                return Ok(self.stopped(summary));
            }

            let identity = FileIdentity::from_path(&file);
            if self.ledger.has(&identity) {
                debug!("Already processed: {}", file.display());
                summary.already_processed += 1;
                continue;
            }

            self.transition(PipelineState::Classifying);
            let output = match PathResolver::output_path(&file, &source, &destination) {
                Ok(output) => output,
                Err(e) => {
                    error!("Skipping {}: {}", file.display(), e);
                    summary.add_failed(file, e.to_string());
                    continue;
                }
            };

            self.transition(PipelineState::Acting);
            match self.processor.process(&file, &output, &self.control).await {
                TaskResult::Done(outcome) => {
                    self.record(identity, outcome, &file, &mut summary, false).await;
                }
                TaskResult::ImageFallback { outcome, reason } => {
                    warn!("Image copied without compression: {} ({})", file.display(), reason);
                    self.record(identity, outcome, &file, &mut summary, true).await;
                }
                TaskResult::VideoFailed(reason) => {
                    error!("Failed to compress video {}: {}", file.display(), reason);
                    summary.add_failed_video(file, reason);
                }
                TaskResult::Cancelled => {
                    info!("Stopped while processing {}", file.display());
                    return Ok(self.stopped(summary));
                }
                TaskResult::Failed(reason) => {
                    error!("Failed to process {}: {}", file.display(), reason);
                    summary.add_failed(file, reason);
                }
            }
        }

        self.transition(PipelineState::Idle);
        info!("Run completed: {}", summary.format_summary());
        Ok(RunReport {
            outcome: RunOutcome::Completed,
            summary,
            counters: self.ledger.data().clone(),
        })
    }

    fn stopped(&mut self, summary: RunSummary) -> RunReport {
        self.transition(PipelineState::Stopped);
        info!(
            "Run stopped, progress saved ({} files recorded)",
            self.ledger.processed_count()
        );
        RunReport {
            outcome: RunOutcome::Stopped,
            summary,
            counters: self.ledger.data().clone(),
        }
    }

    async fn record(
        &mut self,
        identity: FileIdentity,
        outcome: FileOutcome,
        file: &Path,
        summary: &mut RunSummary,
        fallback: bool,
    ) {
        self.transition(PipelineState::Recording);

        if !self.ledger.record_category_result(identity, outcome) {
            return;
        }
        summary.add_outcome(file.to_path_buf(), &outcome, fallback);

        if let Some(total) = self.total_bytes_hint.filter(|total| *total > 0) {
            let done = self.ledger.data().total_original_bytes();
            self.ledger.set_progress(done as f64 / total as f64 * 100.0);
        }
        if let Err(e) = self.ledger.persist().await {
            error!("Failed to save progress to {}: {}", self.ledger.path().display(), e);
        }

        self.tracker.publish(self.ledger.data(), file.to_path_buf());
        log_outcome(file, &outcome);
    }
}

fn log_outcome(file: &Path, outcome: &FileOutcome) {
    let name = file
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();

    match *outcome {
        FileOutcome::Image {
            original_size,
            final_size,
        }
        | FileOutcome::Video {
            original_size,
            final_size,
        } => info!(
            "[OK] {}: {} -> {} ({:.1}% saved)",
            name,
            FileManager::format_size(original_size),
            FileManager::format_size(final_size),
            FileManager::calculate_reduction(original_size, final_size)
        ),
        FileOutcome::SkippedVideo { size } => info!(
            "[COPY] {}: {} below smallest tier",
            name,
            FileManager::format_size(size)
        ),
        FileOutcome::Unsupported { size } => info!(
            "[COPY] {}: unsupported, {} copied",
            name,
            FileManager::format_size(size)
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::progress_tracker::ProgressEvent;
    use crate::pipeline::testing::{MockImageBackend, MockVideoBackend, MOCK_VIDEO_OUTPUT};
    use std::sync::atomic::Ordering;
    use tempfile::TempDir;
    use tokio::sync::watch;

    const MB: u64 = 1024 * 1024;

    struct Fixture {
        _dir: TempDir,
        source: PathBuf,
        destination: PathBuf,
        ledger_path: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let source = dir.path().join("media");
            let destination = dir.path().join("output");
            let ledger_path = dir.path().join("ledger.json");
            std::fs::create_dir_all(&source).unwrap();
            Self {
                _dir: dir,
                source,
                destination,
                ledger_path,
            }
        }

        fn write(&self, relative: &str, content: &[u8]) -> PathBuf {
            let path = self.source.join(relative);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, content).unwrap();
            path
        }

        fn sparse(&self, relative: &str, len: u64) -> PathBuf {
            let path = self.source.join(relative);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::File::create(&path).unwrap().set_len(len).unwrap();
            path
        }

        async fn pipeline(
            &self,
            image: MockImageBackend,
            video: MockVideoBackend,
            resume: bool,
            control: RunControl,
        ) -> (FileProcessingPipeline, watch::Receiver<ProgressEvent>) {
            let ledger = if resume {
                ProgressLedger::load(&self.ledger_path).await.unwrap()
            } else {
                ProgressLedger::fresh(&self.ledger_path).await.unwrap()
            };
            let (tracker, events) = ProgressTracker::new(ProgressEvent::from_ledger(ledger.data()));
            let config = Config {
                cancel_poll_interval_ms: 10,
                ..Default::default()
            };
            let pipeline = FileProcessingPipeline::new(
                self.source.clone(),
                self.destination.clone(),
                Arc::new(config),
                Arc::new(image),
                Arc::new(video),
                ledger,
                control,
                tracker,
            );
            (pipeline, events)
        }
    }

    #[tokio::test]
    async fn test_full_run_mirrors_tree() {
        let fx = Fixture::new();
        fx.write("a.jpg", &[1u8; 1000]);
        fx.write("sub/b.png", &[2u8; 400]);
        fx.sparse("sub/clip.mkv", 30 * MB);
        fx.write("sub/deeper/notes.txt", b"notes");

        let (mut pipeline, _events) = fx
            .pipeline(
                MockImageBackend::default(),
                MockVideoBackend::default(),
                false,
                RunControl::new(),
            )
            .await;
        let report = pipeline.run().await.unwrap();

        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(pipeline.state(), PipelineState::Idle);
        assert_eq!(report.summary.files_processed(), 4);
        assert_eq!(report.counters.processed_images_count, 2);
        assert_eq!(report.counters.total_original_images_size, 1400);
        assert_eq!(report.counters.total_final_images_size, 700);
        assert_eq!(report.counters.total_original_videos_size, 30 * MB);
        assert_eq!(report.counters.total_final_videos_size, MOCK_VIDEO_OUTPUT.len() as u64);
        assert_eq!(report.counters.total_unsupported_files_size, 5);

        assert!(fx.destination.join("a.jpg").exists());
        assert!(fx.destination.join("sub/b.png").exists());
        assert!(fx.destination.join("sub/clip.mkv").exists());
        assert_eq!(
            std::fs::read(fx.destination.join("sub/deeper/notes.txt")).unwrap(),
            b"notes"
        );

        let saved = ProgressLedger::load(&fx.ledger_path).await.unwrap();
        assert_eq!(saved.data(), &report.counters);
        assert_eq!(saved.processed_count(), 4);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlinked_files_are_processed() {
        let fx = Fixture::new();
        let elsewhere = fx.source.parent().unwrap().join("elsewhere.txt");
        std::fs::write(&elsewhere, b"linked").unwrap();
        fx.write("plain.txt", b"plain");
        std::os::unix::fs::symlink(&elsewhere, fx.source.join("link.txt")).unwrap();
        std::os::unix::fs::symlink(fx.source.join("plain.txt"), fx.source.join("alias.txt"))
            .unwrap();

        let (mut pipeline, _events) = fx
            .pipeline(
                MockImageBackend::default(),
                MockVideoBackend::default(),
                false,
                RunControl::new(),
            )
            .await;
        let report = pipeline.run().await.unwrap();

        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(report.summary.files_found, 3);
        // alias.txt and plain.txt share one identity
        assert_eq!(report.summary.files_processed(), 2);
        assert_eq!(report.summary.already_processed, 1);
        assert!(report.summary.failed_files.is_empty());
        assert_eq!(std::fs::read(fx.destination.join("link.txt")).unwrap(), b"linked");
        assert!(!std::fs::symlink_metadata(fx.destination.join("link.txt"))
            .unwrap()
            .file_type()
            .is_symlink());
        assert_eq!(std::fs::read(fx.destination.join("alias.txt")).unwrap(), b"plain");
        assert_eq!(report.counters.total_unsupported_files_size, 11);
    }

    #[tokio::test]
    async fn test_resume_is_idempotent() {
        let fx = Fixture::new();
        fx.write("a.jpg", &[1u8; 100]);
        fx.write("b.gif", &[1u8; 60]);
        fx.sparse("big.mp4", 25 * MB);
        fx.write("readme.md", b"# hi");

        let (mut first, _events) = fx
            .pipeline(
                MockImageBackend::default(),
                MockVideoBackend::default(),
                false,
                RunControl::new(),
            )
            .await;
        let first_report = first.run().await.unwrap();

        let image = MockImageBackend::default();
        let video = MockVideoBackend::default();
        let image_calls = image.calls();
        let video_calls = video.calls();
        let (mut second, _events) = fx.pipeline(image, video, true, RunControl::new()).await;
        let second_report = second.run().await.unwrap();

        assert_eq!(image_calls.load(Ordering::SeqCst), 0);
        assert_eq!(video_calls.load(Ordering::SeqCst), 0);
        assert_eq!(second_report.counters, first_report.counters);
        assert_eq!(second_report.summary.already_processed, 4);
        assert_eq!(second_report.summary.files_processed(), 0);
    }

    #[tokio::test]
    async fn test_small_video_copied_and_counted_once() {
        let fx = Fixture::new();
        let content: Vec<u8> = (0..5 * MB).map(|i| (i % 251) as u8).collect();
        fx.write("short.mp4", &content);

        let video = MockVideoBackend::default();
        let calls = video.calls();
        let (mut pipeline, _events) = fx
            .pipeline(MockImageBackend::default(), video, false, RunControl::new())
            .await;
        let report = pipeline.run().await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(std::fs::read(fx.destination.join("short.mp4")).unwrap(), content);
        assert_eq!(report.counters.processed_videos_count, 1);
        assert_eq!(report.counters.skipped_videos_count, 1);
        assert_eq!(report.counters.total_skipped_videos_size, 5 * MB);
        assert_eq!(pipeline.ledger().processed_count(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_image_is_recorded_as_fallback() {
        let fx = Fixture::new();
        let broken = fx.write("broken.jpg", b"not really a jpeg");

        let (mut pipeline, _events) = fx
            .pipeline(
                MockImageBackend::fallback(),
                MockVideoBackend::default(),
                false,
                RunControl::new(),
            )
            .await;
        let report = pipeline.run().await.unwrap();

        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(report.counters.total_final_images_size, 17);
        assert!(pipeline.ledger().has(&FileIdentity::from_path(&broken)));
        assert_eq!(report.summary.fallback_files.len(), 1);
        assert!(report.summary.fallback_files[0].ends_with("broken.jpg"));
        assert_eq!(
            std::fs::read(fx.destination.join("broken.jpg")).unwrap(),
            b"not really a jpeg"
        );
    }

    #[tokio::test]
    async fn test_failed_video_is_retried_next_run() {
        let fx = Fixture::new();
        let clip = fx.sparse("clip.mov", 60 * MB);
        fx.write("z.txt", b"after");

        let (mut pipeline, _events) = fx
            .pipeline(
                MockImageBackend::default(),
                MockVideoBackend::failing(),
                false,
                RunControl::new(),
            )
            .await;
        let report = pipeline.run().await.unwrap();

        // Walk continued past the failure
        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(report.summary.failed_videos.len(), 1);
        assert_eq!(report.summary.unsupported_copied, 1);
        assert!(!pipeline.ledger().has(&FileIdentity::from_path(&clip)));

        let video = MockVideoBackend::default();
        let calls = video.calls();
        let (mut retry, _events) = fx
            .pipeline(MockImageBackend::default(), video, true, RunControl::new())
            .await;
        let report = retry.run().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(report.counters.processed_videos_count, 1);
    }

    #[tokio::test]
    async fn test_cancel_mid_transcode_leaves_no_entry() {
        let fx = Fixture::new();
        fx.write("a.jpg", &[1u8; 64]);
        let movie = fx.sparse("movie.mkv", 2 * 1024 * MB);
        fx.write("z.txt", b"never reached");

        let control = RunControl::new();
        let (mut pipeline, mut events) = fx
            .pipeline(
                MockImageBackend::default(),
                MockVideoBackend::blocking(),
                false,
                control.clone(),
            )
            .await;

        let worker = tokio::spawn(async move {
            let report = pipeline.run().await;
            (pipeline.state(), report)
        });
        events
            .wait_for(|event| event.processed_images_count == 1)
            .await
            .unwrap();
        control.stop();

        let (state, report) = worker.await.unwrap();
        let report = report.unwrap();
        assert_eq!(state, PipelineState::Stopped);
        assert_eq!(report.outcome, RunOutcome::Stopped);

        let saved = ProgressLedger::load(&fx.ledger_path).await.unwrap();
        assert_eq!(saved.processed_count(), 1);
        assert!(!saved.has(&FileIdentity::from_path(&movie)));
        assert!(!fx.destination.join("z.txt").exists());

        // Next run starts the transcode from scratch
        let video = MockVideoBackend::default();
        let calls = video.calls();
        let (mut resumed, _events) = fx
            .pipeline(MockImageBackend::default(), video, true, RunControl::new())
            .await;
        let report = resumed.run().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(report.summary.already_processed, 1);
        assert!(resumed.ledger().has(&FileIdentity::from_path(&movie)));
    }

    #[tokio::test]
    async fn test_stopped_pipeline_can_run_again() {
        let fx = Fixture::new();
        fx.write("a.txt", b"a");
        fx.write("b.txt", b"b");

        let control = RunControl::new();
        control.stop();
        let (mut pipeline, _events) = fx
            .pipeline(
                MockImageBackend::default(),
                MockVideoBackend::default(),
                false,
                control.clone(),
            )
            .await;

        let report = pipeline.run().await.unwrap();
        assert_eq!(report.outcome, RunOutcome::Stopped);
        assert_eq!(pipeline.ledger().processed_count(), 0);

        control.resume();
        let report = pipeline.run().await.unwrap();
        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(pipeline.ledger().processed_count(), 2);
    }

    #[tokio::test]
    async fn test_progress_events_are_monotonic() {
        let fx = Fixture::new();
        for i in 0..6 {
            fx.write(&format!("img{}.jpg", i), &vec![3u8; 100 * (i + 1)]);
        }
        fx.sparse("v.mp4", 12 * MB);
        fx.write("other.bin", &[0u8; 10]);

        let (pipeline, mut events) = fx
            .pipeline(
                MockImageBackend::default(),
                MockVideoBackend::default(),
                false,
                RunControl::new(),
            )
            .await;

        let collector = tokio::spawn(async move {
            let mut seen = vec![events.borrow_and_update().clone()];
            while events.changed().await.is_ok() {
                seen.push(events.borrow_and_update().clone());
            }
            seen
        });

        let mut pipeline = pipeline;
        pipeline.run().await.unwrap();
        drop(pipeline);

        let seen = collector.await.unwrap();
        assert!(seen.len() >= 2);
        for pair in seen.windows(2) {
            assert!(pair[1].processed_images_count >= pair[0].processed_images_count);
            assert!(pair[1].processed_videos_count >= pair[0].processed_videos_count);
            assert!(pair[1].total_original_images_size >= pair[0].total_original_images_size);
            assert!(pair[1].total_original_videos_size >= pair[0].total_original_videos_size);
            assert!(pair[1].total_original_bytes >= pair[0].total_original_bytes);
        }
        let last = seen.last().unwrap();
        assert_eq!(last.processed_images_count, 6);
        assert_eq!(last.processed_videos_count, 1);
    }

    #[tokio::test]
    async fn test_destination_inside_source_is_not_walked() {
        let fx = Fixture::new();
        fx.write("a.txt", b"a");
        let destination = fx.source.join("output");
        std::fs::create_dir_all(&destination).unwrap();
        std::fs::write(destination.join("old.txt"), b"old").unwrap();

        let ledger = ProgressLedger::fresh(&fx.ledger_path).await.unwrap();
        let (tracker, _events) = ProgressTracker::new(ProgressEvent::default());
        let mut pipeline = FileProcessingPipeline::new(
            fx.source.clone(),
            destination.clone(),
            Arc::new(Config::default()),
            Arc::new(MockImageBackend::default()),
            Arc::new(MockVideoBackend::default()),
            ledger,
            RunControl::new(),
            tracker,
        );

        let report = pipeline.run().await.unwrap();
        assert_eq!(report.summary.files_found, 1);
        assert!(destination.join("a.txt").exists());
    }

    #[tokio::test]
    async fn test_progress_percent_is_persisted() {
        let fx = Fixture::new();
        fx.write("a.txt", &[0u8; 50]);
        fx.write("b.txt", &[0u8; 50]);

        let (pipeline, _events) = fx
            .pipeline(
                MockImageBackend::default(),
                MockVideoBackend::default(),
                false,
                RunControl::new(),
            )
            .await;
        let mut pipeline = pipeline.with_total_bytes(100);
        pipeline.run().await.unwrap();

        let saved = ProgressLedger::load(&fx.ledger_path).await.unwrap();
        assert_eq!(saved.data().progress, 100.0);
        assert_eq!(
            saved.data().input_folder,
            fx.source.canonicalize().unwrap().to_string_lossy()
        );
    }
}
