//! # Task Processor Module
//!
//! Worker per singolo file: dato un file sorgente e il suo path di output esegue
//! l'azione terminale (compressione, copia, skip-copia) e riporta l'esito alla pipeline.
//! Non tocca il ledger: registrare è compito dell'orchestratore.
//!
//! ## Fallback:
//! - Immagine non processabile dal backend → copia diretta, registrata come immagine
//! - Metadata non leggibili → copia come file non supportato
//! - Video fallito → nessuna registrazione, verrà ritentato alla prossima run

use crate::backend::{ImageBackend, ImageOutcome, VideoBackend, VideoOutcome};
use crate::classifier::{classify, video_tier, FileCategory, TierDecision};
use crate::config::Config;
use crate::error::CompressError;
use crate::file_manager::FileManager;
use crate::pipeline::control::RunControl;
use crate::state::FileOutcome;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of acting on one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskResult {
    /// Terminal action completed, output on disk
    Done(FileOutcome),
    /// Image copied verbatim because it could not be compressed
    ImageFallback { outcome: FileOutcome, reason: String },
    /// Transcoder failed, nothing to record
    VideoFailed(String),
    /// Stop requested while the file was in flight
    Cancelled,
    /// Even the plain copy failed
    Failed(String),
}

/// Performs the terminal action for a single file
pub struct TaskProcessor {
    config: Arc<Config>,
    image_backend: Arc<dyn ImageBackend>,
    video_backend: Arc<dyn VideoBackend>,
}

impl TaskProcessor {
    pub fn new(
        config: Arc<Config>,
        image_backend: Arc<dyn ImageBackend>,
        video_backend: Arc<dyn VideoBackend>,
    ) -> Self {
        Self {
            config,
            image_backend,
            video_backend,
        }
    }

    pub async fn process(&self, input: &Path, output: &Path, control: &RunControl) -> TaskResult {
        let original_size = match FileManager::get_file_size(input).await {
            Ok(size) => size,
            Err(e) => {
                warn!("Cannot read size of {}: {}", input.display(), e);
                return self.copy_as_unsupported(input, output).await;
            }
        };

        let category = classify(input);
        debug!(
            "{} classified as {} ({})",
            input.display(),
            category.label(),
            FileManager::format_size(original_size)
        );

        match category {
            FileCategory::Image => self.process_image(input, output, original_size).await,
            FileCategory::Video => {
                self.process_video(input, output, original_size, control)
                    .await
            }
            FileCategory::Unsupported => self.copy_as_unsupported(input, output).await,
        }
    }

    async fn process_image(&self, input: &Path, output: &Path, original_size: u64) -> TaskResult {
        match self
            .image_backend
            .compress_image(input, output, self.config.image_quality)
            .await
        {
            Ok(ImageOutcome::Compressed { final_size }) => TaskResult::Done(FileOutcome::Image {
                original_size,
                final_size,
            }),
            Ok(ImageOutcome::FallbackCopy { final_size, reason }) => TaskResult::ImageFallback {
                outcome: FileOutcome::Image {
                    original_size,
                    final_size,
                },
                reason,
            },
            Err(e) => {
                warn!(
                    "{} backend failed on {}: {}, copying original",
                    self.image_backend.name(),
                    input.display(),
                    e
                );
                match FileManager::copy_file(input, output).await {
                    Ok(final_size) => TaskResult::ImageFallback {
                        outcome: FileOutcome::Image {
                            original_size,
                            final_size,
                        },
                        reason: e.to_string(),
                    },
                    Err(copy_err) => TaskResult::Failed(format!(
                        "image compression failed ({}) and copy failed ({})",
                        e, copy_err
                    )),
                }
            }
        }
    }

    async fn process_video(
        &self,
        input: &Path,
        output: &Path,
        original_size: u64,
        control: &RunControl,
    ) -> TaskResult {
        let crf = match video_tier(original_size, &self.config.video_tiers) {
            TierDecision::Copy => {
                debug!("Video below smallest tier, copying: {}", input.display());
                return match FileManager::copy_file(input, output).await {
                    Ok(_) => TaskResult::Done(FileOutcome::SkippedVideo {
                        size: original_size,
                    }),
                    Err(e) => TaskResult::Failed(format!("copy failed: {}", e)),
                };
            }
            TierDecision::Transcode { crf } => crf,
        };

        if let Err(e) = FileManager::ensure_parent_dirs(output).await {
            warn!("Cannot create output directory for {}: {}", output.display(), e);
            return self.copy_as_unsupported(input, output).await;
        }

        match self
            .video_backend
            .compress_video(input, output, crf, self.config.speed, control)
            .await
        {
            Ok(VideoOutcome::Completed { final_size }) => TaskResult::Done(FileOutcome::Video {
                original_size,
                final_size,
            }),
            Ok(VideoOutcome::Cancelled) | Err(CompressError::Cancelled) => TaskResult::Cancelled,
            Err(e) => TaskResult::VideoFailed(e.to_string()),
        }
    }

    async fn copy_as_unsupported(&self, input: &Path, output: &Path) -> TaskResult {
        match FileManager::copy_file(input, output).await {
            Ok(size) => TaskResult::Done(FileOutcome::Unsupported { size }),
            Err(e) => TaskResult::Failed(format!("copy failed: {}", e)),
        }
    }
}
