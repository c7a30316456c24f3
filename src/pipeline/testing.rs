//! Mock backends shared by the pipeline tests

use crate::backend::{ImageBackend, ImageOutcome, VideoBackend, VideoOutcome};
use crate::config::SpeedPreset;
use crate::error::CompressError;
use crate::pipeline::control::RunControl;
use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Bytes written by the mock transcoder
pub const MOCK_VIDEO_OUTPUT: &[u8] = b"transcoded";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ImageMode {
    /// Write half of the input bytes
    Halve,
    /// Copy the input and report a decode fallback
    Fallback,
    Fail,
}

pub struct MockImageBackend {
    mode: ImageMode,
    calls: Arc<AtomicUsize>,
}

impl MockImageBackend {
    pub fn fallback() -> Self {
        Self {
            mode: ImageMode::Fallback,
            calls: Arc::default(),
        }
    }

    pub fn failing() -> Self {
        Self {
            mode: ImageMode::Fail,
            calls: Arc::default(),
        }
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

impl Default for MockImageBackend {
    fn default() -> Self {
        Self {
            mode: ImageMode::Halve,
            calls: Arc::default(),
        }
    }
}

#[async_trait]
impl ImageBackend for MockImageBackend {
    fn name(&self) -> &str {
        "mock-image"
    }

    async fn compress_image(
        &self,
        input: &Path,
        output: &Path,
        _quality: u8,
    ) -> Result<ImageOutcome, CompressError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.mode {
            ImageMode::Halve => {
                let data = tokio::fs::read(input).await?;
                let half = &data[..data.len() / 2];
                if let Some(parent) = output.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(output, half).await?;
                Ok(ImageOutcome::Compressed {
                    final_size: half.len() as u64,
                })
            }
            ImageMode::Fallback => {
                let final_size = crate::file_manager::FileManager::copy_file(input, output).await?;
                Ok(ImageOutcome::FallbackCopy {
                    final_size,
                    reason: "corrupt".to_string(),
                })
            }
            ImageMode::Fail => Err(CompressError::Io(std::io::Error::other("mock failure"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VideoMode {
    Complete,
    Fail,
    /// Runs until the control flag is cleared
    Block,
}

pub struct MockVideoBackend {
    mode: VideoMode,
    calls: Arc<AtomicUsize>,
    last_crf: Arc<AtomicU8>,
}

impl MockVideoBackend {
    pub fn failing() -> Self {
        Self::with_mode(VideoMode::Fail)
    }

    pub fn blocking() -> Self {
        Self::with_mode(VideoMode::Block)
    }

    fn with_mode(mode: VideoMode) -> Self {
        Self {
            mode,
            calls: Arc::default(),
            last_crf: Arc::default(),
        }
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }

    pub fn last_crf(&self) -> Arc<AtomicU8> {
        self.last_crf.clone()
    }
}

impl Default for MockVideoBackend {
    fn default() -> Self {
        Self::with_mode(VideoMode::Complete)
    }
}

#[async_trait]
impl VideoBackend for MockVideoBackend {
    fn name(&self) -> &str {
        "mock-video"
    }

    async fn compress_video(
        &self,
        _input: &Path,
        output: &Path,
        crf: u8,
        _speed: SpeedPreset,
        control: &RunControl,
    ) -> Result<VideoOutcome, CompressError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.last_crf.store(crf, Ordering::SeqCst);
        match self.mode {
            VideoMode::Complete => {
                tokio::fs::write(output, MOCK_VIDEO_OUTPUT).await?;
                Ok(VideoOutcome::Completed {
                    final_size: MOCK_VIDEO_OUTPUT.len() as u64,
                })
            }
            VideoMode::Fail => Err(CompressError::VideoTool("exit status 1".to_string())),
            VideoMode::Block => {
                while control.is_running() {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
                Ok(VideoOutcome::Cancelled)
            }
        }
    }
}
