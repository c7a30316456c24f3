//! # Compression Backend Contract
//!
//! Interfacce che la pipeline usa per trasformare un file in input in un file di output.
//! Le implementazioni concrete sono `ImageCompressor` (crate `image` + exiftool) e
//! `FfmpegVideoCompressor`; i test usano backend mock.
//!
//! ## Contratto immagini:
//! - Non fallisce mai su input corrotti: copia byte-per-byte e ritorna `FallbackCopy`
//! - `Err` solo se neanche la copia è possibile (I/O)
//!
//! ## Contratto video:
//! - Interrompibile: controlla `RunControl` almeno una volta al secondo
//! - Allo stop termina il processo sottostante e ritorna `Cancelled`
//! - Nessun output parziale lasciato su disco in caso di errore o stop

use crate::config::SpeedPreset;
use crate::error::CompressError;
use crate::pipeline::control::RunControl;
use async_trait::async_trait;
use std::path::Path;

/// Result of a completed image operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageOutcome {
    Compressed { final_size: u64 },
    /// Input could not be decoded, the original bytes were copied instead
    FallbackCopy { final_size: u64, reason: String },
}

impl ImageOutcome {
    pub fn final_size(&self) -> u64 {
        match self {
            Self::Compressed { final_size } | Self::FallbackCopy { final_size, .. } => *final_size,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::FallbackCopy { .. })
    }
}

/// Result of a video operation that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoOutcome {
    Completed { final_size: u64 },
    Cancelled,
}

/// Compresses one image file
#[async_trait]
pub trait ImageBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn compress_image(
        &self,
        input: &Path,
        output: &Path,
        quality: u8,
    ) -> Result<ImageOutcome, CompressError>;
}

/// Transcodes one video file under cooperative cancellation
#[async_trait]
pub trait VideoBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn compress_video(
        &self,
        input: &Path,
        output: &Path,
        crf: u8,
        speed: SpeedPreset,
        control: &RunControl,
    ) -> Result<VideoOutcome, CompressError>;
}
