//! # Size Classifier Module
//!
//! Classificazione dei file per categoria e scelta del livello di compressione video.
//!
//! ## Responsabilità:
//! - Mappa un file su `FileCategory` (Image, Video, Unsupported) dalla sola estensione
//! - Definisce la tabella ordinata di fasce (soglia MB → CRF) per i video
//! - Decide se un video va copiato (troppo piccolo) o transcodificato e con quale CRF
//!
//! ## Fasce video di default:
//! | Soglia (MB) | CRF |
//! |-------------|-----|
//! | < 10        | copia |
//! | 10          | 34  |
//! | 20          | 35  |
//! | 50          | 38  |
//! | 150         | 39  |
//! | 300         | 40  |
//! | 500         | 41  |
//! | 1024        | 42  |
//!
//! La stessa funzione `classify` è usata da pipeline ed estimator, così stima e run
//! non possono divergere.

use crate::error::CompressError;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif"];
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "mov"];

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Highest CRF accepted by libx264
pub const MAX_CRF: u8 = 51;

/// Category of a file, derived from its extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileCategory {
    Image,
    Video,
    Unsupported,
}

impl FileCategory {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Unsupported => "unsupported",
        }
    }
}

/// Lowercase extension of a path, if any
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
}

/// Classify a file name or path. Never fails: unknown or missing extensions are `Unsupported`.
pub fn classify(path: &Path) -> FileCategory {
    match extension_of(path) {
        Some(ext) if IMAGE_EXTENSIONS.contains(&ext.as_str()) => FileCategory::Image,
        Some(ext) if VIDEO_EXTENSIONS.contains(&ext.as_str()) => FileCategory::Video,
        _ => FileCategory::Unsupported,
    }
}

/// One size band: videos of at least `min_mb` megabytes are encoded with `crf`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierBand {
    pub min_mb: f64,
    pub crf: u8,
}

impl TierBand {
    pub const fn new(min_mb: f64, crf: u8) -> Self {
        Self { min_mb, crf }
    }
}

/// Ordered, validated list of video bands.
///
/// Bounds and CRF values are both strictly increasing. Anything below the first
/// bound is copied instead of transcoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<TierBand>", into = "Vec<TierBand>")]
pub struct TierTable {
    bands: Vec<TierBand>,
}

impl TierTable {
    pub fn new(bands: Vec<TierBand>) -> Result<Self, CompressError> {
        if bands.is_empty() {
            return Err(CompressError::Validation(
                "Video tier table must contain at least one band".to_string(),
            ));
        }

        for band in &bands {
            if !band.min_mb.is_finite() || band.min_mb < 0.0 {
                return Err(CompressError::Validation(format!(
                    "Invalid tier lower bound: {}",
                    band.min_mb
                )));
            }
            if band.crf > MAX_CRF {
                return Err(CompressError::Validation(format!(
                    "Tier CRF must be between 0 and {}, got {}",
                    MAX_CRF, band.crf
                )));
            }
        }

        for pair in bands.windows(2) {
            if pair[1].min_mb <= pair[0].min_mb || pair[1].crf <= pair[0].crf {
                return Err(CompressError::Validation(format!(
                    "Video tiers must increase in both bound and CRF ({} MB/CRF {} then {} MB/CRF {})",
                    pair[0].min_mb, pair[0].crf, pair[1].min_mb, pair[1].crf
                )));
            }
        }

        Ok(Self { bands })
    }

    pub fn bands(&self) -> &[TierBand] {
        &self.bands
    }

    /// Lower bound of the first band, in MB
    pub fn copy_threshold_mb(&self) -> f64 {
        self.bands[0].min_mb
    }
}

impl Default for TierTable {
    fn default() -> Self {
        Self {
            bands: vec![
                TierBand::new(10.0, 34),
                TierBand::new(20.0, 35),
                TierBand::new(50.0, 38),
                TierBand::new(150.0, 39),
                TierBand::new(300.0, 40),
                TierBand::new(500.0, 41),
                TierBand::new(1024.0, 42),
            ],
        }
    }
}

impl TryFrom<Vec<TierBand>> for TierTable {
    type Error = CompressError;

    fn try_from(bands: Vec<TierBand>) -> Result<Self, Self::Error> {
        Self::new(bands)
    }
}

impl From<TierTable> for Vec<TierBand> {
    fn from(table: TierTable) -> Self {
        table.bands
    }
}

/// What to do with a video of a given size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierDecision {
    /// Below the lowest band: copy verbatim
    Copy,
    Transcode { crf: u8 },
}

impl TierDecision {
    /// CRF for transcodes, 0 for copies
    pub fn aggressiveness(&self) -> u8 {
        match self {
            Self::Copy => 0,
            Self::Transcode { crf } => *crf,
        }
    }
}

/// Pick the band for a video: the highest band whose bound is <= the size in MB
pub fn video_tier(size_bytes: u64, table: &TierTable) -> TierDecision {
    let size_mb = size_bytes as f64 / BYTES_PER_MB;

    table
        .bands
        .iter()
        .rev()
        .find(|band| band.min_mb <= size_mb)
        .map(|band| TierDecision::Transcode { crf: band.crf })
        .unwrap_or(TierDecision::Copy)
}
