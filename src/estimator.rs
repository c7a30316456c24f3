//! # Compression Estimator Module
//!
//! Analisi preliminare di un albero sorgente: conteggi e dimensioni per categoria e
//! stima del tempo di compressione. Nessun effetto collaterale oltre alla lettura
//! delle dimensioni dei file; può essere chiamato ripetutamente.
//!
//! ## Modello di stima:
//! | Categoria    | Minuti per GB | Dipende dal preset |
//! |--------------|---------------|--------------------|
//! | Immagini     | 0.6           | No                 |
//! | Video        | 8             | Sì                 |
//! | Non supportati (copia) | 1   | Sì                 |
//!
//! La classificazione è la stessa usata dalla pipeline (`classifier::classify`).

use crate::classifier::{classify, extension_of, FileCategory};
use crate::config::SpeedPreset;
use crate::error::CompressError;
use crate::file_manager::FileManager;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::path::Path;
use tracing::{debug, warn};

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

const IMAGE_MINUTES_PER_GB: f64 = 0.6;
const VIDEO_MINUTES_PER_GB: f64 = 8.0;
const COPY_MINUTES_PER_GB: f64 = 1.0;

/// Relative encoding time of a preset, `veryfast` = 1.0
pub fn speed_multiplier(speed: SpeedPreset) -> f64 {
    match speed {
        SpeedPreset::Ultrafast => 0.5,
        SpeedPreset::Superfast => 0.75,
        SpeedPreset::Veryfast => 1.0,
        SpeedPreset::Faster => 1.25,
        SpeedPreset::Fast => 1.5,
        SpeedPreset::Medium => 1.75,
        SpeedPreset::Slow => 2.0,
        SpeedPreset::Slower => 2.5,
        SpeedPreset::Veryslow => 3.0,
    }
}

/// Minutes rounded, as "Xh Ym" from one hour up, else "N minutes"
pub fn format_time(minutes: f64) -> String {
    let rounded = if minutes.is_finite() {
        minutes.max(0.0).round() as u64
    } else {
        0
    };
    if rounded >= 60 {
        format!("{}h {}m", rounded / 60, rounded % 60)
    } else {
        format!("{} minutes", rounded)
    }
}

/// Tally for one category
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CategoryEstimate {
    pub count: u64,
    pub bytes: u64,
    /// Lowercased extensions seen, "" for files without one
    pub extensions: BTreeSet<String>,
    pub estimated_minutes: f64,
}

impl CategoryEstimate {
    fn add(&mut self, path: &Path, size: u64) {
        self.count += 1;
        self.bytes = self.bytes.saturating_add(size);
        self.extensions.insert(extension_of(path).unwrap_or_default());
    }

    fn gigabytes(&self) -> f64 {
        self.bytes as f64 / BYTES_PER_GB
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EstimationReport {
    pub speed: SpeedPreset,
    pub images: CategoryEstimate,
    pub videos: CategoryEstimate,
    pub unsupported: CategoryEstimate,
    pub total_files: u64,
    pub total_bytes: u64,
    pub total_minutes: f64,
}

impl EstimationReport {
    /// Human-readable report, one line per fact
    pub fn format_report(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Compression Analysis Report");
        let _ = writeln!(out, "Total files found: {}", self.total_files);
        let _ = writeln!(out, "Total folder size: {}", FileManager::format_size(self.total_bytes));
        for (label, category) in [
            ("Image files", &self.images),
            ("Video files", &self.videos),
            ("Unsupported files", &self.unsupported),
        ] {
            let extensions: Vec<&str> = category.extensions.iter().map(String::as_str).collect();
            let _ = writeln!(
                out,
                "  - {}: {} ({}) with filetypes: {}",
                label,
                category.count,
                FileManager::format_size(category.bytes),
                extensions.join(", ")
            );
        }
        let _ = writeln!(out, "Estimated Compression Time (at {} speed):", self.speed);
        let _ = writeln!(out, "  - Images: {}", format_time(self.images.estimated_minutes));
        let _ = writeln!(out, "  - Videos: {}", format_time(self.videos.estimated_minutes));
        let _ = writeln!(
            out,
            "  - Unsupported files (copying): {}",
            format_time(self.unsupported.estimated_minutes)
        );
        let _ = write!(out, "  - Total: {}", format_time(self.total_minutes));
        out
    }
}

/// Pre-run analysis of a source tree
pub struct CompressionEstimator;

impl CompressionEstimator {
    /// Walk `root` once and project the compression time at `speed`. Blocking.
    pub fn analyze(root: &Path, speed: SpeedPreset) -> Result<EstimationReport, CompressError> {
        if !root.is_dir() {
            return Err(CompressError::Validation(format!(
                "Source folder does not exist: {}",
                root.display()
            )));
        }

        let mut images = CategoryEstimate::default();
        let mut videos = CategoryEstimate::default();
        let mut unsupported = CategoryEstimate::default();

        for file in FileManager::find_files(root, None) {
            let size = match std::fs::metadata(&file) {
                Ok(metadata) => metadata.len(),
                Err(e) => {
                    warn!("Cannot read size of {}: {}", file.display(), e);
                    continue;
                }
            };
            match classify(&file) {
                FileCategory::Image => images.add(&file, size),
                FileCategory::Video => videos.add(&file, size),
                FileCategory::Unsupported => unsupported.add(&file, size),
            }
        }

        let multiplier = speed_multiplier(speed);
        images.estimated_minutes = images.gigabytes() * IMAGE_MINUTES_PER_GB;
        videos.estimated_minutes = videos.gigabytes() * VIDEO_MINUTES_PER_GB * multiplier;
        unsupported.estimated_minutes = unsupported.gigabytes() * COPY_MINUTES_PER_GB * multiplier;

        let report = EstimationReport {
            speed,
            total_files: images.count + videos.count + unsupported.count,
            total_bytes: images.bytes + videos.bytes + unsupported.bytes,
            total_minutes: images.estimated_minutes
                + videos.estimated_minutes
                + unsupported.estimated_minutes,
            images,
            videos,
            unsupported,
        };

        debug!(
            "Analyzed {}: {} files, {} bytes, {:.2} minutes",
            root.display(),
            report.total_files,
            report.total_bytes,
            report.total_minutes
        );
        Ok(report)
    }
}
