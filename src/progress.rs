//! # Progress Reporting and Summary Module
//!
//! Questo modulo gestisce il feedback visivo e il riepilogo finale di una run.
//!
//! ## Responsabilità:
//! - Progress bar `indicatif` misurata in byte (totale dalla stima preliminare)
//! - Spinner per operazioni indeterminate (scan, analisi)
//! - `RunSummary`: conteggi della run corrente ed elenchi dei file con fallback
//!
//! ## Visual feedback:
//! ```text
//! ⠋ [00:02:15] [========================>---------------] 1.21 GiB/2.03 GiB (59%) photo.jpg
//! ```
//!
//! ## Report finali:
//! - Conteggi per categoria e byte risparmiati
//! - Elenco dei file copiati per decodifica fallita
//! - Elenco dei file non supportati copiati così come sono
//! - Elenco dei video il cui transcode è fallito (ritentati alla prossima run)

use crate::file_manager::FileManager;
use crate::state::FileOutcome;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::time::Duration;

/// Byte-based progress bar for a compression run
#[derive(Clone)]
pub struct ProgressManager {
    bar: ProgressBar,
}

impl ProgressManager {
    /// Create a bar measuring `total_bytes`
    pub fn new(total_bytes: u64) -> Self {
        let bar = ProgressBar::new(total_bytes);

        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({percent}%) {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );

        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Move the bar to the cumulative byte count
    pub fn set_position(&self, bytes: u64) {
        self.bar.set_position(bytes);
    }

    pub fn set_message(&self, message: &str) {
        self.bar.set_message(message.to_string());
    }

    /// Finish with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    /// Stop the bar where it is
    pub fn abandon(&self, message: &str) {
        self.bar.abandon_with_message(message.to_string());
    }

    /// Create a spinner for indeterminate progress
    pub fn spinner(message: &str) -> ProgressBar {
        let spinner = ProgressBar::new_spinner();

        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );

        spinner.set_message(message.to_string());
        spinner.enable_steady_tick(Duration::from_millis(100));

        spinner
    }
}

/// A file that could not be handled, with the reason
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedFile {
    pub path: PathBuf,
    pub reason: String,
}

/// What one `run()` call did
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub files_found: usize,
    /// Skipped because the ledger already had them
    pub already_processed: usize,
    pub images_processed: usize,
    pub videos_transcoded: usize,
    /// Videos below the smallest tier, copied verbatim
    pub videos_copied: usize,
    pub unsupported_copied: usize,
    pub original_bytes: u64,
    pub final_bytes: u64,
    /// Images copied because they could not be compressed
    pub fallback_files: Vec<PathBuf>,
    pub unsupported_files: Vec<PathBuf>,
    pub failed_videos: Vec<FailedFile>,
    pub failed_files: Vec<FailedFile>,
}

impl RunSummary {
    pub fn new(files_found: usize) -> Self {
        Self {
            files_found,
            ..Default::default()
        }
    }

    /// Account for a file recorded in the ledger during this run
    pub fn add_outcome(&mut self, path: PathBuf, outcome: &FileOutcome, fallback: bool) {
        let final_size = match *outcome {
            FileOutcome::Image { final_size, .. } => {
                self.images_processed += 1;
                if fallback {
                    self.fallback_files.push(path);
                }
                final_size
            }
            FileOutcome::Video { final_size, .. } => {
                self.videos_transcoded += 1;
                final_size
            }
            FileOutcome::SkippedVideo { size } => {
                self.videos_copied += 1;
                size
            }
            FileOutcome::Unsupported { size } => {
                self.unsupported_copied += 1;
                self.unsupported_files.push(path);
                size
            }
        };
        self.original_bytes = self.original_bytes.saturating_add(outcome.original_size());
        self.final_bytes = self.final_bytes.saturating_add(final_size);
    }

    pub fn add_failed_video(&mut self, path: PathBuf, reason: String) {
        self.failed_videos.push(FailedFile { path, reason });
    }

    pub fn add_failed(&mut self, path: PathBuf, reason: String) {
        self.failed_files.push(FailedFile { path, reason });
    }

    /// Files recorded during this run
    pub fn files_processed(&self) -> usize {
        self.images_processed + self.videos_transcoded + self.videos_copied + self.unsupported_copied
    }

    pub fn errors(&self) -> usize {
        self.failed_videos.len() + self.failed_files.len()
    }

    pub fn bytes_saved(&self) -> u64 {
        self.original_bytes.saturating_sub(self.final_bytes)
    }

    pub fn overall_reduction_percent(&self) -> f64 {
        FileManager::calculate_reduction(self.original_bytes, self.final_bytes).max(0.0)
    }

    pub fn format_summary(&self) -> String {
        format!(
            "Processed: {} files | Images: {} | Videos: {} transcoded, {} copied | Unsupported: {} | Already done: {} | Errors: {} | Total saved: {} ({:.2}%)",
            self.files_processed(),
            self.images_processed,
            self.videos_transcoded,
            self.videos_copied,
            self.unsupported_copied,
            self.already_processed,
            self.errors(),
            FileManager::format_size(self.bytes_saved()),
            self.overall_reduction_percent()
        )
    }

    /// Itemized lists of fallback, unsupported and failed files. Empty when there are none.
    pub fn format_details(&self) -> String {
        let mut out = String::new();

        if !self.fallback_files.is_empty() {
            let _ = writeln!(out, "Files copied because they could not be compressed:");
            for path in &self.fallback_files {
                let _ = writeln!(out, "  - {}", path.display());
            }
        }
        if !self.unsupported_files.is_empty() {
            let _ = writeln!(out, "Unsupported files copied as-is:");
            for path in &self.unsupported_files {
                let _ = writeln!(out, "  - {}", path.display());
            }
        }
        if !self.failed_videos.is_empty() {
            let _ = writeln!(out, "Videos that failed to transcode (retried on next run):");
            for failed in &self.failed_videos {
                let _ = writeln!(out, "  - {}: {}", failed.path.display(), failed.reason);
            }
        }
        if !self.failed_files.is_empty() {
            let _ = writeln!(out, "Files that could not be processed:");
            for failed in &self.failed_files {
                let _ = writeln!(out, "  - {}: {}", failed.path.display(), failed.reason);
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_counts() {
        let mut summary = RunSummary::new(5);
        summary.add_outcome(
            PathBuf::from("a.jpg"),
            &FileOutcome::Image {
                original_size: 1000,
                final_size: 250,
            },
            false,
        );
        summary.add_outcome(
            PathBuf::from("b.jpg"),
            &FileOutcome::Image {
                original_size: 100,
                final_size: 100,
            },
            true,
        );
        summary.add_outcome(
            PathBuf::from("c.mp4"),
            &FileOutcome::SkippedVideo { size: 400 },
            false,
        );
        summary.add_outcome(
            PathBuf::from("d.txt"),
            &FileOutcome::Unsupported { size: 500 },
            false,
        );
        summary.add_failed_video(PathBuf::from("e.mkv"), "exit 1".to_string());

        assert_eq!(summary.files_processed(), 4);
        assert_eq!(summary.images_processed, 2);
        assert_eq!(summary.videos_copied, 1);
        assert_eq!(summary.errors(), 1);
        assert_eq!(summary.original_bytes, 2000);
        assert_eq!(summary.final_bytes, 1250);
        assert_eq!(summary.bytes_saved(), 750);
        assert_eq!(summary.overall_reduction_percent(), 37.5);
        assert_eq!(summary.fallback_files, vec![PathBuf::from("b.jpg")]);
        assert_eq!(summary.unsupported_files, vec![PathBuf::from("d.txt")]);
    }

    #[test]
    fn test_format_details_lists_files() {
        let mut summary = RunSummary::default();
        assert!(summary.format_details().is_empty());

        summary.add_outcome(
            PathBuf::from("broken.jpg"),
            &FileOutcome::Image {
                original_size: 3,
                final_size: 3,
            },
            true,
        );
        summary.add_failed_video(PathBuf::from("clip.mkv"), "exit status 1".to_string());

        let details = summary.format_details();
        assert!(details.contains("broken.jpg"));
        assert!(details.contains("clip.mkv: exit status 1"));
        assert!(!details.contains("Unsupported"));
    }

    #[test]
    fn test_format_summary() {
        let summary = RunSummary::new(0);
        let text = summary.format_summary();
        assert!(text.starts_with("Processed: 0 files"));
        assert!(text.contains("0.00 MB"));
    }
}
