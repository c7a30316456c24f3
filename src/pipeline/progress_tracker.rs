//! # Progress Tracking Module
//!
//! Canale di eventi tra worker e osservatore (progress bar, output JSON, UI).
//! Usa `tokio::sync::watch`: l'osservatore vede sempre l'ultimo snapshot, gli
//! intermedi possono essere saltati.

use crate::state::LedgerData;
use serde::Serialize;
use std::path::PathBuf;
use tokio::sync::watch;

/// Cumulative snapshot published after each recorded file
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub processed_images_count: u64,
    /// Includes videos copied because they were below the smallest tier
    pub processed_videos_count: u64,
    pub total_original_images_size: u64,
    /// Original bytes of transcoded and copied videos
    pub total_original_videos_size: u64,
    /// Original bytes over every category, unsupported files included
    pub total_original_bytes: u64,
    /// Source file that produced this event
    pub current_file: Option<PathBuf>,
}

impl ProgressEvent {
    pub fn from_ledger(data: &LedgerData) -> Self {
        Self {
            processed_images_count: data.processed_images_count,
            processed_videos_count: data.processed_videos_count,
            total_original_images_size: data.total_original_images_size,
            total_original_videos_size: data
                .total_original_videos_size
                .saturating_add(data.total_skipped_videos_size),
            total_original_bytes: data.total_original_bytes(),
            current_file: None,
        }
    }

    /// Completion percentage against an externally estimated total
    pub fn percent_of(&self, total_bytes: u64) -> f64 {
        if total_bytes == 0 {
            0.0
        } else {
            (self.total_original_bytes as f64 / total_bytes as f64 * 100.0).min(100.0)
        }
    }
}

/// Sending half of the progress stream, owned by the worker
#[derive(Debug)]
pub struct ProgressTracker {
    sender: watch::Sender<ProgressEvent>,
}

impl ProgressTracker {
    pub fn new(initial: ProgressEvent) -> (Self, watch::Receiver<ProgressEvent>) {
        let (sender, receiver) = watch::channel(initial);
        (Self { sender }, receiver)
    }

    /// Publish the ledger state after `file` was recorded
    pub fn publish(&self, data: &LedgerData, file: PathBuf) {
        let mut event = ProgressEvent::from_ledger(data);
        event.current_file = Some(file);
        // send_replace works with zero receivers
        self.sender.send_replace(event);
    }
}
