//! # State Management Module
//!
//! Questo modulo gestisce il ledger di avanzamento che rende la compressione riprendibile.
//!
//! ## Responsabilità:
//! - Traccia quali file sono già stati processati (identità = path assoluto)
//! - Mantiene i contatori cumulativi di byte per categoria
//! - Persiste lo stato in JSON dopo ogni file, con scrittura atomica (temp + rename)
//! - Distingue "file assente" (run nuova) da "file corrotto" (errore esplicito)
//!
//! ## Strutture dati:
//! - `FileIdentity`: Chiave stabile di un file
//! - `FileOutcome`: Azione terminale completata su un file (compress/copia/skip)
//! - `LedgerData`: Contenuto serializzato del ledger
//! - `ProgressLedger`: Ledger in memoria legato al suo path su disco
//!
//! ## Strategia di persistence:
//! - Un file JSON per coppia sorgente/destinazione (basato su hash dei path)
//! - Salvataggio in `~/.media-compressor/ledger_<hash>.json`
//! - Identità e contatori vengono aggiornati insieme in memoria, poi persistiti:
//!   un crash perde al massimo il file in corso
//!
//! ## Esempio struttura state file:
//! ```json
//! {
//!   "processed_files": ["/media/photos/a.jpg", "/media/photos/clip.mp4"],
//!   "total_original_images_size": 1048576,
//!   "total_final_images_size": 262144,
//!   "total_original_videos_size": 52428800,
//!   "total_final_videos_size": 10485760,
//!   "total_skipped_videos_size": 0,
//!   "total_unsupported_files_size": 0,
//!   "progress": 87.5,
//!   "inputFolder": "/media/photos",
//!   "outputFolder": "/media/output"
//! }
//! ```

use crate::error::CompressError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

/// Stable key of a unit of work: the absolute path of the source file
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileIdentity(String);

impl FileIdentity {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Identity of a path; canonicalized when it exists so two spellings map to one entry
    pub fn from_path(path: &Path) -> Self {
        let resolved = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        Self(resolved.to_string_lossy().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Completed terminal action for one file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    /// Image compressed, or copied after a decode failure
    Image { original_size: u64, final_size: u64 },
    /// Video transcoded
    Video { original_size: u64, final_size: u64 },
    /// Video below the smallest tier, copied verbatim
    SkippedVideo { size: u64 },
    /// Unsupported file, or a file whose processing failed and was copied as-is
    Unsupported { size: u64 },
}

impl FileOutcome {
    pub fn original_size(&self) -> u64 {
        match *self {
            Self::Image { original_size, .. } | Self::Video { original_size, .. } => original_size,
            Self::SkippedVideo { size } | Self::Unsupported { size } => size,
        }
    }
}

/// Serialized ledger content. Every field defaults so older or partial files still load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerData {
    pub processed_files: HashSet<FileIdentity>,
    pub total_original_images_size: u64,
    pub total_final_images_size: u64,
    pub total_original_videos_size: u64,
    pub total_final_videos_size: u64,
    pub total_skipped_videos_size: u64,
    pub total_unsupported_files_size: u64,
    pub processed_images_count: u64,
    pub processed_videos_count: u64,
    pub skipped_videos_count: u64,
    pub unsupported_files_count: u64,
    pub progress: f64,
    #[serde(rename = "inputFolder")]
    pub input_folder: String,
    #[serde(rename = "outputFolder")]
    pub output_folder: String,
}

impl LedgerData {
    /// Sum of original sizes across every category
    pub fn total_original_bytes(&self) -> u64 {
        self.total_original_images_size
            .saturating_add(self.total_original_videos_size)
            .saturating_add(self.total_skipped_videos_size)
            .saturating_add(self.total_unsupported_files_size)
    }

    /// Sum of bytes written to the destination
    pub fn total_final_bytes(&self) -> u64 {
        self.total_final_images_size
            .saturating_add(self.total_final_videos_size)
            .saturating_add(self.total_skipped_videos_size)
            .saturating_add(self.total_unsupported_files_size)
    }
}

/// Resumable record of a run, bound to its file on disk
#[derive(Debug)]
pub struct ProgressLedger {
    path: PathBuf,
    data: LedgerData,
}

impl ProgressLedger {
    /// Default ledger location for a source/destination pair
    pub fn default_path(source: &Path, destination: &Path) -> Result<PathBuf, CompressError> {
        let state_dir = dirs::home_dir()
            .ok_or_else(|| {
                CompressError::Validation("Could not find home directory".to_string())
            })?
            .join(".media-compressor");

        let mut hasher = Sha256::new();
        hasher.update(source.to_string_lossy().as_bytes());
        hasher.update(b"|");
        hasher.update(destination.to_string_lossy().as_bytes());
        let hash = hex::encode(hasher.finalize())[..16].to_string();

        Ok(state_dir.join(format!("ledger_{}.json", hash)))
    }

    /// Load the ledger at `path`. A missing file yields an empty ledger; unreadable JSON is
    /// reported as `LedgerCorrupt` and never guessed around.
    pub async fn load(path: &Path) -> Result<Self, CompressError> {
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("No saved progress at {}, starting empty", path.display());
                return Ok(Self::empty(path));
            }
            Err(e) => return Err(e.into()),
        };

        let data: LedgerData =
            serde_json::from_str(&content).map_err(|e| CompressError::LedgerCorrupt {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        info!(
            "Loaded progress: {} files already processed ({})",
            data.processed_files.len(),
            path.display()
        );

        Ok(Self {
            path: path.to_path_buf(),
            data,
        })
    }

    /// Empty ledger for a fresh run. Any previous state file is removed so stale counters
    /// cannot leak into the new run.
    pub async fn fresh(path: &Path) -> Result<Self, CompressError> {
        Self::discard(path).await?;
        Ok(Self::empty(path))
    }

    /// Delete the persisted state file, if any
    pub async fn discard(path: &Path) -> Result<(), CompressError> {
        match fs::remove_file(path).await {
            Ok(()) => {
                info!("{} has been removed. Fresh start...", path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn empty(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            data: LedgerData::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn data(&self) -> &LedgerData {
        &self.data
    }

    pub fn has(&self, identity: &FileIdentity) -> bool {
        self.data.processed_files.contains(identity)
    }

    pub fn processed_count(&self) -> usize {
        self.data.processed_files.len()
    }

    /// Apply the counters for `outcome` and mark `identity` processed, as one unit.
    ///
    /// Returns false, changing nothing, when the identity was already recorded.
    pub fn record_category_result(&mut self, identity: FileIdentity, outcome: FileOutcome) -> bool {
        if self.has(&identity) {
            debug!("Already recorded, ignoring: {}", identity);
            return false;
        }

        let data = &mut self.data;
        match outcome {
            FileOutcome::Image {
                original_size,
                final_size,
            } => {
                data.total_original_images_size =
                    data.total_original_images_size.saturating_add(original_size);
                data.total_final_images_size = data.total_final_images_size.saturating_add(final_size);
                data.processed_images_count += 1;
            }
            FileOutcome::Video {
                original_size,
                final_size,
            } => {
                data.total_original_videos_size =
                    data.total_original_videos_size.saturating_add(original_size);
                data.total_final_videos_size = data.total_final_videos_size.saturating_add(final_size);
                data.processed_videos_count += 1;
            }
            FileOutcome::SkippedVideo { size } => {
                data.total_skipped_videos_size = data.total_skipped_videos_size.saturating_add(size);
                data.skipped_videos_count += 1;
                data.processed_videos_count += 1;
            }
            FileOutcome::Unsupported { size } => {
                data.total_unsupported_files_size =
                    data.total_unsupported_files_size.saturating_add(size);
                data.unsupported_files_count += 1;
            }
        }
        data.processed_files.insert(identity);
        true
    }

    /// Store the folders this ledger belongs to
    pub fn set_folders(&mut self, input: &Path, output: &Path) {
        self.data.input_folder = input.to_string_lossy().to_string();
        self.data.output_folder = output.to_string_lossy().to_string();
    }

    /// Store the completion percentage, clamped to 0-100
    pub fn set_progress(&mut self, percent: f64) {
        self.data.progress = if percent.is_finite() {
            percent.clamp(0.0, 100.0)
        } else {
            0.0
        };
    }

    /// Write the ledger atomically: serialize into a temp file next to the target, then rename
    pub async fn persist(&self) -> Result<(), CompressError> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent).await?;

        let content = serde_json::to_vec(&self.data)
            .map_err(|e| CompressError::Io(std::io::Error::other(e)))?;

        let target = self.path.clone();
        tokio::task::spawn_blocking(move || -> Result<(), CompressError> {
            let mut temp = tempfile::NamedTempFile::new_in(&parent)?;
            temp.write_all(&content)?;
            temp.as_file().sync_all()?;
            temp.persist(&target)?;
            Ok(())
        })
        .await
        .map_err(|e| CompressError::Io(std::io::Error::other(e)))??;

        debug!("Persisted ledger to {}", self.path.display());
        Ok(())
    }
}
