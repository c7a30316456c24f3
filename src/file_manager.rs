//! # File Management Module
//!
//! Questo modulo gestisce le operazioni sui file e la discovery dell'albero sorgente.
//!
//! ## Responsabilità:
//! - Discovery ricorsiva di tutti i file (non solo media) in ordine deterministico
//! - Esclusione della directory di destinazione se annidata nella sorgente
//! - Copia verbatim con creazione delle directory parent
//! - Utilità per dimensioni e percentuali human-readable
//!
//! ## Ordine di visita:
//! `walkdir` con `sort_by_file_name`: stabile per uno snapshot del filesystem, così
//! eventi di progresso e ledger seguono sempre lo stesso ordine.
//!
//! ## Esempio:
//! ```ignore
//! let files = FileManager::find_files(Path::new("/media/photos"), None);
//! for file in files {
//!     let size = FileManager::get_file_size(&file).await?;
//! }
//! ```

use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::warn;
use walkdir::WalkDir;

/// Manages file operations and discovery
pub struct FileManager;

impl FileManager {
    /// Size of a file in bytes
    pub async fn get_file_size(path: &Path) -> std::io::Result<u64> {
        Ok(fs::metadata(path).await?.len())
    }

    /// All regular files under `root`, sorted by name at every level.
    ///
    /// Symlinks are followed, so a link to a file counts as that file. Entries under
    /// `exclude` are skipped. Unreadable entries and link loops are logged and skipped.
    pub fn find_files(root: &Path, exclude: Option<&Path>) -> Vec<PathBuf> {
        let mut files = Vec::new();

        let walker = WalkDir::new(root)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| match exclude {
                Some(excluded) => !entry.path().starts_with(excluded),
                None => true,
            });

        for entry in walker {
            match entry {
                Ok(entry) if entry.file_type().is_file() => files.push(entry.into_path()),
                Ok(_) => {}
                Err(e) => warn!("Skipping unreadable entry under {}: {}", root.display(), e),
            }
        }

        files
    }

    /// Copy `source` to `destination`, creating parent directories. Returns bytes written.
    pub async fn copy_file(source: &Path, destination: &Path) -> std::io::Result<u64> {
        Self::ensure_parent_dirs(destination).await?;
        fs::copy(source, destination).await
    }

    /// Create the parent directories of `path` if needed
    pub async fn ensure_parent_dirs(path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Get human-readable file size (MB below one GB, GB above)
    pub fn format_size(size: u64) -> String {
        const MB: f64 = 1024.0 * 1024.0;
        const GB: f64 = MB * 1024.0;

        let size = size as f64;
        if size >= GB {
            format!("{:.2} GB", size / GB)
        } else {
            format!("{:.2} MB", size / MB)
        }
    }

    /// Calculate percentage reduction
    pub fn calculate_reduction(original_size: u64, new_size: u64) -> f64 {
        if original_size == 0 {
            0.0
        } else {
            ((original_size as f64 - new_size as f64) / original_size as f64) * 100.0
        }
    }
}
