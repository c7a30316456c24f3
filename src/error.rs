//! # Error Types Module
//!
//! Questo modulo definisce tutti i tipi di errore custom della pipeline di compressione.
//!
//! ## Categorie di errori:
//! - `Io`: Errori di I/O su un singolo file (copia, creazione directory, lettura size)
//! - `ImageDecode`: Immagine corrotta o illeggibile (recuperata con copia byte-per-byte)
//! - `VideoTool`: FFmpeg terminato con exit code non zero o errore di avvio
//! - `Cancelled`: Stop richiesto dall'utente durante una transcodifica
//! - `LedgerCorrupt`: File di stato presente ma non parsabile
//! - `Validation`: Parametri di configurazione non validi
//! - `MissingDependency`: Tool esterno mancante (ffmpeg, exiftool)
//!
//! ## Politica:
//! Solo `LedgerCorrupt` all'avvio e la cancellazione esplicita fermano una run.
//! Tutti gli altri errori sono confinati al singolo file.

use std::path::PathBuf;

/// Custom error types for the compression pipeline
#[derive(thiserror::Error, Debug)]
pub enum CompressError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image decode error: {0}")]
    ImageDecode(String),

    #[error("Video tool error: {0}")]
    VideoTool(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Ledger file {path} is corrupt: {reason}")]
    LedgerCorrupt { path: PathBuf, reason: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Dependency missing: {0}")]
    MissingDependency(String),
}

impl From<image::ImageError> for CompressError {
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::IoError(io) => Self::Io(io),
            other => Self::ImageDecode(other.to_string()),
        }
    }
}

impl From<tempfile::PersistError> for CompressError {
    fn from(err: tempfile::PersistError) -> Self {
        Self::Io(err.error)
    }
}
