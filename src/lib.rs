//! # Media Compressor Library
//!
//! Questo è il modulo principale della libreria che espone tutte le API pubbliche.
//!
//! ## Responsabilità:
//! - Definisce la struttura modulare dell'applicazione
//! - Espone i tipi e le funzioni principali tramite re-exports
//! - Fornisce un'interfaccia pulita per il main.rs e per altri consumatori (GUI)
//!
//! ## Architettura dei moduli:
//! - `classifier`: Categoria dei file e fasce dimensione → CRF
//! - `backend`: Contratti dei backend di compressione
//! - `image_processor`: Compressione immagini (crate `image` + exiftool)
//! - `video_processor`: Transcode video interrompibile (ffmpeg)
//! - `state`: Ledger riprendibile e persistenza
//! - `pipeline`: Orchestratore, controllo run/stop, eventi di progresso
//! - `estimator`: Analisi preliminare e stima dei tempi
//! - `config`: Gestione configurazione e validazione parametri
//! - `error`: Tipi di errore
//! - `file_manager`: Discovery e copia dei file
//! - `progress` / `json_output`: Osservatori CLI
//!
//! ## Utilizzo:
//! ```ignore
//! use media_compressor::{Config, FfmpegVideoCompressor, ImageCompressor, PipelineController, StartRequest};
//!
//! let config = Config::default();
//! let mut controller = PipelineController::new(
//!     config,
//!     Arc::new(ImageCompressor::default()),
//!     Arc::new(FfmpegVideoCompressor::default()),
//! );
//! let events = controller.start(StartRequest::new("/media/photos")).await?;
//! let report = controller.wait().await?;
//! ```

pub mod backend;
pub mod classifier;
pub mod config;
pub mod error;
pub mod estimator;
pub mod file_manager;
pub mod image_processor;
pub mod json_output;
pub mod pipeline;
pub mod platform;
pub mod progress;
pub mod state;
pub mod video_processor;

pub use backend::{ImageBackend, VideoBackend};
pub use classifier::{classify, video_tier, FileCategory, TierTable};
pub use config::{Config, SpeedPreset};
pub use error::CompressError;
pub use estimator::{CompressionEstimator, EstimationReport};
pub use image_processor::ImageCompressor;
pub use pipeline::{
    PipelineController, ProgressEvent, RunControl, RunOutcome, RunReport, StartRequest,
};
pub use state::ProgressLedger;
pub use video_processor::FfmpegVideoCompressor;
