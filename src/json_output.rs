//! # JSON Output Module
//!
//! Questo modulo gestisce l'output strutturato in JSON per l'uso da parte di altri
//! processi (GUI, script).
//!
//! ## Responsabilità:
//! - Emette un messaggio JSON per riga su stdout
//! - Riusa le strutture esistenti (`ProgressEvent`, `RunSummary`, `EstimationReport`)
//!
//! ## Tipi di messaggi:
//! - `start`: Inizio della run
//! - `progress`: Snapshot cumulativo dopo ogni file registrato
//! - `analysis`: Report dell'analisi preliminare
//! - `complete`: Fine della run (completata o fermata) con riepilogo
//! - `error`: Errore che impedisce la run

use crate::config::Config;
use crate::estimator::EstimationReport;
use crate::pipeline::ProgressEvent;
use crate::progress::RunSummary;
use serde::Serialize;
use std::path::PathBuf;

/// Tipo di messaggio JSON
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum JsonMessage {
    /// Inizio della run
    #[serde(rename = "start")]
    Start {
        input_dir: PathBuf,
        output_dir: PathBuf,
        resume: bool,
        total_bytes: u64,
        config: JsonConfig,
    },

    /// Progresso corrente
    #[serde(rename = "progress")]
    Progress {
        #[serde(flatten)]
        event: ProgressEvent,
        percentage: f64,
    },

    /// Analisi preliminare
    #[serde(rename = "analysis")]
    Analysis(EstimationReport),

    /// Run terminata
    #[serde(rename = "complete")]
    Complete {
        stopped: bool,
        #[serde(flatten)]
        summary: RunSummary,
        duration_seconds: f64,
    },

    /// Errore generale
    #[serde(rename = "error")]
    Error {
        message: String,
        details: Option<String>,
    },
}

/// Configurazione per output JSON
#[derive(Debug, Serialize)]
pub struct JsonConfig {
    pub image_quality: u8,
    pub speed: String,
    pub preserve_metadata: bool,
}

impl JsonMessage {
    /// Emette il messaggio JSON su stdout
    pub fn emit(&self) {
        if let Ok(json) = serde_json::to_string(self) {
            println!("{}", json);
        }
    }

    pub fn start(
        input_dir: PathBuf,
        output_dir: PathBuf,
        resume: bool,
        total_bytes: u64,
        config: JsonConfig,
    ) -> Self {
        Self::Start {
            input_dir,
            output_dir,
            resume,
            total_bytes,
            config,
        }
    }

    /// Crea un messaggio di progresso; la percentuale è relativa a `total_bytes`
    pub fn progress(event: ProgressEvent, total_bytes: u64) -> Self {
        let percentage = event.percent_of(total_bytes);
        Self::Progress { event, percentage }
    }

    pub fn complete(stopped: bool, summary: RunSummary, duration_seconds: f64) -> Self {
        Self::Complete {
            stopped,
            summary,
            duration_seconds,
        }
    }

    pub fn error(message: String, details: Option<String>) -> Self {
        Self::Error { message, details }
    }
}

impl From<&Config> for JsonConfig {
    fn from(config: &Config) -> Self {
        Self {
            image_quality: config.image_quality,
            speed: config.speed.to_string(),
            preserve_metadata: config.preserve_metadata,
        }
    }
}
