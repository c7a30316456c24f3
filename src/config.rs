//! # Configuration Management Module
//!
//! Questo modulo gestisce tutta la configurazione della compressione.
//!
//! ## Responsabilità:
//! - Definisce la struct `Config` con tutti i parametri di compressione
//! - Definisce `SpeedPreset`, il preset x264 usato per i video (e dal modello di stima)
//! - Fornisce validazione dei parametri di input
//! - Supporta caricamento/salvataggio configurazione da/verso file JSON
//!
//! ## Parametri di configurazione:
//! - `image_quality`: Qualità JPEG (1-100, default: 20)
//! - `speed`: Preset di velocità video (default: fast)
//! - `video_tiers`: Tabella fasce dimensione → CRF
//! - `cancel_poll_interval_ms`: Intervallo di polling dello stop durante ffmpeg (default: 250)
//! - `preserve_metadata`: Re-inserisce un sottoinsieme EXIF nelle immagini (default: true)
//! - `output_path`: Directory di destinazione (default: cartella `output` accanto alla sorgente)
//! - `state_file`: Path del ledger (default: `~/.media-compressor/ledger_<hash>.json`)
//! - `json_output`: Eventi JSON su stdout invece della progress bar
//!
//! ## Esempio:
//! ```ignore
//! let config = Config {
//!     image_quality: 60,
//!     speed: SpeedPreset::Slow,
//!     ..Default::default()
//! };
//! config.validate()?;
//! ```

use crate::classifier::TierTable;
use crate::error::CompressError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Name of the default destination directory, created next to the source folder
pub const OUTPUT_FOLDER_NAME: &str = "output";

/// x264 speed preset, slowest compresses best
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SpeedPreset {
    Ultrafast,
    Superfast,
    Veryfast,
    Faster,
    #[default]
    Fast,
    Medium,
    Slow,
    Slower,
    Veryslow,
}

impl SpeedPreset {
    pub const ALL: [SpeedPreset; 9] = [
        Self::Ultrafast,
        Self::Superfast,
        Self::Veryfast,
        Self::Faster,
        Self::Fast,
        Self::Medium,
        Self::Slow,
        Self::Slower,
        Self::Veryslow,
    ];

    /// Value passed to ffmpeg `-preset`
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ultrafast => "ultrafast",
            Self::Superfast => "superfast",
            Self::Veryfast => "veryfast",
            Self::Faster => "faster",
            Self::Fast => "fast",
            Self::Medium => "medium",
            Self::Slow => "slow",
            Self::Slower => "slower",
            Self::Veryslow => "veryslow",
        }
    }
}

impl fmt::Display for SpeedPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SpeedPreset {
    type Err = CompressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|preset| preset.as_str() == wanted)
            .ok_or_else(|| CompressError::Validation(format!("Unknown speed preset: {}", s)))
    }
}

/// Configuration for a compression run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// JPEG quality (1-100)
    pub image_quality: u8,
    /// Video encoder speed preset
    pub speed: SpeedPreset,
    /// Size bands used to pick the video CRF
    pub video_tiers: TierTable,
    /// How often a running transcode checks the stop flag
    pub cancel_poll_interval_ms: u64,
    /// Re-embed the filtered EXIF subset into compressed JPEGs
    pub preserve_metadata: bool,
    /// Destination root (None = sibling `output` folder)
    pub output_path: Option<PathBuf>,
    /// Ledger location override
    pub state_file: Option<PathBuf>,
    /// Output progress and status as JSON for programmatic use
    pub json_output: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            image_quality: 20,
            speed: SpeedPreset::Fast,
            video_tiers: TierTable::default(),
            cancel_poll_interval_ms: 250,
            preserve_metadata: true,
            output_path: None,
            state_file: None,
            json_output: false,
        }
    }
}

impl Config {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), CompressError> {
        if self.image_quality == 0 || self.image_quality > 100 {
            return Err(CompressError::Validation(
                "Image quality must be between 1 and 100".to_string(),
            ));
        }

        if self.cancel_poll_interval_ms == 0 || self.cancel_poll_interval_ms > 1000 {
            return Err(CompressError::Validation(
                "Cancel poll interval must be between 1 and 1000 ms".to_string(),
            ));
        }

        // Re-run the table checks, a deserialized table is validated but a hand-built one may not be
        TierTable::new(self.video_tiers.bands().to_vec())?;

        Ok(())
    }

    /// Destination root for a source folder
    pub fn destination_for(&self, source: &Path) -> PathBuf {
        match self.output_path {
            Some(ref output) => output.clone(),
            None => source
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join(OUTPUT_FOLDER_NAME),
        }
    }

    /// Load configuration from file
    pub async fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::TierBand;
    use tempfile::TempDir;

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.image_quality = 0;
        assert!(config.validate().is_err());

        config.image_quality = 101;
        assert!(config.validate().is_err());

        config.image_quality = 80;
        config.cancel_poll_interval_ms = 1500;
        assert!(config.validate().is_err());

        config.cancel_poll_interval_ms = 1000;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.image_quality, 20);
        assert_eq!(config.speed, SpeedPreset::Fast);
        assert_eq!(config.video_tiers.copy_threshold_mb(), 10.0);
        assert!(config.preserve_metadata);
        assert!(config.output_path.is_none());
    }

    #[test]
    fn test_speed_preset_parse() {
        assert_eq!("veryslow".parse::<SpeedPreset>().unwrap(), SpeedPreset::Veryslow);
        assert_eq!(" FAST ".parse::<SpeedPreset>().unwrap(), SpeedPreset::Fast);
        assert!("warp".parse::<SpeedPreset>().is_err());
        for preset in SpeedPreset::ALL {
            assert_eq!(preset.as_str().parse::<SpeedPreset>().unwrap(), preset);
        }
    }

    #[test]
    fn test_destination_defaults_to_sibling_output() {
        let config = Config::default();
        assert_eq!(
            config.destination_for(Path::new("/media/photos")),
            PathBuf::from("/media/output")
        );

        let config = Config {
            output_path: Some(PathBuf::from("/backup/compressed")),
            ..Default::default()
        };
        assert_eq!(
            config.destination_for(Path::new("/media/photos")),
            PathBuf::from("/backup/compressed")
        );
    }

    #[tokio::test]
    async fn test_config_save_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");

        let original_config = Config {
            image_quality: 65,
            speed: SpeedPreset::Slower,
            video_tiers: TierTable::new(vec![TierBand::new(5.0, 30), TierBand::new(50.0, 36)])
                .unwrap(),
            json_output: true,
            ..Default::default()
        };

        original_config.save_to_file(&config_path).await.unwrap();
        let loaded_config = Config::from_file(&config_path).await.unwrap();

        assert_eq!(loaded_config.image_quality, 65);
        assert_eq!(loaded_config.speed, SpeedPreset::Slower);
        assert_eq!(loaded_config.video_tiers, original_config.video_tiers);
        assert!(loaded_config.json_output);
    }

    #[tokio::test]
    async fn test_config_missing_file_is_default() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::from_file(&temp_dir.path().join("absent.json")).await.unwrap();
        assert_eq!(config.image_quality, 20);
    }
}
