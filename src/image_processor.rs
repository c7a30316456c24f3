//! # Image Processing Module
//!
//! Questo modulo comprime le immagini in-process con il crate `image`, e delega a
//! exiftool solo la re-iniezione dei metadati essenziali.
//!
//! ## Formati Supportati
//!
//! | Formato | Decodifica | Output | Strategia |
//! |---------|------------|--------|-----------|
//! | JPEG    | ✅         | JPEG   | Ri-encoding con qualità configurabile |
//! | PNG     | ✅         | PNG    | Ri-encoding lossless, compressione massima |
//! | GIF     | ✅         | GIF    | Solo validazione, copia invariata (preserva animazioni) |
//!
//! ## Pipeline di Compressione
//!
//! 1. **Decodifica**: Formato rilevato dal contenuto, non dall'estensione
//! 2. **Orientamento**: Applica l'orientamento EXIF ai pixel
//! 3. **Encoding**: Scrive in un file temporaneo nella directory di destinazione
//! 4. **Persist**: Rename atomico sul path finale
//! 5. **Metadata**: Copia Make, Model, Orientation, DateTimeOriginal, dimensioni
//!    con exiftool (se disponibile). Se i pixel sono stati ruotati l'orientamento
//!    viene azzerato a 1.
//!
//! ## Error Handling e Resilienza
//!
//! - **Immagine corrotta**: Copia byte-per-byte dell'originale, `ImageOutcome::FallbackCopy`
//! - **Metadata**: Un fallimento di exiftool produce solo un warning
//! - **I/O**: Propagato come `CompressError::Io` (la pipeline decide il fallback)
//!
//! La decodifica è CPU-bound e gira in `spawn_blocking`.

use crate::backend::{ImageBackend, ImageOutcome};
use crate::classifier::extension_of;
use crate::error::CompressError;
use crate::file_manager::FileManager;
use crate::platform::PlatformCommands;
use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilterType, PngEncoder};
use image::metadata::Orientation;
use image::{DynamicImage, ImageDecoder, ImageReader};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// EXIF tags kept in compressed JPEGs
const PRESERVED_TAGS: &[&str] = &[
    "-Make",
    "-Model",
    "-DateTimeOriginal",
    "-ExifImageWidth",
    "-ExifImageHeight",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputKind {
    Jpeg,
    Png,
    /// Validated, then copied untouched
    Passthrough,
}

impl OutputKind {
    fn for_path(path: &Path) -> Option<Self> {
        match extension_of(path).as_deref() {
            Some("jpg") | Some("jpeg") => Some(Self::Jpeg),
            Some("png") => Some(Self::Png),
            Some("gif") => Some(Self::Passthrough),
            _ => None,
        }
    }
}

/// What the blocking encode step did
#[derive(Debug)]
struct EncodeReport {
    kind: OutputKind,
    rotated: bool,
}

/// Image backend built on the `image` crate
pub struct ImageCompressor {
    preserve_metadata: bool,
    exiftool_available: OnceCell<bool>,
}

impl ImageCompressor {
    pub fn new(preserve_metadata: bool) -> Self {
        Self {
            preserve_metadata,
            exiftool_available: OnceCell::new(),
        }
    }

    async fn has_exiftool(&self) -> bool {
        *self
            .exiftool_available
            .get_or_init(|| async {
                let available = PlatformCommands::instance()
                    .is_command_available("exiftool")
                    .await;
                if !available {
                    warn!("exiftool not found, compressed images will carry no EXIF metadata");
                }
                available
            })
            .await
    }

    /// exiftool invocation copying the filtered EXIF subset from `source` into `target`
    fn metadata_command(program: &str, source: &Path, target: &Path, rotated: bool) -> Command {
        let mut cmd = Command::new(program);
        cmd.arg("-overwrite_original")
            .arg("-tagsFromFile")
            .arg(source)
            .args(PRESERVED_TAGS);
        if rotated {
            // Pixels already carry the rotation
            cmd.arg("-Orientation#=1");
        } else {
            cmd.arg("-Orientation");
        }
        cmd.arg(target);
        cmd
    }

    async fn copy_metadata(&self, source: &Path, target: &Path, rotated: bool) {
        let exiftool_cmd = PlatformCommands::instance().get_command("exiftool");
        let mut cmd = Self::metadata_command(exiftool_cmd, source, target, rotated);

        match cmd.output().await {
            Ok(output) if output.status.success() => {
                debug!("Preserved EXIF subset for {}", target.display());
            }
            Ok(output) => warn!(
                "Failed to preserve image metadata for {}: {}",
                source.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            ),
            Err(e) => warn!("Failed to execute {}: {}", exiftool_cmd, e),
        }
    }
}

impl Default for ImageCompressor {
    fn default() -> Self {
        Self::new(true)
    }
}

#[async_trait]
impl ImageBackend for ImageCompressor {
    fn name(&self) -> &str {
        "image"
    }

    async fn compress_image(
        &self,
        input: &Path,
        output: &Path,
        quality: u8,
    ) -> Result<ImageOutcome, CompressError> {
        FileManager::ensure_parent_dirs(output).await?;

        let input_buf = input.to_path_buf();
        let output_buf = output.to_path_buf();
        let encoded =
            tokio::task::spawn_blocking(move || encode_image(&input_buf, &output_buf, quality))
                .await
                .map_err(|e| CompressError::Io(std::io::Error::other(e)))?;

        match encoded {
            Ok(report) => {
                if report.kind == OutputKind::Jpeg && self.preserve_metadata && self.has_exiftool().await {
                    self.copy_metadata(input, output, report.rotated).await;
                }
                let final_size = FileManager::get_file_size(output).await?;
                Ok(ImageOutcome::Compressed { final_size })
            }
            Err(CompressError::ImageDecode(reason)) => {
                warn!(
                    "Failed to process image (corrupt), copying anyway: {} ({})",
                    input.display(),
                    reason
                );
                let final_size = FileManager::copy_file(input, output).await?;
                Ok(ImageOutcome::FallbackCopy { final_size, reason })
            }
            Err(e) => Err(e),
        }
    }
}

fn decode_error(err: image::ImageError) -> CompressError {
    CompressError::ImageDecode(err.to_string())
}

/// Decode, orient and re-encode `input` into `output`. Blocking.
fn encode_image(input: &Path, output: &Path, quality: u8) -> Result<EncodeReport, CompressError> {
    let kind = OutputKind::for_path(input).ok_or_else(|| {
        CompressError::ImageDecode(format!("No encoder for {}", input.display()))
    })?;

    let reader = ImageReader::new(BufReader::new(File::open(input)?)).with_guessed_format()?;
    let mut decoder = reader.into_decoder().map_err(decode_error)?;
    let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);
    let mut img = DynamicImage::from_decoder(decoder).map_err(decode_error)?;

    if kind == OutputKind::Passthrough {
        std::fs::copy(input, output)?;
        debug!("Validated and passed through {}", input.display());
        return Ok(EncodeReport {
            kind,
            rotated: false,
        });
    }

    let rotated = orientation != Orientation::NoTransforms;
    if rotated {
        debug!("Applying orientation {:?} to {}", orientation, input.display());
        img.apply_orientation(orientation);
    }

    let parent = output
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let mut temp = tempfile::Builder::new()
        .prefix(".compress-")
        .tempfile_in(&parent)?;

    {
        let mut writer = BufWriter::new(temp.as_file_mut());
        if kind == OutputKind::Jpeg {
            // JPEG has no alpha channel
            let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
            rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut writer, quality))?;
        } else {
            img.write_with_encoder(PngEncoder::new_with_quality(
                &mut writer,
                CompressionType::Best,
                PngFilterType::Adaptive,
            ))?;
        }
        writer.flush()?;
    }

    temp.persist(output)?;
    Ok(EncodeReport { kind, rotated })
}
