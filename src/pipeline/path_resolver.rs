//! # Path Resolution Module
//!
//! Calcola il path di output di un file: stesso path relativo rispetto alla sorgente,
//! ricreato sotto la directory di destinazione. Nome ed estensione non cambiano.

use crate::error::CompressError;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Maps source files onto the destination tree
pub struct PathResolver;

impl PathResolver {
    /// Output path of `input`, a file under `source_root`
    pub fn output_path(
        input: &Path,
        source_root: &Path,
        destination_root: &Path,
    ) -> Result<PathBuf, CompressError> {
        let relative = input.strip_prefix(source_root).map_err(|_| {
            CompressError::Validation(format!(
                "{} is not inside {}",
                input.display(),
                source_root.display()
            ))
        })?;

        if relative.as_os_str().is_empty() {
            return Err(CompressError::Validation(format!(
                "Invalid file name: {}",
                input.display()
            )));
        }

        let result = destination_root.join(relative);
        debug!("Resolved output path: {} -> {}", input.display(), result.display());
        Ok(result)
    }
}
