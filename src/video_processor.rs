//! # Video Processing Module
//!
//! Questo modulo gestisce il transcode dei video con FFmpeg come processo esterno
//! interrompibile.
//!
//! ## Responsabilità:
//! - Compressione video con FFmpeg (libx264, CRF dalla fascia di dimensione)
//! - Preset di velocità configurabile (`ultrafast` … `veryslow`)
//! - Preservazione metadata container (`-map_metadata 0`, `use_metadata_tags`)
//! - Polling del flag di esecuzione durante il transcode e kill del processo allo stop
//!
//! ## Comando:
//! ```text
//! ffmpeg -y -i <input> -movflags use_metadata_tags -map_metadata 0 \
//!        -c:v libx264 -crf <N> -preset <speed> -loglevel error <tmp>
//! ```
//!
//! ## Output parziali:
//! FFmpeg scrive in un file temporaneo nella directory di destinazione. Solo a
//! processo terminato con successo il file viene rinominato sul path finale; in caso
//! di errore o stop il temporaneo viene eliminato.
//!
//! ## Dipendenze richieste:
//! - `ffmpeg`

use crate::backend::{VideoBackend, VideoOutcome};
use crate::config::SpeedPreset;
use crate::error::CompressError;
use crate::file_manager::FileManager;
use crate::pipeline::control::RunControl;
use crate::platform::PlatformCommands;
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Video backend driving an `ffmpeg` child process
pub struct FfmpegVideoCompressor {
    program: OsString,
    launcher_args: Vec<OsString>,
    poll_interval: Duration,
}

impl FfmpegVideoCompressor {
    pub fn new(poll_interval: Duration) -> Self {
        let ffmpeg = PlatformCommands::instance().get_command("ffmpeg");
        Self {
            program: OsString::from(ffmpeg),
            launcher_args: Vec::new(),
            poll_interval,
        }
    }

    /// Run through a launcher, e.g. `nice -n 19 ffmpeg`. The ffmpeg arguments are
    /// appended after `launcher_args`.
    pub fn with_launcher(
        program: impl Into<OsString>,
        launcher_args: Vec<OsString>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            program: program.into(),
            launcher_args,
            poll_interval,
        }
    }

    fn build_command(&self, input: &Path, output: &Path, crf: u8, speed: SpeedPreset) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.launcher_args)
            .arg("-y")
            .arg("-i")
            .arg(input)
            .args(["-movflags", "use_metadata_tags"])
            .args(["-map_metadata", "0"])
            .args(["-c:v", "libx264"])
            .arg("-crf")
            .arg(crf.to_string())
            .arg("-preset")
            .arg(speed.as_str())
            .args(["-loglevel", "error"])
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

impl Default for FfmpegVideoCompressor {
    fn default() -> Self {
        Self::new(Duration::from_millis(250))
    }
}

#[async_trait]
impl VideoBackend for FfmpegVideoCompressor {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn compress_video(
        &self,
        input: &Path,
        output: &Path,
        crf: u8,
        speed: SpeedPreset,
        control: &RunControl,
    ) -> Result<VideoOutcome, CompressError> {
        if !control.is_running() {
            return Ok(VideoOutcome::Cancelled);
        }

        FileManager::ensure_parent_dirs(output).await?;
        let parent = output
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let suffix = output
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();
        // Dropped (and deleted) on every early return
        let temp = tempfile::Builder::new()
            .prefix(".transcode-")
            .suffix(&suffix)
            .tempfile_in(&parent)?;

        debug!(
            "Transcoding {} (crf {}, preset {})",
            input.display(),
            crf,
            speed
        );

        let mut child = self
            .build_command(input, temp.path(), crf, speed)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    CompressError::MissingDependency(format!(
                        "{} not found on PATH",
                        self.program.to_string_lossy()
                    ))
                } else {
                    CompressError::VideoTool(format!("Failed to start ffmpeg: {}", e))
                }
            })?;

        let stderr = child.stderr.take();
        let stderr_task = tokio::spawn(async move {
            let mut captured = String::new();
            if let Some(mut stderr) = stderr {
                let _ = stderr.read_to_string(&mut captured).await;
            }
            captured
        });

        let status = loop {
            match tokio::time::timeout(self.poll_interval, child.wait()).await {
                Ok(status) => break status?,
                Err(_) => {
                    if !control.is_running() {
                        info!("Stop requested, terminating ffmpeg for {}", input.display());
                        if let Err(e) = child.kill().await {
                            warn!("Failed to kill ffmpeg: {}", e);
                        }
                        stderr_task.abort();
                        return Ok(VideoOutcome::Cancelled);
                    }
                }
            }
        };

        let stderr_output = stderr_task.await.unwrap_or_default();
        if !status.success() {
            return Err(CompressError::VideoTool(format!(
                "ffmpeg exited with {}: {}",
                status,
                stderr_output.trim()
            )));
        }
        if !stderr_output.trim().is_empty() {
            debug!("ffmpeg stderr for {}: {}", input.display(), stderr_output.trim());
        }

        temp.persist(output)?;
        let final_size = FileManager::get_file_size(output).await?;
        Ok(VideoOutcome::Completed { final_size })
    }
}
