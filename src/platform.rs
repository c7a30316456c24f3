//! # Platform-specific utilities
//!
//! Questo modulo centralizza la gestione cross-platform dei tool esterni
//! (ffmpeg, exiftool): nome eseguibile per piattaforma e verifica disponibilità.

use std::collections::HashMap;
use std::sync::OnceLock;

/// Platform-specific command manager
pub struct PlatformCommands {
    commands: HashMap<&'static str, &'static str>,
    which_command: &'static str,
}

impl PlatformCommands {
    /// Get the singleton instance
    pub fn instance() -> &'static Self {
        static INSTANCE: OnceLock<PlatformCommands> = OnceLock::new();
        INSTANCE.get_or_init(Self::new)
    }

    fn new() -> Self {
        let mut commands = HashMap::new();
        let which_command = if cfg!(windows) {
            commands.insert("exiftool", "exiftool.exe");
            commands.insert("ffmpeg", "ffmpeg.exe");
            "where"
        } else {
            commands.insert("exiftool", "exiftool");
            commands.insert("ffmpeg", "ffmpeg");
            "which"
        };

        Self {
            commands,
            which_command,
        }
    }

    /// Get the platform-specific command name
    pub fn get_command<'a>(&self, base_name: &'a str) -> &'a str {
        self.commands.get(base_name).copied().unwrap_or(base_name)
    }

    /// Get the command used to check if a program exists
    pub fn which_command(&self) -> &str {
        self.which_command
    }

    /// Check if a command is available on PATH
    pub async fn is_command_available(&self, base_name: &str) -> bool {
        let command_name = self.get_command(base_name);

        let result = tokio::process::Command::new(self.which_command)
            .arg(command_name)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .await;

        matches!(result, Ok(status) if status.success())
    }
}
