//! Upload of local files through an external command (rclone by default).

use crate::error::{MicroError, Result};
use std::path::Path;
use tokio::process::Command;
use tracing::info;

/// Runs the configured upload command with `{file}` and `{folder}` substituted.
#[derive(Debug, Clone)]
pub struct CommandUploader {
    command: Vec<String>,
}

impl CommandUploader {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }

    /// Command line for one upload.
    fn command_line(&self, file: &Path, folder: &str) -> Vec<String> {
        let file = file.to_string_lossy();
        self.command
            .iter()
            .map(|part| part.replace("{file}", &file).replace("{folder}", folder))
            .collect()
    }

    pub async fn upload(&self, file: &Path, folder: &str) -> Result<String> {
        if !file.is_file() {
            return Err(MicroError::tool_failed(
                "upload_file",
                format!("File not found: {}", file.display()),
            ));
        }

        let line = self.command_line(file, folder);
        let (program, args) = line
            .split_first()
            .ok_or_else(|| MicroError::Config("tools.upload_command is empty".to_string()))?;

        let output = Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    MicroError::ToolNotFound(program.clone())
                } else {
                    MicroError::Io(e)
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(MicroError::tool_failed("upload_file", stderr.trim()));
        }

        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        info!("Uploaded {} to {}", name, folder);

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stdout = stdout.trim();
        if stdout.is_empty() {
            Ok(format!("'{}' is uploaded to folder '{}'.", name, folder))
        } else {
            Ok(format!("'{}' is uploaded to folder '{}'. {}", name, folder, stdout))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_placeholders_are_substituted() {
        let uploader = CommandUploader::new(strings(&["rclone", "copy", "{file}", "gdrive:{folder}"]));
        assert_eq!(
            uploader.command_line(Path::new("out/results.csv"), "runs"),
            strings(&["rclone", "copy", "out/results.csv", "gdrive:runs"])
        );
    }

    #[tokio::test]
    async fn test_upload_runs_command() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("results.csv");
        std::fs::write(&file, "a,b\n").unwrap();

        let uploader = CommandUploader::new(strings(&["echo", "link:{folder}"]));
        let message = uploader.upload(&file, "runs").await.unwrap();
        assert_eq!(message, "'results.csv' is uploaded to folder 'runs'. link:runs");
    }

    #[tokio::test]
    async fn test_upload_missing_file() {
        let uploader = CommandUploader::new(strings(&["true"]));
        let err = uploader
            .upload(Path::new("/nonexistent/results.csv"), "runs")
            .await
            .unwrap_err();
        assert!(matches!(err, MicroError::ToolFailed { .. }));
    }
}
