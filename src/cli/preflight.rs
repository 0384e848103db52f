//! Pre-flight checks before talking to the assistant.
//!
//! Validates that required tools and configuration are available
//! before starting a conversation that would otherwise fail midway.

use crate::config::Settings;
use crate::error::{MicroError, Result};
use std::process::Command;

/// Requirements for different operations.
#[derive(Debug, Clone, Copy)]
pub enum Operation {
    /// Any conversation requires the API key.
    Converse,
    /// Directory analysis also runs the metrics command.
    Analyze,
}

/// Run pre-flight checks for the given operation.
///
/// Returns Ok(()) if all checks pass, or an error describing what's missing.
pub fn check(operation: Operation, settings: &Settings) -> Result<()> {
    check_api_key()?;
    if let Operation::Analyze = operation {
        match settings.tools.metrics_command.first() {
            Some(program) => check_tool(program)?,
            None => {
                return Err(MicroError::Config(
                    "tools.metrics_command is empty".to_string(),
                ))
            }
        }
    }
    Ok(())
}

/// Check if OpenAI API key is configured.
fn check_api_key() -> Result<()> {
    match std::env::var("OPENAI_API_KEY") {
        Ok(key) if !key.is_empty() => Ok(()),
        Ok(_) => Err(MicroError::Config(
            "OPENAI_API_KEY is empty. Set it with: export OPENAI_API_KEY='sk-...'".to_string(),
        )),
        Err(_) => Err(MicroError::Config(
            "OPENAI_API_KEY not set. Set it with: export OPENAI_API_KEY='sk-...'".to_string(),
        )),
    }
}

/// Check if an external tool is available.
pub(crate) fn check_tool(name: &str) -> Result<()> {
    // unzip prints its version with -v
    let version_arg = match name {
        "unzip" => "-v",
        _ => "--version",
    };
    match Command::new(name).arg(version_arg).output() {
        Ok(output) if output.status.success() => Ok(()),
        Ok(_) => Err(MicroError::ToolNotFound(format!(
            "{} is installed but not working correctly",
            name
        ))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(MicroError::ToolNotFound(name.to_string()))
        }
        Err(e) => Err(MicroError::ToolNotFound(format!("{}: {}", name, e))),
    }
}
