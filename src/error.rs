//! Error types for microgpt.

use std::time::Duration;
use thiserror::Error;

/// Library-level error type for microgpt operations.
#[derive(Error, Debug)]
pub enum MicroError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("OpenAI API error: {0}")]
    OpenAI(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments for tool '{tool}': {message}")]
    ToolArguments { tool: String, message: String },

    #[error("Tool '{tool}' failed: {message}")]
    ToolFailed { tool: String, message: String },

    #[error("External tool not found: {0}. Please install it and ensure it's in your PATH.")]
    ToolNotFound(String),

    #[error("Could not split request into steps: {0}")]
    StepParse(String),

    #[error("Run {run_id} did not finish within {elapsed:?}")]
    Timeout { run_id: String, elapsed: Duration },

    #[error("Run {0} was cancelled locally")]
    Cancelled(String),

    #[error("Workflow nesting depth {depth} exceeds the limit of {max}")]
    DepthExceeded { depth: usize, max: usize },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Agent error: {0}")]
    Agent(String),
}

impl MicroError {
    /// Shorthand for a handler failure attributed to a tool.
    pub fn tool_failed(tool: &str, message: impl Into<String>) -> Self {
        MicroError::ToolFailed {
            tool: tool.to_string(),
            message: message.into(),
        }
    }

    /// Shorthand for malformed tool arguments.
    pub fn tool_arguments(tool: &str, message: impl Into<String>) -> Self {
        MicroError::ToolArguments {
            tool: tool.to_string(),
            message: message.into(),
        }
    }
}

/// Result type alias for microgpt operations.
pub type Result<T> = std::result::Result<T, MicroError>;
