//! Configuration settings for microgpt.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub assistant: AssistantSettings,
    pub completion: CompletionSettings,
    pub poll: PollSettings,
    pub tools: ToolSettings,
    pub workflow: WorkflowSettings,
    pub output: OutputSettings,
    pub prompts: PromptSettings,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Directory for the assistant cache and debug dumps.
    pub data_dir: String,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            data_dir: "~/.microgpt".to_string(),
            log_level: "warn".to_string(),
        }
    }
}

/// What to do with a cached assistant id whose definition no longer matches.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ReusePolicy {
    /// Reuse any cached id verbatim, even if tools or instructions changed.
    Reuse,
    /// Create a new assistant when the cached definition differs.
    #[default]
    RecreateOnChange,
}

impl std::str::FromStr for ReusePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "reuse" => Ok(ReusePolicy::Reuse),
            "recreate-on-change" | "recreate" => Ok(ReusePolicy::RecreateOnChange),
            _ => Err(format!("Unknown reuse policy: {}", s)),
        }
    }
}

impl std::fmt::Display for ReusePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReusePolicy::Reuse => write!(f, "reuse"),
            ReusePolicy::RecreateOnChange => write!(f, "recreate-on-change"),
        }
    }
}

/// Remote assistant settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantSettings {
    /// Model used for every persona unless the persona overrides it.
    pub model: String,
    /// Policy for cached assistant ids.
    pub reuse_policy: ReusePolicy,
    /// Declare the hosted code interpreter alongside the local tools.
    pub code_interpreter: bool,
}

impl Default for AssistantSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4-1106-preview".to_string(),
            reuse_policy: ReusePolicy::RecreateOnChange,
            code_interpreter: true,
        }
    }
}

/// One-shot completion settings (used for step splitting).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4-1106-preview".to_string(),
            temperature: 0.0,
            max_tokens: 500,
        }
    }
}

/// Run polling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollSettings {
    /// First wait between status polls, in milliseconds.
    pub interval_ms: u64,
    /// Upper bound for the wait between polls, in milliseconds.
    pub max_interval_ms: u64,
    /// Multiplier applied to the wait after every non-terminal poll.
    pub backoff_factor: f64,
    /// Give up on a run after this many seconds.
    pub timeout_secs: u64,
    /// Timeout for individual API requests, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            max_interval_ms: 5000,
            backoff_factor: 2.0,
            timeout_secs: 600,
            request_timeout_secs: 300,
        }
    }
}

impl PollSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn max_interval(&self) -> Duration {
        Duration::from_millis(self.max_interval_ms.max(self.interval_ms))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// How the dispatcher treats a failing tool handler.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    /// The first handler error aborts the whole batch and the run.
    Abort,
    /// Handler errors are submitted as that call's output.
    #[default]
    Report,
}

impl std::str::FromStr for ErrorPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "abort" => Ok(ErrorPolicy::Abort),
            "report" => Ok(ErrorPolicy::Report),
            _ => Err(format!("Unknown error policy: {}", s)),
        }
    }
}

impl std::fmt::Display for ErrorPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorPolicy::Abort => write!(f, "abort"),
            ErrorPolicy::Report => write!(f, "report"),
        }
    }
}

/// Local tool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolSettings {
    /// Handler failure policy.
    pub error_policy: ErrorPolicy,
    /// Python interpreter used to run created scripts.
    pub python: String,
    /// Command computing image metrics; the image path is appended.
    pub metrics_command: Vec<String>,
    /// Upload command; `{file}` and `{folder}` are substituted.
    pub upload_command: Vec<String>,
    /// Folder used when the model does not name one.
    pub upload_folder: String,
    /// Zenodo access token (optional).
    pub zenodo_token: Option<String>,
    /// Run created scripts without asking.
    pub auto_approve_scripts: bool,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            error_policy: ErrorPolicy::Report,
            python: "python3".to_string(),
            metrics_command: vec![
                "python3".to_string(),
                "-m".to_string(),
                "microgpt_metrics".to_string(),
            ],
            upload_command: vec![
                "rclone".to_string(),
                "copy".to_string(),
                "{file}".to_string(),
                "gdrive:{folder}".to_string(),
            ],
            upload_folder: "microgpt".to_string(),
            zenodo_token: None,
            auto_approve_scripts: false,
        }
    }
}

/// Higher-order workflow settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowSettings {
    /// Maximum nesting of workflows started from tool calls.
    pub max_depth: usize,
    /// Step delimiter expected in the planning response.
    pub delimiter: String,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            max_depth: 2,
            delimiter: "####".to_string(),
        }
    }
}

/// Output and diagnostics settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    /// Directory for saved images and CSV files.
    pub artifact_dir: String,
    /// Write JSON dumps of actions, messages and run steps.
    pub debug_dumps: bool,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            artifact_dir: ".".to_string(),
            debug_dumps: true,
        }
    }
}

/// Prompt customization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct PromptSettings {
    /// Directory for custom prompts (overrides defaults).
    pub custom_dir: Option<String>,
    /// Custom variables available in all prompts as {{variable_name}}.
    pub variables: std::collections::HashMap<String, String>,
}

impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> crate::error::Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    pub fn load_from(path: Option<&PathBuf>) -> crate::error::Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let settings: Settings = toml::from_str(&content)?;
            Ok(settings)
        } else {
            Ok(Settings::default())
        }
    }

    /// Save settings to the default configuration file.
    pub fn save(&self) -> crate::error::Result<()> {
        self.save_to(&Self::default_config_path())
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::MicroError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("microgpt")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    /// Get the expanded data directory path.
    pub fn data_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.data_dir)
    }

    /// Directory holding one cache file per persona.
    pub fn assistant_cache_dir(&self) -> PathBuf {
        self.data_dir().join("assistants")
    }

    /// Root directory for per-session debug dumps.
    pub fn debug_dir(&self) -> PathBuf {
        self.data_dir().join("debug")
    }

    /// Get the expanded artifact directory path.
    pub fn artifact_dir(&self) -> PathBuf {
        Self::expand_path(&self.output.artifact_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let settings: Settings = toml::from_str(
            r#"
            [poll]
            timeout_secs = 30

            [tools]
            error_policy = "abort"
            "#,
        )
        .unwrap();

        assert_eq!(settings.poll.timeout_secs, 30);
        assert_eq!(settings.poll.interval_ms, 1000);
        assert_eq!(settings.tools.error_policy, ErrorPolicy::Abort);
        assert_eq!(settings.assistant.reuse_policy, ReusePolicy::RecreateOnChange);
        assert_eq!(settings.workflow.delimiter, "####");
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("reuse".parse::<ReusePolicy>().unwrap(), ReusePolicy::Reuse);
        assert_eq!(
            "Recreate".parse::<ReusePolicy>().unwrap(),
            ReusePolicy::RecreateOnChange
        );
        assert!("sometimes".parse::<ReusePolicy>().is_err());
        assert_eq!("REPORT".parse::<ErrorPolicy>().unwrap(), ErrorPolicy::Report);
        assert_eq!(ErrorPolicy::Abort.to_string(), "abort");
    }

    #[test]
    fn test_max_interval_never_below_interval() {
        let poll = PollSettings {
            interval_ms: 800,
            max_interval_ms: 100,
            ..Default::default()
        };
        assert_eq!(poll.max_interval(), Duration::from_millis(800));
    }
}
