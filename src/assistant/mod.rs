//! Remote assistant service abstraction.
//!
//! The hosted service (assistants, threads, runs, files) is an opaque RPC
//! boundary. Everything above this module talks to [`AssistantBackend`] and the
//! plain data types defined here, never to the wire types of a client library.

mod cache;
mod dump;
mod memory;
mod openai;

pub use cache::{AssistantCache, CachedAssistant};
pub use dump::DebugDumps;
pub use memory::{MemoryBackend, RunScript, ScriptStep, Submission};
pub use openai::OpenAIBackend;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A tool declared on a remote assistant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolDeclaration {
    /// The service-hosted code interpreter.
    CodeInterpreter,
    /// A local function the model may call.
    Function {
        name: String,
        description: String,
        parameters: serde_json::Value,
    },
}

impl ToolDeclaration {
    /// Name of a function declaration, `None` for hosted tools.
    pub fn function_name(&self) -> Option<&str> {
        match self {
            ToolDeclaration::Function { name, .. } => Some(name),
            ToolDeclaration::CodeInterpreter => None,
        }
    }
}

/// Everything needed to create a remote assistant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssistantDefinition {
    pub name: String,
    pub instructions: String,
    pub model: String,
    pub tools: Vec<ToolDeclaration>,
}

impl AssistantDefinition {
    /// File-name friendly identifier derived from the assistant name.
    pub fn slug(&self) -> String {
        let slug: String = self
            .name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_lowercase()
                } else {
                    '_'
                }
            })
            .collect();
        let slug = slug.trim_matches('_').to_string();
        if slug.is_empty() {
            "assistant".to_string()
        } else {
            slug
        }
    }
}

/// A remote assistant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistantRef {
    pub id: String,
    pub name: String,
}

/// A remote conversation thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadRef {
    pub id: String,
}

/// Lifecycle status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Cancelled,
    Failed,
    Completed,
    Incomplete,
    Expired,
    /// A status this client does not know about yet.
    #[serde(other)]
    Unknown,
}

impl RunStatus {
    /// Whether the run can no longer make progress.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed
                | RunStatus::Failed
                | RunStatus::Cancelled
                | RunStatus::Incomplete
                | RunStatus::Expired
        )
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunStatus::Queued => "queued",
            RunStatus::InProgress => "in_progress",
            RunStatus::RequiresAction => "requires_action",
            RunStatus::Cancelling => "cancelling",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Failed => "failed",
            RunStatus::Completed => "completed",
            RunStatus::Incomplete => "incomplete",
            RunStatus::Expired => "expired",
            RunStatus::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

/// A tool call the model is waiting on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingToolCall {
    /// Correlates the output back to this request.
    pub id: String,
    pub name: String,
    /// JSON-encoded arguments, exactly as the model produced them.
    pub arguments: String,
}

impl PendingToolCall {
    pub fn new(id: &str, name: &str, arguments: serde_json::Value) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            arguments: arguments.to_string(),
        }
    }
}

/// Snapshot of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    pub thread_id: String,
    pub status: RunStatus,
    /// Pending tool calls; empty unless the status is `requires_action`.
    pub pending: Vec<PendingToolCall>,
    pub last_error: Option<String>,
}

impl Run {
    /// Identity of the pending batch: the ordered call ids.
    pub fn action_key(&self) -> Option<Vec<String>> {
        if self.status != RunStatus::RequiresAction || self.pending.is_empty() {
            return None;
        }
        Some(self.pending.iter().map(|c| c.id.clone()).collect())
    }
}

/// Result of one tool call, as submitted back to the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub tool_call_id: String,
    /// JSON-encoded payload.
    pub output: String,
}

/// An inline annotation on message text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Annotation {
    /// A quote from an uploaded file.
    FileCitation {
        text: String,
        file_id: String,
        quote: Option<String>,
    },
    /// A file generated by the assistant.
    FilePath { text: String, file_id: String },
}

impl Annotation {
    /// The literal span in the message text this annotation replaces.
    pub fn span(&self) -> &str {
        match self {
            Annotation::FileCitation { text, .. } | Annotation::FilePath { text, .. } => text,
        }
    }
}

/// A block of message content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    Text {
        value: String,
        annotations: Vec<Annotation>,
    },
    ImageFile {
        file_id: String,
    },
    /// Content types this client does not render.
    Other,
}

/// A message in a thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadMessage {
    pub id: String,
    pub role: String,
    pub run_id: Option<String>,
    pub content: Vec<MessageContent>,
}

impl ThreadMessage {
    /// Plain assistant text message, mostly for tests and scripted replies.
    pub fn assistant_text(id: &str, text: &str) -> Self {
        Self {
            id: id.to_string(),
            role: "assistant".to_string(),
            run_id: None,
            content: vec![MessageContent::Text {
                value: text.to_string(),
                annotations: Vec::new(),
            }],
        }
    }
}

/// Metadata of a file stored by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    pub id: String,
    pub filename: String,
}

/// A one-shot chat completion (no thread, no tools).
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Operations of the hosted assistant service.
#[async_trait]
pub trait AssistantBackend: Send + Sync {
    /// Create a new remote assistant.
    async fn create_assistant(&self, definition: &AssistantDefinition) -> Result<AssistantRef>;

    /// Look up an existing assistant by id.
    async fn retrieve_assistant(&self, assistant_id: &str) -> Result<AssistantRef>;

    /// Create an empty thread.
    async fn create_thread(&self) -> Result<ThreadRef>;

    /// Append a user message to a thread.
    async fn add_user_message(&self, thread_id: &str, text: &str) -> Result<()>;

    /// Start a run of an assistant on a thread.
    async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<Run>;

    /// Fetch the current state of a run.
    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run>;

    /// Submit outputs for every pending tool call of a run.
    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<()>;

    /// Ask the service to stop a run.
    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<()>;

    /// List the messages of a thread, newest first.
    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>>;

    /// List the steps of a run, as raw JSON (diagnostics only).
    async fn list_run_steps(&self, thread_id: &str, run_id: &str) -> Result<serde_json::Value>;

    /// Fetch file metadata.
    async fn retrieve_file(&self, file_id: &str) -> Result<RemoteFile>;

    /// Download file content.
    async fn file_content(&self, file_id: &str) -> Result<Vec<u8>>;

    /// Run a one-shot completion and return the text.
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(RunStatus::Cancelled.is_terminal());
        assert!(RunStatus::Expired.is_terminal());
        assert!(!RunStatus::Queued.is_terminal());
        assert!(!RunStatus::InProgress.is_terminal());
        assert!(!RunStatus::RequiresAction.is_terminal());
        assert!(!RunStatus::Cancelling.is_terminal());
        assert!(!RunStatus::Unknown.is_terminal());
    }

    #[test]
    fn test_unknown_status_deserializes() {
        let status: RunStatus = serde_json::from_str("\"paused_for_review\"").unwrap();
        assert_eq!(status, RunStatus::Unknown);
        let status: RunStatus = serde_json::from_str("\"requires_action\"").unwrap();
        assert_eq!(status, RunStatus::RequiresAction);
    }

    #[test]
    fn test_definition_slug() {
        let def = AssistantDefinition {
            name: "Tool reuse gpt".to_string(),
            instructions: String::new(),
            model: "gpt-4".to_string(),
            tools: vec![],
        };
        assert_eq!(def.slug(), "tool_reuse_gpt");
    }

    #[test]
    fn test_action_key_only_for_pending_batches() {
        let mut run = Run {
            id: "run_1".to_string(),
            thread_id: "thread_1".to_string(),
            status: RunStatus::RequiresAction,
            pending: vec![
                PendingToolCall::new("a", "read_file", serde_json::json!({})),
                PendingToolCall::new("b", "read_file", serde_json::json!({})),
            ],
            last_error: None,
        };
        assert_eq!(
            run.action_key(),
            Some(vec!["a".to_string(), "b".to_string()])
        );

        run.status = RunStatus::InProgress;
        assert_eq!(run.action_key(), None);
    }
}
