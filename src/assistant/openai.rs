//! Assistant backend over the OpenAI Assistants API.
//!
//! Requests are built with `async-openai` types. Responses are re-read through
//! small local wire structs so only the fields this crate relies on matter.

use super::{
    Annotation, AssistantBackend, AssistantDefinition, AssistantRef, CompletionRequest,
    MessageContent, PendingToolCall, RemoteFile, Run, RunStatus, ThreadMessage, ThreadRef,
    ToolDeclaration, ToolOutput,
};
use crate::error::{MicroError, Result};
use crate::openai::create_client_with_timeout;
use async_openai::config::OpenAIConfig;
use async_openai::types::{
    AssistantTools, AssistantToolsFunction, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateAssistantRequestArgs, CreateChatCompletionRequestArgs, CreateMessageRequestArgs,
    CreateRunRequestArgs, CreateThreadRequestArgs, FunctionObject, MessageRole,
    SubmitToolOutputsRunRequest, ToolsOutputs,
};
use async_openai::Client;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

/// Number of messages fetched when rendering a reply.
const MESSAGE_PAGE_SIZE: &str = "20";

/// Backend talking to the hosted OpenAI service.
pub struct OpenAIBackend {
    client: Client<OpenAIConfig>,
}

impl OpenAIBackend {
    /// Create a backend with the given per-request timeout.
    pub fn new(request_timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: create_client_with_timeout(request_timeout)?,
        })
    }

    /// Wrap an already configured client.
    pub fn with_client(client: Client<OpenAIConfig>) -> Self {
        Self { client }
    }
}

fn api_error(context: &str, e: impl std::fmt::Display) -> MicroError {
    MicroError::OpenAI(format!("{}: {}", context, e))
}

/// Re-read a client library response through a local wire type.
fn reshape<S: Serialize, T: DeserializeOwned>(value: &S) -> Result<T> {
    let json = serde_json::to_value(value)?;
    Ok(serde_json::from_value(json)?)
}

fn to_assistant_tool(tool: &ToolDeclaration) -> AssistantTools {
    match tool {
        ToolDeclaration::CodeInterpreter => AssistantTools::CodeInterpreter,
        ToolDeclaration::Function {
            name,
            description,
            parameters,
        } => AssistantTools::Function(AssistantToolsFunction {
            function: FunctionObject {
                name: name.clone(),
                description: Some(description.clone()),
                parameters: Some(parameters.clone()),
                strict: None,
            },
        }),
    }
}

#[derive(Deserialize)]
struct WireAssistant {
    id: String,
    #[serde(default)]
    name: Option<String>,
}

impl From<WireAssistant> for AssistantRef {
    fn from(wire: WireAssistant) -> Self {
        AssistantRef {
            id: wire.id,
            name: wire.name.unwrap_or_default(),
        }
    }
}

#[derive(Deserialize)]
struct WireRun {
    id: String,
    thread_id: String,
    status: RunStatus,
    #[serde(default)]
    required_action: Option<WireRequiredAction>,
    #[serde(default)]
    last_error: Option<WireLastError>,
}

#[derive(Deserialize)]
struct WireRequiredAction {
    submit_tool_outputs: WireSubmitToolOutputs,
}

#[derive(Deserialize)]
struct WireSubmitToolOutputs {
    tool_calls: Vec<WireToolCall>,
}

#[derive(Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunction,
}

#[derive(Deserialize)]
struct WireFunction {
    name: String,
    arguments: String,
}

#[derive(Deserialize)]
struct WireLastError {
    #[serde(default)]
    code: Option<String>,
    message: String,
}

impl From<WireRun> for Run {
    fn from(wire: WireRun) -> Self {
        let pending = wire
            .required_action
            .map(|action| {
                action
                    .submit_tool_outputs
                    .tool_calls
                    .into_iter()
                    .map(|call| PendingToolCall {
                        id: call.id,
                        name: call.function.name,
                        arguments: call.function.arguments,
                    })
                    .collect()
            })
            .unwrap_or_default();

        let last_error = wire.last_error.map(|e| match e.code {
            Some(code) => format!("{}: {}", code, e.message),
            None => e.message,
        });

        Run {
            id: wire.id,
            thread_id: wire.thread_id,
            status: wire.status,
            pending,
            last_error,
        }
    }
}

#[derive(Deserialize)]
struct WireMessageList {
    data: Vec<WireMessage>,
}

#[derive(Deserialize)]
struct WireMessage {
    id: String,
    role: String,
    #[serde(default)]
    run_id: Option<String>,
    #[serde(default)]
    content: Vec<WireContent>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireContent {
    Text { text: WireText },
    ImageFile { image_file: WireFileRef },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct WireText {
    value: String,
    #[serde(default)]
    annotations: Vec<WireAnnotation>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireAnnotation {
    FileCitation {
        text: String,
        file_citation: WireCitation,
    },
    FilePath {
        text: String,
        file_path: WireFileRef,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct WireCitation {
    file_id: String,
    #[serde(default)]
    quote: Option<String>,
}

#[derive(Deserialize)]
struct WireFileRef {
    file_id: String,
}

impl From<WireMessage> for ThreadMessage {
    fn from(wire: WireMessage) -> Self {
        let content = wire
            .content
            .into_iter()
            .map(|block| match block {
                WireContent::Text { text } => MessageContent::Text {
                    value: text.value,
                    annotations: text
                        .annotations
                        .into_iter()
                        .filter_map(|a| match a {
                            WireAnnotation::FileCitation {
                                text,
                                file_citation,
                            } => Some(Annotation::FileCitation {
                                text,
                                file_id: file_citation.file_id,
                                quote: file_citation.quote,
                            }),
                            WireAnnotation::FilePath { text, file_path } => {
                                Some(Annotation::FilePath {
                                    text,
                                    file_id: file_path.file_id,
                                })
                            }
                            WireAnnotation::Other => None,
                        })
                        .collect(),
                },
                WireContent::ImageFile { image_file } => MessageContent::ImageFile {
                    file_id: image_file.file_id,
                },
                WireContent::Other => MessageContent::Other,
            })
            .collect();

        ThreadMessage {
            id: wire.id,
            role: wire.role,
            run_id: wire.run_id,
            content,
        }
    }
}

#[derive(Deserialize)]
struct WireFile {
    id: String,
    filename: String,
}

#[async_trait]
impl AssistantBackend for OpenAIBackend {
    #[instrument(skip(self, definition), fields(name = %definition.name))]
    async fn create_assistant(&self, definition: &AssistantDefinition) -> Result<AssistantRef> {
        let tools: Vec<AssistantTools> = definition.tools.iter().map(to_assistant_tool).collect();

        let request = CreateAssistantRequestArgs::default()
            .name(definition.name.clone())
            .instructions(definition.instructions.clone())
            .model(definition.model.clone())
            .tools(tools)
            .build()
            .map_err(|e| api_error("Failed to build assistant request", e))?;

        let assistant = self
            .client
            .assistants()
            .create(request)
            .await
            .map_err(|e| api_error("Failed to create assistant", e))?;

        let wire: WireAssistant = reshape(&assistant)?;
        debug!("Created assistant {}", wire.id);
        Ok(wire.into())
    }

    #[instrument(skip(self))]
    async fn retrieve_assistant(&self, assistant_id: &str) -> Result<AssistantRef> {
        let assistant = self
            .client
            .assistants()
            .retrieve(assistant_id)
            .await
            .map_err(|e| api_error("Failed to retrieve assistant", e))?;

        let wire: WireAssistant = reshape(&assistant)?;
        Ok(wire.into())
    }

    #[instrument(skip(self))]
    async fn create_thread(&self) -> Result<ThreadRef> {
        let request = CreateThreadRequestArgs::default()
            .build()
            .map_err(|e| api_error("Failed to build thread request", e))?;

        let thread = self
            .client
            .threads()
            .create(request)
            .await
            .map_err(|e| api_error("Failed to create thread", e))?;

        Ok(ThreadRef { id: thread.id })
    }

    #[instrument(skip(self, text), fields(len = text.len()))]
    async fn add_user_message(&self, thread_id: &str, text: &str) -> Result<()> {
        let request = CreateMessageRequestArgs::default()
            .role(MessageRole::User)
            .content(text.to_string())
            .build()
            .map_err(|e| api_error("Failed to build message request", e))?;

        self.client
            .threads()
            .messages(thread_id)
            .create(request)
            .await
            .map_err(|e| api_error("Failed to add message", e))?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<Run> {
        let request = CreateRunRequestArgs::default()
            .assistant_id(assistant_id)
            .build()
            .map_err(|e| api_error("Failed to build run request", e))?;

        let run = self
            .client
            .threads()
            .runs(thread_id)
            .create(request)
            .await
            .map_err(|e| api_error("Failed to create run", e))?;

        let wire: WireRun = reshape(&run)?;
        Ok(wire.into())
    }

    #[instrument(skip(self))]
    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run> {
        let run = self
            .client
            .threads()
            .runs(thread_id)
            .retrieve(run_id)
            .await
            .map_err(|e| api_error("Failed to retrieve run", e))?;

        let wire: WireRun = reshape(&run)?;
        Ok(wire.into())
    }

    #[instrument(skip(self, outputs), fields(count = outputs.len()))]
    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<()> {
        let request = SubmitToolOutputsRunRequest {
            tool_outputs: outputs
                .iter()
                .map(|o| ToolsOutputs {
                    tool_call_id: Some(o.tool_call_id.clone()),
                    output: Some(o.output.clone()),
                })
                .collect(),
            stream: None,
        };

        self.client
            .threads()
            .runs(thread_id)
            .submit_tool_outputs(run_id, request)
            .await
            .map_err(|e| api_error("Failed to submit tool outputs", e))?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<()> {
        self.client
            .threads()
            .runs(thread_id)
            .cancel(run_id)
            .await
            .map_err(|e| api_error("Failed to cancel run", e))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>> {
        let response = self
            .client
            .threads()
            .messages(thread_id)
            .list(&[("limit", MESSAGE_PAGE_SIZE), ("order", "desc")])
            .await
            .map_err(|e| api_error("Failed to list messages", e))?;

        let wire: WireMessageList = reshape(&response)?;
        Ok(wire.data.into_iter().map(ThreadMessage::from).collect())
    }

    #[instrument(skip(self))]
    async fn list_run_steps(&self, thread_id: &str, run_id: &str) -> Result<serde_json::Value> {
        let response = self
            .client
            .threads()
            .runs(thread_id)
            .steps(run_id)
            .list(&[("limit", MESSAGE_PAGE_SIZE)])
            .await
            .map_err(|e| api_error("Failed to list run steps", e))?;

        Ok(serde_json::to_value(&response)?)
    }

    #[instrument(skip(self))]
    async fn retrieve_file(&self, file_id: &str) -> Result<RemoteFile> {
        let file = self
            .client
            .files()
            .retrieve(file_id)
            .await
            .map_err(|e| api_error("Failed to retrieve file", e))?;

        let wire: WireFile = reshape(&file)?;
        Ok(RemoteFile {
            id: wire.id,
            filename: wire.filename,
        })
    }

    #[instrument(skip(self))]
    async fn file_content(&self, file_id: &str) -> Result<Vec<u8>> {
        let bytes = self
            .client
            .files()
            .content(file_id)
            .await
            .map_err(|e| api_error("Failed to download file", e))?;

        Ok(bytes.to_vec())
    }

    #[instrument(skip(self, request), fields(model = %request.model))]
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(request.system.clone())
                .build()
                .map_err(|e| api_error("Failed to build system message", e))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(request.user.clone())
                .build()
                .map_err(|e| api_error("Failed to build user message", e))?
                .into(),
        ];

        #[allow(deprecated)]
        let chat_request = CreateChatCompletionRequestArgs::default()
            .model(&request.model)
            .messages(messages)
            .temperature(request.temperature)
            .max_tokens(request.max_tokens)
            .build()
            .map_err(|e| api_error("Failed to build completion request", e))?;

        let response = self
            .client
            .chat()
            .create(chat_request)
            .await
            .map_err(|e| api_error("Completion failed", e))?;

        response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| MicroError::OpenAI("Empty completion response".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_with_required_action() {
        let wire: WireRun = serde_json::from_value(serde_json::json!({
            "id": "run_1",
            "thread_id": "thread_1",
            "status": "requires_action",
            "required_action": {
                "type": "submit_tool_outputs",
                "submit_tool_outputs": {
                    "tool_calls": [{
                        "id": "call_a",
                        "type": "function",
                        "function": {"name": "read_file", "arguments": "{\"file_path\":\"./a.csv\"}"}
                    }]
                }
            },
            "last_error": null
        }))
        .unwrap();

        let run = Run::from(wire);
        assert_eq!(run.status, RunStatus::RequiresAction);
        assert_eq!(run.pending.len(), 1);
        assert_eq!(run.pending[0].id, "call_a");
        assert_eq!(run.pending[0].name, "read_file");
    }

    #[test]
    fn test_failed_run_keeps_error() {
        let wire: WireRun = serde_json::from_value(serde_json::json!({
            "id": "run_1",
            "thread_id": "thread_1",
            "status": "failed",
            "last_error": {"code": "server_error", "message": "boom"}
        }))
        .unwrap();

        let run = Run::from(wire);
        assert!(run.pending.is_empty());
        assert_eq!(run.last_error.as_deref(), Some("server_error: boom"));
    }

    #[test]
    fn test_message_with_annotations_and_images() {
        let wire: WireMessage = serde_json::from_value(serde_json::json!({
            "id": "msg_1",
            "role": "assistant",
            "run_id": "run_1",
            "content": [
                {"type": "image_file", "image_file": {"file_id": "file_img"}},
                {"type": "text", "text": {
                    "value": "See sandbox:/mnt/data/out.csv",
                    "annotations": [{
                        "type": "file_path",
                        "text": "sandbox:/mnt/data/out.csv",
                        "file_path": {"file_id": "file_csv"},
                        "start_index": 4,
                        "end_index": 29
                    }]
                }},
                {"type": "refusal", "refusal": "no"}
            ]
        }))
        .unwrap();

        let message = ThreadMessage::from(wire);
        assert_eq!(message.content.len(), 3);
        assert_eq!(
            message.content[0],
            MessageContent::ImageFile {
                file_id: "file_img".to_string()
            }
        );
        match &message.content[1] {
            MessageContent::Text { annotations, .. } => {
                assert_eq!(annotations[0].span(), "sandbox:/mnt/data/out.csv");
            }
            other => panic!("Expected text block, got {:?}", other),
        }
        assert_eq!(message.content[2], MessageContent::Other);
    }

    #[test]
    fn test_function_declaration_maps_to_assistant_tool() {
        let tool = ToolDeclaration::Function {
            name: "read_file".to_string(),
            description: "Reads a file".to_string(),
            parameters: serde_json::json!({"type": "object"}),
        };
        match to_assistant_tool(&tool) {
            AssistantTools::Function(f) => assert_eq!(f.function.name, "read_file"),
            _ => panic!("Expected function tool"),
        }
    }
}
