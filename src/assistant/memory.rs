//! In-memory assistant backend.
//!
//! Plays back scripted run lifecycles. Useful for testing the poll loop and
//! the dispatcher without a network.

use super::{
    AssistantBackend, AssistantDefinition, AssistantRef, CompletionRequest, PendingToolCall,
    RemoteFile, Run, RunStatus, ThreadMessage, ThreadRef, ToolOutput,
};
use crate::error::{MicroError, Result};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

/// One observation of a scripted run.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    /// The run reports this status.
    Status(RunStatus),
    /// The run requires outputs for these calls.
    Action(Vec<PendingToolCall>),
    /// Retrieving the run fails.
    Error(String),
}

/// Lifecycle played back for the next created run.
///
/// Each poll consumes one step; the last step repeats forever.
#[derive(Debug, Clone, Default)]
pub struct RunScript {
    pub steps: Vec<ScriptStep>,
    /// Appended to the thread when the run first reports `completed`.
    pub reply: Option<ThreadMessage>,
}

impl RunScript {
    pub fn new(steps: Vec<ScriptStep>) -> Self {
        Self { steps, reply: None }
    }

    pub fn with_reply(mut self, text: &str) -> Self {
        self.reply = Some(ThreadMessage::assistant_text("", text));
        self
    }

    pub fn with_message(mut self, message: ThreadMessage) -> Self {
        self.reply = Some(message);
        self
    }
}

/// A batch of outputs received by the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub thread_id: String,
    pub run_id: String,
    pub outputs: Vec<ToolOutput>,
}

struct ActiveRun {
    thread_id: String,
    steps: VecDeque<ScriptStep>,
    reply: Option<ThreadMessage>,
}

#[derive(Default)]
struct MemoryState {
    next_id: usize,
    assistants: HashMap<String, AssistantDefinition>,
    threads: HashMap<String, Vec<ThreadMessage>>,
    pending_scripts: VecDeque<RunScript>,
    runs: HashMap<String, ActiveRun>,
    submissions: Vec<Submission>,
    cancelled: Vec<String>,
    completions: VecDeque<String>,
    completion_requests: Vec<CompletionRequest>,
    files: HashMap<String, (RemoteFile, Vec<u8>)>,
    polls: usize,
}

impl MemoryState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}_{}", prefix, self.next_id)
    }
}

/// Scripted in-memory backend.
#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
}

impl MemoryBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue the lifecycle of the next run created on any thread.
    pub fn push_run(&self, script: RunScript) {
        self.state().pending_scripts.push_back(script);
    }

    /// Queue the text of the next one-shot completion.
    pub fn push_completion(&self, text: &str) {
        self.state().completions.push_back(text.to_string());
    }

    /// Store a downloadable file.
    pub fn add_file(&self, id: &str, filename: &str, content: &[u8]) {
        self.state().files.insert(
            id.to_string(),
            (
                RemoteFile {
                    id: id.to_string(),
                    filename: filename.to_string(),
                },
                content.to_vec(),
            ),
        );
    }

    /// Register an assistant as if it had been created earlier.
    pub fn add_assistant(&self, id: &str, definition: AssistantDefinition) {
        self.state().assistants.insert(id.to_string(), definition);
    }

    /// Every output batch received so far.
    pub fn submissions(&self) -> Vec<Submission> {
        self.state().submissions.clone()
    }

    /// Definitions of all assistants, keyed by id.
    pub fn assistants(&self) -> HashMap<String, AssistantDefinition> {
        self.state().assistants.clone()
    }

    /// Messages of a thread, oldest first.
    pub fn thread_messages(&self, thread_id: &str) -> Vec<ThreadMessage> {
        self.state()
            .threads
            .get(thread_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Runs that received a cancel request.
    pub fn cancelled_runs(&self) -> Vec<String> {
        self.state().cancelled.clone()
    }

    /// One-shot completion requests received so far.
    pub fn completion_requests(&self) -> Vec<CompletionRequest> {
        self.state().completion_requests.clone()
    }

    /// Number of `retrieve_run` calls so far.
    pub fn poll_count(&self) -> usize {
        self.state().polls
    }
}

#[async_trait]
impl AssistantBackend for MemoryBackend {
    async fn create_assistant(&self, definition: &AssistantDefinition) -> Result<AssistantRef> {
        let mut state = self.state();
        let id = state.next_id("asst");
        state.assistants.insert(id.clone(), definition.clone());
        Ok(AssistantRef {
            id,
            name: definition.name.clone(),
        })
    }

    async fn retrieve_assistant(&self, assistant_id: &str) -> Result<AssistantRef> {
        let state = self.state();
        let definition = state
            .assistants
            .get(assistant_id)
            .ok_or_else(|| MicroError::OpenAI(format!("No assistant found with id '{}'", assistant_id)))?;
        Ok(AssistantRef {
            id: assistant_id.to_string(),
            name: definition.name.clone(),
        })
    }

    async fn create_thread(&self) -> Result<ThreadRef> {
        let mut state = self.state();
        let id = state.next_id("thread");
        state.threads.insert(id.clone(), Vec::new());
        Ok(ThreadRef { id })
    }

    async fn add_user_message(&self, thread_id: &str, text: &str) -> Result<()> {
        let mut state = self.state();
        let id = state.next_id("msg");
        let messages = state
            .threads
            .get_mut(thread_id)
            .ok_or_else(|| MicroError::OpenAI(format!("No thread found with id '{}'", thread_id)))?;
        let mut message = ThreadMessage::assistant_text(&id, text);
        message.role = "user".to_string();
        messages.push(message);
        Ok(())
    }

    async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<Run> {
        let mut state = self.state();
        if !state.assistants.contains_key(assistant_id) {
            return Err(MicroError::OpenAI(format!(
                "No assistant found with id '{}'",
                assistant_id
            )));
        }
        if !state.threads.contains_key(thread_id) {
            return Err(MicroError::OpenAI(format!(
                "No thread found with id '{}'",
                thread_id
            )));
        }

        let script = state.pending_scripts.pop_front().unwrap_or_else(|| {
            RunScript::new(vec![ScriptStep::Status(RunStatus::Completed)])
        });
        let id = state.next_id("run");
        state.runs.insert(
            id.clone(),
            ActiveRun {
                thread_id: thread_id.to_string(),
                steps: script.steps.into(),
                reply: script.reply,
            },
        );

        Ok(Run {
            id,
            thread_id: thread_id.to_string(),
            status: RunStatus::Queued,
            pending: Vec::new(),
            last_error: None,
        })
    }

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run> {
        let mut state = self.state();
        state.polls += 1;
        let msg_id = state.next_id("msg");

        let run = state
            .runs
            .get_mut(run_id)
            .ok_or_else(|| MicroError::OpenAI(format!("No run found with id '{}'", run_id)))?;

        let step = if run.steps.len() > 1 {
            run.steps.pop_front()
        } else {
            run.steps.front().cloned()
        }
        .unwrap_or(ScriptStep::Status(RunStatus::Completed));

        let (status, pending) = match step {
            ScriptStep::Status(status) => (status, Vec::new()),
            ScriptStep::Action(calls) => (RunStatus::RequiresAction, calls),
            ScriptStep::Error(message) => return Err(MicroError::OpenAI(message)),
        };

        let reply = if status == RunStatus::Completed {
            run.reply.take()
        } else {
            None
        };
        let run_thread = run.thread_id.clone();

        if let Some(mut reply) = reply {
            if reply.id.is_empty() {
                reply.id = msg_id;
            }
            reply.run_id = Some(run_id.to_string());
            if let Some(messages) = state.threads.get_mut(&run_thread) {
                messages.push(reply);
            }
        }

        Ok(Run {
            id: run_id.to_string(),
            thread_id: thread_id.to_string(),
            status,
            pending,
            last_error: None,
        })
    }

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<()> {
        self.state().submissions.push(Submission {
            thread_id: thread_id.to_string(),
            run_id: run_id.to_string(),
            outputs: outputs.to_vec(),
        });
        Ok(())
    }

    async fn cancel_run(&self, _thread_id: &str, run_id: &str) -> Result<()> {
        self.state().cancelled.push(run_id.to_string());
        Ok(())
    }

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>> {
        let mut messages = self.thread_messages(thread_id);
        messages.reverse();
        Ok(messages)
    }

    async fn list_run_steps(&self, _thread_id: &str, run_id: &str) -> Result<serde_json::Value> {
        Ok(serde_json::json!({ "run_id": run_id, "data": [] }))
    }

    async fn retrieve_file(&self, file_id: &str) -> Result<RemoteFile> {
        self.state()
            .files
            .get(file_id)
            .map(|(file, _)| file.clone())
            .ok_or_else(|| MicroError::OpenAI(format!("No file found with id '{}'", file_id)))
    }

    async fn file_content(&self, file_id: &str) -> Result<Vec<u8>> {
        self.state()
            .files
            .get(file_id)
            .map(|(_, content)| content.clone())
            .ok_or_else(|| MicroError::OpenAI(format!("No file found with id '{}'", file_id)))
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let mut state = self.state();
        state.completion_requests.push(request.clone());
        state
            .completions
            .pop_front()
            .ok_or_else(|| MicroError::OpenAI("No scripted completion left".to_string()))
    }
}
