//! The main assistant conversation shared by the chat, ask and analyze commands.

use crate::assistant::{AssistantRef, OpenAIBackend, ThreadRef};
use crate::config::{Prompts, Settings};
use crate::error::Result;
use crate::openai::create_http_client;
use crate::render::RenderedReply;
use crate::session::{RunDriver, Session};
use crate::tools::{ConsolePrompter, Persona, ToolContext};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Exit status after an interrupt at the prompt.
const INTERRUPTED_EXIT_CODE: i32 = 130;

/// The token of the turn in flight, if any.
#[derive(Clone, Default)]
struct TurnSlot(Arc<Mutex<Option<CancellationToken>>>);

impl TurnSlot {
    fn set(&self, token: Option<CancellationToken>) {
        *self.0.lock().unwrap_or_else(|e| e.into_inner()) = token;
    }

    fn take(&self) -> Option<CancellationToken> {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).take()
    }
}

/// The main persona's assistant and thread.
pub struct Conversation {
    session: Session,
    assistant: AssistantRef,
    thread: ThreadRef,
    turn: TurnSlot,
}

impl Conversation {
    /// Session talking to the hosted service, asking questions on the console.
    pub fn connect(settings: Settings) -> Result<Session> {
        let prompts = Prompts::load(
            settings.prompts.custom_dir.as_deref(),
            Some(&settings.prompts.variables),
        )?;
        let timeout = settings.poll.request_timeout();
        let backend = Arc::new(OpenAIBackend::new(timeout)?);
        let tools = ToolContext::new(
            settings.tools.clone(),
            create_http_client(timeout)?,
            Arc::new(ConsolePrompter),
        );

        let session = Session::new(backend, tools, prompts, settings);
        debug!("Session {} started", session.id());
        Ok(session)
    }

    /// Create or reuse the main assistant and open a fresh thread.
    pub async fn start(session: Session) -> Result<Self> {
        let driver = session.driver();
        let assistant = driver
            .create_assistant(&session.definition(Persona::Main))
            .await?;
        let thread = driver.create_thread().await?;
        Ok(Self {
            session,
            assistant,
            thread,
            turn: TurnSlot::default(),
        })
    }

    /// Route Ctrl-C through one process-wide listener.
    ///
    /// During a turn it cancels that turn; at the prompt it cancels the
    /// session and ends the process.
    pub fn listen_for_ctrl_c(self) -> Self {
        let turn = self.turn.clone();
        let session = self.session.cancellation().clone();
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                match turn.take() {
                    Some(token) => {
                        info!("Cancelling the current reply");
                        token.cancel();
                    }
                    None => {
                        session.cancel();
                        std::process::exit(INTERRUPTED_EXIT_CODE);
                    }
                }
            }
        });
        self
    }

    /// Cancel the turn in flight. Returns false when none is running.
    pub fn interrupt(&self) -> bool {
        match self.turn.take() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Send one message and wait for the reply.
    ///
    /// An interrupt cancels this turn only; the conversation stays usable.
    pub async fn send(&self, text: &str) -> Result<RenderedReply> {
        let token = self.session.cancellation().child_token();
        self.turn.set(Some(token.clone()));
        let driver = RunDriver::new(self.session.clone().with_cancellation(token));

        let result = driver
            .execute_step(&self.thread, &self.assistant, text)
            .await;
        self.turn.set(None);

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::{MemoryBackend, RunScript, RunStatus, ScriptStep};
    use crate::error::MicroError;
    use std::time::Duration;
    use crate::session::testing;
    use crate::tools::ScriptedPrompter;

    #[tokio::test]
    async fn test_turns_share_one_thread() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(MemoryBackend::new());
        let session = testing::session(
            backend.clone(),
            dir.path(),
            testing::settings(dir.path()),
            Arc::new(ScriptedPrompter::new(Vec::<String>::new())),
        );

        let conversation = Conversation::start(session).await.unwrap();
        for reply in ["first", "second"] {
            backend.push_run(
                RunScript::new(vec![ScriptStep::Status(RunStatus::Completed)]).with_reply(reply),
            );
        }

        assert_eq!(conversation.send("one").await.unwrap().text, "first");
        assert_eq!(conversation.send("two").await.unwrap().text, "second");

        let messages = backend.thread_messages(&conversation.thread.id);
        let roles: Vec<&str> = messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["user", "assistant", "user", "assistant"]);
    }

    #[tokio::test]
    async fn test_interrupt_cancels_only_the_current_turn() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(MemoryBackend::new());
        let mut settings = testing::settings(dir.path());
        settings.poll.interval_ms = 60_000;
        settings.poll.max_interval_ms = 60_000;
        let session = testing::session(
            backend.clone(),
            dir.path(),
            settings,
            Arc::new(ScriptedPrompter::new(Vec::<String>::new())),
        );
        let conversation = Conversation::start(session).await.unwrap();
        assert!(!conversation.interrupt());

        backend.push_run(RunScript::new(vec![ScriptStep::Status(RunStatus::InProgress)]));
        let (result, interrupted) = tokio::join!(conversation.send("slow"), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            conversation.interrupt()
        });
        assert!(interrupted);
        assert!(matches!(result, Err(MicroError::Cancelled(_))));
        assert!(!conversation.interrupt());
        assert!(!conversation.session().cancellation().is_cancelled());

        backend.push_run(
            RunScript::new(vec![ScriptStep::Status(RunStatus::Completed)]).with_reply("still here"),
        );
        assert_eq!(conversation.send("again").await.unwrap().text, "still here");
    }
}
