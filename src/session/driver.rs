//! Conversation run driver: assistants, threads, runs and the poll loop.

use super::{Backoff, Dispatcher, Session};
use crate::assistant::{AssistantDefinition, AssistantRef, Run, RunStatus, ThreadRef};
use crate::error::{MicroError, Result};
use crate::render::RenderedReply;
use std::collections::HashSet;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Drives runs of one assistant conversation to completion.
pub struct RunDriver {
    session: Session,
    depth: usize,
    dispatcher: Dispatcher,
}

impl RunDriver {
    /// Driver for the top-level conversation.
    pub fn new(session: Session) -> Self {
        Self::nested(session, 0)
    }

    /// Driver for a workflow sub-conversation at nesting `depth`.
    pub fn nested(session: Session, depth: usize) -> Self {
        let dispatcher = Dispatcher::new(session.clone(), depth);
        Self {
            session,
            depth,
            dispatcher,
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Remote assistant for `definition`, reusing the cached one when the
    /// reuse policy allows it.
    #[instrument(skip(self, definition), fields(assistant = %definition.name))]
    pub async fn create_assistant(&self, definition: &AssistantDefinition) -> Result<AssistantRef> {
        let cache = self.session.cache();
        let policy = self.session.settings().assistant.reuse_policy;
        let backend = self.session.backend();

        let cached = match cache.load(definition) {
            Ok(cached) => cached,
            Err(e) => {
                warn!("Ignoring unreadable assistant cache: {}", e);
                None
            }
        };

        if let Some(cached) = cached {
            if cached.is_reusable(definition, policy) {
                match backend.retrieve_assistant(&cached.id).await {
                    Ok(assistant) => {
                        info!("Reusing assistant {}", assistant.id);
                        return Ok(assistant);
                    }
                    Err(e) => warn!("Cached assistant {} is unavailable: {}", cached.id, e),
                }
            } else {
                info!("Definition changed since assistant {} was created", cached.id);
            }
        }

        let assistant = backend.create_assistant(definition).await?;
        info!("Created assistant {}", assistant.id);
        if let Err(e) = cache.store(definition, &assistant.id) {
            warn!("Could not cache assistant id {}: {}", assistant.id, e);
        }
        Ok(assistant)
    }

    /// A new, empty thread.
    pub async fn create_thread(&self) -> Result<ThreadRef> {
        let thread = self.session.backend().create_thread().await?;
        debug!("Created thread {}", thread.id);
        Ok(thread)
    }

    /// Post one user message and start a run on it.
    pub async fn send_message_and_run(
        &self,
        thread: &ThreadRef,
        assistant: &AssistantRef,
        text: &str,
    ) -> Result<Run> {
        let backend = self.session.backend();
        backend.add_user_message(&thread.id, text).await?;
        let run = backend.create_run(&thread.id, &assistant.id).await?;
        debug!("Started run {} on thread {}", run.id, thread.id);
        Ok(run)
    }

    /// Wait for a run to reach a terminal status, answering tool calls on the way.
    ///
    /// Every distinct pending batch is dispatched once. Fails with `Timeout`
    /// after `poll.timeout_secs` and with `Cancelled` when the session is
    /// cancelled; the run is asked to stop in both cases.
    #[instrument(skip(self, run), fields(run_id = %run.id, depth = self.depth))]
    pub async fn poll_run(&self, run: Run) -> Result<Run> {
        let poll = &self.session.settings().poll;
        let cancel = self.session.cancellation();
        let started = Instant::now();
        let deadline = started + poll.timeout();
        let mut backoff = Backoff::from_settings(poll);
        let mut handled: HashSet<Vec<String>> = HashSet::new();
        let mut run = run;

        loop {
            if cancel.is_cancelled() {
                self.abandon(&run).await;
                return Err(MicroError::Cancelled(run.id));
            }

            run = self
                .session
                .backend()
                .retrieve_run(&run.thread_id, &run.id)
                .await?;
            debug!("Run status: {}", run.status);

            if run.status.is_terminal() {
                match &run.last_error {
                    Some(error) => warn!("Run finished as {}: {}", run.status, error),
                    None => info!("Run finished as {}", run.status),
                }
                return Ok(run);
            }

            if let Some(key) = run.action_key() {
                if handled.insert(key) {
                    let dispatched = tokio::select! {
                        biased;
                        result = self.dispatcher.handle(&run) => result,
                        _ = cancel.cancelled() => Err(MicroError::Cancelled(run.id.clone())),
                        _ = tokio::time::sleep_until(deadline.into()) => Err(MicroError::Timeout {
                            run_id: run.id.clone(),
                            elapsed: started.elapsed(),
                        }),
                    };
                    if let Err(e) = dispatched {
                        self.abandon(&run).await;
                        return Err(e);
                    }
                    backoff.reset();
                    continue;
                }
            }

            let now = Instant::now();
            if now >= deadline {
                self.abandon(&run).await;
                return Err(MicroError::Timeout {
                    run_id: run.id,
                    elapsed: started.elapsed(),
                });
            }

            let delay = backoff.next_delay().min(deadline - now);
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.abandon(&run).await;
                    return Err(MicroError::Cancelled(run.id));
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Best-effort remote cancellation of a run we stop waiting for.
    async fn abandon(&self, run: &Run) {
        if run.status.is_terminal() || run.status == RunStatus::Cancelling {
            return;
        }
        match self
            .session
            .backend()
            .cancel_run(&run.thread_id, &run.id)
            .await
        {
            Ok(()) => info!("Requested cancellation of run {}", run.id),
            Err(e) => warn!("Could not cancel run {}: {}", run.id, e),
        }
    }

    /// Send, poll until done and render the reply.
    ///
    /// A run ending in any status other than `completed` is an error.
    pub async fn execute_step(
        &self,
        thread: &ThreadRef,
        assistant: &AssistantRef,
        text: &str,
    ) -> Result<RenderedReply> {
        let run = self.send_message_and_run(thread, assistant, text).await?;
        let run = self.poll_run(run).await?;

        if run.status != RunStatus::Completed {
            let reason = run
                .last_error
                .as_deref()
                .map(|e| format!(": {}", e))
                .unwrap_or_default();
            return Err(MicroError::Agent(format!(
                "Run {} ended as {}{}",
                run.id, run.status, reason
            )));
        }

        self.session.renderer().render(&run).await
    }
}
