//! A conversation session: the run driver, the tool dispatcher and the
//! collaborators they share.
//!
//! One session per process. Nested workflow drivers share the session's
//! backend, cache, artifact counter, debug directory and cancellation token.

mod dispatcher;
mod driver;
mod poll;

pub use dispatcher::Dispatcher;
pub use driver::RunDriver;
pub use poll::Backoff;

use crate::assistant::{AssistantBackend, AssistantCache, AssistantDefinition, DebugDumps};
use crate::config::{Prompts, Settings};
use crate::render::{ArtifactStore, Renderer};
use crate::tools::{Persona, ToolContext};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Shared state of one conversation.
#[derive(Clone)]
pub struct Session {
    id: Uuid,
    backend: Arc<dyn AssistantBackend>,
    tools: Arc<ToolContext>,
    prompts: Arc<Prompts>,
    settings: Arc<Settings>,
    cache: AssistantCache,
    dumps: DebugDumps,
    artifacts: Arc<ArtifactStore>,
    cancel: CancellationToken,
}

impl Session {
    /// Create a session with directories taken from `settings`.
    pub fn new(
        backend: Arc<dyn AssistantBackend>,
        tools: ToolContext,
        prompts: Prompts,
        settings: Settings,
    ) -> Self {
        let id = Uuid::new_v4();
        let dumps = if settings.output.debug_dumps {
            DebugDumps::new(settings.debug_dir().join(id.to_string()))
        } else {
            DebugDumps::disabled()
        };

        Self {
            id,
            backend,
            tools: Arc::new(tools),
            prompts: Arc::new(prompts),
            cache: AssistantCache::new(settings.assistant_cache_dir()),
            artifacts: Arc::new(ArtifactStore::new(settings.artifact_dir())),
            settings: Arc::new(settings),
            dumps,
            cancel: CancellationToken::new(),
        }
    }

    /// Use `token` to cancel in-flight runs.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn backend(&self) -> &Arc<dyn AssistantBackend> {
        &self.backend
    }

    pub fn tools(&self) -> &ToolContext {
        &self.tools
    }

    pub fn prompts(&self) -> &Prompts {
        &self.prompts
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn cache(&self) -> &AssistantCache {
        &self.cache
    }

    pub fn dumps(&self) -> &DebugDumps {
        &self.dumps
    }

    pub fn artifacts(&self) -> &Arc<ArtifactStore> {
        &self.artifacts
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Definition of a persona under this session's configuration.
    pub fn definition(&self, persona: Persona) -> AssistantDefinition {
        persona.definition(&self.prompts, &self.settings.assistant)
    }

    /// Driver for the top-level conversation.
    pub fn driver(&self) -> RunDriver {
        RunDriver::new(self.clone())
    }

    pub fn renderer(&self) -> Renderer {
        Renderer::new(
            self.backend.clone(),
            self.artifacts.clone(),
            self.dumps.clone(),
        )
    }
}
