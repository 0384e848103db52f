//! Turning a finished run into the reply shown to the user.
//!
//! The newest message's text has its annotation spans replaced by numbered
//! markers with footnotes. Files produced by the run (images, CSV tables) are
//! downloaded into the artifact directory.

mod artifacts;

pub use artifacts::{ArtifactKind, ArtifactStore};

use crate::assistant::{
    Annotation, AssistantBackend, DebugDumps, MessageContent, Run, RunStatus, ThreadMessage,
};
use crate::error::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

/// What the user gets back from a run.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedReply {
    pub run_id: String,
    pub status: RunStatus,
    /// Text of the newest message, markers and footnotes included.
    pub text: String,
    /// Files saved locally.
    pub artifacts: Vec<PathBuf>,
}

/// Renders finished runs.
pub struct Renderer {
    backend: Arc<dyn AssistantBackend>,
    artifacts: Arc<ArtifactStore>,
    dumps: DebugDumps,
}

impl Renderer {
    pub fn new(
        backend: Arc<dyn AssistantBackend>,
        artifacts: Arc<ArtifactStore>,
        dumps: DebugDumps,
    ) -> Self {
        Self {
            backend,
            artifacts,
            dumps,
        }
    }

    /// Build the reply of a finished run.
    pub async fn render(&self, run: &Run) -> Result<RenderedReply> {
        let messages = self.backend.list_messages(&run.thread_id).await?;
        self.dumps.write("messages.json", &messages);

        match self.backend.list_run_steps(&run.thread_id, &run.id).await {
            Ok(steps) => self.dumps.write("run_steps.json", &steps),
            Err(e) => warn!("Could not list steps of run {}: {}", run.id, e),
        }

        let mut artifacts = Vec::new();
        for message in messages
            .iter()
            .filter(|m| m.run_id.as_deref() == Some(run.id.as_str()))
        {
            artifacts.extend(self.download_files(&run.id, message).await);
        }

        let text = match messages.first() {
            Some(newest) => self.resolve_text(newest).await,
            None => String::new(),
        };

        Ok(RenderedReply {
            run_id: run.id.clone(),
            status: run.status,
            text,
            artifacts,
        })
    }

    /// Text blocks of a message with annotation spans replaced by ` [i]`.
    async fn resolve_text(&self, message: &ThreadMessage) -> String {
        let mut blocks = Vec::new();
        let mut footnotes = Vec::new();

        for content in &message.content {
            let MessageContent::Text { value, annotations } = content else {
                continue;
            };

            let mut text = value.clone();
            for annotation in annotations {
                let index = footnotes.len();
                text = text.replacen(annotation.span(), &format!(" [{}]", index), 1);

                let footnote = match annotation {
                    Annotation::FileCitation { file_id, quote, .. } => {
                        let filename = self.filename(file_id).await;
                        format!(
                            "[{}] {} from {}",
                            index,
                            quote.as_deref().unwrap_or_default(),
                            filename
                        )
                    }
                    Annotation::FilePath { file_id, .. } => {
                        let filename = self.filename(file_id).await;
                        format!("[{}] Click <here> to download {}", index, filename)
                    }
                };
                footnotes.push(footnote);
            }
            blocks.push(text);
        }

        let mut text = blocks.join("\n\n");
        if !footnotes.is_empty() {
            text.push_str("\n\n");
            text.push_str(&footnotes.join("\n"));
        }
        text
    }

    async fn filename(&self, file_id: &str) -> String {
        match self.backend.retrieve_file(file_id).await {
            Ok(file) => file.filename,
            Err(e) => {
                warn!("Could not look up file {}: {}", file_id, e);
                file_id.to_string()
            }
        }
    }

    /// Download every image block and generated file of a message.
    ///
    /// Failures are logged; a missing artifact never fails the reply.
    async fn download_files(&self, run_id: &str, message: &ThreadMessage) -> Vec<PathBuf> {
        let mut saved = Vec::new();

        for content in &message.content {
            let result = match content {
                MessageContent::ImageFile { file_id } => self
                    .backend
                    .file_content(file_id)
                    .await
                    .and_then(|bytes| self.artifacts.save_as(run_id, ArtifactKind::Image, &bytes))
                    .map(|path| vec![path]),
                MessageContent::Text { annotations, .. } => {
                    let mut paths = Vec::new();
                    for annotation in annotations {
                        let Annotation::FilePath { file_id, .. } = annotation else {
                            continue;
                        };
                        match self.download_path_annotation(run_id, file_id).await {
                            Ok(Some(path)) => paths.push(path),
                            Ok(None) => {}
                            Err(e) => warn!("Could not download file {}: {}", file_id, e),
                        }
                    }
                    Ok(paths)
                }
                MessageContent::Other => Ok(Vec::new()),
            };

            match result {
                Ok(paths) => saved.extend(paths),
                Err(e) => warn!("Could not save artifact of message {}: {}", message.id, e),
            }
        }

        debug!("Saved {} artifacts for run {}", saved.len(), run_id);
        saved
    }

    async fn download_path_annotation(&self, run_id: &str, file_id: &str) -> Result<Option<PathBuf>> {
        let file = self.backend.retrieve_file(file_id).await?;
        let content = self.backend.file_content(file_id).await?;
        // generated files are named like "/mnt/data/results.csv"
        let name = file.filename.rsplit('/').next().unwrap_or(&file.filename);
        self.artifacts.save(run_id, name, &content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::{AssistantDefinition, MemoryBackend, RunScript, ScriptStep};

    async fn finished_run(backend: &MemoryBackend, message: ThreadMessage) -> Run {
        let assistant = backend
            .create_assistant(&AssistantDefinition {
                name: "Micro gpt".to_string(),
                instructions: String::new(),
                model: "gpt-test".to_string(),
                tools: vec![],
            })
            .await
            .unwrap();
        let thread = backend.create_thread().await.unwrap();
        backend.push_run(
            RunScript::new(vec![ScriptStep::Status(RunStatus::Completed)]).with_message(message),
        );
        let run = backend.create_run(&thread.id, &assistant.id).await.unwrap();
        backend.retrieve_run(&thread.id, &run.id).await.unwrap()
    }

    #[tokio::test]
    async fn test_citations_become_footnotes() {
        let backend = Arc::new(MemoryBackend::new());
        backend.add_file("file-1", "paper.pdf", b"");
        backend.add_file("file-2", "/mnt/data/results.csv", b"Microstructure,Tau\nx.tif,1.5\n");

        let message = ThreadMessage {
            id: String::new(),
            role: "assistant".to_string(),
            run_id: None,
            content: vec![MessageContent::Text {
                value: "Tau is 1.5【4:0†source】. Download sandbox:/mnt/data/results.csv".to_string(),
                annotations: vec![
                    Annotation::FileCitation {
                        text: "【4:0†source】".to_string(),
                        file_id: "file-1".to_string(),
                        quote: Some("tortuosity".to_string()),
                    },
                    Annotation::FilePath {
                        text: "sandbox:/mnt/data/results.csv".to_string(),
                        file_id: "file-2".to_string(),
                    },
                ],
            }],
        };
        let run = finished_run(&backend, message).await;

        let dir = tempfile::tempdir().unwrap();
        let renderer = Renderer::new(
            backend.clone(),
            Arc::new(ArtifactStore::new(dir.path().join("out"))),
            DebugDumps::new(dir.path().join("debug")),
        );
        let reply = renderer.render(&run).await.unwrap();

        assert_eq!(
            reply.text,
            "Tau is 1.5 [0]. Download  [1]\n\n\
             [0] tortuosity from paper.pdf\n\
             [1] Click <here> to download /mnt/data/results.csv"
        );
        assert_eq!(
            reply.artifacts,
            vec![dir.path().join(format!("out/{}-data-1.csv", run.id))]
        );
        assert!(dir.path().join("debug/messages.json").exists());
        assert!(dir.path().join("debug/run_steps.json").exists());
    }

    #[tokio::test]
    async fn test_image_blocks_are_saved() {
        let backend = Arc::new(MemoryBackend::new());
        backend.add_file("file-img", "file-img", b"\x89PNG\r\n\x1a\nimage");

        let message = ThreadMessage {
            id: String::new(),
            role: "assistant".to_string(),
            run_id: None,
            content: vec![
                MessageContent::ImageFile {
                    file_id: "file-img".to_string(),
                },
                MessageContent::Text {
                    value: "Here is the plot.".to_string(),
                    annotations: vec![],
                },
            ],
        };
        let run = finished_run(&backend, message).await;

        let dir = tempfile::tempdir().unwrap();
        let renderer = Renderer::new(
            backend.clone(),
            Arc::new(ArtifactStore::new(dir.path())),
            DebugDumps::disabled(),
        );
        let reply = renderer.render(&run).await.unwrap();

        assert_eq!(reply.text, "Here is the plot.");
        assert_eq!(reply.status, RunStatus::Completed);
        let expected = dir.path().join(format!("{}-image-1.png", run.id));
        assert_eq!(reply.artifacts, vec![expected.clone()]);
        assert_eq!(std::fs::read(expected).unwrap(), b"\x89PNG\r\n\x1a\nimage");
    }

    #[tokio::test]
    async fn test_messages_of_other_runs_are_not_downloaded() {
        let backend = Arc::new(MemoryBackend::new());
        backend.add_file("file-img", "plot.png", b"\x89PNG\r\n\x1a\n");

        let mut message = ThreadMessage::assistant_text("", "old");
        message.content.push(MessageContent::ImageFile {
            file_id: "file-img".to_string(),
        });
        let first = finished_run(&backend, message).await;

        let dir = tempfile::tempdir().unwrap();
        let renderer = Renderer::new(
            backend.clone(),
            Arc::new(ArtifactStore::new(dir.path())),
            DebugDumps::disabled(),
        );

        let mut other = first.clone();
        other.id = "run_other".to_string();
        let reply = renderer.render(&other).await.unwrap();
        assert!(reply.artifacts.is_empty());
        assert_eq!(reply.text, "old");
    }
}
