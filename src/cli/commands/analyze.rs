//! Analyze command: send every image of a directory to the assistant.

use crate::cli::preflight::{self, Operation};
use crate::cli::{Conversation, Output};
use crate::config::Settings;
use crate::session::Session;
use crate::tools::ToolCall;
use anyhow::{Context, Result};

/// Message asking the assistant to analyse the images found in `directory`.
pub(crate) async fn analysis_prompt(session: &Session, directory: &str) -> Result<String> {
    let payload = session
        .tools()
        .execute(&ToolCall::ExtractImagePaths {
            directory: directory.to_string(),
        })
        .await?;
    payload["Image_path"]
        .as_str()
        .map(str::to_string)
        .context("image path listing returned no sentence")
}

/// Run the analyze command.
pub async fn run_analyze(directory: &str, settings: Settings) -> Result<()> {
    if let Err(e) = preflight::check(Operation::Analyze, &settings) {
        Output::error(&format!("{}", e));
        Output::info("Run 'microgpt doctor' for detailed diagnostics.");
        return Err(e.into());
    }

    let session = Conversation::connect(settings)?;
    let prompt = analysis_prompt(&session, directory).await?;
    Output::info(&prompt);

    let spinner = Output::spinner("Preparing assistant...");
    let conversation = Conversation::start(session).await;
    spinner.finish_and_clear();
    let conversation = conversation?.listen_for_ctrl_c();

    let reply = conversation.send(&prompt).await?;
    Output::reply(&reply);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::MemoryBackend;
    use crate::session::testing;
    use crate::tools::ScriptedPrompter;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_analysis_prompt_lists_images() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("data")).unwrap();
        std::fs::write(dir.path().join("data/m1.tif"), b"").unwrap();
        std::fs::write(dir.path().join("data/notes.txt"), b"").unwrap();
        let session = testing::session(
            Arc::new(MemoryBackend::new()),
            dir.path(),
            testing::settings(dir.path()),
            Arc::new(ScriptedPrompter::new(Vec::<String>::new())),
        );

        let prompt = analysis_prompt(&session, "./data").await.unwrap();
        assert_eq!(
            prompt,
            "Please help me analyze these images. These are the images' path: './data/m1.tif'"
        );
    }
}
