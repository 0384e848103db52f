//! Ask command implementation.

use crate::cli::preflight::{self, Operation};
use crate::cli::{Conversation, Output};
use crate::config::Settings;
use anyhow::Result;

/// Run the ask command.
pub async fn run_ask(message: &str, settings: Settings) -> Result<()> {
    // Pre-flight checks
    if let Err(e) = preflight::check(Operation::Converse, &settings) {
        Output::error(&format!("{}", e));
        Output::info("Run 'microgpt doctor' for detailed diagnostics.");
        return Err(e.into());
    }

    let session = Conversation::connect(settings)?;

    let spinner = Output::spinner("Preparing assistant...");
    let conversation = Conversation::start(session).await;
    spinner.finish_and_clear();
    let conversation = conversation?.listen_for_ctrl_c();

    match conversation.send(message).await {
        Ok(reply) => {
            Output::reply(&reply);
            Ok(())
        }
        Err(e) => {
            Output::error(&format!("Failed to get a reply: {}", e));
            Err(e.into())
        }
    }
}
