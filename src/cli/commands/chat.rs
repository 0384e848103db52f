//! Interactive chat command.

use super::analyze::analysis_prompt;
use crate::cli::preflight::{self, Operation};
use crate::cli::{Conversation, Output};
use crate::config::Settings;
use anyhow::Result;
use console::style;
use std::io::{self, BufRead, Write};

/// Typing this analyses every image in [`ANALYSIS_DIR`].
const ANALYSIS_COMMAND: &str = "ANALYSIS";
const ANALYSIS_DIR: &str = "./data";

/// What to do with one line of input.
#[derive(Debug, PartialEq)]
enum Input<'a> {
    Skip,
    Quit,
    Analysis,
    Message(&'a str),
}

fn classify(line: &str) -> Input<'_> {
    let line = line.trim();
    if line.is_empty() {
        Input::Skip
    } else if line.eq_ignore_ascii_case("quit") || line.eq_ignore_ascii_case("exit") {
        Input::Quit
    } else if line == ANALYSIS_COMMAND {
        Input::Analysis
    } else {
        Input::Message(line)
    }
}

/// Run the interactive chat command.
pub async fn run_chat(settings: Settings) -> Result<()> {
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

    println!("\n{}", style("Welcome to Micro GPT!").bold().cyan());
    println!(
        "{}",
        style(format!(
            "Give the relative path of 3D microstructure images for analysis. \
             Type '{}' to analyse the images in {}, 'quit' to exit. \
             Ctrl-C cancels the current reply.",
            ANALYSIS_COMMAND, ANALYSIS_DIR
        ))
        .dim()
    );
    println!(
        "{}\n",
        style("Example: Tell me about the tortuosity of ./data/microstructure066.tif").dim()
    );

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("{} ", style("You:").green().bold());
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }

        let message = match classify(&line) {
            Input::Skip => continue,
            Input::Quit => break,
            Input::Analysis => match analysis_prompt(conversation.session(), ANALYSIS_DIR).await {
                Ok(prompt) => prompt,
                Err(e) => {
                    Output::error(&format!("Error: {}", e));
                    continue;
                }
            },
            Input::Message(text) => text.to_string(),
        };

        match conversation.send(&message).await {
            Ok(reply) => Output::reply(&reply),
            Err(e) => Output::error(&format!("Error: {}", e)),
        }
    }

    Output::info("Thanks and happy to serve you.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_input() {
        assert_eq!(classify("  \n"), Input::Skip);
        assert_eq!(classify("QUIT\n"), Input::Quit);
        assert_eq!(classify("exit"), Input::Quit);
        assert_eq!(classify("ANALYSIS\n"), Input::Analysis);
        assert_eq!(classify("analysis"), Input::Message("analysis"));
        assert_eq!(
            classify(" what is tau? \n"),
            Input::Message("what is tau?")
        );
    }
}
