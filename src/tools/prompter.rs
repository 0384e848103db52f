//! Interactive questions asked by tools (consent, field selection, examples).

use crate::error::{MicroError, Result};
use async_trait::async_trait;
use console::style;
use std::collections::VecDeque;
use std::io::{BufRead, Write};
use std::sync::Mutex;

/// Asks the person at the terminal.
#[async_trait]
pub trait Prompter: Send + Sync {
    /// Free-form question; returns the trimmed answer.
    async fn ask(&self, question: &str) -> Result<String>;

    /// Yes/no question.
    async fn confirm(&self, question: &str) -> Result<bool> {
        let answer = self.ask(&format!("{} (yes/no)", question)).await?;
        Ok(matches!(answer.to_lowercase().as_str(), "yes" | "y"))
    }
}

/// Prompter reading answers from stdin.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsolePrompter;

#[async_trait]
impl Prompter for ConsolePrompter {
    async fn ask(&self, question: &str) -> Result<String> {
        let question = question.to_string();
        tokio::task::spawn_blocking(move || {
            print!("{} {} ", style("?").yellow().bold(), question);
            std::io::stdout().flush()?;

            let mut line = String::new();
            let read = std::io::stdin().lock().read_line(&mut line)?;
            if read == 0 {
                return Err(MicroError::InvalidInput("stdin closed".to_string()));
            }
            Ok(line.trim().to_string())
        })
        .await
        .map_err(|e| MicroError::Agent(format!("Prompt task failed: {}", e)))?
    }
}

/// Prompter answering from a fixed list, recording every question.
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    answers: Mutex<VecDeque<String>>,
    questions: Mutex<Vec<String>>,
}

impl ScriptedPrompter {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: Mutex::new(answers.into_iter().map(Into::into).collect()),
            questions: Mutex::new(Vec::new()),
        }
    }

    /// Questions asked so far, in order.
    pub fn questions(&self) -> Vec<String> {
        self.questions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl Prompter for ScriptedPrompter {
    async fn ask(&self, question: &str) -> Result<String> {
        self.questions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(question.to_string());
        self.answers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .ok_or_else(|| MicroError::InvalidInput(format!("No answer scripted for: {}", question)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_answers_in_order() {
        let prompter = ScriptedPrompter::new(["yes", "no", "Tau, Porosity"]);
        assert!(prompter.confirm("Run it?").await.unwrap());
        assert!(!prompter.confirm("Really?").await.unwrap());
        assert_eq!(prompter.ask("Fields?").await.unwrap(), "Tau, Porosity");
        assert!(prompter.ask("More?").await.is_err());

        assert_eq!(
            prompter.questions(),
            vec!["Run it? (yes/no)", "Really? (yes/no)", "Fields?", "More?"]
        );
    }
}
