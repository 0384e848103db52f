//! Configuration module for microgpt.
//!
//! Handles loading and managing application settings and prompt templates.

mod prompts;
mod settings;

pub use prompts::{
    DataAnalysisPrompts, DataFilterPrompts, PersonaPrompt, PersonaPrompts, Prompts,
    ToolReusePrompts, WorkflowPrompts,
};
pub use settings::{
    AssistantSettings, CompletionSettings, ErrorPolicy, GeneralSettings, OutputSettings,
    PollSettings, PromptSettings, ReusePolicy, Settings, ToolSettings, WorkflowSettings,
};
