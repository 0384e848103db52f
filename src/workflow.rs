//! Higher-order tools that plan a request and drive their own sub-conversation.
//!
//! A workflow asks a one-shot completion to split the user's request into
//! three delimited steps, then walks a dedicated persona assistant through
//! them on a fresh thread.

use crate::assistant::{AssistantRef, CompletionRequest, ThreadRef};
use crate::error::{MicroError, Result};
use crate::session::{RunDriver, Session};
use crate::tools::{Persona, ToolCall, ToolName};
use futures::future::{BoxFuture, FutureExt};
use regex::Regex;
use std::collections::HashMap;
use tracing::{debug, info, instrument};

/// Number of steps every plan must contain.
const PLAN_STEPS: usize = 3;

/// The higher-order tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Workflow {
    DataAnalysis,
    DataFilter,
    ToolReuse,
}

impl Workflow {
    /// The workflow behind a parsed call, with the user message it carries.
    pub fn from_call(call: &ToolCall) -> Option<(Workflow, &str)> {
        match call {
            ToolCall::DataAnalysis { user_message } => {
                Some((Workflow::DataAnalysis, user_message.as_str()))
            }
            ToolCall::DataFilter { user_message } => {
                Some((Workflow::DataFilter, user_message.as_str()))
            }
            ToolCall::ToolReuse { user_message } => {
                Some((Workflow::ToolReuse, user_message.as_str()))
            }
            _ => None,
        }
    }

    pub fn name(&self) -> ToolName {
        match self {
            Workflow::DataAnalysis => ToolName::DataAnalysis,
            Workflow::DataFilter => ToolName::DataFilter,
            Workflow::ToolReuse => ToolName::ToolReuse,
        }
    }

    /// Assistant persona driven by this workflow.
    pub fn persona(&self) -> Persona {
        match self {
            Workflow::DataAnalysis => Persona::Data,
            Workflow::DataFilter => Persona::Filter,
            Workflow::ToolReuse => Persona::ToolReuse,
        }
    }

    fn plan_template<'a>(&self, session: &'a Session) -> &'a str {
        let workflows = &session.prompts().workflows;
        match self {
            Workflow::DataAnalysis => &workflows.data_analysis.plan_system,
            Workflow::DataFilter => &workflows.data_filter.plan_system,
            Workflow::ToolReuse => &workflows.tool_reuse.plan_system,
        }
    }
}

impl std::fmt::Display for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Everything a workflow produced.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowOutcome {
    pub workflow: Workflow,
    /// The planned steps, in order.
    pub steps: Vec<String>,
    /// Reply text of every message sent on the sub-thread.
    pub responses: Vec<String>,
    /// The last reply; returned to the calling model.
    pub final_response: String,
}

/// Split a planning response into its steps.
///
/// Steps are introduced by `Step <n>:<delimiter>`; each one runs to the next
/// step marker and stops early at a further delimiter. Only the first three
/// steps are kept; fewer, or an empty one, is an error.
pub fn parse_steps(response: &str, delimiter: &str) -> Result<Vec<String>> {
    if delimiter.is_empty() {
        return Err(MicroError::StepParse("empty delimiter".to_string()));
    }

    let pattern = format!(r"Step\s*\d+\s*:?\s*{}", regex::escape(delimiter));
    let marker = Regex::new(&pattern).map_err(|e| MicroError::StepParse(e.to_string()))?;

    let markers: Vec<_> = marker.find_iter(response).collect();
    if markers.len() < PLAN_STEPS {
        return Err(MicroError::StepParse(format!(
            "expected {} steps separated by '{}', found {}",
            PLAN_STEPS,
            delimiter,
            markers.len()
        )));
    }

    let mut steps = Vec::with_capacity(PLAN_STEPS);
    for (i, m) in markers.iter().take(PLAN_STEPS).enumerate() {
        let end = markers.get(i + 1).map_or(response.len(), |next| next.start());
        let segment = &response[m.end()..end];
        let segment = segment.split(delimiter).next().unwrap_or_default().trim();
        if segment.is_empty() {
            return Err(MicroError::StepParse(format!("step {} is empty", i + 1)));
        }
        steps.push(segment.to_string());
    }

    Ok(steps)
}

fn format_plan(steps: &[String]) -> String {
    steps
        .iter()
        .enumerate()
        .map(|(i, step)| format!("Step {}: {}", i + 1, step))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Runs workflows on behalf of a driver at a given nesting depth.
pub struct WorkflowRunner {
    session: Session,
    depth: usize,
}

impl WorkflowRunner {
    /// Runner for tool calls made by a driver at `depth`.
    pub fn new(session: Session, depth: usize) -> Self {
        Self { session, depth }
    }

    /// Plan and execute `workflow` for `user_message`.
    ///
    /// Boxed because a workflow's sub-run can dispatch another workflow.
    pub fn run<'a>(
        &'a self,
        workflow: Workflow,
        user_message: &'a str,
    ) -> BoxFuture<'a, Result<WorkflowOutcome>> {
        self.run_inner(workflow, user_message).boxed()
    }

    #[instrument(skip(self, user_message), fields(depth = self.depth + 1))]
    async fn run_inner(&self, workflow: Workflow, user_message: &str) -> Result<WorkflowOutcome> {
        let depth = self.depth + 1;
        let max = self.session.settings().workflow.max_depth;
        if depth > max {
            return Err(MicroError::DepthExceeded { depth, max });
        }

        let steps = self.plan(workflow, user_message).await?;
        info!("Planned {} steps for {}", steps.len(), workflow);
        for (i, step) in steps.iter().enumerate() {
            debug!("Step {}: {}", i + 1, step);
        }

        let driver = RunDriver::nested(self.session.clone(), depth);
        let assistant = driver
            .create_assistant(&self.session.definition(workflow.persona()))
            .await?;
        let thread = driver.create_thread().await?;
        let sub = SubConversation {
            driver: &driver,
            thread: &thread,
            assistant: &assistant,
        };

        let responses = match workflow {
            Workflow::DataAnalysis => self.data_analysis(&sub, &steps).await?,
            Workflow::DataFilter => self.data_filter(&sub, &steps).await?,
            Workflow::ToolReuse => self.tool_reuse(&sub, &steps).await?,
        };

        let final_response = responses.last().cloned().unwrap_or_default();
        info!("{} finished after {} messages", workflow, responses.len());
        Ok(WorkflowOutcome {
            workflow,
            steps,
            responses,
            final_response,
        })
    }

    /// Ask the completion model for the three-step plan.
    async fn plan(&self, workflow: Workflow, user_message: &str) -> Result<Vec<String>> {
        let settings = self.session.settings();
        let delimiter = &settings.workflow.delimiter;

        let mut vars = HashMap::new();
        vars.insert("delimiter".to_string(), delimiter.clone());
        let system = self
            .session
            .prompts()
            .render_with_custom(workflow.plan_template(&self.session), &vars);

        let request = CompletionRequest {
            model: settings.completion.model.clone(),
            system,
            user: format!("{}{}{}", delimiter, user_message, delimiter),
            temperature: settings.completion.temperature,
            max_tokens: settings.completion.max_tokens,
        };
        let response = self.session.backend().complete(&request).await?;
        parse_steps(&response, delimiter)
    }

    async fn data_analysis(&self, sub: &SubConversation<'_>, steps: &[String]) -> Result<Vec<String>> {
        let prompts = &self.session.prompts().workflows.data_analysis;
        let mut responses = Vec::with_capacity(steps.len() + 1);
        for step in steps.iter().take(PLAN_STEPS) {
            responses.push(sub.send(step).await?);
        }
        responses.push(sub.send(&prompts.conclusion).await?);
        Ok(responses)
    }

    async fn data_filter(&self, sub: &SubConversation<'_>, steps: &[String]) -> Result<Vec<String>> {
        let prompts = &self.session.prompts().workflows.data_filter;
        let mut responses = Vec::with_capacity(3);

        let first = format!("{}{}", prompts.path_hint, format_plan(steps));
        responses.push(sub.send(&first).await?);

        let example = self
            .session
            .tools()
            .prompter()
            .ask(&prompts.example_question)
            .await?;
        let mut vars = HashMap::new();
        vars.insert("example".to_string(), example);
        let pattern = self
            .session
            .prompts()
            .render_with_custom(&prompts.pattern_request, &vars);
        responses.push(sub.send(&pattern).await?);

        responses.push(sub.send(&prompts.extract_request).await?);
        Ok(responses)
    }

    async fn tool_reuse(&self, sub: &SubConversation<'_>, steps: &[String]) -> Result<Vec<String>> {
        let prompts = &self.session.prompts().workflows.tool_reuse;
        let message = format!("{}{}", format_plan(steps), prompts.path_hint);
        Ok(vec![sub.send(&message).await?])
    }
}

/// The assistant and thread a workflow talks to.
struct SubConversation<'a> {
    driver: &'a RunDriver,
    thread: &'a ThreadRef,
    assistant: &'a AssistantRef,
}

impl SubConversation<'_> {
    async fn send(&self, text: &str) -> Result<String> {
        let reply = self
            .driver
            .execute_step(self.thread, self.assistant, text)
            .await?;
        for path in &reply.artifacts {
            info!("Saved {}", path.display());
        }
        Ok(reply.text)
    }
}
