//! Turns a `requires_action` run into one batch of tool outputs.

use super::Session;
use crate::assistant::{PendingToolCall, Run, ToolOutput};
use crate::config::ErrorPolicy;
use crate::error::{MicroError, Result};
use crate::tools::{parse_tool_call, ToolName};
use crate::workflow::{Workflow, WorkflowRunner};
use serde_json::{json, Value};
use std::str::FromStr;
use tracing::{info, instrument, warn};

/// Runs the handler of every pending call and submits the outputs together.
pub struct Dispatcher {
    session: Session,
    depth: usize,
}

impl Dispatcher {
    /// Dispatcher for a driver at workflow nesting `depth` (0 at top level).
    pub fn new(session: Session, depth: usize) -> Self {
        Self { session, depth }
    }

    /// Produce one output per pending call, in service order. Nothing is submitted.
    ///
    /// An unknown tool name fails the whole batch before any handler runs.
    /// Handler errors are reported or fatal according to `tools.error_policy`.
    pub async fn resolve(&self, run: &Run) -> Result<Vec<ToolOutput>> {
        self.session.dumps().write(
            "required_actions.json",
            &json!({ "run_id": run.id, "tool_calls": run.pending }),
        );

        for call in &run.pending {
            ToolName::from_str(&call.name)?;
        }

        let policy = self.session.settings().tools.error_policy;
        let mut outputs = Vec::with_capacity(run.pending.len());

        for call in &run.pending {
            info!("Calling tool {} ({})", call.name, call.id);
            let payload = match self.invoke(call).await {
                Ok(payload) => payload,
                Err(e) if is_fatal(&e, policy) => return Err(e),
                Err(e) => {
                    warn!("Tool {} failed, reporting to the model: {}", call.name, e);
                    json!({ "Error": e.to_string(), "Tool": call.name })
                }
            };

            outputs.push(ToolOutput {
                tool_call_id: call.id.clone(),
                output: payload.to_string(),
            });
        }

        Ok(outputs)
    }

    /// Resolve the pending batch and submit it.
    #[instrument(skip(self, run), fields(run_id = %run.id, calls = run.pending.len()))]
    pub async fn handle(&self, run: &Run) -> Result<()> {
        let outputs = self.resolve(run).await?;
        self.session
            .backend()
            .submit_tool_outputs(&run.thread_id, &run.id, &outputs)
            .await?;
        info!("Submitted {} tool outputs", outputs.len());
        Ok(())
    }

    async fn invoke(&self, call: &PendingToolCall) -> Result<Value> {
        let parsed = parse_tool_call(&call.name, &call.arguments)?;

        match Workflow::from_call(&parsed) {
            Some((workflow, user_message)) => {
                let outcome = WorkflowRunner::new(self.session.clone(), self.depth)
                    .run(workflow, user_message)
                    .await?;
                Ok(json!({ "Message": outcome.final_response }))
            }
            None => self.session.tools().execute(&parsed).await,
        }
    }
}

fn is_fatal(error: &MicroError, policy: ErrorPolicy) -> bool {
    match error {
        MicroError::UnknownTool(_) | MicroError::Cancelled(_) => true,
        _ => policy == ErrorPolicy::Abort,
    }
}
