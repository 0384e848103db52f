//! Reading local files and running generated scripts.

use super::{extension_of, ToolContext};
use crate::error::{MicroError, Result};
use serde_json::{json, Value};
use tokio::process::Command;
use tracing::{info, warn};

/// Script output kept in the message sent back to the model.
const MAX_SCRIPT_OUTPUT: usize = 4000;

/// Read a CSV file as rows or a Python file as text.
///
/// Problems are described in the returned value instead of failing the call.
pub(super) async fn read_file(ctx: &ToolContext, file_path: &str) -> Value {
    let path = ctx.resolve(file_path);
    if !path.exists() {
        return json!(format!("File not found: {}", file_path));
    }

    let extension = extension_of(&path).unwrap_or_default();
    let content = match extension.as_str() {
        "csv" | "py" => tokio::fs::read_to_string(&path).await,
        _ => return json!(format!("Unsupported file type: .{}", extension)),
    };

    let content = match content {
        Ok(content) => content,
        Err(e) => return json!(format!("An error occurred: {}", e)),
    };

    if extension == "py" {
        return json!(content);
    }

    match crate::csv::parse(&content) {
        Ok(rows) => json!(rows),
        Err(e) => json!(format!("An error occurred: {}", e)),
    }
}

/// Write `code` to `output_filename` and run it with the configured interpreter
/// once the user agrees.
pub(super) async fn create_and_execute_python_file(
    ctx: &ToolContext,
    code: &str,
    output_filename: &str,
) -> Result<String> {
    let script = ctx.resolve(output_filename);
    if let Some(parent) = script.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&script, code).await?;
    info!("Python script '{}' created", output_filename);

    let approved = ctx.settings().auto_approve_scripts
        || ctx
            .prompter()
            .confirm(&format!(
                "Python script '{}' created. Do you want to execute the script?",
                output_filename
            ))
            .await?;

    if !approved {
        return Ok("Script execution aborted by user.".to_string());
    }

    let python = &ctx.settings().python;
    let output = Command::new(python)
        .arg(&script)
        .current_dir(ctx.workdir())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                MicroError::ToolNotFound(python.clone())
            } else {
                MicroError::Io(e)
            }
        })?;

    if output.status.success() {
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stdout = tail(stdout.trim(), MAX_SCRIPT_OUTPUT);
        if stdout.is_empty() {
            Ok("Script executed successfully.".to_string())
        } else {
            Ok(format!("Script executed successfully. Output:\n{}", stdout))
        }
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!("Script '{}' failed with {}", output_filename, output.status);
        Ok(format!(
            "Script could not be executed due to an error: {}",
            tail(stderr.trim(), MAX_SCRIPT_OUTPUT)
        ))
    }
}

/// The last `max` characters of `text`.
fn tail(text: &str, max: usize) -> &str {
    let count = text.chars().count();
    if count <= max {
        return text;
    }
    let skip = count - max;
    match text.char_indices().nth(skip) {
        Some((idx, _)) => &text[idx..],
        None => text,
    }
}
