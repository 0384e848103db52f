//! Tool registry and local tool implementations.
//!
//! Every tool the model may call has a [`ToolName`] and a [`ToolCall`]
//! variant carrying its parsed arguments. Leaf tools run here through
//! [`ToolContext::execute`]; the higher-order tools (`data_analysis`,
//! `data_filter`, `tool_reuse`) are routed to [`crate::workflow`] by the
//! dispatcher.

mod archive;
mod files;
mod image;
mod prompter;
mod schema;
mod upload;
mod zenodo;

pub use image::{CommandMetrics, ImageMetrics, MetricsRecord};
pub use prompter::{ConsolePrompter, Prompter, ScriptedPrompter};
pub use schema::Persona;
pub use upload::CommandUploader;

use crate::config::ToolSettings;
use crate::error::{MicroError, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

/// Payload key of `tau_factor` results.
pub const TAU_FACTOR_KEY: &str = "These are the JSON-formatted simulation results of the 3D images";

/// Identifier of every tool known to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolName {
    TauFactor,
    CreateAndExecutePythonFile,
    SearchZenodoDatasets,
    ExtractAndOrganizeFiles,
    ReadFile,
    UploadFile,
    ExtractImagePaths,
    FindJson,
    ExtractFilesFromFolderOrZip,
    DataAnalysis,
    DataFilter,
    ToolReuse,
}

impl ToolName {
    pub const ALL: [ToolName; 12] = [
        ToolName::TauFactor,
        ToolName::CreateAndExecutePythonFile,
        ToolName::SearchZenodoDatasets,
        ToolName::ExtractAndOrganizeFiles,
        ToolName::ReadFile,
        ToolName::UploadFile,
        ToolName::ExtractImagePaths,
        ToolName::FindJson,
        ToolName::ExtractFilesFromFolderOrZip,
        ToolName::DataAnalysis,
        ToolName::DataFilter,
        ToolName::ToolReuse,
    ];

    /// Wire name, as declared to the model.
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::TauFactor => "tau_factor",
            ToolName::CreateAndExecutePythonFile => "create_and_execute_python_file",
            ToolName::SearchZenodoDatasets => "search_zenodo_datasets",
            ToolName::ExtractAndOrganizeFiles => "extract_and_organize_files",
            ToolName::ReadFile => "read_file",
            ToolName::UploadFile => "upload_file",
            ToolName::ExtractImagePaths => "extract_image_paths",
            ToolName::FindJson => "find_json",
            ToolName::ExtractFilesFromFolderOrZip => "extract_files_from_folder_or_zip",
            ToolName::DataAnalysis => "data_analysis",
            ToolName::DataFilter => "data_filter",
            ToolName::ToolReuse => "tool_reuse",
        }
    }

    /// Whether the tool drives its own sub-conversation.
    pub fn is_workflow(&self) -> bool {
        matches!(
            self,
            ToolName::DataAnalysis | ToolName::DataFilter | ToolName::ToolReuse
        )
    }
}

impl FromStr for ToolName {
    type Err = MicroError;

    fn from_str(s: &str) -> Result<Self> {
        ToolName::ALL
            .iter()
            .copied()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| MicroError::UnknownTool(s.to_string()))
    }
}

impl std::fmt::Display for ToolName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tool call with parsed arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum ToolCall {
    /// Compute transport metrics of a two-phase 3D image.
    TauFactor { query_img: String },

    /// Write a Python script and run it after the user agrees.
    CreateAndExecutePythonFile {
        code: String,
        #[serde(default = "default_script_name")]
        output_filename: String,
    },

    /// Search Zenodo for datasets.
    SearchZenodoDatasets {
        query: String,
        #[serde(default = "default_max_results")]
        max_results: usize,
    },

    /// Unpack an archive and gather files of one extension.
    ExtractAndOrganizeFiles {
        zip_file_path: String,
        output_folder: String,
        file_extension: String,
    },

    /// Read a CSV or Python file.
    ReadFile { file_path: String },

    /// Upload a local file to remote storage.
    UploadFile {
        upload_filename: String,
        #[serde(default)]
        folder: Option<String>,
    },

    /// List the TIFF images below a directory.
    ExtractImagePaths { directory: String },

    /// Locate a metadata file and extract fields from it.
    FindJson { file_or_dir_path: String },

    /// Copy every file with a given name out of a folder tree or archive.
    ExtractFilesFromFolderOrZip {
        source_path: String,
        target_filename: String,
        #[serde(default = "default_destination")]
        destination_folder: String,
    },

    DataAnalysis { user_message: String },
    DataFilter { user_message: String },
    ToolReuse { user_message: String },
}

fn default_script_name() -> String {
    "created_script.py".to_string()
}

fn default_max_results() -> usize {
    10
}

fn default_destination() -> String {
    "DATA".to_string()
}

impl ToolCall {
    pub fn name(&self) -> ToolName {
        match self {
            ToolCall::TauFactor { .. } => ToolName::TauFactor,
            ToolCall::CreateAndExecutePythonFile { .. } => ToolName::CreateAndExecutePythonFile,
            ToolCall::SearchZenodoDatasets { .. } => ToolName::SearchZenodoDatasets,
            ToolCall::ExtractAndOrganizeFiles { .. } => ToolName::ExtractAndOrganizeFiles,
            ToolCall::ReadFile { .. } => ToolName::ReadFile,
            ToolCall::UploadFile { .. } => ToolName::UploadFile,
            ToolCall::ExtractImagePaths { .. } => ToolName::ExtractImagePaths,
            ToolCall::FindJson { .. } => ToolName::FindJson,
            ToolCall::ExtractFilesFromFolderOrZip { .. } => ToolName::ExtractFilesFromFolderOrZip,
            ToolCall::DataAnalysis { .. } => ToolName::DataAnalysis,
            ToolCall::DataFilter { .. } => ToolName::DataFilter,
            ToolCall::ToolReuse { .. } => ToolName::ToolReuse,
        }
    }
}

/// Parse a tool call from the name and raw JSON arguments sent by the model.
pub fn parse_tool_call(name: &str, arguments: &str) -> Result<ToolCall> {
    let tool = ToolName::from_str(name)?;

    let arguments = if arguments.trim().is_empty() {
        "{}"
    } else {
        arguments
    };
    let args: serde_json::Value = serde_json::from_str(arguments)
        .map_err(|e| MicroError::tool_arguments(name, format!("invalid JSON: {}", e)))?;

    let serde_json::Value::Object(mut fields) = args else {
        return Err(MicroError::tool_arguments(name, "arguments must be a JSON object"));
    };
    fields.insert("name".to_string(), json!(tool.as_str()));

    serde_json::from_value(serde_json::Value::Object(fields))
        .map_err(|e| MicroError::tool_arguments(name, e.to_string()))
}

/// Execution context of the leaf tools.
pub struct ToolContext {
    settings: ToolSettings,
    workdir: PathBuf,
    http: reqwest::Client,
    metrics: Arc<dyn ImageMetrics>,
    prompter: Arc<dyn Prompter>,
    uploader: CommandUploader,
}

impl ToolContext {
    /// Create a context working in the current directory.
    pub fn new(settings: ToolSettings, http: reqwest::Client, prompter: Arc<dyn Prompter>) -> Self {
        let metrics = Arc::new(CommandMetrics::new(settings.metrics_command.clone()));
        let uploader = CommandUploader::new(settings.upload_command.clone());
        Self {
            settings,
            workdir: PathBuf::from("."),
            http,
            metrics,
            prompter,
            uploader,
        }
    }

    /// Resolve relative paths against `workdir` instead of the process directory.
    pub fn with_workdir(mut self, workdir: impl Into<PathBuf>) -> Self {
        self.workdir = workdir.into();
        self
    }

    /// Replace the image metrics provider.
    pub fn with_metrics(mut self, metrics: Arc<dyn ImageMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn settings(&self) -> &ToolSettings {
        &self.settings
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn prompter(&self) -> Arc<dyn Prompter> {
        self.prompter.clone()
    }

    /// Path the model named, relative to the working directory.
    pub(crate) fn resolve(&self, path: &str) -> PathBuf {
        let expanded = shellexpand::tilde(path).to_string();
        let candidate = PathBuf::from(expanded);
        if candidate.is_absolute() {
            candidate
        } else {
            self.workdir.join(candidate)
        }
    }

    /// Execute a leaf tool and return its JSON payload.
    pub async fn execute(&self, call: &ToolCall) -> Result<serde_json::Value> {
        match call {
            ToolCall::TauFactor { query_img } => {
                let record = image::tau_factor(self, query_img).await;
                Ok(json!({ TAU_FACTOR_KEY: record }))
            }
            ToolCall::CreateAndExecutePythonFile {
                code,
                output_filename,
            } => {
                let message = files::create_and_execute_python_file(self, code, output_filename).await?;
                Ok(json!({ "Message": message }))
            }
            ToolCall::SearchZenodoDatasets { query, max_results } => {
                let results = zenodo::search(self, query, *max_results).await?;
                Ok(json!({ "Results": results }))
            }
            ToolCall::ExtractAndOrganizeFiles {
                zip_file_path,
                output_folder,
                file_extension,
            } => {
                let message =
                    archive::extract_and_organize_files(self, zip_file_path, output_folder, file_extension)
                        .await?;
                Ok(json!({ "Message": message }))
            }
            ToolCall::ReadFile { file_path } => {
                let results = files::read_file(self, file_path).await;
                Ok(json!({ "Results": results }))
            }
            ToolCall::UploadFile {
                upload_filename,
                folder,
            } => {
                let folder = folder.as_deref().unwrap_or(&self.settings.upload_folder);
                let message = self
                    .uploader
                    .upload(&self.resolve(upload_filename), folder)
                    .await?;
                Ok(json!({ "Message": message }))
            }
            ToolCall::ExtractImagePaths { directory } => {
                let sentence = image::extract_image_paths(self, directory).await?;
                Ok(json!({ "Image_path": sentence }))
            }
            ToolCall::FindJson { file_or_dir_path } => {
                let found = archive::find_json(self, file_or_dir_path).await?;
                Ok(json!({ "Message": found }))
            }
            ToolCall::ExtractFilesFromFolderOrZip {
                source_path,
                target_filename,
                destination_folder,
            } => {
                let message = archive::extract_files_from_folder_or_zip(
                    self,
                    source_path,
                    target_filename,
                    destination_folder,
                )
                .await?;
                Ok(json!({ "Message": message }))
            }
            ToolCall::DataAnalysis { .. } | ToolCall::DataFilter { .. } | ToolCall::ToolReuse { .. } => {
                Err(MicroError::Agent(format!(
                    "'{}' is a workflow and cannot run as a leaf tool",
                    call.name()
                )))
            }
        }
    }
}

/// Every regular file below `dir`, sorted by path.
pub(crate) fn walk_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        for entry in std::fs::read_dir(&current)? {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                pending.push(path);
            } else {
                files.push(path);
            }
        }
    }

    files.sort();
    Ok(files)
}

/// Lowercased extension of a path, without the dot.
pub(crate) fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_names_round_trip() {
        for name in ToolName::ALL {
            assert_eq!(name.as_str().parse::<ToolName>().unwrap(), name);
        }
    }

    #[test]
    fn test_unknown_tool_name() {
        let err = "nonexistent_tool".parse::<ToolName>().unwrap_err();
        assert!(matches!(err, MicroError::UnknownTool(ref n) if n == "nonexistent_tool"));
        assert!(err.to_string().contains("nonexistent_tool"));

        // exact match only
        assert!("Read_File".parse::<ToolName>().is_err());
    }

    #[test]
    fn test_parse_tau_factor() {
        let call = parse_tool_call("tau_factor", r#"{"query_img": "./data/x.tif"}"#).unwrap();
        assert_eq!(
            call,
            ToolCall::TauFactor {
                query_img: "./data/x.tif".to_string()
            }
        );
        assert_eq!(call.name(), ToolName::TauFactor);
    }

    #[test]
    fn test_parse_applies_defaults() {
        let call = parse_tool_call("create_and_execute_python_file", r#"{"code": "print(1)"}"#).unwrap();
        match call {
            ToolCall::CreateAndExecutePythonFile { output_filename, .. } => {
                assert_eq!(output_filename, "created_script.py");
            }
            other => panic!("Expected CreateAndExecutePythonFile, got {:?}", other),
        }

        let call = parse_tool_call("search_zenodo_datasets", r#"{"query": "battery"}"#).unwrap();
        assert!(matches!(call, ToolCall::SearchZenodoDatasets { max_results: 10, .. }));

        let call = parse_tool_call(
            "extract_files_from_folder_or_zip",
            r#"{"source_path": "./x.zip", "target_filename": "a.tif"}"#,
        )
        .unwrap();
        match call {
            ToolCall::ExtractFilesFromFolderOrZip {
                destination_folder, ..
            } => assert_eq!(destination_folder, "DATA"),
            other => panic!("Expected ExtractFilesFromFolderOrZip, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_rejects_bad_arguments() {
        let err = parse_tool_call("read_file", "{}").unwrap_err();
        assert!(matches!(err, MicroError::ToolArguments { ref tool, .. } if tool == "read_file"));

        let err = parse_tool_call("read_file", "not json").unwrap_err();
        assert!(matches!(err, MicroError::ToolArguments { .. }));

        let err = parse_tool_call("read_file", "[1, 2]").unwrap_err();
        assert!(matches!(err, MicroError::ToolArguments { .. }));
    }

    #[test]
    fn test_parse_unknown_tool() {
        let err = parse_tool_call("nonexistent_tool", "{}").unwrap_err();
        assert!(matches!(err, MicroError::UnknownTool(_)));
    }

    #[test]
    fn test_workflow_names() {
        assert!(ToolName::DataAnalysis.is_workflow());
        assert!(ToolName::ToolReuse.is_workflow());
        assert!(!ToolName::ReadFile.is_workflow());
    }

    #[test]
    fn test_walk_files_is_recursive_and_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("b/nested")).unwrap();
        std::fs::write(dir.path().join("b/nested/z.tif"), b"").unwrap();
        std::fs::write(dir.path().join("a.tif"), b"").unwrap();

        let files = walk_files(dir.path()).unwrap();
        assert_eq!(
            files,
            vec![dir.path().join("a.tif"), dir.path().join("b/nested/z.tif")]
        );
    }

    #[tokio::test]
    async fn test_workflow_calls_are_not_leaf_tools() {
        let ctx = ToolContext::new(
            ToolSettings::default(),
            reqwest::Client::new(),
            Arc::new(ScriptedPrompter::new(Vec::<String>::new())),
        );
        let result = ctx
            .execute(&ToolCall::DataAnalysis {
                user_message: "analyse".to_string(),
            })
            .await;
        assert!(result.is_err());
    }
}
