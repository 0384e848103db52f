//! Image tools: transport metrics and TIFF discovery.

use super::{extension_of, walk_files, ToolContext};
use crate::error::{MicroError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Metrics of one two-phase image, as reported by the solver.
///
/// Values are kept as raw JSON since solvers report either scalars or
/// per-direction lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsRecord {
    #[serde(rename = "Effective Diffusivity")]
    pub effective_diffusivity: serde_json::Value,
    #[serde(rename = "Tau")]
    pub tau: serde_json::Value,
    #[serde(rename = "Volume Fraction")]
    pub volume_fraction: serde_json::Value,
    #[serde(rename = "Surface Area")]
    pub surface_area: serde_json::Value,
}

/// Computes transport metrics of a 3D image.
#[async_trait]
pub trait ImageMetrics: Send + Sync {
    async fn analyze(&self, image: &Path) -> Result<MetricsRecord>;
}

/// Metrics provider that runs an external command and reads JSON from stdout.
pub struct CommandMetrics {
    command: Vec<String>,
}

impl CommandMetrics {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

#[async_trait]
impl ImageMetrics for CommandMetrics {
    async fn analyze(&self, image: &Path) -> Result<MetricsRecord> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| MicroError::Config("tools.metrics_command is empty".to_string()))?;

        debug!("Running metrics command {} on {:?}", program, image);
        let output = Command::new(program)
            .args(args)
            .arg(image)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    MicroError::ToolNotFound(program.clone())
                } else {
                    MicroError::Io(e)
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(MicroError::tool_failed("tau_factor", stderr.trim()));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(serde_json::from_str(stdout.trim())?)
    }
}

/// Run the metrics provider and encode the result as a JSON string.
///
/// Failures are reported inside the record, never raised.
pub(super) async fn tau_factor(ctx: &ToolContext, query_img: &str) -> String {
    let path = ctx.resolve(query_img);
    let microstructure = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| query_img.to_string());

    let record = match ctx.metrics.analyze(&path).await {
        Ok(metrics) => {
            info!("Computed metrics for {}", microstructure);
            let mut value = serde_json::json!({ "Microstructure": microstructure });
            if let (Some(map), Ok(serde_json::Value::Object(fields))) =
                (value.as_object_mut(), serde_json::to_value(&metrics))
            {
                map.extend(fields);
            }
            value
        }
        Err(e) => {
            warn!("Cannot process image {}: {}", microstructure, e);
            serde_json::json!({
                "Microstructure": microstructure,
                "Error": format!("Cannot process image: {}", e),
            })
        }
    };

    record.to_string()
}

/// Collect the TIFF images below `directory`, write them to
/// `image_paths.txt` and describe them in one sentence.
pub(super) async fn extract_image_paths(ctx: &ToolContext, directory: &str) -> Result<String> {
    let root = ctx.resolve(directory);
    if !root.is_dir() {
        return Err(MicroError::tool_failed(
            "extract_image_paths",
            format!("'{}' is not a directory", directory),
        ));
    }

    let images: Vec<String> = walk_files(&root)?
        .into_iter()
        .filter(|p| matches!(extension_of(p).as_deref(), Some("tif") | Some("tiff")))
        .filter_map(|p| {
            p.strip_prefix(&root)
                .ok()
                .map(|rel| Path::new(directory).join(rel).to_string_lossy().to_string())
        })
        .collect();

    let listing = ctx.workdir().join("image_paths.txt");
    let mut content = images.join("\n");
    content.push('\n');
    tokio::fs::write(&listing, content).await?;
    info!("Found {} images below {}, listed in {:?}", images.len(), directory, listing);

    let quoted = images
        .iter()
        .map(|p| format!("'{}'", p))
        .collect::<Vec<_>>()
        .join(", ");
    Ok(format!(
        "Please help me analyze these images. These are the images' path: {}",
        quoted
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ToolSettings;
    use crate::tools::ScriptedPrompter;
    use std::sync::Arc;

    struct FixedMetrics;

    #[async_trait]
    impl ImageMetrics for FixedMetrics {
        async fn analyze(&self, image: &Path) -> Result<MetricsRecord> {
            if image.ends_with("broken.tif") {
                return Err(MicroError::tool_failed("tau_factor", "not a two-phase image"));
            }
            Ok(MetricsRecord {
                effective_diffusivity: serde_json::json!(0.31),
                tau: serde_json::json!(1.52),
                volume_fraction: serde_json::json!(0.47),
                surface_area: serde_json::json!(0.08),
            })
        }
    }

    fn context(dir: &Path) -> ToolContext {
        ToolContext::new(
            ToolSettings::default(),
            reqwest::Client::new(),
            Arc::new(ScriptedPrompter::new(Vec::<String>::new())),
        )
        .with_workdir(dir)
        .with_metrics(Arc::new(FixedMetrics))
    }

    #[tokio::test]
    async fn test_tau_factor_success() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());

        let encoded = tau_factor(&ctx, "./data/x.tif").await;
        let record: serde_json::Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(record["Microstructure"], "x.tif");
        assert_eq!(record["Tau"], 1.52);
        assert_eq!(record["Volume Fraction"], 0.47);
    }

    #[tokio::test]
    async fn test_tau_factor_failure_is_reported_in_record() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());

        let encoded = tau_factor(&ctx, "broken.tif").await;
        let record: serde_json::Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(record["Microstructure"], "broken.tif");
        assert!(record["Error"]
            .as_str()
            .unwrap()
            .starts_with("Cannot process image:"));
    }

    #[tokio::test]
    async fn test_extract_image_paths() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("data/sub")).unwrap();
        std::fs::write(dir.path().join("data/a.tif"), b"").unwrap();
        std::fs::write(dir.path().join("data/sub/b.TIFF"), b"").unwrap();
        std::fs::write(dir.path().join("data/notes.txt"), b"").unwrap();
        let ctx = context(dir.path());

        let sentence = extract_image_paths(&ctx, "./data").await.unwrap();
        assert_eq!(
            sentence,
            "Please help me analyze these images. These are the images' path: \
             './data/a.tif', './data/sub/b.TIFF'"
        );

        let listing = std::fs::read_to_string(dir.path().join("image_paths.txt")).unwrap();
        assert_eq!(listing, "./data/a.tif\n./data/sub/b.TIFF\n");
    }

    #[tokio::test]
    async fn test_extract_image_paths_requires_directory() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        assert!(extract_image_paths(&ctx, "./missing").await.is_err());
    }

    #[tokio::test]
    async fn test_command_metrics_reads_stdout() {
        let metrics = CommandMetrics::new(vec![
            "sh".to_string(),
            "-c".to_string(),
            r#"echo '{"Effective Diffusivity": 0.2, "Tau": [1.1, 1.2, 1.3], "Volume Fraction": 0.5, "Surface Area": 0.1}'"#
                .to_string(),
        ]);
        let record = metrics.analyze(Path::new("ignored.tif")).await.unwrap();
        assert_eq!(record.tau, serde_json::json!([1.1, 1.2, 1.3]));
    }

    #[tokio::test]
    async fn test_command_metrics_missing_program() {
        let metrics = CommandMetrics::new(vec!["microgpt-no-such-solver".to_string()]);
        let err = metrics.analyze(Path::new("x.tif")).await.unwrap_err();
        assert!(matches!(err, MicroError::ToolNotFound(_)));
    }
}
