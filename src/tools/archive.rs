//! Archive and metadata tools, built on the `unzip` command.

use super::{walk_files, ToolContext};
use crate::error::{MicroError, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::{json, Map, Value};
use std::ffi::OsString;
use std::io::Read;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info};

/// Run `unzip` with `args` and return its stdout.
async fn unzip(tool: &str, args: Vec<OsString>) -> Result<Vec<u8>> {
    let output = Command::new("unzip")
        .args(&args)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                MicroError::ToolNotFound("unzip".to_string())
            } else {
                MicroError::Io(e)
            }
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        let detail = if stderr.trim().is_empty() {
            stdout.trim().to_string()
        } else {
            stderr.trim().to_string()
        };
        return Err(MicroError::tool_failed(tool, format!("unzip failed: {}", detail)));
    }

    Ok(output.stdout)
}

/// Names of the file entries of an archive.
async fn list_entries(tool: &str, archive: &Path) -> Result<Vec<String>> {
    let stdout = unzip(tool, vec!["-Z1".into(), archive.into()]).await?;
    Ok(String::from_utf8_lossy(&stdout)
        .lines()
        .filter(|line| !line.is_empty() && !line.ends_with('/'))
        .map(str::to_string)
        .collect())
}

/// Unpack a whole archive below `dest`, keeping its layout.
async fn extract_all(tool: &str, archive: &Path, dest: &Path) -> Result<()> {
    tokio::fs::create_dir_all(dest).await?;
    unzip(
        tool,
        vec!["-o".into(), "-q".into(), archive.into(), "-d".into(), dest.into()],
    )
    .await?;
    Ok(())
}

/// Unpack one entry directly into `dest`, dropping its folders.
async fn extract_entry(tool: &str, archive: &Path, entry: &str, dest: &Path) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dest).await?;
    unzip(
        tool,
        vec![
            "-o".into(),
            "-j".into(),
            "-q".into(),
            archive.into(),
            literal_pattern(entry).into(),
            "-d".into(),
            dest.into(),
        ],
    )
    .await?;
    Ok(dest.join(basename(entry)))
}

fn basename(entry: &str) -> &str {
    entry.rsplit('/').next().unwrap_or(entry)
}

/// Whether an archive entry is a file named exactly `target`.
fn is_target(entry: &str, target: &str) -> bool {
    basename(entry) == target
}

/// An entry name as an `unzip` pattern matching only itself.
fn literal_pattern(entry: &str) -> String {
    let mut pattern = String::with_capacity(entry.len());
    for c in entry.chars() {
        match c {
            '[' | '*' | '?' => {
                pattern.push('[');
                pattern.push(c);
                pattern.push(']');
            }
            _ => pattern.push(c),
        }
    }
    pattern
}

/// Whether the file starts with a ZIP signature.
fn is_zip(path: &Path) -> bool {
    let Ok(mut file) = std::fs::File::open(path) else {
        return false;
    };
    let mut magic = [0u8; 4];
    file.read_exact(&mut magic).is_ok() && (&magic == b"PK\x03\x04" || &magic == b"PK\x05\x06")
}

/// Unpack a `.zip` and copy every file with `file_extension` into `output_folder`.
pub(super) async fn extract_and_organize_files(
    ctx: &ToolContext,
    zip_file_path: &str,
    output_folder: &str,
    file_extension: &str,
) -> Result<String> {
    const TOOL: &str = "extract_and_organize_files";

    if !zip_file_path.to_lowercase().ends_with(".zip") {
        return Ok("The file is not a ZIP archive.".to_string());
    }

    let archive = ctx.resolve(zip_file_path);
    let scratch = tempfile::tempdir()?;
    let extracted = scratch.path();
    extract_all(TOOL, &archive, extracted).await?;

    let output = ctx.resolve(output_folder);
    tokio::fs::create_dir_all(&output).await?;

    let suffix = format!(".{}", file_extension.trim_start_matches('.').to_lowercase());
    let mut copied = 0;
    for file in walk_files(extracted)? {
        let Some(name) = file.file_name() else {
            continue;
        };
        if name.to_string_lossy().to_lowercase().ends_with(&suffix) {
            tokio::fs::copy(&file, output.join(name)).await?;
            copied += 1;
        }
    }

    info!("Copied {} {} files to {:?}", copied, suffix, output);
    Ok(format!(
        "All {} files have been copied to {} ({} files).",
        file_extension.trim_start_matches('.').to_uppercase(),
        output_folder,
        copied
    ))
}

/// Find the metadata file of a dataset and extract the fields the user picks.
pub(super) async fn find_json(ctx: &ToolContext, file_or_dir_path: &str) -> Result<Value> {
    const TOOL: &str = "find_json";

    let source = ctx.resolve(file_or_dir_path);
    let unpacked;
    let root = if source.is_file() && is_zip(&source) {
        unpacked = tempfile::tempdir()?;
        extract_all(TOOL, &source, unpacked.path()).await?;
        unpacked.path().to_path_buf()
    } else {
        source
    };

    if !root.is_dir() {
        return Ok(json!("No metadata found."));
    }

    let prompter = ctx.prompter();
    for file in walk_files(&root)? {
        let is_json = file.extension().is_some_and(|e| e == "json");
        let non_empty = std::fs::metadata(&file).map(|m| m.len() > 0).unwrap_or(false);
        if !is_json || !non_empty {
            continue;
        }

        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if !prompter
            .confirm(&format!("Found file: {}. Is this the metadata file?", name))
            .await?
        {
            continue;
        }

        let content = tokio::fs::read_to_string(&file).await?;
        let Ok(metadata) = serde_json::from_str::<Value>(&content) else {
            return Ok(json!("Invalid JSON format in file."));
        };

        let Some(fields) = item_fields(&metadata) else {
            return Ok(json!("JSON file does not contain a valid structure."));
        };

        let answer = prompter
            .ask(&format!(
                "JSON file contains items with the following fields:\n{}\nEnter the fields you want to extract (separated by commas):",
                fields.join("\n")
            ))
            .await?;
        let selected: Vec<&str> = answer
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .collect();

        debug!("Extracting fields {:?} from {:?}", selected, file);
        return Ok(select_fields(&metadata, &selected));
    }

    Ok(json!("No metadata found."))
}

/// Field names of the first item of an object-of-objects metadata file.
fn item_fields(metadata: &Value) -> Option<Vec<String>> {
    let first = metadata.as_object()?.values().next()?;
    Some(first.as_object()?.keys().cloned().collect())
}

/// Keep only `keys` in every item.
fn select_fields(metadata: &Value, keys: &[&str]) -> Value {
    let mut selected = Map::new();
    if let Some(items) = metadata.as_object() {
        for (id, item) in items {
            let Some(item) = item.as_object() else {
                continue;
            };
            let picked: Map<String, Value> = keys
                .iter()
                .filter_map(|k| item.get(*k).map(|v| (k.to_string(), v.clone())))
                .collect();
            selected.insert(id.clone(), Value::Object(picked));
        }
    }
    Value::Object(selected)
}

/// Copy every file named `target_filename` out of a folder tree or archive,
/// nested archives included, into `destination_folder`.
pub(super) async fn extract_files_from_folder_or_zip(
    ctx: &ToolContext,
    source_path: &str,
    target_filename: &str,
    destination_folder: &str,
) -> Result<String> {
    let source = ctx.resolve(source_path);
    let destination = ctx.resolve(destination_folder);
    tokio::fs::create_dir_all(&destination).await?;

    let count = if source.is_file() && source_path.to_lowercase().ends_with(".zip") {
        search_zip(source, target_filename, &destination).await?
    } else if source.is_dir() {
        search_folder(&source, target_filename, &destination).await?
    } else {
        return Ok(format!(
            "'{}' is neither a folder nor a ZIP archive.",
            source_path
        ));
    };

    info!("Extracted {} files named {} into {:?}", count, target_filename, destination);
    Ok(format!(
        "Extracted {} file(s) named '{}' into {}.",
        count, target_filename, destination_folder
    ))
}

async fn search_folder(folder: &Path, target: &str, destination: &Path) -> Result<usize> {
    let mut count = 0;
    for file in walk_files(folder)? {
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if name == target {
            tokio::fs::copy(&file, destination.join(&name)).await?;
            count += 1;
        } else if name.to_lowercase().ends_with(".zip") {
            count += search_zip(file, target, destination).await?;
        }
    }
    Ok(count)
}

fn search_zip<'a>(archive: PathBuf, target: &'a str, destination: &'a Path) -> BoxFuture<'a, Result<usize>> {
    const TOOL: &str = "extract_files_from_folder_or_zip";

    async move {
        let mut count = 0;
        for entry in list_entries(TOOL, &archive).await? {
            if is_target(&entry, target) {
                extract_entry(TOOL, &archive, &entry, destination).await?;
                count += 1;
            } else if entry.to_lowercase().ends_with(".zip") {
                let scratch = tempfile::tempdir()?;
                let nested = extract_entry(TOOL, &archive, &entry, scratch.path()).await?;
                count += search_zip(nested, target, destination).await?;
            }
        }
        Ok(count)
    }
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ToolSettings;
    use crate::tools::ScriptedPrompter;
    use std::sync::Arc;

    fn context(dir: &Path, answers: Vec<&str>) -> ToolContext {
        ToolContext::new(
            ToolSettings::default(),
            reqwest::Client::new(),
            Arc::new(ScriptedPrompter::new(answers)),
        )
        .with_workdir(dir)
    }

    #[test]
    fn test_item_fields_and_selection() {
        let metadata = json!({
            "sample_1": {"Porosity": 0.4, "Material": "NMC", "Scan": "A"},
            "sample_2": {"Porosity": 0.5, "Material": "LFP"}
        });
        let mut fields = item_fields(&metadata).unwrap();
        fields.sort();
        assert_eq!(fields, vec!["Material", "Porosity", "Scan"]);

        let selected = select_fields(&metadata, &["Porosity", "Scan"]);
        assert_eq!(
            selected,
            json!({
                "sample_1": {"Porosity": 0.4, "Scan": "A"},
                "sample_2": {"Porosity": 0.5}
            })
        );

        assert!(item_fields(&json!([1, 2])).is_none());
        assert!(item_fields(&json!({"a": 1})).is_none());
    }

    #[test]
    fn test_basename_and_signature() {
        assert_eq!(basename("dir/sub/x.tif"), "x.tif");
        assert_eq!(basename("x.tif"), "x.tif");
        assert!(is_target("a/b/target.tif", "target.tif"));
        assert!(!is_target("a/mytarget.tif", "target.tif"));
        assert!(!is_target("target.tif.bak", "target.tif"));

        let dir = tempfile::tempdir().unwrap();
        let fake = dir.path().join("fake.zip");
        std::fs::write(&fake, b"not a zip").unwrap();
        assert!(!is_zip(&fake));

        let empty = dir.path().join("empty.zip");
        std::fs::write(&empty, b"PK\x05\x06\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0").unwrap();
        assert!(is_zip(&empty));
    }

    #[test]
    fn test_entry_names_are_literal_patterns() {
        assert_eq!(literal_pattern("dir/x.tif"), "dir/x.tif");
        assert_eq!(literal_pattern("scan[1].tif"), "scan[[]1].tif");
        assert_eq!(literal_pattern("a*b?.tif"), "a[*]b[?].tif");
    }

    #[tokio::test]
    async fn test_find_json_in_folder() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("dataset")).unwrap();
        std::fs::write(dir.path().join("dataset/empty.json"), b"").unwrap();
        std::fs::write(
            dir.path().join("dataset/meta.json"),
            r#"{"s1": {"Porosity": 0.4, "Material": "NMC"}, "s2": {"Porosity": 0.5, "Material": "LFP"}}"#,
        )
        .unwrap();
        let ctx = context(dir.path(), vec!["yes", "Material"]);

        let found = find_json(&ctx, "./dataset").await.unwrap();
        assert_eq!(
            found,
            json!({"s1": {"Material": "NMC"}, "s2": {"Material": "LFP"}})
        );
    }

    #[tokio::test]
    async fn test_find_json_declined() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("meta.json"), r#"{"s1": {"a": 1}}"#).unwrap();
        let ctx = context(dir.path(), vec!["no"]);

        let found = find_json(&ctx, ".").await.unwrap();
        assert_eq!(found, json!("No metadata found."));
    }

    #[tokio::test]
    async fn test_find_json_invalid_content() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("meta.json"), "{not json").unwrap();
        let ctx = context(dir.path(), vec!["yes"]);

        let found = find_json(&ctx, ".").await.unwrap();
        assert_eq!(found, json!("Invalid JSON format in file."));
    }

    #[tokio::test]
    async fn test_extract_files_from_folder() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("source/a/b")).unwrap();
        std::fs::write(dir.path().join("source/a/b/target.tif"), b"img").unwrap();
        std::fs::write(dir.path().join("source/other.tif"), b"other").unwrap();
        let ctx = context(dir.path(), vec![]);

        let message = extract_files_from_folder_or_zip(&ctx, "./source", "target.tif", "DATA")
            .await
            .unwrap();
        assert_eq!(message, "Extracted 1 file(s) named 'target.tif' into DATA.");
        assert_eq!(std::fs::read(dir.path().join("DATA/target.tif")).unwrap(), b"img");
        assert!(!dir.path().join("DATA/other.tif").exists());
    }

    /// Stored archives holding `scans/one.tif` and `scans/two.tif`.
    const ONE_ZIP: &str = "504b030414000000000000002158b7efdc8301000000010000000d0000007363616e732f6f6e652e74696631504b0102140314000000000000002158b7efdc8301000000010000000d00000000000000000000008001000000007363616e732f6f6e652e746966504b050600000000010001003b0000002c0000000000";
    const TWO_ZIP: &str = "504b0304140000000000000021580dbed51a01000000010000000d0000007363616e732f74776f2e74696632504b01021403140000000000000021580dbed51a01000000010000000d00000000000000000000008001000000007363616e732f74776f2e746966504b050600000000010001003b0000002c0000000000";

    fn write_hex(path: &Path, hex: &str) {
        let bytes: Vec<u8> = (0..hex.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).unwrap())
            .collect();
        std::fs::write(path, bytes).unwrap();
    }

    fn has_unzip() -> bool {
        std::process::Command::new("unzip").arg("-v").output().is_ok()
    }

    #[tokio::test]
    async fn test_organize_starts_clean_for_each_archive() {
        if !has_unzip() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        write_hex(&dir.path().join("one.zip"), ONE_ZIP);
        write_hex(&dir.path().join("two.zip"), TWO_ZIP);
        let ctx = context(dir.path(), vec![]);

        extract_and_organize_files(&ctx, "one.zip", "first", "tif")
            .await
            .unwrap();
        let message = extract_and_organize_files(&ctx, "two.zip", "second", "tif")
            .await
            .unwrap();

        assert_eq!(message, "All TIF files have been copied to second (1 files).");
        assert_eq!(std::fs::read(dir.path().join("second/two.tif")).unwrap(), b"2");
        assert!(!dir.path().join("second/one.tif").exists());
        assert!(!dir.path().join("extracted").exists());
    }

    #[tokio::test]
    async fn test_organize_requires_zip_name() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), vec![]);
        let message = extract_and_organize_files(&ctx, "./images.tar", "out", "tif")
            .await
            .unwrap();
        assert_eq!(message, "The file is not a ZIP archive.");
    }
}
