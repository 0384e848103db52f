//! Config command implementation.

use crate::cli::{ConfigAction, Output};
use crate::config::Settings;
use anyhow::{anyhow, bail, Context, Result};
use std::path::PathBuf;

/// Run the config command.
pub fn run_config(action: &ConfigAction, settings: Settings, config_path: PathBuf) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let toml_str = toml::to_string_pretty(&settings)
                .map_err(|e| anyhow!("Failed to serialize config: {}", e))?;
            println!("{}", toml_str);
        }

        ConfigAction::Set { key, value } => {
            let updated = set_value(&settings, key, value)?;
            updated.save_to(&config_path)?;
            Output::success(&format!("Set {} = {}", key, value));
            Output::kv("config", &config_path.display().to_string());
        }

        ConfigAction::Edit => {
            // Create default config if it doesn't exist
            if !config_path.exists() {
                settings.save_to(&config_path)?;
                Output::info(&format!("Created default config at {:?}", config_path));
            }

            let editor = std::env::var("EDITOR").unwrap_or_else(|_| "vim".to_string());

            Output::info(&format!("Opening config in {}...", editor));

            let status = std::process::Command::new(&editor)
                .arg(&config_path)
                .status();

            match status {
                Ok(s) if s.success() => {
                    Output::success("Config saved.");
                }
                Ok(_) => {
                    Output::warning("Editor exited with non-zero status.");
                }
                Err(e) => {
                    Output::error(&format!("Failed to open editor: {}", e));
                    Output::info(&format!("Config file is at: {:?}", config_path));
                }
            }
        }

        ConfigAction::Path => {
            println!("{}", config_path.display());
        }
    }

    Ok(())
}

/// Settings with the dotted `key` replaced by `value`.
///
/// The value is read as a TOML literal, except for string settings (enums
/// included), which take it verbatim. The result must still be a valid configuration.
fn set_value(settings: &Settings, key: &str, value: &str) -> Result<Settings> {
    let mut root = toml::Value::try_from(settings)
        .map_err(|e| anyhow!("Failed to serialize config: {}", e))?;

    let (path, leaf) = match key.rsplit_once('.') {
        Some((path, leaf)) => (Some(path), leaf),
        None => (None, key),
    };

    let mut table = root
        .as_table_mut()
        .context("configuration is not a table")?;
    for part in path.into_iter().flat_map(|p| p.split('.')) {
        table = table
            .get_mut(part)
            .and_then(toml::Value::as_table_mut)
            .ok_or_else(|| anyhow!("Unknown config section '{}' in '{}'", part, key))?;
    }

    let new_value = match table.get(leaf) {
        Some(toml::Value::String(_)) => toml::Value::String(value.to_string()),
        Some(_) => parse_literal(value)
            .with_context(|| format!("'{}' is not a valid value for {}", value, key))?,
        // unset optional settings
        None if is_optional(path, leaf) => parse_literal(value)
            .unwrap_or_else(|_| toml::Value::String(value.to_string())),
        None => bail!("Unknown config key '{}'", key),
    };
    table.insert(leaf.to_string(), new_value);

    root.try_into::<Settings>()
        .with_context(|| format!("'{}' is not a valid value for {}", value, key))
}

fn parse_literal(value: &str) -> Result<toml::Value> {
    let mut doc: toml::Table = toml::from_str(&format!("value = {}", value))?;
    doc.remove("value").context("empty value")
}

/// Keys that serialize to nothing while unset.
fn is_optional(path: Option<&str>, leaf: &str) -> bool {
    matches!(
        (path, leaf),
        (Some("tools"), "zenodo_token") | (Some("prompts"), "custom_dir")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ErrorPolicy;

    #[test]
    fn test_set_number_and_string() {
        let settings = Settings::default();

        let updated = set_value(&settings, "poll.timeout_secs", "60").unwrap();
        assert_eq!(updated.poll.timeout_secs, 60);

        let updated = set_value(&updated, "assistant.model", "gpt-4o").unwrap();
        assert_eq!(updated.assistant.model, "gpt-4o");
        assert_eq!(updated.poll.timeout_secs, 60);
    }

    #[test]
    fn test_set_enum_and_list() {
        let settings = Settings::default();

        let updated = set_value(&settings, "tools.error_policy", "abort").unwrap();
        assert_eq!(updated.tools.error_policy, ErrorPolicy::Abort);

        let updated =
            set_value(&updated, "tools.metrics_command", r#"["python3", "tau.py"]"#).unwrap();
        assert_eq!(updated.tools.metrics_command, vec!["python3", "tau.py"]);
    }

    #[test]
    fn test_set_optional_key() {
        let updated = set_value(&Settings::default(), "tools.zenodo_token", "abc123").unwrap();
        assert_eq!(updated.tools.zenodo_token.as_deref(), Some("abc123"));
    }

    #[test]
    fn test_rejects_bad_keys_and_values() {
        let settings = Settings::default();
        assert!(set_value(&settings, "poll.no_such_key", "1").is_err());
        assert!(set_value(&settings, "nowhere.timeout_secs", "1").is_err());
        assert!(set_value(&settings, "poll.timeout_secs", "soon").is_err());
        assert!(set_value(&settings, "tools.error_policy", "explode").is_err());
    }

    #[test]
    fn test_saved_value_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        run_config(
            &ConfigAction::Set {
                key: "workflow.max_depth".to_string(),
                value: "3".to_string(),
            },
            Settings::default(),
            path.clone(),
        )
        .unwrap();

        let loaded = Settings::load_from(Some(&path)).unwrap();
        assert_eq!(loaded.workflow.max_depth, 3);
    }
}
