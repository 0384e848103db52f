//! Doctor command - verify external tools and configuration.

use crate::cli::Output;
use crate::config::Settings;
use console::style;
use std::path::Path;
use std::process::Command;

/// Check result for a single item.
#[derive(Debug)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, PartialEq)]
pub enum CheckStatus {
    Ok,
    Warning,
    Error,
}

impl CheckResult {
    fn ok(name: &str, message: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Ok,
            message: message.to_string(),
            hint: None,
        }
    }

    fn warning(name: &str, message: &str, hint: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Warning,
            message: message.to_string(),
            hint: Some(hint.to_string()),
        }
    }

    fn error(name: &str, message: &str, hint: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Error,
            message: message.to_string(),
            hint: Some(hint.to_string()),
        }
    }

    /// Downgrade an error to a warning, for tools only some features need.
    fn optional(mut self) -> Self {
        if self.status == CheckStatus::Error {
            self.status = CheckStatus::Warning;
        }
        self
    }

    fn print(&self) {
        let icon = match self.status {
            CheckStatus::Ok => style("✓").green(),
            CheckStatus::Warning => style("!").yellow(),
            CheckStatus::Error => style("✗").red(),
        };

        println!("  {} {} - {}", icon, style(&self.name).bold(), self.message);

        if let Some(hint) = &self.hint {
            println!("    {} {}", style("→").dim(), style(hint).dim());
        }
    }
}

/// Run all diagnostic checks.
pub fn run_doctor(settings: &Settings, config_path: &Path) -> anyhow::Result<()> {
    Output::header("microgpt Doctor");
    println!();
    println!("Checking external tools and configuration...\n");

    let mut checks = Vec::new();

    println!("{}", style("External Tools").bold());
    let tools = &settings.tools;
    let mut tool_checks = vec![
        check_tool(&tools.python, &[tools.python.as_str(), "--version"], install_hint_python()),
        check_tool("unzip", &["unzip", "-v"], install_hint_unzip()),
        check_command("metrics command", &tools.metrics_command, "Set tools.metrics_command"),
    ];
    tool_checks.push(
        check_command(
            "upload command",
            &tools.upload_command,
            "Install rclone or set tools.upload_command",
        )
        .optional(),
    );
    for check in &tool_checks {
        check.print();
    }
    checks.extend(tool_checks);

    println!();

    println!("{}", style("API Configuration").bold());
    let api_checks = vec![check_openai_api_key(), check_zenodo_token(settings)];
    for check in &api_checks {
        check.print();
    }
    checks.extend(api_checks);

    println!();

    println!("{}", style("Directories").bold());
    let dir_checks = check_directories(settings);
    for check in &dir_checks {
        check.print();
    }
    checks.extend(dir_checks);

    println!();

    println!("{}", style("Configuration").bold());
    let config_check = check_config_file(config_path);
    config_check.print();
    checks.push(config_check);

    println!();

    // Summary
    let errors = checks.iter().filter(|c| c.status == CheckStatus::Error).count();
    let warnings = checks.iter().filter(|c| c.status == CheckStatus::Warning).count();

    if errors > 0 {
        Output::error(&format!(
            "{} error(s) found. Please fix them before using microgpt.",
            errors
        ));
        std::process::exit(1);
    } else if warnings > 0 {
        Output::warning(&format!("All checks passed with {} warning(s).", warnings));
    } else {
        Output::success("All checks passed! microgpt is ready to use.");
    }

    Ok(())
}

/// Check if an external tool is available by running its version command.
fn check_tool(name: &str, version_cmd: &[&str], hint: &str) -> CheckResult {
    let Some((cmd, args)) = version_cmd.split_first() else {
        return CheckResult::error(name, "no command configured", hint);
    };

    match Command::new(cmd).args(args).output() {
        Ok(output) if output.status.success() => {
            // python 2 and some unzip builds print the version on stderr
            let text = if output.stdout.is_empty() {
                output.stderr
            } else {
                output.stdout
            };
            let version = String::from_utf8_lossy(&text)
                .lines()
                .next()
                .unwrap_or("installed")
                .trim()
                .to_string();

            // Truncate long version strings
            let version_display = if version.chars().count() > 50 {
                format!("{}...", version.chars().take(50).collect::<String>())
            } else {
                version
            };

            CheckResult::ok(name, &version_display)
        }
        Ok(_) => CheckResult::error(name, "installed but not working", hint),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            CheckResult::error(name, "not found", hint)
        }
        Err(e) => CheckResult::error(name, &format!("error: {}", e), hint),
    }
}

/// Check that the program of a configured command line can be started.
fn check_command(name: &str, command: &[String], hint: &str) -> CheckResult {
    let Some(program) = command.first() else {
        return CheckResult::error(name, "not configured", hint);
    };

    let result = check_tool(name, &[program.as_str(), "--version"], hint);
    if result.status == CheckStatus::Ok {
        CheckResult::ok(name, &command.join(" "))
    } else {
        result
    }
}

/// Check if OpenAI API key is configured.
fn check_openai_api_key() -> CheckResult {
    match std::env::var("OPENAI_API_KEY") {
        Ok(key) if key.starts_with("sk-") && key.len() > 20 => {
            let masked = format!("{}...{}", &key[..7], &key[key.len() - 4..]);
            CheckResult::ok("OPENAI_API_KEY", &format!("configured ({})", masked))
        }
        Ok(key) if key.is_empty() => CheckResult::error(
            "OPENAI_API_KEY",
            "empty",
            "Set with: export OPENAI_API_KEY='sk-...'",
        ),
        Ok(_) => CheckResult::warning(
            "OPENAI_API_KEY",
            "set but format looks unusual",
            "Expected format: sk-... (OpenAI API key)",
        ),
        Err(_) => CheckResult::error(
            "OPENAI_API_KEY",
            "not set",
            "Set with: export OPENAI_API_KEY='sk-...'",
        ),
    }
}

fn check_zenodo_token(settings: &Settings) -> CheckResult {
    match settings.tools.zenodo_token.as_deref() {
        Some(token) if !token.is_empty() => CheckResult::ok("Zenodo token", "configured"),
        _ => CheckResult::ok("Zenodo token", "not set (public records only)"),
    }
}

/// Check data and output directories.
fn check_directories(settings: &Settings) -> Vec<CheckResult> {
    let mut results = Vec::new();

    for (name, dir) in [
        ("Data directory", settings.data_dir()),
        ("Artifact directory", settings.artifact_dir()),
    ] {
        if dir.is_dir() {
            results.push(CheckResult::ok(name, &format!("{}", dir.display())));
        } else {
            results.push(CheckResult::warning(
                name,
                &format!("{} (will be created)", dir.display()),
                "Directory will be created on first use",
            ));
        }
    }

    let cache_dir = settings.assistant_cache_dir();
    let cached = std::fs::read_dir(&cache_dir)
        .map(|entries| entries.filter_map(|e| e.ok()).count())
        .unwrap_or(0);
    results.push(CheckResult::ok(
        "Assistant cache",
        &format!("{} ({} cached)", cache_dir.display(), cached),
    ));

    results
}

/// Check if config file exists.
fn check_config_file(config_path: &Path) -> CheckResult {
    if config_path.exists() {
        CheckResult::ok("Config file", &format!("{}", config_path.display()))
    } else {
        CheckResult::warning(
            "Config file",
            "using defaults",
            "Create with: microgpt config edit",
        )
    }
}

/// Platform-specific install hint for Python.
fn install_hint_python() -> &'static str {
    if cfg!(target_os = "macos") {
        "Install with: brew install python"
    } else if cfg!(target_os = "linux") {
        "Install with: sudo apt install python3 (or your package manager)"
    } else {
        "Install from: https://www.python.org/downloads/"
    }
}

/// Platform-specific install hint for unzip.
fn install_hint_unzip() -> &'static str {
    if cfg!(target_os = "macos") {
        "Install with: brew install unzip"
    } else if cfg!(target_os = "linux") {
        "Install with: sudo apt install unzip (or your package manager)"
    } else {
        "Install Info-ZIP unzip and add it to PATH"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_result_ok() {
        let result = CheckResult::ok("test", "passed");
        assert_eq!(result.status, CheckStatus::Ok);
        assert!(result.hint.is_none());
    }

    #[test]
    fn test_optional_downgrades_errors() {
        let result = CheckResult::error("test", "failed", "fix it").optional();
        assert_eq!(result.status, CheckStatus::Warning);
        assert_eq!(result.hint, Some("fix it".to_string()));
    }

    #[test]
    fn test_missing_command() {
        let result = check_command("metrics", &["microgpt-no-such-tool".to_string()], "hint");
        assert_eq!(result.status, CheckStatus::Error);
        assert_eq!(result.message, "not found");

        let result = check_command("metrics", &[], "hint");
        assert_eq!(result.message, "not configured");
    }

    #[test]
    fn test_directories_inside_tempdir() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::default();
        settings.general.data_dir = dir.path().to_string_lossy().to_string();
        settings.output.artifact_dir = dir.path().join("missing").to_string_lossy().to_string();

        let results = check_directories(&settings);
        assert_eq!(results[0].status, CheckStatus::Ok);
        assert_eq!(results[1].status, CheckStatus::Warning);
        assert!(results[2].message.contains("(0 cached)"));
    }
}
