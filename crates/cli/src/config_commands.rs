use std::path::PathBuf;

use anyhow::Result;

use switchboard_config::{Severity, ValidationResult, find_config_file, load_config, validate};

/// ANSI color codes.
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// Load and validate the configuration, exiting non-zero on errors.
pub fn check(path: Option<&PathBuf>) -> Result<()> {
    let path = path.cloned().or_else(find_config_file);

    let config = match &path {
        Some(path) => {
            eprintln!("Checking {}\n", path.display());
            match load_config(path) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("  {BOLD}{RED}error{RESET} {e:#}");
                    std::process::exit(1);
                },
            }
        },
        None => {
            eprintln!("No config file found; checking defaults.\n");
            Default::default()
        },
    };

    let result = validate(&config);
    eprint!("{}", render(&result));

    if result.has_errors() {
        std::process::exit(1);
    }
    Ok(())
}

fn render(result: &ValidationResult) -> String {
    let mut out = String::new();
    for d in &result.diagnostics {
        let color = match d.severity {
            Severity::Error => RED,
            Severity::Warning => YELLOW,
        };
        if d.path.is_empty() {
            out.push_str(&format!("  {BOLD}{color}{}{RESET} {}\n", d.severity, d.message));
        } else {
            out.push_str(&format!(
                "  {BOLD}{color}{}{RESET} {}: {}\n",
                d.severity, d.path, d.message
            ));
        }
    }
    if !result.diagnostics.is_empty() {
        out.push('\n');
    }

    let errors = result.count(Severity::Error);
    let warnings = result.count(Severity::Warning);
    if errors == 0 && warnings == 0 {
        out.push_str("No issues found.\n");
    } else {
        out.push_str(&format!("{errors} error(s), {warnings} warning(s)\n"));
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {super::*, std::io::Write};

    #[test]
    fn defaults_report_missing_app_settings() {
        let result = validate(&Default::default());
        let out = render(&result);
        assert!(result.has_errors());
        assert!(out.contains("meta.app_id"));
        assert!(out.contains("error(s)"));
    }

    #[test]
    fn complete_file_has_no_issues() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[server]
public_url = "https://bridge.example.com"

[meta]
app_id = "42"
app_secret = "s3cret"
verify_token = "hub-token"

[whatsapp]
enabled = true
"#
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        let out = render(&validate(&config));
        assert!(out.contains("No issues found."), "{out}");
    }
}
