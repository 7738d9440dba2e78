//! Local lint + security-scan runner.
//!
//! The quality pipeline's context is the raw output of two configured
//! commands run against the accessible checkout, combined into one
//! labelled report the model then summarizes.

use anyhow::Result;
use tokio::process::Command;

use crate::config::QualityConfig;

/// Run the configured lint and security-scan commands and combine
/// their reports. A command that cannot be spawned contributes an
/// error section instead of failing the whole check.
pub async fn run_quality_checks(config: &QualityConfig) -> Result<String> {
    let lint = run_section("Lint Results", &config.lint_command, &config.workdir).await;
    let scan = run_section("Security Scan Results", &config.scan_command, &config.workdir).await;
    Ok(format!("{lint}\n---\n{scan}"))
}

async fn run_section(label: &str, command: &[String], workdir: &str) -> String {
    let Some((program, args)) = command.split_first() else {
        return format!("### {label}\nNo command configured.");
    };
    let heading = format!("### {label} ({program})");

    match Command::new(program)
        .args(args)
        .current_dir(workdir)
        .output()
        .await
    {
        Ok(output) => {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let body = if stdout.trim().is_empty() {
                "No issues found."
            } else {
                stdout.trim_end()
            };
            format!("{heading}\n{body}")
        }
        Err(err) => {
            tracing::warn!(program = %program, error = %err, "Quality check command failed to run");
            format!("{heading}\nError running {program}: {err}")
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn combines_labelled_sections() {
        let config = QualityConfig {
            lint_command: vec!["echo".into(), "W291 trailing whitespace".into()],
            scan_command: vec!["echo".into(), "B101 assert used".into()],
            workdir: ".".into(),
        };
        let report = run_quality_checks(&config).await.unwrap();
        assert!(report.contains("### Lint Results (echo)\nW291 trailing whitespace"));
        assert!(report.contains("### Security Scan Results (echo)\nB101 assert used"));
        assert!(report.contains("\n---\n"));
    }

    #[tokio::test]
    async fn empty_output_reads_as_clean() {
        let config = QualityConfig {
            lint_command: vec!["true".into()],
            scan_command: vec!["true".into()],
            workdir: ".".into(),
        };
        let report = run_quality_checks(&config).await.unwrap();
        assert_eq!(report.matches("No issues found.").count(), 2);
    }

    #[tokio::test]
    async fn unspawnable_command_reports_an_error_section() {
        let config = QualityConfig {
            lint_command: vec!["definitely-not-a-real-binary".into()],
            scan_command: vec!["true".into()],
            workdir: ".".into(),
        };
        let report = run_quality_checks(&config).await.unwrap();
        assert!(report.contains("Error running definitely-not-a-real-binary"));
    }
}
