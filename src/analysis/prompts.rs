//! Prompt templates for the four analysis kinds.

use super::{AnalysisKind, DOCS_SENTINEL, QUALITY_SENTINEL};

/// Build the prompt for `kind`, embedding the fetched context.
/// `branch` is present only for fix-eligible kinds.
pub fn build(kind: AnalysisKind, context: &str, branch: Option<&str>) -> String {
    match kind {
        AnalysisKind::Review => review(context),
        AnalysisKind::Docs => docs(context),
        AnalysisKind::Quality => quality(context),
        AnalysisKind::CiTriage => ci_triage(context, branch.unwrap_or("the PR branch")),
    }
}

fn review(diff: &str) -> String {
    format!(
        r#"You are an expert software engineer reviewing a pull request.
Below is the diff of the changes.
Provide a concise review identifying potential bugs, security issues, or performance bottlenecks.
If the code looks good, briefly explain why.

PR Diff:
{diff}

Format your response in Markdown. Keep it under 300 words."#
    )
}

fn docs(diff: &str) -> String {
    format!(
        r#"You are a meticulous technical writer and engineer. Review the pull request diff below.
Check for the following:
1. Are there new functions or types missing doc comments?
2. Are there major logic changes that should be reflected in the README?

If you find missing documentation that can be easily added, provide the complete fix in a structured JSON block:

```json
{{
  "file_path": "path/to/file",
  "new_content": "entire new content of the file with the documentation added",
  "commit_message": "docs: add missing docstrings"
}}
```

PR Diff:
{diff}

If there are documentation gaps, provide a concise list of suggestions.
If everything looks well-documented, just return "{DOCS_SENTINEL}".

Format your response in Markdown."#
    )
}

fn quality(report: &str) -> String {
    format!(
        r#"You are a senior security engineer and code quality lead.
Below are the raw results from the lint and security scan tools for a recent pull request.

Raw Results:
{report}

Summarize the most critical security vulnerabilities and significant code quality issues.
- Ignore minor style warnings if they are overwhelming.
- Focus on hardcoded secrets, insecure calls, and critical logic errors.
- Provide a clear, actionable summary for the developer.

If no significant issues are found, return "{QUALITY_SENTINEL}".

Format your response in Markdown."#
    )
}

fn ci_triage(logs: &str, branch: &str) -> String {
    format!(
        r#"You are an expert DevOps engineer. A CI workflow just failed on branch '{branch}'.
Below are the logs from the failure.
Identify the root cause and suggest a fix.

IF AND ONLY IF the fix is a simple code change (a syntax error, a small test bug, a bad import),
provide the fix in a structured JSON block at the end of your response:

```json
{{
  "file_path": "path/to/file",
  "new_content": "entire new content of the file",
  "commit_message": "fix the failing build"
}}
```

CI Logs Snippet:
{logs}

Format your response as a pull request comment in Markdown."#
    )
}

// ── Tests ────────────────────────────────────────────────────────
