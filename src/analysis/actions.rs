//! Structured-action extraction.
//!
//! Fix-eligible analyses ask the model to append a machine-readable
//! fix descriptor inside a fenced ```json block. Extraction is strictly
//! best-effort: no block, a malformed block, or a descriptor missing
//! its target path or replacement content all yield `None` and never
//! abort the enclosing pipeline.

use serde::Deserialize;

/// A machine-actionable fix parsed from a model response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixAction {
    /// Repository path of the file to replace.
    pub path: String,
    /// Full replacement content for that file.
    pub content: String,
    /// Commit message, when the model supplied one.
    pub message: Option<String>,
}

/// Wire shape of the fix block in the model contract.
#[derive(Debug, Deserialize)]
struct RawFix {
    #[serde(default)]
    file_path: String,
    #[serde(default)]
    new_content: String,
    #[serde(default)]
    commit_message: Option<String>,
}

/// Extract the fix descriptor from a model response, if any.
pub fn extract_fix(response: &str) -> Option<FixAction> {
    let block = fenced_json_block(response)?;
    let raw: RawFix = match serde_json::from_str(block) {
        Ok(raw) => raw,
        Err(err) => {
            tracing::warn!(error = %err, "Ignoring malformed fix block in model response");
            return None;
        }
    };

    if raw.file_path.trim().is_empty() || raw.new_content.is_empty() {
        return None;
    }

    Some(FixAction {
        path: raw.file_path,
        content: raw.new_content,
        message: raw
            .commit_message
            .filter(|message| !message.trim().is_empty()),
    })
}

/// The contents of the first ```json fence in `text`.
fn fenced_json_block(text: &str) -> Option<&str> {
    let start = text.find("```json")? + "```json".len();
    let end = text[start..].find("```")?;
    Some(text[start..start + end].trim())
}

// ── Tests ────────────────────────────────────────────────────────
