//! GitHub REST implementation of the hosting capability.

use std::io::Read;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::header;
use reqwest::Method;
use serde::Deserialize;

use crate::config::{GithubConfig, QualityConfig};

use super::{quality, CommentSink, FileUpdate, InstallationId, RepoHost, RepoId};

/// REST client authenticated with the configured bearer token.
pub struct GithubClient {
    http: reqwest::Client,
    api_url: String,
    token: Option<String>,
    quality: QualityConfig,
}

impl GithubClient {
    pub fn new(config: &GithubConfig, quality: QualityConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: config.api_url.trim_end_matches('/').to_owned(),
            token: config
                .token
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_owned),
            quality,
        }
    }

    fn url(&self, tail: &str) -> String {
        format!("{}/{tail}", self.api_url)
    }

    /// Authenticated request builder. Missing credentials are a
    /// per-invocation configuration error, not a startup failure.
    fn request(&self, method: Method, url: String) -> Result<reqwest::RequestBuilder> {
        let Some(token) = self.token.as_deref() else {
            bail!("github.token is not configured");
        };
        Ok(self
            .http
            .request(method, url)
            .bearer_auth(token)
            .header(header::ACCEPT, "application/vnd.github+json")
            .header(header::USER_AGENT, "mergewarden"))
    }

    /// Fetch the contents-API record for a path, or `None` on 404.
    async fn contents_entry(
        &self,
        repo: &RepoId,
        path: &str,
        reference: Option<&str>,
    ) -> Result<Option<ContentsEntry>> {
        let url = self.url(&format!("repos/{repo}/contents/{path}"));
        let mut req = self.request(Method::GET, url)?;
        if let Some(reference) = reference {
            req = req.query(&[("ref", reference)]);
        }
        let resp = req.send().await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = checked(resp, "fetching file contents").await?;
        Ok(Some(resp.json().await?))
    }
}

/// Bail with status and body text on a non-success response.
async fn checked(resp: reqwest::Response, what: &str) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    bail!("{what} failed with {status}: {body}");
}

// ── Wire records ─────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct PrFile {
    filename: String,
    #[serde(default)]
    patch: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PullRecord {
    head: HeadRecord,
}

#[derive(Debug, Deserialize)]
struct HeadRecord {
    #[serde(rename = "ref")]
    branch: String,
}

#[derive(Debug, Deserialize)]
struct ContentsEntry {
    #[serde(default)]
    path: String,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    sha: String,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ContentsResponse {
    Entries(Vec<ContentsEntry>),
    Single(ContentsEntry),
}

fn decode_contents(entry: &ContentsEntry) -> Result<String> {
    let encoded: String = entry
        .content
        .as_deref()
        .unwrap_or_default()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    let bytes = BASE64
        .decode(encoded.as_bytes())
        .context("decoding base64 file contents")?;
    String::from_utf8(bytes).context("file contents are not valid UTF-8")
}

// ── RepoHost ─────────────────────────────────────────────────────

#[async_trait]
impl RepoHost for GithubClient {
    async fn pr_diff(&self, repo: &RepoId, number: u64) -> Result<String> {
        let url = self.url(&format!("repos/{repo}/pulls/{number}/files"));
        let resp = self
            .request(Method::GET, url)?
            .query(&[("per_page", "100")])
            .send()
            .await?;
        let files: Vec<PrFile> = checked(resp, "fetching pull request files")
            .await?
            .json()
            .await?;

        let mut diff = String::new();
        for file in &files {
            diff.push_str(&format!("--- {}\n+++ {}\n", file.filename, file.filename));
            match file.patch.as_deref() {
                Some(patch) => diff.push_str(patch),
                None => diff.push_str("(binary or oversized file)"),
            }
            diff.push_str("\n\n");
        }
        Ok(diff)
    }

    async fn read_file(
        &self,
        repo: &RepoId,
        path: &str,
        reference: Option<&str>,
    ) -> Result<String> {
        let entry = self
            .contents_entry(repo, path, reference)
            .await?
            .with_context(|| format!("file {path} not found in {repo}"))?;
        decode_contents(&entry)
    }

    async fn list_files(&self, repo: &RepoId, path: &str) -> Result<Vec<String>> {
        let mut pending = vec![path.trim_matches('/').to_owned()];
        let mut files = Vec::new();

        while let Some(dir) = pending.pop() {
            let url = self.url(&format!("repos/{repo}/contents/{dir}"));
            let resp = self.request(Method::GET, url)?.send().await?;
            let listing: ContentsResponse = checked(resp, "listing directory")
                .await?
                .json()
                .await?;
            let entries = match listing {
                ContentsResponse::Entries(entries) => entries,
                ContentsResponse::Single(entry) => vec![entry],
            };
            for entry in entries {
                if entry.kind == "dir" {
                    pending.push(entry.path);
                } else {
                    files.push(entry.path);
                }
            }
        }

        files.sort();
        Ok(files)
    }

    async fn update_file(&self, repo: &RepoId, update: &FileUpdate) -> Result<()> {
        // The current blob sha is required, which also enforces the
        // update-only contract: an absent file cannot be created here.
        let Some(existing) = self
            .contents_entry(repo, &update.path, Some(&update.branch))
            .await?
        else {
            bail!(
                "file {} not found on branch {}; file creation is not supported",
                update.path,
                update.branch
            );
        };

        let url = self.url(&format!("repos/{repo}/contents/{}", update.path));
        let payload = serde_json::json!({
            "message": update.message,
            "content": BASE64.encode(update.content.as_bytes()),
            "sha": existing.sha,
            "branch": update.branch,
        });
        let resp = self
            .request(Method::PUT, url)?
            .json(&payload)
            .send()
            .await?;
        checked(resp, "committing file update").await?;
        Ok(())
    }

    async fn pr_head_branch(&self, repo: &RepoId, number: u64) -> Result<String> {
        let url = self.url(&format!("repos/{repo}/pulls/{number}"));
        let resp = self.request(Method::GET, url)?.send().await?;
        let pull: PullRecord = checked(resp, "fetching pull request")
            .await?
            .json()
            .await?;
        Ok(pull.head.branch)
    }

    async fn run_quality_checks(&self, repo: &RepoId) -> Result<String> {
        tracing::debug!(repo = %repo, "Running local quality checks");
        quality::run_quality_checks(&self.quality).await
    }

    async fn workflow_run_logs(&self, repo: &RepoId, run_id: u64) -> Result<String> {
        let url = self.url(&format!("repos/{repo}/actions/runs/{run_id}/logs"));
        let resp = self.request(Method::GET, url)?.send().await?;
        let bytes = checked(resp, "downloading workflow run logs")
            .await?
            .bytes()
            .await?;

        // The archive can reach several megabytes; unpack it off the
        // async threads.
        tokio::task::spawn_blocking(move || concat_log_archive(&bytes))
            .await
            .context("log unpacking task failed")?
    }
}

/// Concatenate every per-step `.txt` entry of the log archive.
fn concat_log_archive(bytes: &[u8]) -> Result<String> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .context("opening workflow log archive")?;
    let mut combined = String::new();
    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .context("reading workflow log archive entry")?;
        if !entry.name().ends_with(".txt") {
            continue;
        }
        let name = entry.name().to_owned();
        let mut content = String::new();
        entry
            .read_to_string(&mut content)
            .with_context(|| format!("decoding log entry {name}"))?;
        combined.push_str(&format!("--- LOG: {name} ---\n{content}\n"));
    }
    Ok(combined)
}

// ── CommentSink ──────────────────────────────────────────────────

#[async_trait]
impl CommentSink for GithubClient {
    async fn post_comment(
        &self,
        installation: InstallationId,
        repo: &RepoId,
        number: u64,
        body: &str,
    ) -> Result<()> {
        let url = self.url(&format!("repos/{repo}/issues/{number}/comments"));
        let resp = self
            .request(Method::POST, url)?
            .json(&serde_json::json!({ "body": body }))
            .send()
            .await?;
        checked(resp, "posting comment").await?;
        tracing::info!(installation, repo = %repo, number, "Posted comment");
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────
