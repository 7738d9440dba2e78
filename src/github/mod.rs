//! Code-hosting capability.
//!
//! Narrow request/response wrappers around the hosting service. The
//! analysis code depends only on the [`RepoHost`] and [`CommentSink`]
//! traits; [`GithubClient`] is the production implementation of both.
//! No retained state beyond the HTTP client and injected credentials.

pub mod client;
pub mod quality;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[allow(unused_imports)]
pub use client::GithubClient;

/// Installation (tenant) identifier scoping a pipeline run's access.
pub type InstallationId = u64;

// ── Repository identity ──────────────────────────────────────────

/// An `owner/name` repository reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoId {
    pub owner: String,
    pub name: String,
}

impl RepoId {
    /// Parse a `owner/name` string; anything else is rejected.
    pub fn parse(full_name: &str) -> Option<Self> {
        let (owner, name) = full_name.split_once('/')?;
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return None;
        }
        Some(Self {
            owner: owner.to_owned(),
            name: name.to_owned(),
        })
    }
}

impl std::fmt::Display for RepoId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

// ── File update ──────────────────────────────────────────────────

/// A single-file commit request against an existing file.
#[derive(Debug, Clone)]
pub struct FileUpdate {
    /// Path of the file to replace.
    pub path: String,
    /// Full replacement content.
    pub content: String,
    /// Commit message.
    pub message: String,
    /// Branch to commit to.
    pub branch: String,
}

// ── Capability traits ────────────────────────────────────────────

/// Read/write access to a hosted repository and its CI artifacts.
#[async_trait]
pub trait RepoHost: Send + Sync {
    /// Unified diff of a pull request, assembled per changed file.
    async fn pr_diff(&self, repo: &RepoId, number: u64) -> anyhow::Result<String>;

    /// Decoded content of a file, at `reference` or the default branch.
    async fn read_file(
        &self,
        repo: &RepoId,
        path: &str,
        reference: Option<&str>,
    ) -> anyhow::Result<String>;

    /// All file paths under `path`, directories expanded recursively.
    async fn list_files(&self, repo: &RepoId, path: &str) -> anyhow::Result<Vec<String>>;

    /// Commit a full-content replacement of an existing file. Fails if
    /// the file does not already exist on the branch; creation is not
    /// supported.
    async fn update_file(&self, repo: &RepoId, update: &FileUpdate) -> anyhow::Result<()>;

    /// Head branch name of a pull request.
    async fn pr_head_branch(&self, repo: &RepoId, number: u64) -> anyhow::Result<String>;

    /// Run the configured lint and security-scan commands against the
    /// local checkout and return their combined report.
    async fn run_quality_checks(&self, repo: &RepoId) -> anyhow::Result<String>;

    /// Concatenated per-step log text of a workflow run's archived
    /// log bundle.
    async fn workflow_run_logs(&self, repo: &RepoId, run_id: u64) -> anyhow::Result<String>;
}

/// Posting comments back to the originating change request.
///
/// Failures propagate to the caller: a failed publication is the
/// pipeline's terminal observable effect.
#[async_trait]
pub trait CommentSink: Send + Sync {
    async fn post_comment(
        &self,
        installation: InstallationId,
        repo: &RepoId,
        number: u64,
        body: &str,
    ) -> anyhow::Result<()>;
}

// ── Tests ────────────────────────────────────────────────────────
