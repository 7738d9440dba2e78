//! Event dispatching.
//!
//! Normalizes inbound webhook payloads into [`Event`]s and decides
//! which analyses to run. A change-request lifecycle event schedules
//! the full staggered analysis set (plus a best-effort greeting when
//! the request was just opened); a failed build run schedules exactly
//! one triage, and only when a change request is linked.
//!
//! The dispatcher owns an event only for the duration of dispatch;
//! scheduled pipelines run independently of the acknowledgment.

pub mod stagger;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::analysis::{AnalysisKind, AnalysisRequest, AnalysisRunner};
use crate::github::{CommentSink, InstallationId, RepoHost, RepoId};

pub use stagger::{AnalysisExecutor, StaggerScheduler, StaggeredTask};

/// Launch offsets for the change-request analysis set.
const REVIEW_OFFSET: Duration = Duration::from_secs(5);
const DOCS_OFFSET: Duration = Duration::from_secs(35);
const QUALITY_OFFSET: Duration = Duration::from_secs(65);

/// Launch offset for CI-failure triage, clear of the analysis set.
const TRIAGE_OFFSET: Duration = Duration::from_secs(10);

/// How much of the README the greeting quotes.
const README_SNIPPET_CHARS: usize = 200;

// ── Wire payload ─────────────────────────────────────────────────

/// The subset of the webhook payload the dispatcher reads.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct WebhookPayload {
    pub action: Option<String>,
    pub number: Option<u64>,
    pub installation: Option<Installation>,
    pub repository: Option<Repository>,
    pub workflow_run: Option<WorkflowRunPayload>,
}

#[derive(Debug, Deserialize)]
pub struct Installation {
    pub id: u64,
}

#[derive(Debug, Deserialize)]
pub struct Repository {
    pub full_name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct WorkflowRunPayload {
    pub id: u64,
    pub conclusion: Option<String>,
    pub head_branch: Option<String>,
    pub pull_requests: Vec<LinkedPullRequest>,
}

#[derive(Debug, Deserialize)]
pub struct LinkedPullRequest {
    pub number: u64,
}

// ── Normalized events ────────────────────────────────────────────

/// An inbound notification, normalized for dispatch.
#[derive(Debug)]
pub enum Event {
    PullRequest {
        installation: InstallationId,
        repo: RepoId,
        number: u64,
        action: String,
    },
    WorkflowRun {
        installation: InstallationId,
        repo: RepoId,
        run_id: u64,
        action: String,
        conclusion: Option<String>,
        pr_number: Option<u64>,
        head_branch: Option<String>,
    },
}

impl Event {
    /// Normalize a payload of the given kind. Unknown kinds and
    /// payloads missing required fields yield `None`.
    fn normalize(
        event_kind: &str,
        installation: InstallationId,
        payload: &WebhookPayload,
    ) -> Option<Self> {
        let repo = payload
            .repository
            .as_ref()
            .and_then(|r| RepoId::parse(&r.full_name));
        match event_kind {
            "pull_request" => Some(Self::PullRequest {
                installation,
                repo: repo?,
                number: payload.number?,
                action: payload.action.clone()?,
            }),
            "workflow_run" => {
                let run = payload.workflow_run.as_ref()?;
                Some(Self::WorkflowRun {
                    installation,
                    repo: repo?,
                    run_id: run.id,
                    action: payload.action.clone()?,
                    conclusion: run.conclusion.clone(),
                    pr_number: run.pull_requests.first().map(|pr| pr.number),
                    head_branch: run.head_branch.clone(),
                })
            }
            _ => None,
        }
    }
}

// ── Dispatcher ───────────────────────────────────────────────────

/// Decides which analyses each event triggers and hands them to the
/// stagger scheduler.
pub struct Dispatcher {
    scheduler: StaggerScheduler,
    repo_host: Arc<dyn RepoHost>,
    comments: Arc<dyn CommentSink>,
}

impl Dispatcher {
    pub fn new(
        scheduler: StaggerScheduler,
        repo_host: Arc<dyn RepoHost>,
        comments: Arc<dyn CommentSink>,
    ) -> Self {
        Self {
            scheduler,
            repo_host,
            comments,
        }
    }

    /// Dispatch one inbound event. The caller has already acknowledged
    /// it; everything here is best-effort and logged.
    pub async fn dispatch(&self, event_kind: &str, payload: WebhookPayload) {
        let Some(installation) = payload.installation.as_ref().map(|i| i.id) else {
            tracing::warn!(event = event_kind, "Event without installation id, dropping");
            return;
        };

        let Some(event) = Event::normalize(event_kind, installation, &payload) else {
            tracing::debug!(event = event_kind, "Ignoring event");
            return;
        };

        match event {
            Event::PullRequest {
                installation,
                repo,
                number,
                action,
            } => self.handle_pull_request(installation, repo, number, &action).await,
            Event::WorkflowRun {
                installation,
                repo,
                run_id,
                action,
                conclusion,
                pr_number,
                head_branch,
            } => self.handle_workflow_run(
                installation,
                repo,
                run_id,
                &action,
                conclusion.as_deref(),
                pr_number,
                head_branch.as_deref(),
            ),
        }
    }

    async fn handle_pull_request(
        &self,
        installation: InstallationId,
        repo: RepoId,
        number: u64,
        action: &str,
    ) {
        tracing::info!(repo = %repo, pr = number, action, "Pull request event");
        if !matches!(action, "opened" | "synchronize" | "reopened") {
            tracing::debug!(action, "No analyses for this action");
            return;
        }

        if action == "opened" {
            self.post_greeting(installation, &repo, number).await;
        }

        let request = |kind| AnalysisRequest {
            installation,
            repo: repo.clone(),
            pr_number: number,
            kind,
            run_id: None,
        };
        self.scheduler.schedule(vec![
            StaggeredTask {
                offset: REVIEW_OFFSET,
                request: request(AnalysisKind::Review),
            },
            StaggeredTask {
                offset: DOCS_OFFSET,
                request: request(AnalysisKind::Docs),
            },
            StaggeredTask {
                offset: QUALITY_OFFSET,
                request: request(AnalysisKind::Quality),
            },
        ]);
        tracing::info!(repo = %repo, pr = number, "Scheduled staggered analysis set");
    }

    #[allow(clippy::too_many_arguments)]
    fn handle_workflow_run(
        &self,
        installation: InstallationId,
        repo: RepoId,
        run_id: u64,
        action: &str,
        conclusion: Option<&str>,
        pr_number: Option<u64>,
        head_branch: Option<&str>,
    ) {
        tracing::info!(repo = %repo, run_id, action, conclusion, "Workflow run event");
        if action != "completed" || conclusion != Some("failure") {
            return;
        }

        let Some(pr_number) = pr_number else {
            tracing::debug!(
                repo = %repo,
                run_id,
                branch = head_branch.unwrap_or("unknown"),
                "Workflow run failed but no change request is linked, dropping"
            );
            return;
        };

        tracing::info!(repo = %repo, run_id, pr = pr_number, "Scheduling CI-failure triage");
        self.scheduler.schedule(vec![StaggeredTask {
            offset: TRIAGE_OFFSET,
            request: AnalysisRequest {
                installation,
                repo,
                pr_number,
                kind: AnalysisKind::CiTriage,
                run_id: Some(run_id),
            },
        }]);
    }

    /// Best-effort hello on a freshly opened change request, quoting
    /// the start of the README as a capability smoke check. Failures
    /// are logged and never block scheduling.
    async fn post_greeting(&self, installation: InstallationId, repo: &RepoId, number: u64) {
        let message = match self.repo_host.read_file(repo, "README.md", None).await {
            Ok(content) => {
                let snippet: String = content.chars().take(README_SNIPPET_CHARS).collect();
                format!(
                    "Hello from Mergewarden! I see you opened a pull request.\n\n\
                     I was able to read your README:\n```\n{snippet}...\n```"
                )
            }
            Err(err) => {
                tracing::warn!(repo = %repo, "Greeting README read failed: {err:#}");
                format!("Hello from Mergewarden! I tried to read your README but failed: {err:#}")
            }
        };

        if let Err(err) = self
            .comments
            .post_comment(installation, repo, number, &message)
            .await
        {
            tracing::warn!(repo = %repo, pr = number, "Greeting comment failed: {err:#}");
        }
    }
}

#[async_trait]
impl AnalysisExecutor for AnalysisRunner {
    async fn execute(&self, request: AnalysisRequest) {
        self.run(request).await;
    }
}

// ── Tests ────────────────────────────────────────────────────────
