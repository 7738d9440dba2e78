//! Analysis pipelines.
//!
//! Four analyses run against a change request — review, documentation
//! check, quality/security check, and CI-failure triage. All four are
//! the same algorithm with different configuration: fetch context,
//! build a prompt, invoke the model through the resilient wrapper,
//! optionally extract and apply a structured fix, then publish a
//! comment. [`AnalysisKind`] carries the per-kind configuration;
//! [`AnalysisRunner`] owns the single shared control flow.
//!
//! Every failure is caught at the run boundary: a pipeline invocation
//! can abort itself, but nothing escapes to the dispatcher.

pub mod actions;
pub mod prompts;

use std::sync::Arc;

use anyhow::{bail, Context, Result};

use crate::github::{CommentSink, FileUpdate, InstallationId, RepoHost, RepoId};
use crate::providers::{Provider, ResilientProvider, RetryPolicy};

/// Exact response that lets the documentation check stay quiet.
pub const DOCS_SENTINEL: &str = "Documentation looks great!";

/// Exact response that lets the quality check stay quiet.
pub const QUALITY_SENTINEL: &str = "Code quality and security look solid!";

/// How much of the end of a CI log bundle the triage prompt keeps.
const LOG_TAIL_CHARS: usize = 8000;

// ── Analysis kinds ───────────────────────────────────────────────

/// The four analysis pipelines, as data-driven configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnalysisKind {
    Review,
    Docs,
    Quality,
    CiTriage,
}

impl AnalysisKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Review => "review",
            Self::Docs => "docs",
            Self::Quality => "quality",
            Self::CiTriage => "ci-triage",
        }
    }

    /// Retry policy for the model call; three attempts everywhere,
    /// kind-specific backoff base.
    pub fn retry_policy(self) -> RetryPolicy {
        match self {
            Self::Review => RetryPolicy::with_base_secs(35),
            Self::Docs => RetryPolicy::with_base_secs(40),
            Self::Quality => RetryPolicy::with_base_secs(45),
            Self::CiTriage => RetryPolicy::with_base_secs(50),
        }
    }

    pub fn heading(self) -> &'static str {
        match self {
            Self::Review => "## 🤖 AI Code Review",
            Self::Docs => "## 📚 Documentation Review",
            Self::Quality => "## 🛡️ Security & Quality Report",
            Self::CiTriage => "## 🛠️ CI Failure Analysis",
        }
    }

    /// Whether this analysis may apply a structured fix.
    pub fn applies_fixes(self) -> bool {
        matches!(self, Self::Docs | Self::CiTriage)
    }

    /// A response equal to this sentinel suppresses publication (for
    /// the docs check, only when no fix was applied).
    pub fn sentinel(self) -> Option<&'static str> {
        match self {
            Self::Docs => Some(DOCS_SENTINEL),
            Self::Quality => Some(QUALITY_SENTINEL),
            Self::Review | Self::CiTriage => None,
        }
    }

    /// Commit message used when the model omits one.
    pub fn default_commit_message(self) -> &'static str {
        match self {
            Self::Docs => "docs: add missing docstrings",
            Self::CiTriage => "fix: automated repair for CI failure",
            Self::Review | Self::Quality => "chore: automated update",
        }
    }

    fn applied_notice(self, path: &str, branch: &str) -> String {
        match self {
            Self::Docs => format!(
                "**📝 Documentation fix applied**: I have added the missing \
                 documentation to `{path}` on branch `{branch}`. Please review."
            ),
            _ => format!(
                "**🚀 Automated fix applied**: I have attempted to fix the issue \
                 by updating `{path}` on branch `{branch}`. Please verify the changes."
            ),
        }
    }
}

// ── Analysis request ─────────────────────────────────────────────

/// The normalized unit of work handed from the dispatcher to exactly
/// one pipeline invocation.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub installation: InstallationId,
    pub repo: RepoId,
    pub pr_number: u64,
    pub kind: AnalysisKind,
    /// Workflow run id, present only for CI triage.
    pub run_id: Option<u64>,
}

/// A fix that was committed, for the published notice.
struct AppliedFix {
    path: String,
    branch: String,
}

// ── Runner ───────────────────────────────────────────────────────

/// Shared fetch → prompt → invoke → apply → publish control flow.
pub struct AnalysisRunner {
    repo_host: Arc<dyn RepoHost>,
    comments: Arc<dyn CommentSink>,
    provider: Arc<dyn Provider>,
}

impl AnalysisRunner {
    pub fn new(
        repo_host: Arc<dyn RepoHost>,
        comments: Arc<dyn CommentSink>,
        provider: Arc<dyn Provider>,
    ) -> Self {
        Self {
            repo_host,
            comments,
            provider,
        }
    }

    /// Run one analysis to completion. Never panics, never propagates:
    /// failures are logged here and the process keeps serving events.
    pub async fn run(&self, request: AnalysisRequest) {
        tracing::info!(
            kind = request.kind.label(),
            repo = %request.repo,
            pr = request.pr_number,
            "Starting analysis"
        );
        if let Err(err) = self.run_inner(&request).await {
            tracing::error!(
                kind = request.kind.label(),
                repo = %request.repo,
                pr = request.pr_number,
                "Analysis run failed: {err:#}"
            );
        }
    }

    async fn run_inner(&self, request: &AnalysisRequest) -> Result<()> {
        // (a) context
        let Some(context) = self.fetch_context(request).await? else {
            tracing::debug!(
                kind = request.kind.label(),
                pr = request.pr_number,
                "No context to analyze, skipping"
            );
            return Ok(());
        };

        // Fix-eligible kinds commit to the PR head branch, so resolve
        // it up front (the triage prompt names it too).
        let branch = if request.kind.applies_fixes() {
            Some(
                self.repo_host
                    .pr_head_branch(&request.repo, request.pr_number)
                    .await
                    .context("resolving pull request head branch")?,
            )
        } else {
            None
        };

        // (b) + (c) prompt and resilient model call
        let prompt = prompts::build(request.kind, &context, branch.as_deref());
        let resilient =
            ResilientProvider::new(Arc::clone(&self.provider), request.kind.retry_policy());
        let answer = match resilient.generate(&prompt).await {
            Ok(answer) => answer,
            Err(err) => {
                tracing::error!(
                    kind = request.kind.label(),
                    pr = request.pr_number,
                    error = %err,
                    "No model response, aborting analysis"
                );
                return Ok(());
            }
        };

        // (d) optional structured fix
        let mut applied: Option<AppliedFix> = None;
        if request.kind.applies_fixes() {
            if let Some(fix) = actions::extract_fix(&answer) {
                let branch = branch.clone().unwrap_or_default();
                let update = FileUpdate {
                    path: fix.path.clone(),
                    content: fix.content,
                    message: fix
                        .message
                        .unwrap_or_else(|| request.kind.default_commit_message().to_owned()),
                    branch: branch.clone(),
                };
                match self.repo_host.update_file(&request.repo, &update).await {
                    Ok(()) => {
                        tracing::info!(
                            kind = request.kind.label(),
                            path = %fix.path,
                            branch = %branch,
                            "Applied automated fix"
                        );
                        applied = Some(AppliedFix {
                            path: fix.path,
                            branch,
                        });
                    }
                    Err(err) => {
                        tracing::warn!(
                            kind = request.kind.label(),
                            path = %fix.path,
                            "Fix application failed, publishing without it: {err:#}"
                        );
                    }
                }
            }
        }

        // (e) publish
        if suppressed(request.kind, &answer, applied.is_some()) {
            tracing::info!(
                kind = request.kind.label(),
                pr = request.pr_number,
                "Check passed, skipping comment"
            );
            return Ok(());
        }

        let body = compose(request.kind, &answer, applied.as_ref());
        self.comments
            .post_comment(request.installation, &request.repo, request.pr_number, &body)
            .await
            .context("publishing analysis comment")?;
        Ok(())
    }

    async fn fetch_context(&self, request: &AnalysisRequest) -> Result<Option<String>> {
        let context = match request.kind {
            AnalysisKind::Review | AnalysisKind::Docs => {
                self.repo_host
                    .pr_diff(&request.repo, request.pr_number)
                    .await
                    .context("fetching pull request diff")?
            }
            AnalysisKind::Quality => self
                .repo_host
                .run_quality_checks(&request.repo)
                .await
                .context("running quality checks")?,
            AnalysisKind::CiTriage => {
                let Some(run_id) = request.run_id else {
                    bail!("triage request carries no workflow run id");
                };
                let logs = self
                    .repo_host
                    .workflow_run_logs(&request.repo, run_id)
                    .await
                    .context("fetching workflow run logs")?;
                tail_chars(&logs, LOG_TAIL_CHARS).to_owned()
            }
        };

        if context.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(context))
    }
}

/// Whether publication is suppressed for this kind and outcome.
fn suppressed(kind: AnalysisKind, answer: &str, fix_applied: bool) -> bool {
    match kind.sentinel() {
        Some(sentinel) => answer.trim() == sentinel && !fix_applied,
        None => false,
    }
}

fn compose(kind: AnalysisKind, answer: &str, applied: Option<&AppliedFix>) -> String {
    let mut body = format!("{}\n\n{}", kind.heading(), answer);
    if let Some(fix) = applied {
        body.push_str("\n\n---\n");
        body.push_str(&kind.applied_notice(&fix.path, &fix.branch));
    }
    body
}

/// Last `limit` characters of `text`, on a char boundary.
fn tail_chars(text: &str, limit: usize) -> &str {
    let total = text.chars().count();
    if total <= limit {
        return text;
    }
    let start = text
        .char_indices()
        .nth(total - limit)
        .map(|(index, _)| index)
        .unwrap_or(0);
    &text[start..]
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ProviderError;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct StubHost {
        diff: String,
        quality_report: String,
        logs: String,
        branch: String,
        update_error: Option<String>,
        updates: Mutex<Vec<FileUpdate>>,
    }

    impl Default for StubHost {
        fn default() -> Self {
            Self {
                diff: "--- app.py\n+++ app.py\n+print('hi')".into(),
                quality_report: "### Lint Results (flake8)\nE501 line too long".into(),
                logs: "--- LOG: 1_build.txt ---\nerror: oops".into(),
                branch: "feature".into(),
                update_error: None,
                updates: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl RepoHost for StubHost {
        async fn pr_diff(&self, _repo: &RepoId, _number: u64) -> Result<String> {
            Ok(self.diff.clone())
        }

        async fn read_file(
            &self,
            _repo: &RepoId,
            _path: &str,
            _reference: Option<&str>,
        ) -> Result<String> {
            Ok("# Demo".into())
        }

        async fn list_files(&self, _repo: &RepoId, _path: &str) -> Result<Vec<String>> {
            Ok(Vec::new())
        }

        async fn update_file(&self, _repo: &RepoId, update: &FileUpdate) -> Result<()> {
            if let Some(ref message) = self.update_error {
                bail!("{message}");
            }
            self.updates.lock().push(update.clone());
            Ok(())
        }

        async fn pr_head_branch(&self, _repo: &RepoId, _number: u64) -> Result<String> {
            Ok(self.branch.clone())
        }

        async fn run_quality_checks(&self, _repo: &RepoId) -> Result<String> {
            Ok(self.quality_report.clone())
        }

        async fn workflow_run_logs(&self, _repo: &RepoId, _run_id: u64) -> Result<String> {
            Ok(self.logs.clone())
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        comments: Mutex<Vec<(u64, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl CommentSink for RecordingSink {
        async fn post_comment(
            &self,
            _installation: InstallationId,
            _repo: &RepoId,
            number: u64,
            body: &str,
        ) -> Result<()> {
            if self.fail {
                bail!("comment endpoint unavailable");
            }
            self.comments.lock().push((number, body.to_owned()));
            Ok(())
        }
    }

    struct CannedProvider {
        response: Result<String, ProviderError>,
        calls: AtomicU32,
    }

    impl CannedProvider {
        fn answering(text: &str) -> Self {
            Self {
                response: Ok(text.to_owned()),
                calls: AtomicU32::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                response: Err(ProviderError::Api {
                    status: 500,
                    message: "down".into(),
                }),
                calls: AtomicU32::new(0),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Provider for CannedProvider {
        fn name(&self) -> &str {
            "canned"
        }

        async fn generate(&self, _prompt: &str) -> Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.response {
                Ok(text) => Ok(text.clone()),
                Err(ProviderError::Api { status, message }) => Err(ProviderError::Api {
                    status: *status,
                    message: message.clone(),
                }),
                Err(_) => Err(ProviderError::RateLimited),
            }
        }
    }

    fn request(kind: AnalysisKind) -> AnalysisRequest {
        AnalysisRequest {
            installation: 99,
            repo: RepoId::parse("octocat/demo").unwrap(),
            pr_number: 7,
            kind,
            run_id: Some(42),
        }
    }

    fn runner(
        host: StubHost,
        sink: RecordingSink,
        provider: CannedProvider,
    ) -> (
        AnalysisRunner,
        Arc<StubHost>,
        Arc<RecordingSink>,
        Arc<CannedProvider>,
    ) {
        let host = Arc::new(host);
        let sink = Arc::new(sink);
        let provider = Arc::new(provider);
        let runner = AnalysisRunner::new(
            Arc::clone(&host) as Arc<dyn RepoHost>,
            Arc::clone(&sink) as Arc<dyn CommentSink>,
            Arc::clone(&provider) as Arc<dyn Provider>,
        );
        (runner, host, sink, provider)
    }

    const FIX_RESPONSE: &str = r#"The docstring for `add` is missing.

```json
{
  "file_path": "app.py",
  "new_content": "def add(a, b):\n    \"\"\"Add two numbers.\"\"\"\n    return a + b\n",
  "commit_message": "docs: document add"
}
```"#;

    #[tokio::test]
    async fn empty_diff_skips_model_and_comment() {
        let host = StubHost {
            diff: String::new(),
            ..StubHost::default()
        };
        let (runner, _host, sink, provider) =
            runner(host, RecordingSink::default(), CannedProvider::answering("hi"));

        runner.run(request(AnalysisKind::Review)).await;

        assert_eq!(provider.calls(), 0);
        assert!(sink.comments.lock().is_empty());
    }

    #[tokio::test]
    async fn review_always_publishes_under_its_heading() {
        let (runner, _host, sink, _provider) = runner(
            StubHost::default(),
            RecordingSink::default(),
            CannedProvider::answering("Consider handling division by zero."),
        );

        runner.run(request(AnalysisKind::Review)).await;

        let comments = sink.comments.lock();
        assert_eq!(comments.len(), 1);
        let (number, body) = &comments[0];
        assert_eq!(*number, 7);
        assert!(body.starts_with(AnalysisKind::Review.heading()));
        assert!(body.contains("division by zero"));
    }

    #[tokio::test]
    async fn docs_applies_fix_and_appends_notice() {
        let (runner, host, sink, _provider) = runner(
            StubHost::default(),
            RecordingSink::default(),
            CannedProvider::answering(FIX_RESPONSE),
        );

        runner.run(request(AnalysisKind::Docs)).await;

        let updates = host.updates.lock();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].path, "app.py");
        assert!(updates[0].content.contains("Add two numbers."));
        assert_eq!(updates[0].message, "docs: document add");
        assert_eq!(updates[0].branch, "feature");

        let comments = sink.comments.lock();
        assert_eq!(comments.len(), 1);
        let body = &comments[0].1;
        assert!(body.contains("`app.py`"));
        assert!(body.contains("`feature`"));
        assert!(body.contains("fix applied"));
    }

    #[tokio::test]
    async fn docs_uses_default_commit_message_when_model_omits_one() {
        let response = "```json\n{\"file_path\": \"app.py\", \"new_content\": \"x = 1\\n\"}\n```";
        let (runner, host, _sink, _provider) = runner(
            StubHost::default(),
            RecordingSink::default(),
            CannedProvider::answering(response),
        );

        runner.run(request(AnalysisKind::Docs)).await;

        let updates = host.updates.lock();
        assert_eq!(updates[0].message, "docs: add missing docstrings");
    }

    #[tokio::test]
    async fn docs_sentinel_without_fix_suppresses_publication() {
        let (runner, host, sink, _provider) = runner(
            StubHost::default(),
            RecordingSink::default(),
            CannedProvider::answering(DOCS_SENTINEL),
        );

        runner.run(request(AnalysisKind::Docs)).await;

        assert!(host.updates.lock().is_empty());
        assert!(sink.comments.lock().is_empty());
    }

    #[tokio::test]
    async fn docs_fix_failure_publishes_without_notice() {
        let host = StubHost {
            update_error: Some("file app.py not found on branch feature".into()),
            ..StubHost::default()
        };
        let (runner, _host, sink, _provider) = runner(
            host,
            RecordingSink::default(),
            CannedProvider::answering(FIX_RESPONSE),
        );

        runner.run(request(AnalysisKind::Docs)).await;

        let comments = sink.comments.lock();
        assert_eq!(comments.len(), 1);
        assert!(!comments[0].1.contains("fix applied"));
    }

    #[tokio::test]
    async fn quality_sentinel_suppresses_publication() {
        let (runner, _host, sink, _provider) = runner(
            StubHost::default(),
            RecordingSink::default(),
            CannedProvider::answering(QUALITY_SENTINEL),
        );

        runner.run(request(AnalysisKind::Quality)).await;

        assert!(sink.comments.lock().is_empty());
    }

    #[tokio::test]
    async fn quality_findings_publish() {
        let (runner, _host, sink, _provider) = runner(
            StubHost::default(),
            RecordingSink::default(),
            CannedProvider::answering("Hardcoded password in settings.py."),
        );

        runner.run(request(AnalysisKind::Quality)).await;

        let comments = sink.comments.lock();
        assert_eq!(comments.len(), 1);
        assert!(comments[0].1.starts_with(AnalysisKind::Quality.heading()));
    }

    #[tokio::test]
    async fn triage_truncates_logs_and_publishes() {
        let long_logs = format!("{}TAIL MARKER", "x".repeat(20_000));
        let host = StubHost {
            logs: long_logs,
            ..StubHost::default()
        };
        let (runner, _host, sink, _provider) = runner(
            host,
            RecordingSink::default(),
            CannedProvider::answering("The build fails on a syntax error."),
        );

        runner.run(request(AnalysisKind::CiTriage)).await;

        assert_eq!(sink.comments.lock().len(), 1);
    }

    #[tokio::test]
    async fn model_failure_aborts_without_publication() {
        let (runner, host, sink, provider) = runner(
            StubHost::default(),
            RecordingSink::default(),
            CannedProvider::failing(),
        );

        runner.run(request(AnalysisKind::Docs)).await;

        assert_eq!(provider.calls(), 1);
        assert!(host.updates.lock().is_empty());
        assert!(sink.comments.lock().is_empty());
    }

    #[tokio::test]
    async fn publication_failure_is_contained() {
        let sink = RecordingSink {
            fail: true,
            ..RecordingSink::default()
        };
        let (runner, _host, _sink, _provider) = runner(
            StubHost::default(),
            sink,
            CannedProvider::answering("Looks risky."),
        );

        // Must not panic; the error is logged at the run boundary.
        runner.run(request(AnalysisKind::Review)).await;
    }

    #[test]
    fn tail_chars_respects_char_boundaries() {
        let text = format!("{}é-tail", "a".repeat(10));
        let tail = tail_chars(&text, 6);
        assert_eq!(tail, "é-tail");
        assert_eq!(tail_chars("short", 100), "short");
    }

    #[test]
    fn suppression_requires_exact_sentinel() {
        assert!(suppressed(AnalysisKind::Docs, DOCS_SENTINEL, false));
        assert!(suppressed(
            AnalysisKind::Docs,
            &format!("  {DOCS_SENTINEL}\n"),
            false
        ));
        assert!(!suppressed(AnalysisKind::Docs, DOCS_SENTINEL, true));
        assert!(!suppressed(
            AnalysisKind::Docs,
            &format!("{DOCS_SENTINEL} But one nit."),
            false
        ));
        assert!(!suppressed(AnalysisKind::Review, "anything", false));
        assert!(suppressed(AnalysisKind::Quality, QUALITY_SENTINEL, false));
    }
}
