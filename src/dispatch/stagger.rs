//! Fixed-delay stagger scheduling.
//!
//! The model service enforces a request-rate ceiling, so the analyses
//! triggered by one event are launched at fixed offsets instead of all
//! at once. Staggering is cooperative spacing, not admission control:
//! it lowers the collision probability, and the resilient provider
//! still retries when a collision happens anyway.
//!
//! Launches are fire-and-forget. The offset countdown for a later task
//! starts at the earlier task's launch, never at its completion, and a
//! launched task is never cancelled.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::analysis::AnalysisRequest;

// ── Executor seam ────────────────────────────────────────────────

/// Executes one analysis request. The production implementation is
/// [`crate::analysis::AnalysisRunner`]; tests inject a recorder.
#[async_trait]
pub trait AnalysisExecutor: Send + Sync {
    async fn execute(&self, request: AnalysisRequest);
}

// ── Scheduler ────────────────────────────────────────────────────

/// One task in a staggered launch plan.
#[derive(Debug)]
pub struct StaggeredTask {
    /// Launch offset measured from the `schedule` call.
    pub offset: Duration,
    pub request: AnalysisRequest,
}

/// Launches analysis tasks at fixed offsets from dispatch.
pub struct StaggerScheduler {
    executor: Arc<dyn AnalysisExecutor>,
}

impl StaggerScheduler {
    pub fn new(executor: Arc<dyn AnalysisExecutor>) -> Self {
        Self { executor }
    }

    /// Schedule `tasks` (ordered by offset) and return immediately.
    /// Each task is spawned on its own, so a slow analysis never
    /// delays the next launch.
    pub fn schedule(&self, tasks: Vec<StaggeredTask>) {
        let executor = Arc::clone(&self.executor);
        tokio::spawn(async move {
            let mut elapsed = Duration::ZERO;
            for task in tasks {
                tokio::time::sleep(task.offset.saturating_sub(elapsed)).await;
                elapsed = elapsed.max(task.offset);

                tracing::info!(
                    kind = task.request.kind.label(),
                    repo = %task.request.repo,
                    pr = task.request.pr_number,
                    offset_secs = task.offset.as_secs(),
                    "Launching analysis"
                );
                let executor = Arc::clone(&executor);
                tokio::spawn(async move {
                    executor.execute(task.request).await;
                });
            }
        });
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::AnalysisKind;
    use crate::github::RepoId;
    use parking_lot::Mutex;
    use tokio::time::Instant;

    struct RecordingExecutor {
        started: Instant,
        /// Sleep inside `execute`, to prove completion never gates
        /// later launches.
        busy_for: Duration,
        launches: Mutex<Vec<(AnalysisKind, u64)>>,
    }

    impl RecordingExecutor {
        fn new(busy_for: Duration) -> Self {
            Self {
                started: Instant::now(),
                busy_for,
                launches: Mutex::new(Vec::new()),
            }
        }

        fn launches(&self) -> Vec<(AnalysisKind, u64)> {
            self.launches.lock().clone()
        }
    }

    #[async_trait]
    impl AnalysisExecutor for RecordingExecutor {
        async fn execute(&self, request: AnalysisRequest) {
            self.launches
                .lock()
                .push((request.kind, self.started.elapsed().as_secs()));
            tokio::time::sleep(self.busy_for).await;
        }
    }

    fn task(offset_secs: u64, kind: AnalysisKind) -> StaggeredTask {
        StaggeredTask {
            offset: Duration::from_secs(offset_secs),
            request: AnalysisRequest {
                installation: 1,
                repo: RepoId::parse("octocat/demo").unwrap(),
                pr_number: 7,
                kind,
                run_id: None,
            },
        }
    }

    #[tokio::test(start_paused = true)]
    async fn launches_follow_the_declared_offsets() {
        let executor = Arc::new(RecordingExecutor::new(Duration::ZERO));
        let scheduler = StaggerScheduler::new(Arc::clone(&executor) as Arc<dyn AnalysisExecutor>);

        scheduler.schedule(vec![
            task(5, AnalysisKind::Review),
            task(35, AnalysisKind::Docs),
            task(65, AnalysisKind::Quality),
        ]);

        tokio::time::sleep(Duration::from_secs(70)).await;
        assert_eq!(
            executor.launches(),
            vec![
                (AnalysisKind::Review, 5),
                (AnalysisKind::Docs, 35),
                (AnalysisKind::Quality, 65),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn slow_tasks_never_delay_later_launches() {
        // Each analysis runs far longer than the whole stagger window.
        let executor = Arc::new(RecordingExecutor::new(Duration::from_secs(600)));
        let scheduler = StaggerScheduler::new(Arc::clone(&executor) as Arc<dyn AnalysisExecutor>);

        scheduler.schedule(vec![
            task(5, AnalysisKind::Review),
            task(35, AnalysisKind::Docs),
            task(65, AnalysisKind::Quality),
        ]);

        tokio::time::sleep(Duration::from_secs(70)).await;
        assert_eq!(
            executor
                .launches()
                .iter()
                .map(|(_, at)| *at)
                .collect::<Vec<_>>(),
            vec![5, 35, 65]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn single_task_plan_launches_once() {
        let executor = Arc::new(RecordingExecutor::new(Duration::ZERO));
        let scheduler = StaggerScheduler::new(Arc::clone(&executor) as Arc<dyn AnalysisExecutor>);

        scheduler.schedule(vec![task(10, AnalysisKind::CiTriage)]);

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(executor.launches(), vec![(AnalysisKind::CiTriage, 10)]);
    }
}
