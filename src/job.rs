//! Background scan jobs: a scan spawned onto the runtime plus a handle to poll it.
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::scanner::{ScanContext, SharedProgress};
use crate::types::{ScanConfig, ScanOutcome, ScanStats};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Running,
    Completed,
    Failed,
}

#[derive(Debug)]
enum JobSlot {
    Pending,
    Done(ScanOutcome),
    Failed(String),
}

/// Handle to one spawned scan. Dropping it does not stop the scan; call [`ScanJob::cancel`].
#[derive(Debug)]
pub struct ScanJob {
    id: u64,
    total: usize,
    config: ScanConfig,
    progress: SharedProgress,
    cancel: CancellationToken,
    slot: Arc<RwLock<JobSlot>>,
    handle: JoinHandle<()>,
}

impl ScanJob {
    /// Spawn `urls` as a scan on the current runtime.
    pub fn spawn(id: u64, urls: Vec<String>, config: ScanConfig, concurrency: usize) -> Self {
        let progress = SharedProgress::new();
        let cancel = CancellationToken::new();
        let ctx = ScanContext::new(config.clone())
            .with_concurrency(concurrency)
            .with_cancel(cancel.clone())
            .with_progress(progress.clone());
        let slot = Arc::new(RwLock::new(JobSlot::Pending));
        let total = urls.len();

        let task_slot = slot.clone();
        let handle = tokio::spawn(async move {
            let outcome = ctx.run(&urls).await;
            let mut slot = task_slot.write().await;
            *slot = match outcome {
                Ok(outcome) => JobSlot::Done(outcome),
                Err(e) => {
                    error!(scan_id = id, "scan error: {e}");
                    JobSlot::Failed(e.to_string())
                }
            };
        });

        Self {
            id,
            total,
            config,
            progress,
            cancel,
            slot,
            handle,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn progress(&self) -> &SharedProgress {
        &self.progress
    }

    pub async fn state(&self) -> JobState {
        match &*self.slot.read().await {
            JobSlot::Pending if self.handle.is_finished() => JobState::Failed,
            JobSlot::Pending => JobState::Running,
            JobSlot::Done(_) => JobState::Completed,
            JobSlot::Failed(_) => JobState::Failed,
        }
    }

    pub async fn stats(&self) -> ScanStats {
        self.progress.stats().await
    }

    /// The finished outcome, once the scan has completed.
    pub async fn outcome(&self) -> Option<ScanOutcome> {
        match &*self.slot.read().await {
            JobSlot::Done(outcome) => Some(outcome.clone()),
            _ => None,
        }
    }

    pub async fn error(&self) -> Option<String> {
        match &*self.slot.read().await {
            JobSlot::Failed(msg) => Some(msg.clone()),
            JobSlot::Pending if self.handle.is_finished() => {
                Some("scan task terminated unexpectedly".to_string())
            }
            _ => None,
        }
    }

    /// Stop admitting probes; in-flight ones finish and the outcome is marked incomplete.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
