use std::sync::Arc;

use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::{ProbeError, TransportError};
use crate::probe::{failure_result, probe};
use crate::transport::{HttpTransport, Transport};
use crate::types::{ProbeResult, ScanConfig, ScanOutcome, ScanStats};

pub const DEFAULT_CONCURRENCY: usize = 20;
pub const MAX_CONCURRENCY: usize = 5_000;

/// Probe every URL with at most `concurrency` requests in flight.
///
/// Builds one [`HttpTransport`] (and its connection pool) for the whole batch and drops it
/// once the batch is done. The only error is failing to build that transport.
pub async fn scan(
    urls: &[String],
    config: ScanConfig,
    concurrency: usize,
) -> Result<ScanOutcome, TransportError> {
    ScanContext::new(config)
        .with_concurrency(concurrency)
        .run(urls)
        .await
}

/// [`scan`] that stops admitting probes once `cancel` fires. URLs never admitted come back
/// as `Cancelled` network errors and the outcome is flagged `incomplete`.
pub async fn scan_with_cancel(
    urls: &[String],
    config: ScanConfig,
    concurrency: usize,
    cancel: CancellationToken,
) -> Result<ScanOutcome, TransportError> {
    ScanContext::new(config)
        .with_concurrency(concurrency)
        .with_cancel(cancel)
        .run(urls)
        .await
}

/// Receives each probe result as it completes, together with the stats right after it was counted.
///
/// Called on the probe's completion path after its admission slot is released, so a slow
/// observer never holds a slot. Anything expensive belongs behind a [`ChannelObserver`].
pub trait ScanObserver: Send + Sync {
    fn on_result(&self, result: &ProbeResult, stats: &ScanStats);
}

impl<F> ScanObserver for F
where
    F: Fn(&ProbeResult, &ScanStats) + Send + Sync,
{
    fn on_result(&self, result: &ProbeResult, stats: &ScanStats) {
        self(result, stats)
    }
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub result: ProbeResult,
    pub stats: ScanStats,
}

/// Forwards completions into a bounded queue. Events are dropped while the queue is full.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::Sender<ProgressEvent>,
}

impl ChannelObserver {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ProgressEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl ScanObserver for ChannelObserver {
    fn on_result(&self, result: &ProbeResult, stats: &ScanStats) {
        let event = ProgressEvent {
            result: result.clone(),
            stats: *stats,
        };
        if let Err(e) = self.tx.try_send(event) {
            debug!("progress event dropped: {e}");
        }
    }
}

#[derive(Debug, Default)]
struct ProgressState {
    stats: ScanStats,
    results: Vec<ProbeResult>,
    recorded: Vec<bool>,
}

/// Live view of a scan's stats and results, cheap to clone and poll from elsewhere.
#[derive(Clone, Debug, Default)]
pub struct SharedProgress {
    state: Arc<Mutex<ProgressState>>,
}

impl SharedProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn stats(&self) -> ScanStats {
        self.state.lock().await.stats
    }

    /// Results so far, in completion order.
    pub async fn results(&self) -> Vec<ProbeResult> {
        self.state.lock().await.results.clone()
    }

    async fn begin(&self, total: usize) {
        let mut state = self.state.lock().await;
        *state = ProgressState {
            stats: ScanStats::new(total),
            results: Vec::with_capacity(total),
            recorded: vec![false; total],
        };
    }

    /// Count and store the result for URL `index`. Returns the stats snapshot, or `None`
    /// if that URL was already recorded.
    async fn record(&self, index: usize, result: ProbeResult) -> Option<ScanStats> {
        let mut state = self.state.lock().await;
        match state.recorded.get_mut(index) {
            Some(seen) if !*seen => *seen = true,
            _ => return None,
        }
        state.stats.record(result.status_code);
        state.results.push(result);
        Some(state.stats)
    }

    async fn unrecorded(&self, admitted: usize) -> Vec<usize> {
        let state = self.state.lock().await;
        state
            .recorded
            .iter()
            .take(admitted)
            .enumerate()
            .filter_map(|(i, seen)| (!seen).then_some(i))
            .collect()
    }

    async fn snapshot(&self) -> (Vec<ProbeResult>, ScanStats) {
        let state = self.state.lock().await;
        (state.results.clone(), state.stats)
    }
}

/// Per-scan state: config, admission limit, observer, cancellation and progress.
#[derive(Clone)]
pub struct ScanContext {
    config: Arc<ScanConfig>,
    concurrency: usize,
    observer: Option<Arc<dyn ScanObserver>>,
    cancel: CancellationToken,
    progress: SharedProgress,
}

impl ScanContext {
    pub fn new(config: ScanConfig) -> Self {
        Self {
            config: Arc::new(config),
            concurrency: DEFAULT_CONCURRENCY,
            observer: None,
            cancel: CancellationToken::new(),
            progress: SharedProgress::new(),
        }
    }

    /// Clamped to `1..=MAX_CONCURRENCY`.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.clamp(1, MAX_CONCURRENCY);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ScanObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, progress: SharedProgress) -> Self {
        self.progress = progress;
        self
    }

    pub fn progress(&self) -> &SharedProgress {
        &self.progress
    }

    /// Run the batch over a fresh [`HttpTransport`].
    pub async fn run(&self, urls: &[String]) -> Result<ScanOutcome, TransportError> {
        let transport = HttpTransport::new(&self.config).map_err(|e| {
            error!("transport initialization failed: {e}");
            e
        })?;
        Ok(self.run_with_transport(Arc::new(transport), urls).await)
    }

    /// Run the batch over `transport`, which is dropped by the time this returns.
    ///
    /// - A `Semaphore` gates admission; each probe task owns its permit.
    /// - Each task records its own result, so stats advance while dispatch is still going.
    /// - A task that dies without recording still yields an `Unexpected` network error.
    /// - Cancellation stops admission; admitted probes run to completion and every URL
    ///   never admitted gets a `Cancelled` network error, so results still cover every URL.
    pub async fn run_with_transport(
        &self,
        transport: Arc<dyn Transport>,
        urls: &[String],
    ) -> ScanOutcome {
        let started = Instant::now();
        self.progress.begin(urls.len()).await;
        info!(
            total = urls.len(),
            concurrency = self.concurrency,
            "starting scan"
        );

        let sem = Arc::new(Semaphore::new(self.concurrency));
        let mut set = JoinSet::new();
        let mut admitted = 0usize;

        for (index, url) in urls.iter().enumerate() {
            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                permit = sem.clone().acquire_owned() => match permit {
                    Ok(p) => p,
                    Err(_) => break,
                },
            };
            admitted += 1;

            let transport = transport.clone();
            let config = self.config.clone();
            let progress = self.progress.clone();
            let observer = self.observer.clone();
            let url = url.clone();

            set.spawn(async move {
                let result = probe(transport.as_ref(), &url, &config).await;
                drop(permit);
                complete(&progress, observer.as_deref(), index, result).await;
            });
        }

        while let Some(joined) = set.join_next().await {
            if let Err(e) = joined {
                error!("probe task failed: {e}");
            }
        }
        drop(transport);

        for index in self.progress.unrecorded(admitted).await {
            let err = ProbeError::Unexpected("probe task terminated before producing a result".into());
            let result = failure_result(&urls[index], &err, 0.0);
            complete(&self.progress, self.observer.as_deref(), index, result).await;
        }

        let incomplete = admitted < urls.len();
        if incomplete {
            info!(skipped = urls.len() - admitted, "scan cancelled before all URLs were admitted");
        }
        for (index, url) in urls.iter().enumerate().skip(admitted) {
            let result = failure_result(url, &ProbeError::Cancelled, 0.0);
            complete(&self.progress, self.observer.as_deref(), index, result).await;
        }

        let (results, stats) = self.progress.snapshot().await;
        info!(
            completed = stats.completed,
            success = stats.success,
            network_errors = stats.network_errors,
            incomplete,
            "scan finished in {:.2?}",
            started.elapsed()
        );

        ScanOutcome {
            results,
            stats,
            incomplete,
        }
    }
}

async fn complete(
    progress: &SharedProgress,
    observer: Option<&dyn ScanObserver>,
    index: usize,
    result: ProbeResult,
) {
    match observer {
        Some(observer) => {
            if let Some(stats) = progress.record(index, result.clone()).await {
                observer.on_result(&result, &stats);
            }
        }
        None => {
            progress.record(index, result).await;
        }
    }
}
