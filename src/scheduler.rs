use crate::error::{MeapisError, Result};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Identity of the single recurring capture job
pub const CAPTURE_JOB_ID: &str = "picture_taking_task";

#[derive(Debug, Default)]
struct JobStats {
    ticks: AtomicU64,
    failures: AtomicU64,
}

struct ScheduledJob {
    interval: Duration,
    token: CancellationToken,
    handle: JoinHandle<()>,
    stats: Arc<JobStats>,
}

impl ScheduledJob {
    /// Stop future ticks and wait for a running one to finish
    async fn shutdown(self) {
        self.token.cancel();
        if let Err(e) = self.handle.await {
            error!("Job {} ended abnormally: {}", CAPTURE_JOB_ID, e);
        }
    }
}

/// Runs at most one recurring job.
///
/// Ticks never overlap; a tick that falls due while the previous one is
/// still running is delayed, not doubled up.
#[derive(Default)]
pub struct CaptureScheduler {
    job: Mutex<Option<ScheduledJob>>,
}

impl CaptureScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `job` every `interval`, replacing any scheduled job.
    ///
    /// With `run_immediately` the first tick fires right away, otherwise
    /// after one interval. Errors and panics of a tick are logged and the
    /// schedule carries on.
    pub async fn schedule<F, Fut>(
        &self,
        interval: Duration,
        run_immediately: bool,
        job: F,
    ) -> Result<()>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        if interval.is_zero() {
            return Err(MeapisError::system("job interval must be greater than zero"));
        }

        let mut slot = self.job.lock().await;
        if let Some(previous) = slot.take() {
            info!("Replacing scheduled job {}", CAPTURE_JOB_ID);
            previous.shutdown().await;
        }

        let token = CancellationToken::new();
        let stats = Arc::new(JobStats::default());
        let handle = tokio::spawn(run_job(
            job,
            interval,
            run_immediately,
            token.clone(),
            Arc::clone(&stats),
        ));

        *slot = Some(ScheduledJob {
            interval,
            token,
            handle,
            stats,
        });

        info!(
            "Scheduled job {} every {:?}{}",
            CAPTURE_JOB_ID,
            interval,
            if run_immediately { ", starting now" } else { "" }
        );
        Ok(())
    }

    /// Remove the scheduled job, waiting for a running tick to complete.
    ///
    /// Returns `false` when nothing was scheduled.
    pub async fn cancel(&self) -> bool {
        let job = self.job.lock().await.take();
        match job {
            Some(job) => {
                job.shutdown().await;
                info!("Removed job {}", CAPTURE_JOB_ID);
                true
            }
            None => {
                debug!("Job {} not found", CAPTURE_JOB_ID);
                false
            }
        }
    }

    pub async fn is_scheduled(&self) -> bool {
        self.job.lock().await.is_some()
    }

    pub async fn interval(&self) -> Option<Duration> {
        self.job.lock().await.as_ref().map(|job| job.interval)
    }

    /// Ticks started by the current job
    pub async fn tick_count(&self) -> Option<u64> {
        self.job
            .lock()
            .await
            .as_ref()
            .map(|job| job.stats.ticks.load(Ordering::Relaxed))
    }

    /// Ticks of the current job that failed or panicked
    pub async fn failure_count(&self) -> Option<u64> {
        self.job
            .lock()
            .await
            .as_ref()
            .map(|job| job.stats.failures.load(Ordering::Relaxed))
    }
}

async fn run_job<F, Fut>(
    job: F,
    interval: Duration,
    run_immediately: bool,
    token: CancellationToken,
    stats: Arc<JobStats>,
) where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let start = if run_immediately {
        Instant::now()
    } else {
        Instant::now() + interval
    };
    let mut ticker = tokio::time::interval_at(start, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let tick = stats.ticks.fetch_add(1, Ordering::Relaxed) + 1;
        debug!("Job {} tick {}", CAPTURE_JOB_ID, tick);

        // Own task so a panic is contained to this tick
        match tokio::spawn(job()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                stats.failures.fetch_add(1, Ordering::Relaxed);
                error!("Job {} tick {} failed: {}", CAPTURE_JOB_ID, tick, e);
            }
            Err(e) if e.is_panic() => {
                stats.failures.fetch_add(1, Ordering::Relaxed);
                error!("Job {} tick {} panicked", CAPTURE_JOB_ID, tick);
            }
            Err(e) => {
                stats.failures.fetch_add(1, Ordering::Relaxed);
                warn!("Job {} tick {} was cancelled: {}", CAPTURE_JOB_ID, tick, e);
            }
        }
    }

    debug!("Job {} stopped after {} ticks", CAPTURE_JOB_ID, stats.ticks.load(Ordering::Relaxed));
}
