use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;

use super::host::{BackoffPolicy, Job, JobId, JobScheduler, JobSpec};
use super::job::QuoteSyncJob;
use crate::network::NetworkProbe;

/// Timing for the recurring and deferred sync jobs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleConfig {
    pub period: Duration,
    pub backoff: BackoffPolicy,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(300),
            backoff: BackoffPolicy::exponential(
                Duration::from_millis(10_000),
                Duration::from_secs(5 * 60 * 60),
            ),
        }
    }
}

/// How a sync request was dispatched
#[derive(Debug)]
pub enum SyncDispatch {
    /// Running now on a background task
    Immediate(JoinHandle<()>),
    /// Queued until the network is reachable
    Deferred,
}

impl SyncDispatch {
    pub fn is_deferred(&self) -> bool {
        matches!(self, SyncDispatch::Deferred)
    }
}

/// Decides whether quote syncs run right away or wait for connectivity
pub struct SyncScheduler {
    job: Arc<QuoteSyncJob>,
    host: Arc<dyn JobScheduler>,
    probe: Arc<dyn NetworkProbe>,
    config: ScheduleConfig,
    initialized: AtomicBool,
}

impl SyncScheduler {
    pub fn new(
        job: Arc<QuoteSyncJob>,
        host: Arc<dyn JobScheduler>,
        probe: Arc<dyn NetworkProbe>,
        config: ScheduleConfig,
    ) -> Self {
        Self {
            job,
            host,
            probe,
            config,
            initialized: AtomicBool::new(false),
        }
    }

    /// Install the periodic sync and kick off a first one.
    /// Only the first call has an effect.
    pub async fn initialize(&self) -> Option<SyncDispatch> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            log::debug!("Sync scheduler already initialized");
            return None;
        }

        self.schedule_periodic().await;
        Some(self.sync_immediately().await)
    }

    async fn schedule_periodic(&self) {
        let spec = JobSpec::periodic(JobId::PERIODIC, self.config.period, self.config.backoff)
            .with_network();
        self.host.schedule(spec, self.job.clone()).await;
    }

    /// Sync now if the network is reachable, otherwise defer until it is
    pub async fn sync_immediately(&self) -> SyncDispatch {
        if self.probe.has_connection().await {
            let job = self.job.clone();
            let handle = tokio::spawn(async move {
                if let Err(e) = job.run_cycle().await {
                    log::warn!("Immediate sync failed: {e}");
                }
            });
            SyncDispatch::Immediate(handle)
        } else {
            log::info!("No network, deferring sync until connectivity returns");
            let spec = JobSpec::one_off(JobId::ONE_OFF, self.config.backoff).with_network();
            let job: Arc<dyn Job> = self.job.clone();
            self.host.schedule(spec, job).await;
            SyncDispatch::Deferred
        }
    }

    pub async fn has_connection(&self) -> bool {
        self.probe.has_connection().await
    }
}
