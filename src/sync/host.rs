//! Background job runner standing in for an OS job scheduler.
//!
//! Jobs are identified by [`JobId`]; scheduling an id that is already pending
//! replaces the earlier instance, so at most one instance per id exists.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep};

use crate::network::NetworkProbe;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(pub u32);

impl JobId {
    pub const PERIODIC: JobId = JobId(1);
    pub const ONE_OFF: JobId = JobId(2);
}

/// Exponential backoff between failed attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub max: Duration,
}

impl BackoffPolicy {
    pub fn exponential(initial: Duration, max: Duration) -> Self {
        Self { initial, max }
    }

    /// Delay after the `attempt`-th failure (0-based): initial * 2^attempt, capped
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.initial
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobSpec {
    pub id: JobId,
    /// Run repeatedly at this interval; `None` runs once
    pub period: Option<Duration>,
    pub requires_network: bool,
    pub backoff: BackoffPolicy,
}

impl JobSpec {
    pub fn one_off(id: JobId, backoff: BackoffPolicy) -> Self {
        Self {
            id,
            period: None,
            requires_network: false,
            backoff,
        }
    }

    pub fn periodic(id: JobId, period: Duration, backoff: BackoffPolicy) -> Self {
        Self {
            period: Some(period),
            ..Self::one_off(id, backoff)
        }
    }

    pub fn with_network(mut self) -> Self {
        self.requires_network = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Done,
    /// Failed; run again after the backoff delay
    Retry,
}

#[async_trait]
pub trait Job: Send + Sync {
    async fn run(&self) -> JobOutcome;
}

#[async_trait]
pub trait JobScheduler: Send + Sync {
    /// Schedule `job`, replacing any pending instance with the same id
    async fn schedule(&self, spec: JobSpec, job: Arc<dyn Job>);

    /// Returns whether a pending instance was cancelled
    async fn cancel(&self, id: JobId) -> bool;

    async fn is_pending(&self, id: JobId) -> bool;
}

/// [`JobScheduler`] running each job on its own tokio task
pub struct TokioJobScheduler {
    probe: Arc<dyn NetworkProbe>,
    probe_interval: Duration,
    jobs: Mutex<HashMap<JobId, JoinHandle<()>>>,
}

impl TokioJobScheduler {
    pub fn new(probe: Arc<dyn NetworkProbe>, probe_interval: Duration) -> Self {
        Self {
            probe,
            probe_interval,
            jobs: Mutex::new(HashMap::new()),
        }
    }
}

impl Drop for TokioJobScheduler {
    fn drop(&mut self) {
        for handle in self.jobs.get_mut().values() {
            handle.abort();
        }
    }
}

async fn wait_for_network(probe: &dyn NetworkProbe, poll: Duration) {
    while !probe.has_connection().await {
        sleep(poll).await;
    }
}

/// One logical execution: retried with backoff until the job reports done
async fn run_until_done(spec: &JobSpec, job: &dyn Job, probe: &dyn NetworkProbe, poll: Duration) {
    let mut attempt = 0;
    loop {
        if spec.requires_network {
            wait_for_network(probe, poll).await;
        }

        match job.run().await {
            JobOutcome::Done => return,
            JobOutcome::Retry => {
                let delay = spec.backoff.delay_for(attempt);
                log::warn!("Job {:?} failed (attempt {}), retrying in {:?}", spec.id, attempt + 1, delay);
                attempt = attempt.saturating_add(1);
                sleep(delay).await;
            }
        }
    }
}

async fn drive(spec: JobSpec, job: Arc<dyn Job>, probe: Arc<dyn NetworkProbe>, poll: Duration) {
    match spec.period {
        Some(period) => {
            // The first run happens one period after scheduling
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                run_until_done(&spec, job.as_ref(), probe.as_ref(), poll).await;
                // Ticks missed while waiting on the network collapse into this run
                ticker.reset();
            }
        }
        None => run_until_done(&spec, job.as_ref(), probe.as_ref(), poll).await,
    }
}

#[async_trait]
impl JobScheduler for TokioJobScheduler {
    async fn schedule(&self, spec: JobSpec, job: Arc<dyn Job>) {
        let handle = tokio::spawn(drive(spec, job, self.probe.clone(), self.probe_interval));

        let mut jobs = self.jobs.lock().await;
        if let Some(previous) = jobs.insert(spec.id, handle) {
            if !previous.is_finished() {
                log::debug!("Replacing pending job {:?}", spec.id);
            }
            previous.abort();
        }
        log::info!("Scheduled job {:?} (period: {:?}, network: {})", spec.id, spec.period, spec.requires_network);
    }

    async fn cancel(&self, id: JobId) -> bool {
        match self.jobs.lock().await.remove(&id) {
            Some(handle) => {
                let pending = !handle.is_finished();
                handle.abort();
                pending
            }
            None => false,
        }
    }

    async fn is_pending(&self, id: JobId) -> bool {
        self.jobs
            .lock()
            .await
            .get(&id)
            .is_some_and(|handle| !handle.is_finished())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CountingJob, StaticProbe};

    fn backoff() -> BackoffPolicy {
        BackoffPolicy::exponential(Duration::from_secs(10), Duration::from_secs(60))
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = backoff();
        assert_eq!(policy.delay_for(0), Duration::from_secs(10));
        assert_eq!(policy.delay_for(1), Duration::from_secs(20));
        assert_eq!(policy.delay_for(2), Duration::from_secs(40));
        assert_eq!(policy.delay_for(3), Duration::from_secs(60));
        assert_eq!(policy.delay_for(40), Duration::from_secs(60));
    }

    #[test]
    fn test_job_spec_builders() {
        let spec = JobSpec::periodic(JobId::PERIODIC, Duration::from_secs(300), backoff()).with_network();
        assert_eq!(spec.period, Some(Duration::from_secs(300)));
        assert!(spec.requires_network);

        let spec = JobSpec::one_off(JobId::ONE_OFF, backoff());
        assert_eq!(spec.period, None);
        assert!(!spec.requires_network);
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_constrained_job_waits_for_connectivity() {
        let probe = Arc::new(StaticProbe::new(false));
        let scheduler = TokioJobScheduler::new(probe.clone(), Duration::from_secs(5));
        let job = Arc::new(CountingJob::new(0));

        scheduler
            .schedule(JobSpec::one_off(JobId::ONE_OFF, backoff()).with_network(), job.clone())
            .await;

        sleep(Duration::from_secs(60)).await;
        assert_eq!(job.runs(), 0);
        assert!(scheduler.is_pending(JobId::ONE_OFF).await);

        probe.set(true);
        sleep(Duration::from_secs(6)).await;
        assert_eq!(job.runs(), 1);
        assert!(!scheduler.is_pending(JobId::ONE_OFF).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_job_is_retried_with_backoff() {
        let scheduler = TokioJobScheduler::new(Arc::new(StaticProbe::new(true)), Duration::from_secs(5));
        let job = Arc::new(CountingJob::new(2));

        scheduler
            .schedule(JobSpec::one_off(JobId::ONE_OFF, backoff()), job.clone())
            .await;

        sleep(Duration::from_secs(1)).await;
        assert_eq!(job.runs(), 1);

        // First retry after 10s
        sleep(Duration::from_secs(10)).await;
        assert_eq!(job.runs(), 2);

        // Second retry 20s later succeeds
        sleep(Duration::from_secs(20)).await;
        assert_eq!(job.runs(), 3);

        sleep(Duration::from_secs(120)).await;
        assert_eq!(job.runs(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_job_runs_every_period() {
        let scheduler = TokioJobScheduler::new(Arc::new(StaticProbe::new(true)), Duration::from_secs(5));
        let job = Arc::new(CountingJob::new(0));

        scheduler
            .schedule(
                JobSpec::periodic(JobId::PERIODIC, Duration::from_secs(300), backoff()),
                job.clone(),
            )
            .await;

        sleep(Duration::from_secs(299)).await;
        assert_eq!(job.runs(), 0);

        sleep(Duration::from_secs(2)).await;
        assert_eq!(job.runs(), 1);

        sleep(Duration::from_secs(600)).await;
        assert_eq!(job.runs(), 3);
        assert!(scheduler.is_pending(JobId::PERIODIC).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_job_runs_once_after_long_outage() {
        let probe = Arc::new(StaticProbe::new(false));
        let scheduler = TokioJobScheduler::new(probe.clone(), Duration::from_secs(5));
        let job = Arc::new(CountingJob::new(0));

        scheduler
            .schedule(
                JobSpec::periodic(JobId::PERIODIC, Duration::from_secs(300), backoff()).with_network(),
                job.clone(),
            )
            .await;

        sleep(Duration::from_secs(3600)).await;
        assert_eq!(job.runs(), 0);

        probe.set(true);
        sleep(Duration::from_secs(10)).await;
        assert_eq!(job.runs(), 1);

        sleep(Duration::from_secs(300)).await;
        assert_eq!(job.runs(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rescheduling_replaces_pending_instance() {
        let probe = Arc::new(StaticProbe::new(false));
        let scheduler = TokioJobScheduler::new(probe.clone(), Duration::from_secs(5));
        let first = Arc::new(CountingJob::new(0));
        let second = Arc::new(CountingJob::new(0));
        let spec = JobSpec::one_off(JobId::ONE_OFF, backoff()).with_network();

        scheduler.schedule(spec, first.clone()).await;
        scheduler.schedule(spec, second.clone()).await;

        probe.set(true);
        sleep(Duration::from_secs(10)).await;

        assert_eq!(first.runs(), 0);
        assert_eq!(second.runs(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel() {
        let scheduler = TokioJobScheduler::new(Arc::new(StaticProbe::new(false)), Duration::from_secs(5));
        let job = Arc::new(CountingJob::new(0));

        scheduler
            .schedule(JobSpec::one_off(JobId::ONE_OFF, backoff()).with_network(), job)
            .await;

        assert!(scheduler.cancel(JobId::ONE_OFF).await);
        assert!(!scheduler.cancel(JobId::ONE_OFF).await);
        assert!(!scheduler.is_pending(JobId::ONE_OFF).await);
    }
}
