/// Quote synchronisation: the fetch-and-persist job and its scheduling
pub mod events;
pub mod host;
pub mod job;
pub mod scheduler;

pub use events::{SyncEvent, SyncEvents};
pub use host::{BackoffPolicy, Job, JobId, JobOutcome, JobScheduler, JobSpec, TokioJobScheduler};
pub use job::{QuoteSyncJob, SyncError, SyncReport};
pub use scheduler::{ScheduleConfig, SyncDispatch, SyncScheduler};
