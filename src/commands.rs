use anyhow::{Context, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::scheduler::{JobControl, JobFn, JobScheduler};
use crate::storage::Storage;

/// Key-value key holding the id of our registered sync job.
pub const JOB_ID_KEY: &str = "sync|job-id";
pub const SYNC_JOB_NAME: &str = "widget-sync";

const GENERIC_FAILURE: &str = "Something went wrong. Check the logs for details.";

/// Short message shown to whoever triggered a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandNotice {
    pub ok: bool,
    pub message: String,
}

impl CommandNotice {
    pub fn success(message: impl Into<String>) -> Self { Self { ok: true, message: message.into() } }
    pub fn failure() -> Self { Self { ok: false, message: GENERIC_FAILURE.to_string() } }
}

/// Turn a command result into a notice; errors are logged in full and
/// replaced by a generic message.
pub fn notice_for<T>(command: &str, result: Result<T>, on_success: impl FnOnce(T) -> String) -> CommandNotice {
    match result {
        Ok(v) => CommandNotice::success(on_success(v)),
        Err(e) => {
            error!(command, error = ?e, "command failed");
            CommandNotice::failure()
        }
    }
}

/// One periodic sync run.
pub type SyncWork = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Start/stop/re-arm handlers for the periodic sync job.
pub struct SyncCommands {
    storage: Arc<dyn Storage>,
    scheduler: Arc<JobScheduler>,
}

impl SyncCommands {
    pub fn new(storage: Arc<dyn Storage>, scheduler: Arc<JobScheduler>) -> Self { Self { storage, scheduler } }

    pub async fn job_id(&self) -> Result<Option<String>> { self.storage.get(JOB_ID_KEY).await.context("reading job id") }

    /// Schedule the sync job, replacing one we registered earlier.
    pub async fn start(&self, every: Duration, work: SyncWork) -> Result<String> {
        if let Some(previous) = self.job_id().await? {
            if self.scheduler.cancel(&previous) {
                info!(job_id = %previous, "replacing running sync job");
            }
        }
        self.register(every, work).await
    }

    /// Cancel the sync job and forget its id. Returns `false` if none was active.
    pub async fn stop(&self) -> Result<bool> {
        let Some(id) = self.job_id().await? else {
            return Ok(false);
        };
        self.scheduler.cancel(&id);
        self.storage.delete(JOB_ID_KEY).await.context("clearing job id")?;
        info!(job_id = %id, "sync stopped");
        Ok(true)
    }

    /// After an upgrade or restart: re-arm only if a job was active before
    /// and is no longer registered. Returns the new job id when re-armed.
    pub async fn on_upgrade(&self, every: Duration, work: SyncWork) -> Result<Option<String>> {
        let Some(previous) = self.job_id().await? else {
            return Ok(None);
        };
        if self.scheduler.is_registered(&previous) {
            return Ok(None);
        }
        info!(job_id = %previous, "previous sync job not registered, re-arming");
        self.register(every, work).await.map(Some)
    }

    async fn register(&self, every: Duration, work: SyncWork) -> Result<String> {
        let id = self.scheduler.schedule(SYNC_JOB_NAME, every, owned_job(self.storage.clone(), work))?;
        if let Err(e) = self.storage.set(JOB_ID_KEY, &id).await {
            self.scheduler.cancel(&id);
            return Err(e).context("storing job id");
        }
        Ok(id)
    }
}

/// Wrap `work` so each tick first checks that the persisted job id is still
/// this job's. A `stop` or `start` from another process changes that id, and
/// the job then ends its own loop.
fn owned_job(storage: Arc<dyn Storage>, work: SyncWork) -> JobFn {
    Arc::new(move |job_id: String| {
        let storage = storage.clone();
        let work = work.clone();
        async move {
            match storage.get(JOB_ID_KEY).await {
                Ok(Some(current)) if current == job_id => {
                    work().await;
                    JobControl::Continue
                }
                Ok(current) => {
                    info!(%job_id, current = ?current, "sync job no longer active, stopping");
                    JobControl::Stop
                }
                Err(e) => {
                    warn!(%job_id, error = ?e, "could not read job id, skipping this run");
                    JobControl::Continue
                }
            }
        }
        .boxed()
    })
}
