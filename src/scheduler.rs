//! In-process recurring job registry.
//!
//! Each scheduled job gets its own tokio task that waits one interval, runs
//! the job to completion, and waits again. Ticks missed while a run is still
//! in flight are dropped, so a job never overlaps itself. Cancellation is only
//! observed between runs; a run that has started always finishes. Registrations
//! live only as long as the process; callers persist job ids themselves and use
//! [`JobScheduler::is_registered`] to detect a restart.

use anyhow::{ensure, Result};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// What a job wants after a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobControl {
    Continue,
    /// End the job's loop and drop its registration.
    Stop,
}

/// Job body invoked on every tick with the job's own id.
pub type JobFn = Arc<dyn Fn(String) -> BoxFuture<'static, JobControl> + Send + Sync>;

/// Public view of a registered job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobInfo {
    pub id: String,
    pub name: String,
    pub every: Duration,
}

struct RegisteredJob {
    info: JobInfo,
    cancel: CancellationToken,
}

type Registry = Arc<Mutex<HashMap<String, RegisteredJob>>>;

#[derive(Default)]
pub struct JobScheduler {
    jobs: Registry,
}

impl JobScheduler {
    pub fn new() -> Self { Self::default() }

    /// Register `job` to run every `every`, first run one interval from now.
    /// Must be called from within a tokio runtime.
    pub fn schedule(&self, name: &str, every: Duration, job: JobFn) -> Result<String> {
        ensure!(!every.is_zero(), "job interval must be greater than zero");

        let id = uuid::Uuid::new_v4().to_string();
        let cancel = CancellationToken::new();
        let info = JobInfo { id: id.clone(), name: name.to_string(), every };
        lock(&self.jobs).insert(id.clone(), RegisteredJob { info, cancel: cancel.clone() });

        tokio::spawn(run_every(id.clone(), name.to_string(), every, job, cancel, self.jobs.clone()));
        info!(job_id = %id, job = name, every_secs = every.as_secs(), "job scheduled");
        Ok(id)
    }

    /// Stop a job after its current run, if any. Returns `false` if no job with that id is registered.
    pub fn cancel(&self, id: &str) -> bool {
        match lock(&self.jobs).remove(id) {
            Some(job) => {
                job.cancel.cancel();
                info!(job_id = %id, job = %job.info.name, "job cancelled");
                true
            }
            None => false,
        }
    }

    pub fn is_registered(&self, id: &str) -> bool { lock(&self.jobs).contains_key(id) }

    pub fn list_jobs(&self) -> Vec<JobInfo> {
        let jobs = lock(&self.jobs);
        let mut out: Vec<JobInfo> = jobs.values().map(|j| j.info.clone()).collect();
        out.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        out
    }
}

impl Drop for JobScheduler {
    fn drop(&mut self) {
        for (_, job) in lock(&self.jobs).drain() {
            job.cancel.cancel();
        }
    }
}

fn lock(jobs: &Registry) -> std::sync::MutexGuard<'_, HashMap<String, RegisteredJob>> {
    jobs.lock().unwrap_or_else(|e| e.into_inner())
}

async fn run_every(id: String, name: String, every: Duration, job: JobFn, cancel: CancellationToken, jobs: Registry) {
    let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(job_id = %id, job = %name, "job loop ended");
                return;
            }
            _ = ticker.tick() => {}
        }
        debug!(job_id = %id, job = %name, "job tick");
        if job(id.clone()).await == JobControl::Stop {
            lock(&jobs).remove(&id);
            info!(job_id = %id, job = %name, "job stopped itself");
            return;
        }
    }
}
