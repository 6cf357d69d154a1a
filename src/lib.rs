pub mod commands;
pub mod dao;
pub mod db;
pub mod fetcher;
pub mod mapping;
pub mod media;
pub mod scheduler;
pub mod settings;
pub mod storage;
pub mod sync;
pub mod types;
pub mod widgets;

// --- Library API for embedding ---

/// Convenience re-exports for embedders.
pub mod prelude {
    pub use crate::commands::CommandNotice;
    pub use crate::settings::Settings;
    pub use crate::sync::{SkipReason, SyncOutcome, SyncTarget};
    pub use crate::widgets::{ImageData, Widget, WidgetBody, WidgetKind};
    pub use crate::{SyncStatus, WidgetSync};
}

use anyhow::{Context, Result};
use futures::FutureExt;
use std::sync::Arc;

use crate::commands::{SyncCommands, SyncWork};
use crate::db::Database;
use crate::fetcher::HttpFetcher;
use crate::media::MediaLibrary;
use crate::scheduler::{JobInfo, JobScheduler};
use crate::settings::Settings;
use crate::storage::Storage;
use crate::sync::{cache_token_key, log_outcome, SyncOutcome, SyncRoutine};
use crate::widgets::{Widget, WidgetStore};

/// Snapshot of persisted and in-process sync state.
#[derive(Debug, Clone)]
pub struct SyncStatus {
    pub job_id: Option<String>,
    pub registered: bool,
    pub cache_token: Option<String>,
    pub jobs: Vec<JobInfo>,
}

/// Async library entry point. Owns the database, the http fetcher and the job scheduler.
pub struct WidgetSync {
    settings: Settings,
    db: Database,
    routine: Arc<SyncRoutine>,
    scheduler: Arc<JobScheduler>,
    commands: SyncCommands,
}

impl WidgetSync {
    /// Connect the database and (optionally) run migrations. Nothing is scheduled yet.
    pub async fn connect(settings: Settings, run_migrations: bool) -> Result<Self> {
        let db = Database::connect(settings.database_url.as_deref()).await?;
        if run_migrations { db.run_migrations().await?; }

        let fetcher = Arc::new(HttpFetcher::new(settings.request_timeout())?);
        let media = Arc::new(MediaLibrary::new(db.clone(), settings.media_base_url.clone()));
        let shared = Arc::new(db.clone());
        let routine = Arc::new(SyncRoutine::new(fetcher, shared.clone(), shared.clone(), media, settings.community.clone()));

        let scheduler = Arc::new(JobScheduler::new());
        let commands = SyncCommands::new(shared, scheduler.clone());
        Ok(Self { settings, db, routine, scheduler, commands })
    }

    pub fn settings(&self) -> &Settings { &self.settings }
    pub fn database(&self) -> &Database { &self.db }
    pub fn scheduler(&self) -> &JobScheduler { &self.scheduler }

    /// Run one synchronization now with the configured target.
    pub async fn sync_once(&self) -> Result<SyncOutcome> {
        self.settings.validate()?;
        let target = self.settings.target()?;
        let result = self.routine.synchronize(&target).await;
        log_outcome(&target, &result);
        result
    }

    /// Start periodic sync at the configured frequency. Returns the job id.
    pub async fn start(&self) -> Result<String> {
        let job = self.sync_job()?;
        self.commands.start(self.settings.frequency(), job).await
    }

    /// Stop periodic sync. Returns `false` if it was not active.
    pub async fn stop(&self) -> Result<bool> { self.commands.stop().await }

    /// Re-arm periodic sync if it was active before an upgrade or restart.
    pub async fn on_upgrade(&self) -> Result<Option<String>> {
        if self.commands.job_id().await?.is_none() {
            return Ok(None);
        }
        let job = self.sync_job()?;
        self.commands.on_upgrade(self.settings.frequency(), job).await
    }

    pub async fn status(&self) -> Result<SyncStatus> {
        let job_id = self.commands.job_id().await?;
        let registered = job_id.as_deref().is_some_and(|id| self.scheduler.is_registered(id));
        let cache_token = self
            .db
            .get(&cache_token_key(&self.settings.widget_name))
            .await
            .context("reading cache token")?;
        Ok(SyncStatus { job_id, registered, cache_token, jobs: self.scheduler.list_jobs() })
    }

    /// Widgets currently on the configured community page.
    pub async fn list_widgets(&self) -> Result<Vec<Widget>> { self.db.list(&self.settings.community).await }

    fn sync_job(&self) -> Result<SyncWork> {
        self.settings.validate()?;
        let target = Arc::new(self.settings.target()?);
        let routine = self.routine.clone();
        Ok(Arc::new(move || {
            let routine = routine.clone();
            let target = target.clone();
            async move {
                let result = routine.synchronize(&target).await;
                log_outcome(&target, &result);
            }
            .boxed()
        }))
    }
}
