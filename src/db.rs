use anyhow::{anyhow, Context, Result};
use directories::ProjectDirs;
use sqlx::{any::AnyConnectOptions, AnyPool, ConnectOptions, migrate::Migrator};
use sqlx::any::AnyPoolOptions;
use std::{path::PathBuf, str::FromStr};
use std::sync::Once;

use crate::dao;
use crate::mapping::{widget_from_row, widget_insert_from};
use crate::storage::Storage;
use crate::widgets::{Widget, WidgetStore};

// Ensure drivers are installed exactly once for sqlx::any
static INSTALL_DRIVERS: Once = Once::new();

// Embed SQL migrations from the migrations/ directory
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

#[derive(Clone)]
pub struct Database {
    pool: AnyPool,
}

impl Database {
    // Create a connection pool. If database_url is None, use a sensible default
    // (SQLite file in the user's data directory).
    pub async fn connect(database_url: Option<&str>) -> Result<Self> {
        INSTALL_DRIVERS.call_once(sqlx::any::install_default_drivers);

        let url = match database_url {
            Some(u) if !u.trim().is_empty() => u.to_string(),
            _ => default_sqlite_url()?,
        };

        let opts = AnyConnectOptions::from_str(&url)
            .with_context(|| format!("invalid database URL: {url}"))?;
        // Quiet by default; callers can enable SQLX_LOG if they want
        let opts = opts.disable_statement_logging();

        let pool = AnyPoolOptions::new()
            .max_connections(5)
            .connect_with(opts)
            .await
            .with_context(|| format!("failed to connect to database: {url}"))?;

        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<()> {
        MIGRATOR.run(&self.pool).await.context("running migrations")
    }

    pub fn pool(&self) -> &AnyPool { &self.pool }
}

#[async_trait::async_trait]
impl Storage for Database {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query_scalar::<_, String>("SELECT value FROM kv WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO kv(key, value) VALUES (?, ?)\n             ON CONFLICT(key) DO UPDATE SET value=excluded.value, updated_at=CURRENT_TIMESTAMP",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM kv WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl WidgetStore for Database {
    async fn list(&self, scope: &str) -> Result<Vec<Widget>> {
        dao::list_widgets(&self.pool, scope).await?.into_iter().map(widget_from_row).collect()
    }

    async fn create(&self, scope: &str, widget: &Widget) -> Result<Widget> {
        let id = uuid::Uuid::new_v4().to_string();
        let row = widget_insert_from(id.clone(), scope, widget)?;
        dao::insert_widget(&self.pool, &row).await?;
        Ok(widget.clone().with_id(id))
    }

    async fn update(&self, scope: &str, id: &str, widget: &Widget) -> Result<Widget> {
        let row = widget_insert_from(id.to_string(), scope, widget)?;
        if dao::update_widget(&self.pool, &row).await? == 0 {
            return Err(anyhow!("widget {id} not found in {scope}"));
        }
        Ok(widget.clone().with_id(id))
    }

    async fn delete(&self, scope: &str, id: &str) -> Result<()> {
        if dao::delete_widget(&self.pool, scope, id).await? == 0 {
            tracing::debug!(%scope, widget_id = %id, "delete of missing widget ignored");
        }
        Ok(())
    }
}

fn default_sqlite_url() -> Result<String> {
    let proj = ProjectDirs::from("dev", "widgetsync", "widgetsync")
        .context("unable to determine data directory for default sqlite path")?;
    let mut path: PathBuf = proj.data_dir().to_path_buf();
    std::fs::create_dir_all(&path).with_context(|| format!("creating data dir: {}", path.display()))?;
    path.push("widgetsync.db");
    Ok(sqlite_url_for(&path))
}

/// SQLite URL that creates the file on first connect.
pub fn sqlite_url_for(path: &std::path::Path) -> String {
    // Encode spaces in the path for a valid sqlite URL
    let path_str = path.to_string_lossy().replace(' ', "%20");
    format!("sqlite://{path_str}?mode=rwc")
}
