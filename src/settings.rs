use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::sync::{SyncTarget, TargetError};

pub const MIN_FREQUENCY_MINUTES: u32 = 1;
pub const MAX_FREQUENCY_MINUTES: u32 = 60;

/// App settings. Read from `widgetsync.toml`, then `WIDGETSYNC_*` env overrides.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Name of the widget to keep in sync (case-insensitive).
    pub widget_name: String,
    /// Endpoint returning `text/plain` or `image/*`.
    pub source_url: String,
    /// Poll period, 1 to 60 minutes.
    pub frequency_minutes: u32,
    /// Community whose page holds the widget.
    pub community: String,
    pub database_url: Option<String>,
    /// Prefix for URLs of re-hosted images.
    pub media_base_url: String,
    pub request_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            widget_name: String::new(),
            source_url: String::new(),
            frequency_minutes: 5,
            community: "default".to_string(),
            database_url: None,
            media_base_url: "media://widgetsync".to_string(),
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse settings: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid value for {name}: {value:?}")]
    Override { name: &'static str, value: String },
    #[error("frequency must be between 1 and 60 minutes, got {0}")]
    Frequency(u32),
    #[error("community must not be empty")]
    EmptyCommunity,
    #[error(transparent)]
    Target(#[from] TargetError),
}

impl Settings {
    /// `<config dir>/widgetsync.toml`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("dev", "widgetsync", "widgetsync").map(|p| p.config_dir().join("widgetsync.toml"))
    }

    /// Load from `path` (must exist) or the default path (may be missing), then apply env overrides.
    /// Does not validate; commands that need a target call [`Settings::validate`].
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let mut settings = match path {
            Some(p) => Self::from_file(p)?,
            None => match Self::default_path() {
                Some(p) if p.exists() => Self::from_file(&p)?,
                _ => Self::default(),
            },
        };
        settings.apply_overrides(|name| std::env::var(name).ok())?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self, SettingsError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|source| SettingsError::Read { path: path.to_path_buf(), source })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, SettingsError> { Ok(toml::from_str(raw)?) }

    /// Apply `WIDGETSYNC_*` overrides looked up through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("WIDGETSYNC_WIDGET_NAME") { self.widget_name = v; }
        if let Some(v) = get("WIDGETSYNC_SOURCE_URL") { self.source_url = v; }
        if let Some(v) = get("WIDGETSYNC_COMMUNITY") { self.community = v; }
        if let Some(v) = get("WIDGETSYNC_DATABASE_URL") { self.database_url = Some(v); }
        if let Some(v) = get("WIDGETSYNC_MEDIA_BASE_URL") { self.media_base_url = v; }
        if let Some(v) = get("WIDGETSYNC_FREQUENCY_MINUTES") {
            self.frequency_minutes = v
                .trim()
                .parse()
                .map_err(|_| SettingsError::Override { name: "WIDGETSYNC_FREQUENCY_MINUTES", value: v.clone() })?;
        }
        if let Some(v) = get("WIDGETSYNC_REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = v
                .trim()
                .parse()
                .map_err(|_| SettingsError::Override { name: "WIDGETSYNC_REQUEST_TIMEOUT_SECS", value: v.clone() })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if !(MIN_FREQUENCY_MINUTES..=MAX_FREQUENCY_MINUTES).contains(&self.frequency_minutes) {
            return Err(SettingsError::Frequency(self.frequency_minutes));
        }
        if self.community.trim().is_empty() {
            return Err(SettingsError::EmptyCommunity);
        }
        self.target()?;
        Ok(())
    }

    pub fn target(&self) -> Result<SyncTarget, TargetError> { SyncTarget::new(self.widget_name.clone(), &self.source_url) }

    pub fn frequency(&self) -> Duration { Duration::from_secs(u64::from(self.frequency_minutes) * 60) }

    pub fn request_timeout(&self) -> Duration { Duration::from_secs(self.request_timeout_secs.max(1)) }
}
