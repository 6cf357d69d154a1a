//! Conditional fetch of a source and reconciliation into a single named widget.
//!
//! One run reads the cache token, fetches the source, classifies the body as
//! text or image, reconciles it against at most one same-named widget and,
//! only after a successful create or update, stores the response's
//! `Last-Modified` value as the next token.
//!
//! Listing and mutating widgets is not isolated from concurrent edits made
//! outside this process; a same-named widget added between the list and the
//! write can leave two widgets behind, which later runs report as ambiguous.

use anyhow::{Context, Result};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::fetcher::{ConditionalFetcher, FetchedContent};
use crate::storage::Storage;
use crate::widgets::{AssetUploader, ImageData, ImageUpload, Widget, WidgetBody, WidgetKind, WidgetStore};

/// Logical identity of the widget being kept in sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncTarget {
    name: String,
    source_url: Url,
}

#[derive(Debug, thiserror::Error)]
pub enum TargetError {
    #[error("widget name must not be empty")]
    EmptyName,
    #[error("invalid source url {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("source url must use http or https, got {0:?}")]
    UnsupportedScheme(String),
}

impl SyncTarget {
    pub fn new(name: impl Into<String>, source_url: &str) -> Result<Self, TargetError> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(TargetError::EmptyName);
        }
        let url = Url::parse(source_url.trim())
            .map_err(|source| TargetError::InvalidUrl { url: source_url.to_string(), source })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(TargetError::UnsupportedScheme(url.scheme().to_string()));
        }
        Ok(Self { name, source_url: url })
    }

    pub fn name(&self) -> &str { &self.name }
    pub fn source_url(&self) -> &Url { &self.source_url }
}

/// Why a run ended without touching the widget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    HttpError { status: u16 },
    InvalidContentType { content_type: Option<String> },
    AmbiguousExisting { count: usize },
    UnknownExistingType { kind: String },
    UploadFailed,
    CreateFailed,
    UpdateFailed,
}

impl SkipReason {
    /// Stable identifier for logs.
    pub fn code(&self) -> &'static str {
        match self {
            SkipReason::HttpError { .. } => "http-error",
            SkipReason::InvalidContentType { .. } => "invalid-content-type",
            SkipReason::AmbiguousExisting { .. } => "ambiguous-existing",
            SkipReason::UnknownExistingType { .. } => "unknown-existing-type",
            SkipReason::UploadFailed => "upload-failed",
            SkipReason::CreateFailed => "create-failed",
            SkipReason::UpdateFailed => "update-failed",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::HttpError { status } => write!(f, "source returned HTTP {status}"),
            SkipReason::InvalidContentType { content_type: Some(ct) } => write!(f, "unsupported content type {ct:?}"),
            SkipReason::InvalidContentType { content_type: None } => f.write_str("source sent no content type"),
            SkipReason::AmbiguousExisting { count } => write!(f, "{count} widgets share this name"),
            SkipReason::UnknownExistingType { kind } => write!(f, "existing widget has unsupported type {kind:?}"),
            SkipReason::UploadFailed => f.write_str("image upload failed"),
            SkipReason::CreateFailed => f.write_str("widget create failed"),
            SkipReason::UpdateFailed => f.write_str("widget update failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Updated,
    Created,
    Unchanged,
    Skipped(SkipReason),
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncOutcome::Updated => f.write_str("updated"),
            SyncOutcome::Created => f.write_str("created"),
            SyncOutcome::Unchanged => f.write_str("unchanged"),
            SyncOutcome::Skipped(reason) => write!(f, "skipped ({}: {reason})", reason.code()),
        }
    }
}

/// Key-value key holding the cache token for a widget name.
pub fn cache_token_key(name: &str) -> String {
    format!("sync|last-modified|{}", name.trim().to_lowercase())
}

/// Maps a declared content type onto the widget kind that can display it.
pub fn classify(content_type: Option<&str>) -> Option<WidgetKind> {
    let ct = content_type?.trim().to_ascii_lowercase();
    if ct.starts_with("text/plain") {
        Some(WidgetKind::Text)
    } else if ct.starts_with("image/") {
        Some(WidgetKind::Image)
    } else {
        None
    }
}

pub struct SyncRoutine {
    fetcher: Arc<dyn ConditionalFetcher>,
    storage: Arc<dyn Storage>,
    widgets: Arc<dyn WidgetStore>,
    uploader: Arc<dyn AssetUploader>,
    scope: String,
}

impl SyncRoutine {
    pub fn new(
        fetcher: Arc<dyn ConditionalFetcher>,
        storage: Arc<dyn Storage>,
        widgets: Arc<dyn WidgetStore>,
        uploader: Arc<dyn AssetUploader>,
        scope: impl Into<String>,
    ) -> Self {
        Self { fetcher, storage, widgets, uploader, scope: scope.into() }
    }

    pub fn scope(&self) -> &str { &self.scope }

    /// Run one synchronization. `Err` is reserved for collaborator failures
    /// outside the skip taxonomy (transport errors, key-value or list/delete errors).
    #[tracing::instrument(skip_all, fields(widget = %target.name(), source = %target.source_url()))]
    pub async fn synchronize(&self, target: &SyncTarget) -> Result<SyncOutcome> {
        let token_key = cache_token_key(target.name());
        let token = self.storage.get(&token_key).await.context("reading cache token")?;

        let response = self.fetcher.fetch(target.source_url(), token.as_deref()).await?;
        if response.is_not_modified() {
            debug!(token = ?token, "source not modified");
            return Ok(SyncOutcome::Unchanged);
        }
        if !response.is_success() {
            return Ok(skipped(SkipReason::HttpError { status: response.status }));
        }
        let Some(kind) = classify(response.content_type.as_deref()) else {
            return Ok(skipped(SkipReason::InvalidContentType { content_type: response.content_type.clone() }));
        };

        let mut matching: Vec<Widget> = self
            .widgets
            .list(&self.scope)
            .await
            .context("listing widgets")?
            .into_iter()
            .filter(|w| w.name_matches(target.name()))
            .collect();
        if matching.len() > 1 {
            return Ok(skipped(SkipReason::AmbiguousExisting { count: matching.len() }));
        }

        let mut existing = matching.pop();
        let replaced_images: Vec<String> = match existing.as_ref().map(|w| &w.body) {
            Some(WidgetBody::Image { images }) => images.iter().map(|i| i.url.clone()).collect(),
            _ => Vec::new(),
        };
        if let Some(current) = &existing {
            match current.body.kind() {
                None => {
                    return Ok(skipped(SkipReason::UnknownExistingType { kind: current.body.kind_name().to_string() }));
                }
                Some(current_kind) if current_kind != kind => {
                    if let Some(id) = &current.id {
                        info!(widget_id = %id, from = %current_kind, to = %kind, "widget type changed, replacing");
                        self.widgets.delete(&self.scope, id).await.with_context(|| format!("deleting widget {id}"))?;
                    }
                    existing = None;
                }
                Some(_) => {}
            }
        }

        let body = match kind {
            WidgetKind::Text => WidgetBody::Text { text: String::from_utf8_lossy(&response.body).into_owned() },
            WidgetKind::Image => match self.rehost(target, &response).await {
                Some(image) => WidgetBody::Image { images: vec![image] },
                None => return Ok(skipped(SkipReason::UploadFailed)),
            },
        };
        let candidate = Widget { id: existing.and_then(|w| w.id), name: target.name().to_string(), body };

        let outcome = match &candidate.id {
            Some(id) => match self.widgets.update(&self.scope, id, &candidate).await {
                Ok(_) => SyncOutcome::Updated,
                Err(e) => {
                    warn!(widget_id = %id, error = %e, "widget update failed");
                    return Ok(skipped(SkipReason::UpdateFailed));
                }
            },
            None => match self.widgets.create(&self.scope, &candidate).await {
                Ok(created) => {
                    debug!(widget_id = ?created.id, "widget created");
                    SyncOutcome::Created
                }
                Err(e) => {
                    warn!(error = %e, "widget create failed");
                    return Ok(skipped(SkipReason::CreateFailed));
                }
            },
        };

        self.discard_replaced(&replaced_images, &candidate).await;

        match &response.last_modified {
            Some(last_modified) => {
                self.storage.set(&token_key, last_modified).await.context("storing cache token")?;
            }
            None => warn!("source sent no Last-Modified header; keeping previous cache token"),
        }
        debug!(%outcome, kind = %kind, "widget synchronized");
        Ok(outcome)
    }

    async fn rehost(&self, target: &SyncTarget, response: &FetchedContent) -> Option<ImageData> {
        let upload = ImageUpload {
            source_url: target.source_url().clone(),
            content_type: response.content_type.clone().unwrap_or_default(),
            bytes: response.body.clone(),
        };
        match self.uploader.upload(&upload).await {
            Ok(Some(asset)) => Some(ImageData::placeholder(asset.url)),
            Ok(None) => {
                warn!("uploader returned no asset");
                None
            }
            Err(e) => {
                warn!(error = %e, "image upload failed");
                None
            }
        }
    }

    /// Release images the previous widget pointed at and the written one no longer does.
    async fn discard_replaced(&self, urls: &[String], written: &Widget) {
        let kept: Vec<&str> = match &written.body {
            WidgetBody::Image { images } => images.iter().map(|i| i.url.as_str()).collect(),
            _ => Vec::new(),
        };
        for url in urls.iter().filter(|u| !kept.contains(&u.as_str())) {
            if let Err(e) = self.uploader.discard(url).await {
                warn!(%url, error = %e, "could not discard replaced image");
            }
        }
    }
}

fn skipped(reason: SkipReason) -> SyncOutcome {
    debug!(reason = reason.code(), "{reason}");
    SyncOutcome::Skipped(reason)
}

/// Log a finished run the way scheduled jobs report it.
pub fn log_outcome(target: &SyncTarget, result: &Result<SyncOutcome>) {
    match result {
        Ok(SyncOutcome::Skipped(reason)) => {
            warn!(widget = %target.name(), reason = reason.code(), "sync skipped: {reason}")
        }
        Ok(outcome) => info!(widget = %target.name(), %outcome, "sync finished"),
        Err(e) => error!(widget = %target.name(), error = ?e, "sync failed"),
    }
}
