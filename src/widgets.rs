use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// The two widget kinds the sync routine knows how to write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WidgetKind {
    Text,
    Image,
}

impl WidgetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WidgetKind::Text => "text",
            WidgetKind::Image => "image",
        }
    }
}

impl fmt::Display for WidgetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Display metadata for one image in an image widget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageData {
    pub url: String,
    #[serde(default)]
    pub link_url: Option<String>,
    pub width: u32,
    pub height: u32,
}

impl ImageData {
    /// Image pointing at `url` with no link target and 0x0 geometry; the page sizes it on render.
    pub fn placeholder(url: impl Into<String>) -> Self {
        Self { url: url.into(), link_url: None, width: 0, height: 0 }
    }
}

/// Widget content, tagged by kind as the store reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WidgetBody {
    Text { text: String },
    Image { images: Vec<ImageData> },
    /// Any other widget type living on the page (calendars, buttons, ...). Read-only for us.
    Other { kind: String },
}

impl WidgetBody {
    /// `None` for widget types the sync routine does not manage.
    pub fn kind(&self) -> Option<WidgetKind> {
        match self {
            WidgetBody::Text { .. } => Some(WidgetKind::Text),
            WidgetBody::Image { .. } => Some(WidgetKind::Image),
            WidgetBody::Other { .. } => None,
        }
    }

    pub fn kind_name(&self) -> &str {
        match self {
            WidgetBody::Other { kind } => kind.as_str(),
            body => body.kind().map(|k| k.as_str()).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Widget {
    /// Present once the widget has been persisted.
    pub id: Option<String>,
    pub name: String,
    pub body: WidgetBody,
}

impl Widget {
    pub fn text(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self { id: None, name: name.into(), body: WidgetBody::Text { text: text.into() } }
    }

    pub fn image(name: impl Into<String>, image: ImageData) -> Self {
        Self { id: None, name: name.into(), body: WidgetBody::Image { images: vec![image] } }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Widget names are compared case-insensitively, ignoring surrounding whitespace.
    pub fn name_matches(&self, name: &str) -> bool {
        self.name.trim().to_lowercase() == name.trim().to_lowercase()
    }
}

/// Page widget storage for one community scope.
#[async_trait]
pub trait WidgetStore: Send + Sync {
    async fn list(&self, scope: &str) -> Result<Vec<Widget>>;
    async fn create(&self, scope: &str, widget: &Widget) -> Result<Widget>;
    async fn update(&self, scope: &str, id: &str, widget: &Widget) -> Result<Widget>;
    async fn delete(&self, scope: &str, id: &str) -> Result<()>;
}

/// Image bytes fetched from a source, ready to be re-hosted.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub source_url: Url,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostedAsset {
    pub id: String,
    pub url: String,
}

/// Re-hosts fetched images so widgets never hotlink the source.
#[async_trait]
pub trait AssetUploader: Send + Sync {
    /// `Ok(None)` means the uploader accepted the call but produced no asset.
    async fn upload(&self, upload: &ImageUpload) -> Result<Option<HostedAsset>>;

    /// Release an asset this uploader hosted earlier. URLs it does not own are ignored.
    async fn discard(&self, url: &str) -> Result<()>;
}
