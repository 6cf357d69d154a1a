use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderName, CONTENT_TYPE, IF_MODIFIED_SINCE, LAST_MODIFIED};
use reqwest::redirect::Policy;
use reqwest::StatusCode;
use std::time::Duration;
use url::Url;

/// What a conditional fetch produced. The body is only read for 2xx responses.
#[derive(Debug, Clone, Default)]
pub struct FetchedContent {
    pub status: u16,
    pub content_type: Option<String>,
    pub last_modified: Option<String>,
    pub body: Vec<u8>,
}

impl FetchedContent {
    pub fn is_not_modified(&self) -> bool { self.status == StatusCode::NOT_MODIFIED.as_u16() }
    pub fn is_success(&self) -> bool { (200..300).contains(&self.status) }
}

#[async_trait]
pub trait ConditionalFetcher: Send + Sync {
    /// GET `url`, sending `If-Modified-Since` when a cache token is known.
    async fn fetch(&self, url: &Url, if_modified_since: Option<&str>) -> Result<FetchedContent>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(Policy::limited(10))
            .timeout(timeout)
            .user_agent(concat!("widgetsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("building http client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ConditionalFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url, if_modified_since: Option<&str>) -> Result<FetchedContent> {
        let mut req = self.client.get(url.clone());
        if let Some(token) = if_modified_since {
            req = req.header(IF_MODIFIED_SINCE, token);
        }
        let resp = req.send().await.with_context(|| format!("fetching {url}"))?;

        let status = resp.status();
        let header = |name: HeaderName| resp.headers().get(name).and_then(|v| v.to_str().ok()).map(str::to_string);
        let content_type = header(CONTENT_TYPE);
        let last_modified = header(LAST_MODIFIED);
        tracing::debug!(%url, status = status.as_u16(), ?content_type, ?last_modified, "source responded");

        let body = if status.is_success() {
            resp.bytes().await.with_context(|| format!("reading body of {url}"))?.to_vec()
        } else {
            Vec::new()
        };
        Ok(FetchedContent { status: status.as_u16(), content_type, last_modified, body })
    }
}
