use anyhow::Result;
use async_trait::async_trait;

use crate::dao::{self, MediaInsert};
use crate::db::Database;
use crate::widgets::{AssetUploader, HostedAsset, ImageUpload};

/// Stores re-hosted images in the database and serves them under `base_url`.
#[derive(Clone)]
pub struct MediaLibrary {
    db: Database,
    base_url: String,
}

impl MediaLibrary {
    pub fn new(db: Database, base_url: impl Into<String>) -> Self {
        Self { db, base_url: base_url.into().trim_end_matches('/').to_string() }
    }

    pub fn hosted_url(&self, id: &str) -> String { format!("{}/{}", self.base_url, id) }

    /// Look up a stored asset; returns its mime type and bytes.
    pub async fn get(&self, id: &str) -> Result<Option<(String, Vec<u8>)>> {
        dao::find_media(self.db.pool(), id).await
    }
}

#[async_trait]
impl AssetUploader for MediaLibrary {
    async fn upload(&self, upload: &ImageUpload) -> Result<Option<HostedAsset>> {
        if upload.bytes.is_empty() {
            return Ok(None);
        }
        let id = uuid::Uuid::new_v4().to_string();
        dao::insert_media(
            self.db.pool(),
            &MediaInsert {
                id: id.clone(),
                source_url: upload.source_url.to_string(),
                mime: upload.content_type.clone(),
                bytes: upload.bytes.clone(),
            },
        )
        .await?;
        tracing::debug!(media_id = %id, size = upload.bytes.len(), "image re-hosted");
        Ok(Some(HostedAsset { url: self.hosted_url(&id), id }))
    }

    async fn discard(&self, url: &str) -> Result<()> {
        let Some(id) = url.strip_prefix(&self.base_url).and_then(|rest| rest.strip_prefix('/')) else {
            return Ok(());
        };
        if dao::delete_media(self.db.pool(), id).await? > 0 {
            tracing::debug!(media_id = %id, "replaced image removed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite_url_for;
    use url::Url;

    #[tokio::test]
    async fn upload_stores_bytes_and_returns_hosted_url() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::connect(Some(&sqlite_url_for(&dir.path().join("m.db")))).await.unwrap();
        db.run_migrations().await.unwrap();
        let media = MediaLibrary::new(db, "https://media.example/assets/");

        let upload = ImageUpload {
            source_url: Url::parse("https://cams.example/latest.jpg").unwrap(),
            content_type: "image/jpeg".into(),
            bytes: vec![0xff, 0xd8, 0xff],
        };
        let asset = media.upload(&upload).await.unwrap().unwrap();
        assert_eq!(asset.url, format!("https://media.example/assets/{}", asset.id));

        let (mime, bytes) = media.get(&asset.id).await.unwrap().unwrap();
        assert_eq!(mime, "image/jpeg");
        assert_eq!(bytes, vec![0xff, 0xd8, 0xff]);

        let empty = ImageUpload { bytes: Vec::new(), ..upload };
        assert!(media.upload(&empty).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn discard_removes_only_own_assets() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::connect(Some(&sqlite_url_for(&dir.path().join("m.db")))).await.unwrap();
        db.run_migrations().await.unwrap();
        let media = MediaLibrary::new(db, "https://media.example/assets");

        let upload = ImageUpload {
            source_url: Url::parse("https://cams.example/latest.png").unwrap(),
            content_type: "image/png".into(),
            bytes: vec![0x89, b'P', b'N', b'G'],
        };
        let kept = media.upload(&upload).await.unwrap().unwrap();
        let dropped = media.upload(&upload).await.unwrap().unwrap();

        media.discard(&dropped.url).await.unwrap();
        assert!(media.get(&dropped.id).await.unwrap().is_none());
        assert!(media.get(&kept.id).await.unwrap().is_some());

        media.discard(&format!("https://elsewhere.example/{}", kept.id)).await.unwrap();
        assert!(media.get(&kept.id).await.unwrap().is_some());
    }
}
