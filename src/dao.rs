use anyhow::Result;
use serde::{Deserialize, Serialize};
use sqlx::AnyPool;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WidgetInsert {
    pub id: String,
    pub scope: String,
    pub name: String,
    pub kind: String, // "text" | "image" | anything the page itself added
    pub payload: String, // JSON, shape depends on kind
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WidgetRow {
    pub id: String,
    pub name: String,
    pub kind: String,
    pub payload: String,
}

#[derive(Debug, Clone)]
pub struct MediaInsert {
    pub id: String,
    pub source_url: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

pub async fn list_widgets(pool: &AnyPool, scope: &str) -> Result<Vec<WidgetRow>> {
    let rows = sqlx::query_as::<_, (String, String, String, String)>(
        "SELECT id, name, kind, payload FROM widgets WHERE scope = ? ORDER BY created_at, id",
    )
    .bind(scope)
    .fetch_all(pool)
    .await?;
    Ok(rows
        .into_iter()
        .map(|(id, name, kind, payload)| WidgetRow { id, name, kind, payload })
        .collect())
}

pub async fn insert_widget(pool: &AnyPool, w: &WidgetInsert) -> Result<()> {
    sqlx::query("INSERT INTO widgets(id, scope, name, kind, payload) VALUES(?, ?, ?, ?, ?)")
        .bind(&w.id)
        .bind(&w.scope)
        .bind(&w.name)
        .bind(&w.kind)
        .bind(&w.payload)
        .execute(pool)
        .await?;
    Ok(())
}

/// Returns the number of rows touched; 0 means no such widget in `scope`.
pub async fn update_widget(pool: &AnyPool, w: &WidgetInsert) -> Result<u64> {
    let res = sqlx::query(
        "UPDATE widgets SET name = ?, kind = ?, payload = ?, updated_at = CURRENT_TIMESTAMP\n         WHERE id = ? AND scope = ?",
    )
    .bind(&w.name)
    .bind(&w.kind)
    .bind(&w.payload)
    .bind(&w.id)
    .bind(&w.scope)
    .execute(pool)
    .await?;
    Ok(res.rows_affected())
}

pub async fn delete_widget(pool: &AnyPool, scope: &str, id: &str) -> Result<u64> {
    let res = sqlx::query("DELETE FROM widgets WHERE id = ? AND scope = ?")
        .bind(id)
        .bind(scope)
        .execute(pool)
        .await?;
    Ok(res.rows_affected())
}

pub async fn insert_media(pool: &AnyPool, m: &MediaInsert) -> Result<()> {
    sqlx::query("INSERT INTO media(id, source_url, mime, bytes) VALUES(?, ?, ?, ?)")
        .bind(&m.id)
        .bind(&m.source_url)
        .bind(&m.mime)
        .bind(m.bytes.clone())
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn find_media(pool: &AnyPool, id: &str) -> Result<Option<(String, Vec<u8>)>> {
    let row = sqlx::query_as::<_, (String, Vec<u8>)>("SELECT mime, bytes FROM media WHERE id = ? LIMIT 1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn delete_media(pool: &AnyPool, id: &str) -> Result<u64> {
    let res = sqlx::query("DELETE FROM media WHERE id = ?").bind(id).execute(pool).await?;
    Ok(res.rows_affected())
}
