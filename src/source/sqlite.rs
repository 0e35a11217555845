//! SQLite-backed [`DocumentSource`].
//!
//! Reads a single article table whose column names come from
//! [`SourceConfig`]. Timestamps are stored as unix seconds.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use super::DocumentSource;
use crate::config::SourceConfig;
use crate::db;
use crate::models::{DateRange, Document};

pub struct SqliteSource {
    pool: SqlitePool,
    config: SourceConfig,
}

impl SqliteSource {
    pub async fn open(config: &SourceConfig) -> Result<Self> {
        let pool = db::connect(&config.path).await?;
        Ok(Self::new(pool, config.clone()))
    }

    pub fn new(pool: SqlitePool, config: SourceConfig) -> Self {
        Self { pool, config }
    }

    fn table(&self) -> String {
        quote_ident(&self.config.table)
    }

    fn column(&self, name: &str) -> String {
        quote_ident(name)
    }
}

/// Quote a configured identifier for interpolation into SQL.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

pub(crate) fn from_unix(secs: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0).ok_or_else(|| anyhow!("timestamp out of range: {}", secs))
}

#[async_trait]
impl DocumentSource for SqliteSource {
    fn name(&self) -> String {
        format!("sqlite:{}", self.config.table)
    }

    fn content_field(&self) -> &str {
        &self.config.content_column
    }

    fn checkpoint_field(&self) -> &str {
        &self.config.download_time_column
    }

    async fn read(&self, range: &DateRange, skip: usize, limit: usize) -> Result<Vec<Document>> {
        let url = self.column(&self.config.url_column);
        let download_time = self.column(&self.config.download_time_column);
        let sql = format!(
            r#"
            SELECT {url}, {download_time}, {publish_time}, {title}, {content}
            FROM {table}
            WHERE {download_time} >= ? AND {download_time} < ?
            ORDER BY {download_time} ASC, {url} ASC
            LIMIT ? OFFSET ?
            "#,
            url = url,
            download_time = download_time,
            publish_time = self.column(&self.config.publish_time_column),
            title = self.column(&self.config.title_column),
            content = self.column(&self.config.content_column),
            table = self.table(),
        );

        let rows = sqlx::query(&sql)
            .bind(range.start_time().timestamp())
            .bind(range.end_time().timestamp())
            .bind(limit as i64)
            .bind(skip as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| -> Result<Document> {
                let publish_time: Option<i64> = row.try_get(2)?;
                Ok(Document {
                    url: row.try_get(0)?,
                    download_time: from_unix(row.try_get(1)?)?,
                    publish_time: publish_time.map(from_unix).transpose()?,
                    title: row.try_get(3)?,
                    content: row.try_get(4)?,
                })
            })
            .collect()
    }

    async fn initial_skip(&self, range: &DateRange, checkpoint: DateTime<Utc>) -> Result<usize> {
        let download_time = self.column(&self.config.download_time_column);
        let sql = format!(
            "SELECT COUNT(*) FROM {table} WHERE {dt} >= ? AND {dt} < ? AND {dt} < ?",
            table = self.table(),
            dt = download_time,
        );

        let count: i64 = sqlx::query_scalar(&sql)
            .bind(range.start_time().timestamp())
            .bind(range.end_time().timestamp())
            .bind(checkpoint.timestamp())
            .fetch_one(&self.pool)
            .await?;

        Ok(count.max(0) as usize)
    }

    async fn count(&self, range: &DateRange) -> Result<usize> {
        let sql = format!(
            "SELECT COUNT(*) FROM {table} WHERE {dt} >= ? AND {dt} < ?",
            table = self.table(),
            dt = self.column(&self.config.download_time_column),
        );

        let count: i64 = sqlx::query_scalar(&sql)
            .bind(range.start_time().timestamp())
            .bind(range.end_time().timestamp())
            .fetch_one(&self.pool)
            .await?;

        Ok(count.max(0) as usize)
    }
}

/// Insert raw articles into a SQLite source table. Used by `fx import` and tests.
pub async fn insert_documents(
    pool: &SqlitePool,
    config: &SourceConfig,
    docs: &[Document],
) -> Result<u64> {
    let sql = format!(
        "INSERT INTO {table} ({url}, {dt}, {pt}, {title}, {content}) VALUES (?, ?, ?, ?, ?) ON CONFLICT({url}) DO NOTHING",
        table = quote_ident(&config.table),
        url = quote_ident(&config.url_column),
        dt = quote_ident(&config.download_time_column),
        pt = quote_ident(&config.publish_time_column),
        title = quote_ident(&config.title_column),
        content = quote_ident(&config.content_column),
    );

    let mut tx = pool.begin().await?;
    let mut inserted = 0u64;
    for doc in docs {
        let result = sqlx::query(&sql)
            .bind(&doc.url)
            .bind(doc.download_time.timestamp())
            .bind(doc.publish_time.map(|t| t.timestamp()))
            .bind(&doc.title)
            .bind(&doc.content)
            .execute(&mut *tx)
            .await?;
        inserted += result.rows_affected();
    }
    tx.commit().await?;

    Ok(inserted)
}
