//! SQLite-backed [`ResultStore`].
//!
//! Rows live in `extracted_documents` (see [`crate::migrate`]). The full
//! extracted record is kept as JSON next to a few scalar columns that are
//! handy for ad-hoc queries.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use std::collections::HashSet;

use super::ResultStore;
use crate::models::{DateRange, ExtractedRecord, WriteableDocument};
use crate::source::sqlite::from_unix;

/// Max bound parameters per `IN (...)` lookup.
const URL_LOOKUP_BATCH: usize = 500;

pub struct SqliteResultStore {
    pool: SqlitePool,
}

impl SqliteResultStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl ResultStore for SqliteResultStore {
    async fn last_checkpoint(&self, range: &DateRange) -> Result<Option<DateTime<Utc>>> {
        let max: Option<i64> = sqlx::query_scalar(
            "SELECT MAX(download_time) FROM extracted_documents WHERE download_time >= ? AND download_time < ?",
        )
        .bind(range.start_time().timestamp())
        .bind(range.end_time().timestamp())
        .fetch_one(&self.pool)
        .await?;

        max.map(from_unix).transpose()
    }

    async fn non_saved_urls(&self, urls: &[String]) -> Result<Vec<String>> {
        let mut existing: HashSet<String> = HashSet::new();

        for batch in urls.chunks(URL_LOOKUP_BATCH) {
            let placeholders = vec!["?"; batch.len()].join(", ");
            let sql = format!(
                "SELECT url FROM extracted_documents WHERE url IN ({})",
                placeholders
            );
            let mut query = sqlx::query_scalar::<_, String>(&sql);
            for url in batch {
                query = query.bind(url);
            }
            existing.extend(query.fetch_all(&self.pool).await?);
        }

        Ok(urls
            .iter()
            .filter(|u| !existing.contains(*u))
            .cloned()
            .collect())
    }

    async fn write(&self, docs: &[WriteableDocument]) -> Result<()> {
        let now = Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0u64;

        for doc in docs {
            let record_json = serde_json::to_string(&doc.record)?;
            let result = sqlx::query(
                r#"
                INSERT INTO extracted_documents (url, download_time, publish_time, article_title,
                                                 summary, main_company, article_language,
                                                 record_json, model_name, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(url) DO NOTHING
                "#,
            )
            .bind(&doc.url)
            .bind(doc.download_time.timestamp())
            .bind(doc.publish_time.map(|t| t.timestamp()))
            .bind(&doc.article_title)
            .bind(&doc.record.summary)
            .bind(&doc.record.main_company)
            .bind(&doc.record.article_language)
            .bind(&record_json)
            .bind(&doc.model_name)
            .bind(now)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected();
        }

        tx.commit().await?;

        let skipped = docs.len() as u64 - inserted;
        if skipped > 0 {
            tracing::info!(inserted, skipped, "skipped already-stored documents");
        } else {
            tracing::debug!(inserted, "batch written");
        }
        Ok(())
    }

    async fn get(&self, url: &str) -> Result<Option<WriteableDocument>> {
        let row = sqlx::query(
            r#"
            SELECT url, download_time, publish_time, article_title, record_json, model_name
            FROM extracted_documents
            WHERE url = ?
            "#,
        )
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;

        let row = match row {
            Some(r) => r,
            None => return Ok(None),
        };

        let record_json: String = row.get("record_json");
        let record: ExtractedRecord = serde_json::from_str(&record_json)?;
        let publish_time: Option<i64> = row.get("publish_time");

        Ok(Some(WriteableDocument {
            url: row.get("url"),
            download_time: from_unix(row.get("download_time"))?,
            publish_time: publish_time.map(from_unix).transpose()?,
            article_title: row.get("article_title"),
            record,
            model_name: row.get("model_name"),
        }))
    }

    async fn count(&self, range: &DateRange) -> Result<usize> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM extracted_documents WHERE download_time >= ? AND download_time < ?",
        )
        .bind(range.start_time().timestamp())
        .bind(range.end_time().timestamp())
        .fetch_one(&self.pool)
        .await?;

        Ok(count.max(0) as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::migrate::create_result_schema;
    use crate::models::fixtures;
    use chrono::TimeZone;
    use tempfile::TempDir;

    async fn store(dir: &TempDir) -> SqliteResultStore {
        let pool = db::connect(&dir.path().join("results.sqlite")).await.unwrap();
        create_result_schema(&pool).await.unwrap();
        SqliteResultStore::new(pool)
    }

    fn wd(i: u32, hour: u32) -> WriteableDocument {
        WriteableDocument {
            url: format!("https://news.example.com/{}", i),
            download_time: Utc.with_ymd_and_hms(2024, 10, 22, hour, 0, 0).unwrap(),
            publish_time: Some(Utc.with_ymd_and_hms(2024, 10, 21, 23, 0, 0).unwrap()),
            article_title: Some(format!("Title {}", i)),
            record: fixtures::record(&format!("summary {}", i)),
            model_name: "gpt-4o-mini".to_string(),
        }
    }

    #[tokio::test]
    async fn write_skips_duplicate_url_and_keeps_the_rest() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;

        store.write(&[wd(3, 9)]).await.unwrap();

        let batch: Vec<_> = (1..=5).map(|i| wd(i, 6 + i)).collect();
        store.write(&batch).await.unwrap();

        for i in 1..=5 {
            let url = format!("https://news.example.com/{}", i);
            assert!(store.get(&url).await.unwrap().is_some(), "missing {}", url);
        }
        let range = DateRange::parse("2024-10-22", "2024-10-23").unwrap();
        assert_eq!(store.count(&range).await.unwrap(), 5);

        // The pre-existing row is not overwritten.
        let kept = store.get("https://news.example.com/3").await.unwrap().unwrap();
        assert_eq!(kept.download_time.timestamp(), wd(3, 9).download_time.timestamp());
    }

    #[tokio::test]
    async fn non_saved_urls_preserves_input_order() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;
        store.write(&[wd(2, 8)]).await.unwrap();

        let urls: Vec<String> = (1..=3)
            .map(|i| format!("https://news.example.com/{}", i))
            .collect();
        let new = store.non_saved_urls(&urls).await.unwrap();
        assert_eq!(
            new,
            vec![
                "https://news.example.com/1".to_string(),
                "https://news.example.com/3".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn last_checkpoint_is_max_download_time_in_range() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;
        let range = DateRange::parse("2024-10-22", "2024-10-23").unwrap();
        assert_eq!(store.last_checkpoint(&range).await.unwrap(), None);

        let mut outside = wd(9, 0);
        outside.download_time = Utc.with_ymd_and_hms(2024, 10, 23, 5, 0, 0).unwrap();
        store.write(&[wd(1, 7), wd(2, 11), outside]).await.unwrap();

        assert_eq!(
            store.last_checkpoint(&range).await.unwrap(),
            Some(Utc.with_ymd_and_hms(2024, 10, 22, 11, 0, 0).unwrap())
        );
    }

    #[tokio::test]
    async fn get_round_trips_record_json() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;
        let doc = wd(1, 7);
        store.write(std::slice::from_ref(&doc)).await.unwrap();

        let loaded = store.get(&doc.url).await.unwrap().unwrap();
        assert_eq!(loaded, doc);
    }
}
