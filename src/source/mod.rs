//! Raw article sources.
//!
//! The [`DocumentSource`] trait is the only view of the article backend the
//! pipeline has. Backends differ in column naming and in how a checkpoint
//! timestamp maps to a row offset, so both are part of the contract.
//!
//! | Backend | Type |
//! |---------|------|
//! | SQLite table | [`sqlite::SqliteSource`] |
//! | In-memory vector | [`memory::InMemorySource`] |

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::SourceConfig;
use crate::models::{DateRange, Document};

/// A paginated, read-only article source.
///
/// # Ordering
///
/// [`read`](DocumentSource::read) must return documents ordered ascending by
/// download time, with a stable tie-break, so that `skip`/`limit` pages never
/// overlap or leave gaps between calls on an unchanged source.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Short label for logs (e.g. `"sqlite:articles"`).
    fn name(&self) -> String;

    /// Backend field holding the raw content. Diagnostic only: logged when a
    /// run starts, while documents carry the content itself.
    fn content_field(&self) -> &str;

    /// Backend field holding the checkpoint timestamp. Diagnostic only.
    fn checkpoint_field(&self) -> &str;

    /// Read at most `limit` in-range documents after skipping the first `skip`.
    async fn read(&self, range: &DateRange, skip: usize, limit: usize) -> Result<Vec<Document>>;

    /// Row offset of the first in-range document at or after `checkpoint`.
    ///
    /// Every document before the returned offset has a download time strictly
    /// earlier than `checkpoint`.
    async fn initial_skip(&self, range: &DateRange, checkpoint: DateTime<Utc>) -> Result<usize>;

    /// Total documents in range.
    async fn count(&self, range: &DateRange) -> Result<usize>;
}

/// Build the configured source backend.
pub async fn from_config(config: &SourceConfig) -> Result<Box<dyn DocumentSource>> {
    match config.kind.as_str() {
        "sqlite" => Ok(Box::new(sqlite::SqliteSource::open(config).await?)),
        other => anyhow::bail!("Unknown source kind: '{}'", other),
    }
}
