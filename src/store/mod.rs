//! Result store abstraction.
//!
//! The [`ResultStore`] trait defines everything the pipeline needs from the
//! place enriched documents are persisted: the derived checkpoint, the dedup
//! lookup, and a duplicate-tolerant batch insert.
//!
//! Implementations must be `Send + Sync`; a single store instance is shared
//! by the controller for the whole run.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{DateRange, WriteableDocument};

/// Abstract storage backend for enriched documents.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`last_checkpoint`](ResultStore::last_checkpoint) | Latest stored download time in a range |
/// | [`non_saved_urls`](ResultStore::non_saved_urls) | Dedup: which urls are not stored yet |
/// | [`write`](ResultStore::write) | Batch insert, skipping duplicate urls |
/// | [`get`](ResultStore::get) | Fetch one stored document by url |
/// | [`count`](ResultStore::count) | Stored documents in a range |
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Maximum `download_time` already stored within `range`, if any.
    ///
    /// This is the pipeline's checkpoint. It is derived from stored rows,
    /// never persisted on its own.
    async fn last_checkpoint(&self, range: &DateRange) -> Result<Option<DateTime<Utc>>>;

    /// The subset of `urls` with no stored document, in input order.
    async fn non_saved_urls(&self, urls: &[String]) -> Result<Vec<String>>;

    /// Insert a batch. Documents whose url is already stored are skipped
    /// silently; any other failure is returned.
    async fn write(&self, docs: &[WriteableDocument]) -> Result<()>;

    async fn get(&self, url: &str) -> Result<Option<WriteableDocument>>;

    async fn count(&self, range: &DateRange) -> Result<usize>;
}
