//! In-memory [`DocumentSource`] for tests and dry runs.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock};

use super::DocumentSource;
use crate::models::{DateRange, Document};

/// Holds documents sorted by `(download_time, url)`, matching the SQLite
/// backend's ordering. Records every `read` offset for inspection.
pub struct InMemorySource {
    docs: RwLock<Vec<Document>>,
    reads: Mutex<Vec<usize>>,
    read_calls: AtomicUsize,
}

impl InMemorySource {
    pub fn new(mut docs: Vec<Document>) -> Self {
        docs.sort_by(|a, b| {
            a.download_time
                .cmp(&b.download_time)
                .then_with(|| a.url.cmp(&b.url))
        });
        Self {
            docs: RwLock::new(docs),
            reads: Mutex::new(Vec::new()),
            read_calls: AtomicUsize::new(0),
        }
    }

    /// `skip` values passed to [`read`](DocumentSource::read), in call order.
    pub fn read_offsets(&self) -> Vec<usize> {
        self.reads.lock().unwrap().clone()
    }

    pub fn read_calls(&self) -> usize {
        self.read_calls.load(Ordering::SeqCst)
    }

    fn in_range(&self, range: &DateRange) -> Vec<Document> {
        self.docs
            .read()
            .unwrap()
            .iter()
            .filter(|d| range.contains(d.download_time))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl DocumentSource for InMemorySource {
    fn name(&self) -> String {
        "memory".to_string()
    }

    fn content_field(&self) -> &str {
        "content"
    }

    fn checkpoint_field(&self) -> &str {
        "download_time"
    }

    async fn read(&self, range: &DateRange, skip: usize, limit: usize) -> Result<Vec<Document>> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        self.reads.lock().unwrap().push(skip);
        Ok(self
            .in_range(range)
            .into_iter()
            .skip(skip)
            .take(limit)
            .collect())
    }

    async fn initial_skip(&self, range: &DateRange, checkpoint: DateTime<Utc>) -> Result<usize> {
        Ok(self
            .in_range(range)
            .iter()
            .filter(|d| d.download_time < checkpoint)
            .count())
    }

    async fn count(&self, range: &DateRange) -> Result<usize> {
        Ok(self.in_range(range).len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_document_fields() {
        let source = InMemorySource::new(Vec::new());
        assert_eq!(source.content_field(), "content");
        assert_eq!(source.checkpoint_field(), "download_time");
    }
}
