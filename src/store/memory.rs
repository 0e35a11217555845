//! In-memory [`ResultStore`] for tests and dry runs.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

use super::ResultStore;
use crate::models::{DateRange, WriteableDocument};

#[derive(Default)]
pub struct InMemoryResultStore {
    docs: Mutex<HashMap<String, WriteableDocument>>,
    batches: Mutex<Vec<Vec<String>>>,
    fail_writes: Mutex<usize>,
}

impl InMemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate without recording a write batch.
    pub fn seed(&self, docs: Vec<WriteableDocument>) {
        let mut map = self.docs.lock().unwrap();
        for doc in docs {
            map.entry(doc.url.clone()).or_insert(doc);
        }
    }

    /// Urls passed to each successful [`write`](ResultStore::write), in call order.
    pub fn write_batches(&self) -> Vec<Vec<String>> {
        self.batches.lock().unwrap().clone()
    }

    /// Make the next `n` writes fail with a non-duplicate error.
    pub fn fail_next_writes(&self, n: usize) {
        *self.fail_writes.lock().unwrap() = n;
    }

    pub fn len(&self) -> usize {
        self.docs.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ResultStore for InMemoryResultStore {
    async fn last_checkpoint(&self, range: &DateRange) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .docs
            .lock()
            .unwrap()
            .values()
            .map(|d| d.download_time)
            .filter(|t| range.contains(*t))
            .max())
    }

    async fn non_saved_urls(&self, urls: &[String]) -> Result<Vec<String>> {
        let docs = self.docs.lock().unwrap();
        Ok(urls
            .iter()
            .filter(|u| !docs.contains_key(*u))
            .cloned()
            .collect())
    }

    async fn write(&self, docs: &[WriteableDocument]) -> Result<()> {
        {
            let mut failing = self.fail_writes.lock().unwrap();
            if *failing > 0 {
                *failing -= 1;
                anyhow::bail!("result store unavailable");
            }
        }

        let mut map = self.docs.lock().unwrap();
        for doc in docs {
            map.entry(doc.url.clone()).or_insert_with(|| doc.clone());
        }
        self.batches
            .lock()
            .unwrap()
            .push(docs.iter().map(|d| d.url.clone()).collect());
        Ok(())
    }

    async fn get(&self, url: &str) -> Result<Option<WriteableDocument>> {
        Ok(self.docs.lock().unwrap().get(url).cloned())
    }

    async fn count(&self, range: &DateRange) -> Result<usize> {
        Ok(self
            .docs
            .lock()
            .unwrap()
            .values()
            .filter(|d| range.contains(d.download_time))
            .count())
    }
}
