//! Chunked concurrency: enrich a small batch of documents at once.
//!
//! Every document of a chunk gets its own concurrent [`ArticleEnricher::extract`]
//! future, driven on the caller's task. Results come back in input order.
//! A chunk either succeeds as a whole or is reported as failed with no
//! partial results.

use std::sync::Arc;
use std::time::Duration;

use futures::future::try_join_all;

use crate::enrich::{ArticleEnricher, EnrichError};
use crate::models::{Document, EnrichmentResult};

/// Outcome of one chunk. `results[i]` belongs to the chunk's `documents[i]`.
#[derive(Debug, Default)]
pub struct ChunkOutcome {
    pub results: Vec<EnrichmentResult>,
    pub failed: bool,
}

impl ChunkOutcome {
    fn failed() -> Self {
        Self {
            results: Vec::new(),
            failed: true,
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum ChunkError {
    #[error(transparent)]
    Enrich(#[from] EnrichError),
    #[error("chunk exceeded {0:?}")]
    Timeout(Duration),
}

/// 1-based chunk number for logs and progress output.
pub fn chunk_number(chunk_index: usize) -> usize {
    chunk_index + 1
}

pub struct ChunkExtractor {
    enricher: Arc<ArticleEnricher>,
    chunk_timeout: Option<Duration>,
}

impl ChunkExtractor {
    pub fn new(enricher: Arc<ArticleEnricher>) -> Self {
        Self {
            enricher,
            chunk_timeout: None,
        }
    }

    /// Bound the whole fan-out of a chunk.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.chunk_timeout = timeout;
        self
    }

    /// Enrich `documents` concurrently. `chunk_index` is 0-based within the
    /// page and only used for logs.
    pub async fn extract_chunk(&self, documents: &[Document], chunk_index: usize) -> ChunkOutcome {
        match self.run(documents, chunk_index).await {
            Ok(results) => ChunkOutcome {
                results,
                failed: false,
            },
            Err(e) => {
                tracing::warn!(
                    chunk = chunk_number(chunk_index),
                    "Error extracting chunk: {}",
                    e
                );
                ChunkOutcome::failed()
            }
        }
    }

    async fn run(
        &self,
        documents: &[Document],
        chunk_index: usize,
    ) -> Result<Vec<EnrichmentResult>, ChunkError> {
        let total = documents.len();
        let chunk = chunk_number(chunk_index);
        let fan_out = try_join_all(documents.iter().enumerate().map(|(j, doc)| {
            let enricher = &self.enricher;
            async move {
                tracing::info!("Extracting doc {} of {} in chunk {}", j + 1, total, chunk);
                enricher.extract(&doc.content).await
            }
        }));

        match self.chunk_timeout {
            Some(limit) => tokio::time::timeout(limit, fan_out)
                .await
                .map_err(|_| ChunkError::Timeout(limit))?
                .map_err(ChunkError::from),
            None => fan_out.await.map_err(ChunkError::from),
        }
    }
}
