//! Resume & dedup controller.
//!
//! Drives one run over a date range:
//!
//! ```text
//! ComputeResume ─► ReadPage ─► FilterNew ─► for each chunk: Extract ─► Persist
//!                     ▲                                                  │
//!                     └──────────────── skip += page_size ◄──────────────┘
//!                  (empty page ─► Done)
//! ```
//!
//! The resume offset comes from the result store's latest download time in
//! range, so a crashed run restarts close to where it stopped. Documents are
//! always filtered against the store by url before enrichment, which makes
//! re-running any range idempotent.
//!
//! Pages and chunks are processed strictly in sequence. Only the documents of
//! a single chunk are in flight at once, and each chunk is written before the
//! next one starts.

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;

use crate::config::{Config, PipelineConfig};
use crate::db;
use crate::enrich::{ArticleEnricher, RetryPolicy};
use crate::extractor::{chunk_number, ChunkExtractor, ChunkOutcome};
use crate::models::{DateRange, Document, WriteableDocument};
use crate::progress::{NoProgress, ProgressMode, RunProgressEvent, RunProgressReporter};
use crate::provider::RoundRobinGate;
use crate::source::{self, DocumentSource};
use crate::store::sqlite::SqliteResultStore;
use crate::store::ResultStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    pub page_size: usize,
    pub chunk_size: usize,
    /// Extra attempts for a failed chunk before the rest of its page is skipped.
    pub chunk_retries: u32,
    /// Chunk size 1, stop after the first chunk.
    pub single_write: bool,
    /// Ignore the checkpoint and read the range from offset 0. Stored urls are
    /// still filtered out, so only documents of earlier failed chunks are
    /// enriched again.
    pub from_start: bool,
}

impl PipelineOptions {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            page_size: config.page_size,
            chunk_size: config.chunk_size,
            chunk_retries: config.chunk_retries,
            single_write: false,
            from_start: false,
        }
    }

    fn effective_chunk_size(&self) -> usize {
        if self.single_write {
            1
        } else {
            self.chunk_size.max(1)
        }
    }
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

/// What a run did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    /// Offset the run resumed from.
    pub start_skip: usize,
    pub pages: usize,
    pub documents_read: usize,
    /// Read documents already present in the result store.
    pub skipped_existing: usize,
    pub enriched: usize,
    pub chunks_written: usize,
    pub chunks_failed: usize,
    /// Checkpoint after the run.
    pub checkpoint: Option<DateTime<Utc>>,
}

pub struct ExtractorPipeline {
    source: Arc<dyn DocumentSource>,
    store: Arc<dyn ResultStore>,
    extractor: ChunkExtractor,
    options: PipelineOptions,
    progress: Box<dyn RunProgressReporter>,
}

/// Whether the run goes on after a page.
enum PageFlow {
    Continue,
    Stop,
}

impl ExtractorPipeline {
    pub fn new(
        source: Arc<dyn DocumentSource>,
        store: Arc<dyn ResultStore>,
        extractor: ChunkExtractor,
        options: PipelineOptions,
    ) -> Self {
        Self {
            source,
            store,
            extractor,
            options,
            progress: Box::new(NoProgress),
        }
    }

    pub fn with_progress(mut self, progress: Box<dyn RunProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// Process every not-yet-stored document in `range`.
    pub async fn run(&self, range: &DateRange) -> Result<RunSummary> {
        let mut summary = RunSummary::default();

        let checkpoint = self.store.last_checkpoint(range).await?;
        let mut skip = match checkpoint {
            Some(_) if self.options.from_start => 0,
            Some(cp) => self.source.initial_skip(range, cp).await?,
            None => 0,
        };
        summary.start_skip = skip;

        let total = self.source.count(range).await?;
        tracing::info!(
            source = %self.source.name(),
            content_field = self.source.content_field(),
            checkpoint_field = self.source.checkpoint_field(),
            range = %range,
            checkpoint = ?checkpoint,
            skip,
            total,
            from_start = self.options.from_start,
            "starting extraction"
        );
        self.progress.report(RunProgressEvent::Resuming {
            checkpoint: checkpoint.map(|cp| cp.to_rfc3339()),
            skip: skip as u64,
            total: total as u64,
        });

        loop {
            let page = self
                .source
                .read(range, skip, self.options.page_size)
                .await?;
            if page.is_empty() {
                break;
            }
            summary.pages += 1;
            summary.documents_read += page.len();

            let flow = self.process_page(page, skip, &mut summary).await?;
            if let PageFlow::Stop = flow {
                break;
            }

            skip += self.options.page_size;
        }

        summary.checkpoint = self.store.last_checkpoint(range).await?;
        tracing::info!(
            pages = summary.pages,
            enriched = summary.enriched,
            skipped = summary.skipped_existing,
            chunks_failed = summary.chunks_failed,
            "extraction finished"
        );
        Ok(summary)
    }

    async fn process_page(
        &self,
        page: Vec<Document>,
        skip: usize,
        summary: &mut RunSummary,
    ) -> Result<PageFlow> {
        let read = page.len();
        let urls: Vec<String> = page.iter().map(|d| d.url.clone()).collect();
        let new_urls: HashSet<String> = self
            .store
            .non_saved_urls(&urls)
            .await?
            .into_iter()
            .collect();

        let new_docs: Vec<Document> = page
            .into_iter()
            .filter(|d| new_urls.contains(&d.url))
            .collect();
        summary.skipped_existing += read - new_docs.len();

        tracing::info!(skip, read, new = new_docs.len(), "page loaded");
        self.progress.report(RunProgressEvent::Page {
            skip: skip as u64,
            read: read as u64,
            new: new_docs.len() as u64,
        });

        let chunk_size = self.options.effective_chunk_size();
        let chunks = new_docs.len().div_ceil(chunk_size);

        for (index, chunk) in new_docs.chunks(chunk_size).enumerate() {
            tracing::info!("Extracting chunk {} of {}", chunk_number(index), chunks);
            let outcome = self.extract_with_retries(chunk, index).await;

            if outcome.failed {
                summary.chunks_failed += 1;
                self.progress.report(RunProgressEvent::Chunk {
                    index: index as u64,
                    chunks: chunks as u64,
                    written: 0,
                    failed: true,
                });
                tracing::warn!(
                    chunk = chunk_number(index),
                    remaining = chunks - index - 1,
                    "chunk failed, skipping the rest of the page; rerun with --from-start to retry it"
                );
                return Ok(if self.options.single_write {
                    PageFlow::Stop
                } else {
                    PageFlow::Continue
                });
            }

            let docs: Vec<WriteableDocument> = chunk
                .iter()
                .zip(outcome.results)
                .map(|(doc, result)| WriteableDocument::build(doc, result))
                .collect();

            if !docs.is_empty() {
                self.store.write(&docs).await?;
                summary.enriched += docs.len();
                summary.chunks_written += 1;
            }
            self.progress.report(RunProgressEvent::Chunk {
                index: index as u64,
                chunks: chunks as u64,
                written: docs.len() as u64,
                failed: false,
            });

            if self.options.single_write {
                return Ok(PageFlow::Stop);
            }
        }

        Ok(PageFlow::Continue)
    }

    async fn extract_with_retries(&self, chunk: &[Document], index: usize) -> ChunkOutcome {
        let mut attempt = 0u32;
        loop {
            let outcome = self.extractor.extract_chunk(chunk, index).await;
            if !outcome.failed || attempt >= self.options.chunk_retries {
                return outcome;
            }
            attempt += 1;
            tracing::warn!(chunk = chunk_number(index), attempt, "retrying failed chunk");
        }
    }
}

/// Wire the configured source, result store and providers, then run once.
pub async fn run_extract(
    config: &Config,
    range: &DateRange,
    single_write: bool,
    from_start: bool,
    progress: ProgressMode,
) -> Result<RunSummary> {
    let pool = db::connect(&config.db.path).await?;
    crate::migrate::create_result_schema(&pool).await?;
    let store = Arc::new(SqliteResultStore::new(pool));
    let source: Arc<dyn DocumentSource> = Arc::from(source::from_config(&config.source).await?);

    let gate = Arc::new(RoundRobinGate::from_config(&config.providers, &config.retry)?);
    let policy = RetryPolicy::from_config(&config.retry);
    if policy.is_unbounded() {
        tracing::info!("retry policy: unbounded");
    }
    let enricher = ArticleEnricher::new(gate, policy, config.retry.llm_max_retries);
    let extractor = ChunkExtractor::new(Arc::new(enricher)).with_timeout(
        config
            .pipeline
            .chunk_timeout_secs
            .map(std::time::Duration::from_secs),
    );

    let mut options = PipelineOptions::from_config(&config.pipeline);
    options.single_write = single_write;
    options.from_start = from_start;

    let pipeline = ExtractorPipeline::new(source, store.clone(), extractor, options)
        .with_progress(progress.reporter());
    let summary = pipeline.run(range).await;

    store.close().await;
    summary
}
