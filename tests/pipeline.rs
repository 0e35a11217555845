//! End-to-end pipeline tests over real SQLite files.
//!
//! The LLM side is replaced by scripted clients behind a fake provider gate;
//! source and result store are the production SQLite backends.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use feature_extractor::config::{parse_config, Config};
use feature_extractor::db;
use feature_extractor::enrich::{ArticleEnricher, RetryPolicy};
use feature_extractor::extractor::ChunkExtractor;
use feature_extractor::migrate::{create_result_schema, create_source_schema};
use feature_extractor::models::{
    DateRange, Document, ExtractedRecord, FinancialEvent, FinancialEventWithSymbol,
    SymbolLookup, WriteableDocument,
};
use feature_extractor::pipeline::{ExtractorPipeline, PipelineOptions};
use feature_extractor::provider::{GateError, LlmClient, LlmError, LlmHandle, ProviderGate};
use feature_extractor::source::sqlite::{insert_documents, SqliteSource};
use feature_extractor::source::DocumentSource;
use feature_extractor::store::sqlite::SqliteResultStore;
use feature_extractor::store::ResultStore;

// ─── Fakes ──────────────────────────────────────────────────────────

type EventLog = Arc<Mutex<Vec<String>>>;

fn record(summary: &str) -> ExtractedRecord {
    ExtractedRecord {
        summary: summary.to_string(),
        main_company: "Acme Corp".to_string(),
        financial_event_with_symbols: vec![FinancialEventWithSymbol {
            financial_event: FinancialEvent::FinancialReport,
            symbol: SymbolLookup {
                symbol: "ACME".to_string(),
                stock_exchanges: vec!["NYSE".to_string()],
            },
        }],
        keywords: vec![],
        sentiments: vec![],
        article_language: "en".to_string(),
        external_links: vec![],
        entities: vec![],
        relationships: vec![],
    }
}

/// Summarizes each article as its own text and logs every call.
struct RecordingClient {
    events: EventLog,
    calls: AtomicUsize,
}

#[async_trait]
impl LlmClient for RecordingClient {
    fn model_name(&self) -> &str {
        "recording-model"
    }

    async fn extract(&self, text: &str, _max_retries: u32) -> Result<ExtractedRecord, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.events.lock().unwrap().push(format!("extract {}", text));
        tokio::task::yield_now().await;
        Ok(record(text))
    }
}

struct ReadyGate(LlmHandle);

#[async_trait]
impl ProviderGate for ReadyGate {
    fn provide(&self) -> Result<LlmHandle, GateError> {
        Ok(self.0.clone())
    }

    async fn await_next_ready(&self) {
        tokio::task::yield_now().await;
    }
}

/// Delegates to SQLite, logs each write, and fails every write after the
/// first `crash_after` to simulate the process dying mid-run.
struct ObservedStore {
    inner: SqliteResultStore,
    events: EventLog,
    crash_after: Option<usize>,
    writes: AtomicUsize,
}

#[async_trait]
impl ResultStore for ObservedStore {
    async fn last_checkpoint(&self, range: &DateRange) -> Result<Option<DateTime<Utc>>> {
        self.inner.last_checkpoint(range).await
    }

    async fn non_saved_urls(&self, urls: &[String]) -> Result<Vec<String>> {
        self.inner.non_saved_urls(urls).await
    }

    async fn write(&self, docs: &[WriteableDocument]) -> Result<()> {
        let n = self.writes.fetch_add(1, Ordering::SeqCst);
        if let Some(limit) = self.crash_after {
            if n >= limit {
                anyhow::bail!("simulated crash");
            }
        }
        self.events.lock().unwrap().push(format!("write {}", docs.len()));
        self.inner.write(docs).await
    }

    async fn get(&self, url: &str) -> Result<Option<WriteableDocument>> {
        self.inner.get(url).await
    }

    async fn count(&self, range: &DateRange) -> Result<usize> {
        self.inner.count(range).await
    }
}

// ─── Harness ────────────────────────────────────────────────────────

struct Env {
    _tmp: TempDir,
    config: Config,
}

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 10, 22, 6, 0, 0).unwrap()
}

fn article(i: usize) -> Document {
    Document {
        url: format!("https://news.example.com/article/{:03}", i),
        download_time: base_time() + ChronoDuration::minutes(i as i64),
        publish_time: Some(base_time() - ChronoDuration::hours(1)),
        title: Some(format!("Article {}", i)),
        content: format!("<html><body><p>article {}</p></body></html>", i),
    }
}

fn range() -> DateRange {
    DateRange::parse("2024-10-22", "2024-10-23").unwrap()
}

async fn env_with_articles(n: usize) -> Env {
    let tmp = TempDir::new().unwrap();
    let config = parse_config(&format!(
        "[db]\npath = \"{0}/results.sqlite\"\n\n[source]\npath = \"{0}/news.sqlite\"\n",
        tmp.path().display()
    ))
    .unwrap();

    let pool = db::connect(&config.source.path).await.unwrap();
    create_source_schema(&pool, &config.source).await.unwrap();
    let docs: Vec<Document> = (0..n).map(article).collect();
    insert_documents(&pool, &config.source, &docs).await.unwrap();
    pool.close().await;

    Env { _tmp: tmp, config }
}

impl Env {
    async fn store(&self, events: EventLog, crash_after: Option<usize>) -> Arc<ObservedStore> {
        let pool = db::connect(&self.config.db.path).await.unwrap();
        create_result_schema(&pool).await.unwrap();
        Arc::new(ObservedStore {
            inner: SqliteResultStore::new(pool),
            events,
            crash_after,
            writes: AtomicUsize::new(0),
        })
    }

    async fn source(&self) -> Arc<SqliteSource> {
        Arc::new(SqliteSource::open(&self.config.source).await.unwrap())
    }
}

fn pipeline(
    source: Arc<SqliteSource>,
    store: Arc<ObservedStore>,
    client: Arc<RecordingClient>,
    options: PipelineOptions,
) -> ExtractorPipeline {
    let enricher = ArticleEnricher::new(Arc::new(ReadyGate(client)), RetryPolicy::unbounded(), 3);
    ExtractorPipeline::new(
        source,
        store,
        ChunkExtractor::new(Arc::new(enricher)),
        options,
    )
}

fn client(events: &EventLog) -> Arc<RecordingClient> {
    Arc::new(RecordingClient {
        events: events.clone(),
        calls: AtomicUsize::new(0),
    })
}

fn options(page_size: usize, chunk_size: usize) -> PipelineOptions {
    PipelineOptions {
        page_size,
        chunk_size,
        chunk_retries: 0,
        single_write: false,
        from_start: false,
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn each_chunk_is_written_before_the_next_starts() {
    let env = env_with_articles(12).await;
    let events: EventLog = Arc::new(Mutex::new(Vec::new()));
    let store = env.store(events.clone(), None).await;

    let summary = pipeline(env.source().await, store.clone(), client(&events), options(100, 5))
        .run(&range())
        .await
        .unwrap();

    let shape: Vec<String> = events
        .lock()
        .unwrap()
        .iter()
        .map(|e| {
            if e.starts_with("extract") {
                "extract".to_string()
            } else {
                e.clone()
            }
        })
        .collect();
    let mut expected = Vec::new();
    for size in [5usize, 5, 2] {
        expected.extend(std::iter::repeat("extract".to_string()).take(size));
        expected.push(format!("write {}", size));
    }
    assert_eq!(shape, expected);
    assert_eq!(summary.enriched, 12);
    assert_eq!(store.count(&range()).await.unwrap(), 12);
}

#[tokio::test]
async fn results_are_stored_under_their_own_url() {
    let env = env_with_articles(7).await;
    let events: EventLog = Arc::new(Mutex::new(Vec::new()));
    let store = env.store(events.clone(), None).await;

    pipeline(env.source().await, store.clone(), client(&events), options(3, 5))
        .run(&range())
        .await
        .unwrap();

    for i in 0..7 {
        let stored = store.get(&article(i).url).await.unwrap().unwrap();
        assert_eq!(stored.record.summary, format!("article {}", i));
        assert_eq!(stored.article_title, Some(format!("Article {}", i)));
        assert_eq!(stored.download_time, article(i).download_time);
        assert_eq!(stored.model_name, "recording-model");
    }
}

#[tokio::test]
async fn rerunning_a_range_is_idempotent() {
    let env = env_with_articles(9).await;
    let events: EventLog = Arc::new(Mutex::new(Vec::new()));
    let store = env.store(events.clone(), None).await;

    pipeline(env.source().await, store.clone(), client(&events), options(4, 3))
        .run(&range())
        .await
        .unwrap();

    let second_client = client(&events);
    let summary = pipeline(env.source().await, store.clone(), second_client.clone(), options(4, 3))
        .run(&range())
        .await
        .unwrap();

    assert_eq!(second_client.calls.load(Ordering::SeqCst), 0);
    assert_eq!(summary.enriched, 0);
    assert_eq!(store.count(&range()).await.unwrap(), 9);
}

#[tokio::test]
async fn restart_after_crash_converges_to_every_document_once() {
    let env = env_with_articles(11).await;
    let events: EventLog = Arc::new(Mutex::new(Vec::new()));

    // First run dies on its third write.
    let crashing = env.store(events.clone(), Some(2)).await;
    let first = pipeline(env.source().await, crashing, client(&events), options(4, 2))
        .run(&range())
        .await;
    assert!(first.is_err());

    let store = env.store(events.clone(), None).await;
    assert_eq!(store.count(&range()).await.unwrap(), 4);

    let second_client = client(&events);
    let summary = pipeline(env.source().await, store.clone(), second_client.clone(), options(4, 2))
        .run(&range())
        .await
        .unwrap();

    assert_eq!(summary.enriched, 7);
    assert_eq!(second_client.calls.load(Ordering::SeqCst), 7);
    assert_eq!(store.count(&range()).await.unwrap(), 11);
    for i in 0..11 {
        assert!(store.get(&article(i).url).await.unwrap().is_some());
    }
}

#[tokio::test]
async fn resume_offset_skips_documents_before_checkpoint() {
    let env = env_with_articles(10).await;
    let events: EventLog = Arc::new(Mutex::new(Vec::new()));
    let store = env.store(events.clone(), None).await;

    // Seed articles 0..=5 as already enriched; checkpoint = article 5.
    let seeded: Vec<WriteableDocument> = (0..6)
        .map(|i| WriteableDocument {
            url: article(i).url,
            download_time: article(i).download_time,
            publish_time: article(i).publish_time,
            article_title: article(i).title,
            record: record("seeded"),
            model_name: "seed".to_string(),
        })
        .collect();
    store.inner.write(&seeded).await.unwrap();

    let source = env.source().await;
    let checkpoint = store.last_checkpoint(&range()).await.unwrap().unwrap();
    assert_eq!(checkpoint, article(5).download_time);
    assert_eq!(source.initial_skip(&range(), checkpoint).await.unwrap(), 5);

    let summary = pipeline(source, store.clone(), client(&events), options(100, 5))
        .run(&range())
        .await
        .unwrap();

    assert_eq!(summary.start_skip, 5);
    assert_eq!(summary.documents_read, 5);
    assert_eq!(summary.skipped_existing, 1);
    assert_eq!(summary.enriched, 4);
}

#[tokio::test]
async fn duplicate_in_batch_does_not_fail_the_write() {
    let env = env_with_articles(0).await;
    let events: EventLog = Arc::new(Mutex::new(Vec::new()));
    let store = env.store(events, None).await;

    let batch: Vec<WriteableDocument> = (0..5)
        .map(|i| WriteableDocument {
            url: article(i).url,
            download_time: article(i).download_time,
            publish_time: None,
            article_title: None,
            record: record(&format!("doc {}", i)),
            model_name: "m".to_string(),
        })
        .collect();
    store.write(&batch[2..3]).await.unwrap();

    store.write(&batch).await.unwrap();

    for doc in &batch {
        assert!(store.get(&doc.url).await.unwrap().is_some());
    }
    assert_eq!(store.count(&range()).await.unwrap(), 5);
}
