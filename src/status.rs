//! Run status overview.
//!
//! Shows how far extraction has progressed for a date range: the derived
//! checkpoint, how many source documents exist, and how many are already
//! enriched. Used by `fx status`.

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::config::Config;
use crate::db;
use crate::models::DateRange;
use crate::progress::format_number;
use crate::source::{self, DocumentSource};
use crate::store::sqlite::SqliteResultStore;
use crate::store::ResultStore;

#[derive(Debug, Clone, PartialEq)]
pub struct RangeStatus {
    pub checkpoint: Option<DateTime<Utc>>,
    pub source_count: usize,
    pub enriched: usize,
}

impl RangeStatus {
    pub fn remaining(&self) -> usize {
        self.source_count.saturating_sub(self.enriched)
    }

    pub fn percent(&self) -> u64 {
        if self.source_count == 0 {
            0
        } else {
            (self.enriched.min(self.source_count) as u64 * 100) / self.source_count as u64
        }
    }
}

pub async fn collect_status(
    source: &dyn DocumentSource,
    store: &dyn ResultStore,
    range: &DateRange,
) -> Result<RangeStatus> {
    Ok(RangeStatus {
        checkpoint: store.last_checkpoint(range).await?,
        source_count: source.count(range).await?,
        enriched: store.count(range).await?,
    })
}

/// Run the status command: query both databases and print a summary.
pub async fn run_status(config: &Config, range: &DateRange) -> Result<()> {
    let pool = db::connect(&config.db.path).await?;
    let store = SqliteResultStore::new(pool);
    let source = source::from_config(&config.source).await?;

    let status = collect_status(source.as_ref(), &store, range).await?;

    println!("Feature Extractor Status");
    println!("========================");
    println!();
    println!("  Result store: {}", config.db.path.display());
    println!("  Source:       {} ({})", source.name(), config.source.path.display());
    println!("  Range:        {}", range);
    println!();
    println!(
        "  Checkpoint:   {}",
        status
            .checkpoint
            .map(|cp| cp.to_rfc3339())
            .unwrap_or_else(|| "none".to_string())
    );
    println!("  Documents:    {}", format_number(status.source_count as u64));
    println!(
        "  Enriched:     {} / {} ({}%)",
        format_number(status.enriched as u64),
        format_number(status.source_count as u64),
        status.percent()
    );
    println!("  Remaining:    {}", format_number(status.remaining() as u64));

    store.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{fixtures, Document, EnrichmentResult, WriteableDocument};
    use crate::source::memory::InMemorySource;
    use crate::store::memory::InMemoryResultStore;
    use chrono::TimeZone;

    fn doc(i: u32) -> Document {
        Document {
            url: format!("https://news.example.com/{}", i),
            download_time: Utc.with_ymd_and_hms(2024, 10, 22, i, 0, 0).unwrap(),
            publish_time: None,
            title: None,
            content: "x".to_string(),
        }
    }

    #[tokio::test]
    async fn reports_progress_for_range() {
        let source = InMemorySource::new((0..4).map(doc).collect());
        let store = InMemoryResultStore::new();
        store.seed(vec![WriteableDocument::build(
            &doc(1),
            EnrichmentResult {
                record: fixtures::record("s"),
                model_name: "m".to_string(),
            },
        )]);
        let range = DateRange::parse("2024-10-22", "2024-10-23").unwrap();

        let status = collect_status(&source, &store, &range).await.unwrap();

        assert_eq!(status.source_count, 4);
        assert_eq!(status.enriched, 1);
        assert_eq!(status.remaining(), 3);
        assert_eq!(status.percent(), 25);
        assert_eq!(status.checkpoint, Some(doc(1).download_time));
    }

    #[test]
    fn empty_range_is_zero_percent() {
        let status = RangeStatus {
            checkpoint: None,
            source_count: 0,
            enriched: 0,
        };
        assert_eq!(status.percent(), 0);
    }
}
