//! Load raw articles into a local SQLite source.
//!
//! Reads JSON Lines, one article per line:
//!
//! ```json
//! {"url": "https://…", "download_time": "2024-10-22T08:00:00Z", "title": "…", "content": "<html>…"}
//! ```
//!
//! `publish_time` and `title` are optional. Rows whose url already exists are
//! left untouched. Used by `fx import`.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::config::SourceConfig;
use crate::db;
use crate::migrate::create_source_schema;
use crate::models::Document;
use crate::source::sqlite::insert_documents;

const INSERT_BATCH: usize = 500;

#[derive(Debug, Deserialize)]
struct ImportLine {
    url: String,
    download_time: DateTime<Utc>,
    #[serde(default)]
    publish_time: Option<DateTime<Utc>>,
    #[serde(default)]
    title: Option<String>,
    content: String,
}

impl From<ImportLine> for Document {
    fn from(line: ImportLine) -> Self {
        Document {
            url: line.url,
            download_time: line.download_time,
            publish_time: line.publish_time,
            title: line.title,
            content: line.content,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportStats {
    pub read: usize,
    pub inserted: u64,
}

/// Parse one JSONL stream into documents, skipping blank lines.
fn parse_lines<R: BufRead>(reader: R) -> Result<Vec<Document>> {
    let mut docs = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let parsed: ImportLine =
            serde_json::from_str(&line).with_context(|| format!("line {}: invalid article", i + 1))?;
        docs.push(parsed.into());
    }
    Ok(docs)
}

pub async fn import_jsonl(source: &SourceConfig, path: &Path) -> Result<ImportStats> {
    if source.kind != "sqlite" {
        anyhow::bail!("fx import only supports sqlite sources");
    }

    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open import file: {}", path.display()))?;
    let docs = parse_lines(BufReader::new(file))?;

    let pool = db::connect(&source.path).await?;
    create_source_schema(&pool, source).await?;

    let mut stats = ImportStats {
        read: docs.len(),
        inserted: 0,
    };
    for batch in docs.chunks(INSERT_BATCH) {
        stats.inserted += insert_documents(&pool, source, batch).await?;
    }
    pool.close().await;

    tracing::info!(read = stats.read, inserted = stats.inserted, "import finished");
    Ok(stats)
}
