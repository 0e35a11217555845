//! Run progress reporting.
//!
//! Reports observable progress during `fx run` so users see where the run
//! resumed, which page is being processed, and how each chunk went.
//! Progress is emitted on **stderr** so stdout remains parseable for scripts.

use std::io::Write;

use crate::extractor::chunk_number;

/// A single progress event for a pipeline run.
#[derive(Clone, Debug, PartialEq)]
pub enum RunProgressEvent {
    /// Resume offset computed. `checkpoint` is RFC 3339 when present.
    Resuming {
        checkpoint: Option<String>,
        skip: u64,
        total: u64,
    },
    /// A page was read and filtered against the result store.
    Page {
        skip: u64,
        read: u64,
        new: u64,
    },
    /// A chunk finished, written or failed.
    Chunk {
        index: u64,
        chunks: u64,
        written: u64,
        failed: bool,
    },
}

/// Reports run progress. Implementations write to stderr (human or JSON).
pub trait RunProgressReporter: Send + Sync {
    fn report(&self, event: RunProgressEvent);
}

/// Human-friendly progress on stderr: "run  page @1,200  100 read, 37 new".
pub struct StderrProgress;

impl RunProgressReporter for StderrProgress {
    fn report(&self, event: RunProgressEvent) {
        let line = match &event {
            RunProgressEvent::Resuming {
                checkpoint,
                skip,
                total,
            } => match checkpoint {
                Some(cp) => format!(
                    "run  resuming after {}  skipping {} / {} documents\n",
                    cp,
                    format_number(*skip),
                    format_number(*total)
                ),
                None => format!(
                    "run  starting fresh  {} documents in range\n",
                    format_number(*total)
                ),
            },
            RunProgressEvent::Page { skip, read, new } => format!(
                "run  page @{}  {} read, {} new\n",
                format_number(*skip),
                format_number(*read),
                format_number(*new)
            ),
            RunProgressEvent::Chunk {
                index,
                chunks,
                written,
                failed,
            } => {
                if *failed {
                    format!("run  chunk {}/{}  failed\n", chunk_number(*index as usize), chunks)
                } else {
                    format!(
                        "run  chunk {}/{}  {} written\n",
                        chunk_number(*index as usize),
                        chunks,
                        written
                    )
                }
            }
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl RunProgressReporter for JsonProgress {
    fn report(&self, event: RunProgressEvent) {
        let obj = match &event {
            RunProgressEvent::Resuming {
                checkpoint,
                skip,
                total,
            } => serde_json::json!({
                "event": "resuming",
                "checkpoint": checkpoint,
                "skip": skip,
                "total": total
            }),
            RunProgressEvent::Page { skip, read, new } => serde_json::json!({
                "event": "page",
                "skip": skip,
                "read": read,
                "new": new
            }),
            RunProgressEvent::Chunk {
                index,
                chunks,
                written,
                failed,
            } => serde_json::json!({
                "event": "chunk",
                "index": index,
                "chunks": chunks,
                "written": written,
                "failed": failed
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl RunProgressReporter for NoProgress {
    fn report(&self, _event: RunProgressEvent) {}
}

pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn parse(value: &str) -> anyhow::Result<Self> {
        match value {
            "off" => Ok(ProgressMode::Off),
            "human" => Ok(ProgressMode::Human),
            "json" => Ok(ProgressMode::Json),
            other => anyhow::bail!("Unknown progress mode '{}'. Use human, json or off.", other),
        }
    }

    pub fn reporter(&self) -> Box<dyn RunProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
