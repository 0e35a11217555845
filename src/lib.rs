//! # Feature Extractor
//!
//! A resumable, rate-limited pipeline that turns raw financial news articles
//! into structured records with an LLM.
//!
//! Articles are read page by page from a [`source`], filtered against the
//! [`store`] by url, enriched a few at a time, and written back after every
//! chunk. A run that crashes or is interrupted picks up from the latest
//! stored download time without redoing finished work.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────────────────────┐   ┌──────────────┐
//! │    Source    │──▶│           Pipeline           │──▶│ Result store │
//! │ SQLite table │   │ page ▸ dedup ▸ chunk ▸ write │   │    SQLite    │
//! └──────────────┘   └──────────────┬───────────────┘   └──────────────┘
//!                                   │
//!                          ┌────────▼────────┐
//!                          │  Provider gate  │
//!                          │ round-robin LLM │
//!                          └─────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! fx init                                   # create tables
//! fx import ./articles.jsonl                # load raw articles
//! fx run --start 2024-10-22 --end 2024-10-25
//! fx status --start 2024-10-22 --end 2024-10-25
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Articles, extracted records, persisted documents |
//! | [`source`] | Paginated article sources |
//! | [`store`] | Result store with derived checkpoint |
//! | [`provider`] | Rate-limited provider gate |
//! | [`openai`] | OpenAI-compatible structured extraction client |
//! | [`schema`] | Strict JSON schema for structured output |
//! | [`normalize`] | Readable text from article HTML |
//! | [`enrich`] | Per-article retry loop |
//! | [`extractor`] | Concurrent chunk extraction |
//! | [`pipeline`] | Resume & dedup controller |
//! | [`progress`] | Run progress on stderr |
//! | [`status`] | `fx status` summary |
//! | [`import`] | JSONL article import |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |

pub mod config;
pub mod db;
pub mod enrich;
pub mod extractor;
pub mod import;
pub mod migrate;
pub mod models;
pub mod normalize;
pub mod openai;
pub mod pipeline;
pub mod progress;
pub mod provider;
pub mod schema;
pub mod source;
pub mod status;
pub mod store;
