use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::{Config, SourceConfig};
use crate::db;
use crate::source::sqlite::quote_ident;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(&config.db.path).await?;
    create_result_schema(&pool).await?;
    pool.close().await;

    let source_pool = db::connect(&config.source.path).await?;
    create_source_schema(&source_pool, &config.source).await?;
    source_pool.close().await;

    Ok(())
}

/// Create the extracted-documents table. `url` is the primary key so a
/// duplicate insert can be detected and skipped at the database level.
pub async fn create_result_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS extracted_documents (
            url TEXT PRIMARY KEY,
            download_time INTEGER NOT NULL,
            publish_time INTEGER,
            article_title TEXT,
            summary TEXT NOT NULL,
            main_company TEXT NOT NULL,
            article_language TEXT NOT NULL,
            record_json TEXT NOT NULL,
            model_name TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_extracted_download_time ON extracted_documents(download_time DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the raw article table for a local SQLite source, using the
/// configured column names. Timestamps are unix seconds.
pub async fn create_source_schema(pool: &SqlitePool, source: &SourceConfig) -> Result<()> {
    let table = quote_ident(&source.table);
    let ddl = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {table} (
            {url} TEXT PRIMARY KEY,
            {download_time} INTEGER NOT NULL,
            {publish_time} INTEGER,
            {title} TEXT,
            {content} TEXT NOT NULL
        )
        "#,
        table = table,
        url = quote_ident(&source.url_column),
        download_time = quote_ident(&source.download_time_column),
        publish_time = quote_ident(&source.publish_time_column),
        title = quote_ident(&source.title_column),
        content = quote_ident(&source.content_column),
    );
    sqlx::query(&ddl).execute(pool).await?;

    let index = format!(
        "CREATE INDEX IF NOT EXISTS {} ON {}({})",
        quote_ident(&format!("idx_{}_download_time", source.table)),
        table,
        quote_ident(&source.download_time_column),
    );
    sqlx::query(&index).execute(pool).await?;

    Ok(())
}
