use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgRow};
use sqlx::{Connection, Row};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::schema;
use super::{
    Chunk, IndexInfo, SearchQuery, SearchResult, SessionConfig, StoreSession, TableSpec,
    TableSummary, VectorStore, vector_literal,
};
use crate::config::DatabaseConfig;
use crate::{AnnError, Result};

#[cfg(test)]
mod tests;

/// pgvector-backed store; every session owns a dedicated connection
#[derive(Debug, Clone)]
pub struct PgStore {
    database: DatabaseConfig,
    insert_batch_size: usize,
}

impl PgStore {
    #[inline]
    pub fn new(database: DatabaseConfig, insert_batch_size: usize) -> Self {
        Self {
            database,
            insert_batch_size: insert_batch_size.max(1),
        }
    }

    #[inline]
    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.database.host)
            .port(self.database.port)
            .database(&self.database.name)
            .username(&self.database.user)
            .password(&self.database.password)
            .application_name("pgvector-ann")
    }

    async fn connect(&self) -> Result<PgConnection> {
        let timeout = Duration::from_secs(self.database.connect_timeout_secs);
        let options = self.connect_options();

        debug!(
            "Connecting to {}:{}/{}",
            self.database.host, self.database.port, self.database.name
        );

        match tokio::time::timeout(timeout, PgConnection::connect_with(&options)).await {
            Ok(Ok(conn)) => Ok(conn),
            Ok(Err(e)) => match AnnError::from(e) {
                AnnError::Database(message) => Err(AnnError::Connection(message)),
                other => Err(other),
            },
            Err(_) => Err(AnnError::Connection(format!(
                "timed out after {}s connecting to {}:{}",
                timeout.as_secs(),
                self.database.host,
                self.database.port
            ))),
        }
    }

    async fn public_tables(conn: &mut PgConnection) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT table_name::text AS table_name
            FROM information_schema.tables
            WHERE table_schema = 'public' AND table_type = 'BASE TABLE'
            ORDER BY table_name
            "#,
        )
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows.iter().map(|row| row.get("table_name")).collect())
    }
}

#[async_trait]
impl VectorStore for PgStore {
    async fn open(&self, config: &SessionConfig) -> Result<Box<dyn StoreSession>> {
        let mut conn = self.connect().await?;

        if let Some(directive) = config.index.session_directive() {
            debug!("Applying session directive: {}", directive);
            sqlx::query(&directive).execute(&mut conn).await?;
        }

        Ok(Box::new(PgSession {
            conn,
            config: config.clone(),
        }))
    }

    async fn setup(&self, config: &SessionConfig) -> Result<()> {
        let mut conn = self.connect().await?;

        sqlx::query(schema::CREATE_EXTENSION)
            .execute(&mut conn)
            .await?;

        let create_table = schema::create_table(&config.table);
        sqlx::query(&create_table).execute(&mut conn).await?;
        info!("Table {} is ready", config.table.name);

        if let Some(create_index) = schema::create_index(&config.index, &config.table) {
            info!("Building {} index on {}", config.index.label(), config.table.name);
            sqlx::query(&create_index).execute(&mut conn).await?;
        }

        conn.close().await?;
        Ok(())
    }

    async fn insert_chunks(&self, table: &TableSpec, chunks: &[Chunk]) -> Result<usize> {
        let mut conn = self.connect().await?;
        let sql = schema::insert_chunk(table);
        let mut inserted = 0;

        for batch in chunks.chunks(self.insert_batch_size) {
            let mut tx = conn.begin().await?;

            for chunk in batch {
                let page = i16::try_from(chunk.document_page).map_err(|_| {
                    AnnError::InvalidArgument(format!(
                        "page {} of {} does not fit the page column",
                        chunk.document_page, chunk.file_name
                    ))
                })?;

                sqlx::query(&sql)
                    .bind(&chunk.file_name)
                    .bind(page)
                    .bind(chunk.chunk_no)
                    .bind(&chunk.chunk_text)
                    .bind(&chunk.model)
                    .bind(chunk.prompt_tokens)
                    .bind(chunk.total_tokens)
                    .bind(chunk.created_date_time)
                    .bind(vector_literal(&chunk.chunk_vector))
                    .bind(&chunk.business_category)
                    .execute(&mut *tx)
                    .await?;
            }

            tx.commit().await?;
            inserted += batch.len();
            debug!("Inserted {}/{} chunks into {}", inserted, chunks.len(), table.name);
        }

        conn.close().await?;
        Ok(inserted)
    }

    async fn summary(&self) -> Result<Vec<TableSummary>> {
        let mut conn = self.connect().await?;
        let mut summaries = Vec::new();

        for name in Self::public_tables(&mut conn).await? {
            let columns: Vec<(String, String)> = sqlx::query(
                r#"
                SELECT column_name::text AS column_name, data_type::text AS data_type
                FROM information_schema.columns
                WHERE table_schema = 'public' AND table_name = $1
                ORDER BY ordinal_position
                "#,
            )
            .bind(&name)
            .fetch_all(&mut conn)
            .await?
            .iter()
            .map(|row| (row.get("column_name"), row.get("data_type")))
            .collect();

            let indexes: Vec<IndexInfo> = sqlx::query(
                r#"
                SELECT indexname::text AS indexname, indexdef
                FROM pg_indexes
                WHERE schemaname = 'public' AND tablename = $1
                ORDER BY indexname
                "#,
            )
            .bind(&name)
            .fetch_all(&mut conn)
            .await?
            .iter()
            .map(index_info)
            .collect();

            let row_count: i64 = sqlx::query(&schema::count_rows(&quote_identifier(&name)))
                .fetch_one(&mut conn)
                .await?
                .get(0);

            summaries.push(TableSummary {
                name,
                row_count,
                columns,
                indexes,
            });
        }

        conn.close().await?;
        Ok(summaries)
    }

    async fn drop_all_tables(&self) -> Result<Vec<String>> {
        let mut conn = self.connect().await?;
        let tables = Self::public_tables(&mut conn).await?;

        for name in &tables {
            warn!("Dropping table {}", name);
            let statement = format!("DROP TABLE IF EXISTS {} CASCADE", quote_identifier(name));
            sqlx::query(&statement).execute(&mut conn).await?;
        }

        conn.close().await?;
        Ok(tables)
    }
}

/// A single dedicated connection carrying the session directive
pub struct PgSession {
    conn: PgConnection,
    config: SessionConfig,
}

#[async_trait]
impl StoreSession for PgSession {
    fn config(&self) -> &SessionConfig {
        &self.config
    }

    async fn query(&mut self, query: &SearchQuery, vector: &[f32]) -> Result<Vec<SearchResult>> {
        let limit = i64::try_from(query.top_n)
            .map_err(|_| AnnError::InvalidArgument(format!("top_n {} is too large", query.top_n)))?;
        let sql = query.to_sql();

        let rows = sqlx::query(&sql)
            .bind(vector_literal(vector))
            .bind(limit)
            .fetch_all(&mut self.conn)
            .await?;

        rows.iter().map(search_result).collect()
    }

    async fn row_count(&mut self) -> Result<i64> {
        let count: i64 = sqlx::query(&schema::count_rows(&self.config.table.name))
            .fetch_one(&mut self.conn)
            .await?
            .get(0);
        Ok(count)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.conn.close().await?;
        Ok(())
    }
}

fn search_result(row: &PgRow) -> Result<SearchResult> {
    let page: i16 = row.try_get("document_page")?;
    Ok(SearchResult {
        file_name: row.try_get("file_name")?,
        page: i32::from(page),
        chunk_no: row.try_get("chunk_no")?,
        chunk_text: row.try_get("chunk_text")?,
        distance: row.try_get("distance")?,
    })
}

fn index_info(row: &PgRow) -> IndexInfo {
    let definition: String = row.get("indexdef");
    IndexInfo {
        name: row.get("indexname"),
        method: index_method(&definition),
        definition,
    }
}

/// Access method named in a `CREATE INDEX ... USING <method> (...)` definition
#[inline]
pub fn index_method(definition: &str) -> String {
    definition
        .split_whitespace()
        .skip_while(|word| !word.eq_ignore_ascii_case("USING"))
        .nth(1)
        .map(|method| method.trim_end_matches('(').to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

#[inline]
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
