//! pgvector chunk store
//!
//! Reads the chunk table directly with raw SQL. Every caller-supplied value,
//! filter keys included, travels as a bound parameter; the only interpolated
//! text is the table name, which is validated once at construction.

use crate::context::{Chunk, ChunkStore, Hit, MetadataFilter, RangeScan, ScanOrder};
use crate::db::DbPool;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use regex_lite::Regex;
use sea_orm::{ConnectionTrait, DbBackend, QueryResult, Statement, Value};
use tracing::debug;

const COLUMNS: &str = "id, document, metadata, filename, url";

const IDENTIFIER_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_]{0,62}$";

/// Chunk store over a pgvector table
#[derive(Clone)]
pub struct PgChunkStore {
    pool: DbPool,
    table: String,
}

impl PgChunkStore {
    /// Bind the store to `table`, which must be a plain SQL identifier
    pub fn new(pool: DbPool, table: &str) -> Result<Self> {
        Ok(Self {
            pool,
            table: quote_table(table)?,
        })
    }

    async fn query(&self, sql: String, values: Vec<Value>) -> Result<Vec<QueryResult>> {
        let stmt = Statement::from_sql_and_values(DbBackend::Postgres, &sql, values);
        self.pool
            .conn()
            .query_all(stmt)
            .await
            .map_err(AppError::from_store)
    }

    async fn id_bound(&self, aggregate: &str) -> Result<Option<i64>> {
        let sql = format!("SELECT {}(id) AS id FROM {}", aggregate, self.table);
        let rows = self.query(sql, Vec::new()).await?;
        match rows.first() {
            Some(row) => row.try_get::<Option<i64>>("", "id").map_err(AppError::from_store),
            None => Ok(None),
        }
    }
}

fn quote_table(table: &str) -> Result<String> {
    let pattern = Regex::new(IDENTIFIER_PATTERN).map_err(|e| AppError::Internal {
        message: format!("identifier pattern: {}", e),
    })?;
    if !pattern.is_match(table) {
        return Err(AppError::InvalidIdentifier {
            name: table.to_string(),
        });
    }
    Ok(format!("\"{}\"", table))
}

/// pgvector text form, e.g. `[0.1,0.2]`
fn vector_literal(embedding: &[f32]) -> String {
    let parts: Vec<String> = embedding.iter().map(|v| v.to_string()).collect();
    format!("[{}]", parts.join(","))
}

fn knn_statement(table: &str, query: &[f32], k: usize, filter: &MetadataFilter) -> (String, Vec<Value>) {
    let mut values: Vec<Value> = vec![vector_literal(query).into(), (k as i64).into()];
    let mut sql = format!(
        "SELECT {COLUMNS}, (embedding <-> $1::vector) AS distance FROM {table} WHERE embedding IS NOT NULL"
    );

    for (key, value) in filter.iter() {
        sql.push_str(&format!(
            " AND metadata ->> ${} = ${}",
            values.len() + 1,
            values.len() + 2
        ));
        values.push(key.to_string().into());
        values.push(value.to_string().into());
    }

    sql.push_str(" ORDER BY distance ASC, id ASC LIMIT $2");
    (sql, values)
}

fn range_statement(table: &str, scan: &RangeScan<'_>) -> (String, Vec<Value>) {
    let mut values: Vec<Value> = vec![scan.low.into(), scan.high.into()];

    let distance = match scan.distance_to {
        Some(query) => {
            values.push(vector_literal(query).into());
            format!("(embedding <-> ${}::vector)", values.len())
        }
        None => "NULL::float8".to_string(),
    };

    let mut sql = format!(
        "SELECT {COLUMNS}, {distance} AS distance FROM {table} WHERE id BETWEEN $1 AND $2"
    );

    sql.push_str(match scan.order {
        ScanOrder::Asc => " ORDER BY id ASC",
        ScanOrder::Desc => " ORDER BY id DESC",
    });
    (sql, values)
}

fn row_to_hit(row: &QueryResult) -> Result<Hit> {
    let id: i64 = row.try_get("", "id").map_err(AppError::from_store)?;
    let document: Option<String> = row.try_get("", "document").map_err(AppError::from_store)?;
    let metadata: Option<serde_json::Value> =
        row.try_get("", "metadata").map_err(AppError::from_store)?;
    let filename: Option<String> = row.try_get("", "filename").map_err(AppError::from_store)?;
    let url: Option<String> = row.try_get("", "url").map_err(AppError::from_store)?;
    let distance: Option<f64> = row.try_get("", "distance").map_err(AppError::from_store)?;

    let metadata = metadata.unwrap_or(serde_json::Value::Null);
    let source = filename
        .or_else(|| metadata.get("source").and_then(|s| s.as_str()).map(str::to_string))
        .unwrap_or_default();

    let mut chunk = Chunk::new(id, source, document.unwrap_or_default()).with_metadata(metadata);
    if let Some(url) = url {
        chunk = chunk.with_url(url);
    }

    Ok(Hit {
        chunk,
        distance: distance.map(|d| d as f32),
    })
}

#[async_trait]
impl ChunkStore for PgChunkStore {
    async fn knn(&self, query: &[f32], k: usize, filter: &MetadataFilter) -> Result<Vec<Hit>> {
        let (sql, values) = knn_statement(&self.table, query, k, filter);
        let rows = self.query(sql, values).await?;
        debug!(k, rows = rows.len(), "knn read");
        rows.iter().map(row_to_hit).collect()
    }

    async fn range_scan(&self, scan: &RangeScan<'_>) -> Result<Vec<Hit>> {
        if scan.is_empty() {
            return Ok(Vec::new());
        }
        let (sql, values) = range_statement(&self.table, scan);
        let rows = self.query(sql, values).await?;
        rows.iter().map(row_to_hit).collect()
    }

    async fn min_id(&self) -> Result<Option<i64>> {
        self.id_bound("MIN").await
    }

    async fn max_id(&self) -> Result<Option<i64>> {
        self.id_bound("MAX").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_names_validated() {
        assert_eq!(quote_table("langchain_document").unwrap(), "\"langchain_document\"");
        assert_eq!(quote_table("_kb2").unwrap(), "\"_kb2\"");

        let long = "t".repeat(64);
        for bad in ["", "2fast", "docs; DROP TABLE x", "a-b", "\"quoted\"", long.as_str()] {
            assert!(matches!(quote_table(bad), Err(AppError::InvalidIdentifier { .. })), "{bad}");
        }
    }

    #[test]
    fn test_vector_literal() {
        assert_eq!(vector_literal(&[0.5, -1.0, 2.25]), "[0.5,-1,2.25]");
        assert_eq!(vector_literal(&[]), "[]");
    }

    #[test]
    fn test_knn_statement_binds_filter() {
        let filter = MetadataFilter::new().with("lang", "en").with("kind", "faq");
        let (sql, values) = knn_statement("\"docs\"", &[1.0, 2.0], 4, &filter);

        assert!(sql.contains("(embedding <-> $1::vector) AS distance"));
        assert!(sql.contains("FROM \"docs\""));
        // BTreeMap order: kind before lang
        assert!(sql.contains("metadata ->> $3 = $4 AND metadata ->> $5 = $6"));
        assert!(sql.ends_with("ORDER BY distance ASC, id ASC LIMIT $2"));
        assert!(!sql.contains("faq") && !sql.contains("lang"));
        assert_eq!(values.len(), 6);
        assert_eq!(values[2], Value::from("kind".to_string()));
    }

    #[test]
    fn test_range_statement_variants() {
        let scan = RangeScan::new(10, 20, ScanOrder::Desc);
        let (sql, values) = range_statement("\"docs\"", &scan);
        assert!(sql.contains("NULL::float8 AS distance"));
        assert!(sql.contains("id BETWEEN $1 AND $2"));
        assert!(sql.ends_with("ORDER BY id DESC"));
        assert_eq!(values, vec![Value::from(10i64), Value::from(20i64)]);

        let query = [0.1f32];
        let scan = RangeScan::new(1, 5, ScanOrder::Asc).with_distance_to(&query);
        let (sql, values) = range_statement("\"docs\"", &scan);
        assert!(sql.contains("(embedding <-> $3::vector) AS distance"));
        assert!(sql.ends_with("ORDER BY id ASC"));
        assert_eq!(values.len(), 3);
    }
}
