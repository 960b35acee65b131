use async_trait::async_trait;
use chrono::{DateTime, Utc};
use embedstore_core::{
    validate_k, validate_vector, DistanceMetric, EmbeddingRecord, EmbeddingStore, Metadata,
    Neighbor, NewRecord, RecordId, StoreError,
};
use pgvector::Vector;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::config::{operator, PgVectorConfig};

type RecordRow = (i64, Vector, Value, DateTime<Utc>, DateTime<Utc>);

/// An [`EmbeddingStore`] backed by PostgreSQL with the pgvector extension.
///
/// Records live in a single table with columns:
/// - `id BIGSERIAL PRIMARY KEY`
/// - `embedding vector(<dimensions>) NOT NULL`
/// - `metadata JSONB NOT NULL DEFAULT '{}'`
/// - `created_at`, `updated_at TIMESTAMPTZ NOT NULL DEFAULT now()`
///
/// Call [`initialize`](PgEmbeddingStore::initialize) once after construction
/// to create the pgvector extension, the table and any configured index
/// (idempotent). Vectors are validated client-side before any SQL is issued.
pub struct PgEmbeddingStore {
    pool: PgPool,
    config: PgVectorConfig,
}

impl PgEmbeddingStore {
    /// Create a new store from an existing connection pool and config.
    pub fn new(pool: PgPool, config: PgVectorConfig) -> Self {
        Self { pool, config }
    }

    /// Open a connection pool to `database_url` and wrap it in a store.
    pub async fn connect(database_url: &str, config: PgVectorConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Unavailable(format!("failed to connect: {e}")))?;
        Ok(Self::new(pool, config))
    }

    /// Ensure the pgvector extension, the backing table and the configured
    /// index exist.
    ///
    /// This is idempotent and safe to call on every application startup.
    pub async fn initialize(&self) -> Result<(), StoreError> {
        self.config.validate()?;
        let table = &self.config.table_name;

        sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("failed to create pgvector extension", e))?;

        let create_table = format!(
            r#"CREATE TABLE IF NOT EXISTS {table} (
                id BIGSERIAL PRIMARY KEY,
                embedding vector({dims}) NOT NULL,
                metadata JSONB NOT NULL DEFAULT '{{}}',
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )"#,
            dims = self.config.vector_dimensions,
        );
        sqlx::query(&create_table)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("failed to create table", e))?;

        if let Some(index) = self.config.index {
            sqlx::query(&index.create_sql(table))
                .execute(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("failed to create vector index", e))?;
        }

        tracing::info!(
            table = %table,
            dimensions = self.config.vector_dimensions,
            index = ?self.config.index,
            "pgvector store initialized"
        );
        Ok(())
    }

    /// Return a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Return a reference to the configuration.
    pub fn config(&self) -> &PgVectorConfig {
        &self.config
    }

    fn check_vector(&self, vector: &[f32]) -> Result<(), StoreError> {
        validate_vector(vector, self.config.vector_dimensions as usize)
    }

    fn insert_sql(&self) -> String {
        format!(
            "INSERT INTO {table} (embedding, metadata) VALUES ($1, $2) RETURNING id",
            table = self.config.table_name,
        )
    }
}

#[async_trait]
impl EmbeddingStore for PgEmbeddingStore {
    fn dimensions(&self) -> usize {
        self.config.vector_dimensions as usize
    }

    async fn insert(
        &self,
        vector: Vec<f32>,
        metadata: Option<Metadata>,
    ) -> Result<RecordId, StoreError> {
        self.check_vector(&vector)?;
        let metadata = metadata_to_json(metadata.unwrap_or_default())?;

        let id: i64 = sqlx::query_scalar(&self.insert_sql())
            .bind(Vector::from(vector))
            .bind(&metadata)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert failed", e))?;

        tracing::debug!(table = %self.config.table_name, id, "inserted record");
        Ok(RecordId(id))
    }

    async fn insert_batch(&self, records: Vec<NewRecord>) -> Result<Vec<RecordId>, StoreError> {
        for record in &records {
            self.check_vector(&record.vector)?;
        }
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let sql = self.insert_sql();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("failed to begin transaction", e))?;

        let mut ids = Vec::with_capacity(records.len());
        for record in records {
            let metadata = metadata_to_json(record.metadata)?;
            let id: i64 = sqlx::query_scalar(&sql)
                .bind(Vector::from(record.vector))
                .bind(&metadata)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("batch insert failed", e))?;
            ids.push(RecordId(id));
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("failed to commit batch insert", e))?;

        tracing::debug!(table = %self.config.table_name, count = ids.len(), "inserted record batch");
        Ok(ids)
    }

    async fn get(&self, id: RecordId) -> Result<EmbeddingRecord, StoreError> {
        let sql = format!(
            "SELECT id, embedding, metadata, created_at, updated_at FROM {table} WHERE id = $1",
            table = self.config.table_name,
        );

        let row: Option<RecordRow> = sqlx::query_as(&sql)
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get failed", e))?;

        row.map(row_to_record).ok_or(StoreError::NotFound(id))
    }

    async fn update(
        &self,
        id: RecordId,
        vector: Option<Vec<f32>>,
        metadata: Option<Metadata>,
    ) -> Result<EmbeddingRecord, StoreError> {
        if let Some(ref v) = vector {
            self.check_vector(v)?;
        }
        let metadata = metadata.map(metadata_to_json).transpose()?;

        let sql = format!(
            r#"UPDATE {table}
               SET embedding = COALESCE($2, embedding),
                   metadata = COALESCE($3, metadata),
                   updated_at = now()
               WHERE id = $1
               RETURNING id, embedding, metadata, created_at, updated_at"#,
            table = self.config.table_name,
        );

        let row: Option<RecordRow> = sqlx::query_as(&sql)
            .bind(id.get())
            .bind(vector.map(Vector::from))
            .bind(metadata)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("update failed", e))?;

        let record = row.map(row_to_record).ok_or(StoreError::NotFound(id))?;
        tracing::debug!(table = %self.config.table_name, id = %id, "updated record");
        Ok(record)
    }

    async fn delete(&self, id: RecordId) -> Result<(), StoreError> {
        let sql = format!(
            "DELETE FROM {table} WHERE id = $1",
            table = self.config.table_name,
        );

        let result = sqlx::query(&sql)
            .bind(id.get())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete failed", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        tracing::debug!(table = %self.config.table_name, id = %id, "deleted record");
        Ok(())
    }

    async fn nearest(
        &self,
        query: &[f32],
        k: usize,
        metric: DistanceMetric,
    ) -> Result<Vec<Neighbor>, StoreError> {
        self.check_vector(query)?;
        validate_k(k)?;

        let op = operator(metric);
        // An ANN index is only used when ORDER BY is exactly the distance
        // expression, so the id tie-break is applied client-side in that case.
        let order_by = if self.config.indexed_for(metric) {
            format!("embedding {op} $1")
        } else {
            "distance, id".to_string()
        };
        let sql = format!(
            r#"SELECT id, embedding {op} $1 AS distance
               FROM {table}
               ORDER BY {order_by}
               LIMIT $2"#,
            table = self.config.table_name,
        );

        let rows: Vec<(i64, f64)> = sqlx::query_as(&sql)
            .bind(Vector::from(query.to_vec()))
            .bind(i64::try_from(k).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("nearest query failed", e))?;

        let mut neighbors: Vec<Neighbor> = rows
            .into_iter()
            .map(|(id, distance)| Neighbor {
                id: RecordId(id),
                distance: distance as f32,
            })
            .collect();
        neighbors.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.id.cmp(&b.id)));

        tracing::debug!(
            table = %self.config.table_name,
            metric = %metric,
            k,
            returned = neighbors.len(),
            "nearest query"
        );
        Ok(neighbors)
    }

    async fn distance(
        &self,
        query: &[f32],
        id: RecordId,
        metric: DistanceMetric,
    ) -> Result<f32, StoreError> {
        self.check_vector(query)?;

        let sql = format!(
            "SELECT embedding {op} $1 FROM {table} WHERE id = $2",
            op = operator(metric),
            table = self.config.table_name,
        );

        let distance: Option<f64> = sqlx::query_scalar(&sql)
            .bind(Vector::from(query.to_vec()))
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("distance query failed", e))?;

        distance
            .map(|d| d as f32)
            .ok_or(StoreError::NotFound(id))
    }

    async fn count(&self) -> Result<usize, StoreError> {
        let sql = format!(
            "SELECT COUNT(*) FROM {table}",
            table = self.config.table_name,
        );
        let count: i64 = sqlx::query_scalar(&sql)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("count failed", e))?;
        Ok(count as usize)
    }
}

fn row_to_record((id, embedding, metadata, created_at, updated_at): RecordRow) -> EmbeddingRecord {
    let metadata: Metadata = match metadata {
        Value::Object(map) => map.into_iter().collect(),
        _ => Metadata::new(),
    };
    EmbeddingRecord {
        id: RecordId(id),
        vector: embedding.to_vec(),
        metadata,
        created_at,
        updated_at,
    }
}

fn metadata_to_json(metadata: Metadata) -> Result<Value, StoreError> {
    serde_json::to_value(metadata)
        .map_err(|e| StoreError::Serialization(format!("failed to serialize metadata: {e}")))
}

/// Classify a sqlx error: connectivity problems become
/// [`StoreError::Unavailable`], everything else [`StoreError::Backend`].
fn map_sqlx_error(context: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => StoreError::Unavailable(format!("{context}: {err}")),
        other => StoreError::Backend(format!("{context}: {other}")),
    }
}
