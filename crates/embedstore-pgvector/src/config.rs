use embedstore_core::{DistanceMetric, StoreError};

/// Largest dimensionality accepted by the pgvector `vector` type.
pub(crate) const MAX_VECTOR_DIMENSIONS: u32 = 16_000;

/// Largest dimensionality pgvector can index with ivfflat or hnsw.
pub(crate) const MAX_INDEXED_DIMENSIONS: u32 = 2_000;

/// Postgres `NAMEDATALEN - 1`; longer identifiers are truncated by the server.
const MAX_IDENTIFIER_LEN: usize = 63;

/// Configuration for a [`PgEmbeddingStore`](crate::PgEmbeddingStore) table.
#[derive(Debug, Clone)]
pub struct PgVectorConfig {
    /// Name of the PostgreSQL table holding the records.
    pub table_name: String,
    /// Dimensionality of every stored vector (e.g. 768, 1536 or 512).
    /// Fixed for the lifetime of the table.
    pub vector_dimensions: u32,
    /// Approximate index to build on the embedding column. `None` keeps
    /// every query an exact sequential scan.
    pub index: Option<VectorIndex>,
    /// Pool size used by [`PgEmbeddingStore::connect`](crate::PgEmbeddingStore::connect).
    pub max_connections: u32,
}

impl PgVectorConfig {
    /// Create a new configuration with no approximate index.
    ///
    /// # Panics
    ///
    /// Panics if `table_name` is empty or `vector_dimensions` is zero.
    pub fn new(table_name: impl Into<String>, vector_dimensions: u32) -> Self {
        let table_name = table_name.into();
        assert!(!table_name.is_empty(), "table_name must not be empty");
        assert!(vector_dimensions > 0, "vector_dimensions must be > 0");
        Self {
            table_name,
            vector_dimensions,
            index: None,
            max_connections: 5,
        }
    }

    /// Build an approximate nearest-neighbor index during
    /// [`initialize`](crate::PgEmbeddingStore::initialize).
    pub fn with_index(mut self, index: VectorIndex) -> Self {
        self.index = Some(index);
        self
    }

    /// Set the connection pool size (default: 5).
    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    /// Check the config against pgvector's limits and SQL-safety rules.
    pub fn validate(&self) -> Result<(), StoreError> {
        validate_table_name(&self.table_name)?;
        if self.vector_dimensions == 0 || self.vector_dimensions > MAX_VECTOR_DIMENSIONS {
            return Err(StoreError::Config(format!(
                "vector_dimensions must be in 1..={MAX_VECTOR_DIMENSIONS}, got {}",
                self.vector_dimensions
            )));
        }
        if self.index.is_some() && self.vector_dimensions > MAX_INDEXED_DIMENSIONS {
            return Err(StoreError::Config(format!(
                "pgvector indexes support at most {MAX_INDEXED_DIMENSIONS} dimensions, got {}",
                self.vector_dimensions
            )));
        }
        Ok(())
    }

    /// Whether queries under `metric` can be served by the configured index.
    pub(crate) fn indexed_for(&self, metric: DistanceMetric) -> bool {
        self.index.is_some_and(|i| i.metric == metric)
    }
}

/// Approximate index algorithm and its build parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    /// Inverted file index. `lists` is the number of clusters; pgvector
    /// suggests `rows / 1000` up to 1M rows.
    IvfFlat { lists: u32 },
    /// Hierarchical navigable small world graph. Builds slower and uses more
    /// memory than ivfflat, but queries faster.
    Hnsw { m: u32, ef_construction: u32 },
}

impl IndexKind {
    /// ivfflat with pgvector's default of 100 lists.
    pub fn ivfflat() -> Self {
        IndexKind::IvfFlat { lists: 100 }
    }

    /// hnsw with pgvector's defaults (`m = 16`, `ef_construction = 64`).
    pub fn hnsw() -> Self {
        IndexKind::Hnsw {
            m: 16,
            ef_construction: 64,
        }
    }

    fn method(self) -> &'static str {
        match self {
            IndexKind::IvfFlat { .. } => "ivfflat",
            IndexKind::Hnsw { .. } => "hnsw",
        }
    }

    fn with_clause(self) -> String {
        match self {
            IndexKind::IvfFlat { lists } => format!("lists = {lists}"),
            IndexKind::Hnsw { m, ef_construction } => {
                format!("m = {m}, ef_construction = {ef_construction}")
            }
        }
    }
}

/// An approximate index on the embedding column for one distance metric.
///
/// Only queries using the same metric benefit; other metrics fall back to
/// an exact scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VectorIndex {
    pub kind: IndexKind,
    pub metric: DistanceMetric,
}

impl VectorIndex {
    pub fn new(kind: IndexKind, metric: DistanceMetric) -> Self {
        Self { kind, metric }
    }

    /// `CREATE INDEX` statement for `table`.
    pub(crate) fn create_sql(&self, table: &str) -> String {
        // Index names cannot be schema-qualified; they live in the table's schema.
        let base = table.rsplit('.').next().unwrap_or(table);
        format!(
            "CREATE INDEX IF NOT EXISTS {base}_embedding_{method}_{metric}_idx \
             ON {table} USING {method} (embedding {ops}) WITH ({with})",
            method = self.kind.method(),
            metric = self.metric.as_str(),
            ops = operator_class(self.metric),
            with = self.kind.with_clause(),
        )
    }
}

/// pgvector distance operator for `metric`.
pub(crate) fn operator(metric: DistanceMetric) -> &'static str {
    match metric {
        DistanceMetric::Cosine => "<=>",
        DistanceMetric::L2 => "<->",
        DistanceMetric::InnerProduct => "<#>",
    }
}

fn operator_class(metric: DistanceMetric) -> &'static str {
    match metric {
        DistanceMetric::Cosine => "vector_cosine_ops",
        DistanceMetric::L2 => "vector_l2_ops",
        DistanceMetric::InnerProduct => "vector_ip_ops",
    }
}

/// Check that `name` is a plain `table` or `schema.table` identifier that can
/// be interpolated into SQL unquoted.
pub(crate) fn validate_table_name(name: &str) -> Result<(), StoreError> {
    let invalid =
        |reason: &str| StoreError::Config(format!("invalid table name '{name}': {reason}"));

    let segments: Vec<&str> = name.split('.').collect();
    if segments.len() > 2 {
        return Err(invalid("expected `table` or `schema.table`"));
    }
    for segment in segments {
        let Some(first) = segment.chars().next() else {
            return Err(invalid("empty identifier"));
        };
        if !(first.is_ascii_alphabetic() || first == '_') {
            return Err(invalid("identifiers must start with a letter or underscore"));
        }
        if !segment.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(invalid(
                "identifiers may only contain letters, digits and underscores",
            ));
        }
        if segment.len() > MAX_IDENTIFIER_LEN {
            return Err(invalid("identifier longer than 63 bytes"));
        }
    }
    Ok(())
}
