//! Core types and the store trait shared by every embedstore backend.
//!
//! A store holds [`EmbeddingRecord`]s whose vectors all have the same fixed
//! length (the store's *dimensionality*), and answers nearest-neighbor
//! queries under a caller-chosen [`DistanceMetric`].

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Free-form metadata attached to a record.
pub type Metadata = HashMap<String, Value>;

// ---------------------------------------------------------------------------
// RecordId
// ---------------------------------------------------------------------------

/// Store-assigned record identifier.
///
/// Ids increase monotonically, so ordering by id is ordering by insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub i64);

impl RecordId {
    pub fn get(self) -> i64 {
        self.0
    }
}

impl From<i64> for RecordId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A stored embedding together with its metadata and timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub id: RecordId,
    pub vector: Vec<f32>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for [`EmbeddingStore::insert_batch`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NewRecord {
    pub vector: Vec<f32>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: Metadata,
}

impl NewRecord {
    pub fn new(vector: Vec<f32>) -> Self {
        Self {
            vector,
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(vector: Vec<f32>, metadata: Metadata) -> Self {
        Self { vector, metadata }
    }
}

/// One result of a nearest-neighbor query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub id: RecordId,
    /// Distance under the queried metric. Lower is always more similar.
    pub distance: f32,
}

// ---------------------------------------------------------------------------
// DistanceMetric
// ---------------------------------------------------------------------------

/// Distance function used to rank a nearest-neighbor query.
///
/// All three metrics report a *distance* where lower means more similar:
///
/// | Metric | Reported distance |
/// |---|---|
/// | `Cosine` | `1 - cos(a, b)`, in `[0, 2]` |
/// | `L2` | Euclidean distance |
/// | `InnerProduct` | negated dot product, `-(a · b)` |
///
/// Use [`DistanceMetric::similarity`] to turn a distance back into a
/// "higher is better" score (e.g. the raw inner product).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    Cosine,
    L2,
    InnerProduct,
}

impl DistanceMetric {
    pub const ALL: [DistanceMetric; 3] = [
        DistanceMetric::Cosine,
        DistanceMetric::L2,
        DistanceMetric::InnerProduct,
    ];

    /// Distance between two equal-length vectors under this metric.
    pub fn distance(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            DistanceMetric::Cosine => cosine_distance(a, b),
            DistanceMetric::L2 => l2_distance(a, b),
            DistanceMetric::InnerProduct => -dot(a, b) as f32,
        }
    }

    /// Convert a reported distance into a score where higher is more similar.
    ///
    /// Cosine yields cosine similarity, inner product yields the raw dot
    /// product and L2 yields the negated distance.
    pub fn similarity(self, distance: f32) -> f32 {
        match self {
            DistanceMetric::Cosine => 1.0 - distance,
            DistanceMetric::L2 | DistanceMetric::InnerProduct => -distance,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::L2 => "l2",
            DistanceMetric::InnerProduct => "inner_product",
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DistanceMetric {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cosine" => Ok(DistanceMetric::Cosine),
            "l2" | "euclidean" => Ok(DistanceMetric::L2),
            "inner_product" | "ip" | "dot" => Ok(DistanceMetric::InnerProduct),
            other => Err(StoreError::InvalidArgument(format!(
                "unknown distance metric '{other}'"
            ))),
        }
    }
}

// Sums accumulate in f64: the square of any finite f32 fits, so no finite
// input can overflow to inf or NaN before the final cast.

fn dot(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| f64::from(*x) * f64::from(*y))
        .sum()
}

fn norm(a: &[f32]) -> f64 {
    a.iter().map(|x| f64::from(*x) * f64::from(*x)).sum::<f64>().sqrt()
}

/// Cosine distance `1 - cos(a, b)`.
///
/// A zero-magnitude operand has no direction; it is reported at distance
/// `1.0` (orthogonal) rather than NaN.
fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let mag_a = norm(a);
    let mag_b = norm(b);

    if mag_a == 0.0 || mag_b == 0.0 {
        return 1.0;
    }

    let similarity = (dot(a, b) / (mag_a * mag_b)).clamp(-1.0, 1.0);
    (1.0 - similarity) as f32
}

fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = f64::from(*x) - f64::from(*y);
            d * d
        })
        .sum::<f64>()
        .sqrt() as f32
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Error type shared by every store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("invalid vector value at index {index}: must be finite")]
    InvalidVectorValue { index: usize },
    #[error("record not found: {0}")]
    NotFound(RecordId),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("backend error: {0}")]
    Backend(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("config error: {0}")]
    Config(String),
}

impl StoreError {
    /// Whether the caller may reasonably retry the same request.
    ///
    /// Only availability failures qualify; everything else requires the
    /// input to change.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Check that `vector` has exactly `dimensions` finite elements.
pub fn validate_vector(vector: &[f32], dimensions: usize) -> Result<(), StoreError> {
    if vector.len() != dimensions {
        return Err(StoreError::DimensionMismatch {
            expected: dimensions,
            actual: vector.len(),
        });
    }
    if let Some(index) = vector.iter().position(|v| !v.is_finite()) {
        return Err(StoreError::InvalidVectorValue { index });
    }
    Ok(())
}

/// Reject `k == 0` for nearest-neighbor queries.
pub fn validate_k(k: usize) -> Result<(), StoreError> {
    if k == 0 {
        return Err(StoreError::InvalidArgument("k must be > 0".to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// EmbeddingStore trait
// ---------------------------------------------------------------------------

/// A persistent collection of fixed-dimension embedding records.
///
/// Every write is atomic per call: a failed call leaves the store unchanged.
#[async_trait]
pub trait EmbeddingStore: Send + Sync {
    /// The fixed vector length accepted by this store.
    fn dimensions(&self) -> usize;

    /// Insert one record and return its new id.
    async fn insert(
        &self,
        vector: Vec<f32>,
        metadata: Option<Metadata>,
    ) -> Result<RecordId, StoreError>;

    /// Insert several records. Either all are stored or none are; the
    /// returned ids follow input order.
    async fn insert_batch(&self, records: Vec<NewRecord>) -> Result<Vec<RecordId>, StoreError>;

    /// Fetch a record by id.
    async fn get(&self, id: RecordId) -> Result<EmbeddingRecord, StoreError>;

    /// Replace the vector and/or metadata of an existing record.
    ///
    /// `None` leaves the corresponding field unchanged. `updated_at` is
    /// always refreshed.
    async fn update(
        &self,
        id: RecordId,
        vector: Option<Vec<f32>>,
        metadata: Option<Metadata>,
    ) -> Result<EmbeddingRecord, StoreError>;

    /// Delete a record by id.
    async fn delete(&self, id: RecordId) -> Result<(), StoreError>;

    /// Return up to `k` records closest to `query`, ascending by distance.
    ///
    /// Equal distances are ordered by insertion. On a backend serving the
    /// metric from an approximate index, the returned rows are ordered the
    /// same way, but which equal-distance rows make the cut at the `k`
    /// boundary is decided by the index.
    ///
    /// Cosine distance to a zero-magnitude vector is backend-specific: the
    /// in-memory store reports `1.0`, while pgvector yields NaN and sorts
    /// such rows last.
    async fn nearest(
        &self,
        query: &[f32],
        k: usize,
        metric: DistanceMetric,
    ) -> Result<Vec<Neighbor>, StoreError>;

    /// Distance between `query` and a single stored record.
    async fn distance(
        &self,
        query: &[f32],
        id: RecordId,
        metric: DistanceMetric,
    ) -> Result<f32, StoreError>;

    /// Number of stored records.
    async fn count(&self) -> Result<usize, StoreError>;
}
