use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use embedstore_core::{
    validate_k, validate_vector, DistanceMetric, EmbeddingRecord, EmbeddingStore, Metadata,
    Neighbor, NewRecord, RecordId, StoreError,
};
use tokio::sync::RwLock;

struct Inner {
    next_id: i64,
    /// Keyed by id, so iteration order is insertion order.
    records: BTreeMap<RecordId, EmbeddingRecord>,
}

impl Inner {
    fn allocate(&mut self, vector: Vec<f32>, metadata: Metadata) -> RecordId {
        self.next_id += 1;
        let id = RecordId(self.next_id);
        let now = Utc::now();
        self.records.insert(
            id,
            EmbeddingRecord {
                id,
                vector,
                metadata,
                created_at: now,
                updated_at: now,
            },
        );
        id
    }
}

/// In-memory embedding store using exact (brute-force) search.
///
/// All mutation happens under a single write guard with no `.await` in
/// between, so a record is either fully visible or not at all.
pub struct InMemoryEmbeddingStore {
    dimensions: usize,
    inner: RwLock<Inner>,
}

impl InMemoryEmbeddingStore {
    /// Create an empty store accepting vectors of length `dimensions`.
    ///
    /// # Panics
    ///
    /// Panics if `dimensions` is zero.
    pub fn new(dimensions: usize) -> Self {
        assert!(dimensions > 0, "dimensions must be > 0");
        Self {
            dimensions,
            inner: RwLock::new(Inner {
                next_id: 0,
                records: BTreeMap::new(),
            }),
        }
    }

    /// Create a store pre-populated with `records`.
    pub async fn from_records(
        dimensions: usize,
        records: Vec<NewRecord>,
    ) -> Result<Self, StoreError> {
        let store = Self::new(dimensions);
        store.insert_batch(records).await?;
        Ok(store)
    }
}

#[async_trait]
impl EmbeddingStore for InMemoryEmbeddingStore {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn insert(
        &self,
        vector: Vec<f32>,
        metadata: Option<Metadata>,
    ) -> Result<RecordId, StoreError> {
        validate_vector(&vector, self.dimensions)?;

        let mut inner = self.inner.write().await;
        let id = inner.allocate(vector, metadata.unwrap_or_default());
        tracing::debug!(id = %id, "inserted record");
        Ok(id)
    }

    async fn insert_batch(&self, records: Vec<NewRecord>) -> Result<Vec<RecordId>, StoreError> {
        for record in &records {
            validate_vector(&record.vector, self.dimensions)?;
        }
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let mut inner = self.inner.write().await;
        let ids: Vec<RecordId> = records
            .into_iter()
            .map(|r| inner.allocate(r.vector, r.metadata))
            .collect();
        tracing::debug!(count = ids.len(), "inserted record batch");
        Ok(ids)
    }

    async fn get(&self, id: RecordId) -> Result<EmbeddingRecord, StoreError> {
        let inner = self.inner.read().await;
        inner
            .records
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn update(
        &self,
        id: RecordId,
        vector: Option<Vec<f32>>,
        metadata: Option<Metadata>,
    ) -> Result<EmbeddingRecord, StoreError> {
        if let Some(ref v) = vector {
            validate_vector(v, self.dimensions)?;
        }

        let mut inner = self.inner.write().await;
        let record = inner.records.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if let Some(v) = vector {
            record.vector = v;
        }
        if let Some(m) = metadata {
            record.metadata = m;
        }
        record.updated_at = Utc::now();
        tracing::debug!(id = %id, "updated record");
        Ok(record.clone())
    }

    async fn delete(&self, id: RecordId) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if inner.records.remove(&id).is_none() {
            return Err(StoreError::NotFound(id));
        }
        tracing::debug!(id = %id, "deleted record");
        Ok(())
    }

    async fn nearest(
        &self,
        query: &[f32],
        k: usize,
        metric: DistanceMetric,
    ) -> Result<Vec<Neighbor>, StoreError> {
        validate_vector(query, self.dimensions)?;
        validate_k(k)?;

        let inner = self.inner.read().await;
        let mut scored: Vec<Neighbor> = inner
            .records
            .values()
            .map(|record| Neighbor {
                id: record.id,
                distance: metric.distance(query, &record.vector),
            })
            .collect();
        drop(inner);

        // Stable sort keeps id (insertion) order among equal distances.
        scored.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        scored.truncate(k);

        tracing::debug!(metric = %metric, k, returned = scored.len(), "nearest query");
        Ok(scored)
    }

    async fn distance(
        &self,
        query: &[f32],
        id: RecordId,
        metric: DistanceMetric,
    ) -> Result<f32, StoreError> {
        validate_vector(query, self.dimensions)?;

        let inner = self.inner.read().await;
        let record = inner.records.get(&id).ok_or(StoreError::NotFound(id))?;
        Ok(metric.distance(query, &record.vector))
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.inner.read().await.records.len())
    }
}
