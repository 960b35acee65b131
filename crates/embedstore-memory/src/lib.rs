mod in_memory;

pub use in_memory::InMemoryEmbeddingStore;

// Re-export core traits/types so callers need a single import.
pub use embedstore_core::{
    DistanceMetric, EmbeddingRecord, EmbeddingStore, Metadata, Neighbor, NewRecord, RecordId,
    StoreError,
};
