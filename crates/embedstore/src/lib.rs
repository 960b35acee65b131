//! embedstore: store fixed-dimension embedding vectors and query them by
//! nearest neighbor.
//!
//! This crate re-exports the embedstore sub-crates for convenient
//! single-import usage. Enable features to choose backends.
//!
//! # Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `default` | `memory` |
//! | `memory` | `InMemoryEmbeddingStore`: exact search, no external services |
//! | `pgvector` | `PgEmbeddingStore`: PostgreSQL + pgvector, optional ivfflat/hnsw index |
//! | `full` | All backends |
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use embedstore::core::{DistanceMetric, EmbeddingStore};
//! use embedstore::memory::InMemoryEmbeddingStore;
//!
//! let store = InMemoryEmbeddingStore::new(3);
//! let id = store.insert(vec![1.0, 0.0, 0.0], None).await?;
//! let hits = store.nearest(&[1.0, 0.0, 0.01], 1, DistanceMetric::Cosine).await?;
//! assert_eq!(hits[0].id, id);
//! ```

/// Core types and the `EmbeddingStore` trait: EmbeddingRecord, DistanceMetric, StoreError.
/// Always available.
pub use embedstore_core as core;

/// In-memory store with exact brute-force search.
#[cfg(feature = "memory")]
pub use embedstore_memory as memory;

/// PostgreSQL + pgvector store.
#[cfg(feature = "pgvector")]
pub use embedstore_pgvector as pgvector;
