use std::collections::HashMap;
use std::sync::Arc;

use embedstore::core::{DistanceMetric, EmbeddingStore, NewRecord, StoreError};
use embedstore::memory::InMemoryEmbeddingStore;
use embedstore::pgvector::{PgEmbeddingStore, PgVectorConfig};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

const DIMENSIONS: usize = 3;

/// Uses PostgreSQL when `DATABASE_URL` is set, otherwise an in-memory store.
async fn open_store() -> Result<Arc<dyn EmbeddingStore>, StoreError> {
    match std::env::var("DATABASE_URL") {
        Ok(url) => {
            println!("Using pgvector store at DATABASE_URL");
            let config = PgVectorConfig::new("demo_documents", DIMENSIONS as u32);
            let store = PgEmbeddingStore::connect(&url, config).await?;
            store.initialize().await?;
            Ok(Arc::new(store))
        }
        Err(_) => {
            println!("Using in-memory store (set DATABASE_URL for pgvector)");
            Ok(Arc::new(InMemoryEmbeddingStore::new(DIMENSIONS)))
        }
    }
}

fn titled(vector: Vec<f32>, title: &str) -> NewRecord {
    let mut metadata = HashMap::new();
    metadata.insert("title".to_string(), Value::String(title.to_string()));
    NewRecord::with_metadata(vector, metadata)
}

#[tokio::main]
async fn main() -> Result<(), StoreError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let store = open_store().await?;

    // --- Insert ---
    println!("=== Inserting Records ===");
    let ids = store
        .insert_batch(vec![
            titled(vec![1.0, 0.0, 0.0], "Introduction to PostgreSQL"),
            titled(vec![0.0, 1.0, 0.0], "Time-series with hypertables"),
            titled(vec![0.7, 0.7, 0.0], "Vector search in practice"),
        ])
        .await?;
    println!("Inserted ids: {ids:?}");

    // --- Query under every metric ---
    let query = [1.0, 0.0, 0.01];
    for metric in DistanceMetric::ALL {
        println!("\n=== Nearest ({metric}) ===");
        for hit in store.nearest(&query, 2, metric).await? {
            let record = store.get(hit.id).await?;
            let title = record
                .metadata
                .get("title")
                .and_then(Value::as_str)
                .unwrap_or("<untitled>");
            println!(
                "  {title}: distance={:.4} similarity={:.4}",
                hit.distance,
                metric.similarity(hit.distance)
            );
        }
    }

    // --- Validation ---
    println!("\n=== Validation ===");
    match store.insert(vec![1.0, 2.0], None).await {
        Err(e) => println!("Rejected short vector: {e}"),
        Ok(id) => println!("Unexpectedly stored {id}"),
    }

    // --- Cleanup ---
    for id in ids {
        store.delete(id).await?;
    }
    println!("\nRemaining records: {}", store.count().await?);
    Ok(())
}
