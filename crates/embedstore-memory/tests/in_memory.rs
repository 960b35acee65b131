use std::collections::HashMap;
use std::sync::Arc;

use embedstore_memory::{
    DistanceMetric, EmbeddingStore, InMemoryEmbeddingStore, NewRecord, RecordId, StoreError,
};
use serde_json::Value;

#[tokio::test]
async fn insert_then_get_returns_exact_vector() {
    let store = InMemoryEmbeddingStore::new(4);
    let v = vec![0.125, -3.5, 1e-7, 42.0];

    let id = store.insert(v.clone(), None).await.unwrap();
    let record = store.get(id).await.unwrap();

    assert_eq!(record.id, id);
    assert_eq!(record.vector, v);
    assert!(record.metadata.is_empty());
    assert_eq!(record.created_at, record.updated_at);
}

#[tokio::test]
async fn wrong_length_insert_creates_nothing() {
    let store = InMemoryEmbeddingStore::new(3);

    for bad in [vec![], vec![1.0, 2.0], vec![1.0, 2.0, 3.0, 4.0]] {
        let len = bad.len();
        let err = store.insert(bad, None).await.unwrap_err();
        match err {
            StoreError::DimensionMismatch { expected, actual } => {
                assert_eq!(expected, 3);
                assert_eq!(actual, len);
            }
            other => panic!("expected DimensionMismatch, got {other:?}"),
        }
    }
    assert_eq!(store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn non_finite_values_are_rejected() {
    let store = InMemoryEmbeddingStore::new(3);
    let err = store
        .insert(vec![1.0, f32::NEG_INFINITY, 0.0], None)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidVectorValue { index: 1 }));
    assert_eq!(store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn worked_example_cosine() {
    let store = InMemoryEmbeddingStore::new(3);
    let a = store.insert(vec![1.0, 0.0, 0.0], None).await.unwrap();
    let b = store.insert(vec![0.0, 1.0, 0.0], None).await.unwrap();

    let results = store
        .nearest(&[1.0, 0.0, 0.01], 2, DistanceMetric::Cosine)
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].id, a);
    assert!(results[0].distance < 1e-3, "got {}", results[0].distance);
    assert_eq!(results[1].id, b);
    assert!(results[1].distance > results[0].distance);
}

#[tokio::test]
async fn self_query_is_first_with_zero_distance() {
    let store = InMemoryEmbeddingStore::new(4);
    store.insert(vec![0.9, 0.1, 0.0, 0.2], None).await.unwrap();
    let target = vec![0.1, 0.7, -0.3, 0.5];
    let id = store.insert(target.clone(), None).await.unwrap();
    store.insert(vec![-0.5, 0.5, 0.5, -0.5], None).await.unwrap();

    let results = store
        .nearest(&target, 1, DistanceMetric::Cosine)
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id, id);
    assert!(results[0].distance.abs() < 1e-5);
}

#[tokio::test]
async fn nearest_returns_at_most_k_sorted_ascending() {
    let store = InMemoryEmbeddingStore::new(2);
    let records = (0..10)
        .map(|i| NewRecord::new(vec![i as f32, 1.0]))
        .collect();
    store.insert_batch(records).await.unwrap();

    for metric in DistanceMetric::ALL {
        let results = store.nearest(&[3.0, 1.0], 4, metric).await.unwrap();
        assert_eq!(results.len(), 4, "{metric}");
        assert!(
            results.windows(2).all(|w| w[0].distance <= w[1].distance),
            "{metric} results not ascending: {results:?}"
        );
    }

    let all = store
        .nearest(&[3.0, 1.0], 100, DistanceMetric::L2)
        .await
        .unwrap();
    assert_eq!(all.len(), 10);
}

#[tokio::test]
async fn reported_distances_match_direct_distance() {
    let store = InMemoryEmbeddingStore::new(3);
    let records = vec![
        NewRecord::new(vec![1.0, 2.0, 3.0]),
        NewRecord::new(vec![-1.0, 0.5, 0.0]),
        NewRecord::new(vec![0.0, 0.0, 4.0]),
    ];
    store.insert_batch(records).await.unwrap();
    let query = [0.5, 0.5, 0.5];

    for metric in DistanceMetric::ALL {
        for n in store.nearest(&query, 3, metric).await.unwrap() {
            let direct = store.distance(&query, n.id, metric).await.unwrap();
            assert_eq!(direct, n.distance, "{metric} id {}", n.id);
        }
    }
}

#[tokio::test]
async fn large_magnitude_vectors_rank_correctly() {
    let store = InMemoryEmbeddingStore::new(3);
    let aligned = store.insert(vec![1.0, 0.0, 0.0], None).await.unwrap();
    let opposite = store.insert(vec![-1e20, 0.0, 0.0], None).await.unwrap();

    for metric in DistanceMetric::ALL {
        let results = store.nearest(&[1e20, 0.0, 0.0], 2, metric).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, aligned, "{metric}: {results:?}");
        assert_eq!(results[1].id, opposite, "{metric}: {results:?}");
        assert!(
            results.iter().all(|n| !n.distance.is_nan()),
            "{metric}: {results:?}"
        );
    }

    let cosine = store
        .nearest(&[1e20, 0.0, 0.0], 1, DistanceMetric::Cosine)
        .await
        .unwrap();
    assert!(cosine[0].distance.abs() < 1e-5);
}

#[tokio::test]
async fn large_magnitude_self_query_is_zero_distance() {
    let store = InMemoryEmbeddingStore::new(3);
    store.insert(vec![1.0, 1.0, 1.0], None).await.unwrap();
    let target = vec![0.0, 1e20, 0.0];
    let id = store.insert(target.clone(), None).await.unwrap();

    let results = store
        .nearest(&target, 1, DistanceMetric::Cosine)
        .await
        .unwrap();
    assert_eq!(results[0].id, id);
    assert!(results[0].distance.abs() < 1e-5, "got {}", results[0].distance);
    assert_eq!(
        store.distance(&target, id, DistanceMetric::Cosine).await.unwrap(),
        results[0].distance
    );
}

#[tokio::test]
async fn inner_product_ranks_largest_dot_first() {
    let store = InMemoryEmbeddingStore::new(2);
    let small = store.insert(vec![1.0, 0.0], None).await.unwrap();
    let large = store.insert(vec![10.0, 0.0], None).await.unwrap();

    let results = store
        .nearest(&[1.0, 0.0], 2, DistanceMetric::InnerProduct)
        .await
        .unwrap();
    assert_eq!(results[0].id, large);
    assert_eq!(results[1].id, small);
    assert_eq!(
        DistanceMetric::InnerProduct.similarity(results[0].distance),
        10.0
    );

    // Under cosine both point the same way; insertion order breaks the tie.
    let results = store
        .nearest(&[1.0, 0.0], 2, DistanceMetric::Cosine)
        .await
        .unwrap();
    assert_eq!(results[0].id, small);
    assert_eq!(results[1].id, large);
}

#[tokio::test]
async fn ties_follow_insertion_order() {
    let store = InMemoryEmbeddingStore::new(2);
    let ids: Vec<RecordId> = store
        .insert_batch((0..5).map(|_| NewRecord::new(vec![0.0, 1.0])).collect())
        .await
        .unwrap();

    let results = store
        .nearest(&[0.0, 1.0], 5, DistanceMetric::L2)
        .await
        .unwrap();
    let got: Vec<RecordId> = results.iter().map(|n| n.id).collect();
    assert_eq!(got, ids);
}

#[tokio::test]
async fn delete_removes_from_results() {
    let store = InMemoryEmbeddingStore::new(2);
    let a = store.insert(vec![1.0, 0.0], None).await.unwrap();
    let b = store.insert(vec![0.0, 1.0], None).await.unwrap();

    store.delete(a).await.unwrap();

    let results = store
        .nearest(&[1.0, 0.0], 10, DistanceMetric::Cosine)
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id, b);
    assert!(matches!(store.get(a).await, Err(StoreError::NotFound(id)) if id == a));
}

#[tokio::test]
async fn missing_ids_are_not_found() {
    let store = InMemoryEmbeddingStore::new(2);
    let missing = RecordId(99);

    assert!(matches!(store.get(missing).await, Err(StoreError::NotFound(_))));
    assert!(matches!(store.delete(missing).await, Err(StoreError::NotFound(_))));
    assert!(matches!(
        store.update(missing, Some(vec![1.0, 1.0]), None).await,
        Err(StoreError::NotFound(_))
    ));
    assert!(matches!(
        store.distance(&[1.0, 1.0], missing, DistanceMetric::L2).await,
        Err(StoreError::NotFound(_))
    ));
}

#[tokio::test]
async fn update_replaces_vector_and_keeps_metadata() {
    let store = InMemoryEmbeddingStore::new(2);
    let mut metadata = HashMap::new();
    metadata.insert("title".to_string(), Value::String("intro".to_string()));
    let id = store
        .insert(vec![1.0, 0.0], Some(metadata.clone()))
        .await
        .unwrap();
    let before = store.get(id).await.unwrap();

    let after = store.update(id, Some(vec![0.0, 1.0]), None).await.unwrap();
    assert_eq!(after.vector, vec![0.0, 1.0]);
    assert_eq!(after.metadata, metadata);
    assert_eq!(after.created_at, before.created_at);
    assert!(after.updated_at >= before.updated_at);
    assert_eq!(store.get(id).await.unwrap(), after);
}

#[tokio::test]
async fn update_replaces_metadata_only() {
    let store = InMemoryEmbeddingStore::new(2);
    let id = store.insert(vec![1.0, 0.0], None).await.unwrap();

    let mut metadata = HashMap::new();
    metadata.insert("page".to_string(), Value::Number(3.into()));
    let after = store.update(id, None, Some(metadata)).await.unwrap();

    assert_eq!(after.vector, vec![1.0, 0.0]);
    assert_eq!(after.metadata.get("page").unwrap(), 3);
}

#[tokio::test]
async fn invalid_update_leaves_record_untouched() {
    let store = InMemoryEmbeddingStore::new(2);
    let id = store.insert(vec![1.0, 0.0], None).await.unwrap();
    let before = store.get(id).await.unwrap();

    let err = store
        .update(id, Some(vec![1.0, 0.0, 0.0]), None)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::DimensionMismatch { .. }));
    assert_eq!(store.get(id).await.unwrap(), before);
}

#[tokio::test]
async fn invalid_queries_are_rejected() {
    let store = InMemoryEmbeddingStore::new(2);
    store.insert(vec![1.0, 0.0], None).await.unwrap();

    assert!(matches!(
        store.nearest(&[1.0, 0.0], 0, DistanceMetric::Cosine).await,
        Err(StoreError::InvalidArgument(_))
    ));
    assert!(matches!(
        store.nearest(&[1.0], 1, DistanceMetric::Cosine).await,
        Err(StoreError::DimensionMismatch {
            expected: 2,
            actual: 1
        })
    ));
    assert!(matches!(
        store.nearest(&[f32::NAN, 0.0], 1, DistanceMetric::L2).await,
        Err(StoreError::InvalidVectorValue { index: 0 })
    ));
}

#[tokio::test]
async fn batch_with_one_bad_record_stores_nothing() {
    let store = InMemoryEmbeddingStore::new(2);
    let err = store
        .insert_batch(vec![
            NewRecord::new(vec![1.0, 0.0]),
            NewRecord::new(vec![1.0]),
            NewRecord::new(vec![0.0, 1.0]),
        ])
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::DimensionMismatch { .. }));
    assert_eq!(store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn from_records_preserves_metadata() {
    let mut metadata = HashMap::new();
    metadata.insert("image_url".to_string(), Value::String("a.png".to_string()));

    let store = InMemoryEmbeddingStore::from_records(
        2,
        vec![NewRecord::with_metadata(vec![0.5, 0.5], metadata)],
    )
    .await
    .unwrap();

    let hit = store
        .nearest(&[0.5, 0.5], 1, DistanceMetric::Cosine)
        .await
        .unwrap();
    let record = store.get(hit[0].id).await.unwrap();
    assert_eq!(record.metadata.get("image_url").unwrap(), "a.png");
}

#[tokio::test]
async fn empty_store_returns_empty() {
    let store = InMemoryEmbeddingStore::new(3);
    let results = store
        .nearest(&[1.0, 2.0, 3.0], 5, DistanceMetric::L2)
        .await
        .unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn concurrent_writers_and_readers() {
    let store = Arc::new(InMemoryEmbeddingStore::new(8));
    let mut handles = Vec::new();

    for t in 0..8 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            for i in 0..25 {
                let v = vec![(t * 25 + i) as f32; 8];
                store.insert(v, None).await.unwrap();
                let hits = store
                    .nearest(&[1.0; 8], 3, DistanceMetric::Cosine)
                    .await
                    .unwrap();
                for hit in hits {
                    let record = store.get(hit.id).await.unwrap();
                    assert_eq!(record.vector.len(), 8);
                }
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(store.count().await.unwrap(), 200);
}

#[tokio::test]
async fn usable_as_trait_object() {
    let store: Arc<dyn EmbeddingStore> = Arc::new(InMemoryEmbeddingStore::new(768));
    assert_eq!(store.dimensions(), 768);
    let id = store.insert(vec![0.01; 768], None).await.unwrap();
    assert_eq!(store.get(id).await.unwrap().vector.len(), 768);
}
