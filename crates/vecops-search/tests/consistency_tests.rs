use async_trait::async_trait;
use serde_json::{json, Value};

use vecops_core::types::{
    CanonicalEmbedding, Conformance, Document, EngineUsed, IndexDescriptor, IndexParams,
    ScoredDocument, VectorIndexDefinition, ViewDefinition,
};
use vecops_core::{Error, Result};
use vecops_search::index_repair::{self, RepairAction};
use vecops_search::normalize::{self, RepairOutcome};
use vecops_search::probe::{self, apply_post_filter, tag_contains, ProbeOptions};
use vecops_store::memory::MemoryStore;
use vecops_store::DocumentStore;

fn canonical() -> CanonicalEmbedding {
    CanonicalEmbedding::new("bge-m3", 3)
}

fn seed_doc(store: &MemoryStore, key: &str, vector: [f32; 3], model: &str, tags: &[&str]) {
    store.insert_document(
        "docs",
        key,
        json!({
            "_key": key,
            "title": key,
            "tags": tags,
            "embedding": vector,
            "embedding_meta": {"model": model, "dim": 3, "created_at": "2026-01-01T00:00:00Z"},
        }),
    );
}

#[tokio::test]
async fn index_repair_is_idempotent() -> anyhow::Result<()> {
    let store = MemoryStore::new();
    store.create_collection("docs");
    let params = IndexParams::for_dimension(3);

    let first = index_repair::repair(&store, "docs", "embedding", &params).await?;
    assert_eq!(first, RepairAction::Created);
    let second = index_repair::repair(&store, "docs", "embedding", &params).await?;
    assert_eq!(second, RepairAction::AlreadyValid);

    assert_eq!(store.index_creation_calls(), 1);
    Ok(())
}

#[tokio::test]
async fn malformed_index_is_replaced_with_a_valid_one() -> anyhow::Result<()> {
    let store = MemoryStore::new();
    store.create_collection("docs");
    store.seed_malformed_index("docs", "embedding");

    let state = index_repair::validate(&store, "docs", "embedding", 3).await?;
    assert_eq!(state, vecops_core::types::IndexState::MalformedIndex);

    let action = index_repair::repair(&store, "docs", "embedding", &IndexParams::for_dimension(3))
        .await?;
    assert_eq!(action, RepairAction::Created);

    let state = index_repair::validate(&store, "docs", "embedding", 3).await?;
    assert_eq!(state, vecops_core::types::IndexState::ValidIndex);
    Ok(())
}

#[tokio::test]
async fn metadata_normalization_converges() -> anyhow::Result<()> {
    let store = MemoryStore::new();
    seed_doc(&store, "a", [1.0, 0.0, 0.0], "bge-m3", &[]);
    seed_doc(&store, "b", [0.0, 1.0, 0.0], "minilm", &[]);
    seed_doc(&store, "c", [0.0, 0.0, 1.0], "ada-002", &[]);
    store.insert_document("docs", "plain", json!({"_key": "plain", "title": "no embedding"}));

    let report = normalize::repair(&store, "docs", &canonical(), false).await?;
    assert_eq!(report.total, 4);
    assert_eq!(report.fixed, 2);
    assert_eq!(report.skipped, 2);
    assert_eq!(report.errors, 0);

    let statuses = normalize::scan(&store, "docs", &canonical()).await?;
    assert!(statuses.iter().all(|(_, s)| !s.is_non_conforming()));

    let mut models = std::collections::HashSet::new();
    for key in ["a", "b", "c"] {
        let doc = store.document("docs", key).expect("doc");
        models.insert(
            doc.body["embedding_meta"]["model"]
                .as_str()
                .expect("model")
                .to_string(),
        );
    }
    assert_eq!(models.len(), 1);
    Ok(())
}

#[tokio::test]
async fn repaired_metadata_keeps_original_timestamp() -> anyhow::Result<()> {
    let store = MemoryStore::new();
    seed_doc(&store, "b", [0.0, 1.0, 0.0], "minilm", &[]);

    normalize::repair(&store, "docs", &canonical(), false).await?;
    let doc = store.document("docs", "b").expect("doc");
    assert_eq!(
        doc.body["embedding_meta"]["created_at"],
        json!("2026-01-01T00:00:00Z")
    );
    assert_eq!(doc.body["embedding_meta"]["model"], json!("bge-m3"));
    Ok(())
}

#[tokio::test]
async fn dry_run_counts_match_without_mutation() -> anyhow::Result<()> {
    let store = MemoryStore::new();
    seed_doc(&store, "a", [1.0, 0.0, 0.0], "bge-m3", &[]);
    seed_doc(&store, "b", [0.0, 1.0, 0.0], "minilm", &[]);
    store.insert_document(
        "docs",
        "weird",
        json!({"_key": "weird", "embedding": {"not": "a vector"}}),
    );

    let before: Vec<_> = ["a", "b", "weird"]
        .iter()
        .map(|k| serde_json::to_vec(&store.document("docs", k).expect("doc")).expect("bytes"))
        .collect();

    let dry = normalize::repair(&store, "docs", &canonical(), true).await?;

    let after: Vec<_> = ["a", "b", "weird"]
        .iter()
        .map(|k| serde_json::to_vec(&store.document("docs", k).expect("doc")).expect("bytes"))
        .collect();
    assert_eq!(before, after);

    let real = normalize::repair(&store, "docs", &canonical(), false).await?;
    assert_eq!(dry.fixed, real.fixed);
    assert_eq!(dry.skipped, real.skipped);
    assert_eq!(dry.total, real.total);
    Ok(())
}

#[tokio::test]
async fn object_shaped_embedding_reports_distinctly() -> anyhow::Result<()> {
    let store = MemoryStore::new();
    store.insert_document(
        "docs",
        "weird",
        json!({"_key": "weird", "embedding": {"0": 0.5}}),
    );
    store.insert_document("docs", "short", json!({"_key": "short", "embedding": [0.5]}));
    store.insert_document("docs", "none", json!({"_key": "none"}));

    let statuses = normalize::scan(&store, "docs", &canonical()).await?;
    let by_key: std::collections::HashMap<_, _> = statuses.into_iter().collect();
    use vecops_core::types::NonConformance;
    assert_eq!(
        by_key["weird"],
        Conformance::NonConforming(NonConformance::MalformedShape)
    );
    assert_eq!(
        by_key["short"],
        Conformance::NonConforming(NonConformance::WrongDimension {
            expected: 3,
            actual: 1
        })
    );
    assert_eq!(by_key["none"], Conformance::NoEmbedding);
    Ok(())
}

#[tokio::test]
async fn probe_without_index_returns_degraded_envelope() -> anyhow::Result<()> {
    let store = MemoryStore::new();
    seed_doc(&store, "a", [1.0, 0.0, 0.0], "bge-m3", &[]);

    let envelope = probe::probe(
        &store,
        &["docs".to_string()],
        "embedding",
        &[1.0, 0.0, 0.0],
        &ProbeOptions::default(),
    )
    .await?;

    assert_eq!(envelope.engine, EngineUsed::IndexUnavailable);
    assert!(envelope.results.is_empty());
    assert_eq!(envelope.total, 0);
    // The native primitive never ran, so nothing was created either.
    assert_eq!(store.index_creation_calls(), 0);
    Ok(())
}

#[tokio::test]
async fn probe_with_auto_repair_provisions_then_searches() -> anyhow::Result<()> {
    let store = MemoryStore::new();
    seed_doc(&store, "a", [1.0, 0.0, 0.0], "bge-m3", &[]);
    seed_doc(&store, "b", [0.0, 1.0, 0.0], "bge-m3", &[]);

    let opts = ProbeOptions {
        auto_repair: true,
        ..ProbeOptions::default()
    };
    let envelope = probe::probe(
        &store,
        &["docs".to_string()],
        "embedding",
        &[1.0, 0.0, 0.0],
        &opts,
    )
    .await?;

    assert_eq!(envelope.engine, EngineUsed::NativeApprox);
    assert_eq!(envelope.total, envelope.results.len());
    assert_eq!(envelope.results[0].document.key, "a");
    assert_eq!(store.index_creation_calls(), 1);
    Ok(())
}

#[tokio::test]
async fn probe_orders_by_score_and_applies_min_score() -> anyhow::Result<()> {
    let store = MemoryStore::new();
    seed_doc(&store, "close", [0.9, 0.1, 0.0], "bge-m3", &[]);
    seed_doc(&store, "closer", [1.0, 0.0, 0.0], "bge-m3", &[]);
    seed_doc(&store, "far", [0.0, 0.0, 1.0], "bge-m3", &[]);
    index_repair::repair(&store, "docs", "embedding", &IndexParams::for_dimension(3)).await?;

    let opts = ProbeOptions {
        min_score: 0.5,
        top_n: 10,
        auto_repair: false,
    };
    let envelope = probe::probe(
        &store,
        &["docs".to_string()],
        "embedding",
        &[1.0, 0.0, 0.0],
        &opts,
    )
    .await?;

    assert_eq!(envelope.engine, EngineUsed::NativeApprox);
    let keys: Vec<_> = envelope
        .results
        .iter()
        .map(|h| h.document.key.as_str())
        .collect();
    assert_eq!(keys, vec!["closer", "close"]);
    assert!(envelope.results.windows(2).all(|w| w[0].score >= w[1].score));
    Ok(())
}

#[tokio::test]
async fn filtered_search_runs_as_two_stages() -> anyhow::Result<()> {
    let store = MemoryStore::new();
    seed_doc(&store, "ml", [1.0, 0.0, 0.0], "bge-m3", &["ml"]);
    seed_doc(&store, "dl", [0.9, 0.1, 0.0], "bge-m3", &["ml", "deep-learning"]);
    seed_doc(&store, "py", [0.5, 0.5, 0.0], "bge-m3", &["python"]);
    index_repair::repair(&store, "docs", "embedding", &IndexParams::for_dimension(3)).await?;

    // Stage one: unfiltered similarity over the full candidate set.
    let opts = ProbeOptions {
        min_score: 0.0,
        top_n: 3,
        auto_repair: false,
    };
    let envelope = probe::probe(
        &store,
        &["docs".to_string()],
        "embedding",
        &[1.0, 0.0, 0.0],
        &opts,
    )
    .await?;
    assert_eq!(envelope.total, 3);

    // Stage two: in-memory filtering over the returned candidates.
    let filtered = apply_post_filter(envelope, tag_contains("tags", "python"));
    assert_eq!(filtered.total, 1);
    assert_eq!(filtered.results[0].document.key, "py");
    Ok(())
}

/// Delegates everything to an inner [`MemoryStore`] but refuses to write
/// one document, standing in for a doc-level lock conflict.
struct StuckDocStore {
    inner: MemoryStore,
    stuck_key: String,
}

#[async_trait]
impl DocumentStore for StuckDocStore {
    async fn list_collections(&self) -> Result<Vec<String>> {
        self.inner.list_collections().await
    }

    async fn fetch_documents(&self, collection: &str) -> Result<Vec<Document>> {
        self.inner.fetch_documents(collection).await
    }

    async fn update_document(&self, collection: &str, key: &str, patch: &Value) -> Result<()> {
        if key == self.stuck_key {
            return Err(Error::Operation(format!("write conflict on '{key}'")));
        }
        self.inner.update_document(collection, key, patch).await
    }

    async fn list_indexes(&self, collection: &str) -> Result<Vec<IndexDescriptor>> {
        self.inner.list_indexes(collection).await
    }

    async fn create_index(
        &self,
        collection: &str,
        definition: &VectorIndexDefinition,
    ) -> Result<()> {
        self.inner.create_index(collection, definition).await
    }

    async fn list_views(&self) -> Result<Vec<String>> {
        self.inner.list_views().await
    }

    async fn create_view(&self, definition: &ViewDefinition) -> Result<()> {
        self.inner.create_view(definition).await
    }

    async fn vector_search(
        &self,
        collection: &str,
        field: &str,
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredDocument>> {
        self.inner.vector_search(collection, field, query, limit).await
    }
}

#[tokio::test]
async fn repair_outlives_a_single_failing_write() -> anyhow::Result<()> {
    let inner = MemoryStore::new();
    seed_doc(&inner, "b", [0.0, 1.0, 0.0], "minilm", &[]);
    seed_doc(&inner, "c", [0.0, 0.0, 1.0], "ada-002", &[]);
    let store = StuckDocStore {
        inner,
        stuck_key: "b".to_string(),
    };

    let report = normalize::repair(&store, "docs", &canonical(), false).await?;
    assert_eq!(report.total, 2);
    assert_eq!(report.errors, 1);
    assert_eq!(report.fixed, 1);

    // The failure is recorded against the offending key only.
    assert!(report
        .details
        .iter()
        .any(|d| d.key == "b" && matches!(d.outcome, RepairOutcome::Failed(_))));

    // The sweep continued past the failure: the other document converged.
    let doc = store.inner.document("docs", "c").expect("doc");
    assert_eq!(doc.body["embedding_meta"]["model"], json!("bge-m3"));
    let statuses = normalize::scan(&store, "docs", &canonical()).await?;
    let by_key: std::collections::HashMap<_, _> = statuses.into_iter().collect();
    assert!(by_key["b"].is_non_conforming());
    assert_eq!(by_key["c"], Conformance::Conforming);
    Ok(())
}

#[tokio::test]
async fn empty_query_vector_fails_fast() {
    let store = MemoryStore::new();
    store.create_collection("docs");
    let result = probe::probe(
        &store,
        &["docs".to_string()],
        "embedding",
        &[],
        &ProbeOptions::default(),
    )
    .await;
    assert!(result.is_err());
}
