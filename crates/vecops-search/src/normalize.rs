//! Embedding metadata normalizer.
//!
//! `scan` classifies every document in a collection against the canonical
//! (model, dimension) pair; `repair` rewrites non-conforming metadata
//! blocks in place. Repair is best-effort across the full set: a failed
//! document update is counted and recorded, never aborts the sweep.

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use vecops_core::types::{
    CanonicalEmbedding, Conformance, NonConformance, EMBEDDING_FIELD, EMBEDDING_META_FIELD,
};
use vecops_core::Result;
use vecops_store::DocumentStore;

/// What happened (or would happen) to one non-conforming document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairOutcome {
    Fixed,
    WouldFix,
    Failed(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct RepairDetail {
    pub key: String,
    pub reason: NonConformance,
    pub outcome: RepairOutcome,
}

#[derive(Debug, Default, Serialize)]
pub struct RepairReport {
    pub total: usize,
    pub fixed: usize,
    pub skipped: usize,
    pub errors: usize,
    pub details: Vec<RepairDetail>,
}

/// Classify one document body against the canonical configuration.
pub fn classify(body: &Value, canonical: &CanonicalEmbedding) -> Conformance {
    let embedding = match body.get(EMBEDDING_FIELD) {
        None | Some(Value::Null) => return Conformance::NoEmbedding,
        Some(v) => v,
    };
    // An object or scalar here is a malformed shape, not a missing
    // embedding; it gets its own report bucket.
    let Some(items) = embedding.as_array() else {
        return Conformance::NonConforming(NonConformance::MalformedShape);
    };
    if !items.iter().all(Value::is_number) {
        return Conformance::NonConforming(NonConformance::MalformedShape);
    }
    if items.len() != canonical.dim {
        return Conformance::NonConforming(NonConformance::WrongDimension {
            expected: canonical.dim,
            actual: items.len(),
        });
    }
    let Some(meta) = body.get(EMBEDDING_META_FIELD).and_then(Value::as_object) else {
        return Conformance::NonConforming(NonConformance::MissingMetadata);
    };
    match meta.get("model").and_then(Value::as_str) {
        Some(model) if model == canonical.model => {}
        Some(model) => {
            return Conformance::NonConforming(NonConformance::WrongModel {
                found: model.to_string(),
            })
        }
        None => return Conformance::NonConforming(NonConformance::MissingMetadata),
    }
    match meta.get("dim").and_then(Value::as_u64) {
        Some(dim) if dim as usize == canonical.dim => Conformance::Conforming,
        Some(dim) => Conformance::NonConforming(NonConformance::StaleDimension {
            recorded: dim as usize,
        }),
        None => Conformance::NonConforming(NonConformance::MissingMetadata),
    }
}

/// Report conformance for every document in `collection`.
pub async fn scan(
    store: &dyn DocumentStore,
    collection: &str,
    canonical: &CanonicalEmbedding,
) -> Result<Vec<(String, Conformance)>> {
    canonical.validate()?;
    let docs = store.fetch_documents(collection).await?;
    Ok(docs
        .into_iter()
        .map(|doc| {
            let status = classify(&doc.body, canonical);
            (doc.key, status)
        })
        .collect())
}

/// The canonical metadata block written back to a repaired document. The
/// original creation timestamp survives; absent one, the current time is
/// stamped.
fn canonical_meta_patch(body: &Value, canonical: &CanonicalEmbedding) -> Value {
    let created_at = body
        .get(EMBEDDING_META_FIELD)
        .and_then(|m| m.get("created_at"))
        .filter(|v| !v.is_null())
        .cloned()
        .unwrap_or_else(|| json!(Utc::now().to_rfc3339()));
    json!({
        (EMBEDDING_META_FIELD): {
            "model": canonical.model,
            "dim": canonical.dim,
            "created_at": created_at,
        }
    })
}

/// Rewrite every non-conforming document's metadata block to the
/// canonical model/dimension. With `dry_run` the same counts are computed
/// without touching the database.
pub async fn repair(
    store: &dyn DocumentStore,
    collection: &str,
    canonical: &CanonicalEmbedding,
    dry_run: bool,
) -> Result<RepairReport> {
    canonical.validate()?;
    let docs = store.fetch_documents(collection).await?;
    let mut report = RepairReport {
        total: docs.len(),
        ..RepairReport::default()
    };
    for doc in &docs {
        let reason = match classify(&doc.body, canonical) {
            Conformance::NonConforming(reason) => reason,
            Conformance::NoEmbedding | Conformance::Conforming => {
                report.skipped += 1;
                continue;
            }
        };
        if dry_run {
            report.fixed += 1;
            report.details.push(RepairDetail {
                key: doc.key.clone(),
                reason,
                outcome: RepairOutcome::WouldFix,
            });
            continue;
        }
        let patch = canonical_meta_patch(&doc.body, canonical);
        match store.update_document(collection, &doc.key, &patch).await {
            Ok(()) => {
                debug!(collection, key = %doc.key, %reason, "rewrote embedding metadata");
                report.fixed += 1;
                report.details.push(RepairDetail {
                    key: doc.key.clone(),
                    reason,
                    outcome: RepairOutcome::Fixed,
                });
            }
            Err(e) => {
                warn!(collection, key = %doc.key, error = %e, "metadata repair failed");
                report.errors += 1;
                report.details.push(RepairDetail {
                    key: doc.key.clone(),
                    reason,
                    outcome: RepairOutcome::Failed(e.to_string()),
                });
            }
        }
    }
    Ok(report)
}
