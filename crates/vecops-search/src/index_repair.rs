//! Vector index validator/repairer.
//!
//! Per (collection, field) the catalog is classified as
//! `NoIndex | MalformedIndex | ValidIndex`. Repair only acts on the first
//! two states and is idempotent: a valid index is never recreated.
//! Unlike metadata repair, a creation failure here is logged with full
//! context and propagated, because a broken index silently degrades every
//! downstream search.

use serde_json::Value;
use tracing::{error, info};

use vecops_core::types::{IndexDescriptor, IndexParams, IndexState, VectorIndexDefinition};
use vecops_core::{Error, Result};
use vecops_store::DocumentStore;

/// Whether `repair` issued a creation call or found nothing to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairAction {
    Created,
    AlreadyValid,
}

fn index_is_valid(index: &IndexDescriptor, expected_dim: usize) -> bool {
    let Some(params) = index.params.as_ref().and_then(Value::as_object) else {
        return false;
    };
    if params.is_empty() {
        return false;
    }
    params.get("dimension").and_then(Value::as_u64) == Some(expected_dim as u64)
}

/// Classify the index catalog for `field`. A collection holding both a
/// malformed and a valid vector index on the field counts as valid; the
/// engine routes approximate search through the usable one.
pub async fn validate(
    store: &dyn DocumentStore,
    collection: &str,
    field: &str,
    expected_dim: usize,
) -> Result<IndexState> {
    let catalog = store.list_indexes(collection).await?;
    let covering: Vec<&IndexDescriptor> = catalog
        .iter()
        .filter(|ix| ix.is_vector() && ix.covers(field))
        .collect();
    if covering.is_empty() {
        return Ok(IndexState::NoIndex);
    }
    if covering.iter().any(|ix| index_is_valid(ix, expected_dim)) {
        Ok(IndexState::ValidIndex)
    } else {
        Ok(IndexState::MalformedIndex)
    }
}

/// Guard against the engine's most failure-prone contract point: it
/// silently accepts a creation request whose parameters arrive flattened
/// instead of as a nested object, without producing the search
/// capability. Checked on the serialized request, at repair time.
fn check_definition_shape(definition: &VectorIndexDefinition) -> Result<()> {
    let serialized = serde_json::to_value(definition)?;
    let nested = serialized
        .get("params")
        .and_then(Value::as_object)
        .is_some_and(|p| !p.is_empty());
    if !nested {
        return Err(Error::InvalidConfig(
            "vector index request must carry a nested non-empty 'params' object".to_string(),
        ));
    }
    if serialized.get("dimension").is_some() || serialized.get("nLists").is_some() {
        return Err(Error::InvalidConfig(
            "vector index parameters must not appear flattened at the top level".to_string(),
        ));
    }
    Ok(())
}

/// Ensure a structurally correct vector index exists on
/// `collection.field`. No-op when the state is already `ValidIndex`.
pub async fn repair(
    store: &dyn DocumentStore,
    collection: &str,
    field: &str,
    params: &IndexParams,
) -> Result<RepairAction> {
    params.validate()?;
    let state = validate(store, collection, field, params.dimension).await?;
    if state.is_valid() {
        info!(collection, field, "vector index already valid, skipping");
        return Ok(RepairAction::AlreadyValid);
    }
    let definition = VectorIndexDefinition::new(field, params.clone());
    check_definition_shape(&definition)?;
    info!(collection, field, ?state, dimension = params.dimension, "creating vector index");
    if let Err(e) = store.create_index(collection, &definition).await {
        error!(
            collection,
            field,
            dimension = params.dimension,
            metric = %params.metric,
            n_lists = params.n_lists,
            error = %e,
            "vector index creation failed"
        );
        return Err(Error::IndexCreation {
            collection: collection.to_string(),
            field: field.to_string(),
            message: e.to_string(),
        });
    }
    Ok(RepairAction::Created)
}
