//! In-memory [`DocumentStore`] used by tests.
//!
//! Mirrors the engine contract closely enough to exercise the consistency
//! core: a real index catalog (so validator states are reachable), vector
//! search that refuses to run without a usable index, and a creation-call
//! counter so idempotence is observable. Similarity is brute-force cosine.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::Value;

use vecops_core::types::{
    Document, IndexDescriptor, ScoredDocument, VectorIndexDefinition, ViewDefinition,
};
use vecops_core::{Error, Result};

use crate::DocumentStore;

#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Vec<Document>>>,
    indexes: RwLock<HashMap<String, Vec<IndexDescriptor>>>,
    views: RwLock<Vec<ViewDefinition>>,
    index_creations: AtomicUsize,
    view_creations: AtomicUsize,
}

fn cosine_sim(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a < f32::EPSILON || mag_b < f32::EPSILON {
        0.0
    } else {
        dot / (mag_a * mag_b)
    }
}

fn vector_from_field(body: &Value, field: &str) -> Option<Vec<f32>> {
    let items = body.get(field)?.as_array()?;
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        out.push(item.as_f64()? as f32);
    }
    Some(out)
}

fn params_dimension(index: &IndexDescriptor) -> Option<usize> {
    let params = index.params.as_ref()?.as_object()?;
    if params.is_empty() {
        return None;
    }
    params.get("dimension")?.as_u64().map(|d| d as usize)
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_collection(&self, name: &str) {
        self.collections
            .write()
            .expect("collections lock")
            .entry(name.to_string())
            .or_default();
    }

    pub fn insert_document(&self, collection: &str, key: &str, body: Value) {
        self.collections
            .write()
            .expect("collections lock")
            .entry(collection.to_string())
            .or_default()
            .push(Document::new(key, body));
    }

    /// Seed a broken catalog entry: a vector index whose parameter block
    /// is an empty object, as left behind by a flattened creation request.
    pub fn seed_malformed_index(&self, collection: &str, field: &str) {
        self.indexes
            .write()
            .expect("indexes lock")
            .entry(collection.to_string())
            .or_default()
            .push(IndexDescriptor {
                id: format!("{collection}/malformed"),
                kind: "vector".to_string(),
                fields: vec![field.to_string()],
                params: Some(Value::Object(serde_json::Map::new())),
            });
    }

    pub fn document(&self, collection: &str, key: &str) -> Option<Document> {
        self.collections
            .read()
            .expect("collections lock")
            .get(collection)?
            .iter()
            .find(|d| d.key == key)
            .cloned()
    }

    pub fn index_creation_calls(&self) -> usize {
        self.index_creations.load(Ordering::SeqCst)
    }

    pub fn view_creation_calls(&self) -> usize {
        self.view_creations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn list_collections(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .collections
            .read()
            .expect("collections lock")
            .keys()
            .cloned()
            .collect();
        names.sort();
        Ok(names)
    }

    async fn fetch_documents(&self, collection: &str) -> Result<Vec<Document>> {
        self.collections
            .read()
            .expect("collections lock")
            .get(collection)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("collection '{collection}'")))
    }

    async fn update_document(&self, collection: &str, key: &str, patch: &Value) -> Result<()> {
        let mut collections = self.collections.write().expect("collections lock");
        let docs = collections
            .get_mut(collection)
            .ok_or_else(|| Error::NotFound(format!("collection '{collection}'")))?;
        let doc = docs
            .iter_mut()
            .find(|d| d.key == key)
            .ok_or_else(|| Error::NotFound(format!("document '{collection}/{key}'")))?;
        let (Some(body), Some(fields)) = (doc.body.as_object_mut(), patch.as_object()) else {
            return Err(Error::Operation("patch must be an object".to_string()));
        };
        for (k, v) in fields {
            body.insert(k.clone(), v.clone());
        }
        Ok(())
    }

    async fn list_indexes(&self, collection: &str) -> Result<Vec<IndexDescriptor>> {
        Ok(self
            .indexes
            .read()
            .expect("indexes lock")
            .get(collection)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_index(
        &self,
        collection: &str,
        definition: &VectorIndexDefinition,
    ) -> Result<()> {
        let n = self.index_creations.fetch_add(1, Ordering::SeqCst);
        self.indexes
            .write()
            .expect("indexes lock")
            .entry(collection.to_string())
            .or_default()
            .push(IndexDescriptor {
                id: format!("{collection}/{n}"),
                kind: definition.kind.clone(),
                fields: definition.fields.clone(),
                params: Some(serde_json::to_value(&definition.params)?),
            });
        Ok(())
    }

    async fn list_views(&self) -> Result<Vec<String>> {
        Ok(self
            .views
            .read()
            .expect("views lock")
            .iter()
            .map(|v| v.name.clone())
            .collect())
    }

    async fn create_view(&self, definition: &ViewDefinition) -> Result<()> {
        self.view_creations.fetch_add(1, Ordering::SeqCst);
        self.views
            .write()
            .expect("views lock")
            .push(definition.clone());
        Ok(())
    }

    async fn vector_search(
        &self,
        collection: &str,
        field: &str,
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredDocument>> {
        let usable_dim = self
            .list_indexes(collection)
            .await?
            .iter()
            .filter(|ix| ix.is_vector() && ix.covers(field))
            .find_map(params_dimension)
            .ok_or_else(|| Error::IndexMissing {
                collection: collection.to_string(),
                field: field.to_string(),
            })?;
        if usable_dim != query.len() {
            return Err(Error::DimensionMismatch {
                expected: usable_dim,
                actual: query.len(),
            });
        }
        let docs = self.fetch_documents(collection).await?;
        let mut hits: Vec<ScoredDocument> = docs
            .into_iter()
            .filter_map(|doc| {
                let vector = vector_from_field(&doc.body, field)?;
                if vector.len() != query.len() {
                    return None;
                }
                let score = cosine_sim(&vector, query);
                Some(ScoredDocument {
                    document: doc,
                    score,
                })
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(limit);
        Ok(hits)
    }
}
