//! Storage seam between the consistency core and the external database.
//!
//! [`DocumentStore`] is the only interface the core uses: parameterized
//! queries, document updates, the index catalog with structured parameter
//! blocks, named search views, and the native approximate-similarity
//! primitive. Backends: [`http::HttpStore`] for the real engine,
//! [`memory::MemoryStore`] for tests.

#![deny(warnings)]
#![deny(unused_imports)]

pub mod http;
pub mod memory;

use async_trait::async_trait;
use serde_json::Value;

use vecops_core::types::{
    Document, IndexDescriptor, ScoredDocument, VectorIndexDefinition, ViewDefinition,
};
use vecops_core::Result;

/// Abstract database backend.
///
/// All operations are blocking from the caller's point of view: one
/// request at a time, no internal concurrency. The database remains the
/// source of truth for what exists; nothing here caches catalog state.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn list_collections(&self) -> Result<Vec<String>>;

    /// Every document in the collection, key plus full body.
    async fn fetch_documents(&self, collection: &str) -> Result<Vec<Document>>;

    /// Partial update: top-level fields of `patch` are merged into the
    /// stored document, replacing existing values field-by-field.
    async fn update_document(&self, collection: &str, key: &str, patch: &Value) -> Result<()>;

    /// The collection's index catalog as reported by the engine.
    async fn list_indexes(&self, collection: &str) -> Result<Vec<IndexDescriptor>>;

    /// Issue an index creation request. The definition's parameter block
    /// must travel as a nested object; the engine silently accepts a
    /// flattened request without producing the search capability.
    async fn create_index(
        &self,
        collection: &str,
        definition: &VectorIndexDefinition,
    ) -> Result<()>;

    async fn list_views(&self) -> Result<Vec<String>>;

    async fn create_view(&self, definition: &ViewDefinition) -> Result<()>;

    /// The native approximate-similarity primitive: rank documents in
    /// `collection` by vector closeness to `query` on `field`, best first.
    ///
    /// Fails with [`vecops_core::Error::IndexMissing`] when no usable
    /// vector index covers the field. Cannot be combined with filter
    /// predicates; callers filter over the returned candidates.
    async fn vector_search(
        &self,
        collection: &str,
        field: &str,
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredDocument>>;
}
