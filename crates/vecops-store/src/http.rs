//! HTTP backend for an ArangoDB-flavored REST API.
//!
//! Covers the cursor endpoint (parameterized AQL with bind vars), the
//! document/index/view endpoints, and a cosine approximate-similarity
//! query. Connectivity failures surface immediately as
//! [`Error::Connectivity`]; no retries at this layer.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use vecops_core::config::DatabaseConfig;
use vecops_core::types::{
    Document, IndexDescriptor, ScoredDocument, VectorIndexDefinition, ViewDefinition,
};
use vecops_core::{Error, Result};

use crate::DocumentStore;

pub struct HttpStore {
    client: reqwest::Client,
    base: String,
    database: String,
    username: String,
    password: String,
}

impl HttpStore {
    pub fn new(config: &DatabaseConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base: config.url.trim_end_matches('/').to_string(),
            database: config.database.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/_db/{}/_api/{}", self.base, self.database, path)
    }

    async fn request(&self, builder: reqwest::RequestBuilder) -> Result<Value> {
        let builder = if self.username.is_empty() {
            builder
        } else {
            builder.basic_auth(&self.username, Some(&self.password))
        };
        let response = builder
            .send()
            .await
            .map_err(|e| Error::Connectivity(e.to_string()))?;
        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::Operation(format!("malformed response: {e}")))?;
        let message = body["errorMessage"]
            .as_str()
            .unwrap_or("unknown error")
            .to_string();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::NotFound(message));
        }
        if !status.is_success() || body["error"].as_bool() == Some(true) {
            return Err(Error::Operation(message));
        }
        Ok(body)
    }

    /// Parameterized AQL via the cursor API, following `hasMore` pages.
    async fn query(&self, aql: &str, bind_vars: Value) -> Result<Vec<Value>> {
        let payload = json!({
            "query": aql,
            "bindVars": bind_vars,
            "batchSize": 1000,
        });
        let mut response = self
            .request(self.client.post(self.endpoint("cursor")).json(&payload))
            .await?;
        let mut rows = Vec::new();
        loop {
            if let Some(batch) = response["result"].as_array() {
                rows.extend(batch.iter().cloned());
            }
            if response["hasMore"].as_bool() != Some(true) {
                break;
            }
            let id = response["id"]
                .as_str()
                .ok_or_else(|| Error::Operation("cursor without id".to_string()))?
                .to_string();
            response = self
                .request(self.client.put(self.endpoint(&format!("cursor/{id}"))))
                .await?;
        }
        Ok(rows)
    }
}

fn row_to_document(row: &Value) -> Document {
    let key = row["_key"].as_str().unwrap_or_default().to_string();
    Document::new(key, row.clone())
}

#[async_trait]
impl DocumentStore for HttpStore {
    async fn list_collections(&self) -> Result<Vec<String>> {
        let body = self
            .request(self.client.get(self.endpoint("collection")))
            .await?;
        let names = body["result"]
            .as_array()
            .map(|cols| {
                cols.iter()
                    .filter_map(|c| c["name"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        Ok(names)
    }

    async fn fetch_documents(&self, collection: &str) -> Result<Vec<Document>> {
        let rows = self
            .query(
                "FOR d IN @@collection RETURN d",
                json!({ "@collection": collection }),
            )
            .await?;
        Ok(rows.iter().map(row_to_document).collect())
    }

    async fn update_document(&self, collection: &str, key: &str, patch: &Value) -> Result<()> {
        // mergeObjects=false: patched fields replace stored values
        // wholesale, so a rewritten metadata block carries no stale keys.
        let url = format!(
            "{}?mergeObjects=false",
            self.endpoint(&format!("document/{collection}/{key}"))
        );
        self.request(self.client.patch(url).json(patch)).await?;
        Ok(())
    }

    async fn list_indexes(&self, collection: &str) -> Result<Vec<IndexDescriptor>> {
        let url = format!("{}?collection={collection}", self.endpoint("index"));
        let body = self.request(self.client.get(url)).await?;
        let indexes = serde_json::from_value(body["indexes"].clone())?;
        Ok(indexes)
    }

    async fn create_index(
        &self,
        collection: &str,
        definition: &VectorIndexDefinition,
    ) -> Result<()> {
        debug!(collection, index = %definition.name, "creating vector index");
        let url = format!("{}?collection={collection}", self.endpoint("index"));
        self.request(self.client.post(url).json(definition)).await?;
        Ok(())
    }

    async fn list_views(&self) -> Result<Vec<String>> {
        let body = self.request(self.client.get(self.endpoint("view"))).await?;
        let names = body["result"]
            .as_array()
            .map(|views| {
                views
                    .iter()
                    .filter_map(|v| v["name"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        Ok(names)
    }

    async fn create_view(&self, definition: &ViewDefinition) -> Result<()> {
        debug!(view = %definition.name, "creating search view");
        self.request(self.client.post(self.endpoint("view")).json(definition))
            .await?;
        Ok(())
    }

    async fn vector_search(
        &self,
        collection: &str,
        field: &str,
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredDocument>> {
        let aql = "FOR d IN @@collection \
                   LET score = APPROX_NEAR_COSINE(d.@field, @query) \
                   SORT score DESC LIMIT @limit \
                   RETURN { document: d, score: score }";
        let rows = self
            .query(
                aql,
                json!({
                    "@collection": collection,
                    "field": field,
                    "query": query,
                    "limit": limit,
                }),
            )
            .await
            .map_err(|e| match e {
                // The engine reports a missing capability as a plain query
                // error; translate it so callers can classify.
                Error::Operation(msg) if msg.to_lowercase().contains("vector index") => {
                    Error::IndexMissing {
                        collection: collection.to_string(),
                        field: field.to_string(),
                    }
                }
                other => other,
            })?;
        let mut hits = Vec::with_capacity(rows.len());
        for row in &rows {
            let score = row["score"].as_f64().unwrap_or_default() as f32;
            hits.push(ScoredDocument {
                document: row_to_document(&row["document"]),
                score,
            });
        }
        Ok(hits)
    }
}
