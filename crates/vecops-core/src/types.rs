//! Domain types shared by the store backends and the consistency core.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Field on a document that holds the embedding vector.
pub const EMBEDDING_FIELD: &str = "embedding";

/// Field on a document that holds the embedding metadata block.
pub const EMBEDDING_META_FIELD: &str = "embedding_meta";

/// A document as stored in a collection: a stable key plus an arbitrary
/// JSON body. The body may carry an embedding vector and its metadata
/// under the well-known fields above.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub key: String,
    pub body: Value,
}

impl Document {
    pub fn new(key: impl Into<String>, body: Value) -> Self {
        Self {
            key: key.into(),
            body,
        }
    }
}

/// The single agreed-upon (model, dimension) pair that every embedded
/// document in a collection must share.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalEmbedding {
    pub model: String,
    pub dim: usize,
}

impl CanonicalEmbedding {
    pub fn new(model: impl Into<String>, dim: usize) -> Self {
        Self {
            model: model.into(),
            dim,
        }
    }

    /// Fails fast before any database access when the canonical pair is
    /// unusable.
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "canonical embedding model must not be empty".to_string(),
            ));
        }
        if self.dim == 0 {
            return Err(Error::InvalidConfig(
                "canonical embedding dimension must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Why a document's embedding does not match the canonical configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NonConformance {
    /// Embedding field is present but is not an ordered numeric sequence
    /// (e.g. an object). Reported distinctly from a missing embedding and
    /// from a wrong dimension.
    MalformedShape,
    /// Vector length disagrees with the canonical dimension.
    WrongDimension { expected: usize, actual: usize },
    /// No metadata block, or the block is not an object.
    MissingMetadata,
    /// Metadata names a different model.
    WrongModel { found: String },
    /// Metadata records a dimension other than the canonical one.
    StaleDimension { recorded: usize },
}

impl fmt::Display for NonConformance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedShape => write!(f, "embedding is not a numeric sequence"),
            Self::WrongDimension { expected, actual } => {
                write!(f, "vector has {actual} dims, expected {expected}")
            }
            Self::MissingMetadata => write!(f, "embedding metadata missing"),
            Self::WrongModel { found } => write!(f, "wrong model '{found}'"),
            Self::StaleDimension { recorded } => {
                write!(f, "metadata records stale dimension {recorded}")
            }
        }
    }
}

/// Conformance status of a single document, exhaustive by construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Conformance {
    /// Document carries no embedding; exempt from the canonical rule.
    NoEmbedding,
    Conforming,
    NonConforming(NonConformance),
}

impl Conformance {
    pub fn is_non_conforming(&self) -> bool {
        matches!(self, Self::NonConforming(_))
    }
}

/// Similarity function used by a vector index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    #[default]
    Cosine,
    Euclidean,
    #[serde(rename = "dot_product")]
    DotProduct,
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cosine => write!(f, "cosine"),
            Self::Euclidean => write!(f, "euclidean"),
            Self::DotProduct => write!(f, "dot_product"),
        }
    }
}

impl FromStr for Metric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "cosine" => Ok(Self::Cosine),
            "euclidean" | "l2" => Ok(Self::Euclidean),
            "dot_product" | "dot" => Ok(Self::DotProduct),
            other => Err(Error::InvalidConfig(format!("unknown metric '{other}'"))),
        }
    }
}

/// Structural parameters of a vector index. The engine requires these as a
/// nested object on the creation request; flattened keys are silently
/// accepted but do not produce the approximate-search capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexParams {
    pub dimension: usize,
    pub metric: Metric,
    pub n_lists: u32,
}

impl IndexParams {
    /// Canonical defaults: cosine metric, two inverted lists.
    pub fn for_dimension(dimension: usize) -> Self {
        Self {
            dimension,
            metric: Metric::Cosine,
            n_lists: 2,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.dimension == 0 {
            return Err(Error::InvalidConfig(
                "index dimension must be positive".to_string(),
            ));
        }
        if self.n_lists == 0 {
            return Err(Error::InvalidConfig(
                "index nLists must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Creation request for a vector index. `params` must serialize as a
/// structured sub-object, never as flattened keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorIndexDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub fields: Vec<String>,
    pub params: IndexParams,
}

impl VectorIndexDefinition {
    pub fn new(field: &str, params: IndexParams) -> Self {
        Self {
            name: format!("vector_{field}"),
            kind: "vector".to_string(),
            fields: vec![field.to_string()],
            params,
        }
    }
}

/// An index as reported by the engine's catalog. `params` is kept loose on
/// purpose: malformed indexes in the wild carry absent or empty blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub params: Option<Value>,
}

impl IndexDescriptor {
    pub fn covers(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f == field)
    }

    pub fn is_vector(&self) -> bool {
        self.kind == "vector"
    }
}

/// Validation state of a (collection, field) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexState {
    NoIndex,
    MalformedIndex,
    ValidIndex,
}

impl IndexState {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::ValidIndex)
    }
}

/// Per-field analyzer assignment inside a search view link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldLink {
    pub analyzers: Vec<String>,
}

/// One collection's link inside a search view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionLink {
    pub fields: BTreeMap<String, FieldLink>,
}

/// Creation request for a named search view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub links: BTreeMap<String, CollectionLink>,
}

impl ViewDefinition {
    /// A search view over `collection` with the given analyzed text fields.
    pub fn for_collection(name: &str, collection: &str, fields: &[(&str, &[&str])]) -> Self {
        let mut field_links = BTreeMap::new();
        for (field, analyzers) in fields {
            field_links.insert(
                (*field).to_string(),
                FieldLink {
                    analyzers: analyzers.iter().map(|a| (*a).to_string()).collect(),
                },
            );
        }
        let mut links = BTreeMap::new();
        links.insert(
            collection.to_string(),
            CollectionLink {
                fields: field_links,
            },
        );
        Self {
            name: name.to_string(),
            kind: "arangosearch".to_string(),
            links,
        }
    }
}

/// One ranked hit: the document plus its similarity score (higher is
/// better regardless of metric).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredDocument {
    pub document: Document,
    pub score: f32,
}

/// Which path produced a probe's results. Must truthfully reflect whether
/// the native approximate-similarity primitive ran.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EngineUsed {
    NativeApprox,
    IndexUnavailable,
    Error(ProbeError),
}

impl fmt::Display for EngineUsed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NativeApprox => write!(f, "native-approx"),
            Self::IndexUnavailable => write!(f, "index-unavailable"),
            Self::Error(e) => write!(f, "error ({})", e.message),
        }
    }
}

/// Classified engine failure embedded in a degraded envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeError {
    pub kind: ProbeErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeErrorKind {
    IndexMissing,
    DimensionMismatch,
    Connection,
    Other,
}

/// Uniform result shape returned by the prober on every path.
///
/// Invariant: `total == results.len()` for non-paginated calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchEnvelope {
    pub engine: EngineUsed,
    pub total: usize,
    pub results: Vec<ScoredDocument>,
}

impl SearchEnvelope {
    pub fn native(results: Vec<ScoredDocument>) -> Self {
        Self {
            engine: EngineUsed::NativeApprox,
            total: results.len(),
            results,
        }
    }

    pub fn degraded(engine: EngineUsed) -> Self {
        Self {
            engine,
            total: 0,
            results: Vec::new(),
        }
    }
}
