//! Search-capability prober.
//!
//! Probes the native approximate-similarity primitive and always answers
//! with a [`SearchEnvelope`], whatever happened underneath. Collections
//! known to lack a valid index are never queried: the primitive would
//! either error or, worse, return zero rows that read as "no matches".
//!
//! The prober accepts no filter predicates. The engine cannot combine
//! approximate similarity with arbitrary filters in one query stage, so
//! filtered semantic search is two stages by contract: an unfiltered
//! probe over a larger candidate set, then [`apply_post_filter`] over the
//! returned candidates.

use tracing::{debug, warn};

use vecops_core::types::{
    Document, EngineUsed, IndexParams, ProbeError, ProbeErrorKind, ScoredDocument, SearchEnvelope,
};
use vecops_core::{Error, Result};
use vecops_store::DocumentStore;

#[derive(Debug, Clone)]
pub struct ProbeOptions {
    pub min_score: f32,
    pub top_n: usize,
    /// Repair missing/malformed indexes before probing instead of
    /// short-circuiting with an index-unavailable envelope.
    pub auto_repair: bool,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self {
            min_score: 0.0,
            top_n: 10,
            auto_repair: false,
        }
    }
}

fn classify(err: &Error) -> ProbeError {
    let kind = match err {
        Error::IndexMissing { .. } | Error::NotFound(_) => ProbeErrorKind::IndexMissing,
        Error::DimensionMismatch { .. } => ProbeErrorKind::DimensionMismatch,
        Error::Connectivity(_) => ProbeErrorKind::Connection,
        _ => ProbeErrorKind::Other,
    };
    ProbeError {
        kind,
        message: err.to_string(),
    }
}

/// Probe `collections` with `query`, merging hits into one envelope.
///
/// Only caller mistakes (empty query, no collections) are `Err`; every
/// engine-side failure comes back inside the envelope.
pub async fn probe(
    store: &dyn DocumentStore,
    collections: &[String],
    field: &str,
    query: &[f32],
    opts: &ProbeOptions,
) -> Result<SearchEnvelope> {
    if query.is_empty() {
        return Err(Error::InvalidConfig("query vector must not be empty".to_string()));
    }
    if collections.is_empty() {
        return Err(Error::InvalidConfig("at least one collection required".to_string()));
    }

    // Pre-check every target before touching the primitive.
    for collection in collections {
        let state = match crate::index_repair::validate(store, collection, field, query.len()).await
        {
            Ok(state) => state,
            Err(e) => return Ok(SearchEnvelope::degraded(EngineUsed::Error(classify(&e)))),
        };
        if state.is_valid() {
            continue;
        }
        if !opts.auto_repair {
            debug!(collection, field, ?state, "index unavailable, short-circuiting probe");
            return Ok(SearchEnvelope::degraded(EngineUsed::IndexUnavailable));
        }
        let params = IndexParams::for_dimension(query.len());
        if let Err(e) = crate::index_repair::repair(store, collection, field, &params).await {
            warn!(collection, field, error = %e, "pre-probe repair failed");
            return Ok(SearchEnvelope::degraded(EngineUsed::Error(classify(&e))));
        }
    }

    let mut hits: Vec<ScoredDocument> = Vec::new();
    for collection in collections {
        match store.vector_search(collection, field, query, opts.top_n).await {
            Ok(batch) => hits.extend(batch),
            Err(e) => {
                warn!(collection, field, error = %e, "approximate search failed");
                return Ok(SearchEnvelope::degraded(EngineUsed::Error(classify(&e))));
            }
        }
    }
    hits.retain(|h| h.score >= opts.min_score);
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    hits.truncate(opts.top_n);
    Ok(SearchEnvelope::native(hits))
}

/// Stage two of filtered semantic search: apply `keep` in memory over the
/// candidates of an earlier unfiltered probe. Order is preserved and
/// `total` recomputed. Degraded envelopes pass through untouched.
pub fn apply_post_filter<F>(envelope: SearchEnvelope, keep: F) -> SearchEnvelope
where
    F: Fn(&Document) -> bool,
{
    if envelope.engine != EngineUsed::NativeApprox {
        return envelope;
    }
    let results: Vec<ScoredDocument> = envelope
        .results
        .into_iter()
        .filter(|hit| keep(&hit.document))
        .collect();
    SearchEnvelope {
        engine: envelope.engine,
        total: results.len(),
        results,
    }
}

/// Convenience predicate: does `field` (a string array on the document
/// body) contain `value`?
pub fn tag_contains(field: &str, value: &str) -> impl Fn(&Document) -> bool {
    let field = field.to_string();
    let value = value.to_string();
    move |doc: &Document| {
        doc.body
            .get(field.as_str())
            .and_then(|v| v.as_array())
            .is_some_and(|tags| tags.iter().any(|t| t.as_str() == Some(value.as_str())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classify_maps_error_taxonomy() {
        let missing = Error::IndexMissing {
            collection: "docs".to_string(),
            field: "embedding".to_string(),
        };
        assert_eq!(classify(&missing).kind, ProbeErrorKind::IndexMissing);
        let dim = Error::DimensionMismatch {
            expected: 4,
            actual: 3,
        };
        assert_eq!(classify(&dim).kind, ProbeErrorKind::DimensionMismatch);
        let conn = Error::Connectivity("refused".to_string());
        assert_eq!(classify(&conn).kind, ProbeErrorKind::Connection);
        let other = Error::Operation("boom".to_string());
        assert_eq!(classify(&other).kind, ProbeErrorKind::Other);
    }

    #[test]
    fn post_filter_leaves_degraded_envelopes_alone() {
        let env = SearchEnvelope::degraded(EngineUsed::IndexUnavailable);
        let out = apply_post_filter(env.clone(), |_| false);
        assert_eq!(out, env);
    }

    #[test]
    fn post_filter_recomputes_total() {
        let env = SearchEnvelope::native(vec![
            ScoredDocument {
                document: Document::new("a", json!({"tags": ["ml"]})),
                score: 0.9,
            },
            ScoredDocument {
                document: Document::new("b", json!({"tags": ["python"]})),
                score: 0.8,
            },
        ]);
        let out = apply_post_filter(env, tag_contains("tags", "python"));
        assert_eq!(out.total, 1);
        assert_eq!(out.results[0].document.key, "b");
    }
}
