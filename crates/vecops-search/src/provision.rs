//! View/connection provisioning cache.
//!
//! One-time setup work (vector index + search view creation) is expensive
//! and must not rerun on every connect call. [`ProvisionCache`] remembers,
//! per logical resource key, whether provisioning already happened and
//! under which configuration fingerprint. The cache is an injectable
//! object rather than ambient process state, with an explicit clear API
//! for tests, and it is never the source of truth: the database decides
//! what actually exists.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::str::FromStr;
use std::sync::Mutex;

use serde::Serialize;
use tracing::{debug, info};

use vecops_core::types::{CollectionLink, FieldLink, IndexParams, ViewDefinition};
use vecops_core::{Error, Result};
use vecops_store::DocumentStore;

/// Global policy selecting when the provisioner runs, read from
/// `VECOPS_VIEW_UPDATE_POLICY`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UpdatePolicy {
    /// Run the provisioner on every call, cache state notwithstanding.
    AlwaysRecreate,
    /// Run only when no entry exists or the fingerprint changed.
    #[default]
    CheckConfig,
    /// Run at most once per key for the process lifetime, even across
    /// fingerprint changes.
    NeverRecreate,
}

impl FromStr for UpdatePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "always_recreate" => Ok(Self::AlwaysRecreate),
            "check_config" => Ok(Self::CheckConfig),
            "never_recreate" => Ok(Self::NeverRecreate),
            other => Err(Error::InvalidConfig(format!(
                "unknown view update policy '{other}'"
            ))),
        }
    }
}

impl UpdatePolicy {
    /// Policy from an optional configured value; absent means the default.
    pub fn from_config(value: Option<&str>) -> Result<Self> {
        value.map_or(Ok(Self::default()), str::parse)
    }
}

/// Equality key over a desired configuration, used to detect whether
/// re-provisioning is needed.
pub fn fingerprint<C: Serialize>(config: &C) -> Result<String> {
    let bytes = serde_json::to_vec(config)?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

#[derive(Debug, Clone)]
struct ProvisionRecord {
    provisioned: bool,
    fingerprint: String,
}

/// Process-wide provisioning memory. The mutex guards the whole
/// read-modify-write of the map; two first-time connects racing on one
/// key otherwise both decide to provision.
#[derive(Debug, Default)]
pub struct ProvisionCache {
    policy: UpdatePolicy,
    entries: Mutex<HashMap<String, ProvisionRecord>>,
}

impl ProvisionCache {
    pub fn new(policy: UpdatePolicy) -> Self {
        Self {
            policy,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> UpdatePolicy {
        self.policy
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, ProvisionRecord>>> {
        self.entries
            .lock()
            .map_err(|_| Error::Operation("provision cache lock poisoned".to_string()))
    }

    /// Run `provisioner` if the policy says the work is due, and record
    /// the result. Returns whether the provisioner ran. The record is
    /// stored only after the provisioner succeeds, so a failed attempt is
    /// retried on the next call.
    pub async fn get_or_provision<C, F, Fut>(
        &self,
        key: &str,
        desired: &C,
        provisioner: F,
    ) -> Result<bool>
    where
        C: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let fp = fingerprint(desired)?;
        let due = {
            let entries = self.lock()?;
            match self.policy {
                UpdatePolicy::AlwaysRecreate => true,
                UpdatePolicy::NeverRecreate => !entries.contains_key(key),
                UpdatePolicy::CheckConfig => entries
                    .get(key)
                    .map_or(true, |rec| !rec.provisioned || rec.fingerprint != fp),
            }
        };
        if !due {
            debug!(key, "provisioning cached, skipping");
            return Ok(false);
        }
        info!(key, "provisioning resource");
        provisioner().await?;
        self.lock()?.insert(
            key.to_string(),
            ProvisionRecord {
                provisioned: true,
                fingerprint: fp,
            },
        );
        Ok(true)
    }

    /// Forget one key; the next `get_or_provision` re-provisions it.
    pub fn clear(&self, key: &str) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }

    /// Forget everything. Used by tests to reset state between scenarios.
    pub fn clear_all(&self) -> Result<()> {
        self.lock()?.clear();
        Ok(())
    }

    pub fn is_provisioned(&self, key: &str) -> bool {
        self.lock()
            .map(|entries| entries.get(key).map(|r| r.provisioned).unwrap_or(false))
            .unwrap_or(false)
    }
}

/// Desired search setup for one collection: the index parameters plus the
/// analyzed text fields of its search view. Serializable so the whole
/// struct is the fingerprint input.
#[derive(Debug, Clone, Serialize)]
pub struct SearchSetup {
    pub collection: String,
    pub field: String,
    pub params: IndexParams,
    /// (document field, analyzers) pairs linked into the view.
    pub analyzed_fields: Vec<(String, Vec<String>)>,
}

impl SearchSetup {
    pub fn view_name(&self) -> String {
        format!("{}_search", self.collection)
    }

    fn view_definition(&self) -> ViewDefinition {
        let mut fields = BTreeMap::new();
        for (field, analyzers) in &self.analyzed_fields {
            fields.insert(
                field.clone(),
                FieldLink {
                    analyzers: analyzers.clone(),
                },
            );
        }
        let mut links = BTreeMap::new();
        links.insert(self.collection.clone(), CollectionLink { fields });
        ViewDefinition {
            name: self.view_name(),
            kind: "arangosearch".to_string(),
            links,
        }
    }
}

/// Resource key for a collection's search setup within a database.
pub fn resource_key(database: &str, collection: &str) -> String {
    format!("views-for-{database}/{collection}")
}

/// Idempotently provision the vector index and search view for one
/// collection, going through the cache so repeated connect calls skip the
/// work.
pub async fn ensure_search_ready(
    store: &dyn DocumentStore,
    cache: &ProvisionCache,
    database: &str,
    setup: &SearchSetup,
) -> Result<bool> {
    let key = resource_key(database, &setup.collection);
    cache
        .get_or_provision(&key, setup, || async {
            crate::index_repair::repair(store, &setup.collection, &setup.field, &setup.params)
                .await?;
            let view_name = setup.view_name();
            if !store.list_views().await?.contains(&view_name) {
                store.create_view(&setup.view_definition()).await?;
            }
            Ok(())
        })
        .await
}
