//! Configuration loader.
//!
//! Uses Figment to merge `vecops.toml` + `vecops.<env>.toml` + `VECOPS_*`
//! env vars. Typed accessors cover the database endpoint, the canonical
//! embedding pair, and the view update policy.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;
use std::env;

use crate::types::CanonicalEmbedding;

/// Env var selecting the global view update policy.
pub const VIEW_UPDATE_POLICY_VAR: &str = "VECOPS_VIEW_UPDATE_POLICY";

/// Connection settings for the external database.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub database: String,
}

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new().merge(Toml::file("vecops.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("vecops.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("vecops.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("vecops.test.toml")),
            _ => {}
        }
        // VECOPS_DB__URL maps to db.url; single-underscore vars stay flat.
        figment = figment.merge(Env::prefixed("VECOPS_").split("__"));

        Ok(Self { figment })
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    pub fn database(&self) -> anyhow::Result<DatabaseConfig> {
        self.get("db")
    }

    pub fn canonical_embedding(&self) -> anyhow::Result<CanonicalEmbedding> {
        let model: String = self.get("embedding.model")?;
        let dim: usize = self.get("embedding.dim")?;
        let canonical = CanonicalEmbedding::new(model, dim);
        canonical.validate()?;
        Ok(canonical)
    }

    /// Raw policy string; parsing lives with the provisioning cache.
    /// Missing value means the default policy (`check_config`).
    pub fn view_update_policy(&self) -> Option<String> {
        self.get("view_update_policy").ok()
    }
}
