//! Configuration loader, store/embedding settings and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars
//! (`__` separates nested keys, e.g. `APP_STORE__BUCKET`).

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::Error;
use crate::types::{ClusterOptions, IndexLevel, SearchIndexSpec, DEFAULT_NAMESPACE};

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new().merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment };
        config.validate_for_env(&env_name)?;
        Ok(config)
    }

    /// Wrap an already assembled figment (used by tests and embedding callers).
    pub fn from_figment(figment: Figment) -> Self {
        Self { figment }
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    pub fn store(&self) -> anyhow::Result<StoreConfig> {
        let store: StoreConfig = self.get("store")?;
        store.validate()?;
        Ok(store)
    }

    pub fn embedding(&self) -> EmbeddingConfig {
        self.get("embedding").unwrap_or_default()
    }

    fn validate_for_env(&self, env: &str) -> anyhow::Result<()> {
        match env {
            "prod" | "production" => {
                // Production must not fall back to the hashing embedder.
                if let Ok(provider) = self.get::<String>("embedding.provider") {
                    if provider == "hash" {
                        anyhow::bail!("embedding.provider = \"hash\" is not allowed in production");
                    }
                }
            }
            "dev" | "development" | "test" | "testing" => {}
            _ => {}
        }
        Ok(())
    }
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

fn default_connection_string() -> String {
    "couchbase://localhost".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    60
}

fn default_index_poll_interval_ms() -> u64 {
    1000
}

fn default_collection_drop_settle_ms() -> u64 {
    1000
}

/// Settings of one document store: target keyspace, cluster address,
/// search index and lifecycle policy.
#[derive(Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub bucket: String,
    #[serde(default = "default_namespace")]
    pub scope: String,
    #[serde(default = "default_namespace")]
    pub collection: String,
    #[serde(default = "default_connection_string")]
    pub connection_string: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    pub search_index: SearchIndexSpec,
    /// Drop and recreate the collection and index on `create`.
    #[serde(default)]
    pub overwrite: bool,
    #[serde(default)]
    pub is_global_level_index: bool,
    /// Seconds to wait for the index after creating it. Absent or 0: don't wait.
    #[serde(default)]
    pub wait_until_index_ready: Option<f64>,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Per-request HTTP timeout. Absent: the backend's default.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    #[serde(default = "default_index_poll_interval_ms")]
    pub index_poll_interval_ms: u64,
    #[serde(default = "default_collection_drop_settle_ms")]
    pub collection_drop_settle_ms: u64,
}

impl StoreConfig {
    pub fn new(
        bucket: impl Into<String>,
        scope: impl Into<String>,
        collection: impl Into<String>,
        search_index: impl Into<SearchIndexSpec>,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            scope: scope.into(),
            collection: collection.into(),
            connection_string: default_connection_string(),
            username: None,
            password: None,
            search_index: search_index.into(),
            overwrite: false,
            is_global_level_index: false,
            wait_until_index_ready: None,
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: None,
            index_poll_interval_ms: default_index_poll_interval_ms(),
            collection_drop_settle_ms: default_collection_drop_settle_ms(),
        }
    }

    /// Rejects settings that cannot work before anything touches the network.
    pub fn validate(&self) -> Result<(), Error> {
        if self.bucket.is_empty() {
            return Err(Error::InvalidArgument("Bucket name must not be empty.".to_string()));
        }
        if self.scope.is_empty() {
            return Err(Error::InvalidArgument("Scope name must not be empty.".to_string()));
        }
        if self.collection.is_empty() {
            return Err(Error::InvalidArgument("Collection name must not be empty.".to_string()));
        }
        if self.search_index.name().is_empty() {
            return Err(Error::InvalidArgument("Search index name must not be empty.".to_string()));
        }
        if self.overwrite && self.search_index.definition().is_none() {
            return Err(Error::InvalidArgument(format!(
                "Overwriting search index '{}' requires a full index definition",
                self.search_index.name()
            )));
        }
        if let Some(secs) = self.wait_until_index_ready {
            if !secs.is_finite() || secs < 0.0 || Duration::try_from_secs_f64(secs).is_err() {
                return Err(Error::Config(format!("wait_until_index_ready must be a non-negative number of seconds, got {secs}")));
            }
        }
        if self.index_poll_interval_ms == 0 {
            return Err(Error::Config("index_poll_interval_ms must be greater than 0".to_string()));
        }
        if self.request_timeout_secs == Some(0) {
            return Err(Error::Config("request_timeout_secs must be greater than 0".to_string()));
        }
        Ok(())
    }

    pub fn index_level(&self) -> IndexLevel {
        IndexLevel::from_global_flag(self.is_global_level_index)
    }

    pub fn index_ready_timeout(&self) -> Option<Duration> {
        self.wait_until_index_ready
            .filter(|secs| *secs > 0.0)
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn index_poll_interval(&self) -> Duration {
        Duration::from_millis(self.index_poll_interval_ms)
    }

    pub fn collection_drop_settle(&self) -> Duration {
        Duration::from_millis(self.collection_drop_settle_ms)
    }

    pub fn cluster_options(&self) -> ClusterOptions {
        ClusterOptions {
            username: self.username.clone(),
            password: self.password.clone(),
            request_timeout: self.request_timeout_secs.map(Duration::from_secs),
        }
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("bucket", &self.bucket)
            .field("scope", &self.scope)
            .field("collection", &self.collection)
            .field("connection_string", &self.connection_string)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("search_index", &self.search_index.name())
            .field("overwrite", &self.overwrite)
            .field("is_global_level_index", &self.is_global_level_index)
            .field("wait_until_index_ready", &self.wait_until_index_ready)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish_non_exhaustive()
    }
}

fn default_provider() -> String {
    "hash".to_string()
}

fn default_max_retries() -> u32 {
    5
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// `hash` or `openai`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            base_url: None,
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}
