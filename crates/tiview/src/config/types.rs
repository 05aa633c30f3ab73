//! Configuration types.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

use crate::coordinator::CoordinatorOptions;
use crate::engine::{GatewayConfig, RuntimeMode};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Destination store (TiDB) connection.
    pub store: StoreConfig,

    /// Stream engine endpoints.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Query, target table and execution settings.
    pub pipeline: PipelineConfig,

    /// Coordinator options, keyed `coordinator.*`.
    #[serde(default, deserialize_with = "scalar_map")]
    pub coordinator: CoordinatorOptions,
}

/// Store (TiDB) connection configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Server host.
    pub host: String,

    /// Server port (default: 4000).
    #[serde(default = "default_tidb_port")]
    pub port: u16,

    /// Username (default: "root").
    #[serde(default = "default_root")]
    pub user: String,

    /// Password. Never serialized.
    #[serde(default, skip_serializing)]
    pub password: String,

    /// Database selected on connect; becomes the default database.
    #[serde(default)]
    pub database: Option<String>,
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("database", &self.database)
            .finish()
    }
}

/// Stream engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// SQL gateway base URL.
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,

    /// Job manager REST URL. Derived from the deployment when unset.
    #[serde(default)]
    pub rest_url: Option<String>,

    /// Remote engine cluster; a local environment is used when unset.
    #[serde(default)]
    pub remote: Option<RemoteCluster>,

    /// Poll interval for pending results and running jobs (default: 1000).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// HTTP request timeout (default: 30).
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            gateway_url: default_gateway_url(),
            rest_url: None,
            remote: None,
            poll_interval_ms: default_poll_interval_ms(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl EngineConfig {
    /// Client settings for the SQL gateway engine.
    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            gateway_url: self.gateway_url.clone(),
            rest_url: self.rest_url.clone(),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }
}

/// Address of a remote engine cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteCluster {
    pub host: String,
    pub port: u16,
}

/// Pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Query whose results are materialized.
    pub query: String,

    /// Target table, `table` or `database.table`.
    pub target_table: String,

    /// Default database; must match the store connection's when both are set.
    #[serde(default)]
    pub default_database: Option<String>,

    /// Target column names overriding the query's.
    #[serde(default)]
    pub column_names: Option<Vec<String>>,

    /// Primary key overriding the inferred one.
    #[serde(default)]
    pub primary_keys: Option<Vec<String>>,

    /// Engine parallelism (default: 1).
    #[serde(default = "default_parallelism")]
    pub parallelism: u32,

    /// Checkpoint interval (default: 1000).
    #[serde(default = "default_checkpoint_interval_ms")]
    pub checkpoint_interval_ms: u64,

    /// Drop the target table before creating it (default: false).
    #[serde(default)]
    pub drop_old_table: bool,

    /// Accept an existing target table (default: true).
    #[serde(default = "default_true")]
    pub force_new_table: bool,

    /// Engine runtime mode (default: streaming).
    #[serde(default = "default_runtime_mode")]
    pub runtime_mode: RuntimeMode,
}

/// Accept plain YAML scalars (numbers, booleans) as option values.
fn scalar_map<'de, D>(deserializer: D) -> std::result::Result<CoordinatorOptions, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let raw = Option::<std::collections::BTreeMap<String, serde_yaml::Value>>::deserialize(
        deserializer,
    )?
    .unwrap_or_default();

    raw.into_iter()
        .map(|(key, value)| {
            let value = match value {
                serde_yaml::Value::String(s) => s,
                serde_yaml::Value::Number(n) => n.to_string(),
                serde_yaml::Value::Bool(b) => b.to_string(),
                other => {
                    return Err(D::Error::custom(format!(
                        "coordinator option '{}' must be a scalar, got {:?}",
                        key, other
                    )))
                }
            };
            Ok((key, value))
        })
        .collect()
}

fn default_tidb_port() -> u16 {
    4000
}

fn default_root() -> String {
    "root".to_string()
}

fn default_gateway_url() -> String {
    "http://localhost:8083".to_string()
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_parallelism() -> u32 {
    crate::pipeline::DEFAULT_PARALLELISM
}

fn default_checkpoint_interval_ms() -> u64 {
    crate::pipeline::DEFAULT_CHECKPOINT_INTERVAL_MS
}

fn default_runtime_mode() -> RuntimeMode {
    RuntimeMode::Streaming
}

fn default_true() -> bool {
    true
}
