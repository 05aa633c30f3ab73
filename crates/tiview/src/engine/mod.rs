//! Stream engine execution settings and the SQL gateway client.
//!
//! The engine itself (planning, execution, checkpointing) is external. This
//! module holds the plain settings handed to it when an environment is
//! created, and [`gateway`] implements the engine traits against a SQL
//! gateway REST endpoint.

pub mod gateway;

pub use gateway::{GatewayConfig, GatewayEngine};

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::coordinator::CoordinatorOptions;

/// Minimum pause between two checkpoints.
pub const DEFAULT_MIN_PAUSE_BETWEEN_CHECKPOINTS: Duration = Duration::from_millis(500);

/// Maximum number of checkpoints in flight.
pub const DEFAULT_MAX_CONCURRENT_CHECKPOINTS: u32 = 1;

/// REST port of a local (embedded) engine environment.
pub const LOCAL_REST_PORT: u16 = 18083;

/// Checkpoint consistency mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckpointingMode {
    ExactlyOnce,
    AtLeastOnce,
}

impl CheckpointingMode {
    /// Engine configuration value for this mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckpointingMode::ExactlyOnce => "EXACTLY_ONCE",
            CheckpointingMode::AtLeastOnce => "AT_LEAST_ONCE",
        }
    }
}

/// Checkpointing settings of an execution environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointConfig {
    pub interval: Duration,
    pub mode: CheckpointingMode,
    pub min_pause: Duration,
    pub max_concurrent: u32,
}

/// Where the streaming job executes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Deployment {
    /// Local environment exposing its REST API on `rest_port`.
    Local { rest_port: u16 },
    /// Remote cluster reachable at `host:port`.
    Remote { host: String, port: u16 },
}

impl Default for Deployment {
    fn default() -> Self {
        Deployment::Local {
            rest_port: LOCAL_REST_PORT,
        }
    }
}

/// Streaming execution environment handed to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionEnvironment {
    pub parallelism: u32,
    pub checkpoint: Option<CheckpointConfig>,
    pub deployment: Deployment,
}

impl ExecutionEnvironment {
    pub fn new(parallelism: u32, deployment: Deployment) -> Self {
        Self {
            parallelism,
            checkpoint: None,
            deployment,
        }
    }

    /// Enable exactly-once checkpointing at `interval`, never overlapping.
    pub fn enable_checkpointing(&mut self, interval: Duration) {
        self.checkpoint = Some(CheckpointConfig {
            interval,
            mode: CheckpointingMode::ExactlyOnce,
            min_pause: DEFAULT_MIN_PAUSE_BETWEEN_CHECKPOINTS,
            max_concurrent: DEFAULT_MAX_CONCURRENT_CHECKPOINTS,
        });
    }

    /// Host of the remote cluster, if running remotely.
    pub fn remote_host(&self) -> Option<&str> {
        match &self.deployment {
            Deployment::Remote { host, .. } => Some(host),
            Deployment::Local { .. } => None,
        }
    }

    /// Engine configuration properties describing this environment.
    pub fn to_properties(&self, settings: &EnvironmentSettings) -> BTreeMap<String, String> {
        let mut props = BTreeMap::new();
        props.insert(
            "execution.runtime-mode".to_string(),
            settings.runtime_mode.as_str().to_string(),
        );
        props.insert(
            "parallelism.default".to_string(),
            self.parallelism.to_string(),
        );

        if let Some(cp) = &self.checkpoint {
            props.insert(
                "execution.checkpointing.interval".to_string(),
                format!("{}ms", cp.interval.as_millis()),
            );
            props.insert(
                "execution.checkpointing.mode".to_string(),
                cp.mode.as_str().to_string(),
            );
            props.insert(
                "execution.checkpointing.min-pause".to_string(),
                format!("{}ms", cp.min_pause.as_millis()),
            );
            props.insert(
                "execution.checkpointing.max-concurrent-checkpoints".to_string(),
                cp.max_concurrent.to_string(),
            );
        }

        match &self.deployment {
            Deployment::Local { rest_port } => {
                props.insert("rest.port".to_string(), rest_port.to_string());
            }
            Deployment::Remote { host, port } => {
                props.insert("rest.address".to_string(), host.clone());
                props.insert("rest.port".to_string(), port.to_string());
            }
        }

        props
    }
}

/// Runtime mode of the table environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeMode {
    Streaming,
    Batch,
}

impl RuntimeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuntimeMode::Streaming => "streaming",
            RuntimeMode::Batch => "batch",
        }
    }
}

/// Table environment settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentSettings {
    pub runtime_mode: RuntimeMode,
}

impl EnvironmentSettings {
    pub fn in_streaming_mode() -> Self {
        Self {
            runtime_mode: RuntimeMode::Streaming,
        }
    }

    pub fn in_batch_mode() -> Self {
        Self {
            runtime_mode: RuntimeMode::Batch,
        }
    }

    pub fn is_streaming_mode(&self) -> bool {
        self.runtime_mode == RuntimeMode::Streaming
    }
}

impl Default for EnvironmentSettings {
    fn default() -> Self {
        Self::in_streaming_mode()
    }
}

/// Catalog exposing the store's tables to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogSpec {
    /// Catalog name inside the engine.
    pub name: String,

    /// Store endpoint the catalog connects to (first known PD address).
    pub store_endpoint: String,

    /// Database used for unqualified table references.
    pub default_database: String,

    /// Coordinator options the catalog's sources and sinks need.
    pub coordinator_options: CoordinatorOptions,
}

/// Outcome of a finished streaming job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobExecutionResult {
    pub job_id: String,
    pub net_runtime: Duration,
}
