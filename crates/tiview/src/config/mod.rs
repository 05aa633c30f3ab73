//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use std::path::Path;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::engine::{EnvironmentSettings, GatewayEngine, RuntimeMode};
use crate::error::Result;
use crate::pipeline::PipelineBuilder;
use crate::store::MysqlGateway;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// Compute a SHA256 hash of the configuration to identify runs.
    ///
    /// The store password is not part of the hash.
    pub fn hash(&self) -> String {
        let yaml = serde_yaml::to_string(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(yaml.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Connect to the store and return a builder wired to the SQL gateway
    /// engine with every configured setting applied.
    pub async fn into_builder(self) -> Result<PipelineBuilder> {
        let engine = Arc::new(GatewayEngine::new(self.engine.gateway_config())?);
        let gateway = MysqlGateway::connect(&self.store).await?;
        debug!("Store gateway ready at {}", gateway.endpoint());

        let pipeline = self.pipeline;
        let settings = match pipeline.runtime_mode {
            RuntimeMode::Streaming => EnvironmentSettings::in_streaming_mode(),
            RuntimeMode::Batch => EnvironmentSettings::in_batch_mode(),
        };

        let mut builder = PipelineBuilder::new(engine)
            .gateway(gateway)
            .query(pipeline.query)
            .target_path(pipeline.target_table)
            .parallelism(pipeline.parallelism)
            .checkpoint_interval_ms(pipeline.checkpoint_interval_ms)
            .drop_old_table(pipeline.drop_old_table)
            .force_new_table(pipeline.force_new_table)
            .environment_settings(settings)
            .coordinator_options(self.coordinator);

        if let Some(database) = pipeline.default_database {
            builder = builder.default_database(database);
        }
        if let Some(names) = pipeline.column_names {
            builder = builder.column_names(names);
        }
        if let Some(keys) = pipeline.primary_keys {
            builder = builder.primary_keys(keys);
        }
        if let Some(remote) = self.engine.remote {
            builder = builder.remote_cluster(remote.host, remote.port);
        }

        Ok(builder)
    }
}
