//! Configuration validation.

use super::Config;
use crate::core::schema::split_table_reference;
use crate::engine::RuntimeMode;
use crate::error::{Result, TiviewError};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Store validation
    if config.store.host.is_empty() {
        return Err(TiviewError::Config("store.host is required".into()));
    }
    if config.store.port == 0 {
        return Err(TiviewError::Config("store.port must be non-zero".into()));
    }
    if config.store.user.is_empty() {
        return Err(TiviewError::Config("store.user is required".into()));
    }

    // Engine validation
    let engine = &config.engine;
    let urls = [
        ("engine.gateway_url", Some(&engine.gateway_url)),
        ("engine.rest_url", engine.rest_url.as_ref()),
    ];
    for (field, url) in urls {
        if let Some(url) = url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(TiviewError::Config(format!(
                    "{} must be an http(s) URL, got '{}'",
                    field, url
                )));
            }
        }
    }
    if engine.poll_interval_ms == 0 {
        return Err(TiviewError::Config("engine.poll_interval_ms must be at least 1".into()));
    }
    if let Some(remote) = &engine.remote {
        if remote.host.is_empty() || remote.port == 0 {
            return Err(TiviewError::Config(
                "engine.remote needs a host and a non-zero port".into(),
            ));
        }
    }

    // Pipeline validation
    let pipeline = &config.pipeline;
    if pipeline.query.trim().is_empty() {
        return Err(TiviewError::Config("pipeline.query is required".into()));
    }
    split_table_reference(&pipeline.target_table)?;
    if pipeline.parallelism == 0 {
        return Err(TiviewError::Config("pipeline.parallelism must be at least 1".into()));
    }
    if pipeline.checkpoint_interval_ms == 0 {
        return Err(TiviewError::Config(
            "pipeline.checkpoint_interval_ms must be at least 1".into(),
        ));
    }
    if let Some(keys) = &pipeline.primary_keys {
        if keys.is_empty() {
            return Err(TiviewError::Config("pipeline.primary_keys can't be empty when set".into()));
        }
    }
    if pipeline.runtime_mode != RuntimeMode::Streaming {
        return Err(TiviewError::Config("pipeline.runtime_mode must be 'streaming'".into()));
    }

    // Coordinator options
    if let Some(key) = config
        .coordinator
        .keys()
        .find(|k| !k.starts_with("coordinator."))
    {
        return Err(TiviewError::Config(format!(
            "coordinator option '{}' must start with 'coordinator.'",
            key
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineConfig, PipelineConfig, RemoteCluster, StoreConfig};
    use crate::coordinator::CoordinatorOptions;

    fn valid_config() -> Config {
        Config {
            store: StoreConfig {
                host: "127.0.0.1".to_string(),
                port: 4000,
                user: "root".to_string(),
                password: "password".to_string(),
                database: Some("test".to_string()),
            },
            engine: EngineConfig::default(),
            pipeline: PipelineConfig {
                query: "SELECT id, name FROM accounts".to_string(),
                target_table: "test.richness".to_string(),
                default_database: None,
                column_names: None,
                primary_keys: None,
                parallelism: 1,
                checkpoint_interval_ms: 1000,
                drop_old_table: false,
                force_new_table: true,
                runtime_mode: RuntimeMode::Streaming,
            },
            coordinator: CoordinatorOptions::new(),
        }
    }

    #[test]
    fn test_valid_config() {
        let config = valid_config();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_missing_store_host() {
        let mut config = valid_config();
        config.store.host = "".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_empty_query() {
        let mut config = valid_config();
        config.pipeline.query = "  ".to_string();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("pipeline.query"));
    }

    #[test]
    fn test_bad_target_table() {
        let mut config = valid_config();
        config.pipeline.target_table = "a.b.c".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_parallelism() {
        let mut config = valid_config();
        config.pipeline.parallelism = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_batch_mode_rejected() {
        let mut config = valid_config();
        config.pipeline.runtime_mode = RuntimeMode::Batch;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_gateway_url_scheme() {
        let mut config = valid_config();
        config.engine.gateway_url = "localhost:8083".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_remote_cluster_needs_port() {
        let mut config = valid_config();
        config.engine.remote = Some(RemoteCluster {
            host: "jobmanager".to_string(),
            port: 0,
        });
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_coordinator_option_prefix() {
        let mut config = valid_config();
        config
            .coordinator
            .insert("port".to_string(), "5800".to_string());
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("'port'"));
    }

    #[test]
    fn test_store_config_debug_redacts_password() {
        let mut config = valid_config();
        config.store.password = "super_secret_password_123".to_string();
        let debug_output = format!("{:?}", config.store);
        assert!(
            debug_output.contains("[REDACTED]"),
            "Debug output should contain [REDACTED]"
        );
        assert!(
            !debug_output.contains("super_secret_password_123"),
            "Debug output should not contain actual password value"
        );
    }
}
