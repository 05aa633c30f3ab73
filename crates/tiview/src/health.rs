//! Reachability checks for the store and the stream engine.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Config;
use crate::core::traits::TableGateway;
use crate::engine::GatewayEngine;
use crate::error::Result;
use crate::store::MysqlGateway;

/// Result of a health check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub store_connected: bool,
    pub store_latency_ms: u64,
    pub store_endpoints: Vec<String>,
    pub store_error: Option<String>,
    pub engine_connected: bool,
    pub engine_latency_ms: u64,
    pub engine_version: Option<String>,
    pub engine_error: Option<String>,
    pub healthy: bool,
}

/// Connect to the store and the SQL gateway and report on both.
///
/// Failures are reported in the result, not returned.
pub async fn health_check(config: &Config) -> HealthCheckResult {
    let started = Instant::now();
    let store = check_store(config).await;
    let store_latency_ms = started.elapsed().as_millis() as u64;

    let started = Instant::now();
    let engine = check_engine(config).await;
    let engine_latency_ms = started.elapsed().as_millis() as u64;

    let healthy = store.is_ok() && engine.is_ok();
    let (store_endpoints, store_error) = match store {
        Ok(endpoints) => (endpoints, None),
        Err(e) => (Vec::new(), Some(e.to_string())),
    };
    let (engine_version, engine_error) = match engine {
        Ok(version) => (Some(version), None),
        Err(e) => (None, Some(e.to_string())),
    };

    HealthCheckResult {
        store_connected: store_error.is_none(),
        store_latency_ms,
        store_endpoints,
        store_error,
        engine_connected: engine_error.is_none(),
        engine_latency_ms,
        engine_version,
        engine_error,
        healthy,
    }
}

async fn check_store(config: &Config) -> Result<Vec<String>> {
    let gateway = MysqlGateway::connect(&config.store).await?;
    let result = async {
        gateway.ping().await?;
        gateway.store_endpoints().await
    }
    .await;
    if let Err(e) = gateway.close().await {
        debug!("Closing health-check connection: {}", e);
    }
    result
}

async fn check_engine(config: &Config) -> Result<String> {
    GatewayEngine::new(config.engine.gateway_config())?
        .health_check()
        .await
}
