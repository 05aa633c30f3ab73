//! # tiview
//!
//! Continuous materialized views over TiDB.
//!
//! This library turns a declarative query into a continuously running
//! pipeline that keeps a TiDB table up to date with exactly-once
//! checkpointing:
//!
//! - **Schema reconciliation** of the query's output against column-name
//!   and primary-key overrides
//! - **Target table provisioning** over the MySQL protocol
//! - **Coordinator lifecycle** for snapshot-consistent reads
//! - **Job submission** to a SQL gateway and waiting for completion
//! - **Deterministic cleanup** of every held resource on every exit path
//!
//! ## Example
//!
//! ```rust,no_run
//! use tiview::Config;
//!
//! #[tokio::main]
//! async fn main() -> tiview::Result<()> {
//!     let config = Config::load("tiview.yaml")?;
//!     let mut pipeline = config.into_builder().await?.build().await?;
//!     let result = pipeline.run().await?;
//!     println!("Job {} ran for {:?}", result.job_id, result.net_runtime);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod coordinator;
pub mod core;
pub mod engine;
pub mod error;
pub mod health;
pub mod pipeline;
pub mod reconcile;
pub mod store;

// Re-exports for convenient access
pub use config::{Config, EngineConfig, PipelineConfig, StoreConfig};
pub use coordinator::{CoordinatorOptions, DefaultCoordinatorFactory, ProcessCoordinator};
pub use core::{
    Column, Coordinator, CoordinatorFactory, DataType, JobClient, ResolvedSchema, StreamEngine,
    TableEnvironment, TableGateway, TablePath, TargetTable, TypeKind,
};
pub use engine::{
    CatalogSpec, EnvironmentSettings, ExecutionEnvironment, GatewayConfig, GatewayEngine,
    JobExecutionResult,
};
pub use error::{Result, TiviewError};
pub use health::{health_check, HealthCheckResult};
pub use pipeline::{Pipeline, PipelineBuilder, PipelineState, RunSummary};
pub use reconcile::ReconciledSchema;
pub use store::MysqlGateway;
