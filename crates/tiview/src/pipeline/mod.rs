//! Materialized-view pipeline: a fluent [`PipelineBuilder`] that validates
//! configuration, plans the query and reconciles the target schema, and the
//! [`Pipeline`] it produces, which ensures the target table, starts the
//! coordinator and drives the continuous insert to completion.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tiview::{GatewayConfig, GatewayEngine, MysqlGateway, Pipeline};
//!
//! # async fn example() -> tiview::Result<()> {
//! let engine = Arc::new(GatewayEngine::new(GatewayConfig::default())?);
//! let gateway = MysqlGateway::connect_url("mysql://root@127.0.0.1:4000/test").await?;
//!
//! let mut pipeline = Pipeline::builder(engine)
//!     .gateway(gateway)
//!     .query("SELECT id, name, SUM(amount) AS richness FROM accounts GROUP BY id, name")
//!     .target_table("richness")
//!     .build()
//!     .await?;
//!
//! pipeline.run().await?;
//! # Ok(())
//! # }
//! ```

mod builder;
mod runner;
mod summary;

pub use builder::PipelineBuilder;
pub use runner::{Pipeline, PipelineState};
pub use summary::RunSummary;

/// Name the store catalog is registered under in the engine.
pub const CATALOG_NAME: &str = "tiview";

pub const DEFAULT_PARALLELISM: u32 = 1;
pub const DEFAULT_CHECKPOINT_INTERVAL_MS: u64 = 1000;
