//! Traits at the seams between the orchestrator and its external systems.
//!
//! - [`TableGateway`]: DDL against the destination relational store
//! - [`Coordinator`] / [`CoordinatorFactory`]: the consistency coordinator
//! - [`StreamEngine`] / [`TableEnvironment`] / [`JobClient`]: the streaming
//!   SQL engine that plans the query and runs the continuous insert
//!
//! The pipeline only ever talks to these traits, so every one of them can be
//! replaced with an in-memory double in tests.

use async_trait::async_trait;

use crate::coordinator::CoordinatorOptions;
use crate::engine::{CatalogSpec, EnvironmentSettings, ExecutionEnvironment, JobExecutionResult};
use crate::error::Result;

use super::schema::{DataType, ResolvedSchema};

/// Table operations against the destination store.
///
/// Every call is a single round trip; nothing is retried.
#[async_trait]
pub trait TableGateway: Send + Sync {
    /// Database selected by the connection, if any.
    async fn default_database(&self) -> Result<Option<String>>;

    /// Placement/metadata endpoints of the store cluster, in order.
    ///
    /// Never empty on success.
    async fn store_endpoints(&self) -> Result<Vec<String>>;

    /// Check if a table exists.
    async fn table_exists(&self, database: &str, table: &str) -> Result<bool>;

    /// Drop a table. A missing table is not an error.
    async fn drop_table(&self, database: &str, table: &str) -> Result<()>;

    /// Create a table from an ordered column list and a primary key.
    ///
    /// With `fail_if_exists`, an existing table is a schema conflict whatever
    /// its shape; otherwise an existing table is left untouched.
    async fn create_table(
        &self,
        database: &str,
        table: &str,
        column_names: &[String],
        column_types: &[DataType],
        primary_keys: &[String],
        fail_if_exists: bool,
    ) -> Result<()>;

    /// Quoted `database.table` path for embedding in statements.
    fn quoted_path(&self, database: &str, table: &str) -> Result<String>;

    /// Release the connection. Idempotent.
    async fn close(&self) -> Result<()>;
}

/// External consistency coordinator.
#[async_trait]
pub trait Coordinator: Send {
    /// Start the coordinator.
    async fn start(&mut self) -> Result<()>;

    /// Stop the coordinator. Idempotent, safe before `start`.
    async fn close(&mut self) -> Result<()>;

    /// Options this coordinator was created with.
    fn options(&self) -> &CoordinatorOptions;
}

/// Builds a coordinator from options.
pub trait CoordinatorFactory: Send + Sync {
    fn create(&self, options: CoordinatorOptions) -> Result<Box<dyn Coordinator>>;
}

/// Entry point into the streaming SQL engine.
#[async_trait]
pub trait StreamEngine: Send + Sync {
    /// Create a table environment running with the given settings.
    async fn create_environment(
        &self,
        env: &ExecutionEnvironment,
        settings: &EnvironmentSettings,
    ) -> Result<Box<dyn TableEnvironment>>;
}

/// A session in the engine in which catalogs are registered, queries planned
/// and continuous inserts submitted.
#[async_trait]
pub trait TableEnvironment: Send {
    /// Register a catalog bridging the store's metadata.
    async fn register_catalog(&mut self, catalog: &CatalogSpec) -> Result<()>;

    /// Make a registered catalog current.
    async fn use_catalog(&mut self, name: &str) -> Result<()>;

    /// Make a database of the current catalog current.
    async fn use_database(&mut self, database: &str) -> Result<()>;

    /// Plan a query and return its output schema.
    ///
    /// Fails with `TiviewError::Query` on invalid SQL or unresolvable names.
    async fn plan(&mut self, query: &str) -> Result<ResolvedSchema>;

    /// Submit `query` as a continuous insert into `target_path`.
    async fn execute_insert(&mut self, query: &str, target_path: &str)
        -> Result<Box<dyn JobClient>>;

    /// Release the session. Idempotent.
    async fn close(&mut self) -> Result<()>;
}

/// Handle to a submitted streaming job.
#[async_trait]
pub trait JobClient: Send {
    /// Engine-assigned job id.
    fn job_id(&self) -> &str;

    /// Wait until the job terminates.
    ///
    /// A failed or cancelled job is an error.
    async fn await_completion(&mut self) -> Result<JobExecutionResult>;

    /// Request cancellation of the job.
    async fn cancel(&mut self) -> Result<()>;
}
