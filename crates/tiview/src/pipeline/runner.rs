//! Running a built pipeline and releasing its resources.

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::coordinator::CoordinatorOptions;
use crate::core::schema::TargetTable;
use crate::core::traits::{Coordinator, JobClient, StreamEngine, TableEnvironment, TableGateway};
use crate::engine::JobExecutionResult;
use crate::error::{Result, TiviewError};
use crate::store::create_table_ddl;

use super::builder::PipelineBuilder;
use super::CATALOG_NAME;

/// Lifecycle of a [`Pipeline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Built, not yet run.
    Ready,
    Running,
    /// Resources released. Terminal.
    Closed,
}

/// Everything `build` resolves besides the live resources.
pub(super) struct PipelinePlan {
    pub query: String,
    pub default_database: String,
    pub target_table: TargetTable,
    pub quoted_target: String,
    pub drop_old_table: bool,
    pub force_new_table: bool,
}

/// A validated materialized-view pipeline.
///
/// Owns the store connection, the coordinator and the engine session
/// exclusively. [`run`](Self::run) may be called once; resources are
/// released when it returns, or by [`close`](Self::close) if it is never
/// called.
pub struct Pipeline {
    gateway: Box<dyn TableGateway>,
    coordinator: Box<dyn Coordinator>,
    table_env: Box<dyn TableEnvironment>,
    plan: PipelinePlan,
    state: PipelineState,
    run_id: String,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("run_id", &self.run_id)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Start configuring a pipeline executed by `engine`.
    pub fn builder(engine: Arc<dyn StreamEngine>) -> PipelineBuilder {
        PipelineBuilder::new(engine)
    }

    pub(super) fn new(
        gateway: Box<dyn TableGateway>,
        coordinator: Box<dyn Coordinator>,
        table_env: Box<dyn TableEnvironment>,
        plan: PipelinePlan,
    ) -> Self {
        Self {
            gateway,
            coordinator,
            table_env,
            plan,
            state: PipelineState::Ready,
            run_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Unique id of this pipeline, used in logs and run summaries.
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// The reconciled target table.
    pub fn target_table(&self) -> &TargetTable {
        &self.plan.target_table
    }

    pub fn query(&self) -> &str {
        &self.plan.query
    }

    pub fn default_database(&self) -> &str {
        &self.plan.default_database
    }

    pub fn coordinator_options(&self) -> &CoordinatorOptions {
        self.coordinator.options()
    }

    /// Whether `run` fails if the target table already exists.
    pub fn fails_if_table_exists(&self) -> bool {
        !self.plan.force_new_table
    }

    /// DDL `run` will issue for the target table.
    pub fn target_ddl(&self) -> Result<String> {
        let target = &self.plan.target_table;
        create_table_ddl(
            &target.path.database,
            &target.path.table,
            &target.columns,
            &target.column_types,
            &target.primary_key,
            !self.fails_if_table_exists(),
        )
    }

    /// Run the pipeline until its job terminates, then close it.
    ///
    /// Blocks (asynchronously) for the job's lifetime, which for a
    /// continuous query is unbounded. Any failure is returned as a
    /// [`TiviewError::Pipeline`] carrying the cause.
    pub async fn run(&mut self) -> Result<JobExecutionResult> {
        self.run_until(CancellationToken::new()).await
    }

    /// Like [`run`](Self::run), but cancels the job when `cancel` fires.
    pub async fn run_until(&mut self, cancel: CancellationToken) -> Result<JobExecutionResult> {
        if self.state != PipelineState::Ready {
            return Err(TiviewError::pipeline(format!(
                "pipeline cannot run in state {:?}",
                self.state
            )));
        }
        self.state = PipelineState::Running;
        info!("Starting pipeline run: {}", self.run_id);

        let result = self.execute(&cancel).await;
        if let Err(e) = &result {
            error!("Error running pipeline: {}", e);
        }

        self.close().await;
        result.map_err(TiviewError::wrap_pipeline)
    }

    async fn execute(&mut self, cancel: &CancellationToken) -> Result<JobExecutionResult> {
        stop_if_cancelled(cancel)?;
        self.table_env.use_catalog(CATALOG_NAME).await?;
        self.table_env
            .use_database(&self.plan.default_database)
            .await?;

        stop_if_cancelled(cancel)?;
        self.ensure_target_table().await?;

        stop_if_cancelled(cancel)?;
        info!(
            "Start coordinator with options: {:?}",
            self.coordinator.options()
        );
        self.coordinator.start().await?;

        stop_if_cancelled(cancel)?;
        info!("Execute insert into: {}", self.plan.quoted_target);
        let started = Instant::now();
        let mut job = self
            .table_env
            .execute_insert(&self.plan.query, &self.plan.quoted_target)
            .await?;
        info!("Submitted job {}", job.job_id());

        let completed = tokio::select! {
            result = job.await_completion() => Some(result),
            _ = cancel.cancelled() => None,
        };
        let result = match completed {
            Some(result) => result?,
            None => {
                warn!("Cancelling job {}", job.job_id());
                if let Err(e) = job.cancel().await {
                    warn!("Failed to cancel job {}: {}", job.job_id(), e);
                }
                return Err(TiviewError::Cancelled);
            }
        };

        info!(
            "Job {} finished with net runtime {}s (wall clock {:.1}s)",
            result.job_id,
            result.net_runtime.as_secs(),
            started.elapsed().as_secs_f64()
        );
        Ok(result)
    }

    async fn ensure_target_table(&self) -> Result<()> {
        let target = &self.plan.target_table;
        let (database, table) = (&target.path.database, &target.path.table);

        if self.plan.drop_old_table {
            self.gateway.drop_table(database, table).await?;
        }

        self.gateway
            .create_table(
                database,
                table,
                &target.columns,
                &target.column_types,
                &target.primary_key,
                self.fails_if_table_exists(),
            )
            .await
    }

    /// Release the coordinator, the engine session and the store
    /// connection, in that order. Failures are logged, not returned.
    ///
    /// Idempotent: later calls do nothing.
    pub async fn close(&mut self) {
        if self.state == PipelineState::Closed {
            return;
        }
        self.state = PipelineState::Closed;
        info!("Closing pipeline");

        if let Err(e) = self.coordinator.close().await {
            warn!("Failed to close coordinator: {}", e);
        }
        if let Err(e) = self.table_env.close().await {
            warn!("Failed to close table environment: {}", e);
        }
        if let Err(e) = self.gateway.close().await {
            warn!("Failed to close store connection: {}", e);
        }
    }
}

/// Nothing external is touched once cancellation was requested.
fn stop_if_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        warn!("Cancellation requested, not continuing the run");
        return Err(TiviewError::Cancelled);
    }
    Ok(())
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if self.state != PipelineState::Closed {
            warn!(
                "Pipeline for {} dropped without close",
                self.plan.target_table.path
            );
        }
    }
}
