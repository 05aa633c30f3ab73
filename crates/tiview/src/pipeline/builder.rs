//! Fluent pipeline configuration and the `build` sequence.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::coordinator::{CoordinatorOptions, DefaultCoordinatorFactory, HOST_OPTION_KEY};
use crate::core::schema::{split_table_reference, TablePath, TargetTable};
use crate::core::traits::{
    Coordinator, CoordinatorFactory, StreamEngine, TableEnvironment, TableGateway,
};
use crate::engine::{CatalogSpec, Deployment, EnvironmentSettings, ExecutionEnvironment};
use crate::error::{Result, TiviewError};
use crate::reconcile::reconcile;

use super::runner::{Pipeline, PipelinePlan};
use super::{CATALOG_NAME, DEFAULT_CHECKPOINT_INTERVAL_MS, DEFAULT_PARALLELISM};

/// How the target table was specified.
#[derive(Debug, Clone)]
enum TargetRef {
    Table(String),
    Qualified { database: String, table: String },
    Path(String),
}

/// Builder for a [`Pipeline`].
///
/// Setters may be called in any order; nothing external is touched until
/// [`build`](Self::build).
pub struct PipelineBuilder {
    engine: Arc<dyn StreamEngine>,
    gateway: Option<Box<dyn TableGateway>>,
    query: Option<String>,
    default_database: Option<String>,
    target: Option<TargetRef>,
    column_names: Option<Vec<String>>,
    primary_keys: Option<Vec<String>>,
    environment_settings: Option<EnvironmentSettings>,
    parallelism: u32,
    checkpoint_interval_ms: u64,
    drop_old_table: bool,
    force_new_table: bool,
    coordinator: Option<Box<dyn Coordinator>>,
    coordinator_factory: Option<Box<dyn CoordinatorFactory>>,
    coordinator_options: CoordinatorOptions,
    deployment: Deployment,
}

impl PipelineBuilder {
    pub fn new(engine: Arc<dyn StreamEngine>) -> Self {
        Self {
            engine,
            gateway: None,
            query: None,
            default_database: None,
            target: None,
            column_names: None,
            primary_keys: None,
            environment_settings: None,
            parallelism: DEFAULT_PARALLELISM,
            checkpoint_interval_ms: DEFAULT_CHECKPOINT_INTERVAL_MS,
            drop_old_table: false,
            force_new_table: true,
            coordinator: None,
            coordinator_factory: None,
            coordinator_options: CoordinatorOptions::new(),
            deployment: Deployment::default(),
        }
    }

    /// Store connection the pipeline takes ownership of.
    #[must_use]
    pub fn gateway(mut self, gateway: impl TableGateway + 'static) -> Self {
        self.gateway = Some(Box::new(gateway));
        self
    }

    /// Query whose results are materialized.
    #[must_use]
    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Database the catalog is scoped to. Must agree with the connection's
    /// database when the connection has one.
    #[must_use]
    pub fn default_database(mut self, database: impl Into<String>) -> Self {
        self.default_database = Some(database.into());
        self
    }

    /// Target table in the default database.
    #[must_use]
    pub fn target_table(mut self, table: impl Into<String>) -> Self {
        self.target = Some(TargetRef::Table(table.into()));
        self
    }

    #[must_use]
    pub fn target_table_in(
        mut self,
        database: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        self.target = Some(TargetRef::Qualified {
            database: database.into(),
            table: table.into(),
        });
        self
    }

    /// Target given as `table` or `database.table`.
    #[must_use]
    pub fn target_path(mut self, reference: impl Into<String>) -> Self {
        self.target = Some(TargetRef::Path(reference.into()));
        self
    }

    /// Rename the query's output columns in the target table.
    #[must_use]
    pub fn column_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.column_names = Some(names.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn primary_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_keys = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn environment_settings(mut self, settings: EnvironmentSettings) -> Self {
        self.environment_settings = Some(settings);
        self
    }

    #[must_use]
    pub fn parallelism(mut self, parallelism: u32) -> Self {
        self.parallelism = parallelism;
        self
    }

    #[must_use]
    pub fn checkpoint_interval_ms(mut self, interval_ms: u64) -> Self {
        self.checkpoint_interval_ms = interval_ms;
        self
    }

    /// Drop the target table before creating it.
    #[must_use]
    pub fn drop_old_table(mut self, drop: bool) -> Self {
        self.drop_old_table = drop;
        self
    }

    /// When false, an existing target table is a schema conflict.
    #[must_use]
    pub fn force_new_table(mut self, force: bool) -> Self {
        self.force_new_table = force;
        self
    }

    /// Use this coordinator instead of building one.
    #[must_use]
    pub fn coordinator(mut self, coordinator: impl Coordinator + 'static) -> Self {
        self.coordinator = Some(Box::new(coordinator));
        self
    }

    /// Factory for the coordinator when none is given explicitly.
    #[must_use]
    pub fn coordinator_factory(mut self, factory: impl CoordinatorFactory + 'static) -> Self {
        self.coordinator_factory = Some(Box::new(factory));
        self
    }

    /// Options passed to the coordinator factory.
    #[must_use]
    pub fn coordinator_options(mut self, options: CoordinatorOptions) -> Self {
        self.coordinator_options = options;
        self
    }

    /// Run on a remote engine cluster instead of a local environment.
    #[must_use]
    pub fn remote_cluster(mut self, host: impl Into<String>, port: u16) -> Self {
        self.deployment = Deployment::Remote {
            host: host.into(),
            port,
        };
        self
    }

    /// Validate the configuration, plan the query and reconcile the target
    /// schema.
    ///
    /// On failure every resource held so far (the table environment, the
    /// coordinator and the store connection) is closed before the error is
    /// returned.
    pub async fn build(mut self) -> Result<Pipeline> {
        let gateway = self.gateway.take().ok_or_else(|| {
            TiviewError::Config("a store connection must be specified".to_string())
        })?;

        let mut held = Held {
            gateway,
            coordinator: self.coordinator.take(),
            table_env: None,
        };

        let plan = match self.assemble(&mut held).await {
            Ok(plan) => plan,
            Err(e) => {
                error!("Failed to build pipeline: {}", e);
                held.release().await;
                return Err(e);
            }
        };

        match (held.coordinator.take(), held.table_env.take()) {
            (Some(coordinator), Some(table_env)) => {
                Ok(Pipeline::new(held.gateway, coordinator, table_env, plan))
            }
            (coordinator, table_env) => {
                held.coordinator = coordinator;
                held.table_env = table_env;
                held.release().await;
                Err(TiviewError::pipeline("pipeline resources were not initialized"))
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.query.as_deref().map_or(true, |q| q.trim().is_empty()) {
            return Err(TiviewError::Config("a query must be specified".to_string()));
        }
        if self.target.is_none() {
            return Err(TiviewError::Config("a target table must be specified".to_string()));
        }
        if self.parallelism == 0 {
            return Err(TiviewError::Config("parallelism must be at least 1".to_string()));
        }
        if self.checkpoint_interval_ms == 0 {
            return Err(TiviewError::Config("checkpoint interval must be at least 1ms".to_string()));
        }
        Ok(())
    }

    fn resolve_target(&self, default_database: &str) -> Result<TablePath> {
        let (database, table) = match &self.target {
            Some(TargetRef::Table(table)) => (None, table.clone()),
            Some(TargetRef::Qualified { database, table }) => {
                (Some(database.clone()), table.clone())
            }
            Some(TargetRef::Path(reference)) => split_table_reference(reference)?,
            None => {
                return Err(TiviewError::Config("a target table must be specified".to_string()))
            }
        };
        Ok(TablePath::new(
            database.unwrap_or_else(|| default_database.to_string()),
            table,
        ))
    }

    /// Keep a received coordinator, else build one from the factory with
    /// the user options plus those implied by the environment.
    fn resolve_coordinator(
        &mut self,
        env: &ExecutionEnvironment,
        held: &mut Held,
    ) -> Result<CoordinatorOptions> {
        if let Some(coordinator) = &held.coordinator {
            if !self.coordinator_options.is_empty() {
                warn!("Coordinator options are ignored when a coordinator is supplied");
            }
            return Ok(coordinator.options().clone());
        }

        let mut options = std::mem::take(&mut self.coordinator_options);
        if let Some(host) = env.remote_host() {
            options.insert(HOST_OPTION_KEY.to_string(), host.to_string());
        }

        let coordinator = match &self.coordinator_factory {
            Some(factory) => factory.create(options)?,
            None => DefaultCoordinatorFactory.create(options)?,
        };
        let options = coordinator.options().clone();
        held.coordinator = Some(coordinator);
        Ok(options)
    }

    async fn assemble(&mut self, held: &mut Held) -> Result<PipelinePlan> {
        self.validate()?;

        // Default database: explicit, else the connection's; both must agree.
        let connection_db = held.gateway.default_database().await?;
        let default_database = match (self.default_database.take(), connection_db) {
            (Some(explicit), Some(conn)) if explicit != conn => {
                return Err(TiviewError::Config(format!(
                    "Default database mismatched: configured '{}' but the connection uses '{}'",
                    explicit, conn
                )));
            }
            (Some(explicit), _) => explicit,
            (None, Some(conn)) => conn,
            (None, None) => {
                return Err(TiviewError::Config(
                    "default database must be specified either by the connection or explicitly"
                        .to_string(),
                ));
            }
        };

        let target = self.resolve_target(&default_database)?;
        let quoted_target = held.gateway.quoted_path(&target.database, &target.table)?;

        let endpoints = held.gateway.store_endpoints().await?;
        let store_endpoint = endpoints.into_iter().next().ok_or_else(|| {
            TiviewError::Store("store reported no endpoints".to_string())
        })?;
        debug!("Using store endpoint {}", store_endpoint);

        let mut env = ExecutionEnvironment::new(self.parallelism, self.deployment.clone());
        env.enable_checkpointing(Duration::from_millis(self.checkpoint_interval_ms));

        let settings = self.environment_settings.take().unwrap_or_default();
        if !settings.is_streaming_mode() {
            return Err(TiviewError::Config(
                "environment settings must be in streaming mode".to_string(),
            ));
        }

        let coordinator_options = self.resolve_coordinator(&env, held)?;

        let table_env = held
            .table_env
            .insert(self.engine.create_environment(&env, &settings).await?);
        table_env
            .register_catalog(&CatalogSpec {
                name: CATALOG_NAME.to_string(),
                store_endpoint,
                default_database: default_database.clone(),
                coordinator_options,
            })
            .await?;
        table_env.use_catalog(CATALOG_NAME).await?;

        let query = self.query.take().unwrap_or_default();
        let schema = table_env.plan(&query).await?;
        debug!("Query planned to {} columns", schema.len());

        let reconciled = reconcile(
            &schema,
            self.column_names.as_deref(),
            self.primary_keys.as_deref(),
        )?;

        let target_table = TargetTable {
            path: target,
            columns: reconciled.column_names,
            column_types: reconciled.column_types,
            primary_key: reconciled.primary_keys,
        };

        info!(
            "Pipeline built: target {} columns {:?} primary key {:?}",
            target_table.path, target_table.columns, target_table.primary_key
        );

        Ok(PipelinePlan {
            query,
            default_database,
            target_table,
            quoted_target,
            drop_old_table: self.drop_old_table,
            force_new_table: self.force_new_table,
        })
    }
}

/// Resources opened or received while building.
struct Held {
    gateway: Box<dyn TableGateway>,
    coordinator: Option<Box<dyn Coordinator>>,
    table_env: Option<Box<dyn TableEnvironment>>,
}

impl Held {
    async fn release(mut self) {
        if let Some(mut env) = self.table_env.take() {
            if let Err(e) = env.close().await {
                warn!("Failed to close table environment: {}", e);
            }
        }
        if let Some(mut coordinator) = self.coordinator.take() {
            if let Err(e) = coordinator.close().await {
                warn!("Failed to close coordinator: {}", e);
            }
        }
        if let Err(e) = self.gateway.close().await {
            warn!("Failed to close store connection: {}", e);
        }
    }
}
