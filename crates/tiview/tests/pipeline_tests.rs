//! Pipeline build and run behavior against in-memory doubles.
//!
//! Every double appends to one shared call log so tests can assert on which
//! external calls happened and in what order.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use tiview::coordinator::HOST_OPTION_KEY;
use tiview::core::identifier::qualify;
use tiview::core::schema::MAX_VARCHAR_LENGTH;
use tiview::engine::Deployment;
use tiview::{
    CatalogSpec, Column, Coordinator, CoordinatorFactory, CoordinatorOptions, DataType,
    EnvironmentSettings, ExecutionEnvironment, JobClient, JobExecutionResult, Pipeline,
    PipelineBuilder, PipelineState, ResolvedSchema, Result, StreamEngine, TableEnvironment,
    TableGateway, TiviewError, TypeKind,
};

// =============================================================================
// Test doubles
// =============================================================================

#[derive(Clone, Default)]
struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    fn record(&self, call: impl Into<String>) {
        self.0.lock().unwrap().push(call.into());
    }

    fn calls(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    fn position(&self, prefix: &str) -> usize {
        self.calls()
            .iter()
            .position(|c| c.starts_with(prefix))
            .unwrap_or_else(|| panic!("no call starting with '{prefix}' in {:?}", self.calls()))
    }
}

struct FakeGateway {
    log: CallLog,
    default_database: Option<String>,
    existing: Mutex<HashSet<String>>,
}

impl FakeGateway {
    fn new(log: &CallLog, default_database: Option<&str>) -> Self {
        Self {
            log: log.clone(),
            default_database: default_database.map(str::to_string),
            existing: Mutex::new(HashSet::new()),
        }
    }

    fn with_table(self, database: &str, table: &str) -> Self {
        self.existing
            .lock()
            .unwrap()
            .insert(format!("{database}.{table}"));
        self
    }
}

#[async_trait]
impl TableGateway for FakeGateway {
    async fn default_database(&self) -> Result<Option<String>> {
        self.log.record("gateway.default_database");
        Ok(self.default_database.clone())
    }

    async fn store_endpoints(&self) -> Result<Vec<String>> {
        self.log.record("gateway.store_endpoints");
        Ok(vec!["pd0:2379".to_string(), "pd1:2379".to_string()])
    }

    async fn table_exists(&self, database: &str, table: &str) -> Result<bool> {
        Ok(self
            .existing
            .lock()
            .unwrap()
            .contains(&format!("{database}.{table}")))
    }

    async fn drop_table(&self, database: &str, table: &str) -> Result<()> {
        self.log.record(format!("gateway.drop_table {database}.{table}"));
        self.existing
            .lock()
            .unwrap()
            .remove(&format!("{database}.{table}"));
        Ok(())
    }

    async fn create_table(
        &self,
        database: &str,
        table: &str,
        column_names: &[String],
        column_types: &[DataType],
        primary_keys: &[String],
        fail_if_exists: bool,
    ) -> Result<()> {
        self.log.record(format!(
            "gateway.create_table {database}.{table} columns={} types={} pk={} fail_if_exists={fail_if_exists}",
            column_names.join(","),
            column_types.len(),
            primary_keys.join(","),
        ));
        let path = format!("{database}.{table}");
        let mut existing = self.existing.lock().unwrap();
        if fail_if_exists && existing.contains(&path) {
            return Err(TiviewError::schema_conflict(path, "table already exists"));
        }
        existing.insert(path);
        Ok(())
    }

    fn quoted_path(&self, database: &str, table: &str) -> Result<String> {
        qualify(database, table)
    }

    async fn close(&self) -> Result<()> {
        self.log.record("gateway.close");
        Ok(())
    }
}

struct FakeCoordinator {
    log: CallLog,
    options: CoordinatorOptions,
    fail_start: bool,
}

#[async_trait]
impl Coordinator for FakeCoordinator {
    async fn start(&mut self) -> Result<()> {
        self.log.record("coordinator.start");
        if self.fail_start {
            return Err(TiviewError::Coordinator("address already in use".into()));
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.log.record("coordinator.close");
        Ok(())
    }

    fn options(&self) -> &CoordinatorOptions {
        &self.options
    }
}

/// Requests cancellation while it starts, like a signal arriving mid-run.
struct CancellingCoordinator {
    log: CallLog,
    options: CoordinatorOptions,
    cancel: CancellationToken,
}

#[async_trait]
impl Coordinator for CancellingCoordinator {
    async fn start(&mut self) -> Result<()> {
        self.log.record("coordinator.start");
        self.cancel.cancel();
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.log.record("coordinator.close");
        Ok(())
    }

    fn options(&self) -> &CoordinatorOptions {
        &self.options
    }
}

struct FakeFactory {
    log: CallLog,
    fail_start: bool,
    received: Arc<Mutex<Option<CoordinatorOptions>>>,
}

impl CoordinatorFactory for FakeFactory {
    fn create(&self, options: CoordinatorOptions) -> Result<Box<dyn Coordinator>> {
        self.log.record("coordinator.create");
        *self.received.lock().unwrap() = Some(options.clone());
        Ok(Box::new(FakeCoordinator {
            log: self.log.clone(),
            options,
            fail_start: self.fail_start,
        }))
    }
}

#[derive(Clone, Copy)]
enum JobBehavior {
    Finish,
    Fail,
    Hang,
}

struct FakeEngine {
    log: CallLog,
    schema: Option<ResolvedSchema>,
    job: JobBehavior,
    environment: Arc<Mutex<Option<ExecutionEnvironment>>>,
}

#[async_trait]
impl StreamEngine for FakeEngine {
    async fn create_environment(
        &self,
        env: &ExecutionEnvironment,
        _settings: &EnvironmentSettings,
    ) -> Result<Box<dyn TableEnvironment>> {
        self.log.record("engine.create_environment");
        *self.environment.lock().unwrap() = Some(env.clone());
        Ok(Box::new(FakeTableEnv {
            log: self.log.clone(),
            schema: self.schema.clone(),
            job: self.job,
        }))
    }
}

struct FakeTableEnv {
    log: CallLog,
    schema: Option<ResolvedSchema>,
    job: JobBehavior,
}

#[async_trait]
impl TableEnvironment for FakeTableEnv {
    async fn register_catalog(&mut self, catalog: &CatalogSpec) -> Result<()> {
        self.log.record(format!(
            "env.register_catalog {} endpoint={} database={}",
            catalog.name, catalog.store_endpoint, catalog.default_database
        ));
        Ok(())
    }

    async fn use_catalog(&mut self, name: &str) -> Result<()> {
        self.log.record(format!("env.use_catalog {name}"));
        Ok(())
    }

    async fn use_database(&mut self, database: &str) -> Result<()> {
        self.log.record(format!("env.use_database {database}"));
        Ok(())
    }

    async fn plan(&mut self, _query: &str) -> Result<ResolvedSchema> {
        self.log.record("env.plan");
        self.schema
            .clone()
            .ok_or_else(|| TiviewError::Query("Object 'missing' not found".into()))
    }

    async fn execute_insert(
        &mut self,
        _query: &str,
        target_path: &str,
    ) -> Result<Box<dyn JobClient>> {
        self.log.record(format!("env.execute_insert {target_path}"));
        Ok(Box::new(FakeJob {
            log: self.log.clone(),
            behavior: self.job,
        }))
    }

    async fn close(&mut self) -> Result<()> {
        self.log.record("env.close");
        Ok(())
    }
}

struct FakeJob {
    log: CallLog,
    behavior: JobBehavior,
}

#[async_trait]
impl JobClient for FakeJob {
    fn job_id(&self) -> &str {
        "job-1"
    }

    async fn await_completion(&mut self) -> Result<JobExecutionResult> {
        self.log.record("job.await_completion");
        match self.behavior {
            JobBehavior::Finish => Ok(JobExecutionResult {
                job_id: "job-1".to_string(),
                net_runtime: Duration::from_secs(3),
            }),
            JobBehavior::Fail => Err(TiviewError::pipeline("job job-1 failed: boom")),
            JobBehavior::Hang => std::future::pending().await,
        }
    }

    async fn cancel(&mut self) -> Result<()> {
        self.log.record("job.cancel");
        Ok(())
    }
}

// =============================================================================
// Fixtures
// =============================================================================

fn richness_schema() -> ResolvedSchema {
    ResolvedSchema::new(vec![
        Column::new("id", DataType::not_null(TypeKind::Int)),
        Column::new("name", DataType::nullable(TypeKind::Varchar(MAX_VARCHAR_LENGTH))),
        Column::new(
            "richness",
            DataType::nullable(TypeKind::Decimal {
                precision: 38,
                scale: 6,
            }),
        ),
    ])
}

struct Harness {
    log: CallLog,
    environment: Arc<Mutex<Option<ExecutionEnvironment>>>,
    factory_options: Arc<Mutex<Option<CoordinatorOptions>>>,
    engine: Arc<FakeEngine>,
}

impl Harness {
    fn new(schema: Option<ResolvedSchema>, job: JobBehavior) -> Self {
        let log = CallLog::default();
        let environment = Arc::new(Mutex::new(None));
        let engine = Arc::new(FakeEngine {
            log: log.clone(),
            schema,
            job,
            environment: environment.clone(),
        });
        Self {
            log,
            environment,
            factory_options: Arc::new(Mutex::new(None)),
            engine,
        }
    }

    fn richness() -> Self {
        Self::new(Some(richness_schema()), JobBehavior::Finish)
    }

    fn factory(&self, fail_start: bool) -> FakeFactory {
        FakeFactory {
            log: self.log.clone(),
            fail_start,
            received: self.factory_options.clone(),
        }
    }

    /// Builder with a connection on database `test`, query and target set.
    fn builder(&self) -> PipelineBuilder {
        self.builder_with(FakeGateway::new(&self.log, Some("test")))
    }

    fn builder_with(&self, gateway: FakeGateway) -> PipelineBuilder {
        Pipeline::builder(self.engine.clone())
            .gateway(gateway)
            .query("SELECT id, name, SUM(amount) AS richness FROM accounts GROUP BY id, name")
            .target_table("richness")
            .coordinator_factory(self.factory(false))
    }
}

fn names(cols: &[&str]) -> Vec<String> {
    cols.iter().map(|c| c.to_string()).collect()
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn test_default_key_and_target_from_connection_database() {
    let h = Harness::richness();
    let mut pipeline = h.builder().build().await.unwrap();

    let target = pipeline.target_table();
    assert_eq!(target.path.to_string(), "test.richness");
    assert_eq!(target.columns, names(&["id", "name", "richness"]));
    assert_eq!(target.primary_key, names(&["id"]));
    assert_eq!(pipeline.default_database(), "test");

    let result = pipeline.run().await.unwrap();
    assert_eq!(result.job_id, "job-1");
    assert_eq!(result.net_runtime, Duration::from_secs(3));

    assert_eq!(h.log.count("gateway.drop_table"), 0);
    assert!(h.log.calls().contains(
        &"gateway.create_table test.richness columns=id,name,richness types=3 pk=id fail_if_exists=false"
            .to_string()
    ));
    assert!(h
        .log
        .calls()
        .contains(&"env.execute_insert `test`.`richness`".to_string()));
    assert_eq!(pipeline.state(), PipelineState::Closed);
}

#[tokio::test]
async fn test_drop_then_create_existing_table() {
    let h = Harness::richness();
    let gateway = FakeGateway::new(&h.log, Some("test")).with_table("test", "richness");
    let mut pipeline = h
        .builder_with(gateway)
        .drop_old_table(true)
        .force_new_table(true)
        .build()
        .await
        .unwrap();

    pipeline.run().await.unwrap();

    assert_eq!(h.log.count("gateway.drop_table test.richness"), 1);
    assert_eq!(h.log.count("gateway.create_table test.richness"), 1);
    assert!(h.log.position("gateway.drop_table") < h.log.position("gateway.create_table"));
    assert!(h.log.calls()[h.log.position("gateway.create_table")]
        .ends_with("fail_if_exists=false"));
}

#[tokio::test]
async fn test_column_override_length_mismatch_fails_build() {
    let h = Harness::richness();
    let err = h
        .builder()
        .column_names(["a", "b"])
        .build()
        .await
        .unwrap_err();

    assert!(matches!(err, TiviewError::Config(_)));
    assert!(err.to_string().contains("Mismatched size of column names"));

    assert_eq!(h.log.count("gateway.create_table"), 0);
    assert_eq!(h.log.count("gateway.drop_table"), 0);
    assert_eq!(h.log.count("coordinator.start"), 0);
    assert_eq!(h.log.count("gateway.close"), 1);
}

#[tokio::test]
async fn test_coordinator_start_failure_still_closes_connection() {
    let h = Harness::richness();
    let mut pipeline = h
        .builder()
        .coordinator_factory(h.factory(true))
        .build()
        .await
        .unwrap();

    let err = pipeline.run().await.unwrap_err();

    assert!(matches!(err, TiviewError::Pipeline { .. }));
    assert!(matches!(err.root_cause(), TiviewError::Coordinator(_)));
    assert_eq!(h.log.count("gateway.close"), 1);
    assert_eq!(h.log.count("coordinator.close"), 1);
    assert_eq!(h.log.count("env.execute_insert"), 0);
}

// =============================================================================
// Ordering and cleanup
// =============================================================================

#[tokio::test]
async fn test_table_then_coordinator_then_job() {
    let h = Harness::richness();
    let mut pipeline = h.builder().build().await.unwrap();
    pipeline.run().await.unwrap();

    let create = h.log.position("gateway.create_table");
    let start = h.log.position("coordinator.start");
    let insert = h.log.position("env.execute_insert");
    assert!(create < start, "{:?}", h.log.calls());
    assert!(start < insert, "{:?}", h.log.calls());

    // Context is selected before anything is written.
    assert!(h.log.position("env.use_database test") < create);

    // Cleanup order: coordinator, engine session, connection.
    let closes: Vec<String> = h
        .log
        .calls()
        .into_iter()
        .filter(|c| c.ends_with(".close"))
        .collect();
    assert_eq!(closes, names(&["coordinator.close", "env.close", "gateway.close"]));
}

#[tokio::test]
async fn test_close_twice_on_unrun_pipeline() {
    let h = Harness::richness();
    let mut pipeline = h.builder().build().await.unwrap();

    pipeline.close().await;
    let after_first = h.log.calls().len();
    pipeline.close().await;

    assert_eq!(h.log.calls().len(), after_first);
    assert_eq!(h.log.count("gateway.close"), 1);
    assert_eq!(h.log.count("coordinator.close"), 1);
    assert_eq!(pipeline.state(), PipelineState::Closed);
}

#[tokio::test]
async fn test_close_after_run_is_noop() {
    let h = Harness::richness();
    let mut pipeline = h.builder().build().await.unwrap();
    pipeline.run().await.unwrap();

    let after_run = h.log.calls().len();
    pipeline.close().await;
    assert_eq!(h.log.calls().len(), after_run);
}

#[tokio::test]
async fn test_run_twice_fails() {
    let h = Harness::richness();
    let mut pipeline = h.builder().build().await.unwrap();
    pipeline.run().await.unwrap();

    let err = pipeline.run().await.unwrap_err();
    assert!(matches!(err, TiviewError::Pipeline { .. }));
    assert_eq!(h.log.count("coordinator.start"), 1);
}

#[tokio::test]
async fn test_job_failure_is_pipeline_error() {
    let h = Harness::new(Some(richness_schema()), JobBehavior::Fail);
    let mut pipeline = h.builder().build().await.unwrap();

    let err = pipeline.run().await.unwrap_err();
    assert!(matches!(err, TiviewError::Pipeline { .. }));
    assert!(err.to_string().contains("boom"));
    assert_eq!(h.log.count("gateway.close"), 1);
}

#[tokio::test]
async fn test_cancellation_cancels_job_and_cleans_up() {
    let h = Harness::new(Some(richness_schema()), JobBehavior::Hang);
    let mut pipeline = h.builder().build().await.unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = pipeline.run_until(cancel).await.unwrap_err();
    assert!(matches!(err.root_cause(), TiviewError::Cancelled));
    assert_eq!(err.exit_code(), 130);
    assert_eq!(h.log.count("job.cancel"), 1);
    assert_eq!(h.log.count("gateway.close"), 1);
}

#[tokio::test]
async fn test_cancelled_before_run_touches_nothing() {
    let h = Harness::new(Some(richness_schema()), JobBehavior::Hang);
    let mut pipeline = h.builder().drop_old_table(true).build().await.unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = pipeline.run_until(cancel).await.unwrap_err();
    assert!(matches!(err, TiviewError::Pipeline { .. }));
    assert!(matches!(err.root_cause(), TiviewError::Cancelled));
    assert_eq!(h.log.count("gateway.drop_table"), 0);
    assert_eq!(h.log.count("gateway.create_table"), 0);
    assert_eq!(h.log.count("coordinator.start"), 0);
    assert_eq!(h.log.count("env.execute_insert"), 0);
    assert_eq!(h.log.count("job.cancel"), 0);
    assert_eq!(h.log.count("coordinator.close"), 1);
    assert_eq!(h.log.count("gateway.close"), 1);
    assert_eq!(pipeline.state(), PipelineState::Closed);
}

#[tokio::test]
async fn test_cancelled_during_coordinator_start_submits_no_job() {
    let h = Harness::richness();
    let cancel = CancellationToken::new();
    let mut pipeline = h
        .builder()
        .coordinator(CancellingCoordinator {
            log: h.log.clone(),
            options: CoordinatorOptions::new(),
            cancel: cancel.clone(),
        })
        .build()
        .await
        .unwrap();

    let err = pipeline.run_until(cancel).await.unwrap_err();
    assert_eq!(err.exit_code(), 130);
    assert_eq!(h.log.count("coordinator.start"), 1);
    assert_eq!(h.log.count("env.execute_insert"), 0);
    assert!(h.log.position("coordinator.close") < h.log.position("env.close"));
    assert_eq!(h.log.count("gateway.close"), 1);
}

#[tokio::test]
async fn test_existing_table_without_force_conflicts() {
    let h = Harness::richness();
    let gateway = FakeGateway::new(&h.log, Some("test")).with_table("test", "richness");
    let mut pipeline = h
        .builder_with(gateway)
        .force_new_table(false)
        .build()
        .await
        .unwrap();
    assert!(pipeline.fails_if_table_exists());

    let err = pipeline.run().await.unwrap_err();
    assert!(matches!(err.root_cause(), TiviewError::SchemaConflict { .. }));
    assert_eq!(h.log.count("coordinator.start"), 0);
    assert_eq!(h.log.count("gateway.close"), 1);
}

// =============================================================================
// Build validation
// =============================================================================

#[tokio::test]
async fn test_build_without_connection_touches_nothing() {
    let h = Harness::richness();
    let err = Pipeline::builder(h.engine.clone())
        .query("SELECT 1")
        .target_table("t")
        .coordinator_factory(h.factory(false))
        .build()
        .await
        .unwrap_err();

    assert!(matches!(err, TiviewError::Config(_)));
    assert!(h.log.calls().is_empty(), "{:?}", h.log.calls());
}

#[tokio::test]
async fn test_column_override_of_matching_length() {
    let h = Harness::richness();
    let mut pipeline = h
        .builder()
        .column_names(["user_id", "user_name", "total"])
        .build()
        .await
        .unwrap();

    assert_eq!(
        pipeline.target_table().columns,
        names(&["user_id", "user_name", "total"])
    );
    assert_eq!(pipeline.target_table().primary_key, names(&["user_id"]));
    pipeline.close().await;
}

#[tokio::test]
async fn test_inferred_key_is_used() {
    let h = Harness::new(
        Some(richness_schema().with_primary_key(["id", "name"])),
        JobBehavior::Finish,
    );
    let mut pipeline = h.builder().build().await.unwrap();
    assert_eq!(pipeline.target_table().primary_key, names(&["id", "name"]));
    pipeline.close().await;
}

#[tokio::test]
async fn test_primary_key_override_must_be_subset() {
    let h = Harness::richness();
    let err = h
        .builder()
        .primary_keys(["missing"])
        .build()
        .await
        .unwrap_err();
    assert!(matches!(err, TiviewError::Config(_)));
    assert_eq!(h.log.count("gateway.close"), 1);
    assert_eq!(h.log.count("env.close"), 1);

    let h = Harness::richness();
    let err = h
        .builder()
        .primary_keys(Vec::<String>::new())
        .build()
        .await
        .unwrap_err();
    assert!(err.to_string().contains("can't be empty"));
}

#[tokio::test]
async fn test_default_database_mismatch() {
    let h = Harness::richness();
    let err = h
        .builder()
        .default_database("other")
        .build()
        .await
        .unwrap_err();
    assert!(matches!(err, TiviewError::Config(_)));
    assert!(err.to_string().contains("Default database mismatched"));
    assert_eq!(h.log.count("engine.create_environment"), 0);
}

#[tokio::test]
async fn test_default_database_required() {
    let h = Harness::richness();
    let err = h
        .builder_with(FakeGateway::new(&h.log, None))
        .build()
        .await
        .unwrap_err();
    assert!(matches!(err, TiviewError::Config(_)));

    let h = Harness::richness();
    let mut pipeline = h
        .builder_with(FakeGateway::new(&h.log, None))
        .default_database("test")
        .build()
        .await
        .unwrap();
    assert_eq!(pipeline.default_database(), "test");
    pipeline.close().await;
}

#[tokio::test]
async fn test_batch_settings_rejected() {
    let h = Harness::richness();
    let err = h
        .builder()
        .environment_settings(EnvironmentSettings::in_batch_mode())
        .build()
        .await
        .unwrap_err();
    assert!(err.to_string().contains("streaming"));
    assert_eq!(h.log.count("gateway.close"), 1);
}

#[tokio::test]
async fn test_invalid_parallelism_rejected() {
    let h = Harness::richness();
    let err = h.builder().parallelism(0).build().await.unwrap_err();
    assert!(matches!(err, TiviewError::Config(_)));
    assert_eq!(h.log.count("gateway.default_database"), 0);
}

#[tokio::test]
async fn test_query_error_releases_resources() {
    let h = Harness::new(None, JobBehavior::Finish);
    let err = h.builder().build().await.unwrap_err();

    assert!(matches!(err, TiviewError::Query(_)));
    assert_eq!(err.exit_code(), 5);
    assert_eq!(h.log.count("gateway.create_table"), 0);
    assert_eq!(h.log.count("env.close"), 1);
    assert_eq!(h.log.count("coordinator.close"), 1);
    assert_eq!(h.log.count("gateway.close"), 1);
}

// =============================================================================
// Environment and catalog
// =============================================================================

#[tokio::test]
async fn test_environment_and_catalog() {
    let h = Harness::richness();
    let mut pipeline = h
        .builder()
        .parallelism(4)
        .checkpoint_interval_ms(2500)
        .build()
        .await
        .unwrap();

    let env = h.environment.lock().unwrap().clone().unwrap();
    assert_eq!(env.parallelism, 4);
    let checkpoint = env.checkpoint.unwrap();
    assert_eq!(checkpoint.interval, Duration::from_millis(2500));
    assert_eq!(checkpoint.min_pause, Duration::from_millis(500));
    assert_eq!(checkpoint.max_concurrent, 1);
    assert_eq!(env.deployment, Deployment::default());

    assert!(h
        .log
        .calls()
        .contains(&"env.register_catalog tiview endpoint=pd0:2379 database=test".to_string()));
    assert!(h.log.position("env.register_catalog") < h.log.position("env.plan"));
    pipeline.close().await;
}

#[tokio::test]
async fn test_remote_cluster_host_reaches_coordinator() {
    let h = Harness::richness();
    let mut options = CoordinatorOptions::new();
    options.insert("coordinator.port".to_string(), "5801".to_string());

    let mut pipeline = h
        .builder()
        .remote_cluster("jobmanager", 8081)
        .coordinator_options(options)
        .build()
        .await
        .unwrap();

    let received = h.factory_options.lock().unwrap().clone().unwrap();
    assert_eq!(received[HOST_OPTION_KEY], "jobmanager");
    assert_eq!(received["coordinator.port"], "5801");
    assert_eq!(pipeline.coordinator_options()[HOST_OPTION_KEY], "jobmanager");
    pipeline.close().await;
}

#[tokio::test]
async fn test_explicit_coordinator_skips_factory() {
    let h = Harness::richness();
    let mut pipeline = h
        .builder()
        .coordinator(FakeCoordinator {
            log: h.log.clone(),
            options: CoordinatorOptions::new(),
            fail_start: false,
        })
        .build()
        .await
        .unwrap();

    assert_eq!(h.log.count("coordinator.create"), 0);
    pipeline.run().await.unwrap();
    assert_eq!(h.log.count("coordinator.start"), 1);
}

#[tokio::test]
async fn test_qualified_target_path() {
    let h = Harness::richness();
    let mut pipeline = h
        .builder()
        .target_path("reports.richness")
        .build()
        .await
        .unwrap();
    assert_eq!(pipeline.target_table().path.to_string(), "reports.richness");
    assert_eq!(pipeline.default_database(), "test");

    let ddl = pipeline.target_ddl().unwrap();
    assert!(ddl.starts_with("CREATE TABLE IF NOT EXISTS `reports`.`richness`"));

    pipeline.run().await.unwrap();
    assert_eq!(h.log.count("env.execute_insert `reports`.`richness`"), 1);
}

#[tokio::test]
async fn test_target_table_in_other_database() {
    let h = Harness::richness();
    let mut pipeline = h
        .builder()
        .target_table_in("reports", "richness")
        .build()
        .await
        .unwrap();
    assert_eq!(pipeline.target_table().path.database, "reports");
    assert_eq!(pipeline.target_table().path.table, "richness");
    assert_eq!(pipeline.default_database(), "test");
    assert!(pipeline.query().starts_with("SELECT id, name"));

    pipeline.run().await.unwrap();
    assert_eq!(h.log.count("gateway.create_table"), 1);
    assert_eq!(h.log.count("env.use_database test"), 1);
    assert_eq!(h.log.count("env.execute_insert `reports`.`richness`"), 1);
}

#[tokio::test]
async fn test_run_summary() {
    let h = Harness::new(Some(richness_schema()), JobBehavior::Fail);
    let mut pipeline = h.builder().build().await.unwrap();

    let started_at = chrono::Utc::now();
    let outcome = pipeline.run().await;
    let summary = tiview::RunSummary::finish(&pipeline, started_at, &outcome);

    assert_eq!(summary.run_id, pipeline.run_id());
    assert_eq!(summary.status, "failed");
    assert_eq!(summary.target_table, "test.richness");
    assert!(summary.error.unwrap().contains("boom"));
    assert!(summary.completed_at >= summary.started_at);
}
