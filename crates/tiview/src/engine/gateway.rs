//! Stream engine reached through a SQL gateway REST endpoint.
//!
//! Statements go to the gateway (`/v2/sessions/...`); job status and
//! cancellation go to the job manager's REST API (`/jobs/...`), whose
//! address follows from the execution environment's deployment unless
//! configured explicitly.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, Response};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::core::identifier::quote;
use crate::core::schema::{Column, DataType, ResolvedSchema};
use crate::core::traits::{JobClient, StreamEngine, TableEnvironment};
use crate::error::{Result, TiviewError};

use super::{
    CatalogSpec, Deployment, EnvironmentSettings, ExecutionEnvironment, JobExecutionResult,
};

const API_VERSION: &str = "v2";

/// Temporary view a query is registered under while it is planned.
const PLAN_VIEW: &str = "__tiview_plan";

/// Gateway client settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Base URL of the SQL gateway, e.g. `http://localhost:8083`.
    pub gateway_url: String,

    /// Base URL of the job manager REST API. Derived from the deployment
    /// when unset.
    pub rest_url: Option<String>,

    /// Delay between polls of pending results and running jobs.
    pub poll_interval: Duration,

    /// Timeout of a single HTTP request.
    pub request_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            gateway_url: "http://localhost:8083".to_string(),
            rest_url: None,
            poll_interval: Duration::from_secs(1),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// [`StreamEngine`] backed by a SQL gateway.
pub struct GatewayEngine {
    client: Client,
    config: GatewayConfig,
}

impl GatewayEngine {
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| TiviewError::Engine(format!("building HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config: GatewayConfig {
                gateway_url: trim_base(&config.gateway_url),
                rest_url: config.rest_url.as_deref().map(trim_base),
                ..config
            },
        })
    }

    /// Gateway product version, as reported by `/v1/info`.
    pub async fn health_check(&self) -> Result<String> {
        let url = format!("{}/v1/info", self.config.gateway_url);
        let response = check(self.client.get(&url).send().await?).await?;
        let info: InfoResponse = response.json().await?;
        Ok(format!("{} {}", info.product_name, info.version))
    }

    fn rest_url_for(&self, deployment: &Deployment) -> String {
        if let Some(url) = &self.config.rest_url {
            return url.clone();
        }
        match deployment {
            Deployment::Local { rest_port } => format!("http://localhost:{}", rest_port),
            Deployment::Remote { host, port } => format!("http://{}:{}", host, port),
        }
    }
}

#[async_trait]
impl StreamEngine for GatewayEngine {
    async fn create_environment(
        &self,
        env: &ExecutionEnvironment,
        settings: &EnvironmentSettings,
    ) -> Result<Box<dyn TableEnvironment>> {
        let properties = env.to_properties(settings);
        debug!("Opening gateway session with properties {:?}", properties);

        let url = format!("{}/{}/sessions", self.config.gateway_url, API_VERSION);
        let body = serde_json::json!({
            "sessionName": "tiview",
            "properties": properties,
        });
        let response = check(self.client.post(&url).json(&body).send().await?).await?;
        let opened: OpenSessionResponse = response.json().await?;

        info!("Opened gateway session {}", opened.session_handle);

        Ok(Box::new(GatewaySession {
            client: self.client.clone(),
            gateway_url: self.config.gateway_url.clone(),
            rest_url: self.rest_url_for(&env.deployment),
            session: opened.session_handle,
            poll_interval: self.config.poll_interval,
            closed: false,
        }))
    }
}

/// Rows returned by a statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatementResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub job_id: Option<String>,
}

impl StatementResult {
    fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }
}

struct GatewaySession {
    client: Client,
    gateway_url: String,
    rest_url: String,
    session: String,
    poll_interval: Duration,
    closed: bool,
}

impl GatewaySession {
    fn session_url(&self) -> String {
        format!(
            "{}/{}/sessions/{}",
            self.gateway_url, API_VERSION, self.session
        )
    }

    /// Submit a statement and collect its full result.
    async fn execute(&self, statement: &str) -> Result<StatementResult> {
        if self.closed {
            return Err(TiviewError::Engine("gateway session is closed".to_string()));
        }
        debug!("Executing statement: {}", statement);

        let url = format!("{}/statements", self.session_url());
        let body = serde_json::json!({ "statement": statement });
        let response = self.client.post(&url).json(&body).send().await?;
        let response = check_statement(response, statement).await?;
        let submitted: SubmitStatementResponse = response.json().await?;

        self.fetch_all(&submitted.operation_handle, statement).await
    }

    async fn fetch_all(&self, operation: &str, statement: &str) -> Result<StatementResult> {
        let mut result = StatementResult::default();
        let mut url = format!(
            "{}/operations/{}/result/0?rowFormat=JSON",
            self.session_url(),
            operation
        );

        loop {
            let response = self.client.get(&url).send().await?;
            let response = check_statement(response, statement).await?;
            let page: FetchResultsResponse = response.json().await?;

            match page.result_type.as_str() {
                "NOT_READY" => {
                    tokio::time::sleep(self.poll_interval).await;
                    continue;
                }
                "PAYLOAD" | "EOS" => {
                    merge_page(&mut result, &page);
                    if page.result_type == "EOS" {
                        break;
                    }
                    match page.next_result_uri {
                        Some(next) => url = format!("{}{}", self.gateway_url, next),
                        None => break,
                    }
                }
                other => {
                    return Err(TiviewError::Engine(format!(
                        "unexpected result type '{}' from gateway",
                        other
                    )));
                }
            }
        }

        Ok(result)
    }
}

#[async_trait]
impl TableEnvironment for GatewaySession {
    async fn register_catalog(&mut self, catalog: &CatalogSpec) -> Result<()> {
        self.execute(&catalog_ddl(catalog)?).await?;
        info!(
            "Registered catalog {} (store {}, default database {})",
            catalog.name, catalog.store_endpoint, catalog.default_database
        );
        Ok(())
    }

    async fn use_catalog(&mut self, name: &str) -> Result<()> {
        self.execute(&format!("USE CATALOG {}", quote(name)?))
            .await
            .map(|_| ())
    }

    async fn use_database(&mut self, database: &str) -> Result<()> {
        self.execute(&format!("USE {}", quote(database)?))
            .await
            .map(|_| ())
    }

    async fn plan(&mut self, query: &str) -> Result<ResolvedSchema> {
        let view = quote(PLAN_VIEW)?;
        self.execute(&format!("DROP TEMPORARY VIEW IF EXISTS {}", view))
            .await?;
        self.execute(&format!("CREATE TEMPORARY VIEW {} AS {}", view, query))
            .await?;
        let described = self.execute(&format!("DESCRIBE {}", view)).await?;
        parse_describe(&described)
    }

    async fn execute_insert(
        &mut self,
        query: &str,
        target_path: &str,
    ) -> Result<Box<dyn JobClient>> {
        let statement = format!("INSERT INTO {} {}", target_path, query);
        let result = self.execute(&statement).await?;
        let job_id = job_id_from(&result).ok_or_else(|| {
            TiviewError::Engine(format!("no job id returned for insert into {}", target_path))
        })?;

        debug!("Insert into {} submitted as job {}", target_path, job_id);
        Ok(Box::new(GatewayJob {
            client: self.client.clone(),
            rest_url: self.rest_url.clone(),
            job_id,
            poll_interval: self.poll_interval,
        }))
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let response = self
            .client
            .request(Method::DELETE, self.session_url())
            .send()
            .await?;
        check(response).await?;
        debug!("Closed gateway session {}", self.session);
        Ok(())
    }
}

struct GatewayJob {
    client: Client,
    rest_url: String,
    job_id: String,
    poll_interval: Duration,
}

impl GatewayJob {
    async fn root_exception(&self) -> Option<String> {
        let url = format!("{}/jobs/{}/exceptions", self.rest_url, self.job_id);
        let response = self.client.get(&url).send().await.ok()?;
        let exceptions: JobExceptionsResponse = check(response).await.ok()?.json().await.ok()?;
        exceptions.root_exception
    }
}

#[async_trait]
impl JobClient for GatewayJob {
    fn job_id(&self) -> &str {
        &self.job_id
    }

    async fn await_completion(&mut self) -> Result<JobExecutionResult> {
        let url = format!("{}/jobs/{}", self.rest_url, self.job_id);
        let mut last_state = String::new();

        loop {
            let response = check(self.client.get(&url).send().await?).await?;
            let details: JobDetailsResponse = response.json().await?;

            if details.state != last_state {
                debug!("Job {} is {}", self.job_id, details.state);
                last_state = details.state.clone();
            }

            match job_outcome(&details) {
                JobOutcome::Running => tokio::time::sleep(self.poll_interval).await,
                JobOutcome::Finished(result) => return Ok(result),
                JobOutcome::Cancelled => {
                    return Err(TiviewError::pipeline(format!(
                        "job {} was cancelled",
                        self.job_id
                    )));
                }
                JobOutcome::Failed => {
                    let cause = self
                        .root_exception()
                        .await
                        .unwrap_or_else(|| "no exception reported".to_string());
                    return Err(TiviewError::pipeline(format!(
                        "job {} failed: {}",
                        self.job_id, cause
                    )));
                }
            }
        }
    }

    async fn cancel(&mut self) -> Result<()> {
        let url = format!("{}/jobs/{}?mode=cancel", self.rest_url, self.job_id);
        let response = self.client.request(Method::PATCH, &url).send().await?;
        check(response).await?;
        warn!("Requested cancellation of job {}", self.job_id);
        Ok(())
    }
}

// ===== Wire types =====

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InfoResponse {
    product_name: String,
    version: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenSessionResponse {
    session_handle: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitStatementResponse {
    operation_handle: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FetchResultsResponse {
    result_type: String,
    #[serde(default)]
    results: Option<ResultSet>,
    #[serde(default)]
    next_result_uri: Option<String>,
    #[serde(default, rename = "jobID")]
    job_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResultSet {
    #[serde(default)]
    columns: Vec<ResultColumn>,
    #[serde(default)]
    data: Vec<ResultRow>,
}

#[derive(Debug, Deserialize)]
struct ResultColumn {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ResultRow {
    #[serde(default)]
    fields: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    errors: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct JobDetailsResponse {
    jid: String,
    state: String,
    #[serde(default)]
    duration: i64,
}

#[derive(Debug, Deserialize)]
struct JobExceptionsResponse {
    #[serde(default, rename = "root-exception")]
    root_exception: Option<String>,
}

// ===== Response handling =====

fn trim_base(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

/// Turn a non-success HTTP response into an engine error.
async fn check(response: Response) -> Result<Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(TiviewError::Engine(format!(
        "HTTP {}: {}",
        status,
        error_message(&body)
    )))
}

/// Like [`check`], but a rejected statement is a query error.
async fn check_statement(response: Response, statement: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    if status.is_server_error() || status == reqwest::StatusCode::BAD_REQUEST {
        return Err(TiviewError::Query(format!(
            "statement failed: {}\n  Statement: {}",
            error_message(&body),
            statement
        )));
    }
    Err(TiviewError::Engine(format!(
        "HTTP {}: {}",
        status,
        error_message(&body)
    )))
}

/// First line of the gateway's error list, or the raw body.
fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(parsed) if !parsed.errors.is_empty() => parsed
            .errors
            .iter()
            .map(|e| e.lines().next().unwrap_or_default().to_string())
            .collect::<Vec<_>>()
            .join("; "),
        _ => body.trim().to_string(),
    }
}

fn merge_page(result: &mut StatementResult, page: &FetchResultsResponse) {
    if result.job_id.is_none() {
        result.job_id = page.job_id.clone();
    }
    if let Some(results) = &page.results {
        if result.columns.is_empty() {
            result.columns = results.columns.iter().map(|c| c.name.clone()).collect();
        }
        result
            .rows
            .extend(results.data.iter().map(|row| row.fields.clone()));
    }
}

/// Escape a string literal for a `WITH (...)` clause.
fn literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// `CREATE CATALOG` statement for the store catalog.
pub fn catalog_ddl(catalog: &CatalogSpec) -> Result<String> {
    let mut options: BTreeMap<String, String> = BTreeMap::new();
    options.insert("type".to_string(), "tidb".to_string());
    options.insert("pd-addresses".to_string(), catalog.store_endpoint.clone());
    options.insert(
        "default-database".to_string(),
        catalog.default_database.clone(),
    );
    for (key, value) in &catalog.coordinator_options {
        options.insert(key.clone(), value.clone());
    }

    let with = options
        .iter()
        .map(|(k, v)| format!("{} = {}", literal(k), literal(v)))
        .collect::<Vec<_>>()
        .join(", ");

    Ok(format!(
        "CREATE CATALOG {} WITH ({})",
        quote(&catalog.name)?,
        with
    ))
}

/// Build a resolved schema from `DESCRIBE` output.
///
/// The `key` column reads `PRI(a, b)` on primary-key columns.
pub fn parse_describe(result: &StatementResult) -> Result<ResolvedSchema> {
    let name_idx = result
        .column_index("name")
        .ok_or_else(|| TiviewError::Engine("DESCRIBE result has no 'name' column".into()))?;
    let type_idx = result
        .column_index("type")
        .ok_or_else(|| TiviewError::Engine("DESCRIBE result has no 'type' column".into()))?;
    let null_idx = result.column_index("null");
    let key_idx = result.column_index("key");

    let mut columns = Vec::with_capacity(result.rows.len());
    let mut primary_key = None;

    for row in &result.rows {
        let name = row
            .get(name_idx)
            .and_then(Value::as_str)
            .ok_or_else(|| TiviewError::Engine("DESCRIBE row without a column name".into()))?;
        let type_text = row
            .get(type_idx)
            .and_then(Value::as_str)
            .ok_or_else(|| TiviewError::Engine(format!("no type for column '{}'", name)))?;

        let mut data_type = DataType::parse(type_text)?;
        if let Some(nullable) = null_idx.and_then(|i| row.get(i)).and_then(Value::as_bool) {
            data_type.nullable = nullable;
        }
        columns.push(Column::new(name, data_type));

        if primary_key.is_none() {
            primary_key = key_idx
                .and_then(|i| row.get(i))
                .and_then(Value::as_str)
                .and_then(parse_primary_key);
        }
    }

    if columns.is_empty() {
        return Err(TiviewError::Query("query produces no columns".to_string()));
    }

    Ok(ResolvedSchema {
        columns,
        primary_key,
    })
}

fn parse_primary_key(key: &str) -> Option<Vec<String>> {
    let inner = key.trim().strip_prefix("PRI(")?.strip_suffix(')')?;
    let keys: Vec<String> = inner
        .split(',')
        .map(|k| k.trim().trim_matches('`').to_string())
        .filter(|k| !k.is_empty())
        .collect();
    if keys.is_empty() {
        None
    } else {
        Some(keys)
    }
}

/// Job id of an insert statement's result.
pub fn job_id_from(result: &StatementResult) -> Option<String> {
    if let Some(id) = &result.job_id {
        return Some(id.clone());
    }
    let idx = result.column_index("job id").unwrap_or(0);
    result
        .rows
        .first()
        .and_then(|row| row.get(idx))
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[derive(Debug, PartialEq)]
enum JobOutcome {
    Running,
    Finished(JobExecutionResult),
    Failed,
    Cancelled,
}

fn job_outcome(details: &JobDetailsResponse) -> JobOutcome {
    match details.state.as_str() {
        "FINISHED" => JobOutcome::Finished(JobExecutionResult {
            job_id: details.jid.clone(),
            net_runtime: Duration::from_millis(details.duration.max(0) as u64),
        }),
        "FAILED" => JobOutcome::Failed,
        "CANCELED" | "CANCELLED" => JobOutcome::Cancelled,
        _ => JobOutcome::Running,
    }
}
