//! Error types for the materialized-view pipeline library.

use thiserror::Error;

/// Main error type for pipeline operations.
#[derive(Error, Debug)]
pub enum TiviewError {
    /// Missing, invalid or contradictory configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Target table exists and conflicts with the requested table intent.
    #[error("Schema conflict on {table}: {message}")]
    SchemaConflict { table: String, message: String },

    /// I/O, permission or protocol failure talking to the relational store.
    #[error("Store error: {0}")]
    Store(String),

    /// The declarative query could not be planned.
    #[error("Query error: {0}")]
    Query(String),

    /// The consistency coordinator failed to start or stop.
    #[error("Coordinator error: {0}")]
    Coordinator(String),

    /// Failure while running a built pipeline.
    #[error("Pipeline error: {message}")]
    Pipeline {
        message: String,
        #[source]
        source: Option<Box<TiviewError>>,
    },

    /// Transport or protocol failure talking to the stream engine.
    #[error("Engine error: {0}")]
    Engine(String),

    /// The pipeline was cancelled (SIGINT, etc.)
    #[error("Pipeline cancelled")]
    Cancelled,

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TiviewError {
    /// Create a SchemaConflict error for a table.
    pub fn schema_conflict(table: impl Into<String>, message: impl Into<String>) -> Self {
        TiviewError::SchemaConflict {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a Pipeline error with no underlying cause.
    pub fn pipeline(message: impl Into<String>) -> Self {
        TiviewError::Pipeline {
            message: message.into(),
            source: None,
        }
    }

    /// Wrap an error raised while running a pipeline.
    ///
    /// Errors that are already `Pipeline` errors are returned unchanged.
    pub fn wrap_pipeline(err: TiviewError) -> Self {
        match err {
            TiviewError::Pipeline { .. } => err,
            other => TiviewError::Pipeline {
                message: other.to_string(),
                source: Some(Box::new(other)),
            },
        }
    }

    /// Innermost error of a `Pipeline` wrapper, or `self` otherwise.
    pub fn root_cause(&self) -> &TiviewError {
        match self {
            TiviewError::Pipeline {
                source: Some(inner),
                ..
            } => inner.root_cause(),
            other => other,
        }
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> u8 {
        match self.root_cause() {
            TiviewError::Config(_) | TiviewError::Yaml(_) => 2,
            TiviewError::SchemaConflict { .. } => 3,
            TiviewError::Store(_) => 4,
            TiviewError::Query(_) => 5,
            TiviewError::Coordinator(_) => 6,
            TiviewError::Engine(_) => 7,
            TiviewError::Cancelled => 130,
            _ => 1,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

impl From<mysql_async::Error> for TiviewError {
    fn from(err: mysql_async::Error) -> Self {
        TiviewError::Store(err.to_string())
    }
}

impl From<reqwest::Error> for TiviewError {
    fn from(err: reqwest::Error) -> Self {
        TiviewError::Engine(err.to_string())
    }
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, TiviewError>;
