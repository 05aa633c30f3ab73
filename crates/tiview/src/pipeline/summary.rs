//! Outcome of a pipeline run, for reporting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::JobExecutionResult;
use crate::error::TiviewError;

use super::runner::Pipeline;

/// Result of a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// Unique run identifier.
    pub run_id: String,

    /// Final status: "completed", "cancelled" or "failed".
    pub status: String,

    /// Target table as `database.table`.
    pub target_table: String,

    /// Engine job id, when the job finished.
    pub job_id: Option<String>,

    /// When the run started.
    pub started_at: DateTime<Utc>,

    /// When the run ended.
    pub completed_at: DateTime<Utc>,

    /// Wall-clock duration in seconds.
    pub duration_seconds: f64,

    /// Job runtime reported by the engine, in seconds.
    pub net_runtime_seconds: Option<f64>,

    /// Error message of a failed run.
    pub error: Option<String>,
}

impl RunSummary {
    /// Summarize a finished run of `pipeline` started at `started_at`.
    pub fn finish(
        pipeline: &Pipeline,
        started_at: DateTime<Utc>,
        outcome: &Result<JobExecutionResult, TiviewError>,
    ) -> Self {
        let completed_at = Utc::now();
        let duration_seconds = (completed_at - started_at).num_milliseconds() as f64 / 1000.0;

        let (status, job_id, net_runtime_seconds, error) = match outcome {
            Ok(result) => (
                "completed",
                Some(result.job_id.clone()),
                Some(result.net_runtime.as_secs_f64()),
                None,
            ),
            Err(e) if matches!(e.root_cause(), TiviewError::Cancelled) => {
                ("cancelled", None, None, Some(e.to_string()))
            }
            Err(e) => ("failed", None, None, Some(e.to_string())),
        };

        Self {
            run_id: pipeline.run_id().to_string(),
            status: status.to_string(),
            target_table: pipeline.target_table().path.to_string(),
            job_id,
            started_at,
            completed_at,
            duration_seconds,
            net_runtime_seconds,
            error,
        }
    }
}
