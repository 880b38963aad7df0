//! Structured sub-test report
//!
//! Converts the ordered step results into the shape consumed by a
//! JUnit-style test reporter: one sub-test per attempted step, named
//! after the run and the pod that executed it.

use crate::execution::pod::{StepResult, StepStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// One attempted step, as seen by the external test-result aggregator
#[derive(Debug, Clone, Serialize)]
pub struct SubTest {
    pub name: String,
    pub pod: String,
    pub status: StepStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_seconds: i64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_warning: Option<String>,
}

/// Report for one whole run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run: String,
    pub succeeded: bool,
    pub sub_tests: Vec<SubTest>,
}

impl RunReport {
    /// Build the report from the sequencer's ordered results
    pub fn from_results(run: &str, results: &[StepResult]) -> Self {
        let sub_tests = results
            .iter()
            .map(|result| SubTest {
                name: format!("Run multi-stage test {} - {} container test", run, result.pod_name),
                pod: result.pod_name.clone(),
                status: result.status,
                started_at: result.started_at,
                finished_at: result.finished_at,
                duration_seconds: (result.finished_at - result.started_at).num_seconds(),
                artifact_warning: result.artifact_warning.clone(),
            })
            .collect();
        Self {
            run: run.to_string(),
            succeeded: results.iter().all(|r| r.status == StepStatus::Succeeded),
            sub_tests,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
