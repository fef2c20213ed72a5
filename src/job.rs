//! Job-level status reported to the ingestion service.
//!
//! Enumeration failures happen outside the delivery pipeline, but the
//! remote side still needs to know a job failed and why. Vendor SDK errors
//! rarely expose a structured code, so the code is pulled out of the error
//! chain's messages on a best-effort basis.

use serde::{Deserialize, Serialize};

use crate::envelope::JobContext;

/// Markers that precede an error code in vendor error messages.
const CODE_MARKERS: &[&str] = &["ErrorCode:", "StatusCode:", "Code:", "code="];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Succeeded,
    Failed,
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Succeeded => write!(f, "succeeded"),
            JobState::Failed => write!(f, "failed"),
        }
    }
}

/// Status of one enumeration job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    pub job_id: String,
    pub state: JobState,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Number of resources the job produced
    pub resource_count: usize,
}

impl JobStatus {
    pub fn succeeded(job: &JobContext, resource_count: usize) -> Self {
        Self {
            job_id: job.job_id.clone(),
            state: JobState::Succeeded,
            error_code: None,
            error_message: None,
            resource_count,
        }
    }

    /// Failed status with the code extracted from `error`'s source chain.
    pub fn failed(job: &JobContext, error: &(dyn std::error::Error + 'static)) -> Self {
        Self {
            job_id: job.job_id.clone(),
            state: JobState::Failed,
            error_code: extract_error_code(error),
            error_message: Some(error.to_string()),
            resource_count: 0,
        }
    }
}

/// Finds the first error code mentioned anywhere in the error chain.
pub fn extract_error_code(error: &(dyn std::error::Error + 'static)) -> Option<String> {
    let mut current = Some(error);
    while let Some(err) = current {
        if let Some(code) = code_in_message(&err.to_string()) {
            return Some(code);
        }
        current = err.source();
    }
    None
}

fn code_in_message(message: &str) -> Option<String> {
    CODE_MARKERS.iter().find_map(|marker| {
        let start = message.find(marker)? + marker.len();
        let code: String = message[start..]
            .trim_start()
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
            .collect();
        (!code.is_empty()).then_some(code)
    })
}
