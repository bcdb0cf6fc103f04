use serde::{Deserialize, Serialize};

/// The results-service job that collects events for a test execution job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultsJob {
    pub job_id: String,
    /// Token the worker uses to push events to the results service.
    pub token: String,
    pub state: String,
    pub end_state: Option<String>,
}

impl ResultsJob {
    pub fn new(job_id: impl Into<String>, token: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            token: token.into(),
            state: state.into(),
            end_state: None,
        }
    }

    pub fn has_ended(&self) -> bool {
        self.end_state.is_some()
    }
}
