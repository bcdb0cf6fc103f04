use serde::{Deserialize, Serialize};

/// Coarse outcome flags reported alongside a detailed state string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaState {
    pub ended: bool,
    pub succeeded: bool,
}

impl MetaState {
    pub fn new(ended: bool, succeeded: bool) -> Self {
        Self { ended, succeeded }
    }

    pub fn has_failed(&self) -> bool {
        self.ended && !self.succeeded
    }
}

/// The serialized form of the job's test suite, as held by the suite service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedSuite {
    pub job_id: String,
    pub serialized_suite_id: String,
    pub state: String,
    pub meta_state: MetaState,
}

impl SerializedSuite {
    pub fn new(
        job_id: impl Into<String>,
        serialized_suite_id: impl Into<String>,
        state: impl Into<String>,
        meta_state: MetaState,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            serialized_suite_id: serialized_suite_id.into(),
            state: state.into(),
            meta_state,
        }
    }

    /// Serialization finished successfully; a worker can fetch the suite.
    pub fn is_prepared(&self) -> bool {
        self.meta_state.ended && self.meta_state.succeeded
    }
}
