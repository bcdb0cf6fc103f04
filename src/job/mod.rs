mod component;

pub use component::Component;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A test execution job whose sub-resources are being prepared.
///
/// Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub user_id: String,
    pub suite_id: String,
    pub maximum_duration_in_seconds: u64,
    pub created_at: DateTime<Utc>,
}

impl Job {
    pub fn new(
        user_id: impl Into<String>,
        suite_id: impl Into<String>,
        maximum_duration_in_seconds: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            suite_id: suite_id.into(),
            maximum_duration_in_seconds,
            created_at: Utc::now(),
        }
    }

    /// Builds a job with a known id. Used when replaying triggers and in tests.
    pub fn with_id(
        id: impl Into<String>,
        user_id: impl Into<String>,
        suite_id: impl Into<String>,
        maximum_duration_in_seconds: u64,
    ) -> Self {
        Self {
            id: id.into(),
            ..Self::new(user_id, suite_id, maximum_duration_in_seconds)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_job_has_unique_id() {
        let a = Job::new("user-1", "suite-1", 600);
        let b = Job::new("user-1", "suite-1", 600);
        assert_ne!(a.id, b.id);
        assert_eq!(a.maximum_duration_in_seconds, 600);
    }

    #[test]
    fn with_id_keeps_id() {
        let job = Job::with_id("job-1", "user-1", "suite-1", 60);
        assert_eq!(job.id, "job-1");
        assert_eq!(job.suite_id, "suite-1");
    }
}
