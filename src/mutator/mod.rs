//! Event-driven writers.
//!
//! Each subscriber here turns one family of domain events into single-row
//! writes: result entities at [`Priority::PERSIST`](crate::event::Priority),
//! ledger rows at `TRACK` and ledger pruning at `CLEANUP`. Events for a job
//! that cannot be found are dropped without error.

mod failure;
mod machine;
mod remover;
mod request_state;
mod results_job;
mod serialized_suite;
mod worker_state;

pub use failure::RemoteRequestFailureRecorder;
pub use machine::MachineMutator;
pub use remover::RemoteRequestRemover;
pub use request_state::{RemoteRequestStateTracker, request_trigger_for};
pub use results_job::ResultsJobMutator;
pub use serialized_suite::SerializedSuiteMutator;
pub use worker_state::WorkerComponentStateMutator;

use tracing::debug;

use crate::error::Result;
use crate::event::DomainEvent;
use crate::store::JobRepository;

/// Whether the event's job still exists. Logs the skip when it does not.
fn job_exists(jobs: &dyn JobRepository, subscriber: &str, event: &DomainEvent) -> Result<bool> {
    let found = jobs.find(event.job_id())?.is_some();
    if !found {
        debug!(
            subscriber,
            job_id = event.job_id(),
            event = ?event.kind(),
            "ignoring event for unknown job"
        );
    }
    Ok(found)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use crate::job::Job;
    use crate::store::Repositories;
    use crate::store::memory::InMemoryStore;

    /// Repositories over a fresh store holding `job-1`.
    pub fn repositories() -> (Arc<InMemoryStore>, Repositories) {
        let store = Arc::new(InMemoryStore::new());
        let repositories = Repositories::from_store(store.clone());
        repositories
            .jobs
            .save(&Job::with_id("job-1", "user-1", "suite-1", 600))
            .unwrap();
        (store, repositories)
    }
}
