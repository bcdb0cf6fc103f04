use std::sync::Arc;

use tracing::debug;

use super::job_exists;
use crate::error::Result;
use crate::event::{DomainEvent, EventKind, EventSubscriber, Priority};
use crate::store::{JobRepository, ResultsJobRepository};

/// Persists the results job on creation and tracks its state afterwards.
pub struct ResultsJobMutator {
    jobs: Arc<dyn JobRepository>,
    results_jobs: Arc<dyn ResultsJobRepository>,
}

impl ResultsJobMutator {
    pub fn new(jobs: Arc<dyn JobRepository>, results_jobs: Arc<dyn ResultsJobRepository>) -> Self {
        Self { jobs, results_jobs }
    }
}

impl EventSubscriber for ResultsJobMutator {
    fn name(&self) -> &'static str {
        "results-job-mutator"
    }

    fn subscriptions(&self) -> Vec<(EventKind, Priority)> {
        vec![
            (EventKind::ResultsJobCreated, Priority::PERSIST),
            (EventKind::ResultsJobStateRetrieved, Priority::PERSIST),
        ]
    }

    fn handle(&self, event: &DomainEvent) -> Result<()> {
        if !matches!(
            event,
            DomainEvent::ResultsJobCreated { .. } | DomainEvent::ResultsJobStateRetrieved { .. }
        ) {
            return Ok(());
        }
        if !job_exists(self.jobs.as_ref(), self.name(), event)? {
            return Ok(());
        }

        match event {
            DomainEvent::ResultsJobCreated { job_id, results_job } => {
                let outcome = self.results_jobs.insert_if_absent(results_job)?;
                debug!(job_id, inserted = outcome.is_inserted(), "results job created");
            }
            DomainEvent::ResultsJobStateRetrieved {
                job_id,
                state,
                end_state,
            } => {
                let Some(mut results_job) = self.results_jobs.find(job_id)? else {
                    debug!(job_id, "results job state retrieved before creation was recorded");
                    return Ok(());
                };
                results_job.state = state.clone();
                results_job.end_state = end_state.clone();
                self.results_jobs.save(&results_job)?;
                debug!(job_id, state, "results job state updated");
            }
            _ => {}
        }
        Ok(())
    }
}
