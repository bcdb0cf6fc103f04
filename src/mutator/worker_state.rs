use std::sync::Arc;

use tracing::debug;

use super::job_exists;
use crate::entity::{WorkerComponentName, WorkerComponentState};
use crate::error::Result;
use crate::event::{DomainEvent, EventKind, EventSubscriber, Priority};
use crate::store::{JobRepository, WorkerComponentStateRepository};

/// Writes one row per worker sub-component from each state report.
pub struct WorkerComponentStateMutator {
    jobs: Arc<dyn JobRepository>,
    states: Arc<dyn WorkerComponentStateRepository>,
}

impl WorkerComponentStateMutator {
    pub fn new(
        jobs: Arc<dyn JobRepository>,
        states: Arc<dyn WorkerComponentStateRepository>,
    ) -> Self {
        Self { jobs, states }
    }
}

impl EventSubscriber for WorkerComponentStateMutator {
    fn name(&self) -> &'static str {
        "worker-component-state-mutator"
    }

    fn subscriptions(&self) -> Vec<(EventKind, Priority)> {
        vec![(EventKind::WorkerStateRetrieved, Priority::PERSIST)]
    }

    fn handle(&self, event: &DomainEvent) -> Result<()> {
        let DomainEvent::WorkerStateRetrieved { job_id, state } = event else {
            return Ok(());
        };
        if !job_exists(self.jobs.as_ref(), self.name(), event)? {
            return Ok(());
        }

        for name in WorkerComponentName::ALL {
            let component = state.component(name);
            self.states
                .save(&WorkerComponentState::new(job_id.as_str(), name, component))?;
        }
        debug!(job_id, ended = state.has_ended(), "worker component states saved");
        Ok(())
    }
}
