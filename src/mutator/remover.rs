use std::sync::Arc;

use tracing::info;

use super::job_exists;
use crate::error::Result;
use crate::event::{DomainEvent, EventKind, EventSubscriber, Priority};
use crate::job::Component;
use crate::preparation::ComponentHandler;
use crate::remote_request::RemoteRequestLedger;
use crate::store::JobRepository;

/// Prunes the ledger once a component has reached its successful end.
///
/// Polling rows go entirely. Of the create rows only the newest survives,
/// which keeps the dispatch guard from ever creating the resource again.
pub struct RemoteRequestRemover {
    jobs: Arc<dyn JobRepository>,
    ledger: RemoteRequestLedger,
}

impl RemoteRequestRemover {
    pub fn new(jobs: Arc<dyn JobRepository>, ledger: RemoteRequestLedger) -> Self {
        Self { jobs, ledger }
    }

    fn finished_component(event: &DomainEvent) -> Option<Component> {
        match event {
            DomainEvent::ResultsJobStateRetrieved { end_state, .. } if end_state.is_some() => {
                Some(Component::ResultsJob)
            }
            DomainEvent::SerializedSuiteRetrieved {
                serialized_suite, ..
            } if serialized_suite.meta_state.ended && serialized_suite.meta_state.succeeded => {
                Some(Component::SerializedSuite)
            }
            DomainEvent::MachineRetrieved { machine, .. } if machine.is_active() => {
                Some(Component::Machine)
            }
            DomainEvent::WorkerStateRetrieved { state, .. } if state.has_ended() => {
                Some(Component::WorkerJob)
            }
            _ => None,
        }
    }
}

impl EventSubscriber for RemoteRequestRemover {
    fn name(&self) -> &'static str {
        "remote-request-remover"
    }

    fn subscriptions(&self) -> Vec<(EventKind, Priority)> {
        vec![
            (EventKind::ResultsJobStateRetrieved, Priority::CLEANUP),
            (EventKind::SerializedSuiteRetrieved, Priority::CLEANUP),
            (EventKind::MachineRetrieved, Priority::CLEANUP),
            (EventKind::WorkerStateRetrieved, Priority::CLEANUP),
        ]
    }

    fn handle(&self, event: &DomainEvent) -> Result<()> {
        let Some(component) = Self::finished_component(event) else {
            return Ok(());
        };
        if !job_exists(self.jobs.as_ref(), self.name(), event)? {
            return Ok(());
        }

        let job_id = event.job_id();
        let handler = ComponentHandler::for_component(component);
        let polls = self
            .ledger
            .remove_all_for_job_and_type(job_id, handler.retrieve_type)?;
        let superseded = self
            .ledger
            .remove_superseded_for_job_and_type(job_id, handler.create_type)?;
        info!(job_id, %component, polls, superseded, "pruned remote requests");
        Ok(())
    }
}
