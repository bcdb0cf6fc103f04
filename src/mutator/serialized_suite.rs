use std::sync::Arc;

use tracing::debug;

use super::job_exists;
use crate::entity::SerializedSuite;
use crate::error::Result;
use crate::event::{DomainEvent, EventKind, EventSubscriber, Priority};
use crate::store::{JobRepository, SerializedSuiteRepository};

pub struct SerializedSuiteMutator {
    jobs: Arc<dyn JobRepository>,
    serialized_suites: Arc<dyn SerializedSuiteRepository>,
}

impl SerializedSuiteMutator {
    pub fn new(
        jobs: Arc<dyn JobRepository>,
        serialized_suites: Arc<dyn SerializedSuiteRepository>,
    ) -> Self {
        Self {
            jobs,
            serialized_suites,
        }
    }
}

impl EventSubscriber for SerializedSuiteMutator {
    fn name(&self) -> &'static str {
        "serialized-suite-mutator"
    }

    fn subscriptions(&self) -> Vec<(EventKind, Priority)> {
        vec![
            (EventKind::SerializedSuiteCreated, Priority::PERSIST),
            (EventKind::SerializedSuiteRetrieved, Priority::PERSIST),
        ]
    }

    fn handle(&self, event: &DomainEvent) -> Result<()> {
        let (job_id, snapshot, created) = match event {
            DomainEvent::SerializedSuiteCreated {
                job_id,
                serialized_suite,
            } => (job_id, serialized_suite, true),
            DomainEvent::SerializedSuiteRetrieved {
                job_id,
                serialized_suite,
            } => (job_id, serialized_suite, false),
            _ => return Ok(()),
        };
        if !job_exists(self.jobs.as_ref(), self.name(), event)? {
            return Ok(());
        }

        if created {
            let suite = SerializedSuite::new(
                job_id.as_str(),
                snapshot.id.as_str(),
                snapshot.state.as_str(),
                snapshot.meta_state,
            );
            let outcome = self.serialized_suites.insert_if_absent(&suite)?;
            debug!(job_id, inserted = outcome.is_inserted(), "serialized suite created");
            return Ok(());
        }

        let Some(mut suite) = self.serialized_suites.find(job_id)? else {
            debug!(job_id, "serialized suite retrieved before creation was recorded");
            return Ok(());
        };
        suite.state = snapshot.state.clone();
        suite.meta_state = snapshot.meta_state;
        self.serialized_suites.save(&suite)?;
        debug!(
            job_id,
            state = %suite.state,
            ended = suite.meta_state.ended,
            succeeded = suite.meta_state.succeeded,
            "serialized suite updated"
        );
        Ok(())
    }
}
