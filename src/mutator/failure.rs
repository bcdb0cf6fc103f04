use std::sync::Arc;

use tracing::{debug, info};

use super::job_exists;
use crate::error::Result;
use crate::event::{DomainEvent, EventKind, EventSubscriber, Priority};
use crate::remote_request::RemoteRequestLedger;
use crate::store::JobRepository;

/// Attaches the classified failure to the attempt that produced it.
pub struct RemoteRequestFailureRecorder {
    jobs: Arc<dyn JobRepository>,
    ledger: RemoteRequestLedger,
}

impl RemoteRequestFailureRecorder {
    pub fn new(jobs: Arc<dyn JobRepository>, ledger: RemoteRequestLedger) -> Self {
        Self { jobs, ledger }
    }
}

impl EventSubscriber for RemoteRequestFailureRecorder {
    fn name(&self) -> &'static str {
        "remote-request-failure-recorder"
    }

    fn subscriptions(&self) -> Vec<(EventKind, Priority)> {
        vec![(EventKind::MessageFailed, Priority::TRACK)]
    }

    fn handle(&self, event: &DomainEvent) -> Result<()> {
        let DomainEvent::MessageFailed { error, .. } = event else {
            return Ok(());
        };
        let Some(failure) = error.failure() else {
            debug!(request = %error.key, "error carries no failure to record");
            return Ok(());
        };
        if !job_exists(self.jobs.as_ref(), self.name(), event)? {
            return Ok(());
        }

        let mut request = self.ledger.find_or_create(&error.key)?;
        info!(request = %error.key, %failure, "recording remote request failure");
        self.ledger.set_failure(&mut request, failure)
    }
}
