use std::sync::Arc;

use tracing::debug;

use super::job_exists;
use crate::error::Result;
use crate::event::{DomainEvent, EventKind, EventSubscriber, Priority};
use crate::remote_request::{RemoteRequestLedger, RequestTrigger};
use crate::store::JobRepository;

/// The ledger trigger an event stands for, if any.
pub fn request_trigger_for(event: &DomainEvent) -> Option<RequestTrigger> {
    match event {
        DomainEvent::MessageReceived { .. } => Some(RequestTrigger::Enqueued),
        DomainEvent::MessageHandled { .. } => Some(RequestTrigger::Succeeded),
        DomainEvent::MessageFailed { will_retry, .. } => Some(RequestTrigger::Failed {
            retryable: *will_retry,
        }),
        DomainEvent::MessageNotYetHandleable { .. } => Some(RequestTrigger::Deferred),
        DomainEvent::RemoteRequestAborted { .. } => Some(RequestTrigger::Superseded),
        _ => None,
    }
}

/// Moves ledger rows through their lifecycle as messages are processed.
pub struct RemoteRequestStateTracker {
    jobs: Arc<dyn JobRepository>,
    ledger: RemoteRequestLedger,
}

impl RemoteRequestStateTracker {
    pub fn new(jobs: Arc<dyn JobRepository>, ledger: RemoteRequestLedger) -> Self {
        Self { jobs, ledger }
    }
}

impl EventSubscriber for RemoteRequestStateTracker {
    fn name(&self) -> &'static str {
        "remote-request-state-tracker"
    }

    fn subscriptions(&self) -> Vec<(EventKind, Priority)> {
        vec![
            (EventKind::MessageReceived, Priority::TRACK),
            (EventKind::MessageHandled, Priority::TRACK),
            (EventKind::MessageFailed, Priority::TRACK),
            (EventKind::MessageNotYetHandleable, Priority::TRACK),
            (EventKind::RemoteRequestAborted, Priority::TRACK),
        ]
    }

    fn handle(&self, event: &DomainEvent) -> Result<()> {
        let Some(trigger) = request_trigger_for(event) else {
            return Ok(());
        };
        if !job_exists(self.jobs.as_ref(), self.name(), event)? {
            return Ok(());
        }

        let request = match event {
            DomainEvent::MessageReceived { message } => {
                Some(self.ledger.find_or_create(&message.key())?)
            }
            DomainEvent::MessageHandled { message }
            | DomainEvent::MessageFailed { message, .. }
            | DomainEvent::MessageNotYetHandleable { message, .. } => {
                self.ledger.find(&message.key())?
            }
            DomainEvent::RemoteRequestAborted {
                job_id,
                request_type,
            } => self
                .ledger
                .find_newest(job_id, *request_type)?
                .filter(|request| request.state.is_in_flight()),
            _ => None,
        };

        let Some(mut request) = request else {
            debug!(job_id = event.job_id(), ?trigger, "no remote request to update");
            return Ok(());
        };
        self.ledger.apply(&mut request, trigger)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{MessageKind, RemoteRequestMessage};
    use crate::mutator::test_support::repositories;
    use crate::remote_request::{
        RemoteRequestError, RemoteRequestType, RemoteServiceError, RequestState,
    };

    fn tracker() -> (RemoteRequestLedger, RemoteRequestStateTracker) {
        let (_, repos) = repositories();
        let ledger = RemoteRequestLedger::new(repos.remote_requests.clone());
        (ledger.clone(), RemoteRequestStateTracker::new(repos.jobs, ledger))
    }

    fn message(job_id: &str, index: u32) -> RemoteRequestMessage {
        let mut message = RemoteRequestMessage::new(job_id, MessageKind::CreateMachine);
        message.index = index;
        message
    }

    fn failed(will_retry: bool) -> DomainEvent {
        let message = message("job-1", 0);
        DomainEvent::MessageFailed {
            error: RemoteRequestError::new(message.key(), RemoteServiceError::http(503, "")),
            message,
            will_retry,
        }
    }

    fn state_of(ledger: &RemoteRequestLedger, index: u32) -> Option<RequestState> {
        ledger
            .find(&message("job-1", index).key())
            .unwrap()
            .map(|request| request.state)
    }

    #[test]
    fn maps_events_to_triggers() {
        let received = DomainEvent::MessageReceived {
            message: message("job-1", 0),
        };
        assert_eq!(request_trigger_for(&received), Some(RequestTrigger::Enqueued));
        assert_eq!(
            request_trigger_for(&failed(true)),
            Some(RequestTrigger::Failed { retryable: true })
        );
        assert_eq!(
            request_trigger_for(&failed(false)),
            Some(RequestTrigger::Failed { retryable: false })
        );
        assert_eq!(
            request_trigger_for(&DomainEvent::RemoteRequestAborted {
                job_id: "job-1".into(),
                request_type: RemoteRequestType::MACHINE_CREATE,
            }),
            Some(RequestTrigger::Superseded)
        );
        assert_eq!(
            request_trigger_for(&DomainEvent::JobCreated {
                job_id: "job-1".into()
            }),
            None
        );
    }

    #[test]
    fn received_creates_row_then_handled_succeeds_it() -> Result<()> {
        let (ledger, tracker) = tracker();

        tracker.handle(&DomainEvent::MessageReceived {
            message: message("job-1", 0),
        })?;
        assert_eq!(state_of(&ledger, 0), Some(RequestState::Requesting));

        tracker.handle(&DomainEvent::MessageHandled {
            message: message("job-1", 0),
        })?;
        assert_eq!(state_of(&ledger, 0), Some(RequestState::Succeeded));
        Ok(())
    }

    #[test]
    fn retryable_failure_halts_and_final_failure_fails() -> Result<()> {
        let (ledger, tracker) = tracker();
        let received = DomainEvent::MessageReceived {
            message: message("job-1", 0),
        };

        tracker.handle(&received)?;
        tracker.handle(&failed(true))?;
        assert_eq!(state_of(&ledger, 0), Some(RequestState::Halted));

        tracker.handle(&received)?;
        tracker.handle(&failed(false))?;
        assert_eq!(state_of(&ledger, 0), Some(RequestState::Failed));

        // Terminal rows are never reopened.
        tracker.handle(&received)?;
        assert_eq!(state_of(&ledger, 0), Some(RequestState::Failed));
        Ok(())
    }

    #[test]
    fn not_yet_handleable_returns_row_to_pending() -> Result<()> {
        let (ledger, tracker) = tracker();
        tracker.handle(&DomainEvent::MessageReceived {
            message: message("job-1", 0),
        })?;
        tracker.handle(&DomainEvent::MessageNotYetHandleable {
            message: message("job-1", 0),
            reason: "machine has no ip".into(),
        })?;
        assert_eq!(state_of(&ledger, 0), Some(RequestState::Pending));
        Ok(())
    }

    #[test]
    fn outcome_without_row_is_ignored() -> Result<()> {
        let (ledger, tracker) = tracker();
        tracker.handle(&DomainEvent::MessageHandled {
            message: message("job-1", 3),
        })?;
        assert_eq!(state_of(&ledger, 3), None);
        Ok(())
    }

    #[test]
    fn abort_closes_newest_in_flight_row_only() -> Result<()> {
        let (ledger, tracker) = tracker();
        let aborted = DomainEvent::RemoteRequestAborted {
            job_id: "job-1".into(),
            request_type: RemoteRequestType::MACHINE_CREATE,
        };

        tracker.handle(&aborted)?;
        assert_eq!(state_of(&ledger, 0), None);

        let mut request = ledger.create_next("job-1", RemoteRequestType::MACHINE_CREATE)?;
        ledger.set_state(&mut request, RequestState::Halted)?;
        tracker.handle(&aborted)?;
        assert_eq!(state_of(&ledger, 0), Some(RequestState::Aborted));

        let mut request = ledger.create_next("job-1", RemoteRequestType::MACHINE_CREATE)?;
        ledger.set_state(&mut request, RequestState::Succeeded)?;
        tracker.handle(&aborted)?;
        assert_eq!(state_of(&ledger, 1), Some(RequestState::Succeeded));
        Ok(())
    }

    #[test]
    fn unknown_job_is_ignored() -> Result<()> {
        let (ledger, tracker) = tracker();
        tracker.handle(&DomainEvent::MessageReceived {
            message: message("job-404", 0),
        })?;
        assert!(ledger.find(&message("job-404", 0).key())?.is_none());
        Ok(())
    }
}
