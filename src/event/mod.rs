//! Domain events and their delivery to subscribers.

mod outbox;
mod subscriber;

pub use outbox::{EventOutbox, EventSink};
pub use subscriber::{EventSubscriber, Priority, SubscriberTable};

use serde::Serialize;

use crate::entity::{MetaState, RemoteMachine, ResultsJob, WorkerState};
use crate::message::RemoteRequestMessage;
use crate::remote_request::{RemoteRequestError, RemoteRequestType};

/// Everything that can happen while preparing a job.
#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    JobCreated {
        job_id: String,
    },
    RemoteRequestMessageCreated {
        message: RemoteRequestMessage,
    },
    MessageReceived {
        message: RemoteRequestMessage,
    },
    MessageHandled {
        message: RemoteRequestMessage,
    },
    MessageFailed {
        message: RemoteRequestMessage,
        error: RemoteRequestError,
        will_retry: bool,
    },
    MessageNotYetHandleable {
        message: RemoteRequestMessage,
        reason: String,
    },
    /// Further attempts of this type are pointless; close the in-flight one.
    RemoteRequestAborted {
        job_id: String,
        request_type: RemoteRequestType,
    },
    ResultsJobCreated {
        job_id: String,
        results_job: ResultsJob,
    },
    ResultsJobStateRetrieved {
        job_id: String,
        state: String,
        end_state: Option<String>,
    },
    SerializedSuiteCreated {
        job_id: String,
        serialized_suite: SerializedSuiteSnapshot,
    },
    SerializedSuiteRetrieved {
        job_id: String,
        serialized_suite: SerializedSuiteSnapshot,
    },
    MachineCreationRequested {
        job_id: String,
        machine: RemoteMachine,
    },
    MachineRetrieved {
        job_id: String,
        machine: RemoteMachine,
    },
    MachineTerminationRequested {
        job_id: String,
        machine: RemoteMachine,
    },
    WorkerJobStarted {
        job_id: String,
    },
    WorkerStateRetrieved {
        job_id: String,
        state: WorkerState,
    },
}

/// Serialized suite as reported by the suite service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SerializedSuiteSnapshot {
    pub id: String,
    pub state: String,
    pub meta_state: MetaState,
}

/// Discriminant of [`DomainEvent`], used to key subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    JobCreated,
    RemoteRequestMessageCreated,
    MessageReceived,
    MessageHandled,
    MessageFailed,
    MessageNotYetHandleable,
    RemoteRequestAborted,
    ResultsJobCreated,
    ResultsJobStateRetrieved,
    SerializedSuiteCreated,
    SerializedSuiteRetrieved,
    MachineCreationRequested,
    MachineRetrieved,
    MachineTerminationRequested,
    WorkerJobStarted,
    WorkerStateRetrieved,
}

impl DomainEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            DomainEvent::JobCreated { .. } => EventKind::JobCreated,
            DomainEvent::RemoteRequestMessageCreated { .. } => EventKind::RemoteRequestMessageCreated,
            DomainEvent::MessageReceived { .. } => EventKind::MessageReceived,
            DomainEvent::MessageHandled { .. } => EventKind::MessageHandled,
            DomainEvent::MessageFailed { .. } => EventKind::MessageFailed,
            DomainEvent::MessageNotYetHandleable { .. } => EventKind::MessageNotYetHandleable,
            DomainEvent::RemoteRequestAborted { .. } => EventKind::RemoteRequestAborted,
            DomainEvent::ResultsJobCreated { .. } => EventKind::ResultsJobCreated,
            DomainEvent::ResultsJobStateRetrieved { .. } => EventKind::ResultsJobStateRetrieved,
            DomainEvent::SerializedSuiteCreated { .. } => EventKind::SerializedSuiteCreated,
            DomainEvent::SerializedSuiteRetrieved { .. } => EventKind::SerializedSuiteRetrieved,
            DomainEvent::MachineCreationRequested { .. } => EventKind::MachineCreationRequested,
            DomainEvent::MachineRetrieved { .. } => EventKind::MachineRetrieved,
            DomainEvent::MachineTerminationRequested { .. } => EventKind::MachineTerminationRequested,
            DomainEvent::WorkerJobStarted { .. } => EventKind::WorkerJobStarted,
            DomainEvent::WorkerStateRetrieved { .. } => EventKind::WorkerStateRetrieved,
        }
    }

    pub fn job_id(&self) -> &str {
        match self {
            DomainEvent::RemoteRequestMessageCreated { message }
            | DomainEvent::MessageReceived { message }
            | DomainEvent::MessageHandled { message }
            | DomainEvent::MessageFailed { message, .. }
            | DomainEvent::MessageNotYetHandleable { message, .. } => &message.job_id,
            DomainEvent::JobCreated { job_id }
            | DomainEvent::RemoteRequestAborted { job_id, .. }
            | DomainEvent::ResultsJobCreated { job_id, .. }
            | DomainEvent::ResultsJobStateRetrieved { job_id, .. }
            | DomainEvent::SerializedSuiteCreated { job_id, .. }
            | DomainEvent::SerializedSuiteRetrieved { job_id, .. }
            | DomainEvent::MachineCreationRequested { job_id, .. }
            | DomainEvent::MachineRetrieved { job_id, .. }
            | DomainEvent::MachineTerminationRequested { job_id, .. }
            | DomainEvent::WorkerJobStarted { job_id }
            | DomainEvent::WorkerStateRetrieved { job_id, .. } => job_id,
        }
    }
}
