//! Decides the next remote action for a job from what just happened.
//!
//! The flow never calls anything remote itself. It only hands messages to the
//! dispatch guard, so an action it asks for twice is still sent at most once.

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::PollConfig;
use crate::dispatch::{DispatchOutcome, JobRemoteRequestMessageDispatcher};
use crate::error::Result;
use crate::event::{DomainEvent, EventKind, EventSink, EventSubscriber, Priority};
use crate::message::{MessageKind, RemoteRequestMessage, Stamp};
use crate::remote_request::RemoteRequestType;
use crate::store::MachineRepository;

pub struct PreparationFlow {
    dispatcher: Arc<JobRemoteRequestMessageDispatcher>,
    machines: Arc<dyn MachineRepository>,
    events: Arc<dyn EventSink>,
    poll: PollConfig,
}

impl PreparationFlow {
    pub fn new(
        dispatcher: Arc<JobRemoteRequestMessageDispatcher>,
        machines: Arc<dyn MachineRepository>,
        events: Arc<dyn EventSink>,
        poll: PollConfig,
    ) -> Self {
        Self {
            dispatcher,
            machines,
            events,
            poll,
        }
    }

    fn send(&self, job_id: &str, kind: MessageKind) -> Result<DispatchOutcome> {
        let outcome = self
            .dispatcher
            .dispatch(RemoteRequestMessage::new(job_id, kind), Vec::new())?;
        debug!(job_id, ?kind, ?outcome, "next action");
        Ok(outcome)
    }

    fn poll(&self, job_id: &str, kind: MessageKind) -> Result<DispatchOutcome> {
        let delay = self.poll.delay_for(kind.request_type().component);
        let outcome = self.dispatcher.dispatch(
            RemoteRequestMessage::new(job_id, kind),
            vec![Stamp::Delay(delay)],
        )?;
        debug!(job_id, ?kind, delay_ms = delay.as_millis() as u64, ?outcome, "polling");
        Ok(outcome)
    }

    fn abort(&self, job_id: &str, request_types: &[RemoteRequestType]) {
        for request_type in request_types {
            info!(job_id, %request_type, "aborting remote request");
            self.events.push(DomainEvent::RemoteRequestAborted {
                job_id: job_id.to_string(),
                request_type: *request_type,
            });
        }
    }

    fn on_final_failure(&self, job_id: &str, kind: MessageKind) {
        match kind {
            MessageKind::CreateSerializedSuite => self.abort(
                job_id,
                &[
                    RemoteRequestType::MACHINE_CREATE,
                    RemoteRequestType::WORKER_JOB_CREATE,
                ],
            ),
            MessageKind::CreateMachine => {
                self.abort(job_id, &[RemoteRequestType::WORKER_JOB_CREATE])
            }
            _ => {}
        }
    }
}

impl EventSubscriber for PreparationFlow {
    fn name(&self) -> &'static str {
        "preparation-flow"
    }

    fn subscriptions(&self) -> Vec<(EventKind, Priority)> {
        [
            EventKind::JobCreated,
            EventKind::MessageFailed,
            EventKind::ResultsJobCreated,
            EventKind::ResultsJobStateRetrieved,
            EventKind::SerializedSuiteCreated,
            EventKind::SerializedSuiteRetrieved,
            EventKind::MachineCreationRequested,
            EventKind::MachineRetrieved,
            EventKind::WorkerJobStarted,
            EventKind::WorkerStateRetrieved,
        ]
        .into_iter()
        .map(|kind| (kind, Priority::FLOW))
        .collect()
    }

    fn handle(&self, event: &DomainEvent) -> Result<()> {
        match event {
            DomainEvent::JobCreated { job_id } => {
                self.send(job_id, MessageKind::CreateResultsJob)?;
                self.send(job_id, MessageKind::CreateSerializedSuite)?;
            }
            DomainEvent::MessageFailed {
                message,
                will_retry: false,
                ..
            } => self.on_final_failure(&message.job_id, message.kind),
            DomainEvent::ResultsJobCreated { job_id, .. } => {
                self.poll(job_id, MessageKind::GetResultsJobState)?;
            }
            DomainEvent::ResultsJobStateRetrieved {
                job_id, end_state, ..
            } => {
                if end_state.is_none() {
                    self.poll(job_id, MessageKind::GetResultsJobState)?;
                } else if self.machines.find(job_id)?.is_some() {
                    self.send(job_id, MessageKind::TerminateMachine)?;
                }
            }
            DomainEvent::SerializedSuiteCreated { job_id, .. } => {
                self.poll(job_id, MessageKind::GetSerializedSuite)?;
            }
            DomainEvent::SerializedSuiteRetrieved {
                job_id,
                serialized_suite,
            } => {
                let meta_state = serialized_suite.meta_state;
                if !meta_state.ended {
                    self.poll(job_id, MessageKind::GetSerializedSuite)?;
                } else if meta_state.succeeded {
                    self.send(job_id, MessageKind::CreateMachine)?;
                } else {
                    self.abort(
                        job_id,
                        &[
                            RemoteRequestType::MACHINE_CREATE,
                            RemoteRequestType::WORKER_JOB_CREATE,
                        ],
                    );
                }
            }
            DomainEvent::MachineCreationRequested { job_id, .. } => {
                self.poll(job_id, MessageKind::GetMachine)?;
            }
            DomainEvent::MachineRetrieved { job_id, machine } => {
                if machine.has_failed_state {
                    self.abort(job_id, &[RemoteRequestType::WORKER_JOB_CREATE]);
                } else if machine.is_active() {
                    self.send(job_id, MessageKind::StartWorkerJob)?;
                } else if !machine.has_end_state {
                    self.poll(job_id, MessageKind::GetMachine)?;
                }
            }
            DomainEvent::WorkerJobStarted { job_id } => {
                self.poll(job_id, MessageKind::GetWorkerJobState)?;
            }
            DomainEvent::WorkerStateRetrieved { job_id, state } => {
                if !state.has_ended() {
                    self.poll(job_id, MessageKind::GetWorkerJobState)?;
                }
            }
            _ => {}
        }
        Ok(())
    }
}
