//! Executes remote request messages against the remote collaborators.
//!
//! [`MessageHandler`] is the boundary between the coordinator and the
//! outside world. It makes at most one remote call per envelope and turns
//! the answer into domain events. Missing prerequisites and retryable
//! failures send the envelope again after a delay. Envelopes whose ledger
//! attempt has already settled are skipped.

mod services;
mod simulated;

pub use services::{RemoteServices, ResultsJobStatus, ServiceResult, WorkerJobRequest};
pub use simulated::SimulatedServices;

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::entity::MachineStateCategory;
use crate::error::Result;
use crate::event::{DomainEvent, EventSink};
use crate::job::Job;
use crate::message::{Envelope, MessageChannel, MessageKind};
use crate::remote_request::{RemoteRequestError, RemoteServiceError, RequestState};
use crate::store::Repositories;

/// How failed and not-yet-possible calls are sent again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries per ledger attempt before the failure is final.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub not_ready_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            not_ready_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    /// Calculate the delay for a given retry attempt using exponential backoff.
    /// delay = base_delay * 2^(attempt - 1)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }

    /// Whether a call that failed with `error` on retry `attempt` is tried again.
    pub fn should_retry(&self, error: &RemoteServiceError, attempt: u32) -> bool {
        error.is_retryable() && attempt < self.max_retries
    }
}

/// What happened to one envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleOutcome {
    Handled,
    /// Prerequisites are missing; the envelope was sent again after a delay.
    NotReady { reason: String },
    /// The call failed and was sent again as retry `attempt`.
    Retrying { attempt: u32, delay: Duration },
    /// The call failed for good.
    Failed,
    /// The ledger attempt had already settled; nothing was called.
    Skipped { state: RequestState },
    JobNotFound,
}

pub struct MessageHandler<S> {
    repositories: Repositories,
    services: S,
    channel: Arc<dyn MessageChannel>,
    events: Arc<dyn EventSink>,
    policy: RetryPolicy,
}

impl<S: RemoteServices> MessageHandler<S> {
    pub fn new(
        repositories: Repositories,
        services: S,
        channel: Arc<dyn MessageChannel>,
        events: Arc<dyn EventSink>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            repositories,
            services,
            channel,
            events,
            policy,
        }
    }

    pub fn services(&self) -> &S {
        &self.services
    }

    /// Runs the remote call `envelope` asks for and raises the resulting events.
    pub async fn handle(&self, envelope: Envelope) -> Result<HandleOutcome> {
        let message = &envelope.message;
        let Some(job) = self.repositories.jobs.find(&message.job_id)? else {
            debug!(request = %message.key(), "dropping message for unknown job");
            return Ok(HandleOutcome::JobNotFound);
        };

        if let Some(request) = self.repositories.remote_requests.find(&message.key())? {
            if request.state.is_terminal() {
                debug!(request = %message.key(), state = %request.state, "skipping settled request");
                return Ok(HandleOutcome::Skipped {
                    state: request.state,
                });
            }
        }

        self.events.push(DomainEvent::MessageReceived {
            message: message.clone(),
        });

        match self.execute(&job, message.kind).await? {
            Ok(events) => {
                for event in events {
                    self.events.push(event);
                }
                self.events.push(DomainEvent::MessageHandled {
                    message: message.clone(),
                });
                debug!(request = %message.key(), "message handled");
                Ok(HandleOutcome::Handled)
            }
            Err(RemoteServiceError::NotReady { reason }) => {
                info!(request = %message.key(), %reason, "message not yet handleable");
                self.events.push(DomainEvent::MessageNotYetHandleable {
                    message: message.clone(),
                    reason: reason.clone(),
                });
                self.channel.send(envelope.after(self.policy.not_ready_delay))?;
                Ok(HandleOutcome::NotReady { reason })
            }
            Err(source) => {
                let attempt = envelope.retry_attempt();
                let will_retry = self.policy.should_retry(&source, attempt);
                let error = RemoteRequestError::new(message.key(), source);
                warn!(%error, attempt, will_retry, "remote request failed");
                self.events.push(DomainEvent::MessageFailed {
                    message: message.clone(),
                    error,
                    will_retry,
                });

                if !will_retry {
                    return Ok(HandleOutcome::Failed);
                }
                let next = attempt + 1;
                let delay = self.policy.delay_for_attempt(next);
                self.channel.send(envelope.for_retry(next, delay))?;
                Ok(HandleOutcome::Retrying {
                    attempt: next,
                    delay,
                })
            }
        }
    }

    /// Makes the call. The outer error is local, the inner one remote.
    async fn execute(&self, job: &Job, kind: MessageKind) -> Result<ServiceResult<Vec<DomainEvent>>> {
        let job_id = job.id.clone();
        let repos = &self.repositories;

        let outcome = match kind {
            MessageKind::CreateResultsJob => self
                .services
                .create_results_job(job)
                .await
                .map(|results_job| vec![DomainEvent::ResultsJobCreated { job_id, results_job }]),

            MessageKind::GetResultsJobState => {
                let Some(results_job) = repos.results_jobs.find(&job.id)? else {
                    return Ok(not_ready("results job has not been created"));
                };
                self.services
                    .get_results_job_state(&results_job)
                    .await
                    .map(|status| {
                        vec![DomainEvent::ResultsJobStateRetrieved {
                            job_id,
                            state: status.state,
                            end_state: status.end_state,
                        }]
                    })
            }

            MessageKind::CreateSerializedSuite => self
                .services
                .create_serialized_suite(job)
                .await
                .map(|serialized_suite| {
                    vec![DomainEvent::SerializedSuiteCreated {
                        job_id,
                        serialized_suite,
                    }]
                }),

            MessageKind::GetSerializedSuite => {
                let Some(suite) = repos.serialized_suites.find(&job.id)? else {
                    return Ok(not_ready("serialized suite has not been created"));
                };
                self.services
                    .get_serialized_suite(&suite)
                    .await
                    .map(|serialized_suite| {
                        vec![DomainEvent::SerializedSuiteRetrieved {
                            job_id,
                            serialized_suite,
                        }]
                    })
            }

            MessageKind::CreateMachine => self
                .services
                .create_machine(job)
                .await
                .map(|machine| vec![DomainEvent::MachineCreationRequested { job_id, machine }]),

            MessageKind::GetMachine => {
                let Some(machine) = repos.machines.find(&job.id)? else {
                    return Ok(not_ready("machine has not been created"));
                };
                self.services
                    .get_machine(&machine)
                    .await
                    .map(|machine| vec![DomainEvent::MachineRetrieved { job_id, machine }])
            }

            MessageKind::TerminateMachine => {
                let Some(machine) = repos.machines.find(&job.id)? else {
                    return Ok(not_ready("machine has not been created"));
                };
                self.services
                    .terminate_machine(&machine)
                    .await
                    .map(|machine| vec![DomainEvent::MachineTerminationRequested { job_id, machine }])
            }

            MessageKind::StartWorkerJob => {
                let machine = repos.machines.find(&job.id)?;
                let Some((machine, machine_ip)) = machine
                    .filter(|machine| machine.state_category == MachineStateCategory::Active)
                    .and_then(|machine| machine.ip.clone().map(|ip| (machine, ip)))
                else {
                    return Ok(not_ready("machine is not active or has no ip"));
                };
                let Some(serialized_suite) = repos
                    .serialized_suites
                    .find(&job.id)?
                    .filter(|suite| suite.is_prepared())
                else {
                    return Ok(not_ready("serialized suite is not prepared"));
                };
                let results_job = repos.results_jobs.find(&job.id)?;
                debug!(job_id = %job.id, machine = %machine.id, "starting worker job");

                self.services
                    .start_worker_job(WorkerJobRequest {
                        job,
                        machine_ip: &machine_ip,
                        serialized_suite: &serialized_suite,
                        results_job: results_job.as_ref(),
                    })
                    .await
                    .map(|()| vec![DomainEvent::WorkerJobStarted { job_id }])
            }

            MessageKind::GetWorkerJobState => {
                let Some(machine) = repos
                    .machines
                    .find(&job.id)?
                    .filter(|machine| machine.ip.is_some())
                else {
                    return Ok(not_ready("machine has no ip"));
                };
                self.services
                    .get_worker_state(&machine)
                    .await
                    .map(|state| vec![DomainEvent::WorkerStateRetrieved { job_id, state }])
            }
        };
        Ok(outcome)
    }
}

fn not_ready<T>(reason: &str) -> ServiceResult<T> {
    Err(RemoteServiceError::not_ready(reason))
}
