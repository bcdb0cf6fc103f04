use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use tracing::trace;

use super::services::{RemoteServices, ResultsJobStatus, ServiceResult, WorkerJobRequest};
use crate::entity::{
    ComponentState, Machine, MachineStateCategory, MetaState, RemoteMachine, ResultsJob,
    SerializedSuite, WorkerState,
};
use crate::event::SerializedSuiteSnapshot;
use crate::job::{Component, Job};
use crate::message::MessageKind;
use crate::remote_request::RemoteServiceError;

const DEFAULT_POLLS_UNTIL_READY: u32 = 2;
const DEFAULT_RESULTS_JOB_EXPIRY_POLLS: u32 = 20;

#[derive(Debug, Clone)]
struct InjectedFailure {
    error: RemoteServiceError,
    /// `None` fails every call.
    remaining: Option<u32>,
}

#[derive(Debug, Default)]
struct Progress {
    suite_polls: u32,
    machine_polls: u32,
    worker_polls: u32,
    results_job_polls: u32,
    worker_ended: bool,
}

#[derive(Debug, Default)]
struct SimulationState {
    progress: HashMap<String, Progress>,
    failures: HashMap<MessageKind, InjectedFailure>,
    calls: HashMap<MessageKind, u32>,
}

/// Deterministic in-process stand-ins for the remote collaborators.
///
/// Every resource becomes ready after a fixed number of polls. Failures can
/// be injected per message kind, either for a number of calls or for good.
#[derive(Debug)]
pub struct SimulatedServices {
    polls_until_ready: u32,
    results_job_expiry_polls: u32,
    state: Mutex<SimulationState>,
}

impl Default for SimulatedServices {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedServices {
    pub fn new() -> Self {
        Self {
            polls_until_ready: DEFAULT_POLLS_UNTIL_READY,
            results_job_expiry_polls: DEFAULT_RESULTS_JOB_EXPIRY_POLLS,
            state: Mutex::new(SimulationState::default()),
        }
    }

    #[must_use]
    pub fn with_polls_until_ready(mut self, polls: u32) -> Self {
        self.polls_until_ready = polls.max(1);
        self
    }

    /// Makes the next `times` calls of `kind` fail with `error`.
    pub fn fail(&self, kind: MessageKind, error: RemoteServiceError, times: u32) {
        self.lock().failures.insert(
            kind,
            InjectedFailure {
                error,
                remaining: Some(times),
            },
        );
    }

    pub fn fail_always(&self, kind: MessageKind, error: RemoteServiceError) {
        self.lock().failures.insert(
            kind,
            InjectedFailure {
                error,
                remaining: None,
            },
        );
    }

    /// Permanently breaks the create call of `component` with a typical error.
    pub fn fail_component(&self, component: Component) {
        let (kind, error) = match component {
            Component::ResultsJob => (
                MessageKind::CreateResultsJob,
                RemoteServiceError::http(503, "Service Unavailable"),
            ),
            Component::SerializedSuite => (
                MessageKind::CreateSerializedSuite,
                RemoteServiceError::transport(28, "operation timed out"),
            ),
            Component::Machine => (
                MessageKind::CreateMachine,
                RemoteServiceError::http(500, "Internal Server Error"),
            ),
            Component::WorkerJob => (
                MessageKind::StartWorkerJob,
                RemoteServiceError::transport(6, "could not resolve host"),
            ),
        };
        self.fail_always(kind, error);
    }

    /// Number of calls made for `kind`, failed ones included.
    pub fn calls(&self, kind: MessageKind) -> u32 {
        self.lock().calls.get(&kind).copied().unwrap_or(0)
    }

    fn lock(&self) -> MutexGuard<'_, SimulationState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Counts the call and returns an injected failure, if one is armed.
    fn enter(
        &self,
        kind: MessageKind,
        job_id: &str,
    ) -> ServiceResult<MutexGuard<'_, SimulationState>> {
        let mut state = self.lock();
        *state.calls.entry(kind).or_default() += 1;
        trace!(?kind, job_id, "simulated remote call");

        if let Some(failure) = state.failures.get_mut(&kind) {
            let error = failure.error.clone();
            match failure.remaining {
                None => return Err(error),
                Some(0) => {}
                Some(ref mut remaining) => {
                    *remaining -= 1;
                    return Err(error);
                }
            }
        }
        Ok(state)
    }
}

fn remote_machine(
    job_id: &str,
    state: &str,
    category: MachineStateCategory,
    ip: Option<&str>,
) -> RemoteMachine {
    RemoteMachine {
        id: job_id.to_string(),
        state: state.to_string(),
        state_category: category,
        ip_addresses: ip.map(str::to_string).into_iter().collect(),
        has_failed_state: false,
        has_end_state: category == MachineStateCategory::End,
    }
}

impl RemoteServices for SimulatedServices {
    async fn create_results_job(&self, job: &Job) -> ServiceResult<ResultsJob> {
        self.enter(MessageKind::CreateResultsJob, &job.id)?;
        Ok(ResultsJob::new(
            job.id.as_str(),
            format!("results-token-{}", job.id),
            "awaiting-events",
        ))
    }

    async fn get_results_job_state(
        &self,
        results_job: &ResultsJob,
    ) -> ServiceResult<ResultsJobStatus> {
        let mut state = self.enter(MessageKind::GetResultsJobState, &results_job.job_id)?;
        let progress = state.progress.entry(results_job.job_id.clone()).or_default();
        progress.results_job_polls += 1;

        let status = if progress.worker_ended {
            ResultsJobStatus {
                state: "complete".into(),
                end_state: Some("complete".into()),
            }
        } else if progress.results_job_polls >= self.results_job_expiry_polls {
            ResultsJobStatus {
                state: "expired".into(),
                end_state: Some("expired".into()),
            }
        } else {
            ResultsJobStatus {
                state: "awaiting-events".into(),
                end_state: None,
            }
        };
        Ok(status)
    }

    async fn create_serialized_suite(&self, job: &Job) -> ServiceResult<SerializedSuiteSnapshot> {
        self.enter(MessageKind::CreateSerializedSuite, &job.id)?;
        Ok(SerializedSuiteSnapshot {
            id: format!("serialized-suite-{}", job.id),
            state: "requested".into(),
            meta_state: MetaState::default(),
        })
    }

    async fn get_serialized_suite(
        &self,
        serialized_suite: &SerializedSuite,
    ) -> ServiceResult<SerializedSuiteSnapshot> {
        let mut state = self.enter(MessageKind::GetSerializedSuite, &serialized_suite.job_id)?;
        let progress = state.progress.entry(serialized_suite.job_id.clone()).or_default();
        progress.suite_polls += 1;

        let (suite_state, meta_state) = if progress.suite_polls >= self.polls_until_ready {
            ("prepared", MetaState::new(true, true))
        } else {
            ("preparing", MetaState::default())
        };
        Ok(SerializedSuiteSnapshot {
            id: serialized_suite.serialized_suite_id.clone(),
            state: suite_state.into(),
            meta_state,
        })
    }

    async fn create_machine(&self, job: &Job) -> ServiceResult<RemoteMachine> {
        self.enter(MessageKind::CreateMachine, &job.id)?;
        Ok(remote_machine(
            &job.id,
            "create/requested",
            MachineStateCategory::PreActive,
            None,
        ))
    }

    async fn get_machine(&self, machine: &Machine) -> ServiceResult<RemoteMachine> {
        let mut state = self.enter(MessageKind::GetMachine, &machine.id)?;
        let progress = state.progress.entry(machine.id.clone()).or_default();
        progress.machine_polls += 1;

        if machine.state_category == MachineStateCategory::Ending {
            return Ok(remote_machine(
                &machine.id,
                "delete/deleted",
                MachineStateCategory::End,
                None,
            ));
        }
        if progress.machine_polls >= self.polls_until_ready {
            let ip = format!("10.0.0.{}", progress.machine_polls % 250 + 1);
            return Ok(remote_machine(
                &machine.id,
                "up/active",
                MachineStateCategory::Active,
                Some(&ip),
            ));
        }
        Ok(remote_machine(&machine.id, "up/started", MachineStateCategory::PreActive, None))
    }

    async fn terminate_machine(&self, machine: &Machine) -> ServiceResult<RemoteMachine> {
        self.enter(MessageKind::TerminateMachine, &machine.id)?;
        Ok(remote_machine(
            &machine.id,
            "delete/requested",
            MachineStateCategory::Ending,
            machine.ip.as_deref(),
        ))
    }

    async fn start_worker_job(&self, request: WorkerJobRequest<'_>) -> ServiceResult<()> {
        self.enter(MessageKind::StartWorkerJob, &request.job.id)?;
        trace!(
            job_id = %request.job.id,
            machine_ip = request.machine_ip,
            serialized_suite = %request.serialized_suite.serialized_suite_id,
            "worker job accepted"
        );
        Ok(())
    }

    async fn get_worker_state(&self, machine: &Machine) -> ServiceResult<WorkerState> {
        let mut state = self.enter(MessageKind::GetWorkerJobState, &machine.id)?;
        let polls_until_ready = self.polls_until_ready;
        let progress = state.progress.entry(machine.id.clone()).or_default();
        progress.worker_polls += 1;

        let done = progress.worker_polls >= polls_until_ready;
        progress.worker_ended |= done;
        let component = |running: &str, finished: &str| {
            if done {
                ComponentState::new(finished, true)
            } else {
                ComponentState::new(running, false)
            }
        };
        Ok(WorkerState {
            application: component("started", "end"),
            compilation: component("running", "complete"),
            execution: component("running", "complete"),
            event_delivery: component("running", "complete"),
        })
    }
}
