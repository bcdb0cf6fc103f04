use crate::entity::{Machine, RemoteMachine, ResultsJob, SerializedSuite, WorkerState};
use crate::event::SerializedSuiteSnapshot;
use crate::job::Job;
use crate::remote_request::RemoteServiceError;

pub type ServiceResult<T> = std::result::Result<T, RemoteServiceError>;

/// State of a results job as reported by the results service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultsJobStatus {
    pub state: String,
    pub end_state: Option<String>,
}

/// Everything a worker needs to run a job.
#[derive(Debug, Clone, Copy)]
pub struct WorkerJobRequest<'a> {
    pub job: &'a Job,
    pub machine_ip: &'a str,
    pub serialized_suite: &'a SerializedSuite,
    /// Where the worker reports events, when the results job exists.
    pub results_job: Option<&'a ResultsJob>,
}

/// The four remote collaborators a job is prepared against.
///
/// One method per remote call. Implementations report failures as
/// [`RemoteServiceError`] and never retry on their own.
#[allow(async_fn_in_trait)]
pub trait RemoteServices {
    async fn create_results_job(&self, job: &Job) -> ServiceResult<ResultsJob>;

    async fn get_results_job_state(
        &self,
        results_job: &ResultsJob,
    ) -> ServiceResult<ResultsJobStatus>;

    async fn create_serialized_suite(&self, job: &Job) -> ServiceResult<SerializedSuiteSnapshot>;

    async fn get_serialized_suite(
        &self,
        serialized_suite: &SerializedSuite,
    ) -> ServiceResult<SerializedSuiteSnapshot>;

    async fn create_machine(&self, job: &Job) -> ServiceResult<RemoteMachine>;

    async fn get_machine(&self, machine: &Machine) -> ServiceResult<RemoteMachine>;

    async fn terminate_machine(&self, machine: &Machine) -> ServiceResult<RemoteMachine>;

    async fn start_worker_job(&self, request: WorkerJobRequest<'_>) -> ServiceResult<()>;

    /// Asks the worker on `machine` (reached through its IP) for its state.
    async fn get_worker_state(&self, machine: &Machine) -> ServiceResult<WorkerState>;
}
