//! Repositories for jobs, the remote request ledger and the result entities.
//!
//! Each repository is a narrow key-value view over one entity kind. Every
//! write touches a single row, so writes for different components of the
//! same job never conflict. [`memory::InMemoryStore`] implements all of them.

pub mod memory;

use std::sync::Arc;

use crate::entity::{Machine, ResultsJob, SerializedSuite, WorkerComponentName, WorkerComponentState};
use crate::error::Result;
use crate::job::Job;
use crate::remote_request::{RemoteRequest, RemoteRequestKey, RemoteRequestType};

/// Result of a create-if-absent write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// A row with the same identity already exists; nothing was written.
    AlreadyExists,
}

impl InsertOutcome {
    pub fn is_inserted(&self) -> bool {
        matches!(self, Self::Inserted)
    }
}

pub trait JobRepository: Send + Sync {
    fn find(&self, job_id: &str) -> Result<Option<Job>>;
    fn save(&self, job: &Job) -> Result<()>;
}

/// Storage for the remote request ledger.
///
/// `(job_id, request_type, index)` is unique: `insert_if_absent` must never
/// overwrite an existing row.
pub trait RemoteRequestRepository: Send + Sync {
    fn find(&self, key: &RemoteRequestKey) -> Result<Option<RemoteRequest>>;

    /// All attempts for (job, type), ordered by index ascending.
    fn find_for_job_and_type(
        &self,
        job_id: &str,
        request_type: RemoteRequestType,
    ) -> Result<Vec<RemoteRequest>>;

    fn insert_if_absent(&self, request: &RemoteRequest) -> Result<InsertOutcome>;

    fn save(&self, request: &RemoteRequest) -> Result<()>;

    fn remove(&self, key: &RemoteRequestKey) -> Result<bool>;

    /// Returns the number of rows removed.
    fn remove_for_job_and_type(&self, job_id: &str, request_type: RemoteRequestType) -> Result<usize>;
}

pub trait ResultsJobRepository: Send + Sync {
    fn find(&self, job_id: &str) -> Result<Option<ResultsJob>>;
    fn insert_if_absent(&self, results_job: &ResultsJob) -> Result<InsertOutcome>;
    fn save(&self, results_job: &ResultsJob) -> Result<()>;
}

pub trait SerializedSuiteRepository: Send + Sync {
    fn find(&self, job_id: &str) -> Result<Option<SerializedSuite>>;
    fn insert_if_absent(&self, serialized_suite: &SerializedSuite) -> Result<InsertOutcome>;
    fn save(&self, serialized_suite: &SerializedSuite) -> Result<()>;
}

pub trait MachineRepository: Send + Sync {
    fn find(&self, job_id: &str) -> Result<Option<Machine>>;
    fn save(&self, machine: &Machine) -> Result<()>;
}

pub trait WorkerComponentStateRepository: Send + Sync {
    fn find(&self, job_id: &str, name: WorkerComponentName) -> Result<Option<WorkerComponentState>>;

    /// Rows for a job, ordered by component name.
    fn find_for_job(&self, job_id: &str) -> Result<Vec<WorkerComponentState>>;

    fn save(&self, state: &WorkerComponentState) -> Result<()>;
}

/// Handles to every repository the coordinator reads or writes.
#[derive(Clone)]
pub struct Repositories {
    pub jobs: Arc<dyn JobRepository>,
    pub remote_requests: Arc<dyn RemoteRequestRepository>,
    pub results_jobs: Arc<dyn ResultsJobRepository>,
    pub serialized_suites: Arc<dyn SerializedSuiteRepository>,
    pub machines: Arc<dyn MachineRepository>,
    pub worker_component_states: Arc<dyn WorkerComponentStateRepository>,
}

impl Repositories {
    /// Backs every repository with one shared [`memory::InMemoryStore`].
    pub fn in_memory() -> Self {
        Self::from_store(Arc::new(memory::InMemoryStore::new()))
    }

    pub fn from_store(store: Arc<memory::InMemoryStore>) -> Self {
        Self {
            jobs: store.clone(),
            remote_requests: store.clone(),
            results_jobs: store.clone(),
            serialized_suites: store.clone(),
            machines: store.clone(),
            worker_component_states: store,
        }
    }
}
