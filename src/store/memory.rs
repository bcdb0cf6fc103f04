//! In-memory store for tests, the demo binary and single-process use.
//!
//! All state is lost when the process exits. Each entity kind sits behind
//! its own `RwLock`, so a write only ever blocks readers of the same kind.

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};

use super::{
    InsertOutcome, JobRepository, MachineRepository, RemoteRequestRepository,
    ResultsJobRepository, SerializedSuiteRepository, WorkerComponentStateRepository,
};
use crate::entity::{Machine, ResultsJob, SerializedSuite, WorkerComponentName, WorkerComponentState};
use crate::error::{CoordinatorError, Result};
use crate::job::Job;
use crate::remote_request::{RemoteRequest, RemoteRequestKey, RemoteRequestType};

#[derive(Debug, Default)]
pub struct InMemoryStore {
    jobs: RwLock<HashMap<String, Job>>,
    remote_requests: RwLock<BTreeMap<RemoteRequestKey, RemoteRequest>>,
    results_jobs: RwLock<HashMap<String, ResultsJob>>,
    serialized_suites: RwLock<HashMap<String, SerializedSuite>>,
    machines: RwLock<HashMap<String, Machine>>,
    worker_component_states: RwLock<BTreeMap<(String, WorkerComponentName), WorkerComponentState>>,
}

fn poison_err<T>(_: PoisonError<T>) -> CoordinatorError {
    CoordinatorError::storage("lock poisoned")
}

fn type_range(
    job_id: &str,
    request_type: RemoteRequestType,
) -> std::ops::RangeInclusive<RemoteRequestKey> {
    RemoteRequestKey::new(job_id, request_type, 0)..=RemoteRequestKey::new(job_id, request_type, u32::MAX)
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of ledger rows across all jobs.
    pub fn remote_request_count(&self) -> Result<usize> {
        let count = self.remote_requests.read().map_err(poison_err)?.len();
        Ok(count)
    }
}

impl JobRepository for InMemoryStore {
    fn find(&self, job_id: &str) -> Result<Option<Job>> {
        let jobs = self.jobs.read().map_err(poison_err)?;
        Ok(jobs.get(job_id).cloned())
    }

    fn save(&self, job: &Job) -> Result<()> {
        let mut jobs = self.jobs.write().map_err(poison_err)?;
        jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }
}

impl RemoteRequestRepository for InMemoryStore {
    fn find(&self, key: &RemoteRequestKey) -> Result<Option<RemoteRequest>> {
        let requests = self.remote_requests.read().map_err(poison_err)?;
        Ok(requests.get(key).cloned())
    }

    fn find_for_job_and_type(
        &self,
        job_id: &str,
        request_type: RemoteRequestType,
    ) -> Result<Vec<RemoteRequest>> {
        let requests = self.remote_requests.read().map_err(poison_err)?;
        Ok(requests
            .range(type_range(job_id, request_type))
            .map(|(_, request)| request.clone())
            .collect())
    }

    fn insert_if_absent(&self, request: &RemoteRequest) -> Result<InsertOutcome> {
        let mut requests = self.remote_requests.write().map_err(poison_err)?;
        let key = request.key();
        if requests.contains_key(&key) {
            return Ok(InsertOutcome::AlreadyExists);
        }
        requests.insert(key, request.clone());
        Ok(InsertOutcome::Inserted)
    }

    fn save(&self, request: &RemoteRequest) -> Result<()> {
        let mut requests = self.remote_requests.write().map_err(poison_err)?;
        requests.insert(request.key(), request.clone());
        Ok(())
    }

    fn remove(&self, key: &RemoteRequestKey) -> Result<bool> {
        let mut requests = self.remote_requests.write().map_err(poison_err)?;
        Ok(requests.remove(key).is_some())
    }

    fn remove_for_job_and_type(&self, job_id: &str, request_type: RemoteRequestType) -> Result<usize> {
        let mut requests = self.remote_requests.write().map_err(poison_err)?;
        let keys: Vec<_> = requests
            .range(type_range(job_id, request_type))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &keys {
            requests.remove(key);
        }
        Ok(keys.len())
    }
}

impl ResultsJobRepository for InMemoryStore {
    fn find(&self, job_id: &str) -> Result<Option<ResultsJob>> {
        let results_jobs = self.results_jobs.read().map_err(poison_err)?;
        Ok(results_jobs.get(job_id).cloned())
    }

    fn insert_if_absent(&self, results_job: &ResultsJob) -> Result<InsertOutcome> {
        let mut results_jobs = self.results_jobs.write().map_err(poison_err)?;
        if results_jobs.contains_key(&results_job.job_id) {
            return Ok(InsertOutcome::AlreadyExists);
        }
        results_jobs.insert(results_job.job_id.clone(), results_job.clone());
        Ok(InsertOutcome::Inserted)
    }

    fn save(&self, results_job: &ResultsJob) -> Result<()> {
        let mut results_jobs = self.results_jobs.write().map_err(poison_err)?;
        results_jobs.insert(results_job.job_id.clone(), results_job.clone());
        Ok(())
    }
}

impl SerializedSuiteRepository for InMemoryStore {
    fn find(&self, job_id: &str) -> Result<Option<SerializedSuite>> {
        let suites = self.serialized_suites.read().map_err(poison_err)?;
        Ok(suites.get(job_id).cloned())
    }

    fn insert_if_absent(&self, serialized_suite: &SerializedSuite) -> Result<InsertOutcome> {
        let mut suites = self.serialized_suites.write().map_err(poison_err)?;
        if suites.contains_key(&serialized_suite.job_id) {
            return Ok(InsertOutcome::AlreadyExists);
        }
        suites.insert(serialized_suite.job_id.clone(), serialized_suite.clone());
        Ok(InsertOutcome::Inserted)
    }

    fn save(&self, serialized_suite: &SerializedSuite) -> Result<()> {
        let mut suites = self.serialized_suites.write().map_err(poison_err)?;
        suites.insert(serialized_suite.job_id.clone(), serialized_suite.clone());
        Ok(())
    }
}

impl MachineRepository for InMemoryStore {
    fn find(&self, job_id: &str) -> Result<Option<Machine>> {
        let machines = self.machines.read().map_err(poison_err)?;
        Ok(machines.get(job_id).cloned())
    }

    fn save(&self, machine: &Machine) -> Result<()> {
        let mut machines = self.machines.write().map_err(poison_err)?;
        machines.insert(machine.id.clone(), machine.clone());
        Ok(())
    }
}

impl WorkerComponentStateRepository for InMemoryStore {
    fn find(&self, job_id: &str, name: WorkerComponentName) -> Result<Option<WorkerComponentState>> {
        let states = self.worker_component_states.read().map_err(poison_err)?;
        Ok(states.get(&(job_id.to_string(), name)).cloned())
    }

    fn find_for_job(&self, job_id: &str) -> Result<Vec<WorkerComponentState>> {
        let states = self.worker_component_states.read().map_err(poison_err)?;
        Ok(states
            .values()
            .filter(|state| state.job_id == job_id)
            .cloned()
            .collect())
    }

    fn save(&self, state: &WorkerComponentState) -> Result<()> {
        let mut states = self.worker_component_states.write().map_err(poison_err)?;
        states.insert((state.job_id.clone(), state.component_name), state.clone());
        Ok(())
    }
}
