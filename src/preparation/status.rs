use std::collections::BTreeMap;

use serde::Serialize;

use super::{
    ComponentPreparationFactory, PreparationState, PreparationStateDeriver, RequestStateProjection,
    reduce,
};
use crate::error::Result;
use crate::job::Component;
use crate::remote_request::{RemoteRequestFailure, RequestState};
use crate::store::Repositories;

/// The externally visible preparation status of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobPreparation {
    pub state: PreparationState,
    pub request_states: BTreeMap<Component, RequestState>,
    /// Only components that have failed appear here.
    pub failures: BTreeMap<Component, RemoteRequestFailure>,
}

/// Assembles factory → reducer → projection into a [`JobPreparation`].
#[derive(Clone)]
pub struct JobPreparationInspector {
    repositories: Repositories,
    factory: ComponentPreparationFactory,
    projection: RequestStateProjection,
}

impl JobPreparationInspector {
    pub fn new(repositories: Repositories) -> Self {
        Self {
            factory: ComponentPreparationFactory::new(PreparationStateDeriver::new(
                repositories.clone(),
            )),
            projection: RequestStateProjection::new(repositories.clone()),
            repositories,
        }
    }

    /// Returns `None` only when the job itself does not exist.
    pub fn inspect(&self, job_id: &str) -> Result<Option<JobPreparation>> {
        if self.repositories.jobs.find(job_id)?.is_none() {
            return Ok(None);
        }

        let preparations = self.factory.create_all(job_id)?;
        let state = reduce(preparations.values().map(|preparation| preparation.state));
        let failures = preparations
            .into_iter()
            .filter_map(|(component, preparation)| {
                preparation.failure.map(|failure| (component, failure))
            })
            .collect();

        Ok(Some(JobPreparation {
            state,
            request_states: self.projection.project(job_id)?,
            failures,
        }))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::entity::{
        ComponentState, Machine, MachineStateCategory, MetaState, RemoteMachine, ResultsJob,
        SerializedSuite, WorkerComponentName, WorkerComponentState,
    };
    use crate::job::Job;
    use crate::remote_request::{RemoteRequestLedger, RemoteRequestType};

    fn setup() -> (Repositories, RemoteRequestLedger, JobPreparationInspector) {
        let repositories = Repositories::in_memory();
        repositories
            .jobs
            .save(&Job::with_id("job-1", "user-1", "suite-1", 600))
            .unwrap();
        let ledger = RemoteRequestLedger::new(repositories.remote_requests.clone());
        let inspector = JobPreparationInspector::new(repositories.clone());
        (repositories, ledger, inspector)
    }

    #[test]
    fn unknown_job_is_none() -> Result<()> {
        let (_, _, inspector) = setup();
        assert!(inspector.inspect("job-404")?.is_none());
        Ok(())
    }

    #[test]
    fn fresh_job_is_pending() -> Result<()> {
        let (_, _, inspector) = setup();
        let preparation = inspector.inspect("job-1")?.unwrap();

        assert_eq!(
            serde_json::to_value(&preparation)?,
            json!({
                "state": "pending",
                "request_states": {
                    "results-job": "pending",
                    "serialized-suite": "pending",
                    "machine": "pending",
                    "worker-job": "pending",
                },
                "failures": {},
            })
        );
        Ok(())
    }

    #[test]
    fn requesting_results_job_is_preparing() -> Result<()> {
        let (_, ledger, inspector) = setup();
        let mut request = ledger.create("job-1", RemoteRequestType::RESULTS_JOB_CREATE)?;
        ledger.set_state(&mut request, RequestState::Requesting)?;

        let preparation = inspector.inspect("job-1")?.unwrap();
        assert_eq!(preparation.state, PreparationState::Preparing);
        assert_eq!(
            preparation.request_states[&Component::ResultsJob],
            RequestState::Requesting
        );
        for component in [
            Component::SerializedSuite,
            Component::Machine,
            Component::WorkerJob,
        ] {
            assert_eq!(preparation.request_states[&component], RequestState::Pending);
        }
        assert!(preparation.failures.is_empty());
        Ok(())
    }

    #[test]
    fn all_entities_present_is_succeeded() -> Result<()> {
        let (repositories, _, inspector) = setup();
        repositories
            .results_jobs
            .save(&ResultsJob::new("job-1", "token", "awaiting-events"))?;
        repositories.serialized_suites.save(&SerializedSuite::new(
            "job-1",
            "ss-1",
            "prepared",
            MetaState::new(true, true),
        ))?;
        repositories.machines.save(&Machine::from_remote(&RemoteMachine {
            id: "job-1".into(),
            state: "up/active".into(),
            state_category: MachineStateCategory::Active,
            ip_addresses: vec!["10.0.0.1".into()],
            has_failed_state: false,
            has_end_state: false,
        }))?;
        repositories
            .worker_component_states
            .save(&WorkerComponentState::new(
                "job-1",
                WorkerComponentName::Application,
                &ComponentState::new("awaiting-job", false),
            ))?;

        let preparation = inspector.inspect("job-1")?.unwrap();
        assert_eq!(preparation.state, PreparationState::Succeeded);
        assert!(
            preparation
                .request_states
                .values()
                .all(|state| *state == RequestState::Succeeded)
        );
        Ok(())
    }

    #[test]
    fn every_component_failed_reports_each_failure() -> Result<()> {
        let (_, ledger, inspector) = setup();
        let failures = [
            (Component::ResultsJob, RemoteRequestFailure::http(503, None)),
            (Component::SerializedSuite, RemoteRequestFailure::network(28, None)),
            (Component::Machine, RemoteRequestFailure::http(500, None)),
            (Component::WorkerJob, RemoteRequestFailure::network(6, None)),
        ];
        for (component, failure) in &failures {
            let mut request = ledger.create("job-1", RemoteRequestType::create_for(*component))?;
            ledger.set_state(&mut request, RequestState::Failed)?;
            ledger.set_failure(&mut request, failure.clone())?;
        }

        let preparation = inspector.inspect("job-1")?.unwrap();
        assert_eq!(preparation.state, PreparationState::Failed);
        assert_eq!(preparation.failures, failures.into_iter().collect());
        assert_eq!(
            serde_json::to_value(&preparation)?["failures"]["worker-job"],
            json!({"type": "network", "code": 6, "message": null})
        );
        Ok(())
    }
}
