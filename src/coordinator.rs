use std::sync::Arc;

use tracing::info;

use crate::config::CoordinatorConfig;
use crate::dispatch::JobRemoteRequestMessageDispatcher;
use crate::error::Result;
use crate::event::{DomainEvent, EventOutbox, EventSink, SubscriberTable};
use crate::flow::PreparationFlow;
use crate::handler::{HandleOutcome, MessageHandler, RemoteServices};
use crate::job::Job;
use crate::message::{Envelope, MessageChannel};
use crate::mutator::{
    MachineMutator, RemoteRequestFailureRecorder, RemoteRequestRemover,
    RemoteRequestStateTracker, ResultsJobMutator, SerializedSuiteMutator,
    WorkerComponentStateMutator,
};
use crate::preparation::{JobPreparation, JobPreparationInspector};
use crate::remote_request::RemoteRequestLedger;
use crate::store::Repositories;

/// Drives jobs through preparation.
///
/// Owns the event outbox and every subscriber. Each entry point runs to
/// quiescence: the outbox is empty again when it returns.
pub struct Coordinator<S> {
    repositories: Repositories,
    outbox: Arc<EventOutbox>,
    subscribers: SubscriberTable,
    handler: MessageHandler<S>,
    inspector: JobPreparationInspector,
}

impl<S: RemoteServices> Coordinator<S> {
    pub fn new(
        repositories: Repositories,
        services: S,
        channel: Arc<dyn MessageChannel>,
        config: &CoordinatorConfig,
    ) -> Self {
        let outbox = Arc::new(EventOutbox::new());
        let events: Arc<dyn EventSink> = outbox.clone();
        let ledger = RemoteRequestLedger::new(repositories.remote_requests.clone());
        let jobs = repositories.jobs.clone();

        let dispatcher = Arc::new(JobRemoteRequestMessageDispatcher::new(
            jobs.clone(),
            ledger.clone(),
            channel.clone(),
            events.clone(),
        ));

        let mut subscribers = SubscriberTable::new();
        subscribers.register(Arc::new(ResultsJobMutator::new(
            jobs.clone(),
            repositories.results_jobs.clone(),
        )));
        subscribers.register(Arc::new(SerializedSuiteMutator::new(
            jobs.clone(),
            repositories.serialized_suites.clone(),
        )));
        subscribers.register(Arc::new(MachineMutator::new(
            jobs.clone(),
            repositories.machines.clone(),
        )));
        subscribers.register(Arc::new(WorkerComponentStateMutator::new(
            jobs.clone(),
            repositories.worker_component_states.clone(),
        )));
        subscribers.register(Arc::new(RemoteRequestStateTracker::new(
            jobs.clone(),
            ledger.clone(),
        )));
        subscribers.register(Arc::new(RemoteRequestFailureRecorder::new(
            jobs.clone(),
            ledger.clone(),
        )));
        subscribers.register(Arc::new(PreparationFlow::new(
            dispatcher,
            repositories.machines.clone(),
            events.clone(),
            config.poll.clone(),
        )));
        subscribers.register(Arc::new(RemoteRequestRemover::new(jobs, ledger)));

        let handler = MessageHandler::new(
            repositories.clone(),
            services,
            channel,
            events,
            config.retry_policy(),
        );
        let inspector = JobPreparationInspector::new(repositories.clone());

        Self {
            repositories,
            outbox,
            subscribers,
            handler,
            inspector,
        }
    }

    pub fn repositories(&self) -> &Repositories {
        &self.repositories
    }

    pub fn services(&self) -> &S {
        self.handler.services()
    }

    pub fn subscribers(&self) -> &SubscriberTable {
        &self.subscribers
    }

    /// Persists a new job and dispatches its first remote actions.
    pub fn create_job(
        &self,
        user_id: &str,
        suite_id: &str,
        maximum_duration_in_seconds: u64,
    ) -> Result<Job> {
        let job = Job::new(user_id, suite_id, maximum_duration_in_seconds);
        self.repositories.jobs.save(&job)?;
        info!(job_id = %job.id, suite_id, "job created");

        self.outbox.push(DomainEvent::JobCreated {
            job_id: job.id.clone(),
        });
        self.subscribers.pump(&self.outbox)?;
        Ok(job)
    }

    /// Executes one delivered envelope and everything it sets off.
    pub async fn handle(&self, envelope: Envelope) -> Result<HandleOutcome> {
        let outcome = self.handler.handle(envelope).await?;
        self.subscribers.pump(&self.outbox)?;
        Ok(outcome)
    }

    /// Current preparation status of a job, or `None` if there is no such job.
    pub fn job_preparation(&self, job_id: &str) -> Result<Option<JobPreparation>> {
        self.inspector.inspect(job_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;
    use crate::handler::SimulatedServices;
    use crate::job::Component;
    use crate::message::{InMemoryChannel, MessageKind};
    use crate::preparation::PreparationState;
    use crate::remote_request::{
        FailureType, RemoteRequestFailure, RemoteRequestType, RemoteServiceError, RequestState,
    };
    use crate::store::memory::InMemoryStore;

    const MAX_DELIVERIES: usize = 500;

    struct Harness {
        store: Arc<InMemoryStore>,
        channel: Arc<InMemoryChannel>,
        coordinator: Coordinator<SimulatedServices>,
    }

    fn harness(services: SimulatedServices) -> Harness {
        let store = Arc::new(InMemoryStore::new());
        let channel = Arc::new(InMemoryChannel::new("test"));
        let config = CoordinatorConfig {
            max_retries: 2,
            ..CoordinatorConfig::default()
        };
        let coordinator = Coordinator::new(
            Repositories::from_store(store.clone()),
            services,
            channel.clone(),
            &config,
        );
        Harness {
            store,
            channel,
            coordinator,
        }
    }

    /// Delivers queued envelopes, ignoring delays, until nothing is left.
    async fn run_to_completion(harness: &Harness) -> Result<usize> {
        let mut delivered = 0;
        while let Some(envelope) = harness.channel.take()? {
            harness.coordinator.handle(envelope).await?;
            delivered += 1;
            assert!(delivered < MAX_DELIVERIES, "job never settled");
        }
        Ok(delivered)
    }

    #[test]
    fn subscribers_run_in_priority_order() {
        let h = harness(SimulatedServices::new());
        assert_eq!(
            h.coordinator
                .subscribers()
                .subscribers_for(EventKind::SerializedSuiteRetrieved),
            vec!["serialized-suite-mutator", "preparation-flow", "remote-request-remover"]
        );
        assert_eq!(
            h.coordinator.subscribers().subscribers_for(EventKind::MessageFailed),
            vec![
                "remote-request-state-tracker",
                "remote-request-failure-recorder",
                "preparation-flow"
            ]
        );
    }

    #[tokio::test]
    async fn fresh_job_is_pending_then_preparing() -> Result<()> {
        let h = harness(SimulatedServices::new());
        let job = h.coordinator.create_job("user-1", "suite-1", 600)?;

        let status = h.coordinator.job_preparation(&job.id)?.unwrap();
        assert_eq!(status.state, PreparationState::Preparing);
        assert_eq!(status.request_states[&Component::ResultsJob], RequestState::Requesting);
        assert_eq!(status.request_states[&Component::Machine], RequestState::Pending);
        assert_eq!(h.channel.len()?, 2);
        Ok(())
    }

    #[tokio::test]
    async fn happy_path_prepares_every_component_once() -> Result<()> {
        let h = harness(SimulatedServices::new());
        let job = h.coordinator.create_job("user-1", "suite-1", 600)?;
        run_to_completion(&h).await?;

        let status = h.coordinator.job_preparation(&job.id)?.unwrap();
        assert_eq!(status.state, PreparationState::Succeeded);
        assert!(status.failures.is_empty());
        for component in Component::ALL {
            assert_eq!(status.request_states[&component], RequestState::Succeeded);
        }

        let services = h.coordinator.services();
        for kind in [
            MessageKind::CreateResultsJob,
            MessageKind::CreateSerializedSuite,
            MessageKind::CreateMachine,
            MessageKind::StartWorkerJob,
            MessageKind::TerminateMachine,
        ] {
            assert_eq!(services.calls(kind), 1, "{kind:?}");
        }

        let repos = h.coordinator.repositories();
        let machine = repos.machines.find(&job.id)?.unwrap();
        assert_eq!(machine.state, "delete/requested");
        assert!(machine.ip.is_some());
        assert!(repos.results_jobs.find(&job.id)?.unwrap().has_ended());

        // Polling rows are pruned once each component finished.
        for component in Component::ALL {
            assert!(
                repos
                    .remote_requests
                    .find_for_job_and_type(&job.id, RemoteRequestType::retrieve_for(component))?
                    .is_empty(),
                "{component}"
            );
        }
        assert!(h.store.remote_request_count()? <= 5);
        Ok(())
    }

    #[tokio::test]
    async fn transient_failure_recovers_on_retry() -> Result<()> {
        let services = SimulatedServices::new();
        services.fail(
            MessageKind::CreateMachine,
            RemoteServiceError::transport(7, "connection refused"),
            1,
        );
        let h = harness(services);
        let job = h.coordinator.create_job("user-1", "suite-1", 600)?;
        run_to_completion(&h).await?;

        let status = h.coordinator.job_preparation(&job.id)?.unwrap();
        assert_eq!(status.state, PreparationState::Succeeded);
        assert_eq!(h.coordinator.services().calls(MessageKind::CreateMachine), 2);

        let create = h
            .coordinator
            .repositories()
            .remote_requests
            .find_for_job_and_type(&job.id, RemoteRequestType::MACHINE_CREATE)?;
        assert_eq!(create.len(), 1);
        assert_eq!(create[0].state, RequestState::Succeeded);
        Ok(())
    }

    #[tokio::test]
    async fn permanent_machine_failure_fails_job() -> Result<()> {
        let services = SimulatedServices::new();
        services.fail_component(Component::Machine);
        let h = harness(services);
        let job = h.coordinator.create_job("user-1", "suite-1", 600)?;
        run_to_completion(&h).await?;

        let status = h.coordinator.job_preparation(&job.id)?.unwrap();
        assert_eq!(status.state, PreparationState::Failed);
        assert_eq!(status.request_states[&Component::Machine], RequestState::Failed);
        assert_eq!(status.request_states[&Component::WorkerJob], RequestState::Pending);
        assert_eq!(
            status.failures[&Component::Machine],
            RemoteRequestFailure::http(500, Some("Internal Server Error".into()))
        );
        // One call plus two retries, then nothing more.
        assert_eq!(h.coordinator.services().calls(MessageKind::CreateMachine), 3);
        assert_eq!(h.coordinator.services().calls(MessageKind::StartWorkerJob), 0);
        Ok(())
    }

    #[tokio::test]
    async fn failed_suite_never_provisions_machine() -> Result<()> {
        let services = SimulatedServices::new();
        services.fail_component(Component::SerializedSuite);
        let h = harness(services);
        let job = h.coordinator.create_job("user-1", "suite-1", 600)?;
        run_to_completion(&h).await?;

        let status = h.coordinator.job_preparation(&job.id)?.unwrap();
        assert_eq!(status.state, PreparationState::Failed);
        let failure = &status.failures[&Component::SerializedSuite];
        assert_eq!(failure.failure_type, FailureType::Network);
        assert_eq!(failure.code, 28);
        assert_eq!(h.coordinator.services().calls(MessageKind::CreateMachine), 0);
        assert!(h.coordinator.repositories().machines.find(&job.id)?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn failed_results_job_does_not_block_worker() -> Result<()> {
        let services = SimulatedServices::new();
        services.fail_component(Component::ResultsJob);
        let h = harness(services);
        let job = h.coordinator.create_job("user-1", "suite-1", 600)?;
        run_to_completion(&h).await?;

        let status = h.coordinator.job_preparation(&job.id)?.unwrap();
        assert_eq!(status.state, PreparationState::Failed);
        assert_eq!(
            status.failures[&Component::ResultsJob],
            RemoteRequestFailure::http(503, Some("Service Unavailable".into()))
        );
        assert_eq!(status.request_states[&Component::WorkerJob], RequestState::Succeeded);
        assert_eq!(h.coordinator.services().calls(MessageKind::GetResultsJobState), 0);
        Ok(())
    }

    #[tokio::test]
    async fn final_polling_failure_is_kept_on_the_ledger() -> Result<()> {
        let services = SimulatedServices::new();
        services.fail_always(MessageKind::GetMachine, RemoteServiceError::http(400, "Bad Request"));
        let h = harness(services);
        let job = h.coordinator.create_job("user-1", "suite-1", 600)?;
        run_to_completion(&h).await?;

        // The machine entity exists, so the component stays succeeded; the
        // worker is never started and the job does not finish.
        let status = h.coordinator.job_preparation(&job.id)?.unwrap();
        assert_eq!(status.state, PreparationState::Preparing);
        assert_eq!(status.request_states[&Component::Machine], RequestState::Succeeded);
        assert_eq!(status.request_states[&Component::WorkerJob], RequestState::Pending);
        assert!(status.failures.is_empty());

        assert_eq!(h.coordinator.services().calls(MessageKind::GetMachine), 1);
        assert_eq!(h.coordinator.services().calls(MessageKind::StartWorkerJob), 0);
        let polls = h
            .coordinator
            .repositories()
            .remote_requests
            .find_for_job_and_type(&job.id, RemoteRequestType::MACHINE_RETRIEVE)?;
        assert_eq!(polls.len(), 1);
        assert_eq!(polls[0].state, RequestState::Failed);
        assert_eq!(
            polls[0].failure,
            Some(RemoteRequestFailure::http(400, Some("Bad Request".into())))
        );
        Ok(())
    }

    #[tokio::test]
    async fn unknown_job_status_is_none() -> Result<()> {
        let h = harness(SimulatedServices::new());
        assert!(h.coordinator.job_preparation("job-404")?.is_none());
        Ok(())
    }
}
