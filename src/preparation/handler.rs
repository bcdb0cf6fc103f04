use crate::error::Result;
use crate::job::Component;
use crate::remote_request::RemoteRequestType;
use crate::store::Repositories;

/// What the preparation pipeline needs to know about one component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentHandler {
    pub component: Component,
    /// The request type whose success creates the result entity.
    pub create_type: RemoteRequestType,
    /// The polling request type that follows the entity after creation.
    pub retrieve_type: RemoteRequestType,
}

impl ComponentHandler {
    pub const fn for_component(component: Component) -> Self {
        Self {
            component,
            create_type: RemoteRequestType::create_for(component),
            retrieve_type: RemoteRequestType::retrieve_for(component),
        }
    }

    pub fn all() -> [ComponentHandler; 4] {
        Component::ALL.map(Self::for_component)
    }

    /// Whether the component's result entity has been persisted for the job.
    pub fn has_result_entity(&self, repositories: &Repositories, job_id: &str) -> Result<bool> {
        let exists = match self.component {
            Component::ResultsJob => repositories.results_jobs.find(job_id)?.is_some(),
            Component::SerializedSuite => repositories.serialized_suites.find(job_id)?.is_some(),
            Component::Machine => repositories.machines.find(job_id)?.is_some(),
            Component::WorkerJob => !repositories
                .worker_component_states
                .find_for_job(job_id)?
                .is_empty(),
        };
        Ok(exists)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{ComponentState, WorkerComponentName, WorkerComponentState};

    #[test]
    fn handlers_follow_component_order() {
        let components: Vec<_> = ComponentHandler::all().iter().map(|h| h.component).collect();
        assert_eq!(components, Component::ALL.to_vec());
        assert_eq!(
            ComponentHandler::for_component(Component::Machine).create_type,
            RemoteRequestType::MACHINE_CREATE
        );
    }

    #[test]
    fn worker_job_entity_is_any_component_state() -> Result<()> {
        let repositories = Repositories::in_memory();
        let handler = ComponentHandler::for_component(Component::WorkerJob);
        assert!(!handler.has_result_entity(&repositories, "job-1")?);

        repositories.worker_component_states.save(&WorkerComponentState::new(
            "job-1",
            WorkerComponentName::Compilation,
            &ComponentState::new("running", false),
        ))?;
        assert!(handler.has_result_entity(&repositories, "job-1")?);
        assert!(!handler.has_result_entity(&repositories, "job-2")?);
        Ok(())
    }
}
