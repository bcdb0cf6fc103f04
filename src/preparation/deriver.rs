use super::{ComponentHandler, PreparationState};
use crate::error::Result;
use crate::job::Component;
use crate::remote_request::{RemoteRequest, RemoteRequestLedger, RequestState};
use crate::store::Repositories;

/// Derives one component's [`PreparationState`] from persisted state.
#[derive(Clone)]
pub struct PreparationStateDeriver {
    repositories: Repositories,
    ledger: RemoteRequestLedger,
}

impl PreparationStateDeriver {
    pub fn new(repositories: Repositories) -> Self {
        let ledger = RemoteRequestLedger::new(repositories.remote_requests.clone());
        Self {
            repositories,
            ledger,
        }
    }

    /// Returns the derived state together with the newest create attempt it was based on.
    pub fn derive(
        &self,
        component: Component,
        job_id: &str,
    ) -> Result<(PreparationState, Option<RemoteRequest>)> {
        let handler = ComponentHandler::for_component(component);
        let has_entity = handler.has_result_entity(&self.repositories, job_id)?;
        let newest = self.ledger.find_newest(job_id, handler.create_type)?;
        Ok((Self::derive_from(has_entity, newest.as_ref()), newest))
    }

    /// An existing result entity always wins: request bookkeeping can lag
    /// behind the entity, and a prepared component must never regress.
    pub fn derive_from(has_entity: bool, newest: Option<&RemoteRequest>) -> PreparationState {
        match newest {
            _ if has_entity => PreparationState::Succeeded,
            None => PreparationState::Pending,
            Some(request) if request.state == RequestState::Failed => PreparationState::Failed,
            Some(_) => PreparationState::Preparing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Machine;
    use crate::entity::{MachineStateCategory, RemoteMachine};
    use crate::remote_request::RemoteRequestType;

    fn request(state: RequestState) -> RemoteRequest {
        let mut request = RemoteRequest::new("job-1", RemoteRequestType::MACHINE_CREATE, 0);
        request.state = state;
        request
    }

    const ALL_STATES: [RequestState; 7] = [
        RequestState::Pending,
        RequestState::Requesting,
        RequestState::Halted,
        RequestState::Failed,
        RequestState::Succeeded,
        RequestState::Aborted,
        RequestState::Unknown,
    ];

    #[test]
    fn entity_wins_over_any_request_state() {
        assert_eq!(
            PreparationStateDeriver::derive_from(true, None),
            PreparationState::Succeeded
        );
        for state in ALL_STATES {
            assert_eq!(
                PreparationStateDeriver::derive_from(true, Some(&request(state))),
                PreparationState::Succeeded
            );
        }
    }

    #[test]
    fn no_entity_no_request_is_pending() {
        assert_eq!(
            PreparationStateDeriver::derive_from(false, None),
            PreparationState::Pending
        );
    }

    #[test]
    fn failed_request_is_failed_anything_else_preparing() {
        for state in ALL_STATES {
            let expected = if state == RequestState::Failed {
                PreparationState::Failed
            } else {
                PreparationState::Preparing
            };
            assert_eq!(
                PreparationStateDeriver::derive_from(false, Some(&request(state))),
                expected
            );
        }
    }

    #[test]
    fn derive_reads_entity_and_newest_request() -> Result<()> {
        let repositories = Repositories::in_memory();
        let deriver = PreparationStateDeriver::new(repositories.clone());
        let ledger = RemoteRequestLedger::new(repositories.remote_requests.clone());

        assert_eq!(
            deriver.derive(Component::Machine, "job-1")?.0,
            PreparationState::Pending
        );

        let mut first = ledger.create_next("job-1", RemoteRequestType::MACHINE_CREATE)?;
        ledger.set_state(&mut first, RequestState::Failed)?;
        assert_eq!(
            deriver.derive(Component::Machine, "job-1")?.0,
            PreparationState::Failed
        );

        let mut second = ledger.create_next("job-1", RemoteRequestType::MACHINE_CREATE)?;
        ledger.set_state(&mut second, RequestState::Requesting)?;
        let (state, newest) = deriver.derive(Component::Machine, "job-1")?;
        assert_eq!(state, PreparationState::Preparing);
        assert_eq!(newest.map(|r| r.index), Some(1));

        repositories.machines.save(&Machine::from_remote(&RemoteMachine {
            id: "job-1".into(),
            state: "create/received".into(),
            state_category: MachineStateCategory::PreActive,
            ip_addresses: vec![],
            has_failed_state: false,
            has_end_state: false,
        }))?;
        assert_eq!(
            deriver.derive(Component::Machine, "job-1")?.0,
            PreparationState::Succeeded
        );
        Ok(())
    }
}
