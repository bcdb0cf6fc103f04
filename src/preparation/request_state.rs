use std::collections::BTreeMap;

use super::ComponentHandler;
use crate::error::Result;
use crate::job::Component;
use crate::remote_request::RequestState;
use crate::store::Repositories;

/// Reports the lifecycle state of each component's create request.
///
/// A component with a result entity reports SUCCEEDED whatever its ledger
/// says. Otherwise the newest create attempt that was not superseded
/// (ABORTED) is reported, or PENDING when there is none.
#[derive(Clone)]
pub struct RequestStateProjection {
    repositories: Repositories,
}

impl RequestStateProjection {
    pub fn new(repositories: Repositories) -> Self {
        Self { repositories }
    }

    pub fn project(&self, job_id: &str) -> Result<BTreeMap<Component, RequestState>> {
        let mut states = BTreeMap::new();
        for handler in ComponentHandler::all() {
            states.insert(handler.component, self.request_state(&handler, job_id)?);
        }
        Ok(states)
    }

    pub fn request_state(&self, handler: &ComponentHandler, job_id: &str) -> Result<RequestState> {
        if handler.has_result_entity(&self.repositories, job_id)? {
            return Ok(RequestState::Succeeded);
        }
        let state = self
            .repositories
            .remote_requests
            .find_for_job_and_type(job_id, handler.create_type)?
            .into_iter()
            .filter(|request| request.state != RequestState::Aborted)
            .max_by_key(|request| request.index)
            .map_or(RequestState::Pending, |request| request.state);
        Ok(state)
    }
}
