use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use super::{
    RemoteRequest, RemoteRequestFailure, RemoteRequestKey, RemoteRequestType, RequestState,
    RequestTrigger, Transition,
};
use crate::error::{CoordinatorError, Result};
use crate::store::{InsertOutcome, RemoteRequestRepository};

/// How often a lost create race is re-read before giving up.
const MAX_CREATE_ATTEMPTS: u32 = 3;

/// Result of trying to insert one specific ledger row.
#[derive(Debug, Clone, PartialEq)]
pub enum Claim {
    /// Our insert won; the row is new and PENDING.
    Created(RemoteRequest),
    /// Another writer inserted the row first; this is theirs.
    Taken(RemoteRequest),
}

/// Operations over the remote request ledger.
///
/// Creation is check-then-act backed by the repository's unique
/// (job, type, index) constraint: when two writers race for the same row,
/// exactly one insert wins and the loser reads the winner's row back.
#[derive(Clone)]
pub struct RemoteRequestLedger {
    repository: Arc<dyn RemoteRequestRepository>,
}

impl RemoteRequestLedger {
    pub fn new(repository: Arc<dyn RemoteRequestRepository>) -> Self {
        Self { repository }
    }

    /// Returns the index-0 request for (job, type), creating it in PENDING if absent.
    pub fn create(&self, job_id: &str, request_type: RemoteRequestType) -> Result<RemoteRequest> {
        self.find_or_create(&RemoteRequestKey::new(job_id, request_type, 0))
    }

    /// Returns the row at `key`, creating it in PENDING if absent.
    pub fn find_or_create(&self, key: &RemoteRequestKey) -> Result<RemoteRequest> {
        if let Some(existing) = self.repository.find(key)? {
            return Ok(existing);
        }

        match self.claim(key)? {
            Claim::Created(request) | Claim::Taken(request) => Ok(request),
        }
    }

    /// Inserts a PENDING row at `key`, or reads back the row that beat us to it.
    pub fn claim(&self, key: &RemoteRequestKey) -> Result<Claim> {
        let request = RemoteRequest::new(key.job_id.clone(), key.request_type, key.index);
        match self.repository.insert_if_absent(&request)? {
            InsertOutcome::Inserted => {
                debug!(request = %key, "created remote request");
                Ok(Claim::Created(request))
            }
            InsertOutcome::AlreadyExists => {
                let winner = self
                    .repository
                    .find(key)?
                    .ok_or_else(|| CoordinatorError::LedgerConflict(key.clone()))?;
                warn!(request = %key, state = %winner.state, "remote request already created");
                Ok(Claim::Taken(winner))
            }
        }
    }

    /// Appends a new PENDING attempt at the next free index.
    pub fn create_next(&self, job_id: &str, request_type: RemoteRequestType) -> Result<RemoteRequest> {
        let mut last_key = None;
        for _ in 0..MAX_CREATE_ATTEMPTS {
            let index = self.generate_next_index(job_id, request_type)?;
            let request = RemoteRequest::new(job_id, request_type, index);
            if self.repository.insert_if_absent(&request)?.is_inserted() {
                debug!(request = %request.key(), "created remote request attempt");
                return Ok(request);
            }
            warn!(request = %request.key(), "lost race creating remote request attempt");
            last_key = Some(request.key());
        }

        Err(CoordinatorError::LedgerConflict(
            last_key.unwrap_or_else(|| RemoteRequestKey::new(job_id, request_type, 0)),
        ))
    }

    /// One past the largest index recorded for (job, type), or 0 if none.
    pub fn generate_next_index(&self, job_id: &str, request_type: RemoteRequestType) -> Result<u32> {
        let next = self
            .find_newest(job_id, request_type)?
            .map_or(0, |newest| newest.index + 1);
        Ok(next)
    }

    pub fn find(&self, key: &RemoteRequestKey) -> Result<Option<RemoteRequest>> {
        self.repository.find(key)
    }

    /// The attempt with the largest index for (job, type).
    pub fn find_newest(
        &self,
        job_id: &str,
        request_type: RemoteRequestType,
    ) -> Result<Option<RemoteRequest>> {
        let newest = self
            .repository
            .find_for_job_and_type(job_id, request_type)?
            .into_iter()
            .max_by_key(|request| request.index);
        Ok(newest)
    }

    /// Overwrites the state of `request` and persists it.
    pub fn set_state(&self, request: &mut RemoteRequest, state: RequestState) -> Result<()> {
        request.state = state;
        request.updated_at = Utc::now();
        self.repository.save(request)
    }

    /// Applies `trigger` through the request state machine and persists the result.
    ///
    /// Rejected transitions leave the row untouched.
    pub fn apply(&self, request: &mut RemoteRequest, trigger: RequestTrigger) -> Result<Transition> {
        let transition = request.state.transition(trigger);
        match transition {
            Transition::Next(state) => {
                debug!(
                    request = %request.key(),
                    from = %request.state,
                    to = %state,
                    "remote request transition"
                );
                self.set_state(request, state)?;
            }
            Transition::Rejected { state } => {
                debug!(request = %request.key(), %state, ?trigger, "ignored remote request trigger");
            }
        }
        Ok(transition)
    }

    pub fn set_failure(&self, request: &mut RemoteRequest, failure: RemoteRequestFailure) -> Result<()> {
        request.failure = Some(failure);
        request.updated_at = Utc::now();
        self.repository.save(request)
    }

    /// Deletes every attempt of a type for a job, failure details included.
    pub fn remove_all_for_job_and_type(
        &self,
        job_id: &str,
        request_type: RemoteRequestType,
    ) -> Result<usize> {
        let removed = self.repository.remove_for_job_and_type(job_id, request_type)?;
        if removed > 0 {
            debug!(job_id, %request_type, removed, "removed remote requests");
        }
        Ok(removed)
    }

    /// Deletes every attempt of a type except the newest.
    pub fn remove_superseded_for_job_and_type(
        &self,
        job_id: &str,
        request_type: RemoteRequestType,
    ) -> Result<usize> {
        let requests = self.repository.find_for_job_and_type(job_id, request_type)?;
        let Some(newest) = requests.iter().map(|request| request.index).max() else {
            return Ok(0);
        };

        let mut removed = 0;
        for request in requests.iter().filter(|request| request.index != newest) {
            if self.repository.remove(&request.key())? {
                removed += 1;
            }
        }
        if removed > 0 {
            debug!(job_id, %request_type, removed, "removed superseded remote requests");
        }
        Ok(removed)
    }
}
