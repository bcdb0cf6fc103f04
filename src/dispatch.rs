//! Dispatch guard for remote request messages.
//!
//! Every outbound message goes through [`JobRemoteRequestMessageDispatcher`].
//! For repeatable kinds it refuses to send while an attempt for the same
//! (job, type) is in flight or once one has succeeded. Safety comes from the
//! ledger rows, not from in-process locking, so several dispatchers may run
//! side by side against the same store.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{CoordinatorError, Result};
use crate::event::{DomainEvent, EventSink};
use crate::message::{Envelope, MessageChannel, RemoteRequestMessage, Stamp};
use crate::remote_request::{
    Claim, RemoteRequest, RemoteRequestKey, RemoteRequestLedger, RemoteRequestType, RequestState,
    RequestTrigger,
};
use crate::store::JobRepository;

/// How often a repeatable dispatch re-reads the ledger after losing a race.
const MAX_CLAIM_ATTEMPTS: u32 = 3;

/// What happened to a message handed to the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Recorded as a new ledger attempt and sent.
    Dispatched { index: u32 },
    /// An identical repeatable action is in flight or has already succeeded.
    Suppressed { existing: RequestState, index: u32 },
    /// The job does not exist; nothing was recorded or sent.
    JobNotFound,
}

impl DispatchOutcome {
    pub fn is_dispatched(&self) -> bool {
        matches!(self, Self::Dispatched { .. })
    }
}

enum Guard {
    Claimed(RemoteRequest),
    Blocked(RemoteRequest),
}

/// A repeatable action may not be sent again while this attempt stands.
fn blocks_repeat(request: &RemoteRequest) -> bool {
    request.state == RequestState::Succeeded || request.state.is_in_flight()
}

pub struct JobRemoteRequestMessageDispatcher {
    jobs: Arc<dyn JobRepository>,
    ledger: RemoteRequestLedger,
    channel: Arc<dyn MessageChannel>,
    events: Arc<dyn EventSink>,
}

impl JobRemoteRequestMessageDispatcher {
    pub fn new(
        jobs: Arc<dyn JobRepository>,
        ledger: RemoteRequestLedger,
        channel: Arc<dyn MessageChannel>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            jobs,
            ledger,
            channel,
            events,
        }
    }

    /// Records a new attempt for `message` and sends it, unless the guard
    /// says an identical repeatable action must not be repeated.
    ///
    /// If the channel refuses the envelope the new attempt is cancelled
    /// (FAILED) so that a later dispatch is not suppressed by it.
    pub fn dispatch(
        &self,
        mut message: RemoteRequestMessage,
        stamps: Vec<Stamp>,
    ) -> Result<DispatchOutcome> {
        let request_type = message.request_type();

        if self.jobs.find(&message.job_id)?.is_none() {
            debug!(job_id = %message.job_id, %request_type, "not dispatching; job not found");
            return Ok(DispatchOutcome::JobNotFound);
        }

        let mut request = if message.is_repeatable() {
            match self.claim_repeatable(&message.job_id, request_type)? {
                Guard::Claimed(request) => request,
                Guard::Blocked(existing) => {
                    debug!(
                        request = %existing.key(),
                        state = %existing.state,
                        "not dispatching; repeatable request already in flight or succeeded"
                    );
                    return Ok(DispatchOutcome::Suppressed {
                        existing: existing.state,
                        index: existing.index,
                    });
                }
            }
        } else {
            self.ledger.create_next(&message.job_id, request_type)?
        };

        self.ledger.apply(&mut request, RequestTrigger::Enqueued)?;
        message.index = request.index;

        info!(request = %request.key(), "dispatching remote request");
        if let Err(err) = self.channel.send(Envelope::with_stamps(message.clone(), stamps)) {
            warn!(request = %request.key(), %err, "send failed; cancelling attempt");
            self.ledger.apply(&mut request, RequestTrigger::Cancelled)?;
            return Err(err);
        }
        self.events
            .push(DomainEvent::RemoteRequestMessageCreated { message });

        Ok(DispatchOutcome::Dispatched {
            index: request.index,
        })
    }

    /// Claims the next attempt of a repeatable type, or returns the attempt
    /// that forbids one. A lost race reuses the winner's row.
    fn claim_repeatable(&self, job_id: &str, request_type: RemoteRequestType) -> Result<Guard> {
        let mut last_key = RemoteRequestKey::new(job_id, request_type, 0);
        for _ in 0..MAX_CLAIM_ATTEMPTS {
            let newest = self.ledger.find_newest(job_id, request_type)?;
            let index = match newest {
                Some(newest) if blocks_repeat(&newest) => return Ok(Guard::Blocked(newest)),
                Some(newest) => newest.index + 1,
                None => 0,
            };

            last_key = RemoteRequestKey::new(job_id, request_type, index);
            match self.ledger.claim(&last_key)? {
                Claim::Created(request) => return Ok(Guard::Claimed(request)),
                Claim::Taken(winner) if blocks_repeat(&winner) => {
                    return Ok(Guard::Blocked(winner));
                }
                Claim::Taken(_) => {}
            }
        }
        Err(CoordinatorError::LedgerConflict(last_key))
    }
}
