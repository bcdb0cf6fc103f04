use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle of a single remote request attempt.
///
/// PENDING → REQUESTING → SUCCEEDED | HALTED | FAILED, with HALTED going
/// back to REQUESTING when redelivered. SUCCEEDED, FAILED and ABORTED are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestState {
    Pending,
    Requesting,
    Halted,
    Failed,
    Succeeded,
    Aborted,
    Unknown,
}

impl RequestState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestState::Succeeded | RequestState::Failed | RequestState::Aborted
        )
    }

    /// Still waiting on, or retrying, the remote call.
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            RequestState::Pending | RequestState::Requesting | RequestState::Halted
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestState::Pending => "pending",
            RequestState::Requesting => "requesting",
            RequestState::Halted => "halted",
            RequestState::Failed => "failed",
            RequestState::Succeeded => "succeeded",
            RequestState::Aborted => "aborted",
            RequestState::Unknown => "unknown",
        }
    }

    /// Computes where `trigger` takes a request currently in this state.
    pub fn transition(self, trigger: RequestTrigger) -> Transition {
        use RequestState as S;
        use RequestTrigger as T;

        if self.is_terminal() {
            return Transition::Rejected { state: self };
        }

        let next = match (self, trigger) {
            (S::Unknown, _) => S::Unknown,
            (_, T::Cancelled) => S::Failed,
            (_, T::Superseded) => S::Aborted,
            (S::Pending | S::Halted | S::Requesting, T::Enqueued) => S::Requesting,
            (S::Requesting, T::Succeeded) => S::Succeeded,
            (S::Requesting, T::Failed { retryable: true }) => S::Halted,
            (S::Requesting, T::Failed { retryable: false }) => S::Failed,
            (S::Pending | S::Requesting | S::Halted, T::Deferred) => S::Pending,
            (state, _) => return Transition::Rejected { state },
        };

        Transition::Next(next)
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something that happened to a remote request attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestTrigger {
    /// Picked up for execution, including redelivery of a halted attempt.
    Enqueued,
    Succeeded,
    Failed { retryable: bool },
    /// Handler found its prerequisites unmet and put the message back.
    Deferred,
    /// The attempt was recorded but its message never left.
    Cancelled,
    Superseded,
}

/// The result of applying a [`RequestTrigger`] to a [`RequestState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Move to the given state.
    Next(RequestState),
    /// The trigger does not apply; the request stays in `state`.
    Rejected { state: RequestState },
}

impl Transition {
    /// The state the request is in once the transition has been applied.
    pub fn state(&self) -> RequestState {
        match self {
            Transition::Next(state) | Transition::Rejected { state } => *state,
        }
    }
}
