//! Messages that ask a handler to make one remote call on behalf of a job.

mod channel;

pub use channel::{InMemoryChannel, MessageChannel, TokioChannel};

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::remote_request::{RemoteRequestKey, RemoteRequestType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    CreateResultsJob,
    GetResultsJobState,
    CreateSerializedSuite,
    GetSerializedSuite,
    CreateMachine,
    GetMachine,
    TerminateMachine,
    StartWorkerJob,
    GetWorkerJobState,
}

impl MessageKind {
    pub fn request_type(&self) -> RemoteRequestType {
        match self {
            MessageKind::CreateResultsJob => RemoteRequestType::RESULTS_JOB_CREATE,
            MessageKind::GetResultsJobState => RemoteRequestType::RESULTS_JOB_RETRIEVE,
            MessageKind::CreateSerializedSuite => RemoteRequestType::SERIALIZED_SUITE_CREATE,
            MessageKind::GetSerializedSuite => RemoteRequestType::SERIALIZED_SUITE_RETRIEVE,
            MessageKind::CreateMachine => RemoteRequestType::MACHINE_CREATE,
            MessageKind::GetMachine => RemoteRequestType::MACHINE_RETRIEVE,
            MessageKind::TerminateMachine => RemoteRequestType::MACHINE_TERMINATE,
            MessageKind::StartWorkerJob => RemoteRequestType::WORKER_JOB_CREATE,
            MessageKind::GetWorkerJobState => RemoteRequestType::WORKER_JOB_RETRIEVE,
        }
    }

    /// Repeatable actions must succeed at most once and never run twice at
    /// the same time for a job. Polling is free to repeat.
    pub fn is_repeatable(&self) -> bool {
        !matches!(
            self,
            MessageKind::GetResultsJobState
                | MessageKind::GetSerializedSuite
                | MessageKind::GetMachine
                | MessageKind::GetWorkerJobState
        )
    }
}

/// A request for one remote call, tied to the ledger attempt it runs as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRequestMessage {
    pub job_id: String,
    pub kind: MessageKind,
    /// Ledger index of the attempt; assigned when the message is dispatched.
    pub index: u32,
}

impl RemoteRequestMessage {
    pub fn new(job_id: impl Into<String>, kind: MessageKind) -> Self {
        Self {
            job_id: job_id.into(),
            kind,
            index: 0,
        }
    }

    pub fn request_type(&self) -> RemoteRequestType {
        self.kind.request_type()
    }

    pub fn is_repeatable(&self) -> bool {
        self.kind.is_repeatable()
    }

    pub fn key(&self) -> RemoteRequestKey {
        RemoteRequestKey::new(self.job_id.clone(), self.request_type(), self.index)
    }
}

/// Delivery instructions attached to a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stamp {
    /// Deliver no earlier than this long from now.
    Delay(Duration),
    /// Deliver immediately, ignoring any delay stamp.
    NonDelayed,
    /// This is the n-th retry of the same attempt.
    Retry { attempt: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub message: RemoteRequestMessage,
    pub stamps: Vec<Stamp>,
}

impl Envelope {
    pub fn new(message: RemoteRequestMessage) -> Self {
        Self {
            message,
            stamps: Vec::new(),
        }
    }

    pub fn with_stamps(message: RemoteRequestMessage, stamps: Vec<Stamp>) -> Self {
        Self { message, stamps }
    }

    #[must_use]
    pub fn with_stamp(mut self, stamp: Stamp) -> Self {
        self.stamps.push(stamp);
        self
    }

    /// Effective delivery delay. A `NonDelayed` stamp wins over any delay.
    pub fn delay(&self) -> Option<Duration> {
        if self.stamps.contains(&Stamp::NonDelayed) {
            return None;
        }
        self.stamps.iter().rev().find_map(|stamp| match stamp {
            Stamp::Delay(delay) if !delay.is_zero() => Some(*delay),
            _ => None,
        })
    }

    /// Number of times this attempt has already been retried.
    pub fn retry_attempt(&self) -> u32 {
        self.stamps
            .iter()
            .rev()
            .find_map(|stamp| match stamp {
                Stamp::Retry { attempt } => Some(*attempt),
                _ => None,
            })
            .unwrap_or(0)
    }

    /// Copy for redelivery after `delay`. Earlier delay stamps are replaced.
    pub fn after(&self, delay: Duration) -> Self {
        let mut stamps: Vec<Stamp> = self
            .stamps
            .iter()
            .copied()
            .filter(|stamp| !matches!(stamp, Stamp::Delay(_) | Stamp::NonDelayed))
            .collect();
        stamps.push(Stamp::Delay(delay));
        Self::with_stamps(self.message.clone(), stamps)
    }

    /// Copy for the `attempt`-th retry of the same ledger attempt.
    pub fn for_retry(&self, attempt: u32, delay: Duration) -> Self {
        let mut retry = self.after(delay);
        retry
            .stamps
            .retain(|stamp| !matches!(stamp, Stamp::Retry { .. }));
        retry.stamps.insert(0, Stamp::Retry { attempt });
        retry
    }
}
