//! Ledger of outbound calls to the remote collaborators.
//!
//! Every attempt to call the results service, the suite serializer, the
//! machine provisioner or the worker is recorded as a [`RemoteRequest`] keyed
//! by (job, type, index). The index is a per-(job, type) attempt counter that
//! only ever grows, so the row with the largest index is the newest attempt.

mod error;
mod failure;
mod ledger;
mod state;

pub use error::{RemoteRequestError, RemoteServiceError};
pub use failure::{FailureType, RemoteRequestFailure};
pub use ledger::{Claim, RemoteRequestLedger};
pub use state::{RequestState, RequestTrigger, Transition};

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::job::Component;

/// What a remote request does to its component's resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RemoteRequestAction {
    Create,
    Retrieve,
    Terminate,
}

impl RemoteRequestAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemoteRequestAction::Create => "create",
            RemoteRequestAction::Retrieve => "retrieve",
            RemoteRequestAction::Terminate => "terminate",
        }
    }
}

/// A (component, action) pair, rendered as `machine/create` and friends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RemoteRequestType {
    pub component: Component,
    pub action: RemoteRequestAction,
}

impl RemoteRequestType {
    pub const RESULTS_JOB_CREATE: Self = Self::new(Component::ResultsJob, RemoteRequestAction::Create);
    pub const RESULTS_JOB_RETRIEVE: Self =
        Self::new(Component::ResultsJob, RemoteRequestAction::Retrieve);
    pub const SERIALIZED_SUITE_CREATE: Self =
        Self::new(Component::SerializedSuite, RemoteRequestAction::Create);
    pub const SERIALIZED_SUITE_RETRIEVE: Self =
        Self::new(Component::SerializedSuite, RemoteRequestAction::Retrieve);
    pub const MACHINE_CREATE: Self = Self::new(Component::Machine, RemoteRequestAction::Create);
    pub const MACHINE_RETRIEVE: Self = Self::new(Component::Machine, RemoteRequestAction::Retrieve);
    pub const MACHINE_TERMINATE: Self =
        Self::new(Component::Machine, RemoteRequestAction::Terminate);
    pub const WORKER_JOB_CREATE: Self = Self::new(Component::WorkerJob, RemoteRequestAction::Create);
    pub const WORKER_JOB_RETRIEVE: Self =
        Self::new(Component::WorkerJob, RemoteRequestAction::Retrieve);

    pub const fn new(component: Component, action: RemoteRequestAction) -> Self {
        Self { component, action }
    }

    /// The request type whose success produces the component's result entity.
    pub const fn create_for(component: Component) -> Self {
        Self::new(component, RemoteRequestAction::Create)
    }

    /// The polling request type used to follow the component after creation.
    pub const fn retrieve_for(component: Component) -> Self {
        Self::new(component, RemoteRequestAction::Retrieve)
    }
}

impl fmt::Display for RemoteRequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.component, self.action.as_str())
    }
}

impl FromStr for RemoteRequestType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (component, action) = s
            .split_once('/')
            .ok_or_else(|| format!("invalid remote request type: {s}"))?;
        let component =
            Component::parse(component).ok_or_else(|| format!("unknown component: {component}"))?;
        let action = match action {
            "create" => RemoteRequestAction::Create,
            "retrieve" => RemoteRequestAction::Retrieve,
            "terminate" => RemoteRequestAction::Terminate,
            other => return Err(format!("unknown remote request action: {other}")),
        };
        Ok(Self::new(component, action))
    }
}

impl Serialize for RemoteRequestType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RemoteRequestType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(serde::de::Error::custom)
    }
}

/// Identity of one attempt in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RemoteRequestKey {
    pub job_id: String,
    pub request_type: RemoteRequestType,
    pub index: u32,
}

impl RemoteRequestKey {
    pub fn new(job_id: impl Into<String>, request_type: RemoteRequestType, index: u32) -> Self {
        Self {
            job_id: job_id.into(),
            request_type,
            index,
        }
    }
}

impl fmt::Display for RemoteRequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.job_id, self.request_type, self.index)
    }
}

/// One recorded attempt at calling a remote collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRequest {
    pub job_id: String,
    pub request_type: RemoteRequestType,
    pub index: u32,
    pub state: RequestState,
    pub failure: Option<RemoteRequestFailure>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RemoteRequest {
    pub fn new(job_id: impl Into<String>, request_type: RemoteRequestType, index: u32) -> Self {
        let now = Utc::now();
        Self {
            job_id: job_id.into(),
            request_type,
            index,
            state: RequestState::Pending,
            failure: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn key(&self) -> RemoteRequestKey {
        RemoteRequestKey::new(self.job_id.clone(), self.request_type, self.index)
    }
}
