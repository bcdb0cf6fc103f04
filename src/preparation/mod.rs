//! Answering "what state is this job's preparation in?".
//!
//! Everything here is derived on read from the ledger and the result
//! entities; nothing in this module writes.

mod deriver;
mod factory;
mod handler;
mod reducer;
mod request_state;
mod status;

pub use deriver::PreparationStateDeriver;
pub use factory::ComponentPreparationFactory;
pub use handler::ComponentHandler;
pub use reducer::{combine, reduce};
pub use request_state::RequestStateProjection;
pub use status::{JobPreparation, JobPreparationInspector};

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::job::Component;
use crate::remote_request::RemoteRequestFailure;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreparationState {
    Pending,
    Preparing,
    Succeeded,
    Failed,
}

impl fmt::Display for PreparationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PreparationState::Pending => "pending",
            PreparationState::Preparing => "preparing",
            PreparationState::Succeeded => "succeeded",
            PreparationState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Snapshot of one component's preparation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentPreparation {
    pub component: Component,
    pub state: PreparationState,
    pub failure: Option<RemoteRequestFailure>,
}

impl ComponentPreparation {
    pub fn new(component: Component, state: PreparationState) -> Self {
        Self {
            component,
            state,
            failure: None,
        }
    }

    #[must_use]
    pub fn with_failure(mut self, failure: Option<RemoteRequestFailure>) -> Self {
        self.failure = failure;
        self
    }
}
