use std::fmt;

use serde::{Deserialize, Serialize};

/// The sub-components a worker reports state for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerComponentName {
    Application,
    Compilation,
    Execution,
    EventDelivery,
}

impl WorkerComponentName {
    pub const ALL: [WorkerComponentName; 4] = [
        WorkerComponentName::Application,
        WorkerComponentName::Compilation,
        WorkerComponentName::Execution,
        WorkerComponentName::EventDelivery,
    ];
}

impl fmt::Display for WorkerComponentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerComponentName::Application => "application",
            WorkerComponentName::Compilation => "compilation",
            WorkerComponentName::Execution => "execution",
            WorkerComponentName::EventDelivery => "event_delivery",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentState {
    pub state: String,
    pub is_end_state: bool,
}

impl ComponentState {
    pub fn new(state: impl Into<String>, is_end_state: bool) -> Self {
        Self {
            state: state.into(),
            is_end_state,
        }
    }
}

/// Full state report returned by a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerState {
    pub application: ComponentState,
    pub compilation: ComponentState,
    pub execution: ComponentState,
    pub event_delivery: ComponentState,
}

impl WorkerState {
    pub fn component(&self, name: WorkerComponentName) -> &ComponentState {
        match name {
            WorkerComponentName::Application => &self.application,
            WorkerComponentName::Compilation => &self.compilation,
            WorkerComponentName::Execution => &self.execution,
            WorkerComponentName::EventDelivery => &self.event_delivery,
        }
    }

    /// Every sub-component has reached an end state.
    pub fn has_ended(&self) -> bool {
        WorkerComponentName::ALL
            .into_iter()
            .all(|name| self.component(name).is_end_state)
    }
}

/// One persisted row per (job, worker sub-component).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerComponentState {
    pub job_id: String,
    pub component_name: WorkerComponentName,
    pub state: String,
    pub is_end_state: bool,
}

impl WorkerComponentState {
    pub fn new(job_id: impl Into<String>, component_name: WorkerComponentName, state: &ComponentState) -> Self {
        Self {
            job_id: job_id.into(),
            component_name,
            state: state.state.clone(),
            is_end_state: state.is_end_state,
        }
    }
}
