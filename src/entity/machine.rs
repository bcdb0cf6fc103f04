use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MachineStateCategory {
    #[default]
    Unknown,
    Finding,
    PreActive,
    Active,
    Ending,
    End,
}

/// Machine as reported by the provisioning service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteMachine {
    pub id: String,
    pub state: String,
    pub state_category: MachineStateCategory,
    pub ip_addresses: Vec<String>,
    pub has_failed_state: bool,
    pub has_end_state: bool,
}

impl RemoteMachine {
    pub fn is_active(&self) -> bool {
        self.state_category == MachineStateCategory::Active
    }
}

/// The compute machine provisioned for a job. Keyed by job id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Machine {
    pub id: String,
    pub state: String,
    pub state_category: MachineStateCategory,
    pub ip: Option<String>,
    pub has_failed_state: bool,
    pub has_end_state: bool,
}

impl Machine {
    pub fn from_remote(remote: &RemoteMachine) -> Self {
        Self {
            id: remote.id.clone(),
            state: remote.state.clone(),
            state_category: remote.state_category,
            ip: remote.ip_addresses.first().cloned(),
            has_failed_state: remote.has_failed_state,
            has_end_state: remote.has_end_state,
        }
    }

    /// Copies state and flags from `remote`. The IP is only ever set once.
    pub fn update_from(&mut self, remote: &RemoteMachine) {
        self.state = remote.state.clone();
        self.state_category = remote.state_category;
        self.has_failed_state = remote.has_failed_state;
        self.has_end_state = remote.has_end_state;
        if self.ip.is_none() {
            self.ip = remote.ip_addresses.first().cloned();
        }
    }

    pub fn is_active(&self) -> bool {
        self.state_category == MachineStateCategory::Active
    }
}
