use std::sync::Arc;

use tracing::debug;

use super::job_exists;
use crate::entity::{Machine, RemoteMachine};
use crate::error::Result;
use crate::event::{DomainEvent, EventKind, EventSubscriber, Priority};
use crate::store::{JobRepository, MachineRepository};

/// Keeps the machine row in step with what the provisioning service reports.
pub struct MachineMutator {
    jobs: Arc<dyn JobRepository>,
    machines: Arc<dyn MachineRepository>,
}

impl MachineMutator {
    pub fn new(jobs: Arc<dyn JobRepository>, machines: Arc<dyn MachineRepository>) -> Self {
        Self { jobs, machines }
    }

    fn upsert(&self, job_id: &str, remote: &RemoteMachine) -> Result<()> {
        let machine = match self.machines.find(job_id)? {
            Some(mut machine) => {
                machine.update_from(remote);
                machine
            }
            None => {
                let mut machine = Machine::from_remote(remote);
                // Machines are keyed by the job they serve.
                machine.id = job_id.to_string();
                machine
            }
        };

        debug!(
            job_id,
            state = %machine.state,
            category = ?machine.state_category,
            ip = machine.ip.as_deref().unwrap_or("-"),
            "saving machine"
        );
        self.machines.save(&machine)
    }
}

impl EventSubscriber for MachineMutator {
    fn name(&self) -> &'static str {
        "machine-mutator"
    }

    fn subscriptions(&self) -> Vec<(EventKind, Priority)> {
        vec![
            (EventKind::MachineCreationRequested, Priority::PERSIST),
            (EventKind::MachineRetrieved, Priority::PERSIST),
            (EventKind::MachineTerminationRequested, Priority::PERSIST),
        ]
    }

    fn handle(&self, event: &DomainEvent) -> Result<()> {
        let (job_id, remote) = match event {
            DomainEvent::MachineCreationRequested { job_id, machine }
            | DomainEvent::MachineRetrieved { job_id, machine }
            | DomainEvent::MachineTerminationRequested { job_id, machine } => (job_id, machine),
            _ => return Ok(()),
        };
        if !job_exists(self.jobs.as_ref(), self.name(), event)? {
            return Ok(());
        }
        self.upsert(job_id, remote)
    }
}
