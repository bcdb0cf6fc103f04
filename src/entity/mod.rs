//! Result entities: the durable evidence that a component was prepared.

mod machine;
mod results_job;
mod serialized_suite;
mod worker_component_state;

pub use machine::{Machine, MachineStateCategory, RemoteMachine};
pub use results_job::ResultsJob;
pub use serialized_suite::{MetaState, SerializedSuite};
pub use worker_component_state::{
    ComponentState, WorkerComponentName, WorkerComponentState, WorkerState,
};
