//! Job preparation coordinator.
//!
//! Before a test job can run, four remote resources have to be prepared for
//! it: a results job, a serialized suite, a machine and a worker job. This
//! crate tracks every outbound call in a [`remote_request`] ledger, guards
//! dispatch against duplicate calls ([`dispatch`]), keeps local copies of the
//! remote resources up to date from domain events ([`mutator`]) and derives a
//! single preparation status per job ([`preparation`]).
//!
//! [`coordinator::Coordinator`] wires everything together.

pub mod config;
pub mod coordinator;
pub mod dispatch;
pub mod entity;
pub mod error;
pub mod event;
pub mod flow;
pub mod handler;
pub mod job;
pub mod message;
pub mod mutator;
pub mod preparation;
pub mod remote_request;
pub mod store;

pub use coordinator::Coordinator;
pub use error::{CoordinatorError, Result};
