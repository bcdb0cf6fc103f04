use std::collections::HashMap;
use std::sync::Arc;

use tracing::trace;

use super::{DomainEvent, EventKind, EventOutbox};
use crate::error::Result;

/// Relative order of subscribers to the same event. Higher runs first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Priority(pub i32);

impl Priority {
    /// Writes result entities; everything downstream reads them.
    pub const PERSIST: Priority = Priority(100);
    /// Updates ledger rows.
    pub const TRACK: Priority = Priority(50);
    /// Decides and dispatches the next remote action.
    pub const FLOW: Priority = Priority(0);
    /// Prunes ledger rows no longer needed.
    pub const CLEANUP: Priority = Priority(-50);
}

pub trait EventSubscriber: Send + Sync {
    fn name(&self) -> &'static str;

    fn subscriptions(&self) -> Vec<(EventKind, Priority)>;

    fn handle(&self, event: &DomainEvent) -> Result<()>;
}

struct Registration {
    priority: Priority,
    sequence: usize,
    subscriber: Arc<dyn EventSubscriber>,
}

/// Event kind → subscribers, in priority order.
#[derive(Default)]
pub struct SubscriberTable {
    table: HashMap<EventKind, Vec<Registration>>,
    registered: usize,
}

impl SubscriberTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, subscriber: Arc<dyn EventSubscriber>) {
        for (kind, priority) in subscriber.subscriptions() {
            let registrations = self.table.entry(kind).or_default();
            registrations.push(Registration {
                priority,
                sequence: self.registered,
                subscriber: subscriber.clone(),
            });
            registrations.sort_by(|a, b| {
                b.priority
                    .cmp(&a.priority)
                    .then_with(|| a.sequence.cmp(&b.sequence))
            });
        }
        self.registered += 1;
    }

    /// Names of the subscribers for `kind`, in call order.
    pub fn subscribers_for(&self, kind: EventKind) -> Vec<&'static str> {
        self.table
            .get(&kind)
            .map(|registrations| registrations.iter().map(|r| r.subscriber.name()).collect())
            .unwrap_or_default()
    }

    pub fn publish(&self, event: &DomainEvent) -> Result<()> {
        let Some(registrations) = self.table.get(&event.kind()) else {
            return Ok(());
        };
        for registration in registrations {
            trace!(
                subscriber = registration.subscriber.name(),
                event = ?event.kind(),
                job_id = event.job_id(),
                "delivering event"
            );
            registration.subscriber.handle(event)?;
        }
        Ok(())
    }

    /// Delivers events from `outbox` until it is empty.
    ///
    /// Events raised by a subscriber are queued behind the one being handled.
    /// On error the failing event is dropped and the rest stay queued.
    pub fn pump(&self, outbox: &EventOutbox) -> Result<usize> {
        let mut delivered = 0;
        while let Some(event) = outbox.pop() {
            self.publish(&event)?;
            delivered += 1;
        }
        Ok(delivered)
    }
}
