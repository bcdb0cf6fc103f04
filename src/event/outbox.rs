use std::collections::VecDeque;
use std::sync::Mutex;

use super::DomainEvent;

/// Somewhere to put events raised while handling something else.
pub trait EventSink: Send + Sync {
    fn push(&self, event: DomainEvent);
}

/// FIFO of events waiting to be delivered to subscribers.
#[derive(Debug, Default)]
pub struct EventOutbox {
    events: Mutex<VecDeque<DomainEvent>>,
}

impl EventOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes and returns the oldest pending event.
    pub fn pop(&self) -> Option<DomainEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front()
    }

    pub fn len(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventSink for EventOutbox {
    fn push(&self, event: DomainEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push_back(event);
    }
}
