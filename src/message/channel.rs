//! Outbound message channels.
//!
//! A channel delivers envelopes to whoever executes remote calls. It honours
//! delay stamps but never deduplicates; that is the dispatch guard's job.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::{debug, warn};

use super::Envelope;
use crate::error::{CoordinatorError, Result};

pub trait MessageChannel: Send + Sync {
    fn send(&self, envelope: Envelope) -> Result<()>;

    fn name(&self) -> &str;
}

fn poison_err<T>(_: PoisonError<T>) -> CoordinatorError {
    CoordinatorError::Channel("channel lock poisoned".to_string())
}

/// Records sent envelopes without delivering them.
#[derive(Debug, Default)]
pub struct InMemoryChannel {
    name: String,
    sent: Mutex<VecDeque<Envelope>>,
}

impl InMemoryChannel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sent: Mutex::new(VecDeque::new()),
        }
    }

    /// Takes the oldest envelope, if any.
    pub fn take(&self) -> Result<Option<Envelope>> {
        let mut sent = self.sent.lock().map_err(poison_err)?;
        Ok(sent.pop_front())
    }

    /// Takes every envelope in send order.
    pub fn drain(&self) -> Result<Vec<Envelope>> {
        let mut sent = self.sent.lock().map_err(poison_err)?;
        Ok(sent.drain(..).collect())
    }

    pub fn len(&self) -> Result<usize> {
        let sent = self.sent.lock().map_err(poison_err)?;
        Ok(sent.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl MessageChannel for InMemoryChannel {
    fn send(&self, envelope: Envelope) -> Result<()> {
        let mut sent = self.sent.lock().map_err(poison_err)?;
        sent.push_back(envelope);
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Delivers envelopes through an unbounded tokio channel.
///
/// Delayed envelopes are parked on a timer task and forwarded when it fires,
/// so sending one requires a running tokio runtime.
#[derive(Debug, Clone)]
pub struct TokioChannel {
    name: String,
    sender: UnboundedSender<Envelope>,
    delayed: Arc<AtomicUsize>,
}

impl TokioChannel {
    pub fn new(name: impl Into<String>) -> (Self, UnboundedReceiver<Envelope>) {
        let (sender, receiver) = unbounded_channel();
        let channel = Self {
            name: name.into(),
            sender,
            delayed: Arc::new(AtomicUsize::new(0)),
        };
        (channel, receiver)
    }

    /// Number of delayed envelopes that have not been delivered yet.
    pub fn delayed(&self) -> usize {
        self.delayed.load(Ordering::SeqCst)
    }
}

impl MessageChannel for TokioChannel {
    fn send(&self, envelope: Envelope) -> Result<()> {
        let Some(delay) = envelope.delay() else {
            debug!(channel = %self.name, message = %envelope.message.key(), "sending message");
            return self
                .sender
                .send(envelope)
                .map_err(|_| CoordinatorError::Channel(format!("{} is closed", self.name)));
        };

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|err| CoordinatorError::Channel(err.to_string()))?;
        let sender = self.sender.clone();
        let delayed = self.delayed.clone();
        let name = self.name.clone();

        debug!(
            channel = %self.name,
            message = %envelope.message.key(),
            delay_ms = delay.as_millis() as u64,
            "scheduling delayed message"
        );
        delayed.fetch_add(1, Ordering::SeqCst);
        runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if sender.send(envelope).is_err() {
                warn!(channel = %name, "dropped delayed message; receiver closed");
            }
            delayed.fetch_sub(1, Ordering::SeqCst);
        });
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::message::{MessageKind, RemoteRequestMessage, Stamp};

    fn envelope(kind: MessageKind) -> Envelope {
        Envelope::new(RemoteRequestMessage::new("job-1", kind))
    }

    #[test]
    fn in_memory_channel_keeps_send_order() -> Result<()> {
        let channel = InMemoryChannel::new("test");
        channel.send(envelope(MessageKind::CreateResultsJob))?;
        channel.send(envelope(MessageKind::CreateSerializedSuite))?;

        assert_eq!(channel.len()?, 2);
        let kinds: Vec<_> = channel.drain()?.into_iter().map(|e| e.message.kind).collect();
        assert_eq!(
            kinds,
            vec![MessageKind::CreateResultsJob, MessageKind::CreateSerializedSuite]
        );
        assert!(channel.is_empty()?);
        assert_eq!(channel.name(), "test");
        Ok(())
    }

    #[tokio::test]
    async fn tokio_channel_delivers_immediately() -> Result<()> {
        let (channel, mut receiver) = TokioChannel::new("test");
        channel.send(envelope(MessageKind::CreateMachine))?;

        let received = receiver.recv().await.unwrap();
        assert_eq!(received.message.kind, MessageKind::CreateMachine);
        Ok(())
    }

    #[tokio::test]
    async fn tokio_channel_honours_delay() -> Result<()> {
        let (channel, mut receiver) = TokioChannel::new("test");
        channel.send(
            envelope(MessageKind::GetMachine).with_stamp(Stamp::Delay(Duration::from_millis(50))),
        )?;

        assert_eq!(channel.delayed(), 1);
        assert!(receiver.try_recv().is_err());

        let received = receiver.recv().await.unwrap();
        assert_eq!(received.message.kind, MessageKind::GetMachine);
        Ok(())
    }

    #[tokio::test]
    async fn tokio_channel_reports_closed_receiver() {
        let (channel, receiver) = TokioChannel::new("test");
        drop(receiver);

        let err = channel.send(envelope(MessageKind::CreateMachine)).unwrap_err();
        assert!(matches!(err, CoordinatorError::Channel(_)));
    }

    #[test]
    fn delayed_send_without_runtime_fails() {
        let (channel, _receiver) = TokioChannel::new("test");
        let err = channel
            .send(envelope(MessageKind::GetMachine).with_stamp(Stamp::Delay(Duration::from_secs(1))))
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::Channel(_)));
    }
}
