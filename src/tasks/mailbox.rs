//! Bounded, non-blocking, single-consumer activity mailbox

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;
use tracker_shared::{FrameworkError, FrameworkResult};

use crate::connection::OutboundPublication;

/// Work handed into an activity
///
/// A message owns its payload. On a successful send ownership moves into the
/// queue and on to the consumer; on a failed send the message is dropped
/// inside [`Mailbox::send`].
#[derive(Debug)]
pub enum Message {
    /// Take and publish a sensor measurement now
    MeasureNow,
    /// Acquire and publish a location fix now
    LocationNow,
    /// Abandon a location fix that is in progress
    StopAcquisition,
    /// Hand a publication to the transport-owning activity
    Publish(OutboundPublication),
    /// Ask the activity to leave its loop
    Shutdown,
}

impl Message {
    pub fn kind(&self) -> &'static str {
        match self {
            Message::MeasureNow => "measure-now",
            Message::LocationNow => "location-now",
            Message::StopAcquisition => "stop-acquisition",
            Message::Publish(_) => "publish",
            Message::Shutdown => "shutdown",
        }
    }
}

/// Producer side of a mailbox; cheap to clone
#[derive(Debug, Clone)]
pub struct Mailbox {
    owner: &'static str,
    tx: mpsc::Sender<Message>,
}

/// Consumer side of a mailbox, used only inside the owning activity's loop
#[derive(Debug)]
pub struct MailboxReceiver {
    rx: mpsc::Receiver<Message>,
}

/// Create a mailbox holding at most `capacity` messages
pub fn mailbox(owner: &'static str, capacity: usize) -> (Mailbox, MailboxReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (Mailbox { owner, tx }, MailboxReceiver { rx })
}

impl Mailbox {
    /// Queue a message without waiting
    ///
    /// Returns `Transient` when the queue is full; the message is dropped.
    pub fn send(&self, message: Message) -> FrameworkResult {
        match self.tx.try_send(message) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(message)) => {
                debug!("{} mailbox full, dropping {} message", self.owner, message.kind());
                Err(FrameworkError::transient(format!("{} mailbox is full", self.owner)))
            }
            Err(TrySendError::Closed(message)) => {
                debug!("{} mailbox closed, dropping {} message", self.owner, message.kind());
                Err(FrameworkError::transient(format!("{} mailbox is closed", self.owner)))
            }
        }
    }

    pub fn owner(&self) -> &'static str {
        self.owner
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }
}

impl MailboxReceiver {
    /// Take the next message if one is queued
    pub fn try_receive(&mut self) -> Option<Message> {
        self.rx.try_recv().ok()
    }

    /// Wait for the next message
    pub async fn receive(&mut self) -> Option<Message> {
        self.rx.recv().await
    }

    pub fn has_pending(&self) -> bool {
        !self.rx.is_empty()
    }

    /// Take every queued message, in send order
    pub fn drain(&mut self) -> Vec<Message> {
        let mut messages = Vec::new();
        while let Some(message) = self.try_receive() {
            messages.push(message);
        }
        messages
    }
}
