//! Channel-based command submission for the runtime.
//!
//! Tasks never touch the [`SnClient`](crate::SnClient) directly. They send
//! owned [`Command`] values through an embassy-sync channel, and the runtime
//! applies them from its event loop. The [`ClientHandle`] wraps the sending
//! side and can be cloned into as many tasks as needed.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, Receiver, Sender};
use heapless::{String, Vec};

use crate::client::{Topic, MAX_TOPIC_LEN};
use crate::packet::QoS;

/// Largest payload a queued command can carry.
pub const MAX_COMMAND_PAYLOAD: usize = 256;

/// A topic stored inline, so a command does not borrow from its sender.
#[derive(Debug, Clone)]
pub enum OwnedTopic {
    Name(String<MAX_TOPIC_LEN>),
    Id(u16),
    Predefined(u16),
}

impl OwnedTopic {
    /// Copy a topic, failing if the name does not fit.
    pub fn from_topic(topic: Topic<'_>) -> Option<Self> {
        Some(match topic {
            Topic::Name(name) => {
                let mut owned = String::new();
                owned.push_str(name).ok()?;
                OwnedTopic::Name(owned)
            }
            Topic::Id(id) => OwnedTopic::Id(id),
            Topic::Predefined(id) => OwnedTopic::Predefined(id),
        })
    }

    pub fn as_topic(&self) -> Topic<'_> {
        match self {
            OwnedTopic::Name(name) => Topic::Name(name.as_str()),
            OwnedTopic::Id(id) => Topic::Id(*id),
            OwnedTopic::Predefined(id) => Topic::Predefined(*id),
        }
    }
}

/// An owned publish request with inline storage for topic and payload.
#[derive(Debug, Clone)]
pub struct PublishRequest {
    pub topic: OwnedTopic,
    pub payload: Vec<u8, MAX_COMMAND_PAYLOAD>,
    pub qos: QoS,
    pub retain: bool,
}

/// A request for the runtime, applied from its event loop.
#[derive(Debug, Clone)]
pub enum Command {
    /// Connect with the session options the runtime was built with.
    Connect,
    Disconnect,
    Publish(PublishRequest),
    Subscribe { topic: OwnedTopic, qos: QoS },
    Unsubscribe { topic: OwnedTopic },
    Sleep { duration_s: u16 },
    CheckMessages,
    Cancel,
}

pub type CommandChannel<const DEPTH: usize> =
    Channel<CriticalSectionRawMutex, Command, DEPTH>;

pub type CommandSender<'a, const DEPTH: usize> =
    Sender<'a, CriticalSectionRawMutex, Command, DEPTH>;

pub type CommandReceiver<'a, const DEPTH: usize> =
    Receiver<'a, CriticalSectionRawMutex, Command, DEPTH>;

/// A handle that lets tasks drive the client without direct access to it.
///
/// This handle wraps a channel sender and can be cloned and passed to
/// multiple tasks. The runtime receives the commands and performs the
/// actual protocol work; outcomes come back through the
/// [`SnHandler`](super::SnHandler).
#[derive(Clone, Copy)]
pub struct ClientHandle<'a, const DEPTH: usize> {
    tx: CommandSender<'a, DEPTH>,
}

impl<'a, const DEPTH: usize> ClientHandle<'a, DEPTH> {
    /// Create a new `ClientHandle` from a channel sender.
    pub fn new(tx: CommandSender<'a, DEPTH>) -> Self {
        Self { tx }
    }

    /// Queue a command, waiting while the channel is full.
    pub async fn send(&self, command: Command) {
        self.tx.send(command).await;
    }

    /// Queue a command without waiting.
    ///
    /// Returns `false` if the channel is full.
    pub fn try_send(&self, command: Command) -> bool {
        self.tx.try_send(command).is_ok()
    }

    /// Queue a publish. Returns `false` if the topic or payload does not
    /// fit a command, or the channel is full.
    pub async fn publish(&self, topic: Topic<'_>, payload: &[u8], qos: QoS, retain: bool) -> bool {
        let Some(topic) = OwnedTopic::from_topic(topic) else {
            return false;
        };
        let mut owned = Vec::new();
        if owned.extend_from_slice(payload).is_err() {
            return false;
        }
        self.send(Command::Publish(PublishRequest {
            topic,
            payload: owned,
            qos,
            retain,
        }))
        .await;
        true
    }

    /// Queue a subscribe. Returns `false` if the topic does not fit.
    pub async fn subscribe(&self, topic: Topic<'_>, qos: QoS) -> bool {
        let Some(topic) = OwnedTopic::from_topic(topic) else {
            return false;
        };
        self.send(Command::Subscribe { topic, qos }).await;
        true
    }

    /// Queue an unsubscribe. Returns `false` if the topic does not fit.
    pub async fn unsubscribe(&self, topic: Topic<'_>) -> bool {
        let Some(topic) = OwnedTopic::from_topic(topic) else {
            return false;
        };
        self.send(Command::Unsubscribe { topic }).await;
        true
    }

    pub async fn connect(&self) {
        self.send(Command::Connect).await;
    }

    pub async fn disconnect(&self) {
        self.send(Command::Disconnect).await;
    }

    pub async fn sleep(&self, duration_s: u16) {
        self.send(Command::Sleep { duration_s }).await;
    }

    pub async fn check_messages(&self) {
        self.send(Command::CheckMessages).await;
    }

    pub async fn cancel(&self) {
        self.send(Command::Cancel).await;
    }
}
