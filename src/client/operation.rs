//! Active operation bookkeeping.
//!
//! At most one asynchronous operation is live at a time. The carrier
//! struct holds the retry bookkeeping shared by every kind; the per-kind
//! payload lives in [`OpDetail`] and is matched exhaustively wherever the
//! engine dispatches on it.

use heapless::{String, Vec};

use super::topics::MAX_TOPIC_LEN;
use crate::packet::{QoS, TopicField, TopicIdKind};
use crate::port::OperationKind;

/// How an outgoing message addresses its topic once no name resolution is
/// pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WireTopic {
    /// A gateway-assigned id from an earlier registration.
    Normal(u16),
    /// A pre-agreed id.
    Predefined(u16),
    /// A two-character name carried inline.
    Short([u8; 2]),
}

impl WireTopic {
    /// The flags kind and id field for a PUBLISH.
    pub fn parts(self) -> (TopicIdKind, u16) {
        match self {
            WireTopic::Normal(id) => (TopicIdKind::Normal, id),
            WireTopic::Predefined(id) => (TopicIdKind::Predefined, id),
            WireTopic::Short(chars) => (TopicIdKind::Short, u16::from_be_bytes(chars)),
        }
    }

    /// The topic field for a SUBSCRIBE/UNSUBSCRIBE.
    pub fn field(self) -> TopicField<'static> {
        match self {
            WireTopic::Normal(id) => TopicField::Id(id),
            WireTopic::Predefined(id) => TopicField::Predefined(id),
            WireTopic::Short(chars) => TopicField::Short(chars),
        }
    }
}

pub(crate) struct Operation<const P: usize> {
    /// Clock value of the most recent transmission for this operation.
    pub sent_at: u64,
    /// Transmissions performed so far, the initial send included.
    pub attempts: u8,
    /// Whether the gateway ever answered a step with a congestion code.
    pub saw_congestion: bool,
    pub detail: OpDetail<P>,
}

impl<const P: usize> Operation<P> {
    pub fn new(now: u64, detail: OpDetail<P>) -> Self {
        Self {
            sent_at: now,
            attempts: 1,
            saw_congestion: false,
            detail,
        }
    }
}

pub(crate) enum OpDetail<const P: usize> {
    Connect {
        will_topic_sent: bool,
        will_msg_sent: bool,
        acked: bool,
    },
    Disconnect,
    /// Publish by a long topic name, registering it first when needed.
    Publish {
        name: String<MAX_TOPIC_LEN>,
        payload: Vec<u8, P>,
        qos: QoS,
        retain: bool,
        /// Message id of the current step (REGISTER, then PUBLISH).
        msg_id: u16,
        topic_id: u16,
        /// An id is on hand and PUBLISH is the current step.
        registered: bool,
        /// The id came from the cache rather than an in-op REGISTER.
        from_cache: bool,
        /// QoS 2: PUBREC seen, PUBREL is the current step.
        ack_received: bool,
        /// An invalid-id recovery was already performed.
        recovered: bool,
    },
    PublishById {
        topic: WireTopic,
        payload: Vec<u8, P>,
        qos: QoS,
        retain: bool,
        msg_id: u16,
        ack_received: bool,
    },
    Subscribe {
        name: String<MAX_TOPIC_LEN>,
        qos: QoS,
        msg_id: u16,
    },
    SubscribeById {
        topic: WireTopic,
        qos: QoS,
        msg_id: u16,
        recovered: bool,
    },
    Unsubscribe {
        name: String<MAX_TOPIC_LEN>,
        msg_id: u16,
    },
    UnsubscribeById {
        topic: WireTopic,
        msg_id: u16,
    },
    WillTopicUpdate {
        /// Continue with the message update once the topic is accepted.
        chain: bool,
    },
    WillMsgUpdate,
    Sleep {
        duration_s: u16,
    },
    CheckMessages,
}

impl<const P: usize> OpDetail<P> {
    /// The kind reported through `operation_done`.
    ///
    /// Connect and Disconnect resolve through the connection status report
    /// instead and have no operation kind.
    pub fn kind(&self) -> Option<OperationKind> {
        match self {
            OpDetail::Connect { .. } | OpDetail::Disconnect => None,
            OpDetail::Publish { .. } | OpDetail::PublishById { .. } => Some(OperationKind::Publish),
            OpDetail::Subscribe { .. } | OpDetail::SubscribeById { .. } => {
                Some(OperationKind::Subscribe)
            }
            OpDetail::Unsubscribe { .. } | OpDetail::UnsubscribeById { .. } => {
                Some(OperationKind::Unsubscribe)
            }
            OpDetail::WillTopicUpdate { .. } | OpDetail::WillMsgUpdate => {
                Some(OperationKind::WillUpdate)
            }
            OpDetail::Sleep { .. } => Some(OperationKind::Sleep),
            OpDetail::CheckMessages => Some(OperationKind::CheckMessages),
        }
    }
}
