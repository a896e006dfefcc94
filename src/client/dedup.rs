//! Incoming exactly-once duplicate tracker.
//!
//! An inbound QoS 2 PUBLISH is held here between the PUBREC answer and the
//! gateway's PUBREL. The tracker remembers one message identity at a time
//! and guarantees the payload reaches the application exactly once, no
//! matter how often the gateway retransmits either half of the handshake.

use heapless::Vec;

use crate::packet::TopicIdKind;

struct TrackedMessage<const MAX_PAYLOAD: usize> {
    kind: TopicIdKind,
    topic_id: u16,
    msg_id: u16,
    retain: bool,
    payload: Vec<u8, MAX_PAYLOAD>,
    reported: bool,
}

pub(crate) struct InboundTracker<const MAX_PAYLOAD: usize> {
    current: Option<TrackedMessage<MAX_PAYLOAD>>,
}

impl<const MAX_PAYLOAD: usize> InboundTracker<MAX_PAYLOAD> {
    pub const fn new() -> Self {
        Self { current: None }
    }

    /// Records an inbound QoS 2 PUBLISH.
    ///
    /// A message is a retransmission only when the DUP flag is set, the
    /// identity matches the tracked one, and the tracked one has not been
    /// delivered yet; retransmissions leave the buffered payload alone.
    pub fn on_publish(
        &mut self,
        kind: TopicIdKind,
        topic_id: u16,
        msg_id: u16,
        retain: bool,
        dup: bool,
        payload: &[u8],
    ) {
        let retransmission = dup
            && self.current.as_ref().is_some_and(|t| {
                t.kind == kind && t.topic_id == topic_id && t.msg_id == msg_id && !t.reported
            });
        if retransmission {
            return;
        }
        let mut buffered = Vec::new();
        if buffered.extend_from_slice(payload).is_err() {
            self.current = None;
            return;
        }
        self.current = Some(TrackedMessage {
            kind,
            topic_id,
            msg_id,
            retain,
            payload: buffered,
            reported: false,
        });
    }

    /// Handles a PUBREL for `msg_id`.
    ///
    /// Returns the buffered message exactly once when the id matches; a
    /// non-matching release abandons whatever was tracked.
    pub fn on_release(&mut self, msg_id: u16) -> Option<(TopicIdKind, u16, bool, &[u8])> {
        if !self.current.as_ref().is_some_and(|t| t.msg_id == msg_id) {
            self.current = None;
            return None;
        }
        let tracked = self.current.as_mut()?;
        if tracked.reported {
            return None;
        }
        tracked.reported = true;
        Some((
            tracked.kind,
            tracked.topic_id,
            tracked.retain,
            tracked.payload.as_slice(),
        ))
    }

    pub fn clear(&mut self) {
        self.current = None;
    }
}
