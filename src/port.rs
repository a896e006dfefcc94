//! # Host Port Interface
//!
//! The engine is sans-IO: it never touches a socket or a timer itself.
//! Everything it needs from its environment goes through [`SnPort`], and
//! everything it reports back comes out through the same trait. A host
//! implements `SnPort` once and then drives the engine with
//! [`SnClient::tick`](crate::client::SnClient::tick) and
//! [`SnClient::process_data`](crate::client::SnClient::process_data).

use crate::packet::QoS;

/// Lifecycle of a tracked gateway as reported to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GatewayStatus {
    /// A gateway was heard from for the first time.
    Available,
    /// A gateway's advertised lifetime elapsed without another beacon.
    TimedOut,
    /// The active gateway was dropped after repeated keep-alive failures.
    Discarded,
}

/// State changes of the gateway session as reported to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectionStatus {
    /// CONNACK accepted; the session is live.
    Connected,
    /// The gateway or the client ended the session.
    Disconnected,
    /// The gateway rejected the connect attempt with a congestion code.
    Congestion,
    /// The gateway rejected the connect attempt outright.
    Denied,
    /// The gateway stopped answering keep-alive pings.
    Timeout,
    /// The gateway acknowledged the sleep request.
    Asleep,
}

/// Final status of an asynchronous operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OperationStatus {
    Successful,
    /// The gateway answered with a congestion return code.
    Congestion,
    /// The gateway did not recognize the topic id.
    InvalidId,
    /// The gateway rejected the request as unsupported.
    NotSupported,
    /// Every retransmission attempt went unanswered.
    NoResponse,
    /// The engine was stopped while the operation was in flight.
    Aborted,
    /// The session was lost while the operation was in flight.
    GatewayDisconnected,
}

/// The kind of operation being reported by
/// [`SnPort::operation_done`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OperationKind {
    Publish,
    Subscribe,
    Unsubscribe,
    WillUpdate,
    Sleep,
    CheckMessages,
}

/// How the topic of an incoming PUBLISH was identified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceivedTopic<'a> {
    /// Resolved through the local topic id cache.
    Name(&'a str),
    /// A predefined id, or a normal id with no cache entry (QoS 0 only).
    Id(u16),
    /// A two-character short topic name.
    Short([u8; 2]),
}

/// The boundary between the protocol engine and its host.
///
/// All methods are called from inside engine entry points, on the caller's
/// stack. Implementations must not call back into the engine.
pub trait SnPort {
    /// Asks the host to wake the engine after `after_ms` milliseconds of
    /// virtual time by calling `tick(after_ms)` (or earlier, with the
    /// actually-elapsed time).
    fn program_next_tick(&mut self, after_ms: u32);

    /// Cancels the pending wakeup and returns how many milliseconds of the
    /// programmed wait have already elapsed.
    fn cancel_next_tick_wait(&mut self) -> u32;

    /// Sends one encoded frame towards the network. `radius` is the
    /// broadcast radius for SEARCHGW; zero means unicast to the active
    /// gateway.
    fn send_packet(&mut self, data: &[u8], radius: u8);

    /// A tracked gateway changed state.
    fn gateway_status(&mut self, gw_id: u8, status: GatewayStatus);

    /// The session with the active gateway changed state.
    fn connection_status(&mut self, status: ConnectionStatus);

    /// An application message arrived from the gateway.
    fn message_received(&mut self, topic: ReceivedTopic<'_>, payload: &[u8], qos: QoS, retain: bool);

    /// A previously started operation resolved.
    fn operation_done(&mut self, kind: OperationKind, status: OperationStatus);
}
