//! Handler trait and utilities.
//!
//! This module defines the object-safe `SnHandler` trait through which the
//! runtime delivers everything the protocol engine reports: application
//! messages, session and gateway state changes, and operation outcomes.
//!
//! # Object Safety
//!
//! The `SnHandler` trait is designed to be dyn-compatible, meaning you can
//! use `&mut dyn SnHandler` as a trait object. This is essential for
//! `no_std` embedded environments where you want to:
//!
//! - Store handlers in `StaticCell` and pass them to Embassy tasks
//! - Avoid generic type parameters on task functions
//! - Decouple runtime infrastructure from application logic
//!
//! # Synchronous Callbacks
//!
//! Handlers never perform async I/O directly. Callbacks run synchronously
//! while the engine processes a datagram; to react with an operation of
//! your own, record what is needed and issue it through a
//! [`ClientHandle`](super::ClientHandle) afterwards.

use crate::packet::QoS;
use crate::port::{ConnectionStatus, GatewayStatus, OperationKind, OperationStatus, ReceivedTopic};

/// Object-safe trait for receiving everything the client engine reports.
///
/// Implement this trait to consume incoming messages and track the session.
/// A handler is owned by the [`SnRuntime`](super::SnRuntime) and invoked
/// from its event loop.
///
/// Key design choices for object safety:
/// - No `async fn` methods (all I/O stays in the runtime)
/// - No generic type parameters on methods
/// - Transport-agnostic (handlers don't know about UDP, radios, etc.)
///
/// # Example
///
/// ```ignore
/// struct Lights {
///     on: bool,
/// }
///
/// impl SnHandler for Lights {
///     fn on_message(&mut self, topic: ReceivedTopic<'_>, payload: &[u8], _qos: QoS, _retain: bool) {
///         if let ReceivedTopic::Name("lights/set") = topic {
///             self.on = payload == b"1";
///         }
///     }
///
///     fn on_connection(&mut self, status: ConnectionStatus) {
///         if status == ConnectionStatus::Connected {
///             // schedule initial subscriptions through a ClientHandle
///         }
///     }
/// }
/// ```
pub trait SnHandler {
    /// An application message arrived from the gateway.
    ///
    /// The topic and payload borrow from the engine's receive buffer and
    /// are only valid for the duration of this call.
    fn on_message(&mut self, topic: ReceivedTopic<'_>, payload: &[u8], qos: QoS, retain: bool);

    /// The session with the active gateway changed state.
    ///
    /// The default implementation does nothing.
    fn on_connection(&mut self, _status: ConnectionStatus) {}

    /// A tracked gateway changed state.
    ///
    /// The default implementation does nothing.
    fn on_gateway(&mut self, _gw_id: u8, _status: GatewayStatus) {}

    /// A previously issued operation resolved.
    ///
    /// The default implementation does nothing.
    fn on_complete(&mut self, _kind: OperationKind, _status: OperationStatus) {}
}

/// A no-op handler that discards every event.
///
/// Useful as a placeholder or for testing.
pub struct NoopHandler;

impl SnHandler for NoopHandler {
    fn on_message(&mut self, _topic: ReceivedTopic<'_>, _payload: &[u8], _qos: QoS, _retain: bool) {
    }
}

/// A composite handler that combines two handlers into one.
///
/// Both handlers receive every event. Use this to compose independent
/// concerns (say, telemetry and actuation) into a single runtime.
pub struct HandlerPair<H1, H2> {
    /// First handler
    pub first: H1,
    /// Second handler
    pub second: H2,
}

impl<H1, H2> HandlerPair<H1, H2> {
    /// Create a new combined handler from two handlers.
    pub fn new(first: H1, second: H2) -> Self {
        Self { first, second }
    }
}

impl<H1, H2> SnHandler for HandlerPair<H1, H2>
where
    H1: SnHandler,
    H2: SnHandler,
{
    fn on_message(&mut self, topic: ReceivedTopic<'_>, payload: &[u8], qos: QoS, retain: bool) {
        self.first.on_message(topic, payload, qos, retain);
        self.second.on_message(topic, payload, qos, retain);
    }

    fn on_connection(&mut self, status: ConnectionStatus) {
        self.first.on_connection(status);
        self.second.on_connection(status);
    }

    fn on_gateway(&mut self, gw_id: u8, status: GatewayStatus) {
        self.first.on_gateway(gw_id, status);
        self.second.on_gateway(gw_id, status);
    }

    fn on_complete(&mut self, kind: OperationKind, status: OperationStatus) {
        self.first.on_complete(kind, status);
        self.second.on_complete(kind, status);
    }
}

/// Blanket implementation for mutable references to trait objects.
///
/// This allows using `&mut dyn SnHandler` wherever `SnHandler` is expected.
impl<H: SnHandler + ?Sized> SnHandler for &mut H {
    fn on_message(&mut self, topic: ReceivedTopic<'_>, payload: &[u8], qos: QoS, retain: bool) {
        (**self).on_message(topic, payload, qos, retain)
    }

    fn on_connection(&mut self, status: ConnectionStatus) {
        (**self).on_connection(status)
    }

    fn on_gateway(&mut self, gw_id: u8, status: GatewayStatus) {
        (**self).on_gateway(gw_id, status)
    }

    fn on_complete(&mut self, kind: OperationKind, status: OperationStatus) {
        (**self).on_complete(kind, status)
    }
}
