//! # Error Types
//!
//! This module defines the error types used throughout the MQTT-SN client
//! engine: synchronous precondition failures returned from API calls, and
//! the protocol-level decode errors raised by the wire codec.
//!
//! Decode errors never reach the embedding application; the message
//! dispatcher drops malformed frames on the floor, favouring robustness
//! over strictness on an unreliable datagram link.

/// A local precondition failure, returned synchronously from an API call.
///
/// These never create, mutate, or destroy the active operation; after any
/// of them the engine is in exactly the state it was in before the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClientError {
    /// The engine has not been started yet (or was stopped).
    NotStarted,
    /// `start` was called on an engine that is already running.
    AlreadyStarted,
    /// `connect` was called while a session is already established.
    AlreadyConnected,
    /// The requested operation needs an established session.
    NotConnected,
    /// Another asynchronous operation is still in flight.
    Busy,
    /// A parameter is out of range for the engine's buffer sizes or for
    /// the protocol (empty topic, oversized payload, ...).
    BadParam,
    /// `check_messages` was called while the client is not asleep.
    NotSleeping,
}

/// A wire-level decode or encode failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProtocolError {
    /// The message-type octet is not one the client understands.
    InvalidMessageType(u8),
    /// A message was shorter than its mandatory fields, or a flags field
    /// carried a reserved bit pattern.
    MalformedMessage,
    /// A topic name or client id was not valid UTF-8.
    InvalidUtf8String,
    /// The buffer provided for encoding was too small.
    BufferTooSmall,
}
