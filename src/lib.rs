//! # MQTT-SN Client for Embedded Systems
//!
//! A `no_std` compatible MQTT-SN (MQTT for Sensor Networks) client built
//! around a sans-IO protocol engine, with an optional async runtime for the
//! [Embassy](https://embassy.dev/) ecosystem.
//!
//! ## Core Features
//!
//! - **`no_std` & `no_alloc`:** Designed to run on bare-metal microcontrollers
//!   without requiring a standard library or dynamic memory allocation.
//!   Buffers are managed using `heapless`.
//! - **Sans-IO Engine:** The protocol state machine performs no I/O and keeps
//!   no real clock. It is driven by bytes, elapsed time, and operation calls,
//!   and talks back through a port trait, so it runs against any datagram
//!   transport and any scheduler.
//! - **Full Client Protocol:** Gateway discovery (ADVERTISE/SEARCHGW),
//!   connect with will handshake, topic registration, publish and subscribe
//!   at QoS −1, 0, 1 and 2, will updates, and sleeping-client support.
//! - **Async Runtime:** An optional event loop that drives the engine over
//!   an `embassy-net` UDP socket and accepts commands from other tasks
//!   through an `embassy-sync` channel.
//!
//! ## Architecture
//!
//! The crate provides two ways to use the client:
//!
//! ### 1. Direct Engine Usage
//!
//! Implement [`SnPort`] and drive [`SnClient`] yourself. This is the way to
//! go for bespoke schedulers, exotic transports, or host-side testing:
//!
//! ```ignore
//! let mut client = SnClient::<_, 4, 16, 512>::new(port, SnConfig::default());
//! client.start()?;
//! client.connect(&options)?;
//! // feed it: client.process_data(datagram), client.tick(elapsed_ms)
//! ```
//!
//! ### 2. Embassy Runtime
//!
//! Use `SnRuntime` with an `SnHandler` for firmware on an Embassy executor:
//!
//! ```ignore
//! use mqttsn_client::runtime::{ClientHandle, SnHandler, SnRuntime};
//!
//! struct MyHandler;
//!
//! impl SnHandler for MyHandler {
//!     fn on_message(&mut self, topic: ReceivedTopic<'_>, payload: &[u8], qos: QoS, retain: bool) {
//!         // Handle incoming messages
//!     }
//! }
//! ```
//!
//! Other tasks drive the session through a cloneable [`runtime::ClientHandle`]
//! backed by a channel; outcomes come back through the handler.

#![no_std]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod client;
pub mod error;
pub mod packet;
pub mod port;
pub mod runtime;
pub mod util;

// Re-export key types for easier access at the crate root.
pub use client::{
    ConnectOptions, SessionState, SnClient, SnConfig, Topic, Will, MAX_CLIENT_ID_LEN,
    MAX_TOPIC_LEN,
};
pub use error::{ClientError, ProtocolError};
pub use packet::QoS;
pub use port::{
    ConnectionStatus, GatewayStatus, OperationKind, OperationStatus, ReceivedTopic, SnPort,
};
