//! Async Runtime
//!
//! Glue between the sans-IO [`SnClient`](crate::SnClient) engine and an
//! Embassy-based firmware: a UDP event loop, a command channel, and the
//! handler trait through which the application consumes engine reports.
//!
//! # Overview
//!
//! The runtime owns the engine and a bound `embassy-net` UDP socket and
//! multiplexes three event sources in one task:
//!
//! - incoming datagrams, fed to the engine as they arrive
//! - the engine's programmed wakeup, turned into an `embassy-time` timer
//! - commands from other tasks, submitted through a [`ClientHandle`]
//!
//! # Object-Safe Design
//!
//! The `SnHandler` trait is dyn-compatible, allowing `&mut dyn SnHandler`
//! as a trait object. This is essential for `no_std` embedded environments
//! where you want to store handlers in `StaticCell`, pass them to Embassy
//! tasks, and keep task functions free of generic parameters.
//!
//! # Command Pattern
//!
//! Tasks never call the engine directly. They queue owned [`Command`]s
//! through a channel; the runtime applies them between await points so the
//! engine is only ever driven from one place.

pub(crate) mod commands;
pub(crate) mod event_loop;
pub(crate) mod traits;

pub use commands::{
    ClientHandle, Command, CommandChannel, CommandReceiver, CommandSender, OwnedTopic,
    PublishRequest, MAX_COMMAND_PAYLOAD,
};
pub use event_loop::{OwnedWill, QueuePort, SessionOptions, SnRuntime};
pub use traits::{HandlerPair, NoopHandler, SnHandler};

// Re-export the event vocabulary handlers are written against.
pub use crate::port::{
    ConnectionStatus, GatewayStatus, OperationKind, OperationStatus, ReceivedTopic,
};
