//! MQTT-SN Client Engine
//!
//! The engine is the client-side MQTT-SN state machine: gateway discovery,
//! connection and will handshake, topic registration, publish/subscribe at
//! QoS −1/0/1/2, sleep and wake cycles, and the retry scheduling that ties
//! them together over an unreliable datagram link.
//!
//! # Sans-IO Design
//!
//! The engine performs no I/O and keeps no real clock. It is driven by
//! exactly three external events:
//!
//! - `tick(elapsed_ms)`: time passed,
//! - `process_data(bytes)`: datagram bytes arrived,
//! - an operation call (`connect`, `publish`, ...): the application asked
//!   for something.
//!
//! Everything it needs from its environment comes through the injected
//! [`SnPort`]: sending frames, scheduling the next wakeup, and reporting
//! status changes, received messages, and operation completions. At most
//! one asynchronous operation is in flight at a time; starting a second
//! one fails with [`ClientError::Busy`].
//!
//! # Example
//!
//! ```ignore
//! let mut client = SnClient::<_, 4, 16, 512>::new(port, SnConfig::default());
//! client.start()?;
//! client.connect(&ConnectOptions {
//!     client_id: "dev1",
//!     keep_alive_s: 60,
//!     clean_session: true,
//!     will: None,
//! })?;
//! // ... the port reports ConnectionStatus::Connected once the gateway
//! // answers, after which:
//! client.publish(Topic::Name("sensors/t"), b"\x01\x02", QoS::AtLeastOnce, false)?;
//! ```

use heapless::{String, Vec};

use crate::error::ClientError;
use crate::fmt::{debug, trace, warning};
use crate::packet::{self, EncodeMessage, QoS, ReturnCode, SnPacket, TopicField, TopicIdKind};
use crate::port::{
    ConnectionStatus, GatewayStatus, OperationKind, OperationStatus, ReceivedTopic, SnPort,
};
use crate::util;

mod dedup;
mod gateway;
mod operation;
mod topics;

use dedup::InboundTracker;
use gateway::{GatewayRegistry, Tracked};
use operation::{OpDetail, Operation, WireTopic};
use topics::TopicCache;

pub use topics::MAX_TOPIC_LEN;

/// Longest client identifier the engine stores.
pub const MAX_CLIENT_ID_LEN: usize = 64;

/// PUBLISH frame bytes besides the payload, worst case.
const PUBLISH_OVERHEAD: usize = 9;

/// Lifetime assumed for a gateway learned from GWINFO, which carries no
/// readvertisement interval.
const GWINFO_DURATION_MS: u64 = 0xFFFF_FFFF;

/// State of the session with the active gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SessionState {
    Disconnected,
    Connected,
    /// Power-saving state; the gateway buffers messages until the client
    /// polls with `check_messages` or reconnects.
    Asleep,
}

/// Engine tuning, fixed at construction.
#[derive(Debug, Clone)]
pub struct SnConfig {
    /// Delay between retransmissions of an unanswered message.
    pub retry_period_ms: u32,
    /// Total transmission attempts before an operation fails.
    pub retry_count: u8,
    /// Broadcast radius for SEARCHGW.
    pub radius: u8,
    /// Whether to broadcast SEARCHGW while no gateway is known.
    pub search_gateway: bool,
}

impl Default for SnConfig {
    fn default() -> Self {
        Self {
            retry_period_ms: 10_000,
            retry_count: 5,
            radius: 1,
            search_gateway: true,
        }
    }
}

/// A will message the gateway publishes on the client's behalf when the
/// session dies unexpectedly.
#[derive(Debug, Clone, Copy)]
pub struct Will<'a> {
    pub topic: &'a str,
    pub message: &'a [u8],
    pub qos: QoS,
    pub retain: bool,
}

/// Parameters for a connect attempt.
#[derive(Debug, Clone, Copy)]
pub struct ConnectOptions<'a> {
    pub client_id: &'a str,
    /// Keep-alive period in seconds; zero disables keep-alive pings.
    pub keep_alive_s: u16,
    pub clean_session: bool,
    pub will: Option<Will<'a>>,
}

/// How the application names a topic.
///
/// A two-character `Name` is sent inline as a short topic and needs no
/// registration; longer names go through the REGISTER exchange the first
/// time they are used.
#[derive(Debug, Clone, Copy)]
pub enum Topic<'a> {
    Name(&'a str),
    /// A gateway-assigned id from an earlier registration or SUBACK.
    Id(u16),
    /// A pre-agreed id known to both sides out of band.
    Predefined(u16),
}

struct StoredWill<const P: usize> {
    topic: String<MAX_TOPIC_LEN>,
    message: Vec<u8, P>,
    qos: QoS,
    retain: bool,
}

struct PingState {
    sent_at: u64,
    attempts: u8,
}

/// The MQTT-SN client protocol engine.
///
/// `MAX_GATEWAYS` bounds the gateway registry, `MAX_TOPICS` the topic id
/// cache, and `BUF_SIZE` the frame scratch buffer and with it the largest
/// payload (send and receive).
pub struct SnClient<
    P: SnPort,
    const MAX_GATEWAYS: usize = 4,
    const MAX_TOPICS: usize = 16,
    const BUF_SIZE: usize = 512,
> {
    port: P,
    running: bool,
    session: SessionState,
    /// Virtual clock in milliseconds, advanced only by `tick` and by the
    /// elapsed time reported from `cancel_next_tick_wait`.
    clock: u64,
    api_depth: u8,

    client_id: String<MAX_CLIENT_ID_LEN>,
    keep_alive_s: u16,
    clean_session: bool,
    will: Option<StoredWill<BUF_SIZE>>,
    /// A connect is wanted as soon as a gateway shows up.
    connect_requested: bool,

    next_msg_id: u16,
    retry_period_ms: u64,
    retry_count: u8,
    radius: u8,
    search_gateway: bool,
    next_search_at: u64,
    last_tx_at: u64,

    gateways: GatewayRegistry<MAX_GATEWAYS>,
    topics: TopicCache<MAX_TOPICS>,
    inbound: InboundTracker<BUF_SIZE>,
    op: Option<Operation<BUF_SIZE>>,
    ping: Option<PingState>,
}

impl<P: SnPort, const MAX_GATEWAYS: usize, const MAX_TOPICS: usize, const BUF_SIZE: usize>
    SnClient<P, MAX_GATEWAYS, MAX_TOPICS, BUF_SIZE>
{
    pub fn new(port: P, config: SnConfig) -> Self {
        Self {
            port,
            running: false,
            session: SessionState::Disconnected,
            clock: 0,
            api_depth: 0,
            client_id: String::new(),
            keep_alive_s: 0,
            clean_session: false,
            will: None,
            connect_requested: false,
            next_msg_id: 1,
            retry_period_ms: u64::from(config.retry_period_ms),
            retry_count: config.retry_count,
            radius: config.radius,
            search_gateway: config.search_gateway,
            next_search_at: 0,
            last_tx_at: 0,
            gateways: GatewayRegistry::new(),
            topics: TopicCache::new(),
            inbound: InboundTracker::new(),
            op: None,
            ping: None,
        }
    }

    pub fn session(&self) -> SessionState {
        self.session
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    // --- lifecycle ---

    pub fn start(&mut self) -> Result<(), ClientError> {
        if self.running {
            return Err(ClientError::AlreadyStarted);
        }
        self.running = true;
        self.next_search_at = self.clock;
        debug!("engine started");
        self.program_next_wakeup();
        Ok(())
    }

    pub fn stop(&mut self) -> Result<(), ClientError> {
        if !self.running {
            return Err(ClientError::NotStarted);
        }
        self.api_enter();
        self.resolve_op(OperationStatus::Aborted);
        if self.session != SessionState::Disconnected {
            self.session = SessionState::Disconnected;
            self.port.connection_status(ConnectionStatus::Disconnected);
        }
        self.connect_requested = false;
        self.ping = None;
        self.gateways.clear();
        self.topics.clear();
        self.inbound.clear();
        self.running = false;
        self.api_exit();
        debug!("engine stopped");
        Ok(())
    }

    /// Advances the virtual clock and re-evaluates every timeout source.
    ///
    /// Evaluation order is fixed: gateway expiry, discovery, keep-alive,
    /// active-operation timeout. Afterwards the single nearest deadline is
    /// programmed through the port.
    pub fn tick(&mut self, elapsed_ms: u32) {
        if !self.running {
            return;
        }
        self.api_depth += 1;
        self.clock += u64::from(elapsed_ms);
        self.check_gateway_expiry();
        self.check_discovery();
        self.check_keepalive();
        self.check_operation_timeout();
        self.api_exit();
    }

    /// Decodes and dispatches the frames in `data`, returning how many
    /// bytes were consumed.
    ///
    /// An incomplete trailing frame is left unconsumed for the host to
    /// re-present once more bytes arrive. Frames that do not decode are
    /// dropped without an error.
    pub fn process_data(&mut self, data: &[u8]) -> usize {
        if !self.running {
            return data.len();
        }
        self.api_enter();
        let mut consumed = 0;
        while consumed < data.len() {
            match util::frame_header(&data[consumed..]) {
                Ok(None) => break,
                Ok(Some((total, header))) => {
                    if consumed + total > data.len() {
                        break;
                    }
                    let body = &data[consumed + header..consumed + total];
                    match packet::decode(body) {
                        Ok(message) => self.dispatch(message),
                        Err(_) => trace!("dropping undecodable frame"),
                    }
                    consumed += total;
                }
                Err(_) => {
                    warning!("malformed frame length, dropping {} bytes", data.len() - consumed);
                    consumed = data.len();
                }
            }
        }
        self.api_exit();
        consumed
    }

    // --- operations ---

    /// Stores the session parameters and connects to the active gateway,
    /// or to the first gateway discovered when none is known yet.
    ///
    /// The outcome is reported through `connection_status`.
    pub fn connect(&mut self, options: &ConnectOptions<'_>) -> Result<(), ClientError> {
        self.api_enter();
        let result = self.connect_inner(options);
        self.api_exit();
        result
    }

    pub fn disconnect(&mut self) -> Result<(), ClientError> {
        self.api_enter();
        let result = self.disconnect_inner();
        self.api_exit();
        result
    }

    /// Publishes a message.
    ///
    /// QoS −1 and QoS 0 publishes with a resolvable topic complete
    /// synchronously; everything else resolves through `operation_done`.
    pub fn publish(
        &mut self,
        topic: Topic<'_>,
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) -> Result<(), ClientError> {
        self.api_enter();
        let result = self.publish_inner(topic, payload, qos, retain);
        self.api_exit();
        result
    }

    pub fn subscribe(&mut self, topic: Topic<'_>, qos: QoS) -> Result<(), ClientError> {
        self.api_enter();
        let result = self.subscribe_inner(topic, qos);
        self.api_exit();
        result
    }

    pub fn unsubscribe(&mut self, topic: Topic<'_>) -> Result<(), ClientError> {
        self.api_enter();
        let result = self.unsubscribe_inner(topic);
        self.api_exit();
        result
    }

    /// Replaces the stored will (topic, then message, in one chained
    /// operation), or deletes it when `will` is `None`.
    pub fn will_update(&mut self, will: Option<&Will<'_>>) -> Result<(), ClientError> {
        self.api_enter();
        let result = self.will_update_inner(will);
        self.api_exit();
        result
    }

    pub fn will_topic_update(
        &mut self,
        topic: &str,
        qos: QoS,
        retain: bool,
    ) -> Result<(), ClientError> {
        self.api_enter();
        let result = self.will_topic_update_inner(topic, qos, retain);
        self.api_exit();
        result
    }

    pub fn will_msg_update(&mut self, message: &[u8]) -> Result<(), ClientError> {
        self.api_enter();
        let result = self.will_msg_update_inner(message);
        self.api_exit();
        result
    }

    /// Asks the gateway to buffer messages for `duration_s` seconds.
    ///
    /// The session transitions to `Asleep` only on the gateway's
    /// acknowledging DISCONNECT.
    pub fn sleep(&mut self, duration_s: u16) -> Result<(), ClientError> {
        self.api_enter();
        let result = self.sleep_inner(duration_s);
        self.api_exit();
        result
    }

    /// Polls the gateway for messages buffered while asleep.
    pub fn check_messages(&mut self) -> Result<(), ClientError> {
        self.api_enter();
        let result = self.check_messages_inner();
        self.api_exit();
        result
    }

    /// Destroys the active operation, if any, reporting it `Aborted`.
    /// Also forgets a connect request still waiting for a gateway.
    pub fn cancel(&mut self) {
        self.api_enter();
        self.connect_requested = false;
        self.resolve_op(OperationStatus::Aborted);
        self.api_exit();
    }

    // --- operation entry points ---

    fn connect_inner(&mut self, options: &ConnectOptions<'_>) -> Result<(), ClientError> {
        if !self.running {
            return Err(ClientError::NotStarted);
        }
        if self.session == SessionState::Connected {
            return Err(ClientError::AlreadyConnected);
        }
        if self.op.is_some() {
            return Err(ClientError::Busy);
        }
        if options.client_id.is_empty() {
            return Err(ClientError::BadParam);
        }
        let mut client_id: String<MAX_CLIENT_ID_LEN> = String::new();
        client_id
            .push_str(options.client_id)
            .map_err(|_| ClientError::BadParam)?;
        let will = match &options.will {
            Some(w) => Some(store_will::<BUF_SIZE>(w)?),
            None => None,
        };

        self.client_id = client_id;
        self.keep_alive_s = options.keep_alive_s;
        self.clean_session = options.clean_session;
        self.will = will;
        if self.gateways.is_empty() {
            debug!("no gateway known yet, connect deferred until discovery");
            self.connect_requested = true;
        } else {
            self.start_connect_op();
        }
        Ok(())
    }

    fn disconnect_inner(&mut self) -> Result<(), ClientError> {
        if !self.running {
            return Err(ClientError::NotStarted);
        }
        if self.op.is_some() {
            return Err(ClientError::Busy);
        }
        if self.session == SessionState::Disconnected {
            return Err(ClientError::NotConnected);
        }
        self.op = Some(Operation::new(self.clock, OpDetail::Disconnect));
        self.transmit_current(false);
        Ok(())
    }

    fn publish_inner(
        &mut self,
        topic: Topic<'_>,
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) -> Result<(), ClientError> {
        if !self.running {
            return Err(ClientError::NotStarted);
        }
        if self.op.is_some() {
            return Err(ClientError::Busy);
        }
        if payload.len() + PUBLISH_OVERHEAD > BUF_SIZE {
            return Err(ClientError::BadParam);
        }

        if qos == QoS::MinusOne {
            // no session required, but the topic must be resolvable
            // without one
            let wire = wire_of(topic)?;
            self.send_publish(wire, 0, payload, qos, retain);
            self.port
                .operation_done(OperationKind::Publish, OperationStatus::Successful);
            return Ok(());
        }
        if self.session != SessionState::Connected {
            return Err(ClientError::NotConnected);
        }

        match topic {
            Topic::Name(name) if name.len() != 2 => {
                if name.is_empty() || name.len() > MAX_TOPIC_LEN {
                    return Err(ClientError::BadParam);
                }
                if let Some(id) = self.topics.lookup(name, self.clock) {
                    if qos == QoS::AtMostOnce {
                        self.send_publish(WireTopic::Normal(id), 0, payload, qos, retain);
                        self.port
                            .operation_done(OperationKind::Publish, OperationStatus::Successful);
                        return Ok(());
                    }
                    self.topics.set_locked(id, true);
                    let msg_id = self.take_msg_id();
                    self.op = Some(Operation::new(
                        self.clock,
                        OpDetail::Publish {
                            name: owned_name(name)?,
                            payload: owned_payload(payload)?,
                            qos,
                            retain,
                            msg_id,
                            topic_id: id,
                            registered: true,
                            from_cache: true,
                            ack_received: false,
                            recovered: false,
                        },
                    ));
                } else {
                    let msg_id = self.take_msg_id();
                    self.op = Some(Operation::new(
                        self.clock,
                        OpDetail::Publish {
                            name: owned_name(name)?,
                            payload: owned_payload(payload)?,
                            qos,
                            retain,
                            msg_id,
                            topic_id: 0,
                            registered: false,
                            from_cache: false,
                            ack_received: false,
                            recovered: false,
                        },
                    ));
                }
                self.transmit_current(false);
            }
            topic => {
                let wire = wire_of(topic)?;
                if qos == QoS::AtMostOnce {
                    self.send_publish(wire, 0, payload, qos, retain);
                    self.port
                        .operation_done(OperationKind::Publish, OperationStatus::Successful);
                    return Ok(());
                }
                let msg_id = self.take_msg_id();
                self.op = Some(Operation::new(
                    self.clock,
                    OpDetail::PublishById {
                        topic: wire,
                        payload: owned_payload(payload)?,
                        qos,
                        retain,
                        msg_id,
                        ack_received: false,
                    },
                ));
                self.transmit_current(false);
            }
        }
        Ok(())
    }

    fn subscribe_inner(&mut self, topic: Topic<'_>, qos: QoS) -> Result<(), ClientError> {
        if !self.running {
            return Err(ClientError::NotStarted);
        }
        if self.op.is_some() {
            return Err(ClientError::Busy);
        }
        if self.session != SessionState::Connected {
            return Err(ClientError::NotConnected);
        }
        if qos == QoS::MinusOne {
            return Err(ClientError::BadParam);
        }
        let detail = match topic {
            Topic::Name(name) if name.len() != 2 => {
                if name.is_empty() || name.len() > MAX_TOPIC_LEN {
                    return Err(ClientError::BadParam);
                }
                let name = owned_name(name)?;
                OpDetail::Subscribe {
                    name,
                    qos,
                    msg_id: self.take_msg_id(),
                }
            }
            topic => {
                let topic = wire_of(topic)?;
                OpDetail::SubscribeById {
                    topic,
                    qos,
                    msg_id: self.take_msg_id(),
                    recovered: false,
                }
            }
        };
        self.op = Some(Operation::new(self.clock, detail));
        self.transmit_current(false);
        Ok(())
    }

    fn unsubscribe_inner(&mut self, topic: Topic<'_>) -> Result<(), ClientError> {
        if !self.running {
            return Err(ClientError::NotStarted);
        }
        if self.op.is_some() {
            return Err(ClientError::Busy);
        }
        if self.session != SessionState::Connected {
            return Err(ClientError::NotConnected);
        }
        let detail = match topic {
            Topic::Name(name) if name.len() != 2 => {
                if name.is_empty() || name.len() > MAX_TOPIC_LEN {
                    return Err(ClientError::BadParam);
                }
                let name = owned_name(name)?;
                OpDetail::Unsubscribe {
                    name,
                    msg_id: self.take_msg_id(),
                }
            }
            topic => {
                let topic = wire_of(topic)?;
                OpDetail::UnsubscribeById {
                    topic,
                    msg_id: self.take_msg_id(),
                }
            }
        };
        self.op = Some(Operation::new(self.clock, detail));
        self.transmit_current(false);
        Ok(())
    }

    fn will_update_inner(&mut self, will: Option<&Will<'_>>) -> Result<(), ClientError> {
        if !self.running {
            return Err(ClientError::NotStarted);
        }
        if self.op.is_some() {
            return Err(ClientError::Busy);
        }
        if self.session != SessionState::Connected {
            return Err(ClientError::NotConnected);
        }
        let chain = match will {
            Some(w) => {
                self.will = Some(store_will::<BUF_SIZE>(w)?);
                true
            }
            None => {
                self.will = None;
                false
            }
        };
        self.op = Some(Operation::new(self.clock, OpDetail::WillTopicUpdate { chain }));
        self.transmit_current(false);
        Ok(())
    }

    fn will_topic_update_inner(
        &mut self,
        topic: &str,
        qos: QoS,
        retain: bool,
    ) -> Result<(), ClientError> {
        if !self.running {
            return Err(ClientError::NotStarted);
        }
        if self.op.is_some() {
            return Err(ClientError::Busy);
        }
        if self.session != SessionState::Connected {
            return Err(ClientError::NotConnected);
        }
        if topic.is_empty() {
            return Err(ClientError::BadParam);
        }
        let owned = owned_name(topic)?;
        match &mut self.will {
            Some(w) => {
                w.topic = owned;
                w.qos = qos;
                w.retain = retain;
            }
            None => {
                self.will = Some(StoredWill {
                    topic: owned,
                    message: Vec::new(),
                    qos,
                    retain,
                });
            }
        }
        self.op = Some(Operation::new(
            self.clock,
            OpDetail::WillTopicUpdate { chain: false },
        ));
        self.transmit_current(false);
        Ok(())
    }

    fn will_msg_update_inner(&mut self, message: &[u8]) -> Result<(), ClientError> {
        if !self.running {
            return Err(ClientError::NotStarted);
        }
        if self.op.is_some() {
            return Err(ClientError::Busy);
        }
        if self.session != SessionState::Connected {
            return Err(ClientError::NotConnected);
        }
        let owned = owned_payload(message)?;
        let Some(w) = &mut self.will else {
            return Err(ClientError::BadParam);
        };
        w.message = owned;
        self.op = Some(Operation::new(self.clock, OpDetail::WillMsgUpdate));
        self.transmit_current(false);
        Ok(())
    }

    fn sleep_inner(&mut self, duration_s: u16) -> Result<(), ClientError> {
        if !self.running {
            return Err(ClientError::NotStarted);
        }
        if self.op.is_some() {
            return Err(ClientError::Busy);
        }
        if self.session != SessionState::Connected {
            return Err(ClientError::NotConnected);
        }
        if duration_s == 0 {
            return Err(ClientError::BadParam);
        }
        self.op = Some(Operation::new(self.clock, OpDetail::Sleep { duration_s }));
        self.transmit_current(false);
        Ok(())
    }

    fn check_messages_inner(&mut self) -> Result<(), ClientError> {
        if !self.running {
            return Err(ClientError::NotStarted);
        }
        if self.op.is_some() {
            return Err(ClientError::Busy);
        }
        if self.session != SessionState::Asleep {
            return Err(ClientError::NotSleeping);
        }
        self.op = Some(Operation::new(self.clock, OpDetail::CheckMessages));
        self.transmit_current(false);
        Ok(())
    }

    // --- scheduling ---

    fn api_enter(&mut self) {
        self.api_depth += 1;
        if self.api_depth == 1 && self.running {
            let elapsed = self.port.cancel_next_tick_wait();
            self.clock += u64::from(elapsed);
        }
    }

    fn api_exit(&mut self) {
        self.api_depth -= 1;
        if self.api_depth == 0 && self.running {
            self.program_next_wakeup();
        }
    }

    fn program_next_wakeup(&mut self) {
        let mut next = self.gateways.next_expiry();
        if self.search_gateway && self.gateways.is_empty() {
            // floor of one millisecond so an overdue search never
            // busy-loops the host
            next = min_deadline(next, self.next_search_at.max(self.clock + 1));
        }
        if let Some(op) = &self.op {
            next = min_deadline(next, op.sent_at + self.retry_period_ms);
        }
        if self.session == SessionState::Connected && self.keep_alive_s != 0 {
            let at = match &self.ping {
                Some(ping) => ping.sent_at + self.retry_period_ms,
                None => self.last_tx_at + self.keep_alive_ms(),
            };
            next = min_deadline(next, at);
        }
        if let Some(at) = next {
            let wait = at.saturating_sub(self.clock).max(1);
            self.port
                .program_next_tick(u32::try_from(wait).unwrap_or(u32::MAX));
        }
    }

    fn check_gateway_expiry(&mut self) {
        let expired = self.gateways.expire_stale(self.clock);
        for id in &expired {
            warning!("gateway {} timed out", *id);
            self.port.gateway_status(*id, GatewayStatus::TimedOut);
        }
    }

    fn check_discovery(&mut self) {
        if !self.search_gateway || !self.gateways.is_empty() {
            return;
        }
        if self.clock < self.next_search_at {
            return;
        }
        trace!("broadcasting gateway search");
        let msg = packet::SearchGw {
            radius: self.radius,
        };
        Self::emit(&mut self.port, &mut self.last_tx_at, self.clock, &msg, self.radius);
        self.next_search_at = self.clock + self.retry_period_ms;
    }

    fn check_keepalive(&mut self) {
        if self.session != SessionState::Connected || self.keep_alive_s == 0 {
            return;
        }
        if let Some(ping) = &mut self.ping {
            if self.clock < ping.sent_at + self.retry_period_ms {
                return;
            }
            if ping.attempts >= self.retry_count {
                self.keepalive_failed();
                return;
            }
            ping.attempts += 1;
            ping.sent_at = self.clock;
            self.send_msg(&packet::PingReq { client_id: None });
        } else if self.clock >= self.last_tx_at + self.keep_alive_ms() {
            self.ping = Some(PingState {
                sent_at: self.clock,
                attempts: 1,
            });
            self.send_msg(&packet::PingReq { client_id: None });
        }
    }

    fn keepalive_failed(&mut self) {
        warning!("gateway stopped answering keep-alive pings");
        self.ping = None;
        self.session = SessionState::Disconnected;
        self.resolve_op(OperationStatus::GatewayDisconnected);
        if let Some(id) = self.gateways.first_id() {
            self.gateways.discard(id);
            self.port.gateway_status(id, GatewayStatus::Discarded);
        }
        self.port.connection_status(ConnectionStatus::Timeout);
    }

    fn check_operation_timeout(&mut self) {
        let Some(op) = &mut self.op else {
            return;
        };
        if self.clock < op.sent_at + self.retry_period_ms {
            return;
        }
        if op.attempts >= self.retry_count {
            let status = if op.saw_congestion {
                OperationStatus::Congestion
            } else {
                OperationStatus::NoResponse
            };
            self.resolve_op(status);
            return;
        }
        op.attempts += 1;
        op.sent_at = self.clock;
        self.resend_for_retry(true);
    }

    /// Retransmits the current step. A connect restarts the whole
    /// handshake, so its will sub-step flags are reset first.
    fn resend_for_retry(&mut self, dup: bool) {
        if let Some(op) = &mut self.op {
            if let OpDetail::Connect {
                will_topic_sent,
                will_msg_sent,
                ..
            } = &mut op.detail
            {
                *will_topic_sent = false;
                *will_msg_sent = false;
            }
        }
        self.transmit_current(dup);
    }

    /// A step was answered with a congestion code: retransmit it right
    /// away, spending one attempt, and remember the congestion so an
    /// eventual exhaustion resolves `Congestion` rather than `NoResponse`.
    fn handle_congestion(&mut self) {
        let Some(op) = &mut self.op else {
            return;
        };
        op.saw_congestion = true;
        if op.attempts >= self.retry_count {
            self.resolve_op(OperationStatus::Congestion);
            return;
        }
        op.attempts += 1;
        op.sent_at = self.clock;
        self.resend_for_retry(true);
    }

    // --- operation resolution ---

    /// Destroys the active operation and reports its outcome. Connect,
    /// Disconnect and Sleep double as session transitions and report
    /// through `connection_status`.
    fn resolve_op(&mut self, status: OperationStatus) {
        let Some(op) = self.op.take() else {
            return;
        };
        if let OpDetail::Publish {
            topic_id,
            registered: true,
            ..
        } = &op.detail
        {
            self.topics.set_locked(*topic_id, false);
        }
        match &op.detail {
            OpDetail::Connect { .. } => {
                let report = match status {
                    OperationStatus::Successful => {
                        debug!("session established");
                        self.session = SessionState::Connected;
                        ConnectionStatus::Connected
                    }
                    OperationStatus::Congestion => ConnectionStatus::Congestion,
                    OperationStatus::NoResponse => ConnectionStatus::Timeout,
                    OperationStatus::InvalidId | OperationStatus::NotSupported => {
                        ConnectionStatus::Denied
                    }
                    OperationStatus::Aborted | OperationStatus::GatewayDisconnected => {
                        ConnectionStatus::Disconnected
                    }
                };
                self.port.connection_status(report);
            }
            OpDetail::Disconnect => {
                debug!("session closed");
                self.session = SessionState::Disconnected;
                self.ping = None;
                self.port.connection_status(ConnectionStatus::Disconnected);
            }
            OpDetail::Sleep { .. } => {
                if status == OperationStatus::Successful {
                    debug!("entering sleep");
                    self.session = SessionState::Asleep;
                    self.ping = None;
                    self.port.connection_status(ConnectionStatus::Asleep);
                }
                self.port.operation_done(OperationKind::Sleep, status);
            }
            detail => {
                if let Some(kind) = detail.kind() {
                    self.port.operation_done(kind, status);
                }
            }
        }
    }

    // --- inbound dispatch ---

    fn dispatch(&mut self, message: SnPacket<'_>) {
        match message {
            SnPacket::Advertise(m) => {
                let duration_ms = u64::from(m.duration) * 1000;
                self.track_gateway(m.gw_id, duration_ms);
            }
            SnPacket::GwInfo(m) => self.track_gateway(m.gw_id, GWINFO_DURATION_MS),
            SnPacket::ConnAck(m) => self.on_connack(m),
            SnPacket::WillTopicReq => self.on_will_topic_req(),
            SnPacket::WillMsgReq => self.on_will_msg_req(),
            SnPacket::Register(m) => self.on_register(m),
            SnPacket::RegAck(m) => self.on_regack(m),
            SnPacket::Publish(m) => self.on_publish(m),
            SnPacket::PubAck(m) => self.on_puback(m),
            SnPacket::PubRec(m) => self.on_pubrec(m),
            SnPacket::PubRel(m) => self.on_pubrel(m),
            SnPacket::PubComp(m) => self.on_pubcomp(m),
            SnPacket::SubAck(m) => self.on_suback(m),
            SnPacket::UnsubAck(m) => self.on_unsuback(m),
            SnPacket::PingReq(_) => self.send_msg(&SnPacket::PingResp),
            SnPacket::PingResp => self.on_pingresp(),
            SnPacket::Disconnect(_) => self.on_disconnect(),
            SnPacket::WillTopicResp(m) => self.on_will_topic_resp(m),
            SnPacket::WillMsgResp(m) => self.on_will_msg_resp(m),
            _ => trace!("ignoring gateway-bound message"),
        }
    }

    fn track_gateway(&mut self, id: u8, duration_ms: u64) {
        match self.gateways.track(id, duration_ms, self.clock) {
            Tracked::New => {
                debug!("gateway {} available", id);
                self.port.gateway_status(id, GatewayStatus::Available);
                self.maybe_auto_connect();
            }
            Tracked::Refreshed => {}
            Tracked::Full => trace!("gateway table full, ignoring gateway {}", id),
        }
    }

    fn maybe_auto_connect(&mut self) {
        if self.connect_requested
            && self.session == SessionState::Disconnected
            && self.op.is_none()
        {
            self.start_connect_op();
        }
    }

    fn start_connect_op(&mut self) {
        self.connect_requested = false;
        debug!("connecting to gateway");
        self.op = Some(Operation::new(
            self.clock,
            OpDetail::Connect {
                will_topic_sent: false,
                will_msg_sent: false,
                acked: false,
            },
        ));
        self.transmit_current(false);
    }

    fn on_connack(&mut self, m: packet::ConnAck) {
        let Some(op) = &self.op else {
            return;
        };
        let OpDetail::Connect {
            will_topic_sent,
            will_msg_sent,
            ..
        } = &op.detail
        else {
            return;
        };
        match m.code {
            ReturnCode::Accepted => {
                let will_pending = self.will.is_some() && !(*will_topic_sent && *will_msg_sent);
                if will_pending {
                    if let Some(op) = &mut self.op {
                        if let OpDetail::Connect { acked, .. } = &mut op.detail {
                            *acked = true;
                        }
                    }
                } else {
                    self.resolve_op(OperationStatus::Successful);
                }
            }
            ReturnCode::Congestion => self.handle_congestion(),
            _ => self.resolve_op(OperationStatus::NotSupported),
        }
    }

    fn on_will_topic_req(&mut self) {
        let Some(op) = &self.op else {
            return;
        };
        if !matches!(op.detail, OpDetail::Connect { .. }) {
            return;
        }
        let Some(w) = &self.will else {
            return;
        };
        let msg = packet::WillTopic {
            qos: w.qos,
            retain: w.retain,
            topic: w.topic.as_str(),
        };
        Self::emit(&mut self.port, &mut self.last_tx_at, self.clock, &msg, 0);
        if let Some(op) = &mut self.op {
            op.sent_at = self.clock;
            op.attempts = 1;
            if let OpDetail::Connect {
                will_topic_sent, ..
            } = &mut op.detail
            {
                *will_topic_sent = true;
            }
        }
    }

    fn on_will_msg_req(&mut self) {
        let Some(op) = &self.op else {
            return;
        };
        if !matches!(op.detail, OpDetail::Connect { .. }) {
            return;
        }
        let Some(w) = &self.will else {
            return;
        };
        let msg = packet::WillMsg { data: &w.message };
        Self::emit(&mut self.port, &mut self.last_tx_at, self.clock, &msg, 0);
        let mut complete = false;
        if let Some(op) = &mut self.op {
            op.sent_at = self.clock;
            op.attempts = 1;
            if let OpDetail::Connect {
                will_topic_sent,
                will_msg_sent,
                acked,
            } = &mut op.detail
            {
                *will_msg_sent = true;
                complete = *acked && *will_topic_sent;
            }
        }
        if complete {
            self.resolve_op(OperationStatus::Successful);
        }
    }

    /// Gateway-initiated REGISTER: cache the mapping and acknowledge.
    fn on_register(&mut self, m: packet::Register<'_>) {
        let code = if m.topic.len() > MAX_TOPIC_LEN {
            ReturnCode::NotSupported
        } else if self.topics.register(m.topic, m.topic_id, false, self.clock) {
            ReturnCode::Accepted
        } else {
            // every slot pinned by the active operation
            ReturnCode::Congestion
        };
        let msg = packet::RegAck {
            topic_id: m.topic_id,
            msg_id: m.msg_id,
            code,
        };
        self.send_msg(&msg);
    }

    fn on_regack(&mut self, m: packet::RegAck) {
        let qos = {
            let Some(op) = &self.op else {
                return;
            };
            let OpDetail::Publish {
                registered: false,
                msg_id,
                qos,
                ..
            } = &op.detail
            else {
                return;
            };
            if *msg_id != m.msg_id {
                return;
            }
            *qos
        };
        match m.code {
            ReturnCode::Accepted => {}
            ReturnCode::Congestion => {
                self.handle_congestion();
                return;
            }
            ReturnCode::InvalidTopicId => {
                self.resolve_op(OperationStatus::InvalidId);
                return;
            }
            _ => {
                self.resolve_op(OperationStatus::NotSupported);
                return;
            }
        }
        // MsgId is coded 0x0000 when no acknowledgement will follow
        let pub_msg_id = if qos == QoS::AtMostOnce {
            0
        } else {
            self.take_msg_id()
        };
        let mut complete_now = false;
        if let Some(op) = &mut self.op {
            op.attempts = 1;
            op.sent_at = self.clock;
            if let OpDetail::Publish {
                name,
                msg_id,
                topic_id,
                registered,
                qos,
                ..
            } = &mut op.detail
            {
                self.topics.register(name.as_str(), m.topic_id, true, self.clock);
                *topic_id = m.topic_id;
                *msg_id = pub_msg_id;
                *registered = true;
                complete_now = *qos == QoS::AtMostOnce;
            }
        }
        self.transmit_current(false);
        if complete_now {
            self.resolve_op(OperationStatus::Successful);
        }
    }

    /// Inbound application message, dispatched by QoS.
    fn on_publish(&mut self, m: packet::Publish<'_>) {
        match m.qos {
            QoS::MinusOne | QoS::AtMostOnce => {
                Self::deliver(
                    &self.topics,
                    &mut self.port,
                    m.topic_kind,
                    m.topic_id,
                    m.payload,
                    m.qos,
                    m.retain,
                );
            }
            QoS::AtLeastOnce => {
                if m.topic_kind == TopicIdKind::Normal
                    && self.topics.lookup_name(m.topic_id).is_none()
                {
                    self.send_puback(m.topic_id, m.msg_id, ReturnCode::InvalidTopicId);
                    return;
                }
                Self::deliver(
                    &self.topics,
                    &mut self.port,
                    m.topic_kind,
                    m.topic_id,
                    m.payload,
                    m.qos,
                    m.retain,
                );
                self.send_puback(m.topic_id, m.msg_id, ReturnCode::Accepted);
            }
            QoS::ExactlyOnce => {
                if m.topic_kind == TopicIdKind::Normal
                    && self.topics.lookup_name(m.topic_id).is_none()
                {
                    self.send_puback(m.topic_id, m.msg_id, ReturnCode::InvalidTopicId);
                    return;
                }
                self.inbound
                    .on_publish(m.topic_kind, m.topic_id, m.msg_id, m.retain, m.dup, m.payload);
                self.send_msg(&packet::PubRec { msg_id: m.msg_id });
            }
        }
    }

    fn on_puback(&mut self, m: packet::PubAck) {
        let Some(op) = &self.op else {
            return;
        };
        match &op.detail {
            OpDetail::Publish {
                registered: true,
                msg_id,
                qos,
                from_cache,
                recovered,
                ..
            } if *msg_id == m.msg_id => match m.code {
                ReturnCode::Accepted if *qos == QoS::AtLeastOnce => {
                    self.resolve_op(OperationStatus::Successful)
                }
                ReturnCode::Accepted => {}
                ReturnCode::Congestion => self.handle_congestion(),
                ReturnCode::InvalidTopicId if *from_cache && !*recovered => self.recover_publish(),
                ReturnCode::InvalidTopicId => self.resolve_op(OperationStatus::InvalidId),
                _ => self.resolve_op(OperationStatus::NotSupported),
            },
            OpDetail::PublishById { msg_id, qos, .. } if *msg_id == m.msg_id => match m.code {
                ReturnCode::Accepted if *qos == QoS::AtLeastOnce => {
                    self.resolve_op(OperationStatus::Successful)
                }
                ReturnCode::Accepted => {}
                ReturnCode::Congestion => self.handle_congestion(),
                ReturnCode::InvalidTopicId => self.resolve_op(OperationStatus::InvalidId),
                _ => self.resolve_op(OperationStatus::NotSupported),
            },
            _ => {}
        }
    }

    /// The gateway rejected a cached topic id: drop the stale entry and
    /// restart from the registration step, once.
    fn recover_publish(&mut self) {
        debug!("cached topic id rejected, re-registering");
        let reg_msg_id = self.take_msg_id();
        let Some(op) = &mut self.op else {
            return;
        };
        let OpDetail::Publish {
            topic_id,
            msg_id,
            registered,
            from_cache,
            recovered,
            ..
        } = &mut op.detail
        else {
            return;
        };
        self.topics.drop_id(*topic_id);
        *registered = false;
        *from_cache = false;
        *recovered = true;
        *msg_id = reg_msg_id;
        op.attempts = 1;
        op.sent_at = self.clock;
        self.transmit_current(false);
    }

    fn on_pubrec(&mut self, m: packet::PubRec) {
        let Some(op) = &mut self.op else {
            return;
        };
        let matched = match &mut op.detail {
            OpDetail::Publish {
                registered: true,
                qos: QoS::ExactlyOnce,
                msg_id,
                ack_received,
                ..
            }
            | OpDetail::PublishById {
                qos: QoS::ExactlyOnce,
                msg_id,
                ack_received,
                ..
            } if *msg_id == m.msg_id => {
                if !*ack_received {
                    *ack_received = true;
                    op.attempts = 1;
                }
                op.sent_at = self.clock;
                true
            }
            _ => false,
        };
        if matched {
            // a repeated PUBREC means the release was lost; answer again
            self.transmit_current(false);
        }
    }

    fn on_pubrel(&mut self, m: packet::PubRel) {
        if let Some((kind, topic_id, retain, payload)) = self.inbound.on_release(m.msg_id) {
            Self::deliver(
                &self.topics,
                &mut self.port,
                kind,
                topic_id,
                payload,
                QoS::ExactlyOnce,
                retain,
            );
        }
        // answered even for an unknown id: the gateway is closing a
        // handshake this client no longer tracks
        self.send_msg(&packet::PubComp { msg_id: m.msg_id });
    }

    fn on_pubcomp(&mut self, m: packet::PubComp) {
        let Some(op) = &self.op else {
            return;
        };
        match &op.detail {
            OpDetail::Publish {
                ack_received: true,
                msg_id,
                ..
            }
            | OpDetail::PublishById {
                ack_received: true,
                msg_id,
                ..
            } if *msg_id == m.msg_id => self.resolve_op(OperationStatus::Successful),
            _ => {}
        }
    }

    fn on_suback(&mut self, m: packet::SubAck) {
        let Some(op) = &self.op else {
            return;
        };
        match &op.detail {
            OpDetail::Subscribe { name, msg_id, .. } if *msg_id == m.msg_id => match m.code {
                ReturnCode::Accepted => {
                    if m.topic_id != 0 {
                        self.topics.register(name.as_str(), m.topic_id, false, self.clock);
                    }
                    self.resolve_op(OperationStatus::Successful);
                }
                ReturnCode::Congestion => self.handle_congestion(),
                ReturnCode::InvalidTopicId => self.resolve_op(OperationStatus::InvalidId),
                _ => self.resolve_op(OperationStatus::NotSupported),
            },
            OpDetail::SubscribeById {
                topic,
                qos,
                msg_id,
                recovered,
            } if *msg_id == m.msg_id => match m.code {
                ReturnCode::Accepted => self.resolve_op(OperationStatus::Successful),
                ReturnCode::Congestion => self.handle_congestion(),
                ReturnCode::InvalidTopicId => {
                    if let (WireTopic::Normal(id), false) = (topic, recovered) {
                        let id = *id;
                        let qos = *qos;
                        self.recover_subscribe(id, qos);
                    } else {
                        self.resolve_op(OperationStatus::InvalidId);
                    }
                }
                _ => self.resolve_op(OperationStatus::NotSupported),
            },
            _ => {}
        }
    }

    /// A cached id was rejected mid-subscribe: fall back to the topic
    /// name the cache still knows, with a fresh attempt budget.
    fn recover_subscribe(&mut self, id: u16, qos: QoS) {
        let Some(name) = self.topics.lookup_name(id) else {
            self.resolve_op(OperationStatus::InvalidId);
            return;
        };
        let mut owned: String<MAX_TOPIC_LEN> = String::new();
        if owned.push_str(name).is_err() {
            self.resolve_op(OperationStatus::InvalidId);
            return;
        }
        debug!("cached topic id rejected, subscribing by name");
        self.topics.drop_id(id);
        let msg_id = self.take_msg_id();
        if let Some(op) = &mut self.op {
            op.attempts = 1;
            op.sent_at = self.clock;
            op.detail = OpDetail::Subscribe {
                name: owned,
                qos,
                msg_id,
            };
        }
        self.transmit_current(false);
    }

    fn on_unsuback(&mut self, m: packet::UnsubAck) {
        let Some(op) = &self.op else {
            return;
        };
        match &op.detail {
            OpDetail::Unsubscribe { msg_id, .. } | OpDetail::UnsubscribeById { msg_id, .. }
                if *msg_id == m.msg_id =>
            {
                self.resolve_op(OperationStatus::Successful)
            }
            _ => {}
        }
    }

    fn on_pingresp(&mut self) {
        // a keep-alive ping in flight claims the response first
        if self.ping.take().is_some() {
            return;
        }
        let Some(op) = &self.op else {
            return;
        };
        if matches!(op.detail, OpDetail::CheckMessages) {
            self.resolve_op(OperationStatus::Successful);
        }
    }

    fn on_disconnect(&mut self) {
        if let Some(op) = &self.op {
            match op.detail {
                OpDetail::Sleep { .. } | OpDetail::Disconnect => {
                    self.resolve_op(OperationStatus::Successful);
                    return;
                }
                _ => {}
            }
        }
        // unsolicited: the gateway ended the session
        self.ping = None;
        let was_active = self.session != SessionState::Disconnected;
        self.session = SessionState::Disconnected;
        self.resolve_op(OperationStatus::GatewayDisconnected);
        if was_active {
            warning!("gateway closed the session");
            self.port.connection_status(ConnectionStatus::Disconnected);
        }
    }

    fn on_will_topic_resp(&mut self, m: packet::WillTopicResp) {
        let Some(op) = &self.op else {
            return;
        };
        let OpDetail::WillTopicUpdate { chain } = &op.detail else {
            return;
        };
        let chain = *chain;
        match m.code {
            ReturnCode::Accepted if chain => {
                if let Some(op) = &mut self.op {
                    op.attempts = 1;
                    op.sent_at = self.clock;
                    op.detail = OpDetail::WillMsgUpdate;
                }
                self.transmit_current(false);
            }
            ReturnCode::Accepted => self.resolve_op(OperationStatus::Successful),
            ReturnCode::Congestion => self.handle_congestion(),
            ReturnCode::InvalidTopicId => self.resolve_op(OperationStatus::InvalidId),
            _ => self.resolve_op(OperationStatus::NotSupported),
        }
    }

    fn on_will_msg_resp(&mut self, m: packet::WillMsgResp) {
        let Some(op) = &self.op else {
            return;
        };
        if !matches!(op.detail, OpDetail::WillMsgUpdate) {
            return;
        }
        match m.code {
            ReturnCode::Accepted => self.resolve_op(OperationStatus::Successful),
            ReturnCode::Congestion => self.handle_congestion(),
            ReturnCode::InvalidTopicId => self.resolve_op(OperationStatus::InvalidId),
            _ => self.resolve_op(OperationStatus::NotSupported),
        }
    }

    // --- transmission ---

    /// Encodes `msg` and hands the frame to the port.
    ///
    /// An associated function rather than a method so callers can hold
    /// borrows of other engine fields while the message is built.
    fn emit<M: EncodeMessage>(port: &mut P, last_tx_at: &mut u64, clock: u64, msg: &M, radius: u8) {
        let mut buf = [0u8; BUF_SIZE];
        match msg.encode(&mut buf) {
            Ok(n) => {
                *last_tx_at = clock;
                port.send_packet(&buf[..n], radius);
            }
            Err(_) => warning!("dropping message that does not fit the send buffer"),
        }
    }

    fn send_msg<M: EncodeMessage>(&mut self, msg: &M) {
        Self::emit(&mut self.port, &mut self.last_tx_at, self.clock, msg, 0);
    }

    fn send_puback(&mut self, topic_id: u16, msg_id: u16, code: ReturnCode) {
        self.send_msg(&packet::PubAck {
            topic_id,
            msg_id,
            code,
        });
    }

    fn send_publish(&mut self, topic: WireTopic, msg_id: u16, payload: &[u8], qos: QoS, retain: bool) {
        let (topic_kind, topic_id) = topic.parts();
        let msg = packet::Publish {
            dup: false,
            qos,
            retain,
            topic_kind,
            topic_id,
            msg_id,
            payload,
        };
        self.send_msg(&msg);
    }

    /// Sends the message matching the active operation's current step.
    fn transmit_current(&mut self, dup: bool) {
        let Some(op) = self.op.as_ref() else {
            return;
        };
        match &op.detail {
            OpDetail::Connect { .. } => {
                let msg = packet::Connect {
                    clean_session: self.clean_session,
                    will: self.will.is_some(),
                    duration: self.keep_alive_s,
                    client_id: self.client_id.as_str(),
                };
                Self::emit(&mut self.port, &mut self.last_tx_at, self.clock, &msg, 0);
            }
            OpDetail::Disconnect => {
                let msg = packet::Disconnect { duration: None };
                Self::emit(&mut self.port, &mut self.last_tx_at, self.clock, &msg, 0);
            }
            OpDetail::Publish {
                name,
                msg_id,
                registered: false,
                ..
            } => {
                let msg = packet::Register {
                    topic_id: 0,
                    msg_id: *msg_id,
                    topic: name.as_str(),
                };
                Self::emit(&mut self.port, &mut self.last_tx_at, self.clock, &msg, 0);
            }
            OpDetail::Publish {
                payload,
                qos,
                retain,
                msg_id,
                topic_id,
                ack_received: false,
                ..
            } => {
                let msg = packet::Publish {
                    dup,
                    qos: *qos,
                    retain: *retain,
                    topic_kind: TopicIdKind::Normal,
                    topic_id: *topic_id,
                    msg_id: *msg_id,
                    payload,
                };
                Self::emit(&mut self.port, &mut self.last_tx_at, self.clock, &msg, 0);
            }
            OpDetail::Publish { msg_id, .. } => {
                let msg = packet::PubRel { msg_id: *msg_id };
                Self::emit(&mut self.port, &mut self.last_tx_at, self.clock, &msg, 0);
            }
            OpDetail::PublishById {
                topic,
                payload,
                qos,
                retain,
                msg_id,
                ack_received: false,
            } => {
                let (topic_kind, topic_id) = topic.parts();
                let msg = packet::Publish {
                    dup,
                    qos: *qos,
                    retain: *retain,
                    topic_kind,
                    topic_id,
                    msg_id: *msg_id,
                    payload,
                };
                Self::emit(&mut self.port, &mut self.last_tx_at, self.clock, &msg, 0);
            }
            OpDetail::PublishById { msg_id, .. } => {
                let msg = packet::PubRel { msg_id: *msg_id };
                Self::emit(&mut self.port, &mut self.last_tx_at, self.clock, &msg, 0);
            }
            OpDetail::Subscribe { name, qos, msg_id } => {
                let msg = packet::Subscribe {
                    dup,
                    qos: *qos,
                    msg_id: *msg_id,
                    topic: TopicField::Name(name.as_str()),
                };
                Self::emit(&mut self.port, &mut self.last_tx_at, self.clock, &msg, 0);
            }
            OpDetail::SubscribeById {
                topic, qos, msg_id, ..
            } => {
                let msg = packet::Subscribe {
                    dup,
                    qos: *qos,
                    msg_id: *msg_id,
                    topic: topic.field(),
                };
                Self::emit(&mut self.port, &mut self.last_tx_at, self.clock, &msg, 0);
            }
            OpDetail::Unsubscribe { name, msg_id } => {
                let msg = packet::Unsubscribe {
                    msg_id: *msg_id,
                    topic: TopicField::Name(name.as_str()),
                };
                Self::emit(&mut self.port, &mut self.last_tx_at, self.clock, &msg, 0);
            }
            OpDetail::UnsubscribeById { topic, msg_id } => {
                let msg = packet::Unsubscribe {
                    msg_id: *msg_id,
                    topic: topic.field(),
                };
                Self::emit(&mut self.port, &mut self.last_tx_at, self.clock, &msg, 0);
            }
            OpDetail::WillTopicUpdate { .. } => {
                let msg = match &self.will {
                    Some(w) => packet::WillTopicUpd {
                        qos: w.qos,
                        retain: w.retain,
                        topic: w.topic.as_str(),
                    },
                    // empty update deletes the will on the gateway
                    None => packet::WillTopicUpd {
                        qos: QoS::AtMostOnce,
                        retain: false,
                        topic: "",
                    },
                };
                Self::emit(&mut self.port, &mut self.last_tx_at, self.clock, &msg, 0);
            }
            OpDetail::WillMsgUpdate => {
                let Some(w) = &self.will else {
                    return;
                };
                let msg = packet::WillMsgUpd { data: &w.message };
                Self::emit(&mut self.port, &mut self.last_tx_at, self.clock, &msg, 0);
            }
            OpDetail::Sleep { duration_s } => {
                let msg = packet::Disconnect {
                    duration: Some(*duration_s),
                };
                Self::emit(&mut self.port, &mut self.last_tx_at, self.clock, &msg, 0);
            }
            OpDetail::CheckMessages => {
                let msg = packet::PingReq {
                    client_id: Some(self.client_id.as_str()),
                };
                Self::emit(&mut self.port, &mut self.last_tx_at, self.clock, &msg, 0);
            }
        }
    }

    /// Hands an inbound message to the application, resolving the topic
    /// through the cache where possible.
    fn deliver(
        topics: &TopicCache<MAX_TOPICS>,
        port: &mut P,
        kind: TopicIdKind,
        topic_id: u16,
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) {
        let topic = match kind {
            TopicIdKind::Normal => match topics.lookup_name(topic_id) {
                Some(name) => ReceivedTopic::Name(name),
                None => ReceivedTopic::Id(topic_id),
            },
            TopicIdKind::Predefined => ReceivedTopic::Id(topic_id),
            TopicIdKind::Short => ReceivedTopic::Short(topic_id.to_be_bytes()),
        };
        port.message_received(topic, payload, qos, retain);
    }

    fn take_msg_id(&mut self) -> u16 {
        let id = self.next_msg_id;
        self.next_msg_id = self.next_msg_id.wrapping_add(1);
        if self.next_msg_id == 0 {
            self.next_msg_id = 1;
        }
        id
    }

    fn keep_alive_ms(&self) -> u64 {
        u64::from(self.keep_alive_s) * 1000
    }
}

fn min_deadline(current: Option<u64>, candidate: u64) -> Option<u64> {
    Some(match current {
        Some(at) => at.min(candidate),
        None => candidate,
    })
}

fn wire_of(topic: Topic<'_>) -> Result<WireTopic, ClientError> {
    match topic {
        Topic::Name(name) => {
            let bytes = name.as_bytes();
            if bytes.len() == 2 {
                Ok(WireTopic::Short([bytes[0], bytes[1]]))
            } else {
                Err(ClientError::BadParam)
            }
        }
        Topic::Id(id) => Ok(WireTopic::Normal(id)),
        Topic::Predefined(id) => Ok(WireTopic::Predefined(id)),
    }
}

fn owned_name(name: &str) -> Result<String<MAX_TOPIC_LEN>, ClientError> {
    let mut owned = String::new();
    owned.push_str(name).map_err(|_| ClientError::BadParam)?;
    Ok(owned)
}

fn owned_payload<const P: usize>(payload: &[u8]) -> Result<Vec<u8, P>, ClientError> {
    let mut owned = Vec::new();
    owned
        .extend_from_slice(payload)
        .map_err(|_| ClientError::BadParam)?;
    Ok(owned)
}

fn store_will<const P: usize>(will: &Will<'_>) -> Result<StoredWill<P>, ClientError> {
    if will.topic.is_empty() {
        return Err(ClientError::BadParam);
    }
    Ok(StoredWill {
        topic: owned_name(will.topic)?,
        message: owned_payload(will.message)?,
        qos: will.qos,
        retain: will.retain,
    })
}
