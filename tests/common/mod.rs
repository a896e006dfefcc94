//! Shared test harness: a recording port and frame helpers.

use mqtt_sn_client::packet::{self, EncodeMessage, QoS, ReturnCode, SnPacket};
use mqtt_sn_client::{
    ConnectOptions, ConnectionStatus, GatewayStatus, OperationKind, OperationStatus,
    ReceivedTopic, SnClient, SnConfig, SnPort,
};

/// An inbound message captured with owned storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageTopic {
    Name(String),
    Id(u16),
    Short([u8; 2]),
}

impl From<ReceivedTopic<'_>> for MessageTopic {
    fn from(topic: ReceivedTopic<'_>) -> Self {
        match topic {
            ReceivedTopic::Name(name) => MessageTopic::Name(name.to_owned()),
            ReceivedTopic::Id(id) => MessageTopic::Id(id),
            ReceivedTopic::Short(short) => MessageTopic::Short(short),
        }
    }
}

/// Everything the engine reported through its port, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Gateway(u8, GatewayStatus),
    Connection(ConnectionStatus),
    Message {
        topic: MessageTopic,
        payload: Vec<u8>,
        qos: QoS,
        retain: bool,
    },
    Done(OperationKind, OperationStatus),
}

/// A port that records everything and performs nothing.
#[derive(Default)]
pub struct MockPort {
    /// Sent frames together with the broadcast radius.
    pub sent: Vec<(Vec<u8>, u8)>,
    pub events: Vec<Event>,
    pub programmed: Option<u32>,
}

impl MockPort {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnPort for MockPort {
    fn program_next_tick(&mut self, after_ms: u32) {
        self.programmed = Some(after_ms);
    }

    fn cancel_next_tick_wait(&mut self) -> u32 {
        self.programmed = None;
        0
    }

    fn send_packet(&mut self, data: &[u8], radius: u8) {
        self.sent.push((data.to_vec(), radius));
    }

    fn gateway_status(&mut self, gw_id: u8, status: GatewayStatus) {
        self.events.push(Event::Gateway(gw_id, status));
    }

    fn connection_status(&mut self, status: ConnectionStatus) {
        self.events.push(Event::Connection(status));
    }

    fn message_received(&mut self, topic: ReceivedTopic<'_>, payload: &[u8], qos: QoS, retain: bool) {
        self.events.push(Event::Message {
            topic: topic.into(),
            payload: payload.to_vec(),
            qos,
            retain,
        });
    }

    fn operation_done(&mut self, kind: OperationKind, status: OperationStatus) {
        self.events.push(Event::Done(kind, status));
    }
}

pub type TestClient = SnClient<MockPort, 4, 16, 512>;

/// Encodes a gateway-side message into a complete frame.
pub fn frame<M: EncodeMessage>(msg: &M) -> Vec<u8> {
    let mut buf = [0u8; 512];
    let n = msg.encode(&mut buf).expect("message must encode");
    buf[..n].to_vec()
}

/// The body of a client-sent frame, ready for `packet::decode`.
pub fn body(frame: &[u8]) -> &[u8] {
    assert!(!frame.is_empty());
    let total = frame[0] as usize;
    assert_eq!(total, frame.len(), "frame length octet must match");
    &frame[1..total]
}

pub fn decode(frame: &[u8]) -> SnPacket<'_> {
    packet::decode(body(frame)).expect("client frames must decode")
}

pub fn config() -> SnConfig {
    SnConfig {
        retry_period_ms: 1_000,
        retry_count: 3,
        radius: 1,
        search_gateway: false,
    }
}

pub fn started_client(config: SnConfig) -> TestClient {
    let mut client = SnClient::new(MockPort::new(), config);
    client.start().unwrap();
    client
}

/// A client that has discovered gateway 1 and completed a plain connect.
pub fn connected_client(keep_alive_s: u16) -> TestClient {
    let mut client = started_client(config());
    client.process_data(&frame(&packet::Advertise {
        gw_id: 1,
        duration: 600,
    }));
    client
        .connect(&ConnectOptions {
            client_id: "test-client",
            keep_alive_s,
            clean_session: true,
            will: None,
        })
        .unwrap();
    client.process_data(&frame(&packet::ConnAck {
        code: ReturnCode::Accepted,
    }));
    let port = client.port_mut();
    port.sent.clear();
    port.events.clear();
    client
}
