//! The async event loop that drives the engine over UDP.

use core::future::pending;

use embassy_futures::select::{select3, Either3};
use embassy_net::udp::UdpSocket;
use embassy_net::IpEndpoint;
use embassy_time::{Duration, Instant, Timer};
use heapless::{Deque, String, Vec};

use super::commands::{Command, CommandReceiver, MAX_COMMAND_PAYLOAD};
use super::traits::SnHandler;
use crate::client::{
    ConnectOptions, SnClient, SnConfig, Will, MAX_CLIENT_ID_LEN, MAX_TOPIC_LEN,
};
use crate::fmt::warning;
use crate::packet::QoS;
use crate::port::{
    ConnectionStatus, GatewayStatus, OperationKind, OperationStatus, ReceivedTopic, SnPort,
};

/// Outgoing frames queued between an engine call and the next await point.
const TX_QUEUE_DEPTH: usize = 8;

/// A will stored by the runtime for use on connect.
pub struct OwnedWill {
    pub topic: String<MAX_TOPIC_LEN>,
    pub message: Vec<u8, MAX_COMMAND_PAYLOAD>,
    pub qos: QoS,
    pub retain: bool,
}

/// Session parameters the runtime connects with.
pub struct SessionOptions {
    pub client_id: String<MAX_CLIENT_ID_LEN>,
    pub keep_alive_s: u16,
    pub clean_session: bool,
    pub will: Option<OwnedWill>,
}

struct OutFrame<const BUF_SIZE: usize> {
    data: Vec<u8, BUF_SIZE>,
    broadcast: bool,
}

/// The engine's side of the runtime: frames are queued rather than sent,
/// the programmed wakeup is recorded for the event loop's timer, and every
/// report is forwarded to the handler synchronously.
pub struct QueuePort<H: SnHandler, const BUF_SIZE: usize> {
    handler: H,
    tx: Deque<OutFrame<BUF_SIZE>, TX_QUEUE_DEPTH>,
    programmed_ms: Option<u32>,
    armed_at: Instant,
}

impl<H: SnHandler, const BUF_SIZE: usize> QueuePort<H, BUF_SIZE> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            tx: Deque::new(),
            programmed_ms: None,
            armed_at: Instant::now(),
        }
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    fn programmed_wait(&self) -> Option<u32> {
        self.programmed_ms
    }

    /// Clears the armed wakeup and reports how long it was armed for.
    fn disarm(&mut self) -> u32 {
        let elapsed = match self.programmed_ms.take() {
            Some(_) => self.armed_at.elapsed().as_millis(),
            None => 0,
        };
        u32::try_from(elapsed).unwrap_or(u32::MAX)
    }

    fn pop_frame(&mut self) -> Option<OutFrame<BUF_SIZE>> {
        self.tx.pop_front()
    }
}

impl<H: SnHandler, const BUF_SIZE: usize> SnPort for QueuePort<H, BUF_SIZE> {
    fn program_next_tick(&mut self, after_ms: u32) {
        self.programmed_ms = Some(after_ms);
        self.armed_at = Instant::now();
    }

    fn cancel_next_tick_wait(&mut self) -> u32 {
        self.disarm()
    }

    fn send_packet(&mut self, data: &[u8], radius: u8) {
        let mut owned = Vec::new();
        if owned.extend_from_slice(data).is_err() {
            warning!("frame larger than the transmit buffer, dropped");
            return;
        }
        let frame = OutFrame {
            data: owned,
            broadcast: radius != 0,
        };
        if self.tx.push_back(frame).is_err() {
            warning!("transmit queue full, frame dropped");
        }
    }

    fn gateway_status(&mut self, gw_id: u8, status: GatewayStatus) {
        self.handler.on_gateway(gw_id, status);
    }

    fn connection_status(&mut self, status: ConnectionStatus) {
        self.handler.on_connection(status);
    }

    fn message_received(&mut self, topic: ReceivedTopic<'_>, payload: &[u8], qos: QoS, retain: bool) {
        self.handler.on_message(topic, payload, qos, retain);
    }

    fn operation_done(&mut self, kind: OperationKind, status: OperationStatus) {
        self.handler.on_complete(kind, status);
    }
}

/// Drives an [`SnClient`] over an `embassy-net` UDP socket.
///
/// The loop multiplexes three event sources: datagrams from the socket,
/// the engine's programmed wakeup, and commands from [`ClientHandle`]s.
/// Unicast frames go to the gateway endpoint, SEARCHGW broadcasts to the
/// broadcast endpoint.
///
/// [`ClientHandle`]: super::ClientHandle
///
/// # Example
///
/// ```ignore
/// static COMMANDS: CommandChannel<4> = Channel::new();
///
/// #[embassy_executor::task]
/// async fn net_task(socket: UdpSocket<'static>, options: SessionOptions) {
///     let mut runtime: SnRuntime<'_, MyHandler, 4, 512> = SnRuntime::new(
///         socket,
///         (Ipv4Address::new(192, 168, 1, 5), 2442).into(),
///         (Ipv4Address::BROADCAST, 2442).into(),
///         MyHandler::new(),
///         options,
///         SnConfig::default(),
///         COMMANDS.receiver(),
///     );
///     runtime.run().await;
/// }
/// ```
pub struct SnRuntime<'a, H: SnHandler, const DEPTH: usize = 4, const BUF_SIZE: usize = 512> {
    client: SnClient<QueuePort<H, BUF_SIZE>, 4, 16, BUF_SIZE>,
    socket: UdpSocket<'a>,
    gateway: IpEndpoint,
    broadcast: IpEndpoint,
    options: SessionOptions,
    commands: CommandReceiver<'a, DEPTH>,
}

impl<'a, H: SnHandler, const DEPTH: usize, const BUF_SIZE: usize>
    SnRuntime<'a, H, DEPTH, BUF_SIZE>
{
    /// Creates a runtime around a bound UDP socket.
    pub fn new(
        socket: UdpSocket<'a>,
        gateway: IpEndpoint,
        broadcast: IpEndpoint,
        handler: H,
        options: SessionOptions,
        config: SnConfig,
        commands: CommandReceiver<'a, DEPTH>,
    ) -> Self {
        Self {
            client: SnClient::new(QueuePort::new(handler), config),
            socket,
            gateway,
            broadcast,
            options,
            commands,
        }
    }

    pub fn handler(&self) -> &H {
        self.client.port().handler()
    }

    pub fn handler_mut(&mut self) -> &mut H {
        self.client.port_mut().handler_mut()
    }

    /// Runs the event loop forever.
    pub async fn run(&mut self) -> ! {
        if self.client.start().is_err() {
            warning!("engine already started");
        }
        loop {
            self.flush().await;
            let wait_ms = self.client.port().programmed_wait();
            let mut rx = [0u8; BUF_SIZE];
            match select3(
                self.socket.recv_from(&mut rx),
                tick_wait(wait_ms),
                self.commands.receive(),
            )
            .await
            {
                Either3::First(Ok((n, _))) => {
                    self.client.process_data(&rx[..n]);
                }
                Either3::First(Err(_)) => warning!("udp receive failed"),
                Either3::Second(()) => {
                    let elapsed = self.client.port_mut().disarm();
                    self.client.tick(elapsed);
                }
                Either3::Third(command) => self.apply(command),
            }
        }
    }

    fn apply(&mut self, command: Command) {
        let result = match command {
            Command::Cancel => {
                self.client.cancel();
                Ok(())
            }
            Command::Connect => {
                let will = self.options.will.as_ref().map(|w| Will {
                    topic: w.topic.as_str(),
                    message: &w.message,
                    qos: w.qos,
                    retain: w.retain,
                });
                self.client.connect(&ConnectOptions {
                    client_id: self.options.client_id.as_str(),
                    keep_alive_s: self.options.keep_alive_s,
                    clean_session: self.options.clean_session,
                    will,
                })
            }
            Command::Disconnect => self.client.disconnect(),
            Command::Publish(req) => {
                self.client
                    .publish(req.topic.as_topic(), &req.payload, req.qos, req.retain)
            }
            Command::Subscribe { topic, qos } => self.client.subscribe(topic.as_topic(), qos),
            Command::Unsubscribe { topic } => self.client.unsubscribe(topic.as_topic()),
            Command::Sleep { duration_s } => self.client.sleep(duration_s),
            Command::CheckMessages => self.client.check_messages(),
        };
        if result.is_err() {
            warning!("command rejected by the engine");
        }
    }

    /// Sends everything the engine queued since the last await point.
    async fn flush(&mut self) {
        while let Some(frame) = self.client.port_mut().pop_frame() {
            let target = if frame.broadcast {
                self.broadcast
            } else {
                self.gateway
            };
            if self.socket.send_to(&frame.data, target).await.is_err() {
                warning!("udp send failed");
            }
        }
    }
}

async fn tick_wait(wait_ms: Option<u32>) {
    match wait_ms {
        Some(ms) => Timer::after(Duration::from_millis(u64::from(ms))).await,
        None => pending().await,
    }
}
