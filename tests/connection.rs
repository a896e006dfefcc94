//! Session lifecycle: connect, will handshake, sleep, keep-alive.

mod common;

use common::{config, connected_client, frame, started_client, Event, MessageTopic};
use mqtt_sn_client::packet::{self, QoS, ReturnCode, SnPacket, TopicIdKind};
use mqtt_sn_client::{
    ClientError, ConnectOptions, ConnectionStatus, GatewayStatus, OperationKind, OperationStatus,
    SessionState, Topic, Will,
};

#[test]
fn plain_connect_round_trip() {
    let mut client = started_client(config());
    client.process_data(&frame(&packet::Advertise {
        gw_id: 7,
        duration: 600,
    }));
    assert_eq!(
        client.port().events,
        vec![Event::Gateway(7, GatewayStatus::Available)]
    );

    client
        .connect(&ConnectOptions {
            client_id: "node-1",
            keep_alive_s: 30,
            clean_session: true,
            will: None,
        })
        .unwrap();

    assert_eq!(client.port().sent.len(), 1);
    let (sent, radius) = client.port().sent[0].clone();
    assert_eq!(radius, 0);
    match common::decode(&sent) {
        SnPacket::Connect(c) => {
            assert_eq!(c.client_id, "node-1");
            assert_eq!(c.duration, 30);
            assert!(c.clean_session);
            assert!(!c.will);
        }
        other => panic!("expected CONNECT, got {other:?}"),
    }

    client.process_data(&frame(&packet::ConnAck {
        code: ReturnCode::Accepted,
    }));
    assert_eq!(client.session(), SessionState::Connected);
    assert_eq!(
        client.port().events.last(),
        Some(&Event::Connection(ConnectionStatus::Connected))
    );
}

#[test]
fn connect_with_will_runs_the_full_handshake() {
    let mut client = started_client(config());
    client.process_data(&frame(&packet::Advertise {
        gw_id: 1,
        duration: 600,
    }));
    client
        .connect(&ConnectOptions {
            client_id: "node-1",
            keep_alive_s: 60,
            clean_session: false,
            will: Some(Will {
                topic: "node-1/status",
                message: b"offline",
                qos: QoS::AtLeastOnce,
                retain: true,
            }),
        })
        .unwrap();

    match common::decode(&client.port().sent[0].0) {
        SnPacket::Connect(c) => assert!(c.will),
        other => panic!("expected CONNECT, got {other:?}"),
    }

    client.process_data(&frame(&SnPacket::WillTopicReq));
    match common::decode(&client.port().sent[1].0) {
        SnPacket::WillTopic(w) => {
            assert_eq!(w.topic, "node-1/status");
            assert_eq!(w.qos, QoS::AtLeastOnce);
            assert!(w.retain);
        }
        other => panic!("expected WILLTOPIC, got {other:?}"),
    }

    client.process_data(&frame(&SnPacket::WillMsgReq));
    let last = client.port().sent.last().unwrap().0.clone();
    match common::decode(&last) {
        SnPacket::WillMsg(w) => assert_eq!(w.data, b"offline"),
        other => panic!("expected WILLMSG, got {other:?}"),
    }

    client.process_data(&frame(&packet::ConnAck {
        code: ReturnCode::Accepted,
    }));
    assert_eq!(client.session(), SessionState::Connected);
    assert_eq!(
        client.port().events.last(),
        Some(&Event::Connection(ConnectionStatus::Connected))
    );
}

#[test]
fn a_pending_connect_reports_busy_not_disconnected() {
    let mut client = started_client(config());
    client.process_data(&frame(&packet::Advertise {
        gw_id: 1,
        duration: 600,
    }));
    client
        .connect(&ConnectOptions {
            client_id: "node-1",
            keep_alive_s: 0,
            clean_session: true,
            will: None,
        })
        .unwrap();

    // the live operation wins over the missing session
    assert_eq!(
        client
            .subscribe(Topic::Name("room/temperature"), QoS::AtMostOnce)
            .unwrap_err(),
        ClientError::Busy
    );
    assert_eq!(
        client.unsubscribe(Topic::Name("room/temperature")).unwrap_err(),
        ClientError::Busy
    );
    assert_eq!(client.will_update(None).unwrap_err(), ClientError::Busy);
    assert_eq!(client.sleep(60).unwrap_err(), ClientError::Busy);
    assert_eq!(client.check_messages().unwrap_err(), ClientError::Busy);
    assert_eq!(client.disconnect().unwrap_err(), ClientError::Busy);
    assert_eq!(client.port().sent.len(), 1);
}

#[test]
fn connect_waits_for_discovery() {
    let mut client = started_client(config());
    client
        .connect(&ConnectOptions {
            client_id: "node-1",
            keep_alive_s: 0,
            clean_session: true,
            will: None,
        })
        .unwrap();
    assert!(client.port().sent.is_empty());

    client.process_data(&frame(&packet::Advertise {
        gw_id: 2,
        duration: 600,
    }));
    assert!(matches!(
        common::decode(&client.port().sent[0].0),
        SnPacket::Connect(_)
    ));
}

#[test]
fn denied_connect_reports_denied() {
    let mut client = started_client(config());
    client.process_data(&frame(&packet::Advertise {
        gw_id: 1,
        duration: 600,
    }));
    client
        .connect(&ConnectOptions {
            client_id: "node-1",
            keep_alive_s: 0,
            clean_session: true,
            will: None,
        })
        .unwrap();
    client.process_data(&frame(&packet::ConnAck {
        code: ReturnCode::NotSupported,
    }));
    assert_eq!(client.session(), SessionState::Disconnected);
    assert_eq!(
        client.port().events.last(),
        Some(&Event::Connection(ConnectionStatus::Denied))
    );
}

#[test]
fn sleep_then_poll_for_buffered_messages() {
    let mut client = connected_client(60);
    client.sleep(120).unwrap();
    match common::decode(&client.port().sent[0].0) {
        SnPacket::Disconnect(d) => assert_eq!(d.duration, Some(120)),
        other => panic!("expected DISCONNECT, got {other:?}"),
    }

    client.process_data(&frame(&packet::Disconnect { duration: None }));
    assert_eq!(client.session(), SessionState::Asleep);
    assert_eq!(
        client.port().events,
        vec![
            Event::Connection(ConnectionStatus::Asleep),
            Event::Done(OperationKind::Sleep, OperationStatus::Successful),
        ]
    );
    client.port_mut().events.clear();

    client.check_messages().unwrap();
    match common::decode(&client.port().sent[1].0) {
        SnPacket::PingReq(p) => assert_eq!(p.client_id, Some("test-client")),
        other => panic!("expected PINGREQ, got {other:?}"),
    }

    // a message buffered while asleep arrives before the PINGRESP
    client.process_data(&frame(&packet::Publish {
        dup: false,
        qos: QoS::AtMostOnce,
        retain: false,
        topic_kind: TopicIdKind::Short,
        topic_id: u16::from_be_bytes(*b"st"),
        msg_id: 0,
        payload: b"42",
    }));
    client.process_data(&frame(&SnPacket::PingResp));

    assert_eq!(
        client.port().events,
        vec![
            Event::Message {
                topic: MessageTopic::Short(*b"st"),
                payload: b"42".to_vec(),
                qos: QoS::AtMostOnce,
                retain: false,
            },
            Event::Done(OperationKind::CheckMessages, OperationStatus::Successful),
        ]
    );
    assert_eq!(client.session(), SessionState::Asleep);
}

#[test]
fn keepalive_ping_exhaustion_discards_the_gateway() {
    let mut client = connected_client(10);

    // keep-alive period elapses with no other traffic
    client.tick(10_000);
    assert!(matches!(
        common::decode(&client.port().sent[0].0),
        SnPacket::PingReq(packet::PingReq { client_id: None })
    ));

    // retries are spaced by the retry period; the budget is three attempts
    client.tick(1_000);
    client.tick(1_000);
    assert_eq!(client.port().sent.len(), 3);

    client.tick(1_000);
    assert_eq!(client.port().sent.len(), 3);
    assert_eq!(client.session(), SessionState::Disconnected);
    assert_eq!(
        client.port().events,
        vec![
            Event::Gateway(1, GatewayStatus::Discarded),
            Event::Connection(ConnectionStatus::Timeout),
        ]
    );
}

#[test]
fn pingresp_keeps_the_session_alive() {
    let mut client = connected_client(10);
    client.tick(10_000);
    client.process_data(&frame(&SnPacket::PingResp));
    client.tick(1_000);
    // no retry after the response
    assert_eq!(client.port().sent.len(), 1);
    assert_eq!(client.session(), SessionState::Connected);
}

#[test]
fn unsolicited_disconnect_ends_the_session() {
    let mut client = connected_client(60);
    client.process_data(&frame(&packet::Disconnect { duration: None }));
    assert_eq!(client.session(), SessionState::Disconnected);
    assert_eq!(
        client.port().events,
        vec![Event::Connection(ConnectionStatus::Disconnected)]
    );
}
