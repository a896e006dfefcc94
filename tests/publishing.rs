//! Outbound publishing, registration, retries, and inbound QoS 2 delivery.

mod common;

use common::{config, connected_client, frame, started_client, Event, MessageTopic};
use mqtt_sn_client::packet::{self, QoS, ReturnCode, SnPacket, TopicIdKind};
use mqtt_sn_client::{ClientError, OperationKind, OperationStatus, Topic};

#[test]
fn qos_minus_one_needs_no_session() {
    let mut client = started_client(config());
    client
        .publish(Topic::Predefined(5), b"21.5", QoS::MinusOne, false)
        .unwrap();

    assert_eq!(
        client.port().events,
        vec![Event::Done(
            OperationKind::Publish,
            OperationStatus::Successful
        )]
    );
    match common::decode(&client.port().sent[0].0) {
        SnPacket::Publish(p) => {
            assert_eq!(p.qos, QoS::MinusOne);
            assert_eq!(p.topic_kind, TopicIdKind::Predefined);
            assert_eq!(p.topic_id, 5);
            assert_eq!(p.msg_id, 0);
            assert_eq!(p.payload, b"21.5");
        }
        other => panic!("expected PUBLISH, got {other:?}"),
    }
}

#[test]
fn qos_minus_one_rejects_long_names() {
    let mut client = started_client(config());
    let err = client
        .publish(Topic::Name("sensors/temperature"), b"x", QoS::MinusOne, false)
        .unwrap_err();
    assert_eq!(err, ClientError::BadParam);
}

#[test]
fn first_publish_by_name_registers_the_topic() {
    let mut client = connected_client(0);
    client
        .publish(Topic::Name("sensors/temperature"), b"21.5", QoS::AtLeastOnce, false)
        .unwrap();

    let reg_msg_id = match common::decode(&client.port().sent[0].0) {
        SnPacket::Register(r) => {
            assert_eq!(r.topic, "sensors/temperature");
            assert_eq!(r.topic_id, 0);
            r.msg_id
        }
        other => panic!("expected REGISTER, got {other:?}"),
    };

    client.process_data(&frame(&packet::RegAck {
        topic_id: 0x1234,
        msg_id: reg_msg_id,
        code: ReturnCode::Accepted,
    }));

    let pub_msg_id = match common::decode(&client.port().sent[1].0) {
        SnPacket::Publish(p) => {
            assert_eq!(p.topic_kind, TopicIdKind::Normal);
            assert_eq!(p.topic_id, 0x1234);
            assert_eq!(p.payload, b"21.5");
            p.msg_id
        }
        other => panic!("expected PUBLISH, got {other:?}"),
    };
    assert_ne!(pub_msg_id, reg_msg_id);

    client.process_data(&frame(&packet::PubAck {
        topic_id: 0x1234,
        msg_id: pub_msg_id,
        code: ReturnCode::Accepted,
    }));
    assert_eq!(
        client.port().events,
        vec![Event::Done(
            OperationKind::Publish,
            OperationStatus::Successful
        )]
    );

    // the mapping is cached: publishing again skips the REGISTER and a
    // QoS 0 send completes synchronously
    client.port_mut().events.clear();
    client
        .publish(Topic::Name("sensors/temperature"), b"22.0", QoS::AtMostOnce, false)
        .unwrap();
    match common::decode(&client.port().sent[2].0) {
        SnPacket::Publish(p) => {
            assert_eq!(p.topic_id, 0x1234);
            assert_eq!(p.msg_id, 0);
        }
        other => panic!("expected PUBLISH, got {other:?}"),
    }
    assert_eq!(
        client.port().events,
        vec![Event::Done(
            OperationKind::Publish,
            OperationStatus::Successful
        )]
    );
}

#[test]
fn registration_publish_at_qos0_carries_no_msg_id() {
    let mut client = connected_client(0);
    client
        .publish(Topic::Name("room/light"), b"on", QoS::AtMostOnce, false)
        .unwrap();

    let reg_msg_id = match common::decode(&client.port().sent[0].0) {
        SnPacket::Register(r) => r.msg_id,
        other => panic!("expected REGISTER, got {other:?}"),
    };
    assert!(client.port().events.is_empty());

    client.process_data(&frame(&packet::RegAck {
        topic_id: 0x0042,
        msg_id: reg_msg_id,
        code: ReturnCode::Accepted,
    }));
    match common::decode(&client.port().sent[1].0) {
        SnPacket::Publish(p) => {
            assert_eq!(p.qos, QoS::AtMostOnce);
            assert_eq!(p.topic_id, 0x0042);
            assert_eq!(p.payload, b"on");
            // MsgId is 0x0000 when no acknowledgement follows
            assert_eq!(p.msg_id, 0);
        }
        other => panic!("expected PUBLISH, got {other:?}"),
    }
    assert_eq!(
        client.port().events,
        vec![Event::Done(
            OperationKind::Publish,
            OperationStatus::Successful
        )]
    );
}

#[test]
fn congestion_resends_at_once_until_the_budget_is_spent() {
    let mut client = connected_client(0);
    client
        .publish(Topic::Id(0x10), b"a", QoS::AtLeastOnce, false)
        .unwrap();
    let msg_id = match common::decode(&client.port().sent[0].0) {
        SnPacket::Publish(p) => {
            assert!(!p.dup);
            p.msg_id
        }
        other => panic!("expected PUBLISH, got {other:?}"),
    };
    let congested = frame(&packet::PubAck {
        topic_id: 0x10,
        msg_id,
        code: ReturnCode::Congestion,
    });

    // each congestion code triggers an immediate DUP resend and spends
    // one attempt, no retry period involved
    client.process_data(&congested);
    assert_eq!(client.port().sent.len(), 2);
    client.process_data(&congested);
    assert_eq!(client.port().sent.len(), 3);
    for (sent, _) in &client.port().sent[1..] {
        match common::decode(sent) {
            SnPacket::Publish(p) => {
                assert!(p.dup);
                assert_eq!(p.msg_id, msg_id);
            }
            other => panic!("expected PUBLISH, got {other:?}"),
        }
    }
    assert!(client.port().events.is_empty());

    // the third one exhausts the three attempts
    client.process_data(&congested);
    assert_eq!(client.port().sent.len(), 3);
    assert_eq!(
        client.port().events,
        vec![Event::Done(
            OperationKind::Publish,
            OperationStatus::Congestion
        )]
    );
}

#[test]
fn a_live_operation_makes_everything_busy() {
    let mut client = connected_client(0);
    client
        .publish(Topic::Id(0x10), b"a", QoS::AtLeastOnce, false)
        .unwrap();

    let err = client
        .publish(Topic::Id(0x10), b"b", QoS::AtLeastOnce, false)
        .unwrap_err();
    assert_eq!(err, ClientError::Busy);
    assert_eq!(
        client.subscribe(Topic::Id(0x10), QoS::AtMostOnce).unwrap_err(),
        ClientError::Busy
    );
    // even the synchronous flavors refuse while an operation is live
    assert_eq!(
        client
            .publish(Topic::Predefined(1), b"c", QoS::MinusOne, false)
            .unwrap_err(),
        ClientError::Busy
    );
    assert_eq!(client.port().sent.len(), 1);
}

#[test]
fn unanswered_publish_spends_the_retry_budget() {
    let mut client = connected_client(0);
    client
        .publish(Topic::Id(0x10), b"a", QoS::AtLeastOnce, false)
        .unwrap();

    client.tick(1_000);
    client.tick(1_000);
    assert_eq!(client.port().sent.len(), 3);

    for (i, (sent, _)) in client.port().sent.iter().enumerate() {
        match common::decode(sent) {
            SnPacket::Publish(p) => assert_eq!(p.dup, i != 0),
            other => panic!("expected PUBLISH, got {other:?}"),
        }
    }

    client.tick(1_000);
    assert_eq!(client.port().sent.len(), 3);
    assert_eq!(
        client.port().events,
        vec![Event::Done(
            OperationKind::Publish,
            OperationStatus::NoResponse
        )]
    );
}

#[test]
fn qos2_outbound_handshake() {
    let mut client = connected_client(0);
    client
        .publish(Topic::Id(0x10), b"a", QoS::ExactlyOnce, false)
        .unwrap();

    let msg_id = match common::decode(&client.port().sent[0].0) {
        SnPacket::Publish(p) => p.msg_id,
        other => panic!("expected PUBLISH, got {other:?}"),
    };

    client.process_data(&frame(&packet::PubRec { msg_id }));
    assert!(matches!(
        common::decode(&client.port().sent[1].0),
        SnPacket::PubRel(_)
    ));
    assert!(client.port().events.is_empty());

    client.process_data(&frame(&packet::PubComp { msg_id }));
    assert_eq!(
        client.port().events,
        vec![Event::Done(
            OperationKind::Publish,
            OperationStatus::Successful
        )]
    );
}

#[test]
fn qos2_inbound_delivers_exactly_once() {
    let mut client = connected_client(0);
    let publish = packet::Publish {
        dup: false,
        qos: QoS::ExactlyOnce,
        retain: false,
        topic_kind: TopicIdKind::Short,
        topic_id: u16::from_be_bytes(*b"st"),
        msg_id: 9,
        payload: b"42",
    };

    client.process_data(&frame(&publish));
    assert!(matches!(
        common::decode(&client.port().sent[0].0),
        SnPacket::PubRec(packet::PubRec { msg_id: 9 })
    ));
    assert!(client.port().events.is_empty());

    // the gateway retransmits before our PUBREC gets through
    let retransmit = packet::Publish {
        dup: true,
        ..publish
    };
    client.process_data(&frame(&retransmit));
    assert!(client.port().events.is_empty());

    client.process_data(&frame(&packet::PubRel { msg_id: 9 }));
    assert!(matches!(
        common::decode(&client.port().sent.last().unwrap().0),
        SnPacket::PubComp(packet::PubComp { msg_id: 9 })
    ));
    assert_eq!(
        client.port().events,
        vec![Event::Message {
            topic: MessageTopic::Short(*b"st"),
            payload: b"42".to_vec(),
            qos: QoS::ExactlyOnce,
            retain: false,
        }]
    );

    // a duplicate release is acknowledged but never delivered again
    client.process_data(&frame(&packet::PubRel { msg_id: 9 }));
    assert_eq!(client.port().events.len(), 1);
    assert!(matches!(
        common::decode(&client.port().sent.last().unwrap().0),
        SnPacket::PubComp(packet::PubComp { msg_id: 9 })
    ));
}

#[test]
fn stale_cached_id_is_recovered_once() {
    let mut client = connected_client(0);

    // prime the cache
    client
        .publish(Topic::Name("room/light"), b"on", QoS::AtLeastOnce, false)
        .unwrap();
    let reg_msg_id = match common::decode(&client.port().sent[0].0) {
        SnPacket::Register(r) => r.msg_id,
        other => panic!("expected REGISTER, got {other:?}"),
    };
    client.process_data(&frame(&packet::RegAck {
        topic_id: 0x0042,
        msg_id: reg_msg_id,
        code: ReturnCode::Accepted,
    }));
    let pub_msg_id = match common::decode(&client.port().sent[1].0) {
        SnPacket::Publish(p) => p.msg_id,
        other => panic!("expected PUBLISH, got {other:?}"),
    };
    client.process_data(&frame(&packet::PubAck {
        topic_id: 0x0042,
        msg_id: pub_msg_id,
        code: ReturnCode::Accepted,
    }));
    client.port_mut().events.clear();

    // the gateway forgot the mapping in the meantime
    client
        .publish(Topic::Name("room/light"), b"off", QoS::AtLeastOnce, false)
        .unwrap();
    let pub_msg_id = match common::decode(&client.port().sent[2].0) {
        SnPacket::Publish(p) => {
            assert_eq!(p.topic_id, 0x0042);
            p.msg_id
        }
        other => panic!("expected PUBLISH, got {other:?}"),
    };
    client.process_data(&frame(&packet::PubAck {
        topic_id: 0x0042,
        msg_id: pub_msg_id,
        code: ReturnCode::InvalidTopicId,
    }));

    // recovery re-registers and republishes under a fresh id
    let reg_msg_id = match common::decode(&client.port().sent[3].0) {
        SnPacket::Register(r) => {
            assert_eq!(r.topic, "room/light");
            r.msg_id
        }
        other => panic!("expected REGISTER, got {other:?}"),
    };
    client.process_data(&frame(&packet::RegAck {
        topic_id: 0x0099,
        msg_id: reg_msg_id,
        code: ReturnCode::Accepted,
    }));
    let pub_msg_id = match common::decode(&client.port().sent[4].0) {
        SnPacket::Publish(p) => {
            assert_eq!(p.topic_id, 0x0099);
            assert_eq!(p.payload, b"off");
            p.msg_id
        }
        other => panic!("expected PUBLISH, got {other:?}"),
    };
    client.process_data(&frame(&packet::PubAck {
        topic_id: 0x0099,
        msg_id: pub_msg_id,
        code: ReturnCode::Accepted,
    }));
    assert_eq!(
        client.port().events,
        vec![Event::Done(
            OperationKind::Publish,
            OperationStatus::Successful
        )]
    );
}
