//! Subscriptions, gateway-assigned ids, and will updates.

mod common;

use common::{connected_client, frame, Event, MessageTopic};
use mqtt_sn_client::packet::{self, QoS, ReturnCode, SnPacket, TopicField, TopicIdKind};
use mqtt_sn_client::{ClientError, OperationKind, OperationStatus, Topic};

#[test]
fn subscribe_by_name_caches_the_granted_id() {
    let mut client = connected_client(0);
    client
        .subscribe(Topic::Name("room/temperature"), QoS::AtLeastOnce)
        .unwrap();

    let msg_id = match common::decode(&client.port().sent[0].0) {
        SnPacket::Subscribe(s) => {
            assert_eq!(s.qos, QoS::AtLeastOnce);
            match s.topic {
                TopicField::Name(name) => assert_eq!(name, "room/temperature"),
                other => panic!("expected a topic name, got {other:?}"),
            }
            s.msg_id
        }
        other => panic!("expected SUBSCRIBE, got {other:?}"),
    };

    client.process_data(&frame(&packet::SubAck {
        qos: QoS::AtLeastOnce,
        topic_id: 0x0007,
        msg_id,
        code: ReturnCode::Accepted,
    }));
    assert_eq!(
        client.port().events,
        vec![Event::Done(
            OperationKind::Subscribe,
            OperationStatus::Successful
        )]
    );
    client.port_mut().events.clear();

    // the granted id resolves inbound messages to the name
    client.process_data(&frame(&packet::Publish {
        dup: false,
        qos: QoS::AtMostOnce,
        retain: false,
        topic_kind: TopicIdKind::Normal,
        topic_id: 0x0007,
        msg_id: 0,
        payload: b"19.5",
    }));
    assert_eq!(
        client.port().events,
        vec![Event::Message {
            topic: MessageTopic::Name("room/temperature".into()),
            payload: b"19.5".to_vec(),
            qos: QoS::AtMostOnce,
            retain: false,
        }]
    );
}

#[test]
fn subscribe_rejects_qos_minus_one() {
    let mut client = connected_client(0);
    assert_eq!(
        client
            .subscribe(Topic::Name("room/#"), QoS::MinusOne)
            .unwrap_err(),
        ClientError::BadParam
    );
}

#[test]
fn inbound_publish_with_unknown_id_is_rejected() {
    let mut client = connected_client(0);
    client.process_data(&frame(&packet::Publish {
        dup: false,
        qos: QoS::AtLeastOnce,
        retain: false,
        topic_kind: TopicIdKind::Normal,
        topic_id: 0x0BAD,
        msg_id: 11,
        payload: b"?",
    }));

    assert!(client.port().events.is_empty());
    match common::decode(&client.port().sent[0].0) {
        SnPacket::PubAck(a) => {
            assert_eq!(a.topic_id, 0x0BAD);
            assert_eq!(a.msg_id, 11);
            assert_eq!(a.code, ReturnCode::InvalidTopicId);
        }
        other => panic!("expected PUBACK, got {other:?}"),
    }
}

#[test]
fn gateway_register_makes_the_id_known() {
    let mut client = connected_client(0);
    client.process_data(&frame(&packet::Register {
        topic_id: 0x0031,
        msg_id: 4,
        topic: "alerts/frost",
    }));
    match common::decode(&client.port().sent[0].0) {
        SnPacket::RegAck(a) => {
            assert_eq!(a.topic_id, 0x0031);
            assert_eq!(a.msg_id, 4);
            assert_eq!(a.code, ReturnCode::Accepted);
        }
        other => panic!("expected REGACK, got {other:?}"),
    }

    client.process_data(&frame(&packet::Publish {
        dup: false,
        qos: QoS::AtMostOnce,
        retain: true,
        topic_kind: TopicIdKind::Normal,
        topic_id: 0x0031,
        msg_id: 0,
        payload: b"-3",
    }));
    assert_eq!(
        client.port().events,
        vec![Event::Message {
            topic: MessageTopic::Name("alerts/frost".into()),
            payload: b"-3".to_vec(),
            qos: QoS::AtMostOnce,
            retain: true,
        }]
    );
}

#[test]
fn stale_subscription_id_falls_back_to_the_name() {
    let mut client = connected_client(0);
    client.process_data(&frame(&packet::Register {
        topic_id: 0x0031,
        msg_id: 4,
        topic: "alerts/frost",
    }));
    client.port_mut().sent.clear();

    client
        .subscribe(Topic::Id(0x0031), QoS::AtLeastOnce)
        .unwrap();
    let msg_id = match common::decode(&client.port().sent[0].0) {
        SnPacket::Subscribe(s) => s.msg_id,
        other => panic!("expected SUBSCRIBE, got {other:?}"),
    };

    // the gateway forgot the id: the engine retries by the cached name
    client.process_data(&frame(&packet::SubAck {
        qos: QoS::AtLeastOnce,
        topic_id: 0,
        msg_id,
        code: ReturnCode::InvalidTopicId,
    }));
    let retry_msg_id = match common::decode(&client.port().sent[1].0) {
        SnPacket::Subscribe(s) => {
            match s.topic {
                TopicField::Name(name) => assert_eq!(name, "alerts/frost"),
                other => panic!("expected a topic name, got {other:?}"),
            }
            s.msg_id
        }
        other => panic!("expected SUBSCRIBE, got {other:?}"),
    };
    assert_ne!(retry_msg_id, msg_id);
    assert!(client.port().events.is_empty());

    client.process_data(&frame(&packet::SubAck {
        qos: QoS::AtLeastOnce,
        topic_id: 0x0077,
        msg_id: retry_msg_id,
        code: ReturnCode::Accepted,
    }));
    assert_eq!(
        client.port().events,
        vec![Event::Done(
            OperationKind::Subscribe,
            OperationStatus::Successful
        )]
    );
}

#[test]
fn a_second_id_rejection_resolves_invalid_id() {
    let mut client = connected_client(0);
    client.process_data(&frame(&packet::Register {
        topic_id: 0x0031,
        msg_id: 4,
        topic: "alerts/frost",
    }));
    client.port_mut().sent.clear();

    client
        .subscribe(Topic::Id(0x0031), QoS::AtMostOnce)
        .unwrap();
    let msg_id = match common::decode(&client.port().sent[0].0) {
        SnPacket::Subscribe(s) => s.msg_id,
        other => panic!("expected SUBSCRIBE, got {other:?}"),
    };
    client.process_data(&frame(&packet::SubAck {
        qos: QoS::AtMostOnce,
        topic_id: 0,
        msg_id,
        code: ReturnCode::InvalidTopicId,
    }));
    let retry_msg_id = match common::decode(&client.port().sent[1].0) {
        SnPacket::Subscribe(s) => s.msg_id,
        other => panic!("expected SUBSCRIBE, got {other:?}"),
    };

    // the name fallback runs once; a second rejection ends the operation
    client.process_data(&frame(&packet::SubAck {
        qos: QoS::AtMostOnce,
        topic_id: 0,
        msg_id: retry_msg_id,
        code: ReturnCode::InvalidTopicId,
    }));
    assert_eq!(client.port().sent.len(), 2);
    assert_eq!(
        client.port().events,
        vec![Event::Done(
            OperationKind::Subscribe,
            OperationStatus::InvalidId
        )]
    );
}

#[test]
fn unsubscribe_round_trip() {
    let mut client = connected_client(0);
    client.unsubscribe(Topic::Name("room/temperature")).unwrap();

    let msg_id = match common::decode(&client.port().sent[0].0) {
        SnPacket::Unsubscribe(u) => u.msg_id,
        other => panic!("expected UNSUBSCRIBE, got {other:?}"),
    };
    client.process_data(&frame(&packet::UnsubAck { msg_id }));
    assert_eq!(
        client.port().events,
        vec![Event::Done(
            OperationKind::Unsubscribe,
            OperationStatus::Successful
        )]
    );
}

#[test]
fn subscribe_by_short_topic() {
    let mut client = connected_client(0);
    client.subscribe(Topic::Name("st"), QoS::AtMostOnce).unwrap();
    match common::decode(&client.port().sent[0].0) {
        SnPacket::Subscribe(s) => match s.topic {
            TopicField::Short(short) => assert_eq!(&short, b"st"),
            other => panic!("expected a short topic, got {other:?}"),
        },
        other => panic!("expected SUBSCRIBE, got {other:?}"),
    }
}

#[test]
fn will_update_chains_topic_and_message() {
    let mut client = connected_client(0);
    client
        .will_update(Some(&mqtt_sn_client::Will {
            topic: "node-1/status",
            message: b"gone",
            qos: QoS::AtLeastOnce,
            retain: false,
        }))
        .unwrap();

    match common::decode(&client.port().sent[0].0) {
        SnPacket::WillTopicUpd(w) => {
            assert_eq!(w.topic, "node-1/status");
            assert_eq!(w.qos, QoS::AtLeastOnce);
        }
        other => panic!("expected WILLTOPICUPD, got {other:?}"),
    }

    client.process_data(&frame(&packet::WillTopicResp {
        code: ReturnCode::Accepted,
    }));
    match common::decode(&client.port().sent[1].0) {
        SnPacket::WillMsgUpd(w) => assert_eq!(w.data, b"gone"),
        other => panic!("expected WILLMSGUPD, got {other:?}"),
    }

    client.process_data(&frame(&packet::WillMsgResp {
        code: ReturnCode::Accepted,
    }));
    assert_eq!(
        client.port().events,
        vec![Event::Done(
            OperationKind::WillUpdate,
            OperationStatus::Successful
        )]
    );
}

#[test]
fn clearing_the_will_sends_an_empty_topic_update() {
    let mut client = connected_client(0);
    client.will_update(None).unwrap();

    match common::decode(&client.port().sent[0].0) {
        SnPacket::WillTopicUpd(w) => assert_eq!(w.topic, ""),
        other => panic!("expected WILLTOPICUPD, got {other:?}"),
    }

    // a bare topic update does not chain into a message update
    client.process_data(&frame(&packet::WillTopicResp {
        code: ReturnCode::Accepted,
    }));
    assert!(client.port().sent.len() == 1);
    assert_eq!(
        client.port().events,
        vec![Event::Done(
            OperationKind::WillUpdate,
            OperationStatus::Successful
        )]
    );
}

#[test]
fn cancel_aborts_the_live_operation() {
    let mut client = connected_client(0);
    client
        .subscribe(Topic::Name("room/temperature"), QoS::AtMostOnce)
        .unwrap();
    client.cancel();
    assert_eq!(
        client.port().events,
        vec![Event::Done(
            OperationKind::Subscribe,
            OperationStatus::Aborted
        )]
    );
    // the slot is free again
    client
        .subscribe(Topic::Name("room/humidity"), QoS::AtMostOnce)
        .unwrap();
}
