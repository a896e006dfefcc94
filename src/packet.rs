//! # MQTT-SN Message Structures and Serialization
//!
//! This module defines the MQTT-SN message types and the traits for
//! encoding and decoding them to and from a byte buffer. The wire format
//! is the fixed MQTT-SN layout: a one-octet frame length (three-octet
//! extended form escaped by a leading zero), a one-octet message type, and
//! type-specific big-endian fields. Variable-length fields (topic names,
//! payloads, client ids) run to the end of the frame.

use crate::error::ProtocolError;
use crate::util::{
    self, FRAME_HEADER_RESERVE, read_rest, read_rest_str, read_u8, read_u16, write_bytes, write_u8,
    write_u16,
};

/// MQTT-SN protocol id carried in CONNECT.
const PROTOCOL_ID: u8 = 0x01;

// Message-type codes.
const ADVERTISE: u8 = 0x00;
const SEARCHGW: u8 = 0x01;
const GWINFO: u8 = 0x02;
const CONNECT: u8 = 0x04;
const CONNACK: u8 = 0x05;
const WILLTOPICREQ: u8 = 0x06;
const WILLTOPIC: u8 = 0x07;
const WILLMSGREQ: u8 = 0x08;
const WILLMSG: u8 = 0x09;
const REGISTER: u8 = 0x0A;
const REGACK: u8 = 0x0B;
const PUBLISH: u8 = 0x0C;
const PUBACK: u8 = 0x0D;
const PUBCOMP: u8 = 0x0E;
const PUBREC: u8 = 0x0F;
const PUBREL: u8 = 0x10;
const SUBSCRIBE: u8 = 0x12;
const SUBACK: u8 = 0x13;
const UNSUBSCRIBE: u8 = 0x14;
const UNSUBACK: u8 = 0x15;
const PINGREQ: u8 = 0x16;
const PINGRESP: u8 = 0x17;
const DISCONNECT: u8 = 0x18;
const WILLTOPICUPD: u8 = 0x1A;
const WILLTOPICRESP: u8 = 0x1B;
const WILLMSGUPD: u8 = 0x1C;
const WILLMSGRESP: u8 = 0x1D;

// Flag bits.
const FLAG_DUP: u8 = 0x80;
const FLAG_QOS_MASK: u8 = 0x60;
const FLAG_QOS_SHIFT: u8 = 5;
const FLAG_RETAIN: u8 = 0x10;
const FLAG_WILL: u8 = 0x08;
const FLAG_CLEAN_SESSION: u8 = 0x04;
const FLAG_TOPIC_KIND_MASK: u8 = 0x03;

/// Represents the Quality of Service levels for MQTT-SN messages.
///
/// `MinusOne` is the MQTT-SN-only "publish without a session" level,
/// encoded on the wire as the reserved QoS bit pattern `0b11`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum QoS {
    MinusOne,
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

impl QoS {
    fn bits(self) -> u8 {
        match self {
            QoS::MinusOne => 0b11,
            QoS::AtMostOnce => 0b00,
            QoS::AtLeastOnce => 0b01,
            QoS::ExactlyOnce => 0b10,
        }
    }

    fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0b00 => QoS::AtMostOnce,
            0b01 => QoS::AtLeastOnce,
            0b10 => QoS::ExactlyOnce,
            _ => QoS::MinusOne,
        }
    }
}

/// How the topic of a PUBLISH/SUBSCRIBE is identified on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TopicIdKind {
    /// A gateway-assigned id negotiated via REGISTER.
    Normal,
    /// A pre-agreed id known to both sides out of band.
    Predefined,
    /// A two-character topic name carried in the id field itself.
    Short,
}

impl TopicIdKind {
    fn bits(self) -> u8 {
        match self {
            TopicIdKind::Normal => 0b00,
            TopicIdKind::Predefined => 0b01,
            TopicIdKind::Short => 0b10,
        }
    }

    fn from_bits(bits: u8) -> Result<Self, ProtocolError> {
        match bits & FLAG_TOPIC_KIND_MASK {
            0b00 => Ok(TopicIdKind::Normal),
            0b01 => Ok(TopicIdKind::Predefined),
            0b10 => Ok(TopicIdKind::Short),
            _ => Err(ProtocolError::MalformedMessage),
        }
    }
}

/// Represents the MQTT-SN return codes carried by acknowledgment messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReturnCode {
    Accepted,
    Congestion,
    InvalidTopicId,
    NotSupported,
    /// A reserved code; treated like a rejection.
    Other(u8),
}

impl From<u8> for ReturnCode {
    fn from(val: u8) -> Self {
        match val {
            0 => Self::Accepted,
            1 => Self::Congestion,
            2 => Self::InvalidTopicId,
            3 => Self::NotSupported,
            _ => Self::Other(val),
        }
    }
}

impl ReturnCode {
    fn to_u8(self) -> u8 {
        match self {
            Self::Accepted => 0,
            Self::Congestion => 1,
            Self::InvalidTopicId => 2,
            Self::NotSupported => 3,
            Self::Other(val) => val,
        }
    }
}

/// The decoded MQTT-SN flags octet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Flags {
    pub dup: bool,
    pub qos: QoS,
    pub retain: bool,
    pub will: bool,
    pub clean_session: bool,
    pub topic_kind: TopicIdKind,
}

impl Default for Flags {
    fn default() -> Self {
        Self {
            dup: false,
            qos: QoS::AtMostOnce,
            retain: false,
            will: false,
            clean_session: false,
            topic_kind: TopicIdKind::Normal,
        }
    }
}

impl Flags {
    fn encode(self) -> u8 {
        let mut bits = (self.qos.bits() << FLAG_QOS_SHIFT) | self.topic_kind.bits();
        if self.dup {
            bits |= FLAG_DUP;
        }
        if self.retain {
            bits |= FLAG_RETAIN;
        }
        if self.will {
            bits |= FLAG_WILL;
        }
        if self.clean_session {
            bits |= FLAG_CLEAN_SESSION;
        }
        bits
    }

    fn decode(bits: u8) -> Result<Self, ProtocolError> {
        Ok(Self {
            dup: bits & FLAG_DUP != 0,
            qos: QoS::from_bits((bits & FLAG_QOS_MASK) >> FLAG_QOS_SHIFT),
            retain: bits & FLAG_RETAIN != 0,
            will: bits & FLAG_WILL != 0,
            clean_session: bits & FLAG_CLEAN_SESSION != 0,
            topic_kind: TopicIdKind::from_bits(bits)?,
        })
    }
}

/// The topic reference carried by SUBSCRIBE and UNSUBSCRIBE.
///
/// The normal topic-id kind is ambiguous on the wire: outbound it may
/// carry either a full name or a previously assigned two-byte id, and only
/// the gateway can tell which was meant. Decoding always yields `Name`,
/// which is the only form a client ever receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicField<'a> {
    /// A full topic name (may contain wildcards for subscriptions).
    Name(&'a str),
    /// A gateway-assigned topic id from an earlier registration.
    Id(u16),
    /// A predefined topic id.
    Predefined(u16),
    /// A two-character short topic name.
    Short([u8; 2]),
}

impl TopicField<'_> {
    pub fn kind(&self) -> TopicIdKind {
        match self {
            TopicField::Name(_) | TopicField::Id(_) => TopicIdKind::Normal,
            TopicField::Predefined(_) => TopicIdKind::Predefined,
            TopicField::Short(_) => TopicIdKind::Short,
        }
    }
}

/// A trait for messages that can be encoded into a byte buffer.
///
/// `encode` writes a complete frame, length header included, and returns
/// the total frame length.
pub trait EncodeMessage {
    fn encode(&self, buf: &mut [u8]) -> Result<usize, ProtocolError>;
}

/// A trait for messages that can be decoded from a message body.
///
/// The body starts at the message-type octet; the frame length header has
/// already been consumed by the framing layer.
pub trait DecodeMessage<'a>: Sized {
    fn decode(body: &'a [u8]) -> Result<Self, ProtocolError>;
}

/// An enumeration of all MQTT-SN messages the client sends or receives.
#[derive(Debug)]
pub enum SnPacket<'a> {
    Advertise(Advertise),
    SearchGw(SearchGw),
    GwInfo(GwInfo<'a>),
    Connect(Connect<'a>),
    ConnAck(ConnAck),
    WillTopicReq,
    WillTopic(WillTopic<'a>),
    WillMsgReq,
    WillMsg(WillMsg<'a>),
    Register(Register<'a>),
    RegAck(RegAck),
    Publish(Publish<'a>),
    PubAck(PubAck),
    PubRec(PubRec),
    PubRel(PubRel),
    PubComp(PubComp),
    Subscribe(Subscribe<'a>),
    SubAck(SubAck),
    Unsubscribe(Unsubscribe<'a>),
    UnsubAck(UnsubAck),
    PingReq(PingReq<'a>),
    PingResp,
    Disconnect(Disconnect),
    WillTopicUpd(WillTopicUpd<'a>),
    WillTopicResp(WillTopicResp),
    WillMsgUpd(WillMsgUpd<'a>),
    WillMsgResp(WillMsgResp),
}

/// Decodes a message body (frame length already stripped) into a packet.
pub fn decode(body: &[u8]) -> Result<SnPacket<'_>, ProtocolError> {
    let msg_type = *body.first().ok_or(ProtocolError::MalformedMessage)?;
    let packet = match msg_type {
        ADVERTISE => SnPacket::Advertise(Advertise::decode(body)?),
        SEARCHGW => SnPacket::SearchGw(SearchGw::decode(body)?),
        GWINFO => SnPacket::GwInfo(GwInfo::decode(body)?),
        CONNECT => SnPacket::Connect(Connect::decode(body)?),
        CONNACK => SnPacket::ConnAck(ConnAck::decode(body)?),
        WILLTOPICREQ => SnPacket::WillTopicReq,
        WILLTOPIC => SnPacket::WillTopic(WillTopic::decode(body)?),
        WILLMSGREQ => SnPacket::WillMsgReq,
        WILLMSG => SnPacket::WillMsg(WillMsg::decode(body)?),
        REGISTER => SnPacket::Register(Register::decode(body)?),
        REGACK => SnPacket::RegAck(RegAck::decode(body)?),
        PUBLISH => SnPacket::Publish(Publish::decode(body)?),
        PUBACK => SnPacket::PubAck(PubAck::decode(body)?),
        PUBREC => SnPacket::PubRec(PubRec::decode(body)?),
        PUBREL => SnPacket::PubRel(PubRel::decode(body)?),
        PUBCOMP => SnPacket::PubComp(PubComp::decode(body)?),
        SUBSCRIBE => SnPacket::Subscribe(Subscribe::decode(body)?),
        SUBACK => SnPacket::SubAck(SubAck::decode(body)?),
        UNSUBSCRIBE => SnPacket::Unsubscribe(Unsubscribe::decode(body)?),
        UNSUBACK => SnPacket::UnsubAck(UnsubAck::decode(body)?),
        PINGREQ => SnPacket::PingReq(PingReq::decode(body)?),
        PINGRESP => SnPacket::PingResp,
        DISCONNECT => SnPacket::Disconnect(Disconnect::decode(body)?),
        WILLTOPICUPD => SnPacket::WillTopicUpd(WillTopicUpd::decode(body)?),
        WILLTOPICRESP => SnPacket::WillTopicResp(WillTopicResp::decode(body)?),
        WILLMSGUPD => SnPacket::WillMsgUpd(WillMsgUpd::decode(body)?),
        WILLMSGRESP => SnPacket::WillMsgResp(WillMsgResp::decode(body)?),
        other => return Err(ProtocolError::InvalidMessageType(other)),
    };
    Ok(packet)
}

impl EncodeMessage for SnPacket<'_> {
    fn encode(&self, buf: &mut [u8]) -> Result<usize, ProtocolError> {
        match self {
            SnPacket::Advertise(m) => m.encode(buf),
            SnPacket::SearchGw(m) => m.encode(buf),
            SnPacket::GwInfo(m) => m.encode(buf),
            SnPacket::Connect(m) => m.encode(buf),
            SnPacket::ConnAck(m) => m.encode(buf),
            SnPacket::WillTopicReq => encode_empty(buf, WILLTOPICREQ),
            SnPacket::WillTopic(m) => m.encode(buf),
            SnPacket::WillMsgReq => encode_empty(buf, WILLMSGREQ),
            SnPacket::WillMsg(m) => m.encode(buf),
            SnPacket::Register(m) => m.encode(buf),
            SnPacket::RegAck(m) => m.encode(buf),
            SnPacket::Publish(m) => m.encode(buf),
            SnPacket::PubAck(m) => m.encode(buf),
            SnPacket::PubRec(m) => m.encode(buf),
            SnPacket::PubRel(m) => m.encode(buf),
            SnPacket::PubComp(m) => m.encode(buf),
            SnPacket::Subscribe(m) => m.encode(buf),
            SnPacket::SubAck(m) => m.encode(buf),
            SnPacket::Unsubscribe(m) => m.encode(buf),
            SnPacket::UnsubAck(m) => m.encode(buf),
            SnPacket::PingReq(m) => m.encode(buf),
            SnPacket::PingResp => encode_empty(buf, PINGRESP),
            SnPacket::Disconnect(m) => m.encode(buf),
            SnPacket::WillTopicUpd(m) => m.encode(buf),
            SnPacket::WillTopicResp(m) => m.encode(buf),
            SnPacket::WillMsgUpd(m) => m.encode(buf),
            SnPacket::WillMsgResp(m) => m.encode(buf),
        }
    }
}

fn encode_empty(buf: &mut [u8], msg_type: u8) -> Result<usize, ProtocolError> {
    let mut cursor = FRAME_HEADER_RESERVE;
    write_u8(&mut cursor, buf, msg_type)?;
    util::finish_frame(buf, cursor)
}

// --- ADVERTISE ---
#[derive(Debug, Clone, Copy)]
pub struct Advertise {
    pub gw_id: u8,
    /// Seconds until the next expected advertisement.
    pub duration: u16,
}

impl<'a> DecodeMessage<'a> for Advertise {
    fn decode(body: &'a [u8]) -> Result<Self, ProtocolError> {
        let mut cursor = 1;
        Ok(Self {
            gw_id: read_u8(&mut cursor, body)?,
            duration: read_u16(&mut cursor, body)?,
        })
    }
}

impl EncodeMessage for Advertise {
    fn encode(&self, buf: &mut [u8]) -> Result<usize, ProtocolError> {
        let mut cursor = FRAME_HEADER_RESERVE;
        write_u8(&mut cursor, buf, ADVERTISE)?;
        write_u8(&mut cursor, buf, self.gw_id)?;
        write_u16(&mut cursor, buf, self.duration)?;
        util::finish_frame(buf, cursor)
    }
}

// --- SEARCHGW ---
#[derive(Debug, Clone, Copy)]
pub struct SearchGw {
    pub radius: u8,
}

impl<'a> DecodeMessage<'a> for SearchGw {
    fn decode(body: &'a [u8]) -> Result<Self, ProtocolError> {
        let mut cursor = 1;
        Ok(Self {
            radius: read_u8(&mut cursor, body)?,
        })
    }
}

impl EncodeMessage for SearchGw {
    fn encode(&self, buf: &mut [u8]) -> Result<usize, ProtocolError> {
        let mut cursor = FRAME_HEADER_RESERVE;
        write_u8(&mut cursor, buf, SEARCHGW)?;
        write_u8(&mut cursor, buf, self.radius)?;
        util::finish_frame(buf, cursor)
    }
}

// --- GWINFO ---
#[derive(Debug, Clone, Copy)]
pub struct GwInfo<'a> {
    pub gw_id: u8,
    /// Transport address of the gateway; empty when the gateway itself
    /// answered the search.
    pub gw_addr: &'a [u8],
}

impl<'a> DecodeMessage<'a> for GwInfo<'a> {
    fn decode(body: &'a [u8]) -> Result<Self, ProtocolError> {
        let mut cursor = 1;
        Ok(Self {
            gw_id: read_u8(&mut cursor, body)?,
            gw_addr: read_rest(&mut cursor, body)?,
        })
    }
}

impl EncodeMessage for GwInfo<'_> {
    fn encode(&self, buf: &mut [u8]) -> Result<usize, ProtocolError> {
        let mut cursor = FRAME_HEADER_RESERVE;
        write_u8(&mut cursor, buf, GWINFO)?;
        write_u8(&mut cursor, buf, self.gw_id)?;
        write_bytes(&mut cursor, buf, self.gw_addr)?;
        util::finish_frame(buf, cursor)
    }
}

// --- CONNECT ---
#[derive(Debug, Clone, Copy)]
pub struct Connect<'a> {
    pub clean_session: bool,
    pub will: bool,
    /// Keep-alive period in seconds.
    pub duration: u16,
    pub client_id: &'a str,
}

impl<'a> DecodeMessage<'a> for Connect<'a> {
    fn decode(body: &'a [u8]) -> Result<Self, ProtocolError> {
        let mut cursor = 1;
        let flags = Flags::decode(read_u8(&mut cursor, body)?)?;
        let _protocol_id = read_u8(&mut cursor, body)?;
        Ok(Self {
            clean_session: flags.clean_session,
            will: flags.will,
            duration: read_u16(&mut cursor, body)?,
            client_id: read_rest_str(&mut cursor, body)?,
        })
    }
}

impl EncodeMessage for Connect<'_> {
    fn encode(&self, buf: &mut [u8]) -> Result<usize, ProtocolError> {
        let flags = Flags {
            clean_session: self.clean_session,
            will: self.will,
            ..Flags::default()
        };
        let mut cursor = FRAME_HEADER_RESERVE;
        write_u8(&mut cursor, buf, CONNECT)?;
        write_u8(&mut cursor, buf, flags.encode())?;
        write_u8(&mut cursor, buf, PROTOCOL_ID)?;
        write_u16(&mut cursor, buf, self.duration)?;
        write_bytes(&mut cursor, buf, self.client_id.as_bytes())?;
        util::finish_frame(buf, cursor)
    }
}

// --- CONNACK ---
#[derive(Debug, Clone, Copy)]
pub struct ConnAck {
    pub code: ReturnCode,
}

impl<'a> DecodeMessage<'a> for ConnAck {
    fn decode(body: &'a [u8]) -> Result<Self, ProtocolError> {
        let mut cursor = 1;
        Ok(Self {
            code: read_u8(&mut cursor, body)?.into(),
        })
    }
}

impl EncodeMessage for ConnAck {
    fn encode(&self, buf: &mut [u8]) -> Result<usize, ProtocolError> {
        let mut cursor = FRAME_HEADER_RESERVE;
        write_u8(&mut cursor, buf, CONNACK)?;
        write_u8(&mut cursor, buf, self.code.to_u8())?;
        util::finish_frame(buf, cursor)
    }
}

// --- WILLTOPIC ---
/// An empty WILLTOPIC (no flags, no topic) clears the will.
#[derive(Debug, Clone, Copy)]
pub struct WillTopic<'a> {
    pub qos: QoS,
    pub retain: bool,
    pub topic: &'a str,
}

impl<'a> DecodeMessage<'a> for WillTopic<'a> {
    fn decode(body: &'a [u8]) -> Result<Self, ProtocolError> {
        if body.len() == 1 {
            return Ok(Self {
                qos: QoS::AtMostOnce,
                retain: false,
                topic: "",
            });
        }
        let mut cursor = 1;
        let flags = Flags::decode(read_u8(&mut cursor, body)?)?;
        Ok(Self {
            qos: flags.qos,
            retain: flags.retain,
            topic: read_rest_str(&mut cursor, body)?,
        })
    }
}

impl EncodeMessage for WillTopic<'_> {
    fn encode(&self, buf: &mut [u8]) -> Result<usize, ProtocolError> {
        let mut cursor = FRAME_HEADER_RESERVE;
        write_u8(&mut cursor, buf, WILLTOPIC)?;
        if !self.topic.is_empty() {
            let flags = Flags {
                qos: self.qos,
                retain: self.retain,
                ..Flags::default()
            };
            write_u8(&mut cursor, buf, flags.encode())?;
            write_bytes(&mut cursor, buf, self.topic.as_bytes())?;
        }
        util::finish_frame(buf, cursor)
    }
}

// --- WILLMSG ---
#[derive(Debug, Clone, Copy)]
pub struct WillMsg<'a> {
    pub data: &'a [u8],
}

impl<'a> DecodeMessage<'a> for WillMsg<'a> {
    fn decode(body: &'a [u8]) -> Result<Self, ProtocolError> {
        let mut cursor = 1;
        Ok(Self {
            data: read_rest(&mut cursor, body)?,
        })
    }
}

impl EncodeMessage for WillMsg<'_> {
    fn encode(&self, buf: &mut [u8]) -> Result<usize, ProtocolError> {
        let mut cursor = FRAME_HEADER_RESERVE;
        write_u8(&mut cursor, buf, WILLMSG)?;
        write_bytes(&mut cursor, buf, self.data)?;
        util::finish_frame(buf, cursor)
    }
}

// --- REGISTER ---
#[derive(Debug, Clone, Copy)]
pub struct Register<'a> {
    /// Zero when the client requests an id; the assigned id when the
    /// gateway announces one.
    pub topic_id: u16,
    pub msg_id: u16,
    pub topic: &'a str,
}

impl<'a> DecodeMessage<'a> for Register<'a> {
    fn decode(body: &'a [u8]) -> Result<Self, ProtocolError> {
        let mut cursor = 1;
        Ok(Self {
            topic_id: read_u16(&mut cursor, body)?,
            msg_id: read_u16(&mut cursor, body)?,
            topic: read_rest_str(&mut cursor, body)?,
        })
    }
}

impl EncodeMessage for Register<'_> {
    fn encode(&self, buf: &mut [u8]) -> Result<usize, ProtocolError> {
        let mut cursor = FRAME_HEADER_RESERVE;
        write_u8(&mut cursor, buf, REGISTER)?;
        write_u16(&mut cursor, buf, self.topic_id)?;
        write_u16(&mut cursor, buf, self.msg_id)?;
        write_bytes(&mut cursor, buf, self.topic.as_bytes())?;
        util::finish_frame(buf, cursor)
    }
}

// --- REGACK ---
#[derive(Debug, Clone, Copy)]
pub struct RegAck {
    pub topic_id: u16,
    pub msg_id: u16,
    pub code: ReturnCode,
}

impl<'a> DecodeMessage<'a> for RegAck {
    fn decode(body: &'a [u8]) -> Result<Self, ProtocolError> {
        let mut cursor = 1;
        Ok(Self {
            topic_id: read_u16(&mut cursor, body)?,
            msg_id: read_u16(&mut cursor, body)?,
            code: read_u8(&mut cursor, body)?.into(),
        })
    }
}

impl EncodeMessage for RegAck {
    fn encode(&self, buf: &mut [u8]) -> Result<usize, ProtocolError> {
        let mut cursor = FRAME_HEADER_RESERVE;
        write_u8(&mut cursor, buf, REGACK)?;
        write_u16(&mut cursor, buf, self.topic_id)?;
        write_u16(&mut cursor, buf, self.msg_id)?;
        write_u8(&mut cursor, buf, self.code.to_u8())?;
        util::finish_frame(buf, cursor)
    }
}

// --- PUBLISH ---
#[derive(Debug, Clone, Copy)]
pub struct Publish<'a> {
    pub dup: bool,
    pub qos: QoS,
    pub retain: bool,
    pub topic_kind: TopicIdKind,
    /// Topic id, or the two short-name characters for `TopicIdKind::Short`.
    pub topic_id: u16,
    /// Zero for QoS −1/0.
    pub msg_id: u16,
    pub payload: &'a [u8],
}

impl<'a> DecodeMessage<'a> for Publish<'a> {
    fn decode(body: &'a [u8]) -> Result<Self, ProtocolError> {
        let mut cursor = 1;
        let flags = Flags::decode(read_u8(&mut cursor, body)?)?;
        Ok(Self {
            dup: flags.dup,
            qos: flags.qos,
            retain: flags.retain,
            topic_kind: flags.topic_kind,
            topic_id: read_u16(&mut cursor, body)?,
            msg_id: read_u16(&mut cursor, body)?,
            payload: read_rest(&mut cursor, body)?,
        })
    }
}

impl EncodeMessage for Publish<'_> {
    fn encode(&self, buf: &mut [u8]) -> Result<usize, ProtocolError> {
        let flags = Flags {
            dup: self.dup,
            qos: self.qos,
            retain: self.retain,
            topic_kind: self.topic_kind,
            ..Flags::default()
        };
        let mut cursor = FRAME_HEADER_RESERVE;
        write_u8(&mut cursor, buf, PUBLISH)?;
        write_u8(&mut cursor, buf, flags.encode())?;
        write_u16(&mut cursor, buf, self.topic_id)?;
        write_u16(&mut cursor, buf, self.msg_id)?;
        write_bytes(&mut cursor, buf, self.payload)?;
        util::finish_frame(buf, cursor)
    }
}

// --- PUBACK ---
#[derive(Debug, Clone, Copy)]
pub struct PubAck {
    pub topic_id: u16,
    pub msg_id: u16,
    pub code: ReturnCode,
}

impl<'a> DecodeMessage<'a> for PubAck {
    fn decode(body: &'a [u8]) -> Result<Self, ProtocolError> {
        let mut cursor = 1;
        Ok(Self {
            topic_id: read_u16(&mut cursor, body)?,
            msg_id: read_u16(&mut cursor, body)?,
            code: read_u8(&mut cursor, body)?.into(),
        })
    }
}

impl EncodeMessage for PubAck {
    fn encode(&self, buf: &mut [u8]) -> Result<usize, ProtocolError> {
        let mut cursor = FRAME_HEADER_RESERVE;
        write_u8(&mut cursor, buf, PUBACK)?;
        write_u16(&mut cursor, buf, self.topic_id)?;
        write_u16(&mut cursor, buf, self.msg_id)?;
        write_u8(&mut cursor, buf, self.code.to_u8())?;
        util::finish_frame(buf, cursor)
    }
}

macro_rules! msg_id_only {
    ($name:ident, $code:expr) => {
        #[derive(Debug, Clone, Copy)]
        pub struct $name {
            pub msg_id: u16,
        }

        impl<'a> DecodeMessage<'a> for $name {
            fn decode(body: &'a [u8]) -> Result<Self, ProtocolError> {
                let mut cursor = 1;
                Ok(Self {
                    msg_id: read_u16(&mut cursor, body)?,
                })
            }
        }

        impl EncodeMessage for $name {
            fn encode(&self, buf: &mut [u8]) -> Result<usize, ProtocolError> {
                let mut cursor = FRAME_HEADER_RESERVE;
                write_u8(&mut cursor, buf, $code)?;
                write_u16(&mut cursor, buf, self.msg_id)?;
                util::finish_frame(buf, cursor)
            }
        }
    };
}

msg_id_only!(PubRec, PUBREC);
msg_id_only!(PubRel, PUBREL);
msg_id_only!(PubComp, PUBCOMP);
msg_id_only!(UnsubAck, UNSUBACK);

// --- SUBSCRIBE ---
#[derive(Debug, Clone, Copy)]
pub struct Subscribe<'a> {
    pub dup: bool,
    pub qos: QoS,
    pub msg_id: u16,
    pub topic: TopicField<'a>,
}

impl<'a> DecodeMessage<'a> for Subscribe<'a> {
    fn decode(body: &'a [u8]) -> Result<Self, ProtocolError> {
        let mut cursor = 1;
        let flags = Flags::decode(read_u8(&mut cursor, body)?)?;
        let msg_id = read_u16(&mut cursor, body)?;
        let topic = decode_topic_field(&mut cursor, body, flags.topic_kind)?;
        Ok(Self {
            dup: flags.dup,
            qos: flags.qos,
            msg_id,
            topic,
        })
    }
}

impl EncodeMessage for Subscribe<'_> {
    fn encode(&self, buf: &mut [u8]) -> Result<usize, ProtocolError> {
        let flags = Flags {
            dup: self.dup,
            qos: self.qos,
            topic_kind: self.topic.kind(),
            ..Flags::default()
        };
        let mut cursor = FRAME_HEADER_RESERVE;
        write_u8(&mut cursor, buf, SUBSCRIBE)?;
        write_u8(&mut cursor, buf, flags.encode())?;
        write_u16(&mut cursor, buf, self.msg_id)?;
        encode_topic_field(&mut cursor, buf, &self.topic)?;
        util::finish_frame(buf, cursor)
    }
}

// --- SUBACK ---
#[derive(Debug, Clone, Copy)]
pub struct SubAck {
    /// QoS level granted by the gateway.
    pub qos: QoS,
    /// Topic id assigned for a plain (non-wildcard) topic name, else zero.
    pub topic_id: u16,
    pub msg_id: u16,
    pub code: ReturnCode,
}

impl<'a> DecodeMessage<'a> for SubAck {
    fn decode(body: &'a [u8]) -> Result<Self, ProtocolError> {
        let mut cursor = 1;
        let flags = Flags::decode(read_u8(&mut cursor, body)?)?;
        Ok(Self {
            qos: flags.qos,
            topic_id: read_u16(&mut cursor, body)?,
            msg_id: read_u16(&mut cursor, body)?,
            code: read_u8(&mut cursor, body)?.into(),
        })
    }
}

impl EncodeMessage for SubAck {
    fn encode(&self, buf: &mut [u8]) -> Result<usize, ProtocolError> {
        let flags = Flags {
            qos: self.qos,
            ..Flags::default()
        };
        let mut cursor = FRAME_HEADER_RESERVE;
        write_u8(&mut cursor, buf, SUBACK)?;
        write_u8(&mut cursor, buf, flags.encode())?;
        write_u16(&mut cursor, buf, self.topic_id)?;
        write_u16(&mut cursor, buf, self.msg_id)?;
        write_u8(&mut cursor, buf, self.code.to_u8())?;
        util::finish_frame(buf, cursor)
    }
}

// --- UNSUBSCRIBE ---
#[derive(Debug, Clone, Copy)]
pub struct Unsubscribe<'a> {
    pub msg_id: u16,
    pub topic: TopicField<'a>,
}

impl<'a> DecodeMessage<'a> for Unsubscribe<'a> {
    fn decode(body: &'a [u8]) -> Result<Self, ProtocolError> {
        let mut cursor = 1;
        let flags = Flags::decode(read_u8(&mut cursor, body)?)?;
        let msg_id = read_u16(&mut cursor, body)?;
        let topic = decode_topic_field(&mut cursor, body, flags.topic_kind)?;
        Ok(Self { msg_id, topic })
    }
}

impl EncodeMessage for Unsubscribe<'_> {
    fn encode(&self, buf: &mut [u8]) -> Result<usize, ProtocolError> {
        let flags = Flags {
            topic_kind: self.topic.kind(),
            ..Flags::default()
        };
        let mut cursor = FRAME_HEADER_RESERVE;
        write_u8(&mut cursor, buf, UNSUBSCRIBE)?;
        write_u8(&mut cursor, buf, flags.encode())?;
        write_u16(&mut cursor, buf, self.msg_id)?;
        encode_topic_field(&mut cursor, buf, &self.topic)?;
        util::finish_frame(buf, cursor)
    }
}

// --- PINGREQ ---
#[derive(Debug, Clone, Copy)]
pub struct PingReq<'a> {
    /// Carried by a sleeping client polling for buffered messages.
    pub client_id: Option<&'a str>,
}

impl<'a> DecodeMessage<'a> for PingReq<'a> {
    fn decode(body: &'a [u8]) -> Result<Self, ProtocolError> {
        if body.len() == 1 {
            return Ok(Self { client_id: None });
        }
        let mut cursor = 1;
        Ok(Self {
            client_id: Some(read_rest_str(&mut cursor, body)?),
        })
    }
}

impl EncodeMessage for PingReq<'_> {
    fn encode(&self, buf: &mut [u8]) -> Result<usize, ProtocolError> {
        let mut cursor = FRAME_HEADER_RESERVE;
        write_u8(&mut cursor, buf, PINGREQ)?;
        if let Some(client_id) = self.client_id {
            write_bytes(&mut cursor, buf, client_id.as_bytes())?;
        }
        util::finish_frame(buf, cursor)
    }
}

// --- DISCONNECT ---
#[derive(Debug, Clone, Copy)]
pub struct Disconnect {
    /// Requested sleep duration in seconds; absent for a plain disconnect.
    pub duration: Option<u16>,
}

impl<'a> DecodeMessage<'a> for Disconnect {
    fn decode(body: &'a [u8]) -> Result<Self, ProtocolError> {
        if body.len() == 1 {
            return Ok(Self { duration: None });
        }
        let mut cursor = 1;
        Ok(Self {
            duration: Some(read_u16(&mut cursor, body)?),
        })
    }
}

impl EncodeMessage for Disconnect {
    fn encode(&self, buf: &mut [u8]) -> Result<usize, ProtocolError> {
        let mut cursor = FRAME_HEADER_RESERVE;
        write_u8(&mut cursor, buf, DISCONNECT)?;
        if let Some(duration) = self.duration {
            write_u16(&mut cursor, buf, duration)?;
        }
        util::finish_frame(buf, cursor)
    }
}

// --- WILLTOPICUPD ---
/// An empty WILLTOPICUPD (no flags, no topic) deletes the stored will.
#[derive(Debug, Clone, Copy)]
pub struct WillTopicUpd<'a> {
    pub qos: QoS,
    pub retain: bool,
    pub topic: &'a str,
}

impl<'a> DecodeMessage<'a> for WillTopicUpd<'a> {
    fn decode(body: &'a [u8]) -> Result<Self, ProtocolError> {
        if body.len() == 1 {
            return Ok(Self {
                qos: QoS::AtMostOnce,
                retain: false,
                topic: "",
            });
        }
        let mut cursor = 1;
        let flags = Flags::decode(read_u8(&mut cursor, body)?)?;
        Ok(Self {
            qos: flags.qos,
            retain: flags.retain,
            topic: read_rest_str(&mut cursor, body)?,
        })
    }
}

impl EncodeMessage for WillTopicUpd<'_> {
    fn encode(&self, buf: &mut [u8]) -> Result<usize, ProtocolError> {
        let mut cursor = FRAME_HEADER_RESERVE;
        write_u8(&mut cursor, buf, WILLTOPICUPD)?;
        if !self.topic.is_empty() {
            let flags = Flags {
                qos: self.qos,
                retain: self.retain,
                ..Flags::default()
            };
            write_u8(&mut cursor, buf, flags.encode())?;
            write_bytes(&mut cursor, buf, self.topic.as_bytes())?;
        }
        util::finish_frame(buf, cursor)
    }
}

// --- WILLMSGUPD ---
#[derive(Debug, Clone, Copy)]
pub struct WillMsgUpd<'a> {
    pub data: &'a [u8],
}

impl<'a> DecodeMessage<'a> for WillMsgUpd<'a> {
    fn decode(body: &'a [u8]) -> Result<Self, ProtocolError> {
        let mut cursor = 1;
        Ok(Self {
            data: read_rest(&mut cursor, body)?,
        })
    }
}

impl EncodeMessage for WillMsgUpd<'_> {
    fn encode(&self, buf: &mut [u8]) -> Result<usize, ProtocolError> {
        let mut cursor = FRAME_HEADER_RESERVE;
        write_u8(&mut cursor, buf, WILLMSGUPD)?;
        write_bytes(&mut cursor, buf, self.data)?;
        util::finish_frame(buf, cursor)
    }
}

macro_rules! code_only {
    ($name:ident, $code:expr) => {
        #[derive(Debug, Clone, Copy)]
        pub struct $name {
            pub code: ReturnCode,
        }

        impl<'a> DecodeMessage<'a> for $name {
            fn decode(body: &'a [u8]) -> Result<Self, ProtocolError> {
                let mut cursor = 1;
                Ok(Self {
                    code: read_u8(&mut cursor, body)?.into(),
                })
            }
        }

        impl EncodeMessage for $name {
            fn encode(&self, buf: &mut [u8]) -> Result<usize, ProtocolError> {
                let mut cursor = FRAME_HEADER_RESERVE;
                write_u8(&mut cursor, buf, $code)?;
                write_u8(&mut cursor, buf, self.code.to_u8())?;
                util::finish_frame(buf, cursor)
            }
        }
    };
}

code_only!(WillTopicResp, WILLTOPICRESP);
code_only!(WillMsgResp, WILLMSGRESP);

fn decode_topic_field<'a>(
    cursor: &mut usize,
    body: &'a [u8],
    kind: TopicIdKind,
) -> Result<TopicField<'a>, ProtocolError> {
    match kind {
        TopicIdKind::Normal => Ok(TopicField::Name(read_rest_str(cursor, body)?)),
        TopicIdKind::Predefined => Ok(TopicField::Predefined(read_u16(cursor, body)?)),
        TopicIdKind::Short => {
            let id = read_u16(cursor, body)?;
            Ok(TopicField::Short(id.to_be_bytes()))
        }
    }
}

fn encode_topic_field(
    cursor: &mut usize,
    buf: &mut [u8],
    topic: &TopicField<'_>,
) -> Result<(), ProtocolError> {
    match topic {
        TopicField::Name(name) => write_bytes(cursor, buf, name.as_bytes()),
        TopicField::Id(id) | TopicField::Predefined(id) => write_u16(cursor, buf, *id),
        TopicField::Short(chars) => write_bytes(cursor, buf, chars),
    }
}
