// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

// Minimal message model.
//
// Only the fields the session layer inspects are decoded (keep-alive,
// sleep duration, return codes, message ids). Everything else rides along
// as opaque body bytes.

use crate::error::FrameError;
use crate::frame;

// ---------------------------------------------------------------------------
// Return codes
// ---------------------------------------------------------------------------

pub const RC_ACCEPTED: u8 = 0x00;
pub const RC_REJECTED_CONGESTION: u8 = 0x01;
pub const RC_REJECTED_INVALID_TOPIC_ID: u8 = 0x02;
pub const RC_REJECTED_NOT_SUPPORTED: u8 = 0x03;

/// CONNECT flag: the client wants to exchange a will topic/message.
pub const FLAG_WILL: u8 = 0x08;
/// CONNECT flag: clean session.
pub const FLAG_CLEAN_SESSION: u8 = 0x04;

// ---------------------------------------------------------------------------
// MQTT-SN message
// ---------------------------------------------------------------------------

/// One MQTT-SN message: type byte plus body (header stripped).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnMessage {
    msg_type: u8,
    body: Vec<u8>,
}

impl SnMessage {
    pub fn new(msg_type: u8, body: Vec<u8>) -> Self {
        Self { msg_type, body }
    }

    /// Parse a complete datagram.
    pub fn from_frame(datagram: &[u8]) -> Result<Self, FrameError> {
        let (hdr, body) = frame::decode_frame(datagram)?;
        Ok(Self::new(hdr.msg_type, body.to_vec()))
    }

    /// Serialize with the appropriate header form.
    pub fn encode(&self) -> Result<Vec<u8>, FrameError> {
        frame::encode(self.msg_type, &self.body)
    }

    pub fn msg_type(&self) -> u8 {
        self.msg_type
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn type_name(&self) -> &'static str {
        frame::msg_type_name(self.msg_type)
    }

    fn u16_at(&self, offset: usize) -> Option<u16> {
        let hi = *self.body.get(offset)?;
        let lo = *self.body.get(offset + 1)?;
        Some(u16::from_be_bytes([hi, lo]))
    }

    // -- CONNECT: flags(1) protocolId(1) duration(2) clientId(n) --

    pub fn connect_flags(&self) -> Option<u8> {
        if self.msg_type != frame::CONNECT {
            return None;
        }
        self.body.first().copied()
    }

    /// Keep-alive duration in seconds.
    pub fn connect_duration(&self) -> Option<u16> {
        if self.msg_type != frame::CONNECT {
            return None;
        }
        self.u16_at(2)
    }

    pub fn connect_client_id(&self) -> Option<String> {
        if self.msg_type != frame::CONNECT || self.body.len() < 4 {
            return None;
        }
        Some(String::from_utf8_lossy(&self.body[4..]).into_owned())
    }

    pub fn has_will(&self) -> bool {
        self.connect_flags().is_some_and(|f| f & FLAG_WILL != 0)
    }

    // -- PUBLISH: flags(1) topicId(2) msgId(2) data(n) --

    /// QoS bits of a PUBLISH or SUBSCRIBE.
    pub fn qos(&self) -> Option<u8> {
        match self.msg_type {
            frame::PUBLISH | frame::SUBSCRIBE => self.body.first().map(|f| (f >> 5) & 0x03),
            _ => None,
        }
    }

    pub fn topic_id(&self) -> Option<u16> {
        match self.msg_type {
            frame::PUBLISH | frame::SUBACK => self.u16_at(1),
            frame::PUBACK | frame::REGISTER | frame::REGACK => self.u16_at(0),
            _ => None,
        }
    }

    // -- DISCONNECT: [duration(2)] --

    /// Sleep duration in seconds; `None` for a plain disconnect.
    pub fn disconnect_duration(&self) -> Option<u16> {
        if self.msg_type != frame::DISCONNECT {
            return None;
        }
        self.u16_at(0).filter(|d| *d != 0)
    }

    // -- CONNACK: returnCode(1) --

    pub fn return_code(&self) -> Option<u8> {
        match self.msg_type {
            frame::CONNACK | frame::WILLTOPICRESP | frame::WILLMSGRESP => {
                self.body.first().copied()
            }
            frame::PUBACK | frame::REGACK => self.body.get(4).copied(),
            frame::SUBACK => self.body.get(5).copied(),
            _ => None,
        }
    }

    /// Message id of the transactional messages that carry one.
    pub fn msg_id(&self) -> Option<u16> {
        match self.msg_type {
            // topicId(2) msgId(2)
            frame::PUBACK | frame::REGISTER | frame::REGACK => self.u16_at(2),
            // flags(1) topicId(2) msgId(2)
            frame::PUBLISH | frame::SUBACK => self.u16_at(3),
            // flags(1) msgId(2)
            frame::SUBSCRIBE | frame::UNSUBSCRIBE => self.u16_at(1),
            frame::UNSUBACK | frame::PUBREC | frame::PUBREL | frame::PUBCOMP => self.u16_at(0),
            _ => None,
        }
    }

    // -- Builders for messages the gateway answers locally --

    pub fn connack(return_code: u8) -> Self {
        Self::new(frame::CONNACK, vec![return_code])
    }

    pub fn pingresp() -> Self {
        Self::new(frame::PINGRESP, Vec::new())
    }

    pub fn pingreq() -> Self {
        Self::new(frame::PINGREQ, Vec::new())
    }

    pub fn disconnect(duration: Option<u16>) -> Self {
        let body = duration.map(|d| d.to_be_bytes().to_vec()).unwrap_or_default();
        Self::new(frame::DISCONNECT, body)
    }

    pub fn gwinfo(gateway_id: u8) -> Self {
        Self::new(frame::GWINFO, vec![gateway_id])
    }

    pub fn advertise(gateway_id: u8, duration_secs: u16) -> Self {
        let mut body = vec![gateway_id];
        body.extend_from_slice(&duration_secs.to_be_bytes());
        Self::new(frame::ADVERTISE, body)
    }

    pub fn willtopicreq() -> Self {
        Self::new(frame::WILLTOPICREQ, Vec::new())
    }

    pub fn willmsgreq() -> Self {
        Self::new(frame::WILLMSGREQ, Vec::new())
    }

    pub fn puback(topic_id: u16, msg_id: u16, return_code: u8) -> Self {
        let mut body = Vec::with_capacity(5);
        body.extend_from_slice(&topic_id.to_be_bytes());
        body.extend_from_slice(&msg_id.to_be_bytes());
        body.push(return_code);
        Self::new(frame::PUBACK, body)
    }

    pub fn suback(flags: u8, topic_id: u16, msg_id: u16, return_code: u8) -> Self {
        let mut body = vec![flags];
        body.extend_from_slice(&topic_id.to_be_bytes());
        body.extend_from_slice(&msg_id.to_be_bytes());
        body.push(return_code);
        Self::new(frame::SUBACK, body)
    }

    /// CONNECT with protocol id 0x01.
    pub fn connect(flags: u8, duration_secs: u16, client_id: &str) -> Self {
        let mut body = vec![flags, 0x01];
        body.extend_from_slice(&duration_secs.to_be_bytes());
        body.extend_from_slice(client_id.as_bytes());
        Self::new(frame::CONNECT, body)
    }
}

// ---------------------------------------------------------------------------
// MQTT (broker side) message
// ---------------------------------------------------------------------------

// Control packet types (high nibble of the fixed header).
pub const MQTT_CONNECT: u8 = 1;
pub const MQTT_CONNACK: u8 = 2;
pub const MQTT_PUBLISH: u8 = 3;
pub const MQTT_PUBACK: u8 = 4;
pub const MQTT_SUBSCRIBE: u8 = 8;
pub const MQTT_SUBACK: u8 = 9;
pub const MQTT_PINGREQ: u8 = 12;
pub const MQTT_PINGRESP: u8 = 13;
pub const MQTT_DISCONNECT: u8 = 14;

/// A broker-side MQTT packet. Encoding is the bridge's business; the core
/// only looks at the packet type and, for CONNACK, the return code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttMessage {
    packet_type: u8,
    payload: Vec<u8>,
}

impl MqttMessage {
    pub fn new(packet_type: u8, payload: Vec<u8>) -> Self {
        Self {
            packet_type,
            payload,
        }
    }

    pub fn packet_type(&self) -> u8 {
        self.packet_type
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// CONNACK variable header: ackFlags(1) returnCode(1).
    pub fn connack_return_code(&self) -> Option<u8> {
        if self.packet_type != MQTT_CONNACK {
            return None;
        }
        self.payload.get(1).copied()
    }

    pub fn connack(return_code: u8) -> Self {
        Self::new(MQTT_CONNACK, vec![0x00, return_code])
    }

    /// Packet identifier of PUBACK / SUBACK (first two payload bytes).
    pub fn packet_id(&self) -> Option<u16> {
        match self.packet_type {
            MQTT_PUBACK | MQTT_SUBACK => {
                let hi = *self.payload.first()?;
                let lo = *self.payload.get(1)?;
                Some(u16::from_be_bytes([hi, lo]))
            }
            _ => None,
        }
    }
}
