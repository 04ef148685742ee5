// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

// BrokerBridge trait - connects the gateway to an MQTT broker.
//
// The gateway core never speaks the broker wire protocol. The session
// worker asks the bridge to translate upstream MQTT-SN traffic, queues the
// result on the node, and the broker worker hands it to `send`. Replies
// come back through `poll`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::error::BridgeError;
use crate::frame;
use crate::message::{
    MqttMessage, SnMessage, MQTT_CONNACK, MQTT_CONNECT, MQTT_DISCONNECT, MQTT_PUBACK,
    MQTT_PUBLISH, MQTT_SUBACK, MQTT_SUBSCRIBE, RC_ACCEPTED,
};
use crate::node::NodeId;

/// Bridge between the gateway sessions and a broker connection.
pub trait BrokerBridge: Send + Sync {
    /// Broker-side form of an upstream message, or `None` when the message
    /// has no broker counterpart.
    fn translate(&self, node: NodeId, msg: &SnMessage) -> Option<MqttMessage>;

    /// Deliver one packet on the broker session of `node`.
    fn send(&self, node: NodeId, msg: &MqttMessage) -> Result<(), BridgeError>;

    /// The device went away; close its broker session.
    fn disconnect(&self, node: NodeId);

    /// Next reply from the broker, if any.
    fn poll(&self) -> Option<(NodeId, MqttMessage)>;

    /// Broker link state, for the status light.
    fn is_connected(&self) -> bool {
        true
    }
}

// ---------------------------------------------------------------------------
// Null broker (for testing)
// ---------------------------------------------------------------------------

/// In-process stand-in for a broker. Accepts every CONNECT, acknowledges
/// QoS 1/2 publishes and subscriptions, and records what it was sent.
#[derive(Default)]
pub struct NullBroker {
    replies: Mutex<VecDeque<(NodeId, MqttMessage)>>,
    sent: Mutex<Vec<(NodeId, MqttMessage)>>,
    disconnected: Mutex<Vec<NodeId>>,
    failing_sends: AtomicUsize,
}

impl NullBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every packet handed to [`BrokerBridge::send`] so far.
    pub fn sent(&self) -> Vec<(NodeId, MqttMessage)> {
        self.sent.lock().clone()
    }

    pub fn disconnected(&self) -> Vec<NodeId> {
        self.disconnected.lock().clone()
    }

    /// Make the next `count` calls to [`BrokerBridge::send`] fail.
    pub fn fail_next_sends(&self, count: usize) {
        self.failing_sends.store(count, Ordering::Release);
    }

    /// Queue a broker-originated packet for `node`.
    pub fn inject(&self, node: NodeId, msg: MqttMessage) {
        self.replies.lock().push_back((node, msg));
    }
}

impl BrokerBridge for NullBroker {
    fn translate(&self, _node: NodeId, msg: &SnMessage) -> Option<MqttMessage> {
        let packet_type = match msg.msg_type() {
            frame::CONNECT => MQTT_CONNECT,
            frame::PUBLISH => MQTT_PUBLISH,
            frame::SUBSCRIBE => MQTT_SUBSCRIBE,
            frame::DISCONNECT => MQTT_DISCONNECT,
            _ => return None,
        };
        Some(MqttMessage::new(packet_type, msg.body().to_vec()))
    }

    fn send(&self, node: NodeId, msg: &MqttMessage) -> Result<(), BridgeError> {
        let failing = self
            .failing_sends
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(BridgeError("broker link down".into()));
        }
        self.sent.lock().push((node, msg.clone()));

        let reply = match msg.packet_type() {
            MQTT_CONNECT => Some(MqttMessage::connack(RC_ACCEPTED)),
            MQTT_PUBLISH | MQTT_SUBSCRIBE => {
                // The payload is the MQTT-SN body: flags first, then the
                // message id at the offset used by the frame type.
                let sn_type = if msg.packet_type() == MQTT_PUBLISH {
                    frame::PUBLISH
                } else {
                    frame::SUBSCRIBE
                };
                let sn = SnMessage::new(sn_type, msg.payload().to_vec());
                match (sn.qos(), sn.msg_id()) {
                    (Some(q), Some(id)) if q > 0 || sn_type == frame::SUBSCRIBE => {
                        let mut payload = id.to_be_bytes().to_vec();
                        let ack = if msg.packet_type() == MQTT_PUBLISH {
                            MQTT_PUBACK
                        } else {
                            payload.push(q);
                            MQTT_SUBACK
                        };
                        Some(MqttMessage::new(ack, payload))
                    }
                    _ => None,
                }
            }
            _ => None,
        };

        if let Some(reply) = reply {
            self.replies.lock().push_back((node, reply));
        }
        Ok(())
    }

    fn disconnect(&self, node: NodeId) {
        self.disconnected.lock().push(node);
    }

    fn poll(&self) -> Option<(NodeId, MqttMessage)> {
        self.replies.lock().pop_front()
    }
}

/// Whether a broker packet finishes a connect attempt.
pub fn is_connack(msg: &MqttMessage) -> bool {
    msg.packet_type() == MQTT_CONNACK
}
