// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

// Events passed between the gateway workers.
//
// Node-scoped events carry a `NodeId`; the consumer resolves it through the
// `ClientList` and simply drops the event if the node is gone. The message
// itself stays in the node's queue.

use crate::address::ClientAddress;
use crate::message::SnMessage;
use crate::node::NodeId;
use crate::queue::EventQue;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Event {
    #[default]
    Na,
    /// Periodic tick from the sweep thread.
    Timeout,
    /// The node has MQTT messages waiting in its broker-send queue.
    BrokerSend(NodeId),
    /// The node has MQTT messages waiting in its broker-recv queue.
    BrokerRecv(NodeId),
    /// The node has MQTT-SN messages waiting in its client-send queue.
    ClientSend(NodeId),
    /// The node has MQTT-SN messages waiting in its client-recv queue.
    ClientRecv(NodeId),
    /// A message for every device, or from a device that has no session
    /// (SEARCHGW). `reply_to` is the sender when a unicast answer is due.
    Broadcast {
        msg: SnMessage,
        reply_to: Option<ClientAddress>,
    },
    /// Transport liveness signal.
    SocketAlive,
}

impl Event {
    pub fn node(&self) -> Option<NodeId> {
        match self {
            Self::BrokerSend(id)
            | Self::BrokerRecv(id)
            | Self::ClientSend(id)
            | Self::ClientRecv(id) => Some(*id),
            _ => None,
        }
    }

    pub fn broadcast(msg: SnMessage) -> Self {
        Self::Broadcast {
            msg,
            reply_to: None,
        }
    }

    pub fn broadcast_from(msg: SnMessage, sender: ClientAddress) -> Self {
        Self::Broadcast {
            msg,
            reply_to: Some(sender),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Na => "NA",
            Self::Timeout => "Timeout",
            Self::BrokerSend(_) => "BrokerSend",
            Self::BrokerRecv(_) => "BrokerRecv",
            Self::ClientSend(_) => "ClientSend",
            Self::ClientRecv(_) => "ClientRecv",
            Self::Broadcast { .. } => "Broadcast",
            Self::SocketAlive => "SocketAlive",
        }
    }
}

pub type EventQueue = EventQue<Event>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_accessor() {
        assert_eq!(Event::ClientRecv(NodeId(3)).node(), Some(NodeId(3)));
        assert_eq!(Event::BrokerSend(NodeId(4)).node(), Some(NodeId(4)));
        assert_eq!(Event::Timeout.node(), None);
        assert_eq!(Event::broadcast(SnMessage::pingreq()).node(), None);
        assert_eq!(Event::default().kind(), "NA");
    }

    #[test]
    fn test_events_through_queue() {
        let q = EventQueue::new();
        q.post(Event::ClientRecv(NodeId(1)));
        q.post(Event::Timeout);
        assert_eq!(q.try_pop(), Some(Event::ClientRecv(NodeId(1))));
        assert_eq!(q.try_pop().map(|e| e.kind()), Some("Timeout"));
        assert!(q.is_empty());
    }
}
