// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! MQTT-SN gateway core over UDP/IPv6.
//!
//! Sensor devices speak MQTT-SN over UDP6; this crate terminates that side,
//! keeps one session per device, and hands upstream traffic to a pluggable
//! broker bridge.
//!
//! # Architecture
//!
//! ```text
//! MQTT-SN Device               Gateway (this crate)                 Broker
//!  6LoWPAN / Thread              Linux
//!       |                            |                                  |
//!       |--- SEARCHGW (multicast) -->|                                  |
//!       |<-- GWINFO -----------------|                                  |
//!       |--- CONNECT --------------->|--- BrokerBridge::send(CONNECT) ->|
//!       |<-- CONNACK ----------------|<-- BrokerBridge::poll(CONNACK) --|
//!       |--- PUBLISH --------------->|--- PUBLISH --------------------->|
//!       |--- DISCONNECT(duration) -->|  (asleep: PUBLISH buffered)      |
//!       |--- PINGREQ --------------->|  (awake: buffer flushed)         |
//! ```
//!
//! # Layers
//!
//! | Module | Role |
//! |--------|------|
//! | [`frame`] | 2/4-byte length header codec |
//! | [`transport`] | dual unicast/multicast UDP6 socket pair |
//! | [`network`], [`client`] | framed receive/send for gateway and device |
//! | [`node`], [`list`] | per-device session state and the registry |
//! | [`event`], [`queue`] | inter-worker queues |
//! | [`gateway`] | worker threads and event dispatch |
//! | [`bridge`] | broker-side seam ([`BrokerBridge`], [`NullBroker`]) |

pub mod address;
pub mod bridge;
pub mod client;
pub mod collab;
pub mod config;
pub mod error;
pub mod event;
pub mod frame;
pub mod gateway;
pub mod list;
pub mod message;
pub mod network;
pub mod node;
pub mod queue;
pub mod resources;
pub mod response;
pub mod transport;

// Re-exports for convenience.
pub use address::{AddressMode, ClientAddress, NwAddress128, NwAddress64};
pub use bridge::{BrokerBridge, NullBroker};
pub use client::{ClientNetwork, SendReq};
pub use collab::{AllowList, NodeAuthorizer, NullIndicator, StatusIndicator};
pub use config::{GatewayConfig, GatewaySettings};
pub use error::{
    BridgeError, ClientListError, ConfigError, FrameError, GatewayError, ProtocolError,
    TransportError,
};
pub use event::{Event, EventQueue};
pub use frame::FrameHeader;
pub use gateway::{Dispatcher, Gateway};
pub use list::ClientList;
pub use message::{MqttMessage, SnMessage};
pub use network::Network;
pub use node::{ClientNode, ClientStatus, NodeId};
pub use queue::{EventQue, MessageQue};
pub use resources::GatewayResources;
pub use response::NwResponse;
pub use transport::{CastKind, Datagram, Transport, Udp6Config, UdpPort};
