// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Device-side network.
//!
//! A sensor node talks to one gateway. It listens on the same socket pair
//! as the gateway but with a bounded 500 ms wait, learns the gateway address
//! from ADVERTISE/GWINFO, and from then on ignores unicast traffic from any
//! other address or port. Received frames are handed to a handler closure installed
//! with [`ClientNetwork::set_rx_handler`].

use std::net::SocketAddrV6;
use std::time::Duration;

use crate::address::NwAddress128;
use crate::error::TransportError;
use crate::response::NwResponse;
use crate::transport::{CastKind, Transport, Udp6Config, UdpPort};

/// Receive wait used by devices.
pub const CLIENT_RECV_TIMEOUT: Duration = Duration::from_millis(500);

/// Destination of a device send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendReq {
    /// To the learned gateway address.
    Unicast,
    /// To the multicast group.
    Broadcast,
}

/// Called once per accepted frame; the returned code is passed back to the
/// caller of [`ClientNetwork::poll`].
pub type RxHandler = Box<dyn FnMut(&NwResponse) -> i32 + Send>;

pub struct ClientNetwork {
    port: UdpPort,
    gateway: Option<SocketAddrV6>,
    sleeping: bool,
    handler: Option<RxHandler>,
    response: NwResponse,
    last_cast: Option<CastKind>,
}

impl Default for ClientNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientNetwork {
    pub fn new() -> Self {
        Self {
            port: UdpPort::new(),
            gateway: None,
            sleeping: false,
            handler: None,
            response: NwResponse::new(),
            last_cast: None,
        }
    }

    pub fn open(&mut self, config: &Udp6Config) -> Result<(), TransportError> {
        self.port.open_client(config)
    }

    pub fn close(&mut self) {
        self.port.close();
    }

    pub fn is_open(&self) -> bool {
        self.port.is_open()
    }

    /// Remember the gateway; `port` in host byte order.
    pub fn set_gw_address(&mut self, addr: &NwAddress128, port: u16) {
        log::debug!("[UDP6] gateway set to [{}]:{}", addr, port);
        self.gateway = Some(addr.to_socket_addr(port));
    }

    pub fn reset_gw_address(&mut self) {
        self.gateway = None;
    }

    pub fn gw_address(&self) -> Option<SocketAddrV6> {
        self.gateway
    }

    pub fn set_rx_handler<F>(&mut self, handler: F)
    where
        F: FnMut(&NwResponse) -> i32 + Send + 'static,
    {
        self.handler = Some(Box::new(handler));
    }

    /// While sleeping the device only checks for already-queued datagrams.
    pub fn set_sleep(&mut self, sleeping: bool) {
        self.sleeping = sleeping;
    }

    pub fn is_sleeping(&self) -> bool {
        self.sleeping
    }

    /// Socket the most recent frame arrived on.
    pub fn last_cast(&self) -> Option<CastKind> {
        self.last_cast
    }

    pub fn send(&self, payload: &[u8], req: SendReq) -> Result<usize, TransportError> {
        match req {
            SendReq::Broadcast => self.port.send_multicast(payload),
            SendReq::Unicast => {
                let gw = self.gateway.ok_or_else(|| {
                    TransportError::Config("gateway address not known yet".into())
                })?;
                self.port.send_unicast(payload, &gw)
            }
        }
    }

    /// Read one frame into `resp`.
    ///
    /// Returns `Ok(true)` when `resp` is available. A frame whose length
    /// byte disagrees with the datagram size leaves `resp` unavailable with
    /// `PACKET_EXCEEDS_LENGTH` set.
    pub fn get_response(&mut self, resp: &mut NwResponse) -> Result<bool, TransportError> {
        resp.reset_response();
        let timeout = if self.sleeping {
            Duration::ZERO
        } else {
            CLIENT_RECV_TIMEOUT
        };

        let gateway = self.gateway;
        let from_gateway = move |source: &SocketAddrV6, cast: CastKind| -> bool {
            match (gateway, cast) {
                (Some(gw), CastKind::Unicast)
                    if gw.ip() != source.ip() || gw.port() != source.port() =>
                {
                    log::debug!("[UDP6] sender {} is not the gateway", source);
                    false
                }
                _ => true,
            }
        };

        let dg = match self
            .port
            .receive_filtered(resp.buffer_mut(), Some(timeout), Some(&from_gateway))?
        {
            Some(dg) => dg,
            None => return Ok(false),
        };
        self.last_cast = Some(dg.cast);

        match resp.load(dg.len, &dg.source) {
            Ok(()) => Ok(true),
            Err(e) => {
                log::debug!("[UDP6] bad frame from {}: {}", dg.source, e);
                Ok(false)
            }
        }
    }

    /// Receive one frame and run the handler on it. `Ok(None)` when nothing
    /// usable arrived.
    pub fn poll(&mut self) -> Result<Option<i32>, TransportError> {
        let mut resp = std::mem::take(&mut self.response);
        let result = self.get_response(&mut resp);
        let outcome = match result {
            Ok(true) => Ok(Some(match self.handler.as_mut() {
                Some(handler) => handler(&resp),
                None => 0,
            })),
            Ok(false) => Ok(None),
            Err(e) => Err(e),
        };
        self.response = resp;
        outcome
    }

    /// The response buffer used by [`poll`](Self::poll).
    pub fn response(&self) -> &NwResponse {
        &self.response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unicast_needs_gateway() {
        let net = ClientNetwork::new();
        assert!(net.send(&[2, 0x16], SendReq::Unicast).is_err());
    }

    #[test]
    fn test_gateway_address_learning() {
        let mut net = ClientNetwork::new();
        let gw = NwAddress128::from("fe80::1".parse::<std::net::Ipv6Addr>().unwrap());
        net.set_gw_address(&gw, 2000);
        let sa = net.gw_address().unwrap();
        assert_eq!(sa.port(), 2000);
        assert_eq!(sa.ip(), &gw.to_ipv6());
        net.reset_gw_address();
        assert!(net.gw_address().is_none());
    }

    #[test]
    fn test_poll_on_closed_port_is_error() {
        let mut net = ClientNetwork::new();
        net.set_rx_handler(|_| 7);
        assert!(matches!(net.poll(), Err(TransportError::NotOpen)));
    }
}
