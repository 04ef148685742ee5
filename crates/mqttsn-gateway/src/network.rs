// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

// Gateway-side network: frames in, frames out.

use std::time::Duration;

use crate::address::ClientAddress;
use crate::error::TransportError;
use crate::message::SnMessage;
use crate::response::NwResponse;
use crate::transport::{Transport, Udp6Config, UdpPort};

/// Framed view over a [`Transport`].
pub struct Network {
    transport: Box<dyn Transport>,
    timeout: Option<Duration>,
}

impl Network {
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            transport,
            timeout: None,
        }
    }

    /// Open a gateway `UdpPort` with `config`.
    pub fn open(config: &Udp6Config) -> Result<Self, TransportError> {
        let port = UdpPort::new();
        port.open(config)?;
        Ok(Self::new(Box::new(port)))
    }

    /// Receive wait bound; `None` waits until data or [`wakeup`](Self::wakeup).
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Wait for one frame and load it into `resp`.
    ///
    /// Returns `Ok(true)` when `resp` holds a valid frame. Timeouts and
    /// malformed frames give `Ok(false)`; only transport failures are errors.
    pub fn get_response(&self, resp: &mut NwResponse) -> Result<bool, TransportError> {
        resp.reset_response();
        let dg = match self.transport.receive(resp.buffer_mut(), self.timeout)? {
            Some(dg) => dg,
            None => return Ok(false),
        };
        match resp.load(dg.len, &dg.source) {
            Ok(()) => {
                log::trace!(
                    "[UDP6] recv {} bytes {:?} from {}",
                    dg.len,
                    dg.cast,
                    dg.source
                );
                Ok(true)
            }
            Err(e) => {
                log::debug!("[UDP6] dropped frame from {}: {}", dg.source, e);
                Ok(false)
            }
        }
    }

    /// Send a message to one device.
    pub fn unicast(&self, msg: &SnMessage, dest: &ClientAddress) -> Result<usize, TransportError> {
        let sa = dest
            .to_socket_addr()
            .ok_or_else(|| TransportError::Config(format!("{} is not a UDP address", dest)))?;
        let bytes = msg.encode()?;
        self.transport.send_unicast(&bytes, &sa)
    }

    /// Send a message to the multicast group.
    pub fn broadcast(&self, msg: &SnMessage) -> Result<usize, TransportError> {
        let bytes = msg.encode()?;
        self.transport.send_multicast(&bytes)
    }

    pub fn wakeup(&self) {
        self.transport.wakeup();
    }

    pub fn close(&self) {
        self.transport.close();
    }
}
