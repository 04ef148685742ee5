// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Dual-socket UDP/IPv6 transport.
//!
//! [`UdpPort`] owns a unicast socket and a multicast socket, both bound on
//! the IPv6 wildcard address with `IPV6_V6ONLY` and `SO_REUSEADDR`, with
//! multicast loopback disabled so the gateway never hears its own
//! broadcasts. Receive waits on both sockets at once through a `mio`
//! poll; a [`mio::Waker`] lets another thread interrupt an unbounded wait.
//!
//! Lifecycle is `Closed -> Open -> Closed`. `open` builds everything in
//! locals and only publishes the sockets once every step has succeeded, so
//! a failed open never leaves a half-configured port behind.

use std::io;
use std::net::{Ipv6Addr, SocketAddr, SocketAddrV6};
use std::sync::Arc;
use std::time::Duration;

use mio::net::UdpSocket;
use mio::{Events, Interest, Poll, Token, Waker};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use socket2::{Domain, Protocol, Socket, Type};

use crate::error::TransportError;
use crate::frame::MAX_FRAME_SIZE;

const UNICAST: Token = Token(0);
const MULTICAST: Token = Token(1);
const WAKER: Token = Token(2);

/// Default MQTT-SN gateway port.
pub const DEFAULT_UNICAST_PORT: u16 = 2000;
/// Default port for the multicast group.
pub const DEFAULT_MULTICAST_PORT: u16 = 1883;
/// Default multicast group (link-local scope).
pub const DEFAULT_MULTICAST_GROUP: &str = "ff02::1:fe";

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Transport settings: the `[udp6]` section of the gateway config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Udp6Config {
    /// Port of the unicast socket (host order, non-zero).
    pub unicast_port: u16,
    /// Port of the multicast socket and of broadcast destinations.
    pub multicast_port: u16,
    /// Multicast group, textual IPv6 form.
    pub multicast_group: String,
    /// Interface index for group membership and scope of link-local
    /// destinations; 0 lets the kernel pick.
    pub interface_index: u32,
}

impl Default for Udp6Config {
    fn default() -> Self {
        Self {
            unicast_port: DEFAULT_UNICAST_PORT,
            multicast_port: DEFAULT_MULTICAST_PORT,
            multicast_group: DEFAULT_MULTICAST_GROUP.to_string(),
            interface_index: 0,
        }
    }
}

impl Udp6Config {
    /// Check ports and group. Returns the parsed group address.
    pub fn validate(&self) -> Result<Ipv6Addr, TransportError> {
        if self.unicast_port == 0 {
            return Err(TransportError::Config("unicast_port must be non-zero".into()));
        }
        if self.multicast_port == 0 {
            return Err(TransportError::Config("multicast_port must be non-zero".into()));
        }
        let group: Ipv6Addr = self.multicast_group.parse().map_err(|_| {
            TransportError::Config(format!(
                "multicast_group '{}' is not an IPv6 address",
                self.multicast_group
            ))
        })?;
        if !group.is_multicast() {
            return Err(TransportError::Config(format!(
                "multicast_group '{}' is not a multicast address",
                group
            )));
        }
        Ok(group)
    }
}

// ---------------------------------------------------------------------------
// Transport trait
// ---------------------------------------------------------------------------

/// Which socket a datagram arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastKind {
    Unicast,
    Multicast,
}

/// Metadata of one received datagram; the bytes are in the caller's buffer.
///
/// `len` is the size on the wire. A `len` larger than the caller's buffer
/// means the datagram did not fit and only its head was copied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Datagram {
    pub len: usize,
    pub source: SocketAddrV6,
    pub cast: CastKind,
}

/// Datagram transport used by [`crate::network::Network`].
pub trait Transport: Send + Sync {
    /// Wait up to `timeout` (`None` = until data or [`wakeup`](Self::wakeup))
    /// and read one datagram into `buf`. `Ok(None)` means no data.
    fn receive(
        &self,
        buf: &mut [u8],
        timeout: Option<Duration>,
    ) -> Result<Option<Datagram>, TransportError>;

    fn send_unicast(&self, payload: &[u8], dest: &SocketAddrV6) -> Result<usize, TransportError>;

    /// Send to the configured group on the multicast port.
    fn send_multicast(&self, payload: &[u8]) -> Result<usize, TransportError>;

    /// Interrupt a blocked `receive`.
    fn wakeup(&self) {}

    fn close(&self) {}
}

// ---------------------------------------------------------------------------
// UDP port
// ---------------------------------------------------------------------------

/// Predicate applied to the peeked sender before a datagram is consumed.
pub type SenderFilter<'a> = &'a dyn Fn(&SocketAddrV6, CastKind) -> bool;

struct RxState {
    poll: Poll,
    events: Events,
    multicast_first: bool,
    // One byte past the largest frame so oversized datagrams show up as such.
    scratch: Box<[u8; MAX_FRAME_SIZE + 1]>,
}

struct Sockets {
    unicast: UdpSocket,
    multicast: UdpSocket,
    group: SocketAddrV6,
    waker: Waker,
    rx: Mutex<RxState>,
}

/// Unicast + multicast UDP/IPv6 socket pair.
pub struct UdpPort {
    sockets: RwLock<Option<Arc<Sockets>>>,
}

impl Default for UdpPort {
    fn default() -> Self {
        Self::new()
    }
}

impl UdpPort {
    /// A closed port.
    pub fn new() -> Self {
        Self {
            sockets: RwLock::new(None),
        }
    }

    /// Open the gateway variant: the group is joined on both sockets.
    pub fn open(&self, config: &Udp6Config) -> Result<(), TransportError> {
        self.open_with(config, true)
    }

    /// Open the device variant: the group is joined on the multicast socket only.
    pub fn open_client(&self, config: &Udp6Config) -> Result<(), TransportError> {
        self.open_with(config, false)
    }

    fn open_with(&self, config: &Udp6Config, join_on_unicast: bool) -> Result<(), TransportError> {
        let group = config.validate()?;
        self.close();

        let sockets = build_sockets(config, group, join_on_unicast).map_err(|e| {
            log::error!(
                "[UDP6] open failed (unicast={}, multicast={}, group={}): {}",
                config.unicast_port,
                config.multicast_port,
                group,
                e
            );
            TransportError::Io(e)
        })?;

        *self.sockets.write() = Some(Arc::new(sockets));
        log::info!(
            "[UDP6] open: unicast [::]:{} multicast [{}]:{} if={}",
            config.unicast_port,
            group,
            config.multicast_port,
            config.interface_index
        );
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.sockets.read().is_some()
    }

    /// Release both sockets. Safe to call on a closed port.
    pub fn close(&self) {
        let taken = self.sockets.write().take();
        if let Some(sockets) = taken {
            // A receiver blocked in poll still holds its own Arc; wake it so
            // the sockets are dropped as soon as it returns.
            let _ = sockets.waker.wake();
            log::debug!("[UDP6] closed");
        }
    }

    /// Bound ports `(unicast, multicast)` of an open port.
    pub fn local_ports(&self) -> Result<(u16, u16), TransportError> {
        let s = self.current()?;
        Ok((s.unicast.local_addr()?.port(), s.multicast.local_addr()?.port()))
    }

    fn current(&self) -> Result<Arc<Sockets>, TransportError> {
        self.sockets.read().clone().ok_or(TransportError::NotOpen)
    }

    /// Receive one datagram whose sender passes `filter`. Rejected datagrams
    /// are consumed and dropped. Senders are classified with a peek before
    /// any bytes are taken off the socket.
    pub fn receive_filtered(
        &self,
        buf: &mut [u8],
        timeout: Option<Duration>,
        filter: Option<SenderFilter<'_>>,
    ) -> Result<Option<Datagram>, TransportError> {
        let sockets = self.current()?;
        let mut rx = sockets.rx.lock();

        // mio is edge-triggered: drain what is already queued before waiting.
        if let Some(dg) = sockets.try_recv(&mut rx, buf, filter)? {
            return Ok(Some(dg));
        }

        let RxState { poll, events, .. } = &mut *rx;
        match poll.poll(events, timeout) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(None),
            Err(e) => return Err(e.into()),
        }
        if events.iter().any(|ev| ev.token() == WAKER) {
            log::trace!("[UDP6] receive woken");
        }
        sockets.try_recv(&mut rx, buf, filter)
    }
}

impl Transport for UdpPort {
    fn receive(
        &self,
        buf: &mut [u8],
        timeout: Option<Duration>,
    ) -> Result<Option<Datagram>, TransportError> {
        self.receive_filtered(buf, timeout, None)
    }

    fn send_unicast(&self, payload: &[u8], dest: &SocketAddrV6) -> Result<usize, TransportError> {
        let sockets = self.current()?;
        sockets
            .unicast
            .send_to(payload, SocketAddr::V6(*dest))
            .map_err(|e| {
                log::warn!("[UDP6] sendto {} failed: {}", dest, e);
                TransportError::Io(e)
            })
    }

    fn send_multicast(&self, payload: &[u8]) -> Result<usize, TransportError> {
        let sockets = self.current()?;
        let group = sockets.group;
        sockets
            .unicast
            .send_to(payload, SocketAddr::V6(group))
            .map_err(|e| {
                log::warn!("[UDP6] multicast sendto {} failed: {}", group, e);
                TransportError::Io(e)
            })
    }

    fn wakeup(&self) {
        if let Ok(sockets) = self.current() {
            let _ = sockets.waker.wake();
        }
    }

    fn close(&self) {
        UdpPort::close(self);
    }
}

impl Drop for UdpPort {
    fn drop(&mut self) {
        self.close();
    }
}

impl Sockets {
    fn try_recv(
        &self,
        rx: &mut RxState,
        buf: &mut [u8],
        filter: Option<SenderFilter<'_>>,
    ) -> Result<Option<Datagram>, TransportError> {
        // Alternate which socket goes first so neither starves the other.
        rx.multicast_first = !rx.multicast_first;
        let order = if rx.multicast_first {
            [(&self.multicast, CastKind::Multicast), (&self.unicast, CastKind::Unicast)]
        } else {
            [(&self.unicast, CastKind::Unicast), (&self.multicast, CastKind::Multicast)]
        };

        for (socket, cast) in order {
            loop {
                if let Some(accept) = filter {
                    let mut head = [0u8; 4];
                    let source = match socket.peek_from(&mut head) {
                        Ok((_, SocketAddr::V6(sa))) => sa,
                        Ok((_, SocketAddr::V4(_))) => {
                            discard(socket, buf);
                            continue;
                        }
                        Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                        Err(e) => return Err(e.into()),
                    };
                    if !accept(&source, cast) {
                        log::debug!("[UDP6] dropped {:?} datagram from {}", cast, source);
                        discard(socket, buf);
                        continue;
                    }
                }

                match socket.recv_from(&mut rx.scratch[..]) {
                    Ok((len, SocketAddr::V6(source))) => {
                        if len > MAX_FRAME_SIZE {
                            log::debug!("[UDP6] oversized datagram from {}", source);
                        }
                        let copied = len.min(buf.len());
                        buf[..copied].copy_from_slice(&rx.scratch[..copied]);
                        return Ok(Some(Datagram { len, source, cast }));
                    }
                    // IPV6_V6ONLY is set, so this cannot happen; drop it anyway.
                    Ok((_, SocketAddr::V4(_))) => continue,
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Ok(None)
    }
}

fn discard(socket: &UdpSocket, buf: &mut [u8]) {
    let _ = socket.recv_from(buf);
}

// ---------------------------------------------------------------------------
// Socket setup
// ---------------------------------------------------------------------------

fn bind_v6(port: u16) -> io::Result<Socket> {
    let socket = Socket::new(Domain::IPV6, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_only_v6(true)?;
    socket.set_reuse_address(true)?;
    let addr = SocketAddr::V6(SocketAddrV6::new(Ipv6Addr::UNSPECIFIED, port, 0, 0));
    socket.bind(&addr.into())?;
    socket.set_multicast_loop_v6(false)?;
    socket.set_nonblocking(true)?;
    Ok(socket)
}

fn build_sockets(
    config: &Udp6Config,
    group: Ipv6Addr,
    join_on_unicast: bool,
) -> io::Result<Sockets> {
    let unicast = bind_v6(config.unicast_port)?;
    let multicast = bind_v6(config.multicast_port)?;

    multicast.join_multicast_v6(&group, config.interface_index)?;
    if join_on_unicast {
        unicast.join_multicast_v6(&group, config.interface_index)?;
    }
    if config.interface_index != 0 {
        unicast.set_multicast_if_v6(config.interface_index)?;
    }

    let mut unicast = UdpSocket::from_std(unicast.into());
    let mut multicast = UdpSocket::from_std(multicast.into());

    let poll = Poll::new()?;
    poll.registry()
        .register(&mut unicast, UNICAST, Interest::READABLE)?;
    poll.registry()
        .register(&mut multicast, MULTICAST, Interest::READABLE)?;
    let waker = Waker::new(poll.registry(), WAKER)?;

    Ok(Sockets {
        unicast,
        multicast,
        group: SocketAddrV6::new(group, config.multicast_port, 0, config.interface_index),
        waker,
        rx: Mutex::new(RxState {
            poll,
            events: Events::with_capacity(8),
            multicast_first: false,
            scratch: Box::new([0u8; MAX_FRAME_SIZE + 1]),
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_zero_ports() {
        let mut cfg = Udp6Config::default();
        cfg.unicast_port = 0;
        assert!(matches!(cfg.validate(), Err(TransportError::Config(_))));

        let mut cfg = Udp6Config::default();
        cfg.multicast_port = 0;
        assert!(matches!(cfg.validate(), Err(TransportError::Config(_))));
    }

    #[test]
    fn test_validate_group() {
        let mut cfg = Udp6Config::default();
        assert_eq!(cfg.validate().unwrap(), "ff02::1:fe".parse::<Ipv6Addr>().unwrap());

        cfg.multicast_group = "not-an-address".into();
        assert!(cfg.validate().is_err());

        cfg.multicast_group = "2001:db8::1".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_closed_port() {
        let port = UdpPort::new();
        assert!(!port.is_open());
        port.close();
        port.close();
        let dest: SocketAddrV6 = "[::1]:9".parse().unwrap();
        assert!(matches!(port.send_unicast(&[1], &dest), Err(TransportError::NotOpen)));
        let mut buf = [0u8; 16];
        assert!(matches!(
            port.receive(&mut buf, Some(Duration::from_millis(1))),
            Err(TransportError::NotOpen)
        ));
    }

    #[test]
    fn test_invalid_config_leaves_port_closed() {
        let port = UdpPort::new();
        let cfg = Udp6Config {
            multicast_group: "ff02::zz".into(),
            ..Udp6Config::default()
        };
        assert!(port.open(&cfg).is_err());
        assert!(!port.is_open());
    }
}
