// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Network address value types.
//!
//! Devices are identified either by a 128-bit IPv6 address (+ scope id and
//! UDP port) or, on radio links such as XBee, by a 64-bit hardware address
//! plus a 16-bit short address. Both live behind [`ClientAddress`] so the
//! registry does not care which addressing scheme is configured.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::{Ipv6Addr, SocketAddrV6};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// 128-bit address
// ---------------------------------------------------------------------------

/// 16 raw address bytes plus the IPv6 scope id (link-local addressing).
///
/// Equality compares all 16 address bytes; the scope id is compared
/// separately with [`NwAddress128::same_scope`].
#[derive(Debug, Clone, Copy, Default)]
pub struct NwAddress128 {
    address: [u8; 16],
    scope_id: u32,
}

impl NwAddress128 {
    pub const UNSPECIFIED: Self = Self {
        address: [0; 16],
        scope_id: 0,
    };

    pub fn new(address: [u8; 16], scope_id: u32) -> Self {
        Self { address, scope_id }
    }

    pub fn address(&self) -> [u8; 16] {
        self.address
    }

    pub fn scope_id(&self) -> u32 {
        self.scope_id
    }

    pub fn set_address(&mut self, address: [u8; 16]) {
        self.address = address;
    }

    pub fn set_scope_id(&mut self, scope_id: u32) {
        self.scope_id = scope_id;
    }

    /// Zero the address bytes and the scope id.
    pub fn reset(&mut self) {
        *self = Self::UNSPECIFIED;
    }

    /// Compare against raw bytes, ignoring the scope id.
    pub fn is_address(&self, address: &[u8; 16]) -> bool {
        self.address == *address
    }

    pub fn is_unspecified(&self) -> bool {
        self.address == [0; 16]
    }

    pub fn same_scope(&self, other: &Self) -> bool {
        self.scope_id == other.scope_id
    }

    pub fn to_ipv6(&self) -> Ipv6Addr {
        Ipv6Addr::from(self.address)
    }

    /// Build a socket address. `port` is in host byte order.
    pub fn to_socket_addr(&self, port: u16) -> SocketAddrV6 {
        SocketAddrV6::new(self.to_ipv6(), port, 0, self.scope_id)
    }
}

impl PartialEq for NwAddress128 {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl Eq for NwAddress128 {}

impl Hash for NwAddress128 {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address.hash(state);
    }
}

impl From<Ipv6Addr> for NwAddress128 {
    fn from(ip: Ipv6Addr) -> Self {
        Self::new(ip.octets(), 0)
    }
}

impl From<&SocketAddrV6> for NwAddress128 {
    fn from(sa: &SocketAddrV6) -> Self {
        Self::new(sa.ip().octets(), sa.scope_id())
    }
}

impl fmt::Display for NwAddress128 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scope_id != 0 {
            write!(f, "{}%{}", self.to_ipv6(), self.scope_id)
        } else {
            write!(f, "{}", self.to_ipv6())
        }
    }
}

// ---------------------------------------------------------------------------
// 64-bit address
// ---------------------------------------------------------------------------

/// 64-bit hardware address split into most/least significant words.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct NwAddress64 {
    msb: u32,
    lsb: u32,
}

impl NwAddress64 {
    pub fn new(msb: u32, lsb: u32) -> Self {
        Self { msb, lsb }
    }

    pub fn msb(&self) -> u32 {
        self.msb
    }

    pub fn lsb(&self) -> u32 {
        self.lsb
    }

    pub fn set_msb(&mut self, msb: u32) {
        self.msb = msb;
    }

    pub fn set_lsb(&mut self, lsb: u32) {
        self.lsb = lsb;
    }

    pub fn to_bytes(&self) -> [u8; 8] {
        let mut out = [0u8; 8];
        out[..4].copy_from_slice(&self.msb.to_be_bytes());
        out[4..].copy_from_slice(&self.lsb.to_be_bytes());
        out
    }
}

impl fmt::Display for NwAddress64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}{:08x}", self.msb, self.lsb)
    }
}

// ---------------------------------------------------------------------------
// Addressing strategy
// ---------------------------------------------------------------------------

/// Which addressing scheme the registry expects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressMode {
    /// 64-bit hardware address + 16-bit short address.
    Short,
    /// IPv6 address + scope id + UDP port.
    #[default]
    Long,
}

/// Identity of a device on the sensor network.
///
/// Two long addresses are the same device only when bytes, scope id and
/// port all match, so a link-local address seen on two interfaces names two
/// devices.
#[derive(Debug, Clone, Copy)]
pub enum ClientAddress {
    Short { addr64: NwAddress64, addr16: u16 },
    /// `port` is kept in network byte order, as received.
    Long { addr: NwAddress128, port: u16 },
}

impl ClientAddress {
    /// Long address from a UDP source. The port is stored in network byte order.
    pub fn from_socket_addr(sa: &SocketAddrV6) -> Self {
        Self::Long {
            addr: NwAddress128::from(sa),
            port: sa.port().to_be(),
        }
    }

    pub fn mode(&self) -> AddressMode {
        match self {
            Self::Short { .. } => AddressMode::Short,
            Self::Long { .. } => AddressMode::Long,
        }
    }

    /// The 16-bit part: short address or UDP port (network byte order).
    pub fn addr16(&self) -> u16 {
        match self {
            Self::Short { addr16, .. } => *addr16,
            Self::Long { port, .. } => *port,
        }
    }

    pub fn long_address(&self) -> Option<&NwAddress128> {
        match self {
            Self::Long { addr, .. } => Some(addr),
            Self::Short { .. } => None,
        }
    }

    /// Destination socket address for a long address.
    pub fn to_socket_addr(&self) -> Option<SocketAddrV6> {
        match self {
            Self::Long { addr, port } => Some(addr.to_socket_addr(u16::from_be(*port))),
            Self::Short { .. } => None,
        }
    }
}

impl PartialEq for ClientAddress {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Self::Short { addr64, addr16 },
                Self::Short {
                    addr64: other64,
                    addr16: other16,
                },
            ) => addr64 == other64 && addr16 == other16,
            (
                Self::Long { addr, port },
                Self::Long {
                    addr: other_addr,
                    port: other_port,
                },
            ) => addr == other_addr && addr.same_scope(other_addr) && port == other_port,
            _ => false,
        }
    }
}

impl Eq for ClientAddress {}

impl Hash for ClientAddress {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Self::Short { addr64, addr16 } => {
                0u8.hash(state);
                addr64.hash(state);
                addr16.hash(state);
            }
            Self::Long { addr, port } => {
                1u8.hash(state);
                addr.hash(state);
                addr.scope_id().hash(state);
                port.hash(state);
            }
        }
    }
}

impl fmt::Display for ClientAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Short { addr64, addr16 } => write!(f, "{}/{:04x}", addr64, addr16),
            Self::Long { addr, port } => write!(f, "[{}]:{}", addr, u16::from_be(*port)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(last: u8) -> NwAddress128 {
        let mut bytes = [0x20, 0x01, 0x0d, 0xb8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        bytes[15] = last;
        NwAddress128::new(bytes, 0)
    }

    #[test]
    fn test_address128_equality_is_exact() {
        let a = addr(1);
        let b = addr(1);
        let c = addr(2);
        assert_eq!(a, a);
        assert_eq!(a, b);
        assert_eq!(b, a);
        assert_ne!(a, c);
        assert_ne!(c, a);
    }

    #[test]
    fn test_address128_scope_compared_separately() {
        let a = NwAddress128::new(addr(1).address(), 3);
        let b = NwAddress128::new(addr(1).address(), 4);
        assert_eq!(a, b);
        assert!(!a.same_scope(&b));
    }

    #[test]
    fn test_address128_reset() {
        let mut a = NwAddress128::new(addr(9).address(), 2);
        assert!(!a.is_unspecified());
        a.reset();
        assert!(a.is_unspecified());
        assert_eq!(a.scope_id(), 0);
    }

    #[test]
    fn test_client_address_port_is_network_order() {
        let sa = SocketAddrV6::new("2001:db8::1".parse().unwrap(), 47000, 0, 0);
        let ca = ClientAddress::from_socket_addr(&sa);
        assert_eq!(ca.addr16(), 47000u16.to_be());
        assert_eq!(ca.to_socket_addr(), Some(sa));
        assert_eq!(ca.to_string(), "[2001:db8::1]:47000");
    }

    #[test]
    fn test_client_address_includes_scope() {
        let ip = "fe80::1".parse().unwrap();
        let on_eth = ClientAddress::from_socket_addr(&SocketAddrV6::new(ip, 47000, 0, 2));
        let on_wpan = ClientAddress::from_socket_addr(&SocketAddrV6::new(ip, 47000, 0, 3));
        assert_ne!(on_eth, on_wpan);
        assert_eq!(
            on_eth,
            ClientAddress::from_socket_addr(&SocketAddrV6::new(ip, 47000, 0, 2))
        );
        assert_eq!(on_wpan.to_string(), "[fe80::1%3]:47000");
    }

    #[test]
    fn test_address64_bytes() {
        let a = NwAddress64::new(0x0013_a200, 0x4086_d8c1);
        assert_eq!(a.to_bytes(), [0x00, 0x13, 0xa2, 0x00, 0x40, 0x86, 0xd8, 0xc1]);
        assert_eq!(a.to_string(), "0013a2004086d8c1");
    }
}
