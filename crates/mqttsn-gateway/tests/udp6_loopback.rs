// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com
//
// UDP6 loopback tests: real sockets on [::1].
//
// Hosts without IPv6 or without a multicast-capable interface cannot open
// the gateway port; those tests print a note and return early.

use std::net::{Ipv6Addr, SocketAddrV6, UdpSocket};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use mqttsn_gateway::frame::{self, decode_frame, encode, MAX_FRAME_SIZE};
use mqttsn_gateway::response::PACKET_EXCEEDS_LENGTH;
use mqttsn_gateway::{
    ClientAddress, ClientNetwork, Network, NwAddress128, NwResponse, SnMessage, Udp6Config,
};

fn test_config(base: u16) -> Udp6Config {
    // Spread ports per process so parallel test runs do not collide.
    let offset = (std::process::id() % 500) as u16 * 4;
    Udp6Config {
        unicast_port: base + offset,
        multicast_port: base + offset + 1,
        ..Udp6Config::default()
    }
}

fn open_or_skip(config: &Udp6Config) -> Option<Network> {
    match Network::open(config) {
        Ok(net) => Some(net.with_timeout(Some(Duration::from_secs(2)))),
        Err(e) => {
            eprintln!("skipping: cannot open UDP6 gateway port: {e}");
            None
        }
    }
}

fn device_socket() -> Option<UdpSocket> {
    match UdpSocket::bind("[::1]:0") {
        Ok(s) => {
            s.set_read_timeout(Some(Duration::from_secs(2))).ok()?;
            Some(s)
        }
        Err(e) => {
            eprintln!("skipping: no IPv6 loopback: {e}");
            None
        }
    }
}

#[test]
fn max_size_frame_uses_extended_header() {
    let body = vec![0xA5u8; MAX_FRAME_SIZE - frame::EXTENDED_HEADER_SIZE];
    let bytes = encode(frame::PUBLISH, &body).unwrap();
    assert_eq!(bytes.len(), MAX_FRAME_SIZE);
    assert_eq!(&bytes[..4], &[0x01, 0x04, 0x00, frame::PUBLISH]);

    let (header, decoded) = decode_frame(&bytes).unwrap();
    assert!(header.is_extended());
    assert_eq!(header.body_length, MAX_FRAME_SIZE - 4);
    assert_eq!(decoded, &body[..]);

    assert!(encode(frame::PUBLISH, &[0u8; MAX_FRAME_SIZE]).is_err());
}

#[test]
fn loopback_request_and_reply() {
    let config = test_config(41000);
    let Some(net) = open_or_skip(&config) else { return };
    let Some(dev) = device_socket() else { return };

    let gw: SocketAddrV6 = format!("[::1]:{}", config.unicast_port).parse().unwrap();
    let connect = SnMessage::connect(0, 30, "loop").encode().unwrap();
    dev.send_to(&connect, gw).unwrap();

    let mut resp = NwResponse::new();
    let mut got = false;
    for _ in 0..5 {
        if net.get_response(&mut resp).unwrap() {
            got = true;
            break;
        }
    }
    assert!(got, "gateway did not receive the CONNECT");
    assert_eq!(resp.msg_type(), Some(frame::CONNECT));
    assert_eq!(resp.frame_length(), connect.len());

    let from = resp.client_address();
    let dev_port = dev.local_addr().unwrap().port();
    assert_eq!(from.to_socket_addr().map(|sa| sa.port()), Some(dev_port));
    assert!(matches!(from, ClientAddress::Long { .. }));

    net.unicast(&SnMessage::connack(0), &from).unwrap();
    let mut buf = [0u8; MAX_FRAME_SIZE];
    let (n, _) = dev.recv_from(&mut buf).unwrap();
    assert_eq!(&buf[..n], &[0x03, frame::CONNACK, 0x00]);

    net.close();
}

#[test]
fn loopback_drops_bad_length() {
    let config = test_config(43000);
    let Some(net) = open_or_skip(&config) else { return };
    let Some(dev) = device_socket() else { return };

    let gw: SocketAddrV6 = format!("[::1]:{}", config.unicast_port).parse().unwrap();
    // Declares 9 bytes, carries 3.
    dev.send_to(&[0x09, frame::PINGREQ, 0x00], gw).unwrap();

    let mut resp = NwResponse::new();
    let mut accepted = false;
    for _ in 0..3 {
        if net.get_response(&mut resp).unwrap() {
            accepted = true;
        }
        if resp.error_code() == PACKET_EXCEEDS_LENGTH {
            break;
        }
    }
    assert!(!accepted);
    net.close();
}

#[test]
fn loopback_drops_oversized_datagram() {
    let config = test_config(44000);
    let Some(net) = open_or_skip(&config) else { return };
    let Some(dev) = device_socket() else { return };

    let gw: SocketAddrV6 = format!("[::1]:{}", config.unicast_port).parse().unwrap();
    // Header claims a full 1024-byte frame; the datagram carries 1100.
    let mut oversized = vec![0u8; 1100];
    oversized[..4].copy_from_slice(&[0x01, 0x04, 0x00, frame::PUBLISH]);
    dev.send_to(&oversized, gw).unwrap();

    let mut resp = NwResponse::new();
    let mut accepted = false;
    for _ in 0..3 {
        if net.get_response(&mut resp).unwrap() {
            accepted = true;
        }
        if resp.error_code() == PACKET_EXCEEDS_LENGTH {
            break;
        }
    }
    assert!(!accepted);
    assert_eq!(resp.error_code(), PACKET_EXCEEDS_LENGTH);
    net.close();
}

#[test]
fn client_accepts_only_the_gateway() {
    let config = test_config(45000);
    let mut client = ClientNetwork::new();
    if let Err(e) = client.open(&config) {
        eprintln!("skipping: cannot open UDP6 device port: {e}");
        return;
    }
    let Some(gateway) = device_socket() else { return };
    let Some(stranger) = device_socket() else { return };

    let gw_port = gateway.local_addr().unwrap().port();
    client.set_gw_address(&NwAddress128::from(Ipv6Addr::LOCALHOST), gw_port);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let record = Arc::clone(&seen);
    client.set_rx_handler(move |resp| {
        record.lock().push(resp.msg_type());
        42
    });

    let dest: SocketAddrV6 = format!("[::1]:{}", config.unicast_port).parse().unwrap();
    stranger
        .send_to(&SnMessage::pingresp().encode().unwrap(), dest)
        .unwrap();
    gateway
        .send_to(&SnMessage::connack(0).encode().unwrap(), dest)
        .unwrap();

    let mut code = None;
    for _ in 0..5 {
        code = client.poll().unwrap();
        if code.is_some() {
            break;
        }
    }
    assert_eq!(code, Some(42));
    assert_eq!(*seen.lock(), vec![Some(frame::CONNACK)]);
    assert_eq!(client.response().client_address16(), gw_port.to_be());

    // The stranger's frame was consumed, not left queued.
    assert_eq!(client.poll().unwrap(), None);
    assert_eq!(seen.lock().len(), 1);
    client.close();
}
