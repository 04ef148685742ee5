// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

// Reusable receive buffer plus the metadata parsed out of one frame.

use std::net::SocketAddrV6;

use crate::address::{ClientAddress, NwAddress128};
use crate::error::FrameError;
use crate::frame::{self, FrameHeader, MAX_FRAME_SIZE};
use crate::message::SnMessage;

pub const NO_ERROR: u8 = 0;
pub const PACKET_EXCEEDS_LENGTH: u8 = 1;

/// One received frame. Allocated once per transport and overwritten in
/// place on every receive.
#[derive(Debug)]
pub struct NwResponse {
    frame: Box<[u8; MAX_FRAME_SIZE]>,
    header: Option<FrameHeader>,
    addr128: NwAddress128,
    /// Sender UDP port, network byte order.
    addr16: u16,
    available: bool,
    error_code: u8,
}

impl Default for NwResponse {
    fn default() -> Self {
        Self::new()
    }
}

impl NwResponse {
    pub fn new() -> Self {
        Self {
            frame: Box::new([0u8; MAX_FRAME_SIZE]),
            header: None,
            addr128: NwAddress128::UNSPECIFIED,
            addr16: 0,
            available: false,
            error_code: NO_ERROR,
        }
    }

    /// Raw buffer the transport receives into.
    pub fn buffer_mut(&mut self) -> &mut [u8] {
        &mut self.frame[..]
    }

    /// Parse the `received` bytes sitting in the buffer and record the sender.
    ///
    /// On a length mismatch the error code is set and the response stays
    /// unavailable.
    pub fn load(&mut self, received: usize, source: &SocketAddrV6) -> Result<(), FrameError> {
        self.available = false;
        self.header = None;
        match frame::decode(&self.frame[..], received) {
            Ok(header) => {
                self.header = Some(header);
                self.addr128 = NwAddress128::from(source);
                self.addr16 = source.port().to_be();
                self.error_code = NO_ERROR;
                self.available = true;
                Ok(())
            }
            Err(e) => {
                self.error_code = PACKET_EXCEEDS_LENGTH;
                Err(e)
            }
        }
    }

    /// Clear the sender, length and status flags between polls.
    pub fn reset_response(&mut self) {
        self.addr128.reset();
        self.addr16 = 0;
        self.header = None;
        self.error_code = NO_ERROR;
        self.available = false;
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    pub fn set_available(&mut self, available: bool) {
        self.available = available;
    }

    pub fn error_code(&self) -> u8 {
        self.error_code
    }

    pub fn set_error_code(&mut self, code: u8) {
        self.error_code = code;
    }

    pub fn header(&self) -> Option<&FrameHeader> {
        self.header.as_ref()
    }

    pub fn msg_type(&self) -> Option<u8> {
        self.header.map(|h| h.msg_type)
    }

    pub fn frame_length(&self) -> usize {
        self.header.map_or(0, |h| h.total_length)
    }

    /// The whole frame, header included.
    pub fn payload(&self) -> &[u8] {
        &self.frame[..self.frame_length()]
    }

    pub fn body(&self) -> &[u8] {
        match self.header {
            Some(h) => &self.frame[h.body_offset..h.total_length],
            None => &[],
        }
    }

    pub fn body_length(&self) -> usize {
        self.header.map_or(0, |h| h.body_length)
    }

    pub fn client_address128(&self) -> &NwAddress128 {
        &self.addr128
    }

    pub fn client_scope_id(&self) -> u32 {
        self.addr128.scope_id()
    }

    /// Sender port in network byte order.
    pub fn client_address16(&self) -> u16 {
        self.addr16
    }

    pub fn set_client_address128(&mut self, address: [u8; 16]) {
        self.addr128.set_address(address);
    }

    pub fn set_client_scope_id(&mut self, scope_id: u32) {
        self.addr128.set_scope_id(scope_id);
    }

    pub fn set_client_address16(&mut self, port: u16) {
        self.addr16 = port;
    }

    pub fn client_address(&self) -> ClientAddress {
        ClientAddress::Long {
            addr: self.addr128,
            port: self.addr16,
        }
    }

    /// Copy the current frame out as an owned message.
    pub fn to_message(&self) -> Option<SnMessage> {
        let h = self.header?;
        Some(SnMessage::new(h.msg_type, self.body().to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{encode, PUBLISH};

    fn source() -> SocketAddrV6 {
        SocketAddrV6::new("2001:db8::1".parse().unwrap(), 47000, 0, 5)
    }

    fn fill(resp: &mut NwResponse, bytes: &[u8]) {
        resp.buffer_mut()[..bytes.len()].copy_from_slice(bytes);
    }

    #[test]
    fn test_load_short_frame() {
        let mut resp = NwResponse::new();
        let frame = encode(PUBLISH, &[9, 8, 7]).unwrap();
        fill(&mut resp, &frame);
        resp.load(frame.len(), &source()).unwrap();

        assert!(resp.is_available());
        assert_eq!(resp.msg_type(), Some(PUBLISH));
        assert_eq!(resp.body(), &[9, 8, 7]);
        assert_eq!(resp.body_length(), 3);
        assert_eq!(resp.client_address16(), 47000u16.to_be());
        assert_eq!(resp.client_scope_id(), 5);
    }

    #[test]
    fn test_load_extended_frame_body_offset() {
        let mut resp = NwResponse::new();
        let body = vec![0x5A; 400];
        let frame = encode(PUBLISH, &body).unwrap();
        fill(&mut resp, &frame);
        resp.load(frame.len(), &source()).unwrap();
        assert_eq!(resp.body_length(), 400);
        assert_eq!(resp.body(), &body[..]);
        assert_eq!(resp.frame_length(), 404);
    }

    #[test]
    fn test_length_mismatch_not_available() {
        let mut resp = NwResponse::new();
        let frame = encode(PUBLISH, &[1, 2, 3]).unwrap();
        fill(&mut resp, &frame);
        assert!(resp.load(frame.len() + 1, &source()).is_err());
        assert!(!resp.is_available());
        assert_eq!(resp.error_code(), PACKET_EXCEEDS_LENGTH);
        assert!(resp.to_message().is_none());
    }

    #[test]
    fn test_reset_response() {
        let mut resp = NwResponse::new();
        let frame = encode(PUBLISH, &[1]).unwrap();
        fill(&mut resp, &frame);
        resp.load(frame.len(), &source()).unwrap();
        resp.reset_response();
        assert!(!resp.is_available());
        assert_eq!(resp.error_code(), NO_ERROR);
        assert!(resp.client_address128().is_unspecified());
        assert_eq!(resp.body_length(), 0);
    }
}
