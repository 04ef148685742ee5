// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! MQTT-SN frame header codec.
//!
//! Every UDP datagram carries exactly one frame:
//!
//! ```text
//! len <= 255:  [ length:u8 ][ msgType:u8 ][ body... ]
//! len >  255:  [ 0x01 ][ length:u16 BE ][ msgType:u8 ][ body... ]
//! ```
//!
//! `length` counts the whole frame, header included. Parsing is safe:
//! malformed input returns `Err`, never panics.

use crate::error::FrameError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Largest frame the gateway accepts or produces.
pub const MAX_FRAME_SIZE: usize = 1024;

/// First byte of an extended (3-byte length) header.
pub const EXTENDED_LENGTH_MARKER: u8 = 0x01;

/// Header size of the short form (length + msgType).
pub const SHORT_HEADER_SIZE: usize = 2;

/// Header size of the extended form (marker + u16 length + msgType).
pub const EXTENDED_HEADER_SIZE: usize = 4;

/// Largest total length that still fits the 1-byte form.
pub const SHORT_FORM_MAX: usize = 255;

// MQTT-SN message types
pub const ADVERTISE: u8 = 0x00;
pub const SEARCHGW: u8 = 0x01;
pub const GWINFO: u8 = 0x02;
pub const CONNECT: u8 = 0x04;
pub const CONNACK: u8 = 0x05;
pub const WILLTOPICREQ: u8 = 0x06;
pub const WILLTOPIC: u8 = 0x07;
pub const WILLMSGREQ: u8 = 0x08;
pub const WILLMSG: u8 = 0x09;
pub const REGISTER: u8 = 0x0A;
pub const REGACK: u8 = 0x0B;
pub const PUBLISH: u8 = 0x0C;
pub const PUBACK: u8 = 0x0D;
pub const PUBCOMP: u8 = 0x0E;
pub const PUBREC: u8 = 0x0F;
pub const PUBREL: u8 = 0x10;
pub const SUBSCRIBE: u8 = 0x12;
pub const SUBACK: u8 = 0x13;
pub const UNSUBSCRIBE: u8 = 0x14;
pub const UNSUBACK: u8 = 0x15;
pub const PINGREQ: u8 = 0x16;
pub const PINGRESP: u8 = 0x17;
pub const DISCONNECT: u8 = 0x18;
pub const WILLTOPICUPD: u8 = 0x1A;
pub const WILLTOPICRESP: u8 = 0x1B;
pub const WILLMSGUPD: u8 = 0x1C;
pub const WILLMSGRESP: u8 = 0x1D;

/// Human-readable message type name for logs.
pub fn msg_type_name(msg_type: u8) -> &'static str {
    match msg_type {
        ADVERTISE => "ADVERTISE",
        SEARCHGW => "SEARCHGW",
        GWINFO => "GWINFO",
        CONNECT => "CONNECT",
        CONNACK => "CONNACK",
        WILLTOPICREQ => "WILLTOPICREQ",
        WILLTOPIC => "WILLTOPIC",
        WILLMSGREQ => "WILLMSGREQ",
        WILLMSG => "WILLMSG",
        REGISTER => "REGISTER",
        REGACK => "REGACK",
        PUBLISH => "PUBLISH",
        PUBACK => "PUBACK",
        PUBCOMP => "PUBCOMP",
        PUBREC => "PUBREC",
        PUBREL => "PUBREL",
        SUBSCRIBE => "SUBSCRIBE",
        SUBACK => "SUBACK",
        UNSUBSCRIBE => "UNSUBSCRIBE",
        UNSUBACK => "UNSUBACK",
        PINGREQ => "PINGREQ",
        PINGRESP => "PINGRESP",
        DISCONNECT => "DISCONNECT",
        WILLTOPICUPD => "WILLTOPICUPD",
        WILLTOPICRESP => "WILLTOPICRESP",
        WILLMSGUPD => "WILLMSGUPD",
        WILLMSGRESP => "WILLMSGRESP",
        _ => "UNKNOWN",
    }
}

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

/// Parsed frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub msg_type: u8,
    /// Offset of the first body byte (2 or 4).
    pub body_offset: usize,
    pub body_length: usize,
    /// Declared total frame length, header included.
    pub total_length: usize,
}

impl FrameHeader {
    pub fn is_extended(&self) -> bool {
        self.body_offset == EXTENDED_HEADER_SIZE
    }
}

/// Header size required for a body of `body_len` bytes.
pub fn header_size_for(body_len: usize) -> usize {
    if body_len + SHORT_HEADER_SIZE <= SHORT_FORM_MAX {
        SHORT_HEADER_SIZE
    } else {
        EXTENDED_HEADER_SIZE
    }
}

/// Parse the header of `buf`, where `received` is the number of bytes the
/// transport actually read into it.
pub fn decode(buf: &[u8], received: usize) -> Result<FrameHeader, FrameError> {
    if received > buf.len() {
        return Err(FrameError::TooShort(buf.len()));
    }
    if received > MAX_FRAME_SIZE {
        return Err(FrameError::TooLarge(received));
    }
    if received < SHORT_HEADER_SIZE {
        return Err(FrameError::TooShort(received));
    }

    let (declared, msg_type, body_offset) = if buf[0] == EXTENDED_LENGTH_MARKER {
        if received < EXTENDED_HEADER_SIZE {
            return Err(FrameError::TooShort(received));
        }
        let len = u16::from_be_bytes([buf[1], buf[2]]) as usize;
        (len, buf[3], EXTENDED_HEADER_SIZE)
    } else {
        (buf[0] as usize, buf[1], SHORT_HEADER_SIZE)
    };

    if declared != received {
        return Err(FrameError::LengthMismatch { declared, received });
    }

    Ok(FrameHeader {
        msg_type,
        body_offset,
        body_length: declared - body_offset,
        total_length: declared,
    })
}

/// Parse a complete datagram and borrow its body.
pub fn decode_frame(datagram: &[u8]) -> Result<(FrameHeader, &[u8]), FrameError> {
    let header = decode(datagram, datagram.len())?;
    let body = &datagram[header.body_offset..header.total_length];
    Ok((header, body))
}

/// Write the header for `body_len` bytes of body into `out`.
pub fn write_header(out: &mut Vec<u8>, msg_type: u8, body_len: usize) -> Result<(), FrameError> {
    let header = header_size_for(body_len);
    let total = header + body_len;
    if total > MAX_FRAME_SIZE {
        return Err(FrameError::TooLarge(total));
    }
    if header == SHORT_HEADER_SIZE {
        out.push(total as u8);
    } else {
        out.push(EXTENDED_LENGTH_MARKER);
        out.extend_from_slice(&(total as u16).to_be_bytes());
    }
    out.push(msg_type);
    Ok(())
}

/// Build a full frame from a message type and body.
pub fn encode(msg_type: u8, body: &[u8]) -> Result<Vec<u8>, FrameError> {
    let mut out = Vec::with_capacity(header_size_for(body.len()) + body.len());
    write_header(&mut out, msg_type, body.len())?;
    out.extend_from_slice(body);
    Ok(out)
}
