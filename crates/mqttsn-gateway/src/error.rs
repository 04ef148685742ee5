// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types for the gateway core.
//!
//! Each layer owns a small error enum; [`GatewayError`] folds them together
//! for callers that drive the whole stack (the binary, the worker runtime).

use std::io;

use thiserror::Error;

/// Frame header parse/build failures. A frame that fails to parse is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("frame too short: {0} bytes")]
    TooShort(usize),

    #[error("frame length mismatch: declared {declared}, received {received}")]
    LengthMismatch { declared: usize, received: usize },

    #[error("frame too large: {0} bytes (max 1024)")]
    TooLarge(usize),
}

/// UDP transport failures.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid transport configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("transport is not open")]
    NotOpen,

    #[error("cannot frame message: {0}")]
    Frame(#[from] FrameError),
}

/// Session-level protocol violations surfaced by [`crate::node::ClientNode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("a PUBACK is already outstanding for this client")]
    PubAckOutstanding,

    #[error("a SUBACK is already outstanding for this client")]
    SubAckOutstanding,

    #[error("a CONNECT is already pending for this client")]
    ConnectPending,
}

/// Registry failures from [`crate::list::ClientList`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientListError {
    #[error("client list full ({0} clients)")]
    Full(usize),

    #[error("node id not authorized: {0}")]
    Unauthorized(String),

    #[error("address does not match the configured addressing mode")]
    AddressMode,
}

/// Failure reported by a [`crate::bridge::BrokerBridge`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("broker bridge: {0}")]
pub struct BridgeError(pub String);

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Umbrella error for the gateway runtime.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Client list error: {0}")]
    ClientList(#[from] ClientListError),

    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Gateway already running")]
    AlreadyRunning,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
