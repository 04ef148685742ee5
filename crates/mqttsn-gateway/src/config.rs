// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Gateway configuration.
//!
//! Loaded from TOML; every field has a default so a partial file is fine:
//!
//! ```toml
//! log_level = "info"
//!
//! [udp6]
//! unicast_port = 2000
//! multicast_port = 1883
//! multicast_group = "ff02::1:fe"
//!
//! [gateway]
//! gateway_id = 1
//! max_clients = 100
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::address::AddressMode;
use crate::error::ConfigError;
use crate::list::DEFAULT_MAX_CLIENTS;
use crate::node::{DEFAULT_KEEP_ALIVE_GRACE, MAX_KEEP_ALIVE_GRACE};
use crate::transport::Udp6Config;

/// Top-level configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub udp6: Udp6Config,

    #[serde(default)]
    pub gateway: GatewaySettings,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            udp6: Udp6Config::default(),
            gateway: GatewaySettings::default(),
        }
    }
}

/// `[gateway]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySettings {
    /// Id announced in ADVERTISE and GWINFO.
    pub gateway_id: u8,
    pub max_clients: usize,
    /// Multiplier on the negotiated keep-alive before a client is lost.
    pub keep_alive_grace: f64,
    /// Keep-alive sweep period.
    pub sweep_interval_ms: u64,
    /// Receive wait; 0 blocks until data or shutdown.
    pub receive_timeout_ms: u64,
    pub address_mode: AddressMode,
    /// Node ids accepted in short-address mode. Empty disables the check.
    pub authorize: Vec<String>,
    /// ADVERTISE period; 0 disables it.
    pub advertise_interval_secs: u16,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            gateway_id: 1,
            max_clients: DEFAULT_MAX_CLIENTS,
            keep_alive_grace: DEFAULT_KEEP_ALIVE_GRACE,
            sweep_interval_ms: 1000,
            receive_timeout_ms: 0,
            address_mode: AddressMode::Long,
            authorize: Vec::new(),
            advertise_interval_secs: 900,
        }
    }
}

impl GatewaySettings {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn receive_timeout(&self) -> Option<Duration> {
        match self.receive_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    pub fn advertise_interval(&self) -> Option<Duration> {
        match self.advertise_interval_secs {
            0 => None,
            s => Some(Duration::from_secs(u64::from(s))),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Pretty TOML rendering, used by `gen-config`.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.udp6
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        let gw = &self.gateway;
        if gw.max_clients == 0 {
            return Err(ConfigError::Invalid("max_clients must be > 0".into()));
        }
        if !(1.0..=MAX_KEEP_ALIVE_GRACE).contains(&gw.keep_alive_grace) {
            return Err(ConfigError::Invalid(format!(
                "keep_alive_grace must be within 1.0..={} (got {})",
                MAX_KEEP_ALIVE_GRACE, gw.keep_alive_grace
            )));
        }
        if gw.sweep_interval_ms == 0 {
            return Err(ConfigError::Invalid("sweep_interval_ms must be > 0".into()));
        }
        if !gw.authorize.is_empty() && gw.address_mode != AddressMode::Short {
            return Err(ConfigError::Invalid(
                "authorize is only supported with address_mode = \"short\"".into(),
            ));
        }
        if gw.authorize.iter().any(|id| id.is_empty()) {
            return Err(ConfigError::Invalid("authorize contains an empty node id".into()));
        }
        Ok(())
    }
}
