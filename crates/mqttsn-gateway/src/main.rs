// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! MQTT-SN UDP6 gateway CLI
//!
//! # Usage
//!
//! ```bash
//! # Defaults: unicast 2000, multicast [ff02::1:fe]:1883
//! mqttsn-gateway
//!
//! # Using configuration file
//! mqttsn-gateway --config gateway.toml
//!
//! # Override ports
//! mqttsn-gateway --unicast-port 10000 --multicast-port 10001
//!
//! # Write a default configuration
//! mqttsn-gateway gen-config -o gateway.toml
//! ```

use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use mqttsn_gateway::{Gateway, GatewayConfig, NullBroker};
use tracing_subscriber::EnvFilter;

/// MQTT-SN gateway over UDP/IPv6
#[derive(Parser, Debug)]
#[command(name = "mqttsn-gateway")]
#[command(about = "MQTT-SN gateway over UDP/IPv6")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Unicast UDP port
    #[arg(long)]
    unicast_port: Option<u16>,

    /// Multicast UDP port
    #[arg(long)]
    multicast_port: Option<u16>,

    /// IPv6 multicast group
    #[arg(long)]
    group: Option<String>,

    /// Outgoing multicast interface index (0 = system default)
    #[arg(long)]
    interface: Option<u32>,

    /// Gateway id announced in ADVERTISE/GWINFO
    #[arg(long)]
    gateway_id: Option<u8>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a default configuration file
    GenConfig {
        /// Output file path
        #[arg(short, long, default_value = "gateway.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file
    Validate {
        /// Configuration file path
        #[arg(short, long)]
        config: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if let Some(cmd) = &args.command {
        init_logging(args.log_level.as_deref().unwrap_or("info"));
        return match cmd {
            Commands::GenConfig { output } => cmd_gen_config(output),
            Commands::Validate { config } => cmd_validate(config),
        };
    }

    let config = build_config(&args)?;
    init_logging(&config.log_level);

    let broker = Arc::new(NullBroker::new());
    let gateway = Gateway::open(&config, broker).context("Failed to open gateway")?;
    gateway.start().context("Failed to start gateway workers")?;

    tracing::info!(
        unicast_port = config.udp6.unicast_port,
        multicast_port = config.udp6.multicast_port,
        group = %config.udp6.multicast_group,
        gateway_id = config.gateway.gateway_id,
        "MQTT-SN gateway running, press Ctrl+C to stop"
    );

    let (tx, rx) = mpsc::channel::<()>();
    ctrlc::set_handler(move || {
        tracing::info!("Received Ctrl+C, shutting down...");
        let _ = tx.send(());
    })
    .context("Failed to install Ctrl+C handler")?;

    let _ = rx.recv();
    gateway.stop();
    tracing::info!(
        clients = gateway.resources().client_list().client_count(),
        "Gateway shutdown complete"
    );
    Ok(())
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn build_config(args: &Args) -> anyhow::Result<GatewayConfig> {
    let mut config = match &args.config {
        Some(path) => GatewayConfig::from_file(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => GatewayConfig::default(),
    };

    if let Some(port) = args.unicast_port {
        config.udp6.unicast_port = port;
    }
    if let Some(port) = args.multicast_port {
        config.udp6.multicast_port = port;
    }
    if let Some(group) = &args.group {
        config.udp6.multicast_group = group.clone();
    }
    if let Some(index) = args.interface {
        config.udp6.interface_index = index;
    }
    if let Some(id) = args.gateway_id {
        config.gateway.gateway_id = id;
    }
    if let Some(level) = &args.log_level {
        config.log_level = level.clone();
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn cmd_gen_config(output: &Path) -> anyhow::Result<()> {
    let text = GatewayConfig::default().to_toml()?;
    std::fs::write(output, text)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!("Configuration written to {}", output.display());
    Ok(())
}

fn cmd_validate(path: &Path) -> anyhow::Result<()> {
    let config = GatewayConfig::from_file(path)
        .with_context(|| format!("Failed to load {}", path.display()))?;
    println!("Configuration is valid:");
    println!(
        "  udp6: unicast {}, multicast [{}]:{}",
        config.udp6.unicast_port, config.udp6.multicast_group, config.udp6.multicast_port
    );
    println!(
        "  gateway: id {}, max_clients {}, address_mode {:?}",
        config.gateway.gateway_id, config.gateway.max_clients, config.gateway.address_mode
    );
    Ok(())
}
