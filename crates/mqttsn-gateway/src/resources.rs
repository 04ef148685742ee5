// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

// Shared resources handed to every gateway worker.

use std::sync::Arc;

use crate::collab::{AllowList, NodeAuthorizer, NullIndicator, StatusIndicator};
use crate::config::GatewaySettings;
use crate::event::EventQueue;
use crate::list::ClientList;
use crate::network::Network;

/// One client list, one network and the three event queues.
pub struct GatewayResources {
    client_list: ClientList,
    network: Network,
    gateway_events: EventQueue,
    client_send_events: EventQueue,
    broker_send_events: EventQueue,
    indicator: Arc<dyn StatusIndicator>,
}

impl GatewayResources {
    pub fn new(settings: &GatewaySettings, network: Network) -> Self {
        let mut list = ClientList::new(settings.max_clients)
            .with_mode(settings.address_mode)
            .with_keep_alive_grace(settings.keep_alive_grace);
        if !settings.authorize.is_empty() {
            let allow: Arc<dyn NodeAuthorizer> =
                Arc::new(AllowList::new(settings.authorize.iter().cloned()));
            list = list.with_authorizer(allow);
        }

        Self {
            client_list: list,
            network: network.with_timeout(settings.receive_timeout()),
            gateway_events: EventQueue::new(),
            client_send_events: EventQueue::new(),
            broker_send_events: EventQueue::new(),
            indicator: Arc::new(NullIndicator),
        }
    }

    pub fn with_indicator(mut self, indicator: Arc<dyn StatusIndicator>) -> Self {
        self.indicator = indicator;
        self
    }

    pub fn client_list(&self) -> &ClientList {
        &self.client_list
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    /// Inbound events for the session worker.
    pub fn gateway_events(&self) -> &EventQueue {
        &self.gateway_events
    }

    /// Outbound events for the client sender.
    pub fn client_send_events(&self) -> &EventQueue {
        &self.client_send_events
    }

    /// Outbound events towards the broker bridge.
    pub fn broker_send_events(&self) -> &EventQueue {
        &self.broker_send_events
    }

    pub fn indicator(&self) -> &dyn StatusIndicator {
        self.indicator.as_ref()
    }

    /// Release every thread blocked on one of the event queues.
    pub fn wake_all(&self) {
        self.gateway_events.wake_all();
        self.client_send_events.wake_all();
        self.broker_send_events.wake_all();
        self.network.wakeup();
    }
}
