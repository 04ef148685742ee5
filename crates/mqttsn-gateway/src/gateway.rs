// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Gateway worker runtime.
//!
//! Five named threads share one [`GatewayResources`] bundle:
//!
//! | thread             | waits on                       | does                                   |
//! |--------------------|--------------------------------|----------------------------------------|
//! | `mqttsn-recv`      | transport                      | frame -> node -> `ClientRecv`          |
//! | `mqttsn-session`   | gateway event queue            | state machine, local replies           |
//! | `mqttsn-send`      | client-send event queue        | node send queue -> transport           |
//! | `mqttsn-broker`    | broker-send event queue        | node broker queue -> bridge, replies   |
//! | `mqttsn-keepalive` | stop channel (sweep interval)  | keep-alive sweep, ADVERTISE            |
//!
//! The per-step logic lives on [`Dispatcher`] so it can be driven
//! synchronously in tests; [`Gateway`] only owns the threads.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::address::ClientAddress;
use crate::bridge::BrokerBridge;
use crate::config::{GatewayConfig, GatewaySettings};
use crate::error::{GatewayError, TransportError};
use crate::event::Event;
use crate::frame;
use crate::message::{
    MqttMessage, SnMessage, MQTT_CONNACK, MQTT_CONNECT, MQTT_PINGRESP, MQTT_PUBACK, MQTT_PUBLISH,
    MQTT_SUBACK, RC_ACCEPTED, RC_REJECTED_CONGESTION, RC_REJECTED_NOT_SUPPORTED,
};
use crate::network::Network;
use crate::node::{ClientNode, ClientStatus, NodeId};
use crate::resources::GatewayResources;
use crate::response::NwResponse;

/// How long idle workers sleep before re-checking the stop flag.
const WORKER_POLL: Duration = Duration::from_millis(100);

/// Broker replies are polled at least this often.
const BROKER_POLL: Duration = Duration::from_millis(20);

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Event handlers shared by the worker threads.
pub struct Dispatcher {
    resources: Arc<GatewayResources>,
    bridge: Arc<dyn BrokerBridge>,
    gateway_id: u8,
}

impl Dispatcher {
    pub fn new(
        resources: Arc<GatewayResources>,
        bridge: Arc<dyn BrokerBridge>,
        gateway_id: u8,
    ) -> Self {
        Self {
            resources,
            bridge,
            gateway_id,
        }
    }

    pub fn resources(&self) -> &Arc<GatewayResources> {
        &self.resources
    }

    fn node(&self, id: NodeId) -> Option<Arc<ClientNode>> {
        let node = self.resources.client_list().get(id);
        if node.is_none() {
            log::debug!("[GATEWAY] {} no longer registered, event dropped", id);
        }
        node
    }

    // -- receive ----------------------------------------------------------

    /// Read one frame and route it. Returns `Ok(true)` when a frame was
    /// accepted.
    pub fn receive_once(&self, resp: &mut NwResponse) -> Result<bool, TransportError> {
        let res = &self.resources;
        if !res.network().get_response(resp)? {
            return Ok(false);
        }
        let Some(msg) = resp.to_message() else {
            return Ok(false);
        };
        res.indicator().blue(true);

        let address = resp.client_address();
        let list = res.client_list();
        let node = match list.get_client(&address) {
            Some(node) => node,
            None if msg.msg_type() == frame::CONNECT => match list.find_or_create(address) {
                Ok(node) => node,
                Err(e) => {
                    log::warn!("[GATEWAY] CONNECT from {} refused: {}", address, e);
                    return Ok(false);
                }
            },
            None => {
                res.gateway_events().post(Event::broadcast_from(msg, address));
                return Ok(true);
            }
        };

        node.client_recv_que().push(msg);
        res.gateway_events().post(Event::ClientRecv(node.id()));
        Ok(true)
    }

    // -- session ----------------------------------------------------------

    pub fn handle_gateway_event(&self, ev: Event) {
        match ev {
            Event::ClientRecv(id) => {
                let Some(node) = self.node(id) else { return };
                while let Some(msg) = node.client_recv_que().pop() {
                    self.on_client_message(&node, msg);
                }
            }
            Event::BrokerRecv(id) => {
                let Some(node) = self.node(id) else { return };
                while let Some(msg) = node.broker_recv_que().pop() {
                    self.on_broker_message(&node, msg);
                }
            }
            Event::Broadcast { msg, reply_to } => self.on_broadcast(msg, reply_to),
            Event::Na | Event::Timeout | Event::SocketAlive => {}
            other => log::debug!("[GATEWAY] {} ignored on gateway queue", other.kind()),
        }
    }

    fn on_client_message(&self, node: &Arc<ClientNode>, msg: SnMessage) {
        let status = match node.update_status(&msg) {
            Ok(status) => status,
            Err(e) => {
                log::debug!("[GATEWAY] {} {} rejected: {}", node.id(), msg.type_name(), e);
                return;
            }
        };

        match msg.msg_type() {
            frame::CONNECT => self.on_connect(node, &msg, status),
            frame::WILLTOPIC => self.to_client(node, SnMessage::willmsgreq()),
            frame::WILLMSG => {
                node.set_wait_will_msg_flag(false);
                self.to_broker(node, &msg);
                if let Some(connack) = node.take_saved_connack() {
                    self.to_client(node, connack);
                }
            }
            frame::PINGREQ => {
                if status == ClientStatus::Awake {
                    let n = node.flush_sleep_que();
                    log::debug!("[GATEWAY] {} awake, {} buffered messages released", node.id(), n);
                }
                self.to_client(node, SnMessage::pingresp());
            }
            frame::DISCONNECT => {
                self.to_client(node, SnMessage::disconnect(None));
                if status == ClientStatus::Disconnected {
                    self.to_broker(node, &msg);
                    self.bridge.disconnect(node.id());
                }
            }
            frame::PUBLISH if status == ClientStatus::Active && msg.qos().unwrap_or(0) > 0 => {
                if let Err(e) = node.set_waited_puback(msg.clone()) {
                    log::warn!("[GATEWAY] {} PUBLISH refused: {}", node.id(), e);
                    let topic = msg.topic_id().unwrap_or(0);
                    let id = msg.msg_id().unwrap_or(0);
                    self.to_client(node, SnMessage::puback(topic, id, RC_REJECTED_CONGESTION));
                    return;
                }
                self.to_broker(node, &msg);
            }
            frame::SUBSCRIBE if status == ClientStatus::Active => {
                if let Err(e) = node.set_waited_suback(msg.clone()) {
                    log::warn!("[GATEWAY] {} SUBSCRIBE refused: {}", node.id(), e);
                    let id = msg.msg_id().unwrap_or(0);
                    self.to_client(node, SnMessage::suback(0, 0, id, RC_REJECTED_CONGESTION));
                    return;
                }
                self.to_broker(node, &msg);
            }
            _ if status == ClientStatus::Active => self.to_broker(node, &msg),
            _ => log::debug!(
                "[GATEWAY] {} {} dropped in {:?}",
                node.id(),
                msg.type_name(),
                status
            ),
        }
    }

    fn on_connect(&self, node: &Arc<ClientNode>, msg: &SnMessage, status: ClientStatus) {
        match status {
            ClientStatus::TryConnecting => {
                if msg.has_will() {
                    node.set_connack_save_flag();
                    self.to_client(node, SnMessage::willtopicreq());
                }
                if !node.is_connect_sendable() {
                    return;
                }
                match self.bridge.translate(node.id(), msg) {
                    Some(mqtt) => {
                        // A retried CONNECT supersedes one the broker never took.
                        let que = node.broker_send_que();
                        if que.pop_if(|m| m.packet_type() == MQTT_CONNECT).is_some() {
                            log::debug!("[GATEWAY] {} stale CONNECT replaced", node.id());
                        }
                        que.push(mqtt);
                        node.connect_queued();
                        self.resources
                            .broker_send_events()
                            .post(Event::BrokerSend(node.id()));
                    }
                    None => {
                        node.reset_connect_wait();
                        self.to_client(node, SnMessage::connack(RC_REJECTED_NOT_SUPPORTED));
                    }
                }
            }
            // Woken sleeper or reconnect on a live session.
            ClientStatus::Active => self.to_client(node, SnMessage::connack(RC_ACCEPTED)),
            _ => {}
        }
    }

    fn on_broker_message(&self, node: &Arc<ClientNode>, msg: MqttMessage) {
        match msg.packet_type() {
            MQTT_CONNACK => {
                let rc = msg.connack_return_code().unwrap_or(RC_REJECTED_CONGESTION);
                node.connack_received(rc);
                if let Some(connack) = node.check_connack(SnMessage::connack(rc)) {
                    self.to_client(node, connack);
                }
            }
            MQTT_PUBACK => {
                let Some(id) = msg.packet_id() else { return };
                match node.ack_puback(id) {
                    Some(publish) => {
                        let topic = publish.topic_id().unwrap_or(0);
                        self.to_client(node, SnMessage::puback(topic, id, RC_ACCEPTED));
                    }
                    None => log::debug!("[GATEWAY] {} stray PUBACK id={}", node.id(), id),
                }
            }
            MQTT_SUBACK => {
                let Some(id) = msg.packet_id() else { return };
                match node.ack_suback(id) {
                    Some(_) => {
                        let granted = msg.payload().get(2).copied().unwrap_or(0) & 0x03;
                        self.to_client(node, SnMessage::suback(granted << 5, 0, id, RC_ACCEPTED));
                    }
                    None => log::debug!("[GATEWAY] {} stray SUBACK id={}", node.id(), id),
                }
            }
            MQTT_PUBLISH => {
                self.to_client(node, SnMessage::new(frame::PUBLISH, msg.payload().to_vec()));
            }
            MQTT_PINGRESP => {}
            other => log::debug!("[GATEWAY] {} broker packet type {} ignored", node.id(), other),
        }
    }

    fn on_broadcast(&self, msg: SnMessage, reply_to: Option<ClientAddress>) {
        match msg.msg_type() {
            frame::SEARCHGW => {
                log::debug!(
                    "[GATEWAY] SEARCHGW from {}",
                    reply_to.map_or_else(|| "?".to_string(), |a| a.to_string())
                );
                self.resources
                    .client_send_events()
                    .post(Event::broadcast(SnMessage::gwinfo(self.gateway_id)));
            }
            _ => log::debug!(
                "[GATEWAY] {} from unknown client dropped",
                msg.type_name()
            ),
        }
    }

    fn to_client(&self, node: &ClientNode, msg: SnMessage) {
        node.client_send_que().push(msg);
        self.resources
            .client_send_events()
            .post(Event::ClientSend(node.id()));
    }

    fn to_broker(&self, node: &ClientNode, msg: &SnMessage) {
        if let Some(mqtt) = self.bridge.translate(node.id(), msg) {
            node.broker_send_que().push(mqtt);
            self.resources
                .broker_send_events()
                .post(Event::BrokerSend(node.id()));
        }
    }

    // -- client sender ----------------------------------------------------

    pub fn handle_client_send_event(&self, ev: Event) {
        let network = self.resources.network();
        match ev {
            Event::ClientSend(id) => {
                let Some(node) = self.node(id) else { return };
                let que = node.client_send_que();
                while let Some(msg) = que.front_cloned() {
                    if node.is_sleep() && msg.msg_type() == frame::PUBLISH {
                        if let Some(parked) = que.pop() {
                            node.client_sleep_que().push(parked);
                        }
                        continue;
                    }
                    // Leave the message queued on failure; the next event retries.
                    if network.unicast(&msg, node.address()).is_err() {
                        break;
                    }
                    que.pop();
                    if msg.msg_type() == frame::PINGRESP {
                        node.awake_idle();
                    }
                }
                self.resources.indicator().blue(false);
            }
            Event::Broadcast { msg, reply_to } => {
                let sent = match reply_to {
                    Some(addr) => network.unicast(&msg, &addr),
                    None => network.broadcast(&msg),
                };
                if let Err(e) = sent {
                    log::warn!("[GATEWAY] {} not sent: {}", msg.type_name(), e);
                }
            }
            other => log::debug!("[GATEWAY] {} ignored on client-send queue", other.kind()),
        }
    }

    // -- broker side ------------------------------------------------------

    pub fn handle_broker_send_event(&self, ev: Event) {
        let id = match ev {
            Event::BrokerSend(id) => id,
            other => {
                log::debug!("[GATEWAY] {} ignored on broker-send queue", other.kind());
                return;
            }
        };
        let Some(node) = self.node(id) else { return };
        let que = node.broker_send_que();
        while let Some(msg) = que.front_cloned() {
            if let Err(e) = self.bridge.send(id, &msg) {
                log::warn!("[GATEWAY] {} broker send failed: {}", id, e);
                break;
            }
            que.pop();
            if msg.packet_type() == MQTT_CONNECT {
                node.connect_sent();
            }
        }
    }

    /// Move pending broker replies onto their nodes. Returns how many.
    pub fn pump_broker(&self) -> usize {
        let res = &self.resources;
        res.indicator().green(self.bridge.is_connected());
        let mut n = 0;
        while let Some((id, msg)) = self.bridge.poll() {
            let Some(node) = self.node(id) else { continue };
            node.broker_recv_que().push(msg);
            res.gateway_events().post(Event::BrokerRecv(id));
            n += 1;
        }
        n
    }

    // -- keep-alive -------------------------------------------------------

    /// Run the keep-alive check, erase lost and closed clients, and retry
    /// broker sends that failed earlier. Returns erased ids.
    pub fn sweep(&self) -> Vec<NodeId> {
        let list = self.resources.client_list();
        for id in list.check_timeovers() {
            self.bridge.disconnect(id);
        }
        let lost = list.erase_lost();
        let closed = list.erase_closed();
        if !lost.is_empty() || !closed.is_empty() {
            log::info!(
                "[GATEWAY] {} lost and {} closed client(s) erased, {} remaining",
                lost.len(),
                closed.len(),
                list.client_count()
            );
        }

        for node in list.snapshot() {
            if !node.broker_send_que().is_empty() {
                self.resources
                    .broker_send_events()
                    .post(Event::BrokerSend(node.id()));
            }
        }

        let mut erased = lost;
        erased.extend(closed);
        erased
    }

    pub fn advertise(&self, duration_secs: u16) {
        self.resources
            .client_send_events()
            .post(Event::broadcast(SnMessage::advertise(self.gateway_id, duration_secs)));
    }
}

// ---------------------------------------------------------------------------
// Gateway
// ---------------------------------------------------------------------------

struct Workers {
    stop_tx: Option<mpsc::Sender<()>>,
    threads: Vec<JoinHandle<()>>,
}

/// The running gateway: a dispatcher plus its worker threads.
pub struct Gateway {
    dispatcher: Arc<Dispatcher>,
    settings: GatewaySettings,
    running: Arc<AtomicBool>,
    workers: Mutex<Option<Workers>>,
}

impl Gateway {
    pub fn new(config: &GatewayConfig, network: Network, bridge: Arc<dyn BrokerBridge>) -> Self {
        let resources = Arc::new(GatewayResources::new(&config.gateway, network));
        Self::with_resources(resources, bridge, config.gateway.clone())
    }

    pub fn with_resources(
        resources: Arc<GatewayResources>,
        bridge: Arc<dyn BrokerBridge>,
        settings: GatewaySettings,
    ) -> Self {
        Self {
            dispatcher: Arc::new(Dispatcher::new(resources, bridge, settings.gateway_id)),
            settings,
            running: Arc::new(AtomicBool::new(false)),
            workers: Mutex::new(None),
        }
    }

    /// Validate `config`, open the UDP6 transport and build the gateway.
    pub fn open(
        config: &GatewayConfig,
        bridge: Arc<dyn BrokerBridge>,
    ) -> Result<Self, GatewayError> {
        config.validate()?;
        let network = Network::open(&config.udp6)?;
        Ok(Self::new(config, network, bridge))
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn resources(&self) -> &Arc<GatewayResources> {
        self.dispatcher.resources()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Spawn the worker threads.
    pub fn start(&self) -> Result<(), GatewayError> {
        let mut guard = self.workers.lock();
        if guard.is_some() {
            return Err(GatewayError::AlreadyRunning);
        }
        self.running.store(true, Ordering::Release);
        self.resources().indicator().red_off();

        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let mut threads = Vec::with_capacity(5);
        let spawned = self.spawn_all(stop_rx, &mut threads);

        *guard = Some(Workers {
            stop_tx: Some(stop_tx),
            threads,
        });
        drop(guard);

        if let Err(e) = spawned {
            self.stop();
            return Err(e.into());
        }
        log::info!(
            "[GATEWAY] started (id={}, max_clients={})",
            self.settings.gateway_id,
            self.settings.max_clients
        );
        Ok(())
    }

    fn spawn_all(
        &self,
        stop_rx: mpsc::Receiver<()>,
        threads: &mut Vec<JoinHandle<()>>,
    ) -> std::io::Result<()> {
        let d = Arc::clone(&self.dispatcher);
        let running = Arc::clone(&self.running);
        threads.push(spawn("mqttsn-recv", move || {
            let mut resp = NwResponse::new();
            while running.load(Ordering::Acquire) {
                match d.receive_once(&mut resp) {
                    Ok(_) => {}
                    Err(TransportError::NotOpen) => break,
                    Err(e) => {
                        log::warn!("[GATEWAY] receive failed: {}", e);
                        thread::sleep(WORKER_POLL);
                    }
                }
            }
        })?);

        let d = Arc::clone(&self.dispatcher);
        let running = Arc::clone(&self.running);
        threads.push(spawn("mqttsn-session", move || {
            while running.load(Ordering::Acquire) {
                if let Some(ev) = d.resources().gateway_events().timed_wait(WORKER_POLL) {
                    d.handle_gateway_event(ev);
                }
            }
        })?);

        let d = Arc::clone(&self.dispatcher);
        let running = Arc::clone(&self.running);
        threads.push(spawn("mqttsn-send", move || {
            while running.load(Ordering::Acquire) {
                if let Some(ev) = d.resources().client_send_events().timed_wait(WORKER_POLL) {
                    d.handle_client_send_event(ev);
                }
            }
        })?);

        let d = Arc::clone(&self.dispatcher);
        let running = Arc::clone(&self.running);
        threads.push(spawn("mqttsn-broker", move || {
            while running.load(Ordering::Acquire) {
                if let Some(ev) = d.resources().broker_send_events().timed_wait(BROKER_POLL) {
                    d.handle_broker_send_event(ev);
                }
                d.pump_broker();
            }
        })?);

        let d = Arc::clone(&self.dispatcher);
        let sweep_every = self.settings.sweep_interval();
        let advertise = self.settings.advertise_interval();
        let advertise_secs = self.settings.advertise_interval_secs;
        threads.push(spawn("mqttsn-keepalive", move || {
            if advertise.is_some() {
                d.advertise(advertise_secs);
            }
            let mut last_advertise = Instant::now();
            loop {
                match stop_rx.recv_timeout(sweep_every) {
                    Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
                    Err(mpsc::RecvTimeoutError::Timeout) => {}
                }
                d.sweep();
                if let Some(every) = advertise {
                    if last_advertise.elapsed() >= every {
                        d.advertise(advertise_secs);
                        last_advertise = Instant::now();
                    }
                }
            }
        })?);
        Ok(())
    }

    /// Signal every worker and join them. Safe to call more than once.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
        let taken = self.workers.lock().take();
        if let Some(mut workers) = taken {
            drop(workers.stop_tx.take());
            self.resources().wake_all();
            for handle in workers.threads.drain(..) {
                let _ = handle.join();
            }
            log::info!("[GATEWAY] stopped");
        }
    }
}

impl Drop for Gateway {
    fn drop(&mut self) {
        self.stop();
    }
}

fn spawn<F>(name: &str, f: F) -> std::io::Result<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new().name(name.into()).spawn(f)
}
