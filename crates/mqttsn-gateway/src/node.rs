// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

// Per-device session.
//
// A `ClientNode` is shared between the receive, session and send workers,
// so every mutable field sits behind the node's own lock and the five
// message queues carry their own. No method holds the state lock while
// touching a queue.

use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::address::ClientAddress;
use crate::collab::{SecureHandle, TopicsHandle};
use crate::error::ProtocolError;
use crate::frame;
use crate::message::{MqttMessage, SnMessage, RC_ACCEPTED};
use crate::queue::MessageQue;

/// Default multiplier applied to the negotiated keep-alive.
pub const DEFAULT_KEEP_ALIVE_GRACE: f64 = 1.5;

/// Largest accepted keep-alive multiplier.
pub const MAX_KEEP_ALIVE_GRACE: f64 = 10.0;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Registry key for a node. Never reused while the registry is alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientStatus {
    #[default]
    Disconnected,
    TryConnecting,
    Connecting,
    Active,
    Asleep,
    Awake,
    Lost,
}

impl ClientStatus {
    /// States in which the keep-alive timer is armed.
    pub fn is_supervised(self) -> bool {
        matches!(
            self,
            Self::TryConnecting | Self::Connecting | Self::Active | Self::Asleep | Self::Awake
        )
    }
}

// ---------------------------------------------------------------------------
// Timer
// ---------------------------------------------------------------------------

/// Monotonic one-shot timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct Timer {
    started: Option<Instant>,
    period: Duration,
}

impl Timer {
    pub fn start(&mut self, period: Duration) {
        self.period = period;
        self.started = Some(Instant::now());
    }

    /// Restart with the current period.
    pub fn reset(&mut self) {
        if self.started.is_some() {
            self.started = Some(Instant::now());
        }
    }

    pub fn stop(&mut self) {
        self.started = None;
    }

    pub fn is_running(&self) -> bool {
        self.started.is_some()
    }

    pub fn elapsed(&self) -> Duration {
        self.started.map_or(Duration::ZERO, |s| s.elapsed())
    }

    pub fn is_timeup(&self) -> bool {
        self.started.is_some() && self.elapsed() >= self.period
    }
}

// ---------------------------------------------------------------------------
// Mutable session state
// ---------------------------------------------------------------------------

#[derive(Default)]
struct NodeState {
    status: ClientStatus,
    client_id: Option<String>,
    keep_alive: Duration,
    grace: f64,
    timer: Timer,

    connect: Option<SnMessage>,
    connect_in_flight: bool,
    // Set once the session has been closed; cleared by the next CONNECT.
    closed: bool,
    connack: Option<SnMessage>,
    connack_save: bool,
    wait_will_msg: bool,

    waited_puback: Option<SnMessage>,
    waited_suback: Option<SnMessage>,

    msg_id: u16,
    sn_msg_id: u8,

    topics: Option<TopicsHandle>,
    secure: Option<SecureHandle>,
}

impl NodeState {
    fn arm_timer(&mut self) {
        if self.keep_alive.is_zero() {
            self.timer.stop();
        } else {
            let secs = self.keep_alive.as_secs_f64() * self.grace;
            self.timer.start(Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX));
        }
    }

    fn clear_connect(&mut self) {
        self.connect = None;
        self.connect_in_flight = false;
    }

    fn close(&mut self) {
        self.timer.stop();
        self.status = ClientStatus::Disconnected;
        self.closed = true;
    }

    fn begin_connect(&mut self, msg: &SnMessage) {
        self.keep_alive = Duration::from_secs(u64::from(msg.connect_duration().unwrap_or(0)));
        if let Some(id) = msg.connect_client_id() {
            self.client_id = Some(id);
        }
        self.wait_will_msg = msg.has_will();
        self.connect = Some(msg.clone());
        self.connect_in_flight = false;
        self.closed = false;
        self.status = ClientStatus::TryConnecting;
        self.arm_timer();
    }
}

// ---------------------------------------------------------------------------
// ClientNode
// ---------------------------------------------------------------------------

/// Session state for one device.
pub struct ClientNode {
    id: NodeId,
    address: ClientAddress,
    state: Mutex<NodeState>,
    broker_send: MessageQue<MqttMessage>,
    broker_recv: MessageQue<MqttMessage>,
    client_send: MessageQue<SnMessage>,
    client_recv: MessageQue<SnMessage>,
    client_sleep: MessageQue<SnMessage>,
}

impl fmt::Debug for ClientNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientNode")
            .field("id", &self.id)
            .field("address", &self.address)
            .field("status", &self.status())
            .finish()
    }
}

impl ClientNode {
    pub fn new(id: NodeId, address: ClientAddress) -> Self {
        Self::with_grace(id, address, DEFAULT_KEEP_ALIVE_GRACE)
    }

    pub fn with_grace(id: NodeId, address: ClientAddress, grace: f64) -> Self {
        Self {
            id,
            address,
            state: Mutex::new(NodeState {
                grace,
                ..NodeState::default()
            }),
            broker_send: MessageQue::new(),
            broker_recv: MessageQue::new(),
            client_send: MessageQue::new(),
            client_recv: MessageQue::new(),
            client_sleep: MessageQue::new(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn address(&self) -> &ClientAddress {
        &self.address
    }

    pub fn client_id(&self) -> Option<String> {
        self.state.lock().client_id.clone()
    }

    pub fn set_client_id(&self, client_id: impl Into<String>) {
        self.state.lock().client_id = Some(client_id.into());
    }

    // -- status -----------------------------------------------------------

    pub fn status(&self) -> ClientStatus {
        self.state.lock().status
    }

    pub fn is_disconnect(&self) -> bool {
        matches!(
            self.status(),
            ClientStatus::Disconnected | ClientStatus::Lost
        )
    }

    pub fn is_active(&self) -> bool {
        self.status() == ClientStatus::Active
    }

    pub fn is_sleep(&self) -> bool {
        self.status() == ClientStatus::Asleep
    }

    pub fn is_awake(&self) -> bool {
        self.status() == ClientStatus::Awake
    }

    pub fn is_lost(&self) -> bool {
        self.status() == ClientStatus::Lost
    }

    /// Drive the state machine from a frame the device sent.
    ///
    /// A CONNECT arriving while one is in flight upstream is refused with
    /// [`ProtocolError::ConnectPending`] and leaves the state untouched. One
    /// arriving in `TryConnecting` before the broker took the first replaces
    /// the cached CONNECT and restarts the attempt.
    pub fn update_status(&self, msg: &SnMessage) -> Result<ClientStatus, ProtocolError> {
        let mut st = self.state.lock();
        let from = st.status;

        match (from, msg.msg_type()) {
            (ClientStatus::Disconnected | ClientStatus::Lost, frame::CONNECT) => {
                st.begin_connect(msg);
            }
            (ClientStatus::TryConnecting, frame::CONNECT) if !st.connect_in_flight => {
                log::debug!("[CLIENTS] {} CONNECT retried before broker send", self.id);
                st.begin_connect(msg);
            }
            (ClientStatus::TryConnecting | ClientStatus::Connecting, frame::CONNECT) => {
                return Err(ProtocolError::ConnectPending);
            }

            (ClientStatus::Active, frame::DISCONNECT) => match msg.disconnect_duration() {
                Some(secs) => {
                    st.keep_alive = Duration::from_secs(u64::from(secs));
                    st.arm_timer();
                    st.status = ClientStatus::Asleep;
                }
                None => st.close(),
            },
            (ClientStatus::Active, _) => st.timer.reset(),

            (ClientStatus::Asleep | ClientStatus::Awake, frame::PINGREQ) => {
                st.timer.reset();
                st.status = ClientStatus::Awake;
            }
            (ClientStatus::Asleep | ClientStatus::Awake, frame::CONNECT) => {
                if let Some(secs) = msg.connect_duration() {
                    st.keep_alive = Duration::from_secs(u64::from(secs));
                }
                st.arm_timer();
                st.status = ClientStatus::Active;
            }
            (ClientStatus::Asleep | ClientStatus::Awake, frame::DISCONNECT) => {
                match msg.disconnect_duration() {
                    Some(secs) => {
                        st.keep_alive = Duration::from_secs(u64::from(secs));
                        st.arm_timer();
                        st.status = ClientStatus::Asleep;
                    }
                    None => st.close(),
                }
            }
            _ => {}
        }

        if st.status != from {
            log::debug!(
                "[CLIENTS] {} {:?} -> {:?} on {}",
                self.id,
                from,
                st.status,
                msg.type_name()
            );
        }
        Ok(st.status)
    }

    /// Force a status, bypassing the transition table.
    pub fn set_status(&self, status: ClientStatus) {
        let mut st = self.state.lock();
        if status.is_supervised() && !st.status.is_supervised() {
            st.arm_timer();
        }
        if !status.is_supervised() {
            st.timer.stop();
        }
        st.status = status;
    }

    /// Keep-alive sweep. Moves a supervised node whose timer has expired to
    /// `Lost` and returns true when that happened on this call.
    pub fn check_timeover(&self) -> bool {
        let mut st = self.state.lock();
        if st.status.is_supervised() && st.timer.is_timeup() {
            log::info!(
                "[CLIENTS] {} keep-alive expired in {:?} after {:?}",
                self.id,
                st.status,
                st.timer.elapsed()
            );
            st.status = ClientStatus::Lost;
            st.timer.stop();
            st.clear_connect();
            return true;
        }
        false
    }

    pub fn keep_alive(&self) -> Duration {
        self.state.lock().keep_alive
    }

    /// Override the keep-alive interval and re-arm the timer if supervised.
    pub fn set_keep_alive(&self, interval: Duration) {
        let mut st = self.state.lock();
        st.keep_alive = interval;
        if st.status.is_supervised() {
            st.arm_timer();
        }
    }

    // -- connect handshake ------------------------------------------------

    /// The cached CONNECT has been queued for the broker.
    pub fn connect_queued(&self) {
        let mut st = self.state.lock();
        if st.status == ClientStatus::Disconnected || st.status == ClientStatus::Lost {
            st.status = ClientStatus::TryConnecting;
        }
    }

    /// The cached CONNECT went out to the broker.
    pub fn connect_sent(&self) {
        let mut st = self.state.lock();
        if st.status == ClientStatus::TryConnecting {
            st.connect_in_flight = true;
            st.status = ClientStatus::Connecting;
            st.arm_timer();
        }
    }

    /// Broker answered the CONNECT.
    pub fn connack_received(&self, return_code: u8) -> ClientStatus {
        let mut st = self.state.lock();
        if st.status == ClientStatus::Connecting || st.status == ClientStatus::TryConnecting {
            st.clear_connect();
            if return_code == RC_ACCEPTED {
                st.status = ClientStatus::Active;
                st.arm_timer();
            } else {
                st.close();
            }
            log::debug!("[CLIENTS] {} CONNACK rc={} -> {:?}", self.id, return_code, st.status);
        }
        st.status
    }

    /// Abandon the pending connect attempt.
    pub fn reset_connect_wait(&self) {
        let mut st = self.state.lock();
        st.clear_connect();
        if matches!(
            st.status,
            ClientStatus::TryConnecting | ClientStatus::Connecting
        ) {
            st.close();
        }
    }

    /// False while a CONNECT is in flight and unacknowledged.
    pub fn is_connect_sendable(&self) -> bool {
        !self.state.lock().connect_in_flight
    }

    pub fn cached_connect(&self) -> Option<SnMessage> {
        self.state.lock().connect.clone()
    }

    /// Plain disconnect from the gateway side.
    pub fn disconnected(&self) {
        let mut st = self.state.lock();
        st.clear_connect();
        st.close();
    }

    /// True once a closed session has nothing left to deliver in either
    /// direction. A node that was never connected is not reapable.
    pub fn is_reapable(&self) -> bool {
        {
            let st = self.state.lock();
            if !(st.closed && st.status == ClientStatus::Disconnected) {
                return false;
            }
        }
        self.broker_send.is_empty()
            && self.broker_recv.is_empty()
            && self.client_send.is_empty()
            && self.client_recv.is_empty()
            && self.client_sleep.is_empty()
    }

    // -- CONNACK deferral -------------------------------------------------

    pub fn set_connack_save_flag(&self) {
        self.state.lock().connack_save = true;
    }

    pub fn set_wait_will_msg_flag(&self, waiting: bool) {
        self.state.lock().wait_will_msg = waiting;
    }

    pub fn is_waiting_will_msg(&self) -> bool {
        self.state.lock().wait_will_msg
    }

    /// Returns the CONNACK if it may go to the device now, or holds it while
    /// the save flag is set and the will exchange is still running.
    pub fn check_connack(&self, msg: SnMessage) -> Option<SnMessage> {
        let mut st = self.state.lock();
        if st.connack_save && st.wait_will_msg {
            st.connack = Some(msg);
            None
        } else {
            st.connack_save = false;
            Some(msg)
        }
    }

    /// Release the held CONNACK once the will exchange has finished.
    pub fn take_saved_connack(&self) -> Option<SnMessage> {
        let mut st = self.state.lock();
        if st.wait_will_msg {
            return None;
        }
        let msg = st.connack.take()?;
        st.connack_save = false;
        Some(msg)
    }

    // -- pending acks -----------------------------------------------------

    pub fn set_waited_puback(&self, publish: SnMessage) -> Result<(), ProtocolError> {
        let mut st = self.state.lock();
        if st.waited_puback.is_some() {
            return Err(ProtocolError::PubAckOutstanding);
        }
        st.waited_puback = Some(publish);
        Ok(())
    }

    pub fn waited_puback(&self) -> Option<SnMessage> {
        self.state.lock().waited_puback.clone()
    }

    /// Clear the outstanding PUBLISH if `msg_id` matches it.
    pub fn ack_puback(&self, msg_id: u16) -> Option<SnMessage> {
        let mut st = self.state.lock();
        match &st.waited_puback {
            Some(m) if m.msg_id() == Some(msg_id) => st.waited_puback.take(),
            _ => None,
        }
    }

    pub fn set_waited_suback(&self, subscribe: SnMessage) -> Result<(), ProtocolError> {
        let mut st = self.state.lock();
        if st.waited_suback.is_some() {
            return Err(ProtocolError::SubAckOutstanding);
        }
        st.waited_suback = Some(subscribe);
        Ok(())
    }

    pub fn waited_suback(&self) -> Option<SnMessage> {
        self.state.lock().waited_suback.clone()
    }

    pub fn ack_suback(&self, msg_id: u16) -> Option<SnMessage> {
        let mut st = self.state.lock();
        match &st.waited_suback {
            Some(m) if m.msg_id() == Some(msg_id) => st.waited_suback.take(),
            _ => None,
        }
    }

    // -- message ids ------------------------------------------------------

    /// Next broker-side message id, 1..=0xFFFF.
    pub fn next_message_id(&self) -> u16 {
        let mut st = self.state.lock();
        st.msg_id = st.msg_id.checked_add(1).unwrap_or(1);
        st.msg_id
    }

    /// Next device-side message id, 1..=0xFF.
    pub fn next_sn_msg_id(&self) -> u8 {
        let mut st = self.state.lock();
        st.sn_msg_id = st.sn_msg_id.checked_add(1).unwrap_or(1);
        st.sn_msg_id
    }

    // -- opaque collaborators ---------------------------------------------

    pub fn topics(&self) -> Option<TopicsHandle> {
        self.state.lock().topics.clone()
    }

    pub fn set_topics(&self, topics: TopicsHandle) {
        self.state.lock().topics = Some(topics);
    }

    pub fn secure_stack(&self) -> Option<SecureHandle> {
        self.state.lock().secure.clone()
    }

    pub fn set_secure_stack(&self, stack: SecureHandle) {
        self.state.lock().secure = Some(stack);
    }

    // -- queues -----------------------------------------------------------

    pub fn broker_send_que(&self) -> &MessageQue<MqttMessage> {
        &self.broker_send
    }

    pub fn broker_recv_que(&self) -> &MessageQue<MqttMessage> {
        &self.broker_recv
    }

    pub fn client_send_que(&self) -> &MessageQue<SnMessage> {
        &self.client_send
    }

    pub fn client_recv_que(&self) -> &MessageQue<SnMessage> {
        &self.client_recv
    }

    pub fn client_sleep_que(&self) -> &MessageQue<SnMessage> {
        &self.client_sleep
    }

    /// Move everything buffered during sleep to the send queue, oldest first.
    pub fn flush_sleep_que(&self) -> usize {
        let parked = self.client_sleep.drain();
        let n = parked.len();
        for msg in parked {
            self.client_send.push(msg);
        }
        n
    }

    /// The device has drained its buffered traffic and goes back to sleep.
    pub fn awake_idle(&self) {
        let mut st = self.state.lock();
        if st.status == ClientStatus::Awake {
            st.timer.reset();
            st.status = ClientStatus::Asleep;
        }
    }

    /// Drop every queued and cached message. Returns how many queue
    /// entries were released.
    pub fn drain_all(&self) -> usize {
        let n = self.broker_send.clear()
            + self.broker_recv.clear()
            + self.client_send.clear()
            + self.client_recv.clear()
            + self.client_sleep.clear();
        let mut st = self.state.lock();
        st.clear_connect();
        st.connack = None;
        st.waited_puback = None;
        st.waited_suback = None;
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddrV6;
    use std::thread;

    fn node() -> ClientNode {
        let sa: SocketAddrV6 = "[2001:db8::1]:47000".parse().unwrap();
        ClientNode::new(NodeId(1), ClientAddress::from_socket_addr(&sa))
    }

    fn connect_to_active(n: &ClientNode) {
        n.update_status(&SnMessage::connect(0, 60, "dev")).unwrap();
        n.connect_sent();
        n.connack_received(RC_ACCEPTED);
    }

    #[test]
    fn test_connect_handshake() {
        let n = node();
        assert_eq!(n.status(), ClientStatus::Disconnected);

        let st = n.update_status(&SnMessage::connect(0, 60, "dev")).unwrap();
        assert_eq!(st, ClientStatus::TryConnecting);
        assert_eq!(n.keep_alive(), Duration::from_secs(60));
        assert_eq!(n.client_id().as_deref(), Some("dev"));

        n.connect_sent();
        assert_eq!(n.status(), ClientStatus::Connecting);
        assert_eq!(n.connack_received(RC_ACCEPTED), ClientStatus::Active);
        assert!(n.is_active());
        assert!(n.cached_connect().is_none());
    }

    #[test]
    fn test_connack_rejected() {
        let n = node();
        n.update_status(&SnMessage::connect(0, 60, "dev")).unwrap();
        n.connect_sent();
        assert_eq!(n.connack_received(0x03), ClientStatus::Disconnected);
        assert!(n.is_disconnect());
    }

    #[test]
    fn test_duplicate_connect_refused() {
        let n = node();
        n.update_status(&SnMessage::connect(0, 60, "dev")).unwrap();
        n.connect_sent();
        assert_eq!(
            n.update_status(&SnMessage::connect(0, 60, "dev")),
            Err(ProtocolError::ConnectPending)
        );
        assert_eq!(n.status(), ClientStatus::Connecting);
    }

    #[test]
    fn test_connect_sendable() {
        let n = node();
        assert!(n.is_connect_sendable());
        n.update_status(&SnMessage::connect(0, 60, "dev")).unwrap();
        n.connect_sent();
        assert!(!n.is_connect_sendable());
        n.connack_received(RC_ACCEPTED);
        assert!(n.is_connect_sendable());

        let n = node();
        n.update_status(&SnMessage::connect(0, 60, "dev")).unwrap();
        n.connect_sent();
        n.reset_connect_wait();
        assert!(n.is_connect_sendable());
        assert_eq!(n.status(), ClientStatus::Disconnected);
    }

    #[test]
    fn test_sleep_and_wake() {
        let n = node();
        connect_to_active(&n);

        n.update_status(&SnMessage::disconnect(Some(120))).unwrap();
        assert!(n.is_sleep());
        assert_eq!(n.keep_alive(), Duration::from_secs(120));

        n.update_status(&SnMessage::pingreq()).unwrap();
        assert!(n.is_awake());
        n.awake_idle();
        assert!(n.is_sleep());

        n.update_status(&SnMessage::pingreq()).unwrap();
        n.update_status(&SnMessage::connect(0, 30, "dev")).unwrap();
        assert!(n.is_active());
        assert_eq!(n.keep_alive(), Duration::from_secs(30));
    }

    #[test]
    fn test_plain_disconnect() {
        let n = node();
        connect_to_active(&n);
        n.update_status(&SnMessage::disconnect(None)).unwrap();
        assert_eq!(n.status(), ClientStatus::Disconnected);
        assert!(!n.check_timeover());
    }

    #[test]
    fn test_keep_alive_expiry_forces_lost() {
        for target in [
            ClientStatus::TryConnecting,
            ClientStatus::Connecting,
            ClientStatus::Active,
            ClientStatus::Asleep,
            ClientStatus::Awake,
        ] {
            let n = node();
            n.set_keep_alive(Duration::from_millis(2));
            n.set_status(target);
            thread::sleep(Duration::from_millis(10));
            assert!(n.check_timeover(), "{:?}", target);
            assert!(n.is_lost());
            assert!(n.is_disconnect());
            // Second sweep reports nothing new.
            assert!(!n.check_timeover());
        }
    }

    #[test]
    fn test_connect_retry_before_broker_send() {
        let n = node();
        n.update_status(&SnMessage::connect(0, 60, "dev")).unwrap();
        assert!(n.is_connect_sendable());

        let st = n.update_status(&SnMessage::connect(0, 15, "dev")).unwrap();
        assert_eq!(st, ClientStatus::TryConnecting);
        assert_eq!(n.keep_alive(), Duration::from_secs(15));
        assert_eq!(
            n.cached_connect().and_then(|m| m.connect_duration()),
            Some(15)
        );

        n.connect_sent();
        assert_eq!(
            n.update_status(&SnMessage::connect(0, 15, "dev")),
            Err(ProtocolError::ConnectPending)
        );
    }

    #[test]
    fn test_try_connecting_expires() {
        let n = node();
        n.update_status(&SnMessage::connect(0, 60, "dev")).unwrap();
        n.set_keep_alive(Duration::from_millis(2));
        thread::sleep(Duration::from_millis(10));
        assert!(n.check_timeover());
        assert!(n.is_lost());
        assert!(n.cached_connect().is_none());
    }

    #[test]
    fn test_reapable_after_close() {
        let n = node();
        assert!(!n.is_reapable());

        connect_to_active(&n);
        assert!(!n.is_reapable());
        n.update_status(&SnMessage::disconnect(None)).unwrap();
        assert!(n.is_reapable());

        n.client_send_que().push(SnMessage::disconnect(None));
        assert!(!n.is_reapable());
        n.client_send_que().pop();
        assert!(n.is_reapable());

        n.update_status(&SnMessage::connect(0, 60, "dev")).unwrap();
        assert!(!n.is_reapable());
        n.connect_sent();
        n.connack_received(0x03);
        assert!(n.is_reapable());
    }

    #[test]
    fn test_oversized_grace_does_not_overflow() {
        let sa: SocketAddrV6 = "[2001:db8::1]:47000".parse().unwrap();
        let n = ClientNode::with_grace(NodeId(1), ClientAddress::from_socket_addr(&sa), 1e20);
        n.update_status(&SnMessage::connect(0, 60, "dev")).unwrap();
        n.connect_sent();
        assert_eq!(n.connack_received(RC_ACCEPTED), ClientStatus::Active);
        assert!(!n.check_timeover());
    }

    #[test]
    fn test_disconnected_never_times_out() {
        let n = node();
        n.set_keep_alive(Duration::from_millis(1));
        thread::sleep(Duration::from_millis(5));
        assert!(!n.check_timeover());
        assert_eq!(n.status(), ClientStatus::Disconnected);
    }

    #[test]
    fn test_active_traffic_refreshes_timer() {
        let n = node();
        connect_to_active(&n);
        n.set_keep_alive(Duration::from_millis(200));
        for _ in 0..5 {
            thread::sleep(Duration::from_millis(50));
            n.update_status(&SnMessage::pingreq()).unwrap();
            assert!(!n.check_timeover());
        }
    }

    #[test]
    fn test_single_outstanding_acks() {
        let n = node();
        let sub = SnMessage::new(frame::SUBSCRIBE, vec![0x00, 0x00, 0x07, b't']);
        n.set_waited_suback(sub.clone()).unwrap();
        assert_eq!(
            n.set_waited_suback(sub.clone()),
            Err(ProtocolError::SubAckOutstanding)
        );
        assert!(n.ack_suback(8).is_none());
        assert_eq!(n.ack_suback(7), Some(sub.clone()));
        n.set_waited_suback(sub).unwrap();

        let publish = SnMessage::new(frame::PUBLISH, vec![0x20, 0x00, 0x01, 0x00, 0x09, b'x']);
        n.set_waited_puback(publish.clone()).unwrap();
        assert_eq!(
            n.set_waited_puback(publish),
            Err(ProtocolError::PubAckOutstanding)
        );
        assert!(n.ack_puback(9).is_some());
        assert!(n.waited_puback().is_none());
    }

    #[test]
    fn test_message_ids_wrap_and_skip_zero() {
        let n = node();
        assert_eq!(n.next_message_id(), 1);
        n.state.lock().msg_id = u16::MAX;
        assert_eq!(n.next_message_id(), 1);

        n.state.lock().sn_msg_id = u8::MAX - 1;
        assert_eq!(n.next_sn_msg_id(), u8::MAX);
        assert_eq!(n.next_sn_msg_id(), 1);
    }

    #[test]
    fn test_connack_deferral() {
        let n = node();
        n.update_status(&SnMessage::connect(crate::message::FLAG_WILL, 60, "dev"))
            .unwrap();
        assert!(n.is_waiting_will_msg());
        n.set_connack_save_flag();

        assert!(n.check_connack(SnMessage::connack(RC_ACCEPTED)).is_none());
        assert!(n.take_saved_connack().is_none());

        n.set_wait_will_msg_flag(false);
        assert_eq!(n.take_saved_connack(), Some(SnMessage::connack(RC_ACCEPTED)));
        assert!(n.check_connack(SnMessage::connack(RC_ACCEPTED)).is_some());
    }

    #[test]
    fn test_flush_sleep_que_preserves_order() {
        let n = node();
        for i in 0..3u8 {
            n.client_sleep_que().push(SnMessage::new(frame::PUBLISH, vec![i]));
        }
        assert_eq!(n.flush_sleep_que(), 3);
        assert!(n.client_sleep_que().is_empty());
        let bodies: Vec<u8> = n.client_send_que().drain().iter().map(|m| m.body()[0]).collect();
        assert_eq!(bodies, vec![0, 1, 2]);
    }

    #[test]
    fn test_drain_all() {
        let n = node();
        n.update_status(&SnMessage::connect(0, 60, "dev")).unwrap();
        n.client_send_que().push(SnMessage::pingresp());
        n.client_recv_que().push(SnMessage::pingreq());
        n.broker_send_que().push(MqttMessage::connack(0));
        assert_eq!(n.drain_all(), 3);
        assert!(n.cached_connect().is_none());
        assert!(n.client_send_que().is_empty());
    }
}
