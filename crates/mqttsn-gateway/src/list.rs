// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

// Registry of client sessions.
//
// The list is the only place nodes are created or destroyed. Everything
// else holds a `NodeId` and resolves it here; a lookup that misses means
// the node has been erased in the meantime.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::address::{AddressMode, ClientAddress};
use crate::collab::NodeAuthorizer;
use crate::error::ClientListError;
use crate::node::{ClientNode, ClientStatus, NodeId, DEFAULT_KEEP_ALIVE_GRACE};

/// Default capacity.
pub const DEFAULT_MAX_CLIENTS: usize = 100;

struct ListInner {
    nodes: Vec<Arc<ClientNode>>,
    next_id: u32,
}

/// Thread-safe set of `ClientNode`s, guarded by one lock.
pub struct ClientList {
    inner: Mutex<ListInner>,
    max_clients: usize,
    mode: AddressMode,
    keep_alive_grace: f64,
    authorizer: Option<Arc<dyn NodeAuthorizer>>,
}

impl Default for ClientList {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CLIENTS)
    }
}

impl ClientList {
    pub fn new(max_clients: usize) -> Self {
        Self {
            inner: Mutex::new(ListInner {
                nodes: Vec::new(),
                next_id: 1,
            }),
            max_clients,
            mode: AddressMode::Long,
            keep_alive_grace: DEFAULT_KEEP_ALIVE_GRACE,
            authorizer: None,
        }
    }

    pub fn with_mode(mut self, mode: AddressMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_keep_alive_grace(mut self, grace: f64) -> Self {
        self.keep_alive_grace = grace;
        self
    }

    /// Only consulted in short-address mode.
    pub fn with_authorizer(mut self, authorizer: Arc<dyn NodeAuthorizer>) -> Self {
        self.authorizer = Some(authorizer);
        self
    }

    pub fn mode(&self) -> AddressMode {
        self.mode
    }

    pub fn max_clients(&self) -> usize {
        self.max_clients
    }

    pub fn is_authorized(&self, node_id: &str) -> bool {
        match &self.authorizer {
            Some(auth) => auth.is_authorized(node_id),
            None => true,
        }
    }

    /// Look up a node by device address.
    pub fn get_client(&self, address: &ClientAddress) -> Option<Arc<ClientNode>> {
        self.inner
            .lock()
            .nodes
            .iter()
            .find(|n| n.address() == address)
            .cloned()
    }

    pub fn get(&self, id: NodeId) -> Option<Arc<ClientNode>> {
        self.inner
            .lock()
            .nodes
            .iter()
            .find(|n| n.id() == id)
            .cloned()
    }

    /// Create and register a node. Does not check for an existing node at
    /// the same address; use [`find_or_create`](Self::find_or_create) for that.
    pub fn create_node(
        &self,
        address: ClientAddress,
        node_id: Option<&str>,
    ) -> Result<Arc<ClientNode>, ClientListError> {
        if address.mode() != self.mode {
            return Err(ClientListError::AddressMode);
        }
        if self.mode == AddressMode::Short && self.authorizer.is_some() {
            let id = node_id.unwrap_or_default();
            if !self.is_authorized(id) {
                log::debug!("[CLIENTS] rejected unauthorized node '{}'", id);
                return Err(ClientListError::Unauthorized(id.to_string()));
            }
        }

        let mut inner = self.inner.lock();
        Self::insert_locked(&mut inner, self.max_clients, self.keep_alive_grace, address, node_id)
    }

    /// Existing node for `address`, or a fresh one. Lookup and insert run
    /// under one lock so two receivers cannot both create a node.
    pub fn find_or_create(
        &self,
        address: ClientAddress,
    ) -> Result<Arc<ClientNode>, ClientListError> {
        if address.mode() != self.mode {
            return Err(ClientListError::AddressMode);
        }
        let mut inner = self.inner.lock();
        if let Some(node) = inner.nodes.iter().find(|n| *n.address() == address) {
            return Ok(Arc::clone(node));
        }
        Self::insert_locked(&mut inner, self.max_clients, self.keep_alive_grace, address, None)
    }

    fn insert_locked(
        inner: &mut ListInner,
        max_clients: usize,
        grace: f64,
        address: ClientAddress,
        node_id: Option<&str>,
    ) -> Result<Arc<ClientNode>, ClientListError> {
        if inner.nodes.len() >= max_clients {
            log::warn!("[CLIENTS] list full ({} clients), dropping {}", max_clients, address);
            return Err(ClientListError::Full(max_clients));
        }
        let id = NodeId(inner.next_id);
        inner.next_id = inner.next_id.wrapping_add(1).max(1);

        let node = Arc::new(ClientNode::with_grace(id, address, grace));
        if let Some(name) = node_id {
            node.set_client_id(name);
        }
        inner.nodes.push(Arc::clone(&node));
        log::debug!("[CLIENTS] {} created for {}", id, address);
        Ok(node)
    }

    /// Remove a node and release everything it queued. Erasing a node that
    /// is not present does nothing.
    pub fn erase(&self, id: NodeId) -> bool {
        let removed = {
            let mut inner = self.inner.lock();
            inner
                .nodes
                .iter()
                .position(|n| n.id() == id)
                .map(|pos| inner.nodes.remove(pos))
        };
        match removed {
            Some(node) => {
                let dropped = node.drain_all();
                log::debug!(
                    "[CLIENTS] {} erased ({} queued messages released)",
                    id,
                    dropped
                );
                true
            }
            None => false,
        }
    }

    pub fn client_count(&self) -> usize {
        self.inner.lock().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().nodes.is_empty()
    }

    /// Node at `index` in creation order.
    pub fn node_at(&self, index: usize) -> Option<Arc<ClientNode>> {
        self.inner.lock().nodes.get(index).cloned()
    }

    /// Point-in-time copy of the node handles, for sweeps that must not hold
    /// the list lock while touching each node.
    pub fn snapshot(&self) -> Vec<Arc<ClientNode>> {
        self.inner.lock().nodes.clone()
    }

    /// Run the keep-alive check on every node. Returns the nodes that went
    /// `Lost` during this sweep.
    pub fn check_timeovers(&self) -> Vec<NodeId> {
        self.snapshot()
            .iter()
            .filter(|n| n.check_timeover())
            .map(|n| n.id())
            .collect()
    }

    /// Erase every node currently in `Lost`. Returns the erased ids.
    pub fn erase_lost(&self) -> Vec<NodeId> {
        let lost: Vec<NodeId> = self
            .snapshot()
            .iter()
            .filter(|n| n.status() == ClientStatus::Lost)
            .map(|n| n.id())
            .collect();
        for id in &lost {
            self.erase(*id);
        }
        lost
    }

    /// Erase every closed session with nothing left queued. Returns the
    /// erased ids.
    pub fn erase_closed(&self) -> Vec<NodeId> {
        let closed: Vec<NodeId> = self
            .snapshot()
            .iter()
            .filter(|n| n.is_reapable())
            .map(|n| n.id())
            .collect();
        for id in &closed {
            self.erase(*id);
        }
        closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::NwAddress64;
    use crate::collab::AllowList;
    use crate::message::SnMessage;
    use std::net::SocketAddrV6;
    use std::thread;
    use std::time::Duration;

    fn long(last: u8, port: u16) -> ClientAddress {
        let mut ip = [0u8; 16];
        ip[0] = 0x20;
        ip[1] = 0x01;
        ip[15] = last;
        let sa = SocketAddrV6::new(ip.into(), port, 0, 0);
        ClientAddress::from_socket_addr(&sa)
    }

    #[test]
    fn test_create_then_get() {
        let list = ClientList::new(10);
        let node = list.create_node(long(1, 47000), None).unwrap();
        let found = list.get_client(&long(1, 47000)).unwrap();
        assert!(Arc::ptr_eq(&node, &found));
        assert!(list.get_client(&long(2, 47000)).is_none());
        assert!(list.get_client(&long(1, 47001)).is_none());
        assert_eq!(list.client_count(), 1);
    }

    #[test]
    fn test_erase() {
        let list = ClientList::new(10);
        let node = list.create_node(long(1, 47000), None).unwrap();
        node.client_send_que().push(SnMessage::pingresp());
        let id = node.id();

        assert!(list.erase(id));
        assert!(list.get_client(&long(1, 47000)).is_none());
        assert!(list.get(id).is_none());
        assert!(node.client_send_que().is_empty());
        assert!(!list.erase(id));
    }

    #[test]
    fn test_create_does_not_dedup() {
        let list = ClientList::new(10);
        let a = list.create_node(long(1, 47000), None).unwrap();
        let b = list.create_node(long(1, 47000), None).unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(list.client_count(), 2);

        let c = list.find_or_create(long(1, 47000)).unwrap();
        assert_eq!(c.id(), a.id());
        assert_eq!(list.client_count(), 2);
    }

    #[test]
    fn test_capacity() {
        let list = ClientList::new(2);
        list.create_node(long(1, 1), None).unwrap();
        list.create_node(long(2, 1), None).unwrap();
        assert_eq!(
            list.create_node(long(3, 1), None).unwrap_err(),
            ClientListError::Full(2)
        );
    }

    #[test]
    fn test_address_mode_and_authorizer() {
        let list = ClientList::new(4)
            .with_mode(AddressMode::Short)
            .with_authorizer(Arc::new(AllowList::new(["sensor-1"])));
        assert_eq!(
            list.create_node(long(1, 1), None).unwrap_err(),
            ClientListError::AddressMode
        );

        let short = ClientAddress::Short {
            addr64: NwAddress64::new(0x0013_A200, 0x4010_0001),
            addr16: 0xFFFE,
        };
        assert!(list.create_node(short, Some("sensor-1")).is_ok());
        assert_eq!(
            list.create_node(short, Some("intruder")).unwrap_err(),
            ClientListError::Unauthorized("intruder".into())
        );
    }

    #[test]
    fn test_sweep_erases_lost() {
        let list = ClientList::new(4);
        let node = list.create_node(long(1, 47000), None).unwrap();
        node.set_keep_alive(Duration::from_millis(1));
        node.set_status(ClientStatus::Active);
        let idle = list.create_node(long(2, 47000), None).unwrap();

        thread::sleep(Duration::from_millis(5));
        assert_eq!(list.check_timeovers(), vec![node.id()]);
        assert_eq!(list.erase_lost(), vec![node.id()]);
        assert_eq!(list.client_count(), 1);
        assert!(list.get(idle.id()).is_some());
    }

    #[test]
    fn test_erase_closed_frees_capacity() {
        let list = ClientList::new(2);
        let fresh = list.find_or_create(long(1, 47000)).unwrap();
        let gone = list.find_or_create(long(2, 47000)).unwrap();
        gone.update_status(&SnMessage::connect(0, 60, "dev")).unwrap();
        gone.reset_connect_wait();

        assert_eq!(list.erase_closed(), vec![gone.id()]);
        assert!(list.get(fresh.id()).is_some());
        assert!(list.find_or_create(long(3, 47000)).is_ok());
        assert_eq!(list.client_count(), 2);
    }

    #[test]
    fn test_link_local_scopes_are_separate_sessions() {
        let list = ClientList::new(4);
        let ip = "fe80::1".parse().unwrap();
        let eth = ClientAddress::from_socket_addr(&SocketAddrV6::new(ip, 47000, 0, 2));
        let wpan = ClientAddress::from_socket_addr(&SocketAddrV6::new(ip, 47000, 0, 3));

        let a = list.find_or_create(eth).unwrap();
        let b = list.find_or_create(wpan).unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(list.get_client(&wpan).map(|n| n.id()), Some(b.id()));
    }

    #[test]
    fn test_concurrent_find_or_create() {
        let list = Arc::new(ClientList::new(64));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let list = Arc::clone(&list);
                thread::spawn(move || list.find_or_create(long(9, 5000)).unwrap().id())
            })
            .collect();
        let ids: Vec<NodeId> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(ids.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(list.client_count(), 1);
    }
}
