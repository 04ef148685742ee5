// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

// Interfaces to collaborators that live outside the gateway core.
//
// Secure transport and topic registries are carried per client as opaque
// handles. Authorization and status lights are small traits with trivial
// default implementations.

use std::any::Any;
use std::collections::HashSet;
use std::sync::Arc;

/// Opaque per-client topic registry handle.
pub type TopicsHandle = Arc<dyn Any + Send + Sync>;

/// Opaque per-client secure-channel handle.
pub type SecureHandle = Arc<dyn Any + Send + Sync>;

// ---------------------------------------------------------------------------
// Node authorization
// ---------------------------------------------------------------------------

/// Decides whether a node id may register with the gateway.
pub trait NodeAuthorizer: Send + Sync {
    fn is_authorized(&self, node_id: &str) -> bool;
}

/// In-memory allow list.
#[derive(Debug, Default, Clone)]
pub struct AllowList {
    ids: HashSet<String>,
}

impl AllowList {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ids: ids.into_iter().map(Into::into).collect(),
        }
    }

    pub fn insert(&mut self, id: impl Into<String>) {
        self.ids.insert(id.into());
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl NodeAuthorizer for AllowList {
    fn is_authorized(&self, node_id: &str) -> bool {
        self.ids.contains(node_id)
    }
}

// ---------------------------------------------------------------------------
// Status indicator
// ---------------------------------------------------------------------------

/// Fire-and-forget status lights (GPIO on the reference hardware).
pub trait StatusIndicator: Send + Sync {
    /// Broker link up/down.
    fn green(&self, on: bool);
    /// Client traffic activity.
    fn blue(&self, on: bool);
    fn red_off(&self);
}

/// Indicator that does nothing.
pub struct NullIndicator;

impl StatusIndicator for NullIndicator {
    fn green(&self, _on: bool) {}
    fn blue(&self, _on: bool) {}
    fn red_off(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_list() {
        let mut list = AllowList::new(["node-a", "node-b"]);
        assert!(list.is_authorized("node-a"));
        assert!(!list.is_authorized("node-c"));
        list.insert("node-c");
        assert!(list.is_authorized("node-c"));
        assert_eq!(list.len(), 3);
    }
}
