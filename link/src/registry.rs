//! Thread-safe table of connected worker nodes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};

use gauss_types::NodeId;
use tokio::sync::Mutex;

use crate::connection::Connection;

pub type SharedConnection = Arc<Mutex<Connection>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    pub id: NodeId,
    pub addr: String,
    pub active: bool,
}

struct Entry {
    info: NodeInfo,
    conn: Option<SharedConnection>,
}

/// Node id to connection table. A lost node stays listed as inactive until
/// the registry is cleared.
pub struct Registry {
    inner: RwLock<HashMap<NodeId, Entry>>,
    next_id: AtomicU32,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
            next_id: AtomicU32::new(1),
        }
    }

    pub fn register(&self, addr: impl Into<String>, conn: Connection) -> NodeId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let entry = Entry {
            info: NodeInfo {
                id,
                addr: addr.into(),
                active: true,
            },
            conn: Some(Arc::new(Mutex::new(conn.with_node(id)))),
        };
        if let Ok(mut guard) = self.inner.write() {
            guard.insert(id, entry);
        }
        id
    }

    /// The live connection of `id`, if the node is still active.
    pub fn connection(&self, id: NodeId) -> Option<SharedConnection> {
        self.inner.read().ok()?.get(&id)?.conn.clone()
    }

    pub fn info(&self, id: NodeId) -> Option<NodeInfo> {
        self.inner.read().ok()?.get(&id).map(|e| e.info.clone())
    }

    /// Marks `id` inactive and hands back its connection for closing.
    pub fn deactivate(&self, id: NodeId) -> Option<SharedConnection> {
        let mut guard = self.inner.write().ok()?;
        let entry = guard.get_mut(&id)?;
        entry.info.active = false;
        entry.conn.take()
    }

    /// Empties the table and returns every live connection.
    pub fn drain(&self) -> Vec<SharedConnection> {
        match self.inner.write() {
            Ok(mut guard) => guard.drain().filter_map(|(_, e)| e.conn).collect(),
            Err(_) => Vec::new(),
        }
    }

    /// All known nodes ordered by id, inactive ones included.
    pub fn nodes(&self) -> Vec<NodeInfo> {
        let mut nodes: Vec<NodeInfo> = self
            .inner
            .read()
            .map(|g| g.values().map(|e| e.info.clone()).collect())
            .unwrap_or_default();
        nodes.sort_by_key(|n| n.id);
        nodes
    }

    /// Ids of active nodes in ascending order.
    pub fn active(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self
            .inner
            .read()
            .map(|g| g.values().filter(|e| e.info.active).map(|e| e.info.id).collect())
            .unwrap_or_default();
        ids.sort_unstable();
        ids
    }

    /// Number of active nodes.
    pub fn len(&self) -> usize {
        self.inner
            .read()
            .map(|g| g.values().filter(|e| e.info.active).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn connection() -> (Connection, TcpListener) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        (Connection::connect(&addr).await.unwrap(), listener)
    }

    #[tokio::test]
    async fn test_register_and_deactivate() {
        let registry = Registry::new();
        let (c1, _l1) = connection().await;
        let (c2, _l2) = connection().await;

        let a = registry.register("a:1", c1);
        let b = registry.register("b:2", c2);
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.active(), vec![a, b]);

        assert!(registry.deactivate(a).is_some());
        assert!(registry.deactivate(a).is_none());
        assert!(registry.connection(a).is_none());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.active(), vec![b]);

        let nodes = registry.nodes();
        assert_eq!(nodes.len(), 2);
        assert!(!nodes[0].active);
        assert_eq!(nodes[0].addr, "a:1");
    }

    #[tokio::test]
    async fn test_drain_clears() {
        let registry = Registry::new();
        let (c, _l) = connection().await;
        registry.register("x", c);
        assert_eq!(registry.drain().len(), 1);
        assert!(registry.is_empty());
        assert!(registry.nodes().is_empty());
    }
}
