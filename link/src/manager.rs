//! Connection pool for worker nodes.

use std::time::Duration;

use futures_util::future::join_all;
use gauss_types::{ColumnSet, Matrix, Message, NodeId, Outcome};
use tracing::{debug, info, warn};

use crate::connection::{self, Connection};
use crate::error::{Error, Result};
use crate::registry::{NodeInfo, Registry};
use crate::transfer;

#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub connect_attempts: usize,
    pub connect_delay: Duration,
    pub request_timeout: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            connect_attempts: 3,
            connect_delay: Duration::from_millis(100),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Owns the connections to a pool of workers.
///
/// # Failure handling
///
/// Connecting retries with a doubling delay and gives up with
/// [`Error::ConnectFailed`]. Once connected, any transport failure or
/// timeout during a request marks the node inactive, closes its link and
/// surfaces as [`Error::NodeUnavailable`]. Remote failures and unexpected
/// reply kinds leave the node in place.
///
/// # Example
///
/// ```no_run
/// use gauss_link::{ManagerConfig, NodeManager};
/// use gauss_types::{Message, Sync, Synced};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let manager = NodeManager::new(ManagerConfig::default());
///     let node = manager.connect("127.0.0.1:5001").await?;
///
///     let msg = Message::from(Sync { stage: 0, is_complete: false });
///     let synced: Synced = manager.request(node, &msg).await?;
///     assert_eq!(synced.stage, 0);
///
///     manager.shutdown().await;
///     Ok(())
/// }
/// ```
pub struct NodeManager {
    registry: Registry,
    config: ManagerConfig,
}

impl NodeManager {
    pub fn new(config: ManagerConfig) -> Self {
        Self {
            registry: Registry::new(),
            config,
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Connects to a worker and registers it.
    pub async fn connect(&self, addr: &str) -> Result<NodeId> {
        let attempts = self.config.connect_attempts.max(1);
        let mut delay = self.config.connect_delay;
        let mut attempt = 0;

        loop {
            attempt += 1;
            match Connection::connect(addr).await {
                Ok(conn) => {
                    let id = self.registry.register(addr, conn);
                    info!(node = id, addr, attempt, "worker connected");
                    return Ok(id);
                }
                Err(e) => {
                    warn!(addr, attempt, error = %e, "worker connect failed");
                    if attempt >= attempts {
                        return Err(Error::ConnectFailed {
                            addr: addr.to_string(),
                            attempts,
                        });
                    }
                }
            }

            tokio::time::sleep(delay).await;
            delay *= 2;
        }
    }

    /// Connects to every address concurrently; returns the ids that succeeded.
    pub async fn connect_all(&self, addrs: &[String]) -> Vec<NodeId> {
        join_all(addrs.iter().map(|addr| self.connect(addr)))
            .await
            .into_iter()
            .filter_map(|r| r.ok())
            .collect()
    }

    /// Sends `message` to `node` and waits for a reply of type `T`.
    pub async fn request<T>(&self, node: NodeId, message: &Message) -> Result<T>
    where
        T: TryFrom<Message, Error = Message>,
    {
        let shared = self.registry.connection(node).ok_or(Error::NodeUnavailable(node))?;
        let mut conn = shared.lock().await;
        debug!(node, command = message.name(), "request");

        let limit = self.config.request_timeout;
        let result = timed(limit, message.name(), conn.request::<T>(message)).await;
        drop(conn);
        self.settle(node, message.name(), result).await
    }

    /// Loads `columns` of `matrix` into a worker already sent `InitColumns`,
    /// then waits for the worker to acknowledge the last block.
    ///
    /// `request_timeout` bounds each block write and the final
    /// acknowledgement separately, so a long transfer that keeps moving is
    /// never cut off.
    pub async fn upload(&self, node: NodeId, matrix: &Matrix, columns: ColumnSet) -> Result<()> {
        let shared = self.registry.connection(node).ok_or(Error::NodeUnavailable(node))?;
        let mut conn = shared.lock().await;

        let limit = self.config.request_timeout;
        let result = async {
            let mut blocks = 0;
            for block in transfer::Blocks::new(matrix, columns, None)? {
                timed(limit, "ColumnBlock", conn.send(&Message::from(block?))).await?;
                blocks += 1;
            }
            let reply = timed(limit, "slice acknowledgement", conn.receive()).await?;
            connection::expect_reply::<Outcome>(reply)?;
            Ok::<usize, Error>(blocks)
        }
        .await;
        drop(conn);

        let blocks = self.settle(node, "ColumnBlock", result).await?;
        debug!(node, columns = columns.len(), blocks, "slice uploaded");
        Ok(())
    }

    /// Closes every connection and clears the registry.
    pub async fn shutdown(&self) {
        let conns = self.registry.drain();
        let count = conns.len();
        for shared in conns {
            let mut conn = shared.lock().await;
            if let Err(e) = conn.shutdown().await {
                debug!(peer = %conn.peer(), error = %e, "close failed");
            }
        }
        if count > 0 {
            info!(nodes = count, "worker pool shut down");
        }
    }

    pub fn nodes(&self) -> Vec<NodeInfo> {
        self.registry.nodes()
    }

    /// Ids of the active nodes in ascending order.
    pub fn active_nodes(&self) -> Vec<NodeId> {
        self.registry.active()
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    /// Evicts `node` when `result` failed at the transport level.
    async fn settle<T>(&self, node: NodeId, command: &str, result: Result<T>) -> Result<T> {
        match result {
            Err(e) if e.is_transport() => {
                warn!(node, command, error = %e, "worker link lost");
                self.evict(node).await;
                Err(Error::NodeUnavailable(node))
            }
            other => other,
        }
    }

    async fn evict(&self, node: NodeId) {
        if let Some(shared) = self.registry.deactivate(node) {
            let _ = shared.lock().await.shutdown().await;
        }
    }
}

async fn timed<T>(limit: Duration, what: &str, work: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::time::timeout(limit, work)
        .await
        .map_err(|_| Error::TimedOut(what.to_string()))?
}

impl Default for NodeManager {
    fn default() -> Self {
        Self::new(ManagerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gauss_types::{Sync, Synced};
    use tokio::net::TcpListener;
    use tokio::time::Instant;

    fn fast_config() -> ManagerConfig {
        ManagerConfig {
            connect_attempts: 3,
            connect_delay: Duration::from_millis(20),
            request_timeout: Duration::from_millis(300),
        }
    }

    async fn dead_addr() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);
        addr
    }

    /// Accepts one link and answers every `Sync` with `Synced`.
    async fn start_echo_node() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut conn = Connection::new(stream).unwrap();
            while let Ok(Message::Sync(sync)) = conn.receive().await {
                let reply = Synced {
                    outcome: Outcome::ok(),
                    stage: sync.stage,
                    is_complete: sync.is_complete,
                };
                if conn.send(&Message::from(reply)).await.is_err() {
                    break;
                }
            }
        });
        addr
    }

    /// Accepts one link, pauses after every non-final column block and
    /// acknowledges the final one, or never answers at all when `ack` is false.
    async fn start_loading_node(pause: Duration, ack: bool) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut conn = Connection::new(stream).unwrap();
            while let Ok(Message::ColumnBlock(block)) = conn.receive().await {
                if !block.is_last_block {
                    tokio::time::sleep(pause).await;
                } else if ack {
                    let _ = conn.send(&Message::ack()).await;
                }
            }
        });
        addr
    }

    #[tokio::test]
    async fn test_connect_gives_up_after_retries() {
        let manager = NodeManager::new(fast_config());
        let addr = dead_addr().await;

        let started = Instant::now();
        let err = manager.connect(&addr).await.unwrap_err();
        assert!(matches!(err, Error::ConnectFailed { attempts: 3, .. }));
        // Two sleeps: 20ms then 40ms.
        assert!(started.elapsed() >= Duration::from_millis(60));
        assert!(manager.is_empty());
    }

    #[tokio::test]
    async fn test_request_round_trip() {
        let manager = NodeManager::new(fast_config());
        let node = manager.connect(&start_echo_node().await).await.unwrap();
        assert_eq!(manager.len(), 1);

        let msg = Message::from(Sync { stage: 9, is_complete: true });
        let synced: Synced = manager.request(node, &msg).await.unwrap();
        assert_eq!(synced.stage, 9);
        assert!(synced.is_complete);
    }

    #[tokio::test]
    async fn test_unknown_node() {
        let manager = NodeManager::new(fast_config());
        let msg = Message::from(Sync { stage: 0, is_complete: false });
        let err = manager.request::<Synced>(42, &msg).await.unwrap_err();
        assert!(matches!(err, Error::NodeUnavailable(42)));
    }

    #[tokio::test]
    async fn test_silent_node_times_out_and_is_evicted() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let _hold = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(stream);
        });

        let manager = NodeManager::new(fast_config());
        let node = manager.connect(&addr).await.unwrap();
        let msg = Message::from(Sync { stage: 0, is_complete: false });
        let err = manager.request::<Synced>(node, &msg).await.unwrap_err();

        assert!(matches!(err, Error::NodeUnavailable(id) if id == node));
        assert!(manager.is_empty());
        assert!(!manager.nodes()[0].active);
    }

    #[tokio::test]
    async fn test_closed_node_is_evicted() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });

        let manager = NodeManager::new(fast_config());
        let node = manager.connect(&addr).await.unwrap();
        let msg = Message::from(Sync { stage: 0, is_complete: false });
        let err = manager.request::<Synced>(node, &msg).await.unwrap_err();
        assert!(matches!(err, Error::NodeUnavailable(_)));
        assert!(manager.active_nodes().is_empty());
    }

    #[tokio::test]
    async fn test_slow_upload_outlasts_request_timeout() {
        let config = ManagerConfig {
            request_timeout: Duration::from_secs(4),
            ..fast_config()
        };
        let manager = NodeManager::new(config.clone());
        let node = manager
            .connect(&start_loading_node(Duration::from_millis(2500), true).await)
            .await
            .unwrap();

        // Three blocks; the receiver stalls 2.5s after each of the first two.
        let m = Matrix::with_shape(2048, 1536).unwrap();
        let columns = ColumnSet::Range { start: 0, count: 1536 };
        assert_eq!(transfer::Blocks::new(&m, columns, None).unwrap().count(), 3);

        let started = Instant::now();
        manager.upload(node, &m, columns).await.unwrap();
        assert!(started.elapsed() > config.request_timeout);
        assert_eq!(manager.len(), 1);
    }

    #[tokio::test]
    async fn test_unacknowledged_upload_evicts() {
        let manager = NodeManager::new(fast_config());
        let node = manager
            .connect(&start_loading_node(Duration::ZERO, false).await)
            .await
            .unwrap();

        let m = Matrix::new(4).unwrap();
        let err = manager
            .upload(node, &m, ColumnSet::Range { start: 0, count: 4 })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NodeUnavailable(id) if id == node));
        assert!(manager.is_empty());
    }

    #[tokio::test]
    async fn test_connect_all_and_shutdown() {
        let manager = NodeManager::new(fast_config());
        let addrs = vec![
            start_echo_node().await,
            dead_addr().await,
            start_echo_node().await,
        ];
        let ids = manager.connect_all(&addrs).await;
        assert_eq!(ids.len(), 2);
        assert_eq!(manager.len(), 2);

        manager.shutdown().await;
        assert!(manager.is_empty());
        assert!(manager.nodes().is_empty());
    }
}
