//! Networking layer for distributed Gaussian elimination.
//!
//! `gauss-link` moves [`gauss_types::Message`]s between the coordinator, its
//! clients and the worker nodes over plain TCP.
//!
//! # Features
//!
//! - Length-prefixed JSON frames with a hard size limit
//! - Typed request/reply with remote failures surfaced as errors
//! - Chunked column transfer for matrices of any size
//! - A node pool with connect retries, request timeouts and eviction
//!
//! # Example
//!
//! ```no_run
//! use gauss_link::Connection;
//! use gauss_types::{InitPool, Message, PoolReady};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut conn = Connection::connect("127.0.0.1:5000").await?;
//!
//!     let init = Message::from(InitPool { node_count: 2, endpoints: vec![] });
//!     let ready: PoolReady = conn.request(&init).await?;
//!     println!("{} workers ready", ready.active_node_count);
//!     Ok(())
//! }
//! ```

mod connection;
mod error;
pub mod frame;
mod manager;
mod registry;
pub mod transfer;

pub use connection::Connection;
pub use error::{Error, Result};
pub use manager::{ManagerConfig, NodeManager};
pub use registry::{NodeInfo, Registry, SharedConnection};
