//! Coordinator for distributed Gaussian elimination.
//!
//! The coordinator accepts client connections, provisions a pool of worker
//! nodes per client and runs distributed solves on that pool.
//!
//! # Example
//!
//! ```no_run
//! use gauss_server::{Config, Coordinator};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let coordinator = Coordinator::bind(Config::default()).await?;
//!     println!("listening on {}", coordinator.local_addr());
//!
//!     tokio::signal::ctrl_c().await?;
//!     coordinator.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod server;
mod session;

pub use config::Config;
pub use error::{Result, ServerError};
pub use server::Coordinator;
