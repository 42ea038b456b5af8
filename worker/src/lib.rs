//! Worker node for distributed Gaussian elimination.
//!
//! A worker holds a subset of the columns of `A` and applies the
//! coordinator's commands to them: row swaps, elimination steps and reads
//! for pivot search and back-substitution. Each coordinator link gets its
//! own [`Node`].

mod error;
mod node;
mod session;

pub use error::NodeError;
pub use node::{Node, NodeState};
pub use session::{run_session, serve};
