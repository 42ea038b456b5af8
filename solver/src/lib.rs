//! Distributed Gaussian elimination.
//!
//! `gauss-solver` splits the columns of a dense system across a pool of
//! worker nodes and runs partial-pivoted Gaussian elimination over the
//! network, one synchronised round per step. It also carries a
//! single-process reference solver and the comparison between the two.
//!
//! # Components
//!
//! - [`Partition`]: which worker owns which column
//! - [`DistributedSolver`]: the coordinator-side elimination driver
//! - [`linear`]: Gauss–Jordan reference solver
//! - [`compare`]: accuracy and speed report for the two solvers
//! - [`SolverClient`]: client for a running coordinator
//!
//! # Example
//!
//! ```no_run
//! use gauss_solver::SolverClient;
//! use gauss_types::Matrix;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = SolverClient::connect("127.0.0.1:5000").await?;
//!     client.init_pool(2, vec![]).await?;
//!
//!     let m = Matrix::from_rows(
//!         vec![vec![2.0, 1.0, -1.0], vec![-3.0, -1.0, 2.0], vec![-2.0, 1.0, 2.0]],
//!         vec![8.0, -11.0, -3.0],
//!     )?;
//!     let solution = client.solve(&m).await?;
//!     println!("x = {:?}", solution.solution);
//!     Ok(())
//! }
//! ```

mod client;
pub mod compare;
mod distributed;
mod error;
pub mod linear;
mod partition;
pub mod system;
pub mod timings;

pub use client::SolverClient;
pub use distributed::{DistributedSolver, Solved, SolverConfig};
pub use error::{Error, Result};
pub use partition::{Partition, PartitionPolicy};
pub use timings::Timings;

/// Pivots with a smaller magnitude mark the system as singular.
pub const PIVOT_TOLERANCE: f64 = 1e-10;
