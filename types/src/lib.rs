//! Shared model for distributed Gaussian elimination.
//!
//! `gauss-types` holds everything the coordinator, the workers and the
//! client have to agree on:
//!
//! - [`Matrix`]: dense coefficients plus a right-hand side, stored one row
//!   per allocation so very large systems never need a single huge buffer.
//! - [`ColumnSet`]: the columns a single worker owns.
//! - [`chunk`]: the adaptive chunk policy used for bulk copies and transfers.
//! - [`Message`] and [`Envelope`]: the tagged wire catalogue.
//!
//! # Example
//!
//! ```
//! use gauss_types::{Matrix, Message, SwapRows, Envelope};
//!
//! let mut m = Matrix::new(2).unwrap();
//! m.set(0, 0, 4.0).unwrap();
//! m.set_rhs(0, 1.0).unwrap();
//! m.swap_rows(0, 1).unwrap();
//! assert_eq!(m.get(1, 0).unwrap(), 4.0);
//!
//! let msg = Message::from(SwapRows { row1: 0, row2: 1 });
//! let bytes = Envelope::wrap(&msg, Some(3)).unwrap().encode().unwrap();
//! let back = Envelope::decode(&bytes).unwrap();
//! assert_eq!(back.node, Some(3));
//! assert_eq!(back.into_message().unwrap(), msg);
//! ```

pub mod chunk;
mod columns;
mod error;
mod matrix;
mod message;
mod report;

pub use columns::ColumnSet;
pub use error::{DecodeError, MatrixError};
pub use matrix::{MAX_DIMENSION, Matrix, PivotSplit};
pub use message::{
    ColumnBlock, ColumnValues, Complete, Eliminate, ElementValue, Envelope, GetColumn, GetElement,
    GetRow, InitColumns, InitPool, Message, NodeId, NotOwned, Outcome, PoolReady, RowSegment,
    SliceReady, Solution, SolveMode, SolveRequest, SwapRows, Sync, Synced, Tag,
};
pub use report::{Comparison, ComparisonReport, PhaseStats};
