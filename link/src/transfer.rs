//! Bulk column transfer.
//!
//! A set of columns travels as a sequence of [`ColumnBlock`] frames, each
//! holding whole columns in column-major order. Block indices are local to
//! the column set being sent, so a striped worker slice and a full matrix
//! are transferred the same way. The right-hand side rides on the first
//! block only.

use gauss_types::{ColumnBlock, ColumnSet, Matrix, Message, chunk};

use crate::connection::Connection;
use crate::error::{Error, Result};

/// Cuts the columns of `matrix` named by `columns` into transfer blocks.
///
/// The constants, if any, ride on the first block.
pub struct Blocks<'a> {
    matrix: &'a Matrix,
    columns: ColumnSet,
    per_block: usize,
    next: usize,
    constants: Option<Vec<f64>>,
}

impl<'a> Blocks<'a> {
    pub fn new(matrix: &'a Matrix, columns: ColumnSet, constants: Option<&[f64]>) -> Result<Self> {
        let total = columns.len();
        if total == 0 {
            return Err(Error::ProtocolError("column set is empty".into()));
        }
        Ok(Self {
            matrix,
            columns,
            per_block: chunk::columns_per_block(matrix.rows(), total),
            next: 0,
            constants: constants.map(<[f64]>::to_vec),
        })
    }
}

impl Iterator for Blocks<'_> {
    type Item = Result<ColumnBlock>;

    fn next(&mut self) -> Option<Self::Item> {
        let total = self.columns.len();
        if self.next >= total {
            return None;
        }
        let start = self.next;
        let count = self.per_block.min(total - start);
        self.next += count;

        let block = gather(self.matrix, self.columns, start, count).map(|data| ColumnBlock {
            start_column: start,
            column_count: count,
            data,
            constants: self.constants.take(),
            is_last_block: start + count == total,
        });
        Some(block)
    }
}

/// Streams the columns of `matrix` named by `columns`.
pub async fn send_columns(
    conn: &mut Connection,
    matrix: &Matrix,
    columns: ColumnSet,
    constants: Option<&[f64]>,
) -> Result<usize> {
    let mut blocks = 0;
    for block in Blocks::new(matrix, columns, constants)? {
        conn.send(&Message::from(block?)).await?;
        blocks += 1;
    }
    Ok(blocks)
}

/// Reads blocks into `target` until the last one arrives.
///
/// Returns the constants carried by the first block, if any. A bad block
/// does not end the read early: the rest of the stream is consumed up to the
/// last block, so the link stays in step with the sender, and the first
/// error is returned afterwards.
pub async fn receive_columns(conn: &mut Connection, target: &mut Matrix) -> Result<Option<Vec<f64>>> {
    let mut next = 0;
    let mut constants = None;
    let mut failure = None;
    loop {
        let block = next_block(conn).await?;
        if failure.is_none() {
            if next == 0 {
                constants = block.constants.clone();
            }
            match apply_block(target, &block, next) {
                Ok(n) => next = n,
                Err(e) => failure = Some(e),
            }
        }
        if block.is_last_block {
            break;
        }
    }
    if let Some(e) = failure {
        return Err(e);
    }
    if next != target.columns() {
        return Err(Error::ProtocolError(format!(
            "transfer ended after {next} of {} columns",
            target.columns()
        )));
    }
    if let Some(rhs) = &constants {
        target
            .set_rhs_vector(rhs)
            .map_err(|e| Error::ProtocolError(e.to_string()))?;
    }
    Ok(constants)
}

/// Reads and drops blocks up to and including the last one.
pub async fn discard_columns(conn: &mut Connection) -> Result<usize> {
    let mut blocks = 0;
    loop {
        let block = next_block(conn).await?;
        blocks += 1;
        if block.is_last_block {
            return Ok(blocks);
        }
    }
}

async fn next_block(conn: &mut Connection) -> Result<ColumnBlock> {
    conn.receive().await?.try_into().map_err(|other: Message| {
        Error::ProtocolError(format!("expected ColumnBlock, got {}", other.name()))
    })
}

/// Writes one block at local column `expected_start` and returns the next
/// expected start.
pub fn apply_block(target: &mut Matrix, block: &ColumnBlock, expected_start: usize) -> Result<usize> {
    if block.start_column != expected_start {
        return Err(Error::ProtocolError(format!(
            "block starts at column {}, expected {expected_start}",
            block.start_column
        )));
    }
    target
        .set_column_block(block.start_column, block.column_count, &block.data)
        .map_err(|e| Error::ProtocolError(e.to_string()))?;
    Ok(expected_start + block.column_count)
}

fn gather(matrix: &Matrix, columns: ColumnSet, start: usize, count: usize) -> Result<Vec<f64>> {
    let protocol = |e: gauss_types::MatrixError| Error::ProtocolError(e.to_string());
    match columns {
        ColumnSet::Range { start: first, .. } => {
            matrix.column_block(first + start, count).map_err(protocol)
        }
        ColumnSet::Stride { .. } => {
            let mut data = Vec::with_capacity(count * matrix.rows());
            for local in start..start + count {
                let column = columns
                    .global_index(local)
                    .ok_or_else(|| Error::ProtocolError(format!("no local column {local}")))?;
                data.extend(matrix.column(column).map_err(protocol)?);
            }
            Ok(data)
        }
    }
}
