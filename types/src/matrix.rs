//! Dense coefficient matrix with a right-hand side.

use crate::MatrixError;
use crate::chunk;

/// Dense `rows × columns` coefficients plus a right-hand side of length `rows`.
///
/// Each row is its own allocation. Row swaps move pointers, and bulk walks
/// (column extraction, block copies) go through rows in chunks sized by
/// [`chunk::rows_per_chunk`], so a 50,000 × 50,000 system never needs one
/// contiguous buffer.
///
/// `Clone` is a deep copy: the clone shares no storage with the original.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    columns: usize,
    data: Vec<Vec<f64>>,
    rhs: Vec<f64>,
}

/// Largest row or column count a matrix may be created with.
pub const MAX_DIMENSION: usize = 65_536;

/// Mutable view used by one elimination step: the pivot row is read-only,
/// every row below it is mutable.
pub struct PivotSplit<'a> {
    pub pivot: &'a [f64],
    pub pivot_rhs: f64,
    pub below: &'a mut [Vec<f64>],
    pub rhs_below: &'a mut [f64],
}

impl Matrix {
    /// Creates a zeroed square `size × size` system.
    pub fn new(size: usize) -> Result<Self, MatrixError> {
        Self::with_shape(size, size)
    }

    /// Creates a zeroed `rows × columns` matrix, e.g. a worker's column slice.
    pub fn with_shape(rows: usize, columns: usize) -> Result<Self, MatrixError> {
        if rows == 0 || columns == 0 {
            return Err(MatrixError::InvalidArgument(format!(
                "matrix dimensions must be positive, got {rows}x{columns}"
            )));
        }
        if rows > MAX_DIMENSION || columns > MAX_DIMENSION {
            return Err(MatrixError::InvalidArgument(format!(
                "matrix dimensions {rows}x{columns} exceed the limit of {MAX_DIMENSION}"
            )));
        }

        let mut data = Vec::new();
        data.try_reserve_exact(rows)
            .map_err(|_| out_of_memory(rows, columns))?;
        for _ in 0..rows {
            data.push(zeroed(columns).ok_or_else(|| out_of_memory(rows, columns))?);
        }
        Ok(Self {
            rows,
            columns,
            data,
            rhs: zeroed(rows).ok_or_else(|| out_of_memory(rows, columns))?,
        })
    }

    /// Builds a matrix from row vectors and a right-hand side.
    pub fn from_rows(rows: Vec<Vec<f64>>, rhs: Vec<f64>) -> Result<Self, MatrixError> {
        let columns = rows.first().map_or(0, Vec::len);
        if rows.is_empty() || columns == 0 {
            return Err(MatrixError::InvalidArgument("matrix must not be empty".into()));
        }
        if let Some(bad) = rows.iter().find(|r| r.len() != columns) {
            return Err(MatrixError::DimensionMismatch {
                expected: columns,
                actual: bad.len(),
            });
        }
        if rhs.len() != rows.len() {
            return Err(MatrixError::DimensionMismatch {
                expected: rows.len(),
                actual: rhs.len(),
            });
        }
        Ok(Self {
            rows: rows.len(),
            columns,
            data: rows,
            rhs,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn is_square(&self) -> bool {
        self.rows == self.columns
    }

    pub fn get(&self, row: usize, column: usize) -> Result<f64, MatrixError> {
        self.check_row(row)?;
        self.check_column(column)?;
        Ok(self.data[row][column])
    }

    pub fn set(&mut self, row: usize, column: usize, value: f64) -> Result<(), MatrixError> {
        self.check_row(row)?;
        self.check_column(column)?;
        self.data[row][column] = value;
        Ok(())
    }

    pub fn rhs(&self, row: usize) -> Result<f64, MatrixError> {
        self.check_row(row)?;
        Ok(self.rhs[row])
    }

    pub fn set_rhs(&mut self, row: usize, value: f64) -> Result<(), MatrixError> {
        self.check_row(row)?;
        self.rhs[row] = value;
        Ok(())
    }

    pub fn rhs_vector(&self) -> &[f64] {
        &self.rhs
    }

    pub fn set_rhs_vector(&mut self, rhs: &[f64]) -> Result<(), MatrixError> {
        if rhs.len() != self.rows {
            return Err(MatrixError::DimensionMismatch {
                expected: self.rows,
                actual: rhs.len(),
            });
        }
        self.rhs.copy_from_slice(rhs);
        Ok(())
    }

    pub fn row(&self, row: usize) -> Result<&[f64], MatrixError> {
        self.check_row(row)?;
        Ok(&self.data[row])
    }

    /// Exchanges two rows together with their right-hand-side entries.
    pub fn swap_rows(&mut self, row1: usize, row2: usize) -> Result<(), MatrixError> {
        self.check_row(row1)?;
        self.check_row(row2)?;
        if row1 == row2 {
            return Ok(());
        }
        self.data.swap(row1, row2);
        self.rhs.swap(row1, row2);
        Ok(())
    }

    /// Multiplies a row and its right-hand-side entry by `factor`.
    pub fn scale_row(&mut self, row: usize, factor: f64) -> Result<(), MatrixError> {
        self.check_row(row)?;
        for value in &mut self.data[row] {
            *value *= factor;
        }
        self.rhs[row] *= factor;
        Ok(())
    }

    /// `row[target] -= factor · row[source]`, right-hand side included.
    pub fn subtract_row(&mut self, target: usize, source: usize, factor: f64) -> Result<(), MatrixError> {
        self.check_row(target)?;
        self.check_row(source)?;
        if target == source {
            return Err(MatrixError::InvalidArgument(format!(
                "cannot subtract row {source} from itself"
            )));
        }
        let (src, dst) = if source < target {
            let (head, tail) = self.data.split_at_mut(target);
            (&head[source], &mut tail[0])
        } else {
            let (head, tail) = self.data.split_at_mut(source);
            (&tail[0], &mut head[target])
        };
        for (d, s) in dst.iter_mut().zip(src) {
            *d -= factor * s;
        }
        self.rhs[target] -= factor * self.rhs[source];
        Ok(())
    }

    pub fn row_norm(&self, row: usize) -> Result<f64, MatrixError> {
        self.check_row(row)?;
        Ok(self.data[row].iter().map(|v| v * v).sum::<f64>().sqrt())
    }

    pub fn column(&self, column: usize) -> Result<Vec<f64>, MatrixError> {
        self.column_from(column, 0)
    }

    /// Values of `column` for rows `from_row..rows`.
    pub fn column_from(&self, column: usize, from_row: usize) -> Result<Vec<f64>, MatrixError> {
        self.check_column(column)?;
        if from_row > self.rows {
            return Err(MatrixError::IndexError {
                axis: "row",
                index: from_row,
                limit: self.rows,
            });
        }
        let mut out = Vec::with_capacity(self.rows - from_row);
        for chunk in self.data[from_row..].chunks(self.chunk_rows()) {
            out.extend(chunk.iter().map(|row| row[column]));
        }
        Ok(out)
    }

    pub fn set_column(&mut self, column: usize, values: &[f64]) -> Result<(), MatrixError> {
        self.check_column(column)?;
        if values.len() != self.rows {
            return Err(MatrixError::InvalidArgument(format!(
                "column needs {} values, got {}",
                self.rows,
                values.len()
            )));
        }
        let step = self.chunk_rows();
        for (rows, values) in self.data.chunks_mut(step).zip(values.chunks(step)) {
            for (row, value) in rows.iter_mut().zip(values) {
                row[column] = *value;
            }
        }
        Ok(())
    }

    /// Column-major copy of `count` columns starting at `start`.
    pub fn column_block(&self, start: usize, count: usize) -> Result<Vec<f64>, MatrixError> {
        self.check_column_span(start, count)?;
        let mut out = Vec::with_capacity(count * self.rows);
        for column in start..start + count {
            for chunk in self.data.chunks(self.chunk_rows()) {
                out.extend(chunk.iter().map(|row| row[column]));
            }
        }
        Ok(out)
    }

    /// Writes a column-major block produced by [`Matrix::column_block`].
    pub fn set_column_block(
        &mut self,
        start: usize,
        count: usize,
        data: &[f64],
    ) -> Result<(), MatrixError> {
        self.check_column_span(start, count)?;
        if data.len() != count * self.rows {
            return Err(MatrixError::DimensionMismatch {
                expected: count * self.rows,
                actual: data.len(),
            });
        }
        for (offset, values) in data.chunks(self.rows).enumerate() {
            self.set_column(start + offset, values)?;
        }
        Ok(())
    }

    /// Splits the matrix around `pivot_row` for one elimination step.
    pub fn pivot_split(&mut self, pivot_row: usize) -> Result<PivotSplit<'_>, MatrixError> {
        self.check_row(pivot_row)?;
        let (top, below) = self.data.split_at_mut(pivot_row + 1);
        let (rhs_top, rhs_below) = self.rhs.split_at_mut(pivot_row + 1);
        Ok(PivotSplit {
            pivot: &top[pivot_row],
            pivot_rhs: rhs_top[pivot_row],
            below,
            rhs_below,
        })
    }

    /// Largest absolute residual `|A·x − b|` over all rows.
    pub fn residual(&self, x: &[f64]) -> Result<f64, MatrixError> {
        if x.len() != self.columns {
            return Err(MatrixError::DimensionMismatch {
                expected: self.columns,
                actual: x.len(),
            });
        }
        Ok(self
            .data
            .iter()
            .zip(&self.rhs)
            .map(|(row, b)| {
                let ax: f64 = row.iter().zip(x).map(|(a, x)| a * x).sum();
                (ax - b).abs()
            })
            .fold(0.0, f64::max))
    }

    fn chunk_rows(&self) -> usize {
        chunk::rows_per_chunk(self.rows, self.columns)
    }

    fn check_row(&self, row: usize) -> Result<(), MatrixError> {
        if row >= self.rows {
            return Err(MatrixError::IndexError {
                axis: "row",
                index: row,
                limit: self.rows,
            });
        }
        Ok(())
    }

    fn check_column(&self, column: usize) -> Result<(), MatrixError> {
        if column >= self.columns {
            return Err(MatrixError::IndexError {
                axis: "column",
                index: column,
                limit: self.columns,
            });
        }
        Ok(())
    }

    fn check_column_span(&self, start: usize, count: usize) -> Result<(), MatrixError> {
        if count == 0 {
            return Err(MatrixError::InvalidArgument("column block must not be empty".into()));
        }
        let end = start.checked_add(count).unwrap_or(usize::MAX);
        if end > self.columns {
            return Err(MatrixError::IndexError {
                axis: "column",
                index: end - 1,
                limit: self.columns,
            });
        }
        Ok(())
    }
}

fn zeroed(len: usize) -> Option<Vec<f64>> {
    let mut v = Vec::new();
    v.try_reserve_exact(len).ok()?;
    v.resize(len, 0.0);
    Some(v)
}

fn out_of_memory(rows: usize, columns: usize) -> MatrixError {
    MatrixError::InvalidArgument(format!("cannot allocate a {rows}x{columns} matrix"))
}
