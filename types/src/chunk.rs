//! Adaptive chunk sizing.
//!
//! Bulk matrix work (transfers, block copies, column walks) is cut into
//! chunks whose element count grows with the data but never leaves
//! `[MIN_CHUNK_ELEMENTS, MAX_CHUNK_ELEMENTS]`. The upper bound comes from
//! [`TRANSFER_BUDGET_BYTES`], so scratch memory per chunk stays fixed no
//! matter how large the system is.

/// Scratch memory allowed for one chunk of `f64` values.
pub const TRANSFER_BUDGET_BYTES: usize = 8 * 1024 * 1024;

pub const MIN_CHUNK_ELEMENTS: usize = 1024;

pub const MAX_CHUNK_ELEMENTS: usize = TRANSFER_BUDGET_BYTES / size_of::<f64>();

/// Number of `f64` elements to move per chunk when `total` elements must be moved.
pub fn chunk_elements(total: usize) -> usize {
    total.clamp(MIN_CHUNK_ELEMENTS, MAX_CHUNK_ELEMENTS)
}

/// Whole columns that fit in one transfer block of a `rows × columns` matrix.
///
/// Always at least one column, even when a single column exceeds the budget.
pub fn columns_per_block(rows: usize, columns: usize) -> usize {
    if rows == 0 || columns == 0 {
        return 1;
    }
    (chunk_elements(rows * columns) / rows).clamp(1, columns)
}

/// Whole rows that fit in one chunk of a `rows × columns` matrix.
pub fn rows_per_chunk(rows: usize, columns: usize) -> usize {
    if rows == 0 || columns == 0 {
        return 1;
    }
    (chunk_elements(rows * columns) / columns).clamp(1, rows)
}
