//! Column-slice state machine.

use gauss_link::transfer;
use gauss_types::{
    ColumnBlock, ColumnSet, ColumnValues, Eliminate, ElementValue, GetColumn, GetElement, GetRow,
    InitColumns, Matrix, MatrixError, Message, NotOwned, Outcome, PivotSplit, RowSegment, SliceReady,
    SwapRows, Sync, Synced,
};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::error::NodeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Idle,
    /// Slice allocated, column blocks still arriving.
    Loading,
    Active,
    Closed,
}

struct Slice {
    columns: ColumnSet,
    /// `rows × columns.len()`; local column `i` is global `columns.global_index(i)`.
    data: Matrix,
    owns_rhs: bool,
    next_block: usize,
    load_error: Option<String>,
}

/// One worker's view of the system: the columns it owns plus, on the rhs
/// owner, the right-hand side.
pub struct Node {
    state: NodeState,
    slice: Option<Slice>,
}

impl Node {
    pub fn new() -> Self {
        Self {
            state: NodeState::Idle,
            slice: None,
        }
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn close(&mut self) {
        self.slice = None;
        self.state = NodeState::Closed;
    }

    /// Applies one command. `Ok(None)` means the command takes no reply
    /// (every column block except the last).
    pub fn handle(&mut self, message: Message) -> Result<Option<Message>, NodeError> {
        if self.state == NodeState::Closed {
            return Err(NodeError::InvalidState("node is closed".into()));
        }
        let reply = match message {
            Message::InitColumns(init) => self.init_columns(init)?,
            Message::ColumnBlock(block) => return self.load_block(block),
            Message::GetColumn(req) => self.get_column(req)?,
            Message::GetElement(req) => self.get_element(req)?,
            Message::GetRow(req) => self.get_row(req)?,
            Message::SwapRows(req) => self.swap_rows(req)?,
            Message::Eliminate(req) => self.eliminate(req)?,
            Message::Sync(req) => self.sync(req),
            Message::Complete(_) => self.complete(),
            other => {
                return Err(NodeError::InvalidState(format!(
                    "{} is not a worker command",
                    other.name()
                )));
            }
        };
        Ok(Some(reply))
    }

    fn init_columns(&mut self, init: InitColumns) -> Result<Message, NodeError> {
        if let Some(slice) = &self.slice {
            if slice.columns != init.columns {
                return Err(NodeError::InvalidState(format!(
                    "already initialised for {:?}",
                    slice.columns
                )));
            }
        }

        // The rhs is already in hand, so it bounds the row count before any
        // allocation happens.
        if init.rhs.len() != init.rows {
            return Err(MatrixError::DimensionMismatch {
                expected: init.rows,
                actual: init.rhs.len(),
            }
            .into());
        }
        if init.columns.len() > init.rows {
            return Err(NodeError::InvalidState(format!(
                "slice of {} columns is wider than the {}-row system",
                init.columns.len(),
                init.rows
            )));
        }
        let mut data = Matrix::with_shape(init.rows, init.columns.len())?;
        data.set_rhs_vector(&init.rhs)?;
        info!(
            columns = init.columns.len(),
            rows = init.rows,
            owns_rhs = init.owns_rhs,
            "slice allocated"
        );

        self.slice = Some(Slice {
            columns: init.columns,
            data,
            owns_rhs: init.owns_rhs,
            next_block: 0,
            load_error: None,
        });
        self.state = NodeState::Loading;
        Ok(Message::from(SliceReady {
            outcome: Outcome::ok(),
            columns: init.columns,
            rows: init.rows,
        }))
    }

    fn load_block(&mut self, block: ColumnBlock) -> Result<Option<Message>, NodeError> {
        let last = block.is_last_block;
        let slice = match (&mut self.slice, self.state) {
            (Some(slice), NodeState::Loading) => slice,
            _ if last => {
                return Err(NodeError::InvalidState("column data outside a load".into()));
            }
            _ => return Ok(None),
        };

        if slice.load_error.is_none() {
            match transfer::apply_block(&mut slice.data, &block, slice.next_block) {
                Ok(next) => slice.next_block = next,
                Err(e) => slice.load_error = Some(e.to_string()),
            }
        }
        if !last {
            return Ok(None);
        }

        let expected = slice.columns.len();
        let failure = match slice.load_error.take() {
            Some(e) => Some(e),
            None if slice.next_block != expected => Some(format!(
                "slice load ended after {} of {expected} columns",
                slice.next_block
            )),
            None => None,
        };
        match failure {
            Some(e) => {
                self.release();
                Err(NodeError::InvalidState(e))
            }
            None => {
                debug!(columns = expected, "slice loaded");
                self.state = NodeState::Active;
                Ok(Some(Message::ack()))
            }
        }
    }

    fn get_column(&self, req: GetColumn) -> Result<Message, NodeError> {
        let slice = self.active()?;
        let Some(local) = slice.columns.local_index(req.column) else {
            return Ok(not_owned(req.column));
        };
        Ok(Message::from(ColumnValues {
            outcome: Outcome::ok(),
            column: req.column,
            from_row: req.from_row,
            values: slice.data.column_from(local, req.from_row)?,
        }))
    }

    fn get_element(&self, req: GetElement) -> Result<Message, NodeError> {
        let slice = self.active()?;
        let Some(local) = slice.columns.local_index(req.column) else {
            return Ok(not_owned(req.column));
        };
        Ok(Message::from(ElementValue {
            outcome: Outcome::ok(),
            row: req.row,
            column: req.column,
            value: slice.data.get(req.row, local)?,
        }))
    }

    fn get_row(&self, req: GetRow) -> Result<Message, NodeError> {
        let slice = self.active()?;
        let row = slice.data.row(req.row)?;
        let first = slice.columns.first_local_at_or_after(req.from_column);
        let entries = (first..slice.columns.len())
            .filter_map(|local| Some((slice.columns.global_index(local)?, row[local])))
            .collect();
        let rhs = if slice.owns_rhs {
            Some(slice.data.rhs(req.row)?)
        } else {
            None
        };
        Ok(Message::from(RowSegment {
            outcome: Outcome::ok(),
            row: req.row,
            entries,
            rhs,
        }))
    }

    fn swap_rows(&mut self, req: SwapRows) -> Result<Message, NodeError> {
        self.active_mut()?.data.swap_rows(req.row1, req.row2)?;
        Ok(Message::ack())
    }

    /// Subtracts `factor · pivot row` from every row below the pivot, over
    /// the owned columns at or right of the pivot column.
    fn eliminate(&mut self, req: Eliminate) -> Result<Message, NodeError> {
        let slice = self.active_mut()?;
        let rows = slice.data.rows();
        if req.pivot_row >= rows {
            return Err(MatrixError::IndexError {
                axis: "row",
                index: req.pivot_row,
                limit: rows,
            }
            .into());
        }
        if req.pivot_column.len() != rows - req.pivot_row {
            return Err(MatrixError::DimensionMismatch {
                expected: rows - req.pivot_row,
                actual: req.pivot_column.len(),
            }
            .into());
        }
        if req.pivot_value == 0.0 {
            return Err(MatrixError::InvalidArgument("pivot value is zero".into()).into());
        }

        let first = slice.columns.first_local_at_or_after(req.pivot_row);
        let owns_rhs = slice.owns_rhs;
        let PivotSplit {
            pivot,
            below,
            rhs_below,
            ..
        } = slice.data.pivot_split(req.pivot_row)?;
        let below_column = &req.pivot_column[1..];

        below
            .par_iter_mut()
            .zip(rhs_below.par_iter_mut())
            .zip(below_column.par_iter())
            .for_each(|((row, rhs), lead)| {
                let factor = lead / req.pivot_value;
                if factor == 0.0 {
                    return;
                }
                for (value, p) in row[first..].iter_mut().zip(&pivot[first..]) {
                    *value -= factor * p;
                }
                if owns_rhs {
                    *rhs -= factor * req.pivot_rhs;
                }
            });
        Ok(Message::ack())
    }

    fn sync(&self, req: Sync) -> Message {
        Message::from(Synced {
            outcome: Outcome::ok(),
            stage: req.stage,
            is_complete: req.is_complete,
        })
    }

    fn complete(&mut self) -> Message {
        if self.slice.is_some() {
            debug!("slice released");
        }
        self.release();
        Message::ack()
    }

    fn release(&mut self) {
        self.slice = None;
        self.state = NodeState::Idle;
    }

    fn active(&self) -> Result<&Slice, NodeError> {
        match (&self.slice, self.state) {
            (Some(slice), NodeState::Active) => Ok(slice),
            (_, state) => Err(NodeError::InvalidState(format!("no loaded slice ({state:?})"))),
        }
    }

    fn active_mut(&mut self) -> Result<&mut Slice, NodeError> {
        match (&mut self.slice, self.state) {
            (Some(slice), NodeState::Active) => Ok(slice),
            (_, state) => Err(NodeError::InvalidState(format!("no loaded slice ({state:?})"))),
        }
    }
}

impl Default for Node {
    fn default() -> Self {
        Self::new()
    }
}

fn not_owned(column: usize) -> Message {
    Message::from(NotOwned {
        outcome: Outcome::failed(format!("column {column} is not owned by this node")),
        column,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use gauss_types::Complete;

    // 3x3 system:
    //  2  1 -1 |  8
    // -3 -1  2 | -11
    // -2  1  2 | -3
    fn system() -> Matrix {
        Matrix::from_rows(
            vec![
                vec![2.0, 1.0, -1.0],
                vec![-3.0, -1.0, 2.0],
                vec![-2.0, 1.0, 2.0],
            ],
            vec![8.0, -11.0, -3.0],
        )
        .unwrap()
    }

    fn loaded(columns: ColumnSet, owns_rhs: bool) -> Node {
        let m = system();
        let mut node = Node::new();
        node.handle(Message::from(InitColumns {
            columns,
            rows: 3,
            rhs: m.rhs_vector().to_vec(),
            owns_rhs,
        }))
        .unwrap();
        let data = columns
            .iter()
            .flat_map(|c| m.column(c).unwrap())
            .collect();
        let reply = node
            .handle(Message::from(ColumnBlock {
                start_column: 0,
                column_count: columns.len(),
                data,
                constants: None,
                is_last_block: true,
            }))
            .unwrap();
        assert_eq!(reply, Some(Message::ack()));
        assert_eq!(node.state(), NodeState::Active);
        node
    }

    fn column(node: &mut Node, column: usize) -> Message {
        node.handle(Message::from(GetColumn { column, from_row: 0 }))
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_init_and_load() {
        let mut node = Node::new();
        let init = InitColumns {
            columns: ColumnSet::Range { start: 0, count: 2 },
            rows: 3,
            rhs: vec![0.0; 3],
            owns_rhs: false,
        };
        let reply = node.handle(Message::from(init)).unwrap().unwrap();
        assert!(matches!(reply, Message::SliceReady(ref r) if r.rows == 3));
        assert_eq!(node.state(), NodeState::Loading);

        let first = ColumnBlock {
            start_column: 0,
            column_count: 1,
            data: vec![1.0, 2.0, 3.0],
            constants: None,
            is_last_block: false,
        };
        assert_eq!(node.handle(Message::from(first)).unwrap(), None);
        assert_eq!(node.state(), NodeState::Loading);
    }

    #[test]
    fn test_oversized_slice_is_rejected() {
        let mut node = Node::new();
        let huge_rows = InitColumns {
            columns: ColumnSet::Range { start: 0, count: 2 },
            rows: 1 << 62,
            rhs: vec![0.0; 3],
            owns_rhs: false,
        };
        assert!(matches!(
            node.handle(Message::from(huge_rows)),
            Err(NodeError::Matrix(MatrixError::DimensionMismatch { .. }))
        ));

        let huge_columns = InitColumns {
            columns: ColumnSet::Range { start: 0, count: 1 << 62 },
            rows: 3,
            rhs: vec![0.0; 3],
            owns_rhs: false,
        };
        assert!(matches!(
            node.handle(Message::from(huge_columns)),
            Err(NodeError::InvalidState(_))
        ));
        assert_eq!(node.state(), NodeState::Idle);
    }

    #[test]
    fn test_short_load_fails_and_resets() {
        let mut node = Node::new();
        node.handle(Message::from(InitColumns {
            columns: ColumnSet::Range { start: 0, count: 2 },
            rows: 2,
            rhs: vec![0.0; 2],
            owns_rhs: false,
        }))
        .unwrap();
        let only = ColumnBlock {
            start_column: 0,
            column_count: 1,
            data: vec![1.0, 2.0],
            constants: None,
            is_last_block: true,
        };
        assert!(matches!(
            node.handle(Message::from(only)),
            Err(NodeError::InvalidState(_))
        ));
        assert_eq!(node.state(), NodeState::Idle);
    }

    #[test]
    fn test_reinit_with_other_columns_is_rejected() {
        let mut node = loaded(ColumnSet::Range { start: 0, count: 2 }, false);
        let other = InitColumns {
            columns: ColumnSet::Range { start: 2, count: 1 },
            rows: 3,
            rhs: vec![0.0; 3],
            owns_rhs: true,
        };
        assert!(matches!(
            node.handle(Message::from(other)),
            Err(NodeError::InvalidState(_))
        ));

        let same = InitColumns {
            columns: ColumnSet::Range { start: 0, count: 2 },
            rows: 3,
            rhs: vec![0.0; 3],
            owns_rhs: false,
        };
        node.handle(Message::from(same)).unwrap();
        assert_eq!(node.state(), NodeState::Loading);
    }

    #[test]
    fn test_commands_before_load_are_rejected() {
        let mut node = Node::new();
        for msg in [
            Message::from(GetColumn { column: 0, from_row: 0 }),
            Message::from(SwapRows { row1: 0, row2: 1 }),
            Message::from(GetRow { row: 0, from_column: 0 }),
        ] {
            assert!(matches!(node.handle(msg), Err(NodeError::InvalidState(_))));
        }
        // Sync and Complete are always answered.
        assert!(node.handle(Message::from(Sync { stage: 0, is_complete: false })).is_ok());
        assert!(node.handle(Message::from(Complete)).is_ok());
    }

    #[test]
    fn test_unowned_column_is_explicit() {
        let mut node = loaded(ColumnSet::Range { start: 0, count: 2 }, false);
        match column(&mut node, 2) {
            Message::NotOwned(n) => {
                assert_eq!(n.column, 2);
                assert!(!n.outcome.is_success);
            }
            other => panic!("expected NotOwned, got {other:?}"),
        }
        let reply = node
            .handle(Message::from(GetElement { row: 0, column: 2 }))
            .unwrap()
            .unwrap();
        assert!(matches!(reply, Message::NotOwned(_)));
    }

    #[test]
    fn test_striped_slice_answers_by_global_column() {
        let mut node = loaded(ColumnSet::Stride { first: 1, step: 2, count: 1 }, false);
        match column(&mut node, 1) {
            Message::ColumnValues(v) => assert_eq!(v.values, vec![1.0, -1.0, 1.0]),
            other => panic!("unexpected {other:?}"),
        }
        let reply = node
            .handle(Message::from(GetElement { row: 2, column: 1 }))
            .unwrap()
            .unwrap();
        assert!(matches!(reply, Message::ElementValue(ref e) if e.value == 1.0));
    }

    #[test]
    fn test_swap_and_eliminate() {
        let mut node = loaded(ColumnSet::Range { start: 1, count: 2 }, true);
        node.handle(Message::from(SwapRows { row1: 0, row2: 1 })).unwrap();

        // After the swap the pivot column (column 0) reads [-3, 2, -2].
        node.handle(Message::from(Eliminate {
            pivot_row: 0,
            pivot_value: -3.0,
            pivot_column: vec![-3.0, 2.0, -2.0],
            pivot_rhs: -11.0,
        }))
        .unwrap();

        let reply = node
            .handle(Message::from(GetRow { row: 1, from_column: 1 }))
            .unwrap()
            .unwrap();
        let Message::RowSegment(seg) = reply else {
            panic!("expected RowSegment");
        };
        // Row 1 was [2, 1, -1 | 8]; factor = -2/3.
        let (c1, v1) = seg.entries[0];
        let (c2, v2) = seg.entries[1];
        assert_eq!((c1, c2), (1, 2));
        assert!((v1 - (1.0 - 2.0 / 3.0)).abs() < 1e-12);
        assert!((v2 - (-1.0 + 4.0 / 3.0)).abs() < 1e-12);
        assert!((seg.rhs.unwrap() - (8.0 - 22.0 / 3.0)).abs() < 1e-12);
    }

    #[test]
    fn test_only_rhs_owner_updates_rhs() {
        let mut node = loaded(ColumnSet::Range { start: 0, count: 1 }, false);
        node.handle(Message::from(Eliminate {
            pivot_row: 0,
            pivot_value: 2.0,
            pivot_column: vec![2.0, -3.0, -2.0],
            pivot_rhs: 8.0,
        }))
        .unwrap();
        let Some(Message::RowSegment(seg)) = node
            .handle(Message::from(GetRow { row: 1, from_column: 0 }))
            .unwrap()
        else {
            panic!("expected RowSegment");
        };
        assert_eq!(seg.rhs, None);
        assert!(seg.entries[0].1.abs() < 1e-12);
    }

    #[test]
    fn test_eliminate_rejects_bad_pivot_column() {
        let mut node = loaded(ColumnSet::Range { start: 0, count: 3 }, true);
        let bad = Eliminate {
            pivot_row: 1,
            pivot_value: 1.0,
            pivot_column: vec![1.0],
            pivot_rhs: 0.0,
        };
        assert!(matches!(node.handle(Message::from(bad)), Err(NodeError::Matrix(_))));
    }

    #[test]
    fn test_complete_releases_slice() {
        let mut node = loaded(ColumnSet::Range { start: 0, count: 3 }, true);
        node.handle(Message::from(Complete)).unwrap();
        assert_eq!(node.state(), NodeState::Idle);
        assert!(node.handle(Message::from(GetColumn { column: 0, from_row: 0 })).is_err());

        node.close();
        assert!(node.handle(Message::from(Sync { stage: 1, is_complete: true })).is_err());
    }
}
