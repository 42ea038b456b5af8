//! Distributed partial-pivoted Gaussian elimination.

use std::time::Instant;

use futures_util::future::join_all;
use gauss_link::NodeManager;
use gauss_types::{
    ColumnSet, ColumnValues, Complete, Eliminate, GetColumn, GetRow, InitColumns, Matrix,
    MatrixError, Message, NodeId, Outcome, RowSegment, SliceReady, Solution, SwapRows, Sync,
    Synced,
};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::partition::{Partition, PartitionPolicy};
use crate::timings::{self, Timings};
use crate::PIVOT_TOLERANCE;

#[derive(Debug, Clone, Copy)]
pub struct SolverConfig {
    pub partition: PartitionPolicy,
    pub pivot_tolerance: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            partition: PartitionPolicy::default(),
            pivot_tolerance: PIVOT_TOLERANCE,
        }
    }
}

/// Result of one distributed solve.
#[derive(Debug, Clone)]
pub struct Solved {
    pub solution: Vec<f64>,
    pub timings: Timings,
}

impl Solved {
    pub fn into_solution(self) -> Solution {
        Solution {
            outcome: Outcome::ok(),
            solution: self.solution,
            stats: self.timings.stats(),
            finished_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Worker {
    node: NodeId,
    columns: ColumnSet,
    owns_rhs: bool,
}

impl Worker {
    /// True if the worker holds any column `>= column` or the right-hand side.
    fn reaches(&self, column: usize) -> bool {
        self.owns_rhs || self.columns.last().is_some_and(|last| last >= column)
    }
}

/// Drives an elimination across the active nodes of a [`NodeManager`].
///
/// Every step is a barrier: the coordinator waits for all participating
/// workers before moving on, and the first failure aborts the solve. The
/// right-hand side is owned by the worker holding the last column; the
/// coordinator keeps a mirror of it only to hand out `pivot_rhs`.
///
/// # Example
///
/// ```no_run
/// use gauss_link::NodeManager;
/// use gauss_solver::{DistributedSolver, SolverConfig};
/// use gauss_types::Matrix;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let manager = NodeManager::default();
///     manager.connect("127.0.0.1:5001").await?;
///     manager.connect("127.0.0.1:5002").await?;
///
///     let m = Matrix::from_rows(vec![vec![4.0, 1.0], vec![1.0, 3.0]], vec![1.0, 2.0])?;
///     let solved = DistributedSolver::new(&manager, SolverConfig::default()).solve(&m).await?;
///     println!("{:?}", solved.solution);
///     Ok(())
/// }
/// ```
pub struct DistributedSolver<'a> {
    manager: &'a NodeManager,
    config: SolverConfig,
}

impl<'a> DistributedSolver<'a> {
    pub fn new(manager: &'a NodeManager, config: SolverConfig) -> Self {
        Self { manager, config }
    }

    /// Solves `matrix · x = rhs`. The input is never modified.
    pub async fn solve(&self, matrix: &Matrix) -> Result<Solved> {
        if !matrix.is_square() {
            return Err(MatrixError::InvalidArgument(format!(
                "system must be square, got {}x{}",
                matrix.rows(),
                matrix.columns()
            ))
            .into());
        }

        let nodes = self.manager.active_nodes();
        if nodes.is_empty() {
            return Err(Error::NoNodesAvailable);
        }
        let n = matrix.rows();
        let partition = Partition::new(self.config.partition, n, nodes.len());
        let rhs_owner = partition.owner_of(n - 1).ok_or(Error::NoNodesAvailable)?;
        let workers: Vec<Worker> = nodes
            .into_iter()
            .zip(partition.sets().iter().copied())
            .enumerate()
            .map(|(i, (node, columns))| Worker {
                node,
                columns,
                owns_rhs: i == rhs_owner,
            })
            .collect();

        info!(size = n, workers = workers.len(), policy = ?self.config.partition, "distributed solve started");
        let result = self.run(matrix, &partition, &workers).await;
        self.release(&workers).await;

        match result {
            Ok(solved) => {
                info!(size = n, "distributed solve finished");
                Ok(solved)
            }
            Err(e) => {
                let e = self.classify(e);
                warn!(size = n, error = %e, "distributed solve failed");
                Err(e)
            }
        }
    }

    async fn run(&self, matrix: &Matrix, partition: &Partition, workers: &[Worker]) -> Result<Solved> {
        let n = matrix.rows();
        let mut timings = Timings::new();

        let started = Instant::now();
        self.distribute(matrix, workers).await?;
        timings.record_since(timings::DISTRIBUTION, started);

        let mut rhs = matrix.rhs_vector().to_vec();
        for k in 0..n {
            let started = Instant::now();
            let owner = partition
                .owner_of(k)
                .map(|i| workers[i].node)
                .ok_or(Error::NoNodesAvailable)?;
            let reply: ColumnValues = self
                .manager
                .request(owner, &Message::from(GetColumn { column: k, from_row: k }))
                .await?;
            let mut pivot_column = reply.values;
            if pivot_column.len() != n - k {
                return Err(gauss_link::Error::ProtocolError(format!(
                    "column {k} returned {} values, expected {}",
                    pivot_column.len(),
                    n - k
                ))
                .into());
            }
            let (offset, pivot_value) = pivot_column
                .iter()
                .copied()
                .enumerate()
                .fold((0, 0.0f64), |best, (i, v)| if v.abs() > best.1.abs() { (i, v) } else { best });
            timings.record_since(timings::PIVOT_SEARCH, started);

            if pivot_value.abs() < self.config.pivot_tolerance {
                return Err(Error::SingularMatrix { step: k });
            }

            let started = Instant::now();
            let pivot_row = k + offset;
            if pivot_row != k {
                let swap = Message::from(SwapRows { row1: k, row2: pivot_row });
                self.broadcast::<Outcome>(workers.iter().map(|w| w.node), &swap).await?;
                rhs.swap(k, pivot_row);
                pivot_column.swap(0, offset);
            }

            if k + 1 < n {
                let pivot_rhs = rhs[k];
                for (i, lead) in pivot_column.iter().enumerate().skip(1) {
                    rhs[k + i] -= lead / pivot_value * pivot_rhs;
                }
                let eliminate = Message::from(Eliminate {
                    pivot_row: k,
                    pivot_value,
                    pivot_column,
                    pivot_rhs,
                });
                let participants = workers.iter().filter(|w| w.reaches(k)).map(|w| w.node);
                self.broadcast::<Outcome>(participants, &eliminate).await?;
            }
            timings.record_since(timings::ELIMINATION, started);
            debug!(step = k, pivot_row, pivot_value, "elimination step done");
        }

        let started = Instant::now();
        let solution = self.back_substitute(n, workers).await?;
        timings.record_since(timings::BACK_SUBSTITUTION, started);

        Ok(Solved { solution, timings })
    }

    /// Sends every worker its slice, then waits on a readiness barrier.
    async fn distribute(&self, matrix: &Matrix, workers: &[Worker]) -> Result<()> {
        let rows = matrix.rows();
        let loads = workers.iter().map(|w| async move {
            let init = Message::from(InitColumns {
                columns: w.columns,
                rows,
                rhs: matrix.rhs_vector().to_vec(),
                owns_rhs: w.owns_rhs,
            });
            let ready: SliceReady = self.manager.request(w.node, &init).await?;
            if ready.columns != w.columns || ready.rows != rows {
                return Err(gauss_link::Error::ProtocolError(format!(
                    "node {} acknowledged the wrong slice",
                    w.node
                )));
            }
            self.manager.upload(w.node, matrix, w.columns).await
        });
        join_all(loads)
            .await
            .into_iter()
            .collect::<std::result::Result<Vec<()>, gauss_link::Error>>()?;

        let barrier = Message::from(Sync { stage: 0, is_complete: false });
        self.broadcast::<Synced>(workers.iter().map(|w| w.node), &barrier).await?;
        Ok(())
    }

    /// Central gather: row `i` of `U` is collected from every worker holding
    /// a column `>= i` and solved on the coordinator.
    async fn back_substitute(&self, n: usize, workers: &[Worker]) -> Result<Vec<f64>> {
        let mut x = vec![0.0; n];
        for i in (0..n).rev() {
            let request = Message::from(GetRow { row: i, from_column: i });
            let participants = workers.iter().filter(|w| w.reaches(i)).map(|w| w.node);
            let segments: Vec<RowSegment> = self.broadcast(participants, &request).await?;

            let mut diagonal = None;
            let mut constant = None;
            let mut sum = 0.0;
            for segment in segments {
                for (column, value) in segment.entries {
                    if column == i {
                        diagonal = Some(value);
                    } else if column > i && column < n {
                        sum += value * x[column];
                    }
                }
                if segment.rhs.is_some() {
                    constant = segment.rhs;
                }
            }
            let (Some(diagonal), Some(constant)) = (diagonal, constant) else {
                return Err(gauss_link::Error::ProtocolError(format!(
                    "row {i} is missing its diagonal or right-hand side"
                ))
                .into());
            };
            x[i] = (constant - sum) / diagonal;
        }
        Ok(x)
    }

    /// Sends `message` to every node in `nodes` and waits for all replies.
    async fn broadcast<T>(
        &self,
        nodes: impl Iterator<Item = NodeId>,
        message: &Message,
    ) -> Result<Vec<T>>
    where
        T: TryFrom<Message, Error = Message>,
    {
        let replies = join_all(nodes.map(|node| self.manager.request::<T>(node, message))).await;
        Ok(replies
            .into_iter()
            .collect::<std::result::Result<Vec<T>, gauss_link::Error>>()?)
    }

    /// Best-effort release of every worker's slice.
    async fn release(&self, workers: &[Worker]) {
        let complete = Message::from(Complete);
        let replies = join_all(
            workers
                .iter()
                .map(|w| self.manager.request::<Outcome>(w.node, &complete)),
        )
        .await;
        let failed = replies.iter().filter(|r| r.is_err()).count();
        if failed > 0 {
            debug!(failed, "some workers did not acknowledge release");
        }
    }

    fn classify(&self, err: Error) -> Error {
        match err {
            Error::Link(gauss_link::Error::NodeUnavailable(node)) => {
                if self.manager.is_empty() {
                    Error::NoNodesAvailable
                } else {
                    Error::NodeUnavailable(node)
                }
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{linear, system};
    use gauss_link::{Connection, ManagerConfig};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::net::TcpListener;

    async fn start_test_worker() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(gauss_worker::serve(listener));
        addr
    }

    /// A worker that drops its link after answering `replies` commands.
    /// The counter tracks how many `Eliminate` steps it applied.
    async fn start_flaky_worker(replies: usize) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let eliminated = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&eliminated);
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut conn = Connection::new(stream).unwrap();
            let mut node = gauss_worker::Node::new();
            let mut answered = 0;
            while answered < replies {
                let Ok(message) = conn.receive().await else { return };
                if matches!(message, Message::Eliminate(_)) {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
                let reply = match node.handle(message) {
                    Ok(reply) => reply,
                    Err(e) => Some(Message::failure(e.to_string())),
                };
                if let Some(reply) = reply {
                    conn.send(&reply).await.unwrap();
                    answered += 1;
                }
            }
        });
        (addr, eliminated)
    }

    async fn pool(workers: usize) -> NodeManager {
        let manager = NodeManager::new(ManagerConfig {
            request_timeout: Duration::from_secs(5),
            ..ManagerConfig::default()
        });
        for _ in 0..workers {
            manager.connect(&start_test_worker().await).await.unwrap();
        }
        manager
    }

    fn three_by_three() -> Matrix {
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

    fn assert_close(a: &[f64], b: &[f64], tolerance: f64) {
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b) {
            assert!((x - y).abs() <= tolerance, "{a:?} vs {b:?}");
        }
    }

    #[tokio::test]
    async fn test_three_by_three_on_two_workers() {
        let manager = pool(2).await;
        let m = three_by_three();
        let before = m.clone();

        for partition in [PartitionPolicy::Contiguous, PartitionPolicy::Striped] {
            let config = SolverConfig { partition, ..SolverConfig::default() };
            let solved = DistributedSolver::new(&manager, config).solve(&m).await.unwrap();
            assert_close(&solved.solution, &linear::solution(&m).unwrap(), 1e-9);
            assert_close(&solved.solution, &[2.0, 3.0, -1.0], 1e-9);
        }
        assert_eq!(m, before);
    }

    #[tokio::test]
    async fn test_random_system_matches_linear() {
        let manager = pool(3).await;
        let m = system::diagonally_dominant(24, &mut rand::thread_rng()).unwrap();

        let solved = DistributedSolver::new(&manager, SolverConfig::default())
            .solve(&m)
            .await
            .unwrap();
        assert_close(&solved.solution, &linear::solution(&m).unwrap(), 1e-6);

        let stats = solved.timings.stats();
        assert_eq!(stats[timings::PIVOT_SEARCH].count, 24);
        assert_eq!(stats[timings::DISTRIBUTION].count, 1);
        assert!(stats.contains_key(timings::BACK_SUBSTITUTION));
    }

    #[tokio::test]
    async fn test_pivoting_is_required() {
        let manager = pool(2).await;
        let m = Matrix::from_rows(
            vec![vec![0.0, 2.0, 1.0], vec![1.0, 1.0, 1.0], vec![2.0, 1.0, 0.0]],
            vec![5.0, 6.0, 4.0],
        )
        .unwrap();
        let solved = DistributedSolver::new(&manager, SolverConfig::default())
            .solve(&m)
            .await
            .unwrap();
        assert!(m.residual(&solved.solution).unwrap() < 1e-9);
    }

    #[tokio::test]
    async fn test_more_workers_than_columns() {
        let manager = pool(4).await;
        let m = Matrix::from_rows(vec![vec![3.0, 1.0], vec![1.0, 2.0]], vec![9.0, 8.0]).unwrap();
        let solved = DistributedSolver::new(&manager, SolverConfig::default())
            .solve(&m)
            .await
            .unwrap();
        assert_close(&solved.solution, &[2.0, 3.0], 1e-9);
    }

    #[tokio::test]
    async fn test_workers_are_reusable_across_sizes() {
        let manager = pool(2).await;
        let solver = DistributedSolver::new(&manager, SolverConfig::default());
        solver.solve(&three_by_three()).await.unwrap();
        let m = system::diagonally_dominant(7, &mut rand::thread_rng()).unwrap();
        let solved = solver.solve(&m).await.unwrap();
        assert!(m.residual(&solved.solution).unwrap() < 1e-9);
    }

    #[tokio::test]
    async fn test_singular_matrix() {
        let manager = pool(2).await;
        let m = Matrix::from_rows(
            vec![vec![1.0, 2.0, 3.0], vec![2.0, 4.0, 6.0], vec![1.0, 0.0, 1.0]],
            vec![1.0, 2.0, 3.0],
        )
        .unwrap();
        let err = DistributedSolver::new(&manager, SolverConfig::default())
            .solve(&m)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SingularMatrix { .. }), "{err}");
        assert_eq!(manager.len(), 2);
    }

    #[tokio::test]
    async fn test_no_nodes() {
        let manager = NodeManager::default();
        let err = DistributedSolver::new(&manager, SolverConfig::default())
            .solve(&three_by_three())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoNodesAvailable));
    }

    #[tokio::test]
    async fn test_lost_worker_fails_the_solve() {
        let manager = pool(1).await;
        // InitColumns, last ColumnBlock and the Sync barrier, then gone.
        let (addr, _) = start_flaky_worker(3).await;
        manager.connect(&addr).await.unwrap();

        let m = system::diagonally_dominant(6, &mut rand::thread_rng()).unwrap();
        let result = tokio::time::timeout(
            Duration::from_secs(10),
            DistributedSolver::new(&manager, SolverConfig::default()).solve(&m),
        )
        .await
        .expect("solve must not hang");
        assert!(matches!(result, Err(Error::NodeUnavailable(_))), "{result:?}");
        assert_eq!(manager.len(), 1);
    }

    #[tokio::test]
    async fn test_worker_lost_between_elimination_steps() {
        let manager = pool(1).await;
        // The second node owns the trailing columns and the rhs, so it takes
        // part in every step. After distribution it answers four more
        // commands (swaps or eliminations) and drops out before step 5.
        let (addr, eliminated) = start_flaky_worker(3 + 4).await;
        let flaky = manager.connect(&addr).await.unwrap();

        let m = system::diagonally_dominant(12, &mut rand::thread_rng()).unwrap();
        let result = tokio::time::timeout(
            Duration::from_secs(10),
            DistributedSolver::new(&manager, SolverConfig::default()).solve(&m),
        )
        .await
        .expect("solve must not hang");

        assert!(matches!(result, Err(Error::NodeUnavailable(id)) if id == flaky), "{result:?}");
        let steps = eliminated.load(Ordering::SeqCst);
        assert!((2..=4).contains(&steps), "dropped after {steps} eliminations");
        assert_eq!(manager.active_nodes().len(), 1);
    }

    #[tokio::test]
    async fn test_losing_the_only_worker() {
        let manager = NodeManager::default();
        let (addr, _) = start_flaky_worker(1).await;
        manager.connect(&addr).await.unwrap();
        let err = DistributedSolver::new(&manager, SolverConfig::default())
            .solve(&three_by_three())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoNodesAvailable), "{err}");
    }

    #[test]
    fn test_non_square_is_rejected() {
        let manager = NodeManager::default();
        let m = Matrix::with_shape(2, 3).unwrap();
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let err = rt
            .block_on(DistributedSolver::new(&manager, SolverConfig::default()).solve(&m))
            .unwrap_err();
        assert!(matches!(err, Error::Matrix(_)));
    }
}
