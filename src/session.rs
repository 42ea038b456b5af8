//! One client connection and the worker pool it owns.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use gauss_link::{transfer, Connection, Error as LinkError, NodeManager};
use gauss_solver::compare::{self, Run};
use gauss_solver::{linear, DistributedSolver};
use gauss_types::{
    Comparison, ComparisonReport, InitPool, Matrix, Message, PoolReady, Solution, SolveMode,
    SolveRequest,
};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::Config;

pub(crate) struct Session {
    conn: Connection,
    peer: SocketAddr,
    pool: NodeManager,
    config: Arc<Config>,
}

impl Session {
    pub(crate) fn new(conn: Connection, config: Arc<Config>) -> Self {
        Self {
            peer: conn.peer(),
            pool: NodeManager::new(config.manager_config()),
            conn,
            config,
        }
    }

    /// Serves requests until the client leaves or shutdown is signalled,
    /// then releases the pool.
    pub(crate) async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(peer = %self.peer, "client connected");
        loop {
            let received = tokio::select! {
                _ = shutdown.changed() => {
                    info!(peer = %self.peer, "closing session for shutdown");
                    break;
                }
                received = self.conn.receive() => received,
            };

            let outcome = match received {
                Ok(message) => self.dispatch(message).await,
                Err(LinkError::ConnectionClosed) => break,
                Err(LinkError::ProtocolError(e)) => {
                    warn!(peer = %self.peer, error = %e, "undecodable request");
                    self.conn.send(&Message::failure(e)).await
                }
                Err(e) => Err(e),
            };
            if let Err(e) = outcome {
                warn!(peer = %self.peer, error = %e, "client link failed");
                break;
            }
        }

        self.pool.shutdown().await;
        let _ = self.conn.shutdown().await;
        info!(peer = %self.peer, "client disconnected");
    }

    async fn dispatch(&mut self, message: Message) -> Result<(), LinkError> {
        match message {
            Message::InitPool(req) => {
                let reply = self.init_pool(req).await;
                self.conn.send(&Message::from(reply)).await
            }
            Message::SolveRequest(req) => self.solve(req).await,
            // Acknowledgement of the previous reply.
            Message::Complete(_) => Ok(()),
            other => {
                debug!(peer = %self.peer, command = other.name(), "unexpected request");
                let reply = Message::failure(format!("{} is not a coordinator request", other.name()));
                self.conn.send(&reply).await
            }
        }
    }

    async fn init_pool(&mut self, req: InitPool) -> PoolReady {
        self.pool.shutdown().await;

        let endpoints = if req.endpoints.is_empty() {
            self.config.worker_endpoints(req.node_count)
        } else {
            req.endpoints
        };
        let connected = self.pool.connect_all(&endpoints).await;
        info!(
            peer = %self.peer,
            requested = endpoints.len(),
            connected = connected.len(),
            "worker pool provisioned"
        );

        if connected.is_empty() {
            return PoolReady::failed(format!(
                "no worker nodes connected out of {} requested",
                endpoints.len()
            ));
        }
        PoolReady {
            outcome: Default::default(),
            active_node_count: connected.len(),
        }
    }

    async fn solve(&mut self, req: SolveRequest) -> Result<(), LinkError> {
        let max_size = self.config.solver.max_size;
        let matrix = if req.size > max_size {
            Err(format!("system size {} exceeds the limit of {max_size}", req.size))
        } else {
            Matrix::new(req.size).map_err(|e| e.to_string())
        };
        let mut matrix = match matrix {
            Ok(m) => m,
            Err(e) => {
                // The client streams the system regardless; consume it so the
                // failure is the only reply.
                match transfer::discard_columns(&mut self.conn).await {
                    Ok(_) | Err(LinkError::ProtocolError(_)) => {}
                    Err(e) => return Err(e),
                }
                return self.reply_failure(req.mode, e).await;
            }
        };
        match transfer::receive_columns(&mut self.conn, &mut matrix).await {
            Ok(_) => {}
            Err(LinkError::ProtocolError(e)) => return self.reply_failure(req.mode, e).await,
            Err(e) => return Err(e),
        }
        debug!(peer = %self.peer, size = req.size, mode = ?req.mode, "system received");

        let reply = match req.mode {
            SolveMode::Solve => self.run_solve(&matrix).await,
            SolveMode::Compare => self.run_compare(matrix).await,
        };
        self.conn.send(&reply).await
    }

    async fn run_solve(&self, matrix: &Matrix) -> Message {
        let solver = DistributedSolver::new(&self.pool, self.config.solver_config());
        match solver.solve(matrix).await {
            Ok(solved) => Message::from(solved.into_solution()),
            Err(e) => Message::from(Solution::failed(e.to_string())),
        }
    }

    async fn run_compare(&self, matrix: Matrix) -> Message {
        match self.compare(matrix).await {
            Ok(report) => Message::from(Comparison {
                outcome: Default::default(),
                report: Some(report),
            }),
            Err(e) => Message::from(Comparison::failed(e)),
        }
    }

    async fn compare(&self, matrix: Matrix) -> Result<ComparisonReport, String> {
        let size = matrix.rows();
        let linear_input = matrix.clone();
        let started = Instant::now();
        let linear = tokio::task::spawn_blocking(move || linear::solution(&linear_input))
            .await
            .map_err(|e| e.to_string())?
            .map_err(|e| e.to_string())?;
        let linear_ms = started.elapsed().as_secs_f64() * 1000.0;

        let started = Instant::now();
        let solved = DistributedSolver::new(&self.pool, self.config.solver_config())
            .solve(&matrix)
            .await
            .map_err(|e| e.to_string())?;
        let distributed_ms = started.elapsed().as_secs_f64() * 1000.0;

        let report = compare::report(
            size,
            Run { solution: linear, elapsed_ms: linear_ms },
            Run { solution: solved.solution, elapsed_ms: distributed_ms },
            solved.timings.stats(),
        );
        info!(
            peer = %self.peer,
            size,
            speedup = report.speedup,
            max_error = report.max_error,
            solutions_match = report.solutions_match,
            "comparison finished"
        );
        Ok(report)
    }

    async fn reply_failure(&mut self, mode: SolveMode, message: String) -> Result<(), LinkError> {
        warn!(peer = %self.peer, error = %message, "solve request rejected");
        let reply = match mode {
            SolveMode::Solve => Message::from(Solution::failed(message)),
            SolveMode::Compare => Message::from(Comparison::failed(message)),
        };
        self.conn.send(&reply).await
    }
}
