//! Client side of the coordinator protocol.

use gauss_link::{Connection, transfer};
use gauss_types::{
    ColumnSet, Comparison, ComparisonReport, Complete, InitPool, Matrix, Message, PoolReady,
    Solution, SolveMode, SolveRequest,
};
use tracing::debug;

use crate::error::{Error, Result};

/// Connection to a coordinator.
///
/// Every call consumes exactly one reply and acknowledges it with
/// `Complete`. A reply with a failed base result becomes
/// [`Error::Rejected`] carrying the coordinator's message unchanged.
pub struct SolverClient {
    conn: Connection,
}

impl SolverClient {
    pub async fn connect(addr: &str) -> Result<Self> {
        Ok(Self {
            conn: Connection::connect(addr).await?,
        })
    }

    /// Provisions the session's worker pool. With no `endpoints` the
    /// coordinator uses its configured host and port range.
    pub async fn init_pool(&mut self, node_count: usize, endpoints: Vec<String>) -> Result<usize> {
        let init = Message::from(InitPool { node_count, endpoints });
        self.conn.send(&init).await?;
        let ready: PoolReady = self.finish().await?;
        Ok(ready.active_node_count)
    }

    pub async fn solve(&mut self, matrix: &Matrix) -> Result<Solution> {
        self.submit(matrix, SolveMode::Solve).await?;
        self.finish().await
    }

    pub async fn compare(&mut self, matrix: &Matrix) -> Result<ComparisonReport> {
        self.submit(matrix, SolveMode::Compare).await?;
        let comparison: Comparison = self.finish().await?;
        comparison.report.ok_or_else(|| {
            gauss_link::Error::ProtocolError("comparison reply carries no report".into()).into()
        })
    }

    async fn submit(&mut self, matrix: &Matrix, mode: SolveMode) -> Result<()> {
        let size = matrix.rows();
        self.conn
            .send(&Message::from(SolveRequest { size, mode }))
            .await?;
        let blocks = transfer::send_columns(
            &mut self.conn,
            matrix,
            ColumnSet::Range { start: 0, count: matrix.columns() },
            Some(matrix.rhs_vector()),
        )
        .await?;
        debug!(size, blocks, ?mode, "system submitted");
        Ok(())
    }

    async fn finish<T>(&mut self) -> Result<T>
    where
        T: TryFrom<Message, Error = Message>,
    {
        let reply = self.conn.receive().await?;
        self.conn.send(&Message::from(Complete)).await?;

        if let Some(outcome) = reply.outcome() {
            if !outcome.is_success {
                return Err(Error::Rejected(outcome.message().to_string()));
            }
        }
        T::try_from(reply).map_err(|other| {
            gauss_link::Error::ProtocolError(format!("unexpected {} reply", other.name())).into()
        })
    }
}
