//! Coordinator accept loop.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::StreamExt;
use gauss_link::Connection;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio_stream::wrappers::TcpListenerStream;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::session::Session;

/// A running coordinator.
///
/// Each accepted client gets its own session task and its own worker pool.
/// [`Coordinator::shutdown`] stops accepting, signals every session and
/// waits until all of them have released their pools.
pub struct Coordinator {
    addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl Coordinator {
    /// Binds `config.server.listen_addr` and starts serving.
    pub async fn bind(config: Config) -> Result<Self> {
        let listener = TcpListener::bind(&config.server.listen_addr).await?;
        Self::start(listener, config)
    }

    pub fn start(listener: TcpListener, config: Config) -> Result<Self> {
        let addr = listener.local_addr()?;
        let (shutdown, signal) = watch::channel(false);
        let task = tokio::spawn(serve(listener, Arc::new(config), signal));
        info!(%addr, "coordinator listening");
        Ok(Self { addr, shutdown, task })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "coordinator task ended abnormally");
        }
        info!("coordinator stopped");
    }
}

pub async fn serve(listener: TcpListener, config: Arc<Config>, mut shutdown: watch::Receiver<bool>) {
    let mut incoming = TcpListenerStream::new(listener);
    let mut sessions = JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            next = incoming.next() => match next {
                Some(Ok(stream)) => match Connection::new(stream) {
                    Ok(conn) => {
                        let session = Session::new(conn, Arc::clone(&config));
                        sessions.spawn(session.run(shutdown.clone()));
                    }
                    Err(e) => warn!(error = %e, "rejected client link"),
                },
                Some(Err(e)) => warn!(error = %e, "accept failed"),
                None => break,
            },
            Some(_) = sessions.join_next(), if !sessions.is_empty() => {}
        }
    }

    info!(sessions = sessions.len(), "listener closed, draining sessions");
    while sessions.join_next().await.is_some() {}
}
