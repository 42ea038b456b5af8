//! Accept loop and per-connection command dispatch.

use gauss_link::{Connection, Error};
use gauss_types::Message;
use tokio::net::TcpListener;
use tokio::task::JoinError;
use tracing::{error, info, warn};

use crate::error::NodeError;
use crate::node::Node;

type Handled = (Node, Result<Option<Message>, NodeError>);

/// Serves coordinator links on `listener` until the task is dropped.
pub async fn serve(listener: TcpListener) -> std::io::Result<()> {
    info!(addr = %listener.local_addr()?, "worker listening");
    loop {
        let (stream, peer) = listener.accept().await?;
        let conn = match Connection::new(stream) {
            Ok(conn) => conn,
            Err(e) => {
                warn!(%peer, error = %e, "rejected link");
                continue;
            }
        };
        info!(%peer, "coordinator connected");
        tokio::spawn(async move {
            if let Err(e) = run_session(conn).await {
                error!(%peer, error = %e, "session failed");
            }
        });
    }
}

/// Runs one coordinator link to completion. Each link gets a fresh node.
pub async fn run_session(mut conn: Connection) -> Result<(), Error> {
    let peer = conn.peer();
    let mut node = Node::new();

    let result = loop {
        let message = match conn.receive().await {
            Ok(message) => message,
            Err(Error::ConnectionClosed) => break Ok(()),
            Err(Error::ProtocolError(e)) => {
                warn!(%peer, error = %e, "undecodable command");
                conn.send(&Message::failure(e)).await?;
                continue;
            }
            Err(e) => break Err(e),
        };

        let command = message.name();
        let (returned, handled) = match dispatch(node, message).await {
            Ok(pair) => pair,
            Err(e) => {
                error!(%peer, command, error = %e, "command task failed");
                return Err(Error::Io(std::io::Error::other(e)));
            }
        };
        node = returned;
        let reply = match handled {
            Ok(reply) => reply,
            Err(e) => {
                warn!(%peer, command, error = %e, "command rejected");
                Some(Message::failure(e.to_string()))
            }
        };
        if let Some(reply) = reply {
            conn.send(&reply).await?;
        }
    };

    node.close();
    info!(%peer, "coordinator disconnected");
    result
}

/// Applies `message` to `node`. Commands that touch the whole slice run on
/// the blocking pool and hand the node back when done.
async fn dispatch(mut node: Node, message: Message) -> Result<Handled, JoinError> {
    if is_bulk(&message) {
        tokio::task::spawn_blocking(move || {
            let handled = node.handle(message);
            (node, handled)
        })
        .await
    } else {
        let handled = node.handle(message);
        Ok((node, handled))
    }
}

fn is_bulk(message: &Message) -> bool {
    matches!(
        message,
        Message::InitColumns(_) | Message::ColumnBlock(_) | Message::Eliminate(_)
    )
}
