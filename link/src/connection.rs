//! One framed TCP link carrying [`Message`]s.

use std::net::SocketAddr;

use gauss_types::{Envelope, Message, NodeId};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::error::{Error, Result};
use crate::frame;

pub struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    node: Option<NodeId>,
}

impl Connection {
    pub async fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        Self::new(stream)
    }

    pub fn new(stream: TcpStream) -> Result<Self> {
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr()?;
        Ok(Self {
            stream,
            peer,
            node: None,
        })
    }

    /// Stamps outgoing envelopes with `node`.
    pub fn with_node(mut self, node: NodeId) -> Self {
        self.node = Some(node);
        self
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub async fn send(&mut self, message: &Message) -> Result<()> {
        let body = Envelope::wrap(message, self.node)?.encode()?;
        frame::write_frame(&mut self.stream, &body).await
    }

    pub async fn receive(&mut self) -> Result<Message> {
        let body = frame::read_frame(&mut self.stream).await?;
        Ok(Envelope::decode(&body)?.into_message()?)
    }

    /// Sends `message` and waits for a reply of type `T`.
    ///
    /// A reply whose base result is a failure becomes [`Error::Remote`]; any
    /// other reply kind becomes [`Error::ProtocolError`].
    pub async fn request<T>(&mut self, message: &Message) -> Result<T>
    where
        T: TryFrom<Message, Error = Message>,
    {
        self.send(message).await?;
        let reply = self.receive().await?;
        expect_reply(reply)
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

pub(crate) fn expect_reply<T>(reply: Message) -> Result<T>
where
    T: TryFrom<Message, Error = Message>,
{
    if let Some(outcome) = reply.outcome() {
        if !outcome.is_success {
            return Err(Error::Remote(outcome.message().to_string()));
        }
    }
    T::try_from(reply).map_err(|other| {
        let expected = std::any::type_name::<T>().rsplit("::").next().unwrap_or("reply");
        Error::ProtocolError(format!("expected {expected}, got {}", other.name()))
    })
}
