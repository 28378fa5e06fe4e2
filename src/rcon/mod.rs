//! Client for the Minecraft RCON protocol: a login-gated, request/response
//! console over TCP, with one length-prefixed frame per message.

mod packet;

pub use packet::{Packet, PacketKind, read_packet};

use rand::Rng;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("connection closed before a complete frame arrived")]
    ConnectionClosed,
    #[error("malformed frame (declared length {0})")]
    MalformedFrame(i32),
    #[error("already logged in")]
    AlreadyConnected,
    #[error("not connected; login first")]
    NotConnected,
    #[error("login rejected by server")]
    AuthRejected,
    #[error("response id {got} does not match request id {want}")]
    IdMismatch { want: i32, got: i32 },
    #[error("unexpected response type {0:?}")]
    UnexpectedType(PacketKind),
    #[error("console connection task is gone")]
    Dropped,
}

fn fresh_id() -> i32 {
    rand::rng().random_range(0..i32::MAX)
}

/// One TCP session to the RCON endpoint.
///
/// The transport supports a single outstanding request: the server answers
/// strictly in send order and ids are only checked within one pending call.
/// `&mut self` on every operation keeps a bare client un-shareable; wrap it
/// in an [`RconHandle`] to serve concurrent callers.
pub struct RconClient {
    addr: String,
    password: String,
    stream: Option<TcpStream>,
}

impl RconClient {
    pub fn new(addr: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            password: password.into(),
            stream: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Dial and authenticate. A successful login is acknowledged with a
    /// packet of type `Command` carrying our request id; a mismatched id or
    /// any other type means the password was rejected.
    pub async fn login(&mut self) -> Result<(), Error> {
        if self.stream.is_some() {
            return Err(Error::AlreadyConnected);
        }

        let mut stream = TcpStream::connect(&self.addr).await?;

        let req = Packet::new(fresh_id(), PacketKind::Login, self.password.clone());
        stream.write_all(&req.encode()).await?;

        let res = read_packet(&mut stream).await?;
        if res.id != req.id || res.kind != PacketKind::Command {
            return Err(Error::AuthRejected);
        }

        debug!(addr = %self.addr, "rcon login succeeded");
        self.stream = Some(stream);
        Ok(())
    }

    /// Run one console command and return its output.
    ///
    /// Reads exactly one response frame; a reply the server splits across
    /// several frames is truncated to the first. An id or type mismatch is
    /// reported without closing the connection; the session may still be
    /// usable.
    pub async fn execute(&mut self, command: &str) -> Result<String, Error> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;

        let req = Packet::new(fresh_id(), PacketKind::Command, command);
        stream.write_all(&req.encode()).await?;

        let res = read_packet(stream).await?;
        if res.id != req.id {
            return Err(Error::IdMismatch {
                want: req.id,
                got: res.id,
            });
        }
        if res.kind != PacketKind::Response {
            return Err(Error::UnexpectedType(res.kind));
        }

        Ok(res.payload)
    }

    /// Release the socket. Consumes the client, so a double close does not
    /// exist; reconnecting means constructing a fresh client.
    pub async fn close(mut self) -> Result<(), Error> {
        if let Some(mut stream) = self.stream.take() {
            stream.shutdown().await?;
        }
        Ok(())
    }
}

struct Request {
    command: String,
    reply: oneshot::Sender<Result<String, Error>>,
}

/// Cheap-to-clone handle that serializes command execution onto one
/// connection.
///
/// A single owner task holds the [`RconClient`] and works the request queue
/// one entry at a time, so at most one request is ever in flight no matter
/// how many tasks hold a handle. Without this, two concurrent callers could
/// each read the other's reply, since ids are caller-generated and the
/// server answers in send order.
#[derive(Clone)]
pub struct RconHandle {
    tx: mpsc::Sender<Request>,
}

impl RconHandle {
    /// Spawn the owner task for an authenticated client.
    pub fn spawn(client: RconClient) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<Request>(32);
        let task = tokio::spawn(async move {
            let mut client = client;
            while let Some(req) = rx.recv().await {
                let result = client.execute(&req.command).await;
                // A caller that gave up waiting is not an error here.
                let _ = req.reply.send(result);
            }
        });
        (Self { tx }, task)
    }

    /// Queue a command and wait for its response.
    pub async fn execute(&self, command: impl Into<String>) -> Result<String, Error> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Request {
                command: command.into(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| Error::Dropped)?;
        reply_rx.await.map_err(|_| Error::Dropped)?
    }
}
