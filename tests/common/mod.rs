//! In-process RCON server the integration suites dial over real TCP.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mcbridge::rcon::{Error, Packet, PacketKind, read_packet};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};

pub struct MockRcon {
    pub addr: SocketAddr,
    /// Every command payload the server has received, in arrival order.
    pub commands: Arc<Mutex<Vec<String>>>,
}

impl MockRcon {
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }
}

/// Spawn a server that accepts any number of connections, performs the
/// login handshake against `password`, and answers each command through
/// `respond` after `delay` (a non-zero delay widens the window in which an
/// unserialized client would interleave requests).
pub async fn spawn_mock_rcon<F>(password: &str, delay: Duration, respond: F) -> MockRcon
where
    F: Fn(&str) -> String + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let commands = Arc::new(Mutex::new(Vec::new()));

    let recorded = Arc::clone(&commands);
    let password = password.to_string();
    let respond = Arc::new(respond);
    tokio::spawn(async move {
        loop {
            let Ok((socket, _)) = listener.accept().await else {
                return;
            };
            let recorded = Arc::clone(&recorded);
            let password = password.clone();
            let respond = Arc::clone(&respond);
            tokio::spawn(async move {
                let _ = serve(socket, &password, recorded, delay, respond).await;
            });
        }
    });

    MockRcon { addr, commands }
}

async fn serve(
    mut socket: TcpStream,
    password: &str,
    recorded: Arc<Mutex<Vec<String>>>,
    delay: Duration,
    respond: Arc<dyn Fn(&str) -> String + Send + Sync>,
) -> Result<(), Error> {
    // Login handshake: the real server acks a good password with type
    // Command and the caller's id, and a bad one with id -1.
    let login = read_packet(&mut socket).await?;
    let ack_id = if login.payload == password { login.id } else { -1 };
    socket
        .write_all(&Packet::new(ack_id, PacketKind::Command, "").encode())
        .await?;
    if ack_id == -1 {
        return Ok(());
    }

    loop {
        let req = read_packet(&mut socket).await?;
        recorded.lock().unwrap().push(req.payload.clone());
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let reply = respond(&req.payload);
        socket
            .write_all(&Packet::new(req.id, PacketKind::Response, reply).encode())
            .await?;
    }
}
