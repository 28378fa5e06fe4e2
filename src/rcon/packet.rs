use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use super::Error;

/// Bytes of a frame body that are not payload: id (4) + type (4) + the two
/// NUL terminator bytes.
const BODY_OVERHEAD: i32 = 10;

/// Upper bound on the declared frame length. The server caps its packets far
/// below this; anything larger means a corrupted or hostile stream.
const MAX_FRAME_LEN: i32 = 1024 * 1024;

/// Wire value of a packet type. Login and Command are client-initiated;
/// Response is what the server answers with (except during the login
/// handshake, where a success is acknowledged with `Command`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    Response,
    Command,
    Login,
    /// A type value this client does not know. Kept rather than rejected so
    /// that callers can decide what an odd reply means (a failed login is
    /// signalled through the type field).
    Other(i32),
}

impl PacketKind {
    pub fn wire_value(self) -> i32 {
        match self {
            PacketKind::Response => 0,
            PacketKind::Command => 2,
            PacketKind::Login => 3,
            PacketKind::Other(v) => v,
        }
    }

    pub fn from_wire(v: i32) -> Self {
        match v {
            0 => PacketKind::Response,
            2 => PacketKind::Command,
            3 => PacketKind::Login,
            v => PacketKind::Other(v),
        }
    }
}

/// A single RCON protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Caller-chosen id, echoed by the matching response. Used for
    /// correlation only; the server does not enforce uniqueness.
    pub id: i32,
    pub kind: PacketKind,
    /// Logical payload, without the wire terminator bytes.
    pub payload: String,
}

impl Packet {
    pub fn new(id: i32, kind: PacketKind, payload: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            payload: payload.into(),
        }
    }

    /// Encode to the wire frame: `[len][id][type][payload][\0\0]`, integers
    /// little-endian, `len` covering everything after itself.
    pub fn encode(&self) -> Bytes {
        let body_len = BODY_OVERHEAD as usize + self.payload.len();
        let mut buf = BytesMut::with_capacity(4 + body_len);
        buf.put_i32_le(body_len as i32);
        buf.put_i32_le(self.id);
        buf.put_i32_le(self.kind.wire_value());
        buf.put_slice(self.payload.as_bytes());
        buf.put_slice(b"\0\0");
        buf.freeze()
    }
}

/// Read one complete frame from the stream, suspending until it is all
/// there. End-of-stream before a full frame is `Error::ConnectionClosed`;
/// an impossible declared length is `Error::MalformedFrame`.
///
/// Exactly one frame is consumed. A logical response split by the server
/// across several frames is not reassembled; only the first is returned.
pub async fn read_packet<R: AsyncRead + Unpin>(r: &mut R) -> Result<Packet, Error> {
    let len = map_eof(r.read_i32_le().await)?;
    if !(BODY_OVERHEAD..=MAX_FRAME_LEN).contains(&len) {
        return Err(Error::MalformedFrame(len));
    }

    let mut body = vec![0u8; len as usize];
    map_eof(r.read_exact(&mut body).await)?;

    let mut body = Bytes::from(body);
    let id = body.get_i32_le();
    let kind = PacketKind::from_wire(body.get_i32_le());
    // Strip the two terminator bytes; they are framing, not payload.
    let payload = String::from_utf8_lossy(&body[..body.len() - 2]).into_owned();

    Ok(Packet { id, kind, payload })
}

fn map_eof<T>(res: std::io::Result<T>) -> Result<T, Error> {
    res.map_err(|err| {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            Error::ConnectionClosed
        } else {
            Error::Io(err)
        }
    })
}
