// Blocking TCP client for the session server.
//
// Architecture:
// - `connect()` opens the socket, sends `hello` and waits for the `role`
//   reply on the calling thread, then spawns a background reader thread.
// - The reader thread decodes `ServerMessage` frames and pushes them into an
//   `mpsc` channel until the socket closes or the client is dropped.
// - The caller keeps the buffered write half for `send_move` and friends.
// - `poll()` drains the inbox without blocking; `recv_timeout()` waits for
//   one message.
//
// Lives in the server crate because it shares the protocol and has no other
// dependencies, which makes it usable from integration tests and small
// terminal front ends alike.

use std::io::{self, BufReader, BufWriter};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tictac_protocol::framing::{FrameError, read_frame, write_frame};
use tictac_protocol::message::{ClientMessage, ServerMessage};
use tictac_protocol::types::Role;

/// How long `connect` waits for the server's `role` reply.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("connect failed: {0}")]
    Connect(#[source] io::Error),
    #[error("transport error: {0}")]
    Frame(#[from] FrameError),
    #[error("rejected: {0}")]
    Rejected(String),
    #[error("unexpected response: {0:?}")]
    UnexpectedResponse(ServerMessage),
}

/// Connection to one session on a server.
pub struct NetClient {
    writer: BufWriter<TcpStream>,
    inbox: Receiver<ServerMessage>,
    _reader_thread: Option<JoinHandle<()>>,
    role: Role,
}

impl NetClient {
    /// Connect, attach to `session` and wait for the role assignment.
    pub fn connect(addr: impl ToSocketAddrs, session: &str) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).map_err(ClientError::Connect)?;
        stream
            .set_read_timeout(Some(HANDSHAKE_TIMEOUT))
            .map_err(ClientError::Connect)?;
        let reader_stream = stream.try_clone().map_err(ClientError::Connect)?;
        let mut writer = BufWriter::new(stream);

        write_frame(&mut writer, &ClientMessage::Hello {
            session: session.into(),
        })?;

        let mut reader = BufReader::new(reader_stream);
        let role = match read_frame::<_, ServerMessage>(&mut reader)? {
            ServerMessage::Role { role } => role,
            ServerMessage::Rejected { reason } => return Err(ClientError::Rejected(reason)),
            other => return Err(ClientError::UnexpectedResponse(other)),
        };

        // Clear the handshake timeout for the long-lived reader.
        reader.get_ref().set_read_timeout(None).ok();

        let (tx, rx) = mpsc::channel();
        let reader_thread = thread::spawn(move || reader_loop(reader, &tx));

        Ok(Self {
            writer,
            inbox: rx,
            _reader_thread: Some(reader_thread),
            role,
        })
    }

    /// Role the server assigned on join.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Ask to place our mark on cell `idx`.
    pub fn send_move(&mut self, idx: i64) -> Result<(), ClientError> {
        self.send(&ClientMessage::Move { idx })
    }

    /// Ask for a new game (only honored once the current one is over).
    pub fn send_restart(&mut self) -> Result<(), ClientError> {
        self.send(&ClientMessage::Restart)
    }

    /// Send `goodbye` and close the socket.
    pub fn disconnect(&mut self) {
        let _ = self.send(&ClientMessage::Goodbye);
        let _ = self.writer.get_ref().shutdown(Shutdown::Both);
    }

    /// Drain every queued server message without blocking.
    pub fn poll(&self) -> Vec<ServerMessage> {
        self.inbox.try_iter().collect()
    }

    /// Wait up to `timeout` for the next server message. `None` on timeout
    /// or once the connection has closed and the inbox is empty.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<ServerMessage> {
        match self.inbox.recv_timeout(timeout) {
            Ok(msg) => Some(msg),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    fn send(&mut self, message: &ClientMessage) -> Result<(), ClientError> {
        write_frame(&mut self.writer, message)?;
        Ok(())
    }
}

impl Drop for NetClient {
    /// Unblocks the reader thread, which holds its own handle to the socket.
    fn drop(&mut self) {
        let _ = self.writer.get_ref().shutdown(Shutdown::Both);
    }
}

/// Reader thread: decode frames and forward them until the socket or the
/// receiving side goes away.
fn reader_loop(mut reader: BufReader<TcpStream>, tx: &mpsc::Sender<ServerMessage>) {
    while let Ok(msg) = read_frame::<_, ServerMessage>(&mut reader) {
        if tx.send(msg).is_err() {
            break;
        }
    }
}
