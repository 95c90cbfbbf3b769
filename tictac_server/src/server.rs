// TCP transport for the session server.
//
// Architecture: one accept thread plus one thread per connection.
//
// - **Accept thread**: polls a non-blocking `TcpListener`, checking the
//   shared `keep_running` flag between attempts. Each accepted stream gets a
//   fresh `ConnectionId` and its own connection thread.
// - **Connection thread**: reads the `hello` handshake (bounded by
//   `handshake_timeout`), resolves the session through the registry, joins
//   it, then loops on `read_frame` and calls straight into the
//   `SessionManager`. When the loop ends (EOF, read error, malformed frame,
//   `goodbye`, shutdown) it leaves the session, releases its handle and asks
//   the registry to dispose of the session if it is now empty.
//
// Unlike a single event-loop design, there is no central thread owning game
// state: each `SessionManager` serializes its own operations with its mutex,
// so a busy session never delays another.
//
// Writes: the session owns each connection's write half (`TcpConnection`)
// and is the only writer once the handshake is done. Dropping a
// `TcpConnection` shuts the socket down, so a connection the session gave up
// on during a broadcast also stops its reader promptly, which then runs the
// normal leave path.
//
// Shutdown: `ServerHandle::stop` clears `keep_running`, shuts down every live
// socket so blocked readers return, and joins the accept thread.

use std::collections::HashMap;
use std::io::{self, BufReader, BufWriter};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use tictac_protocol::framing::{FrameError, read_frame, write_frame};
use tictac_protocol::message::{ClientMessage, ServerMessage};
use tracing::{debug, error, info, info_span, warn};

use crate::config::ServerConfig;
use crate::connection::{Connection, ConnectionId, ConnectionIdAllocator};
use crate::error::SendError;
use crate::registry::SessionRegistry;
use crate::session::SessionManager;

/// How often the accept thread re-checks `keep_running` when idle.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Write half of an accepted socket, owned by the session it joined.
pub struct TcpConnection {
    id: ConnectionId,
    writer: Mutex<BufWriter<TcpStream>>,
}

impl TcpConnection {
    fn new(id: ConnectionId, stream: TcpStream) -> Self {
        Self {
            id,
            writer: Mutex::new(BufWriter::new(stream)),
        }
    }
}

impl Connection for TcpConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn send(&self, message: &ServerMessage) -> Result<(), SendError> {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        write_frame(&mut *writer, message).map_err(SendError::from)
    }
}

impl Drop for TcpConnection {
    fn drop(&mut self) {
        let writer = self.writer.get_mut().unwrap_or_else(PoisonError::into_inner);
        let _ = writer.get_ref().shutdown(Shutdown::Both);
    }
}

/// Reasons a new connection is turned away before joining a session.
#[derive(Debug, thiserror::Error)]
enum HandshakeError {
    #[error("failed to read hello: {0}")]
    Frame(#[from] FrameError),
    #[error("expected hello as the first message")]
    NotHello,
    #[error("session key must not be empty")]
    EmptyKey,
    #[error("session key is {len} bytes (max {max})")]
    KeyTooLong { len: usize, max: usize },
}

/// State shared by the accept thread and every connection thread.
struct Shared {
    registry: SessionRegistry<TcpConnection>,
    ids: ConnectionIdAllocator,
    /// Read halves of live sockets, kept so `stop` can unblock readers.
    live: Mutex<HashMap<ConnectionId, TcpStream>>,
    keep_running: AtomicBool,
    handshake_timeout: Duration,
    write_timeout: Option<Duration>,
    max_session_key_len: usize,
}

impl Shared {
    fn live(&self) -> MutexGuard<'_, HashMap<ConnectionId, TcpStream>> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn track(&self, id: ConnectionId, stream: &TcpStream) {
        if let Ok(clone) = stream.try_clone() {
            self.live().insert(id, clone);
        }
    }

    fn forget(&self, id: ConnectionId) {
        if let Some(stream) = self.live().remove(&id) {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }
}

/// Handle returned by `start_server` to inspect and stop the running server.
pub struct ServerHandle {
    shared: Arc<Shared>,
    thread: Option<thread::JoinHandle<()>>,
}

impl ServerHandle {
    /// Number of sessions currently registered.
    pub fn session_count(&self) -> usize {
        self.shared.registry.len()
    }

    /// Whether a session with this key is currently registered.
    pub fn has_session(&self, key: &str) -> bool {
        self.shared.registry.contains(key)
    }

    /// Connections currently receiving broadcasts in session `key`.
    pub fn connection_count(&self, key: &str) -> Option<usize> {
        self.shared.registry.connection_count(key)
    }

    /// Signal the server to stop, disconnect every client and wait for the
    /// accept thread to exit.
    pub fn stop(mut self) {
        self.shared.keep_running.store(false, Ordering::SeqCst);
        let streams: Vec<TcpStream> = self.shared.live().drain().map(|(_, s)| s).collect();
        for stream in streams {
            let _ = stream.shutdown(Shutdown::Both);
        }
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
        info!("server stopped");
    }
}

/// Bind the listener and start accepting on a background thread. Returns a
/// handle and the bound address (useful with port 0).
pub fn start_server(config: ServerConfig) -> io::Result<(ServerHandle, SocketAddr)> {
    let listener = TcpListener::bind(config.listen_addr())?;
    let addr = listener.local_addr()?;
    listener.set_nonblocking(true)?;

    let shared = Arc::new(Shared {
        registry: SessionRegistry::new(config.session_options()),
        ids: ConnectionIdAllocator::new(),
        live: Mutex::new(HashMap::new()),
        keep_running: AtomicBool::new(true),
        handshake_timeout: config.handshake_timeout(),
        write_timeout: config.write_timeout(),
        max_session_key_len: config.max_session_key_len,
    });

    let accept_shared = Arc::clone(&shared);
    let thread = thread::Builder::new()
        .name("tictac-accept".into())
        .spawn(move || accept_loop(&listener, &accept_shared))?;

    info!(%addr, explicit_rejections = config.explicit_rejections, "server listening");
    Ok((
        ServerHandle {
            shared,
            thread: Some(thread),
        },
        addr,
    ))
}

fn accept_loop(listener: &TcpListener, shared: &Arc<Shared>) {
    while shared.keep_running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => {
                let id = shared.ids.allocate();
                debug!(conn = %id, %peer, "accepted");
                let conn_shared = Arc::clone(shared);
                let spawned = thread::Builder::new()
                    .name(format!("tictac-{id}"))
                    .spawn(move || handle_connection(&conn_shared, stream, id));
                if let Err(e) = spawned {
                    warn!(conn = %id, error = %e, "failed to spawn connection thread");
                }
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
            Err(e) => {
                error!(error = %e, "accept failed, listener shutting down");
                break;
            }
        }
    }
}

/// Full lifetime of one connection, from handshake to disposal.
fn handle_connection(shared: &Shared, stream: TcpStream, id: ConnectionId) {
    let span = info_span!("connection", conn = %id, session = tracing::field::Empty);
    let _entered = span.enter();

    shared.track(id, &stream);
    if !shared.keep_running.load(Ordering::SeqCst) {
        shared.forget(id);
        return;
    }
    if let Err(e) = prepare_stream(shared, &stream) {
        warn!(error = %e, "failed to configure socket");
        shared.forget(id);
        return;
    }

    let mut reader = BufReader::new(match stream.try_clone() {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "failed to clone socket");
            shared.forget(id);
            return;
        }
    });

    let key = match read_hello(&mut reader, shared.max_session_key_len) {
        Ok(key) => key,
        Err(e) => {
            refuse(stream, &e);
            shared.forget(id);
            return;
        }
    };
    span.record("session", key.as_str());
    stream.set_read_timeout(None).ok();

    let manager = shared.registry.get_or_create(&key);
    match manager.join(TcpConnection::new(id, stream)) {
        Ok(_) => read_loop(shared, &manager, &mut reader, id),
        Err(e) => debug!(error = %e, "join failed"),
    }

    manager.leave(id);
    drop(manager);
    shared.registry.remove_if_empty(&key);
    shared.forget(id);
}

fn prepare_stream(shared: &Shared, stream: &TcpStream) -> io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_nodelay(true)?;
    stream.set_read_timeout(Some(shared.handshake_timeout))?;
    stream.set_write_timeout(shared.write_timeout)?;
    Ok(())
}

/// Read and validate the `hello` frame, returning the session key.
fn read_hello(
    reader: &mut BufReader<TcpStream>,
    max_key_len: usize,
) -> Result<String, HandshakeError> {
    let session = match read_frame::<_, ClientMessage>(reader)? {
        ClientMessage::Hello { session } => session,
        _ => return Err(HandshakeError::NotHello),
    };
    if session.is_empty() {
        return Err(HandshakeError::EmptyKey);
    }
    if session.len() > max_key_len {
        return Err(HandshakeError::KeyTooLong {
            len: session.len(),
            max: max_key_len,
        });
    }
    Ok(session)
}

/// Tell a client why its handshake failed, if it is still there to hear it.
fn refuse(stream: TcpStream, reason: &HandshakeError) {
    if let HandshakeError::Frame(e) = reason
        && e.is_disconnect()
    {
        debug!("peer left before hello");
        return;
    }
    warn!(%reason, "handshake refused");
    let mut writer = BufWriter::new(stream);
    let _ = write_frame(&mut writer, &ServerMessage::Rejected {
        reason: reason.to_string(),
    });
}

/// Dispatch client actions until the connection ends.
fn read_loop(
    shared: &Shared,
    manager: &SessionManager<TcpConnection>,
    reader: &mut BufReader<TcpStream>,
    id: ConnectionId,
) {
    while shared.keep_running.load(Ordering::SeqCst) {
        match read_frame::<_, ClientMessage>(reader) {
            Ok(ClientMessage::Move { idx }) => {
                // Rejections are logged (and optionally reported) by the session.
                let _ = manager.act(id, idx);
            }
            Ok(ClientMessage::Restart) => {
                manager.reset();
            }
            Ok(ClientMessage::Goodbye) => {
                debug!("goodbye");
                break;
            }
            Ok(ClientMessage::Hello { .. }) => {
                warn!("repeated hello, disconnecting");
                break;
            }
            Ok(ClientMessage::Unknown) => {
                debug!("unknown action ignored");
            }
            Err(e) if e.is_disconnect() => {
                debug!("peer disconnected");
                break;
            }
            Err(e) => {
                warn!(error = %e, "unreadable frame, disconnecting");
                break;
            }
        }
    }
}
