use std::collections::HashMap;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Result;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::engine::Engine;
use crate::session::Session;
use crate::sql::{self, Reply};

pub mod protocol;

use protocol::{login_result, message_frame, select_frames, Frame, Request, FRAME_SIZE};

pub type ConnectionId = u64;

/// Frames waiting for the dispatcher, across all connections.
const QUEUE_CAPACITY: usize = 256;

enum Event {
    Frame(ConnectionId, Box<Frame>),
    Closed(ConnectionId),
}

struct Connection {
    peer: SocketAddr,
    session: Session,
    writer: OwnedWriteHalf,
}

/// Binds the configured address and serves clients until the process ends.
pub async fn serve(engine: Engine, config: &ServerConfig) -> Result<()> {
    let listener = TcpListener::bind(&config.listen).await?;
    info!(addr = %listener.local_addr()?, max_connections = config.max_connections, "listening");
    let write_timeout = Duration::from_millis(config.write_timeout_ms);
    run(listener, engine, config.max_connections, write_timeout).await
}

/// Runs the server loop on an already bound listener.
///
/// ## Execution Model
/// ```text
///  socket ─▶ reader task ─┐
///  socket ─▶ reader task ─┼─▶ mpsc queue ─▶ dispatcher ─▶ Engine
///  socket ─▶ reader task ─┘                     │
///                                               └─▶ reply frames
/// ```
/// Reader tasks only cut the byte stream into [`FRAME_SIZE`] frames. The
/// dispatcher owns every session and the engine and handles one frame
/// completely (decode, execute, write reply) before taking the next, so
/// storage is only ever touched by one request at a time. A reply that is
/// not written within `write_timeout` drops that client, so a peer that
/// stops reading cannot hold up the others.
///
/// ## Connection Lifecycle
/// 1. Accept; refuse (close) if `max_connections` are already open
/// 2. Start a fresh [`Session`] in the `Connected` state
/// 3. `"root"` or an `'L'` login frame authenticates the session
/// 4. Script frames are executed and answered
/// 5. On EOF, a read/write error or a write timeout the session is discarded
pub async fn run(
    listener: TcpListener,
    engine: Engine,
    max_connections: usize,
    write_timeout: Duration,
) -> Result<()> {
    let (tx, mut rx) = mpsc::channel::<Event>(QUEUE_CAPACITY);
    let mut connections: HashMap<ConnectionId, Connection> = HashMap::new();
    let mut next_id: ConnectionId = 0;

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (socket, peer) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                        continue;
                    }
                };
                if connections.len() >= max_connections {
                    warn!(%peer, limit = max_connections, "connection refused, limit reached");
                    continue;
                }
                next_id += 1;
                let (reader, writer) = socket.into_split();
                tokio::spawn(read_frames(next_id, reader, tx.clone()));
                connections.insert(next_id, Connection { peer, session: Session::new(), writer });
                info!(conn = next_id, %peer, "client connected");
            }
            Some(event) = rx.recv() => match event {
                Event::Frame(id, frame) => {
                    dispatch(&engine, &mut connections, id, &frame, write_timeout).await
                }
                Event::Closed(id) => {
                    if let Some(conn) = connections.remove(&id) {
                        info!(conn = id, peer = %conn.peer, "client disconnected");
                    }
                }
            }
        }
    }
}

/// Forwards whole frames of one socket to the dispatcher.
async fn read_frames(id: ConnectionId, mut reader: OwnedReadHalf, tx: mpsc::Sender<Event>) {
    loop {
        let mut frame = Box::new([0u8; FRAME_SIZE]);
        match reader.read_exact(&mut frame[..]).await {
            Ok(_) => {
                if tx.send(Event::Frame(id, frame)).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                if e.kind() != ErrorKind::UnexpectedEof {
                    debug!(conn = id, error = %e, "read failed");
                }
                let _ = tx.send(Event::Closed(id)).await;
                return;
            }
        }
    }
}

async fn dispatch(
    engine: &Engine,
    connections: &mut HashMap<ConnectionId, Connection>,
    id: ConnectionId,
    frame: &Frame,
    write_timeout: Duration,
) {
    let Some(conn) = connections.get_mut(&id) else {
        return;
    };
    let replies = handle_frame(engine, &mut conn.session, id, frame);
    if replies.is_empty() {
        return;
    }

    let bytes = replies.concat();
    let written = async {
        conn.writer.write_all(&bytes).await?;
        conn.writer.flush().await
    };
    match timeout(write_timeout, written).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            warn!(conn = id, error = %e, "write failed, dropping connection");
            connections.remove(&id);
        }
        Err(_) => {
            warn!(conn = id, peer = %conn.peer, frames = replies.len(), "write timed out, dropping connection");
            connections.remove(&id);
        }
    }
}

/// Applies one client frame to a session and returns the reply frames.
pub fn handle_frame(engine: &Engine, session: &mut Session, id: ConnectionId, frame: &Frame) -> Vec<Frame> {
    match Request::decode(frame) {
        Request::Root => {
            session.login_root();
            info!(conn = id, "root session");
            Vec::new()
        }
        Request::Login { username, password } => {
            session.begin_login();
            let account = match engine.catalog().authenticate(&username, &password) {
                Ok(account) => account,
                Err(e) => {
                    error!(conn = id, error = %e, "account lookup failed");
                    None
                }
            };
            session.complete_login(account);
            let username = String::from_utf8_lossy(&username);
            match account {
                Some(account_id) => info!(conn = id, %username, account_id, "login succeeded"),
                None => warn!(conn = id, %username, "login failed"),
            }
            vec![login_result(account.is_some())]
        }
        Request::Script(line) => match sql::execute(engine, session, &line) {
            Reply::Message(text) => vec![message_frame(&text)],
            Reply::Rows(result) => select_frames(&result),
        },
        Request::Malformed => {
            debug!(conn = id, "malformed frame");
            vec![message_frame("Script error")]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::protocol::text_frame;
    use super::*;
    use crate::session::{Identity, SessionState};
    use tempfile::TempDir;

    fn reply_text(frames: &[Frame]) -> Vec<String> {
        frames
            .iter()
            .map(|f| String::from_utf8_lossy(protocol::text(f)).into_owned())
            .collect()
    }

    #[test]
    fn root_frame_authenticates_without_reply() {
        let tmp = TempDir::new().unwrap();
        let engine = Engine::open(tmp.path().join("db")).unwrap();
        let mut session = Session::new();
        assert!(handle_frame(&engine, &mut session, 1, &text_frame(b"root")).is_empty());
        assert_eq!(session.identity(), Some(Identity::Root));
    }

    #[test]
    fn login_replies_success_or_failed() {
        let tmp = TempDir::new().unwrap();
        let engine = Engine::open(tmp.path().join("db")).unwrap();
        engine.catalog().create_account("alice", "pw").unwrap();
        let mut session = Session::new();

        let wrong = Request::Login { username: b"alice".to_vec(), password: b"nope".to_vec() };
        assert_eq!(reply_text(&handle_frame(&engine, &mut session, 1, &wrong.encode())), ["failed"]);
        assert_eq!(session.state(), SessionState::Connected);

        let right = Request::Login { username: b"alice".to_vec(), password: b"pw".to_vec() };
        assert_eq!(reply_text(&handle_frame(&engine, &mut session, 1, &right.encode())), ["success"]);
        assert_eq!(session.identity(), Some(Identity::Account(1)));
    }

    #[test]
    fn scripts_before_login_are_refused() {
        let tmp = TempDir::new().unwrap();
        let engine = Engine::open(tmp.path().join("db")).unwrap();
        let mut session = Session::new();
        let frames = handle_frame(&engine, &mut session, 1, &text_frame(b"CREATE DATABASE shop"));
        assert_eq!(reply_text(&frames), ["MNot authenticated"]);
        assert_eq!(engine.catalog().find_database("shop").unwrap(), None);
    }

    #[test]
    fn malformed_frame_gets_script_error() {
        let tmp = TempDir::new().unwrap();
        let engine = Engine::open(tmp.path().join("db")).unwrap();
        let mut session = Session::authenticated(Identity::Root);
        let mut frame = [0u8; FRAME_SIZE];
        frame[0] = b'L';
        frame[1..5].copy_from_slice(&1000i32.to_ne_bytes());
        assert_eq!(reply_text(&handle_frame(&engine, &mut session, 1, &frame)), ["MScript error"]);
    }
}
