//! Listener and lobby scheduler.
//!
//! One thread accepts TCP connections; a second drives the lobby state
//! machine over the mutex-guarded list of unseated connections. A
//! connection that completes a JOIN (or accepts an RCON reconnect
//! offer) is moved out of the list and handed to the target room;
//! rooms push departing connections back. Per-connection errors never
//! unwind past a tick: they become a disconnect and the cleanup pass
//! drops the connection.

use std::io;
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use thiserror::Error;

use crate::config::ServerConfig;
use crate::net::codec::{read_bg_int, read_net_str, read_var_int};
use crate::net::connection::{Connection, LobbyStage, MSG_BATCH};
use crate::net::messages::{self, code, Message};
use crate::room::{lock, Room};

/// Consecutive unexpected-but-known messages tolerated before the
/// lobby gives up on a client.
const MAX_CONSECUTIVE_FAILS: u32 = 3;

/// Sleep between accept attempts on the non-blocking listener.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: io::Error,
    },
    #[error("failed to start server thread: {0}")]
    Spawn(#[from] io::Error),
}

/// Binds the listener, spawns the room workers and the accept and
/// lobby threads, and returns a handle for shutdown.
pub fn start(config: ServerConfig) -> Result<ServerHandle, ServerError> {
    let listener = TcpListener::bind(config.bind).map_err(|source| ServerError::Bind {
        addr: config.bind,
        source,
    })?;
    // Non-blocking accept so the thread can observe the shutdown flag.
    listener.set_nonblocking(true)?;
    let addr = listener.local_addr()?;

    let running = Arc::new(AtomicBool::new(true));
    let players: Arc<Mutex<Vec<Connection>>> = Arc::new(Mutex::new(Vec::new()));

    let rooms: Vec<Arc<Room>> = config
        .rooms
        .iter()
        .map(|(id, name)| {
            Room::spawn(
                *id,
                name.clone(),
                config.room,
                players.clone(),
                running.clone(),
            )
        })
        .collect();

    let accept_thread = {
        let players = players.clone();
        let running = running.clone();
        thread::Builder::new()
            .name("accept".to_string())
            .spawn(move || accept_loop(listener, players, running))?
    };

    let lobby_thread = {
        let players = players.clone();
        let running = running.clone();
        let rooms = rooms.clone();
        let lobby_tick = config.lobby_tick;
        let ping_interval = config.room.ping_interval;
        thread::Builder::new()
            .name("lobby".to_string())
            .spawn(move || lobby_loop(players, rooms, running, lobby_tick, ping_interval))?
    };

    info!("server listening on {addr}");
    Ok(ServerHandle {
        addr,
        running,
        accept_thread: Some(accept_thread),
        lobby_thread: Some(lobby_thread),
        rooms,
        players,
    })
}

/// Handle to a running server.
pub struct ServerHandle {
    addr: SocketAddr,
    running: Arc<AtomicBool>,
    accept_thread: Option<JoinHandle<()>>,
    lobby_thread: Option<JoinHandle<()>>,
    rooms: Vec<Arc<Room>>,
    players: Arc<Mutex<Vec<Connection>>>,
}

impl ServerHandle {
    /// The bound address; with port 0 in the config this carries the
    /// ephemeral port.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The cooperative shutdown flag; clearing it winds the server
    /// down. Intended for signal handlers.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    /// Blocks until the running flag is cleared, then joins all
    /// threads.
    pub fn wait(mut self) {
        while self.running.load(Ordering::Acquire) {
            thread::sleep(Duration::from_millis(100));
        }
        self.join_all();
    }

    /// Clears the running flag and joins all threads.
    pub fn shutdown(mut self) {
        self.running.store(false, Ordering::Release);
        self.join_all();
    }

    fn join_all(&mut self) {
        if let Some(handle) = self.accept_thread.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.lobby_thread.take() {
            let _ = handle.join();
        }
        for room in &self.rooms {
            room.join_worker();
        }
        lock(&self.players).clear();
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        self.join_all();
    }
}

fn accept_loop(
    listener: TcpListener,
    players: Arc<Mutex<Vec<Connection>>>,
    running: Arc<AtomicBool>,
) {
    while running.load(Ordering::Acquire) {
        match listener.accept() {
            Ok((stream, peer)) => {
                info!("accepted connection from {peer}");
                if let Err(error) = stream.set_nonblocking(false) {
                    warn!("couldn't configure socket for {peer}: {error}");
                    continue;
                }
                match Connection::spawn(stream) {
                    Ok(conn) => lock(&players).push(conn),
                    Err(error) => warn!("couldn't start connection for {peer}: {error}"),
                }
            }
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_BACKOFF);
            }
            Err(error) => {
                warn!("accept failed: {error}");
                thread::sleep(ACCEPT_BACKOFF);
            }
        }
    }
}

fn lobby_loop(
    players: Arc<Mutex<Vec<Connection>>>,
    rooms: Vec<Arc<Room>>,
    running: Arc<AtomicBool>,
    tick_interval: Duration,
    ping_interval: Duration,
) {
    let mut last_ping = Instant::now();
    while running.load(Ordering::Acquire) {
        {
            let mut players = lock(&players);

            if last_ping.elapsed() >= ping_interval {
                last_ping = Instant::now();
                for conn in players.iter_mut() {
                    conn.keepalive_tick();
                }
            }

            let mut transfers: Vec<(usize, usize)> = Vec::new();
            for player_idx in 0..players.len() {
                if let Some(room_idx) = process_connection(&mut players[player_idx], &rooms) {
                    transfers.push((player_idx, room_idx));
                }
            }
            // Highest index first, so removals don't shift pending ones.
            for &(player_idx, room_idx) in transfers.iter().rev() {
                let mut conn = players.remove(player_idx);
                conn.flush();
                rooms[room_idx].hand_off(conn);
            }

            // Back to front for the same reason.
            for player_idx in (0..players.len()).rev() {
                if players[player_idx].is_disconnected() {
                    debug!(
                        "dropping disconnected lobby connection {}",
                        players[player_idx].nickname
                    );
                    players.remove(player_idx);
                }
            }
        }
        thread::sleep(tick_interval);
    }
}

/// Drains up to a batch of messages from one unseated connection.
/// Returns the index of the room the connection should move to.
fn process_connection(conn: &mut Connection, rooms: &[Arc<Room>]) -> Option<usize> {
    for _ in 0..MSG_BATCH {
        if conn.is_disconnected() {
            return None;
        }
        let Some(msg) = conn.poll_message() else {
            break;
        };
        match dispatch(conn, rooms, &msg) {
            Disposition::Handled(Some(room_idx)) => {
                conn.fail_count = 0;
                conn.flush();
                return Some(room_idx);
            }
            Disposition::Handled(None) => {
                conn.fail_count = 0;
            }
            Disposition::Unexpected => {
                if messages::is_known(msg.code) {
                    conn.fail_count += 1;
                    warn!(
                        "unexpected {} from {} in {:?} ({} strikes)",
                        msg.code, conn.nickname, conn.stage, conn.fail_count
                    );
                    if conn.fail_count >= MAX_CONSECUTIVE_FAILS {
                        conn.send_now(&Message::bare(code::DCON));
                        conn.set_disconnected();
                    } else {
                        conn.send(Message::bare(code::FAIL));
                    }
                } else {
                    protocol_error(conn, "unknown message code");
                }
            }
        }
    }
    conn.flush();
    None
}

enum Disposition {
    /// The message was valid for the current stage; the payload is the
    /// room index to transfer the connection to, if any.
    Handled(Option<usize>),
    /// Wrong code for the stage.
    Unexpected,
}

fn dispatch(conn: &mut Connection, rooms: &[Arc<Room>], msg: &Message) -> Disposition {
    use LobbyStage::*;

    if msg.code == code::DCON {
        conn.set_disconnected();
        return Disposition::Handled(None);
    }

    match (conn.stage, msg.code) {
        (Connected, code::CONN) => {
            let nickname = match msg.payload.as_deref().map(read_net_str) {
                Some(Ok((nickname, _))) => nickname,
                _ => {
                    protocol_error(conn, "CONN without a valid nickname");
                    return Disposition::Handled(None);
                }
            };
            conn.nickname = nickname;
            match rooms
                .iter()
                .position(|room| room.has_reconnect_seat(&conn.nickname))
            {
                Some(room_idx) => {
                    info!("{} has a reserved seat, offering reconnect", conn.nickname);
                    conn.reconnect_room_hint = Some(room_idx);
                    conn.send(Message::bare(code::RCON));
                    conn.stage = AwaitingReconnect;
                }
                None => {
                    conn.send(Message::bare(code::PNOK));
                    conn.stage = AwaitingRooms;
                }
            }
            Disposition::Handled(None)
        }

        (AwaitingReconnect, code::RCON) => match conn.reconnect_room_hint {
            Some(room_idx) => {
                conn.stage = InRoom;
                Disposition::Handled(Some(room_idx))
            }
            None => {
                protocol_error(conn, "RCON accepted without an offer");
                Disposition::Handled(None)
            }
        },

        // A rejoining player may prefer to start fresh; PINF here is
        // treated the same as from AwaitingRooms.
        (AwaitingReconnect | AwaitingRooms, code::PINF) => {
            let chips = match msg.payload.as_deref().map(read_var_int) {
                Some(Ok((chips, _))) => chips,
                _ => {
                    protocol_error(conn, "PINF without a valid chip count");
                    return Disposition::Handled(None);
                }
            };
            conn.chips = chips;
            conn.reconnect_room_hint = None;
            conn.send(Message::bare(code::PIOK));
            conn.stage = AwaitingJoin;
            Disposition::Handled(None)
        }

        (SendingRooms, code::RMOK) => {
            send_next_room(conn, rooms);
            Disposition::Handled(None)
        }

        (SendingRooms, code::RMFL) => {
            debug!("{} rejected a room entry, disconnecting", conn.nickname);
            conn.set_disconnected();
            Disposition::Handled(None)
        }

        (AwaitingJoin, code::RMRQ) => {
            conn.room_send_index = 0;
            conn.stage = SendingRooms;
            send_next_room(conn, rooms);
            Disposition::Handled(None)
        }

        (AwaitingJoin, code::JOIN) => {
            let room_id = match msg.payload.as_deref().map(read_bg_int) {
                Some(Ok((room_id, _))) => room_id,
                _ => {
                    protocol_error(conn, "JOIN without a valid room id");
                    return Disposition::Handled(None);
                }
            };
            let target = rooms
                .iter()
                .position(|room| room.id == room_id && room.can_player_join(&conn.nickname));
            match target {
                Some(room_idx) => {
                    info!("{} joining room {room_id}", conn.nickname);
                    conn.send(Message::bare(code::JNOK));
                    conn.stage = InRoom;
                    Disposition::Handled(Some(room_idx))
                }
                None => {
                    debug!("{} refused room {room_id}", conn.nickname);
                    conn.send(Message::bare(code::JNFL));
                    Disposition::Handled(None)
                }
            }
        }

        _ => Disposition::Unexpected,
    }
}

fn send_next_room(conn: &mut Connection, rooms: &[Arc<Room>]) {
    if conn.room_send_index < rooms.len() {
        let listing = rooms[conn.room_send_index].listing_message();
        conn.send(listing);
        conn.room_send_index += 1;
    } else {
        conn.send(Message::bare(code::DONE));
        conn.stage = LobbyStage::AwaitingJoin;
    }
}

/// Protocol errors are terminal: log, best-effort DCON, disconnect.
fn protocol_error(conn: &mut Connection, reason: &str) {
    warn!("protocol error from {}: {reason}", conn.nickname);
    conn.send_now(&Message::bare(code::DCON));
    conn.set_disconnected();
}
