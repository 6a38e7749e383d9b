//! Per-room scheduler.
//!
//! Each room owns a dedicated thread and a fixed seat table. The lobby
//! hands connections in through a mutex-guarded incoming queue; the
//! room seats them (reconnect-by-nickname first), drives the game
//! state machine, and pushes departing connections back onto the
//! lobby's list. A seat whose player drops mid-hand stays occupied,
//! with nickname and chips intact, so the player can reconnect.
//!
//! The room publishes a small roster snapshot under a mutex so the
//! lobby thread can answer room listings, join checks, and reconnect
//! routing without touching room-owned state.

pub mod states;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use log::{debug, info, warn};

use crate::config::RoomSettings;
use crate::game::entities::{Card, Chips, Deck, SeatAction};
use crate::net::codec::PayloadWriter;
use crate::net::connection::{Connection, LobbyStage};
use crate::net::messages::{self, code, Message};

use states::{RoomState, StateLogic, StateTag};

/// Locks a mutex, recovering the guard if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Community-card exposure stage; orthogonal to the room state machine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RoundPhase {
    #[default]
    PreFlop,
    Flop,
    Turn,
    River,
}

/// One player slot. Persists across a disconnect within a hand:
/// `occupied` with `connection == None` means the seat is reserved for
/// a reconnecting player.
#[derive(Default)]
pub struct Seat {
    pub occupied: bool,
    pub nickname: String,
    pub chips: Chips,
    /// 0 or 2 cards.
    pub hand: Vec<Card>,
    pub is_ready: bool,
    pub is_folded: bool,
    pub showdown_ack: bool,
    pub round_bet: Chips,
    pub total_bet: Chips,
    pub last_action: SeatAction,
    pub last_action_amount: Chips,
    pub connection: Option<Connection>,
}

impl Seat {
    pub fn is_active(&self) -> bool {
        self.occupied
            && self
                .connection
                .as_ref()
                .is_some_and(|conn| !conn.is_disconnected())
    }

    /// Clears per-hand state while keeping the player seated.
    fn reset_for_hand(&mut self) {
        self.hand.clear();
        self.is_ready = false;
        self.is_folded = false;
        self.showdown_ack = false;
        self.round_bet = 0;
        self.total_bet = 0;
        self.last_action = SeatAction::None;
        self.last_action_amount = 0;
    }
}

/// Mutable room state the phase handlers operate on. Owned exclusively
/// by the room thread.
pub struct RoomCtx {
    pub id: u16,
    pub name: String,
    pub settings: RoomSettings,
    pub seats: Vec<Seat>,
    pub deck: Deck,
    pub community: Vec<Card>,
    pub pot: Chips,
    pub current_high_bet: Chips,
    pub dealer_idx: usize,
    pub current_actor: Option<usize>,
    pub round_phase: RoundPhase,
    pub room_locked: bool,
    /// Transition requested by the current phase; applied between ticks.
    pub pending: Option<StateTag>,
}

impl RoomCtx {
    fn new(id: u16, name: String, settings: RoomSettings) -> Self {
        let mut deck = Deck::default();
        deck.shuffle();
        Self {
            id,
            name,
            settings,
            seats: (0..settings.max_seats).map(|_| Seat::default()).collect(),
            deck,
            community: Vec::with_capacity(5),
            pot: 0,
            current_high_bet: 0,
            dealer_idx: 0,
            current_actor: None,
            round_phase: RoundPhase::PreFlop,
            room_locked: false,
            pending: None,
        }
    }

    pub fn request(&mut self, tag: StateTag) {
        self.pending = Some(tag);
    }

    pub fn active_count(&self) -> usize {
        self.seats.iter().filter(|seat| seat.is_active()).count()
    }

    pub fn send_to(&mut self, seat_idx: usize, msg: Message) {
        if let Some(conn) = self.seats[seat_idx].connection.as_mut() {
            if !conn.is_disconnected() {
                conn.send(msg);
            }
        }
    }

    pub fn broadcast(&mut self, msg: &Message) {
        for idx in 0..self.seats.len() {
            if self.seats[idx].is_active() {
                self.send_to(idx, msg.clone());
            }
        }
    }

    pub fn broadcast_except(&mut self, skip_idx: usize, msg: &Message) {
        for idx in 0..self.seats.len() {
            if idx != skip_idx && self.seats[idx].is_active() {
                self.send_to(idx, msg.clone());
            }
        }
    }

    /// The per-seat wire block used by RMST and PJIN.
    pub fn seat_block(&self, seat_idx: usize) -> Vec<u8> {
        let seat = &self.seats[seat_idx];
        PayloadWriter::new()
            .net_str(&seat.nickname)
            .var_int(seat.chips)
            .sm_int(u8::from(seat.is_folded))
            .sm_int(u8::from(seat.is_ready))
            .sm_int(u8::from(self.current_actor == Some(seat_idx)))
            .sm_int(seat.last_action.wire_value())
            .var_int(seat.last_action_amount)
            .var_int(seat.round_bet)
            .var_int(seat.total_bet)
            .finish()
    }

    /// The RMST snapshot sent to a player on seating or reconnect. The
    /// hole-card slots are always present; `cards_dealt` says whether
    /// they are meaningful.
    pub fn snapshot_message(&self, for_idx: usize) -> Message {
        let hand = &self.seats[for_idx].hand;
        let (dealt, hole1, hole2) = match hand.as_slice() {
            [first, second] => (1, first.0, second.0),
            _ => (0, 0, 0),
        };
        let mut writer = PayloadWriter::new()
            .var_int(self.pot)
            .var_int(self.current_high_bet)
            .sm_int(dealt)
            .sm_int(hole1)
            .sm_int(hole2)
            .sm_int(self.community.len() as u8);
        for card in &self.community {
            writer = writer.sm_int(card.0);
        }
        let occupied: Vec<usize> = (0..self.seats.len())
            .filter(|&idx| self.seats[idx].occupied)
            .collect();
        writer = writer.sm_int(occupied.len() as u8);
        for idx in occupied {
            writer = writer.raw(&self.seat_block(idx));
        }
        Message::with_payload(code::RMST, writer.finish())
    }
}

pub(crate) fn prdy_message(nickname: &str) -> Message {
    Message::with_payload(code::PRDY, PayloadWriter::new().net_str(nickname).finish())
}

pub(crate) fn ptrn_message(nickname: &str) -> Message {
    Message::with_payload(code::PTRN, PayloadWriter::new().net_str(nickname).finish())
}

pub(crate) fn pact_message(nickname: &str, action: SeatAction, amount: Chips) -> Message {
    Message::with_payload(
        code::PACT,
        PayloadWriter::new()
            .net_str(nickname)
            .sm_int(action.wire_value())
            .var_int(amount)
            .finish(),
    )
}

pub(crate) fn acfl_message(reason: &str) -> Message {
    Message::with_payload(code::ACFL, PayloadWriter::new().net_str(reason).finish())
}

pub(crate) fn crvr_message(card: Card) -> Message {
    Message::with_payload(code::CRVR, PayloadWriter::new().sm_int(card.0).finish())
}

pub(crate) fn cdtp_message(first: Card, second: Card) -> Message {
    Message::with_payload(
        code::CDTP,
        PayloadWriter::new().sm_int(first.0).sm_int(second.0).finish(),
    )
}

pub(crate) fn gwin_message(nickname: &str, pot: Chips) -> Message {
    Message::with_payload(
        code::GWIN,
        PayloadWriter::new().net_str(nickname).var_int(pot).finish(),
    )
}

/// Roster summary published for the lobby thread.
#[derive(Clone, Debug, Default)]
pub struct RoomSnapshot {
    /// One entry per occupied seat.
    pub seats: Vec<SeatSummary>,
    pub locked: bool,
}

#[derive(Clone, Debug)]
pub struct SeatSummary {
    pub nickname: String,
    pub connected: bool,
}

/// Handle to a running room. Shared between the lobby and the room's
/// own worker thread.
pub struct Room {
    pub id: u16,
    pub name: String,
    capacity: usize,
    incoming: Mutex<Vec<Connection>>,
    snapshot: Mutex<RoomSnapshot>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Room {
    /// Creates the room and starts its worker thread. Departing and
    /// unseatable connections are pushed onto `lobby_returns`.
    pub fn spawn(
        id: u16,
        name: String,
        settings: RoomSettings,
        lobby_returns: Arc<Mutex<Vec<Connection>>>,
        running: Arc<AtomicBool>,
    ) -> Arc<Self> {
        let room = Arc::new(Self {
            id,
            name: name.clone(),
            capacity: settings.max_seats,
            incoming: Mutex::new(Vec::new()),
            snapshot: Mutex::new(RoomSnapshot::default()),
            worker: Mutex::new(None),
        });

        let worker = RoomWorker {
            room: room.clone(),
            ctx: RoomCtx::new(id, name, settings),
            state: RoomState::initial(),
            lobby_returns,
            running,
            last_ping: Instant::now(),
        };
        let handle = thread::Builder::new()
            .name(format!("room-{id}"))
            .spawn(move || worker.run());
        match handle {
            Ok(handle) => *lock(&room.worker) = Some(handle),
            Err(error) => warn!("room {id}: failed to spawn worker: {error}"),
        }
        room
    }

    /// Hands a connection to the room; the worker seats it on its next
    /// tick.
    pub fn hand_off(&self, conn: Connection) {
        lock(&self.incoming).push(conn);
    }

    /// (occupied, capacity) from the published snapshot.
    pub fn occupancy(&self) -> (usize, usize) {
        (lock(&self.snapshot).seats.len(), self.capacity)
    }

    /// Whether an occupied seat is reserved for this nickname (its
    /// player disconnected and has not come back).
    pub fn has_reconnect_seat(&self, nickname: &str) -> bool {
        lock(&self.snapshot)
            .seats
            .iter()
            .any(|seat| seat.nickname == nickname && !seat.connected)
    }

    /// Join admission: a reserved seat always re-admits its nickname; a
    /// duplicate connected nickname is refused; otherwise the room must
    /// be unlocked and have a free seat.
    pub fn can_player_join(&self, nickname: &str) -> bool {
        let snapshot = lock(&self.snapshot);
        if let Some(seat) = snapshot.seats.iter().find(|seat| seat.nickname == nickname) {
            return !seat.connected;
        }
        !snapshot.locked && snapshot.seats.len() < self.capacity
    }

    /// The ROOM list entry for this room.
    pub fn listing_message(&self) -> Message {
        let (occupied, capacity) = self.occupancy();
        Message::with_payload(
            code::ROOM,
            PayloadWriter::new()
                .bg_int(self.id)
                .net_str(&self.name)
                .sm_int(occupied as u8)
                .sm_int(capacity as u8)
                .finish(),
        )
    }

    /// Joins the worker thread; call after the running flag is cleared.
    pub fn join_worker(&self) {
        if let Some(handle) = lock(&self.worker).take() {
            let _ = handle.join();
        }
    }
}

struct RoomWorker {
    room: Arc<Room>,
    ctx: RoomCtx,
    state: RoomState,
    lobby_returns: Arc<Mutex<Vec<Connection>>>,
    running: Arc<AtomicBool>,
    last_ping: Instant,
}

impl RoomWorker {
    fn run(mut self) {
        info!("room {} '{}' starting", self.ctx.id, self.ctx.name);
        self.state.on_enter(&mut self.ctx);
        self.publish_snapshot();
        while self.running.load(Ordering::Acquire) {
            self.ingest();
            self.keepalive();
            self.pump_io();
            self.state.on_tick(&mut self.ctx);
            if let Some(tag) = self.ctx.pending.take() {
                self.state.on_leave(&mut self.ctx);
                self.state = RoomState::from_tag(tag);
                self.state.on_enter(&mut self.ctx);
            }
            self.publish_snapshot();
            self.flush_all();
            thread::sleep(self.ctx.settings.tick_interval);
        }
        info!("room {} stopping", self.ctx.id);
    }

    /// Seats arrivals from the lobby: reconnect-by-nickname first, then
    /// the first free seat; a full room sends the connection back.
    fn ingest(&mut self) {
        let arrivals: Vec<Connection> = lock(&self.room.incoming).drain(..).collect();
        for mut conn in arrivals {
            conn.stage = LobbyStage::InRoom;

            let reconnect_idx = self.ctx.seats.iter().position(|seat| {
                seat.occupied && seat.connection.is_none() && seat.nickname == conn.nickname
            });
            if let Some(idx) = reconnect_idx {
                info!(
                    "room {}: {} reconnected to seat {idx}",
                    self.ctx.id, conn.nickname
                );
                self.ctx.seats[idx].connection = Some(conn);
                self.announce_seated(idx);
                continue;
            }

            let free_idx = self.ctx.seats.iter().position(|seat| !seat.occupied);
            if let Some(idx) = free_idx {
                info!(
                    "room {}: {} seated at seat {idx}",
                    self.ctx.id, conn.nickname
                );
                let seat = &mut self.ctx.seats[idx];
                seat.occupied = true;
                seat.nickname = conn.nickname.clone();
                seat.chips = conn.chips;
                seat.connection = Some(conn);
                self.announce_seated(idx);
                continue;
            }

            debug!(
                "room {}: no free seat for {}, returning to lobby",
                self.ctx.id, conn.nickname
            );
            conn.stage = LobbyStage::AwaitingJoin;
            lock(&self.lobby_returns).push(conn);
        }
    }

    fn announce_seated(&mut self, idx: usize) {
        let block = self.ctx.seat_block(idx);
        self.ctx
            .broadcast_except(idx, &Message::with_payload(code::PJIN, block));
        let snapshot = self.ctx.snapshot_message(idx);
        self.ctx.send_to(idx, snapshot);
    }

    fn keepalive(&mut self) {
        if self.last_ping.elapsed() < self.ctx.settings.ping_interval {
            return;
        }
        self.last_ping = Instant::now();
        for seat in &mut self.ctx.seats {
            if seat.occupied {
                if let Some(conn) = seat.connection.as_mut() {
                    conn.keepalive_tick();
                }
            }
        }
    }

    /// Reaps dead connections (the seat stays reserved) and dispatches
    /// inbound messages to the current phase. GMLV is intercepted here:
    /// the connection goes back to the lobby; the seat is freed only in
    /// the room's lobby phase.
    fn pump_io(&mut self) {
        for idx in 0..self.ctx.seats.len() {
            let dead = self.ctx.seats[idx]
                .connection
                .as_ref()
                .is_some_and(|conn| conn.is_disconnected());
            if dead {
                info!(
                    "room {}: {} disconnected, reserving seat {idx}",
                    self.ctx.id, self.ctx.seats[idx].nickname
                );
                self.ctx.seats[idx].connection = None;
            }

            if !self.ctx.seats[idx].is_active() {
                continue;
            }
            loop {
                let Some(msg) = self.ctx.seats[idx]
                    .connection
                    .as_ref()
                    .and_then(Connection::poll_message)
                else {
                    break;
                };

                if msg.code == code::GMLV {
                    self.handle_leave(idx);
                    break;
                }
                if msg.code == code::DCON {
                    if let Some(conn) = self.ctx.seats[idx].connection.as_ref() {
                        conn.set_disconnected();
                    }
                    break;
                }
                if !messages::is_known(msg.code) {
                    warn!(
                        "room {}: unknown code {} from {}, disconnecting",
                        self.ctx.id, msg.code, self.ctx.seats[idx].nickname
                    );
                    if let Some(conn) = self.ctx.seats[idx].connection.as_mut() {
                        conn.send_now(&Message::bare(code::DCON));
                        conn.set_disconnected();
                    }
                    break;
                }
                self.state.on_message(&mut self.ctx, idx, &msg);
            }
        }
    }

    fn handle_leave(&mut self, idx: usize) {
        info!(
            "room {}: {} left the room",
            self.ctx.id, self.ctx.seats[idx].nickname
        );
        self.ctx.seats[idx].last_action = SeatAction::Left;
        self.ctx.seats[idx].last_action_amount = 0;
        let pact = pact_message(&self.ctx.seats[idx].nickname.clone(), SeatAction::Left, 0);
        self.ctx.broadcast_except(idx, &pact);

        if let Some(mut conn) = self.ctx.seats[idx].connection.take() {
            conn.flush();
            conn.stage = LobbyStage::AwaitingJoin;
            lock(&self.lobby_returns).push(conn);
        }
        if self.state.tag() == StateTag::Lobby {
            self.ctx.seats[idx] = Seat::default();
        }
    }

    fn publish_snapshot(&self) {
        let seats = self
            .ctx
            .seats
            .iter()
            .filter(|seat| seat.occupied)
            .map(|seat| SeatSummary {
                nickname: seat.nickname.clone(),
                connected: seat
                    .connection
                    .as_ref()
                    .is_some_and(|conn| !conn.is_disconnected()),
            })
            .collect();
        *lock(&self.room.snapshot) = RoomSnapshot {
            seats,
            locked: self.ctx.room_locked,
        };
    }

    fn flush_all(&mut self) {
        for seat in &mut self.ctx.seats {
            if let Some(conn) = seat.connection.as_mut() {
                conn.flush();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::codec::PayloadReader;

    fn test_ctx() -> RoomCtx {
        RoomCtx::new(7, "Test Room".to_string(), RoomSettings::default())
    }

    #[test]
    fn seat_block_layout() {
        let mut ctx = test_ctx();
        let seat = &mut ctx.seats[0];
        seat.occupied = true;
        seat.nickname = "alice".to_string();
        seat.chips = 850;
        seat.is_ready = true;
        seat.round_bet = 150;
        seat.total_bet = 200;
        seat.last_action = SeatAction::Bet;
        seat.last_action_amount = 150;
        ctx.current_actor = Some(0);

        let block = ctx.seat_block(0);
        let mut reader = PayloadReader::new(&block);
        assert_eq!(reader.net_str().unwrap(), "alice");
        assert_eq!(reader.var_int().unwrap(), 850);
        assert_eq!(reader.sm_int().unwrap(), 0); // folded
        assert_eq!(reader.sm_int().unwrap(), 1); // ready
        assert_eq!(reader.sm_int().unwrap(), 1); // current turn
        assert_eq!(reader.sm_int().unwrap(), SeatAction::Bet.wire_value());
        assert_eq!(reader.var_int().unwrap(), 150);
        assert_eq!(reader.var_int().unwrap(), 150);
        assert_eq!(reader.var_int().unwrap(), 200);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn snapshot_carries_hole_cards_and_occupied_seats() {
        let mut ctx = test_ctx();
        ctx.pot = 300;
        ctx.current_high_bet = 100;
        ctx.community = vec![Card(10), Card(22), Card(34)];

        ctx.seats[0].occupied = true;
        ctx.seats[0].nickname = "alice".to_string();
        ctx.seats[0].hand = vec![Card(5), Card(18)];
        // A reserved seat (player disconnected) still shows up.
        ctx.seats[2].occupied = true;
        ctx.seats[2].nickname = "bob".to_string();

        let msg = ctx.snapshot_message(0);
        assert_eq!(msg.code, code::RMST);
        let payload = msg.payload.unwrap();
        let mut reader = PayloadReader::new(&payload);
        assert_eq!(reader.var_int().unwrap(), 300);
        assert_eq!(reader.var_int().unwrap(), 100);
        assert_eq!(reader.sm_int().unwrap(), 1); // cards dealt
        assert_eq!(reader.sm_int().unwrap(), 5);
        assert_eq!(reader.sm_int().unwrap(), 18);
        assert_eq!(reader.sm_int().unwrap(), 3); // community count
        assert_eq!(reader.sm_int().unwrap(), 10);
        assert_eq!(reader.sm_int().unwrap(), 22);
        assert_eq!(reader.sm_int().unwrap(), 34);
        assert_eq!(reader.sm_int().unwrap(), 2); // occupied seats
        assert_eq!(reader.net_str().unwrap(), "alice");
    }

    #[test]
    fn snapshot_without_cards_flags_them_invalid() {
        let mut ctx = test_ctx();
        ctx.seats[1].occupied = true;
        ctx.seats[1].nickname = "bob".to_string();

        let msg = ctx.snapshot_message(1);
        let payload = msg.payload.unwrap();
        let mut reader = PayloadReader::new(&payload);
        let _pot = reader.var_int().unwrap();
        let _high_bet = reader.var_int().unwrap();
        assert_eq!(reader.sm_int().unwrap(), 0); // no cards dealt
        assert_eq!(reader.sm_int().unwrap(), 0);
        assert_eq!(reader.sm_int().unwrap(), 0);
    }

    #[test]
    fn pact_layout_round_trips() {
        let msg = pact_message("bob", SeatAction::Call, 250);
        let payload = msg.payload.unwrap();
        let mut reader = PayloadReader::new(&payload);
        assert_eq!(reader.net_str().unwrap(), "bob");
        assert_eq!(reader.sm_int().unwrap(), 2);
        assert_eq!(reader.var_int().unwrap(), 250);
    }
}
