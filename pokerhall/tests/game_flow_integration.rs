/// Integration tests for the full server: handshake, room listing,
/// joining, a complete hand, reconnects, and timeouts.
///
/// Each test starts a real server on an ephemeral port and drives it
/// with blocking clients.
use std::thread;
use std::time::Duration;

use pokerhall::net::client::Client;
use pokerhall::net::codec::PayloadReader;
use pokerhall::net::messages::{action_value, code, Message};
use pokerhall::{server, ServerConfig, ServerHandle};

fn start_server(turn_timeout: Duration) -> ServerHandle {
    let mut config = ServerConfig::default();
    config.bind = "127.0.0.1:0".parse().unwrap();
    config.lobby_tick = Duration::from_millis(10);
    config.room.tick_interval = Duration::from_millis(5);
    config.room.turn_timeout = turn_timeout;
    config.room.showdown_ack_timeout = Duration::from_secs(2);
    server::start(config).unwrap()
}

/// CONN + PINF handshake, ending in the awaiting-join stage.
fn handshake(nickname: &str, handle: &ServerHandle) -> Client {
    let (mut client, reply) = Client::connect(nickname, &handle.addr()).unwrap();
    assert_eq!(reply.code, code::PNOK);
    client.send_player_info(1000).unwrap();
    client.recv_expect(code::PIOK).unwrap();
    client
}

/// JOIN and wait for the seat snapshot.
fn enter_room(client: &mut Client, room_id: u16) -> Vec<u8> {
    client.join(room_id).unwrap();
    client.recv_until(code::JNOK).unwrap();
    let snapshot = client.recv_until(code::RMST).unwrap();
    snapshot.payload.unwrap()
}

fn read_nickname(msg: &Message) -> String {
    let payload = msg.payload.as_deref().unwrap();
    PayloadReader::new(payload).net_str().unwrap()
}

/// Discards messages until this player's own PTRN arrives.
fn wait_for_turn(client: &mut Client, nickname: &str) {
    loop {
        let msg = client.recv_until(code::PTRN).unwrap();
        if read_nickname(&msg) == nickname {
            return;
        }
    }
}

/// Discards messages until a PACT for `nickname` arrives; returns
/// (action, amount).
fn wait_for_action(client: &mut Client, nickname: &str) -> (u8, i64) {
    loop {
        let msg = client.recv_until(code::PACT).unwrap();
        let payload = msg.payload.as_deref().unwrap();
        let mut reader = PayloadReader::new(payload);
        let actor = reader.net_str().unwrap();
        let action = reader.sm_int().unwrap();
        let amount = reader.var_int().unwrap();
        if actor == nickname {
            return (action, amount);
        }
    }
}

#[test]
fn handshake_and_room_listing() {
    let handle = start_server(Duration::from_secs(30));
    let mut alice = handshake("alice", &handle);

    let rooms = alice.request_rooms().unwrap();
    assert_eq!(rooms.len(), 4);
    assert_eq!(rooms[0].id, 1);
    assert_eq!(rooms[0].name, "Room 1");
    assert_eq!(rooms[0].occupied, 0);
    assert_eq!(rooms[0].capacity, 4);
}

#[test]
fn join_unknown_room_is_refused() {
    let handle = start_server(Duration::from_secs(30));
    let mut alice = handshake("alice", &handle);

    alice.join(99).unwrap();
    alice.recv_expect(code::JNFL).unwrap();

    // The connection survives and can still join a real room.
    let snapshot = enter_room(&mut alice, 1);
    let mut reader = PayloadReader::new(&snapshot);
    assert_eq!(reader.var_int().unwrap(), 0); // pot
}

#[test]
fn room_listing_reflects_occupancy() {
    let handle = start_server(Duration::from_secs(30));
    let mut alice = handshake("alice", &handle);
    enter_room(&mut alice, 1);
    thread::sleep(Duration::from_millis(200));

    let mut bob = handshake("bob", &handle);
    let rooms = bob.request_rooms().unwrap();
    assert_eq!(rooms[0].occupied, 1);
    assert_eq!(rooms[1].occupied, 0);
}

#[test]
fn unexpected_messages_fail_then_disconnect() {
    let handle = start_server(Duration::from_secs(30));
    let (mut alice, reply) = Client::connect("alice", &handle.addr()).unwrap();
    assert_eq!(reply.code, code::PNOK);

    // JOIN is in the catalog but invalid before PINF: two strikes get
    // FAIL, the third a forced disconnect.
    alice.send(&Message::join(1)).unwrap();
    assert_eq!(alice.recv().unwrap().code, code::FAIL);
    alice.send(&Message::join(1)).unwrap();
    assert_eq!(alice.recv().unwrap().code, code::FAIL);
    alice.send(&Message::join(1)).unwrap();
    assert_eq!(alice.recv().unwrap().code, code::DCON);
}

#[test]
fn unknown_code_disconnects_immediately() {
    let handle = start_server(Duration::from_secs(30));
    let (mut alice, _) = Client::connect("alice", &handle.addr()).unwrap();

    alice
        .send(&Message::bare(pokerhall::net::messages::Code(*b"XXXX")))
        .unwrap();
    assert_eq!(alice.recv().unwrap().code, code::DCON);
}

#[test]
fn ready_loop_deals_a_hand() {
    let handle = start_server(Duration::from_secs(30));
    let mut alice = handshake("alice", &handle);
    let mut bob = handshake("bob", &handle);

    enter_room(&mut alice, 1);
    enter_room(&mut bob, 1);

    // Alice hears about Bob's arrival.
    alice.recv_until(code::PJIN).unwrap();

    alice.ready().unwrap();
    alice.recv_expect(code::ACOK).unwrap();
    let prdy = bob.recv_until(code::PRDY).unwrap();
    assert_eq!(read_nickname(&prdy), "alice");

    bob.ready().unwrap();
    bob.recv_until(code::ACOK).unwrap();

    // Hand starts: GMST, private hole cards, then the first turn.
    alice.recv_until(code::GMST).unwrap();
    let cards = alice.recv_until(code::CDTP).unwrap();
    let payload = cards.payload.unwrap();
    let mut reader = PayloadReader::new(&payload);
    let first = reader.sm_int().unwrap();
    let second = reader.sm_int().unwrap();
    assert!(first < 52 && second < 52);
    assert_ne!(first, second);

    bob.recv_until(code::CDTP).unwrap();

    // Seat 0 is the dealer, so seat 1 (Bob) acts first.
    alice.recv_until(code::GMRD).unwrap();
    wait_for_turn(&mut bob, "bob");
}

#[test]
fn bet_call_and_checks_play_out_a_full_hand() {
    let handle = start_server(Duration::from_secs(30));
    let mut alice = handshake("alice", &handle);
    let mut bob = handshake("bob", &handle);
    enter_room(&mut alice, 1);
    enter_room(&mut bob, 1);
    alice.ready().unwrap();
    bob.ready().unwrap();

    // Pre-flop: Bob bets 100, Alice calls.
    wait_for_turn(&mut bob, "bob");
    bob.bet(100).unwrap();
    bob.recv_until(code::ACOK).unwrap();
    let (action, amount) = wait_for_action(&mut alice, "bob");
    assert_eq!(action, action_value::BET);
    assert_eq!(amount, 100);

    wait_for_turn(&mut alice, "alice");
    alice.call().unwrap();
    alice.recv_until(code::ACOK).unwrap();
    let (action, amount) = wait_for_action(&mut bob, "alice");
    assert_eq!(action, action_value::CALL);
    assert_eq!(amount, 100);

    // Flop arrives: three community cards, then a fresh betting round.
    let mut flop = Vec::new();
    for _ in 0..3 {
        let msg = alice.recv_until(code::CRVR).unwrap();
        let payload = msg.payload.unwrap();
        flop.push(PayloadReader::new(&payload).sm_int().unwrap());
    }
    assert_eq!(flop.len(), 3);
    alice.recv_until(code::GMRD).unwrap();

    // Flop, turn, river: both players check through.
    for _ in 0..3 {
        wait_for_turn(&mut bob, "bob");
        bob.check().unwrap();
        bob.recv_until(code::ACOK).unwrap();
        wait_for_turn(&mut alice, "alice");
        alice.check().unwrap();
        alice.recv_until(code::ACOK).unwrap();
    }

    // Showdown: both hands revealed, the pot goes to one of them.
    let showdown = alice.recv_until(code::SDWN).unwrap();
    let payload = showdown.payload.unwrap();
    let mut reader = PayloadReader::new(&payload);
    assert_eq!(reader.sm_int().unwrap(), 2);

    let gwin = alice.recv_until(code::GWIN).unwrap();
    let payload = gwin.payload.unwrap();
    let mut reader = PayloadReader::new(&payload);
    let winner = reader.net_str().unwrap();
    let pot = reader.var_int().unwrap();
    assert!(winner == "alice" || winner == "bob");
    assert_eq!(pot, 200);

    alice.showdown_ok().unwrap();
    bob.recv_until(code::GWIN).unwrap();
    bob.showdown_ok().unwrap();

    alice.recv_until(code::GMDN).unwrap();
    bob.recv_until(code::GMDN).unwrap();
}

#[test]
fn disconnected_player_can_reconnect_mid_hand() {
    let handle = start_server(Duration::from_secs(30));
    let mut alice = handshake("alice", &handle);
    let mut bob = handshake("bob", &handle);
    enter_room(&mut alice, 1);
    enter_room(&mut bob, 1);
    alice.ready().unwrap();
    bob.ready().unwrap();

    // Record Alice's hole cards, then drop her mid-hand.
    let cards = alice.recv_until(code::CDTP).unwrap();
    let payload = cards.payload.unwrap();
    let mut reader = PayloadReader::new(&payload);
    let first = reader.sm_int().unwrap();
    let second = reader.sm_int().unwrap();
    drop(alice);

    // Give the room a moment to reap the dead connection; the seat
    // stays reserved because a hand is in progress.
    thread::sleep(Duration::from_millis(300));

    let (mut alice, reply) = Client::connect("alice", &handle.addr()).unwrap();
    assert_eq!(reply.code, code::RCON);
    alice.accept_reconnect().unwrap();

    // The room reattaches the seat and replays the snapshot, hole
    // cards included.
    let snapshot = alice.recv_until(code::RMST).unwrap();
    let payload = snapshot.payload.unwrap();
    let mut reader = PayloadReader::new(&payload);
    let _pot = reader.var_int().unwrap();
    let _high_bet = reader.var_int().unwrap();
    assert_eq!(reader.sm_int().unwrap(), 1); // cards dealt
    assert_eq!(reader.sm_int().unwrap(), first);
    assert_eq!(reader.sm_int().unwrap(), second);

    // Bob saw the rejoin.
    let pjin = bob.recv_until(code::PJIN).unwrap();
    assert_eq!(read_nickname(&pjin), "alice");
}

#[test]
fn silent_actor_is_auto_folded() {
    let handle = start_server(Duration::from_secs(1));
    let mut alice = handshake("alice", &handle);
    let mut bob = handshake("bob", &handle);
    enter_room(&mut alice, 1);
    enter_room(&mut bob, 1);
    alice.ready().unwrap();
    bob.ready().unwrap();

    // Bob is first to act and stays silent past the turn timeout.
    wait_for_turn(&mut bob, "bob");
    let (action, amount) = wait_for_action(&mut alice, "bob");
    assert_eq!(action, action_value::FOLD);
    assert_eq!(amount, 0);

    // The turn advances to Alice.
    wait_for_turn(&mut alice, "alice");
}

#[test]
fn leaving_a_room_returns_to_the_lobby() {
    let handle = start_server(Duration::from_secs(30));
    let mut alice = handshake("alice", &handle);
    enter_room(&mut alice, 1);

    alice.leave_room().unwrap();
    thread::sleep(Duration::from_millis(300));

    // Back in the lobby, the room list works again and the seat was
    // freed.
    let rooms = alice.request_rooms().unwrap();
    assert_eq!(rooms[0].occupied, 0);
}

#[test]
fn join_is_refused_while_a_hand_is_running() {
    let handle = start_server(Duration::from_secs(30));
    let mut alice = handshake("alice", &handle);
    let mut bob = handshake("bob", &handle);
    enter_room(&mut alice, 1);
    enter_room(&mut bob, 1);
    alice.ready().unwrap();
    bob.ready().unwrap();
    alice.recv_until(code::GMST).unwrap();

    // The room is locked mid-hand; a third player bounces.
    let mut carol = handshake("carol", &handle);
    carol.join(1).unwrap();
    carol.recv_expect(code::JNFL).unwrap();

    // Another room still admits her.
    enter_room(&mut carol, 2);
}
