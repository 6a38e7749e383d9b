//! Room phase handlers.
//!
//! One struct per phase, dispatched through `RoomState`. A phase asks
//! for a transition by calling `ctx.request(..)`; the room worker
//! applies it between ticks, so `on_enter`/`on_tick`/`on_leave` never
//! interleave across a transition.

use std::collections::VecDeque;
use std::time::Instant;

use enum_dispatch::enum_dispatch;
use log::{debug, info, warn};

use crate::game::entities::SeatAction;
use crate::game::scoring::{score_hand, HandScore};
use crate::net::codec::{read_var_int, PayloadWriter};
use crate::net::messages::{code, Message};

use super::{
    acfl_message, cdtp_message, crvr_message, gwin_message, pact_message, prdy_message,
    ptrn_message, RoomCtx, RoundPhase, Seat,
};

/// Names a phase for transition requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StateTag {
    Lobby,
    Dealing,
    CommunityCard,
    Betting,
    Showdown,
}

#[enum_dispatch]
pub trait StateLogic {
    fn on_enter(&mut self, ctx: &mut RoomCtx);
    fn on_tick(&mut self, ctx: &mut RoomCtx);
    fn on_leave(&mut self, ctx: &mut RoomCtx);
    fn on_message(&mut self, ctx: &mut RoomCtx, seat_idx: usize, msg: &Message);
}

#[enum_dispatch(StateLogic)]
pub enum RoomState {
    LobbyState,
    DealingState,
    CommunityCardState,
    BettingState,
    ShowdownState,
}

impl RoomState {
    pub fn initial() -> Self {
        Self::LobbyState(LobbyState)
    }

    pub fn from_tag(tag: StateTag) -> Self {
        match tag {
            StateTag::Lobby => Self::LobbyState(LobbyState),
            StateTag::Dealing => Self::DealingState(DealingState),
            StateTag::CommunityCard => Self::CommunityCardState(CommunityCardState),
            StateTag::Betting => Self::BettingState(BettingState::default()),
            StateTag::Showdown => Self::ShowdownState(ShowdownState::default()),
        }
    }

    pub fn tag(&self) -> StateTag {
        match self {
            Self::LobbyState(_) => StateTag::Lobby,
            Self::DealingState(_) => StateTag::Dealing,
            Self::CommunityCardState(_) => StateTag::CommunityCard,
            Self::BettingState(_) => StateTag::Betting,
            Self::ShowdownState(_) => StateTag::Showdown,
        }
    }
}

/// Waiting for at least two seated players to ready up.
pub struct LobbyState;

impl StateLogic for LobbyState {
    fn on_enter(&mut self, ctx: &mut RoomCtx) {
        debug!("room {}: enter lobby", ctx.id);
        for seat in &mut ctx.seats {
            if seat.occupied && seat.connection.is_none() {
                // The reconnect reservation ends when a new lobby
                // begins; the seat becomes a true vacancy.
                *seat = Seat::default();
            } else if seat.occupied {
                seat.reset_for_hand();
            }
        }
        ctx.pot = 0;
        ctx.current_high_bet = 0;
        ctx.community.clear();
        ctx.deck.shuffle();
        ctx.current_actor = None;
        ctx.round_phase = RoundPhase::PreFlop;
        ctx.room_locked = false;
    }

    fn on_tick(&mut self, ctx: &mut RoomCtx) {
        for seat in &mut ctx.seats {
            if seat.occupied && seat.connection.is_none() {
                *seat = Seat::default();
            }
        }
        let active = ctx.active_count();
        let ready = ctx
            .seats
            .iter()
            .filter(|seat| seat.is_active() && seat.is_ready)
            .count();
        if active >= 2 && ready == active {
            ctx.request(StateTag::Dealing);
        }
    }

    fn on_leave(&mut self, _ctx: &mut RoomCtx) {}

    fn on_message(&mut self, ctx: &mut RoomCtx, seat_idx: usize, msg: &Message) {
        if msg.code == code::RDY1 {
            ctx.seats[seat_idx].is_ready = true;
            ctx.send_to(seat_idx, Message::bare(code::ACOK));
            let nickname = ctx.seats[seat_idx].nickname.clone();
            ctx.broadcast_except(seat_idx, &prdy_message(&nickname));
        } else {
            debug!("room {}: unexpected {} in lobby", ctx.id, msg.code);
        }
    }
}

/// Locks the room and deals hole cards.
pub struct DealingState;

impl StateLogic for DealingState {
    fn on_enter(&mut self, ctx: &mut RoomCtx) {
        info!("room {}: hand starting", ctx.id);
        ctx.room_locked = true;
        ctx.broadcast(&Message::bare(code::GMST));
        ctx.round_phase = RoundPhase::PreFlop;
        for idx in 0..ctx.seats.len() {
            if ctx.seats[idx].is_active() && ctx.seats[idx].is_ready {
                let first = ctx.deck.deal_card();
                let second = ctx.deck.deal_card();
                ctx.seats[idx].hand = vec![first, second];
                ctx.send_to(idx, cdtp_message(first, second));
            }
        }
    }

    fn on_tick(&mut self, ctx: &mut RoomCtx) {
        ctx.request(StateTag::Betting);
    }

    fn on_leave(&mut self, _ctx: &mut RoomCtx) {}

    fn on_message(&mut self, ctx: &mut RoomCtx, _seat_idx: usize, msg: &Message) {
        debug!("room {}: unexpected {} while dealing", ctx.id, msg.code);
    }
}

/// Advances the round phase and reveals community cards.
pub struct CommunityCardState;

impl StateLogic for CommunityCardState {
    fn on_enter(&mut self, ctx: &mut RoomCtx) {
        let cards_to_draw = match ctx.round_phase {
            RoundPhase::PreFlop => {
                ctx.round_phase = RoundPhase::Flop;
                3
            }
            RoundPhase::Flop => {
                ctx.round_phase = RoundPhase::Turn;
                1
            }
            RoundPhase::Turn => {
                ctx.round_phase = RoundPhase::River;
                1
            }
            RoundPhase::River => {
                warn!("room {}: reveal requested after the river", ctx.id);
                0
            }
        };
        for _ in 0..cards_to_draw {
            let card = ctx.deck.deal_card();
            ctx.community.push(card);
            ctx.broadcast(&crvr_message(card));
        }
    }

    fn on_tick(&mut self, ctx: &mut RoomCtx) {
        ctx.request(StateTag::Betting);
    }

    fn on_leave(&mut self, _ctx: &mut RoomCtx) {}

    fn on_message(&mut self, ctx: &mut RoomCtx, _seat_idx: usize, msg: &Message) {
        debug!("room {}: unexpected {} during reveal", ctx.id, msg.code);
    }
}

/// One betting round: walks the action queue, enforces the
/// one-bet-per-round limit, and auto-folds on turn timeout.
#[derive(Default)]
pub struct BettingState {
    action_queue: VecDeque<usize>,
    has_bet: bool,
    turn_deadline: Option<Instant>,
}

impl BettingState {
    fn next_turn(&mut self, ctx: &mut RoomCtx) {
        loop {
            let Some(idx) = self.action_queue.pop_front() else {
                ctx.current_actor = None;
                self.turn_deadline = None;
                return;
            };
            // Seats that dropped or folded since queueing are skipped.
            if ctx.seats[idx].is_active() && !ctx.seats[idx].is_folded {
                ctx.current_actor = Some(idx);
                self.turn_deadline = Some(Instant::now() + ctx.settings.turn_timeout);
                let nickname = ctx.seats[idx].nickname.clone();
                ctx.broadcast(&ptrn_message(&nickname));
                return;
            }
        }
    }

    /// After a bet, everyone still in the hand owes another action,
    /// starting just after the aggressor and excluding the aggressor.
    fn requeue_after_bet(&mut self, ctx: &RoomCtx, aggressor_idx: usize) {
        self.action_queue.clear();
        let seat_count = ctx.seats.len();
        let start = (aggressor_idx + 1) % seat_count;
        for offset in 0..seat_count {
            let idx = (start + offset) % seat_count;
            if idx == aggressor_idx {
                continue;
            }
            if ctx.seats[idx].is_active() && !ctx.seats[idx].is_folded {
                self.action_queue.push_back(idx);
            }
        }
    }

    fn complete_action(
        &mut self,
        ctx: &mut RoomCtx,
        seat_idx: usize,
        action: SeatAction,
        amount: i64,
    ) {
        ctx.seats[seat_idx].last_action = action;
        ctx.seats[seat_idx].last_action_amount = amount;
        ctx.send_to(seat_idx, Message::bare(code::ACOK));
        let nickname = ctx.seats[seat_idx].nickname.clone();
        ctx.broadcast_except(seat_idx, &pact_message(&nickname, action, amount));
        self.next_turn(ctx);
    }
}

impl StateLogic for BettingState {
    fn on_enter(&mut self, ctx: &mut RoomCtx) {
        ctx.broadcast(&Message::bare(code::GMRD));
        for seat in &mut ctx.seats {
            if !seat.occupied {
                continue;
            }
            seat.total_bet += seat.round_bet;
            seat.round_bet = 0;
            seat.last_action_amount = 0;
            if !matches!(seat.last_action, SeatAction::Fold | SeatAction::Left) {
                seat.last_action = SeatAction::None;
            }
        }
        ctx.current_high_bet = 0;
        self.has_bet = false;

        self.action_queue.clear();
        let seat_count = ctx.seats.len();
        let start = (ctx.dealer_idx + 1) % seat_count;
        for offset in 0..seat_count {
            let idx = (start + offset) % seat_count;
            let seat = &ctx.seats[idx];
            if seat.is_active() && !seat.is_folded && seat.is_ready {
                self.action_queue.push_back(idx);
            }
        }
        self.next_turn(ctx);
    }

    fn on_tick(&mut self, ctx: &mut RoomCtx) {
        let Some(actor_idx) = ctx.current_actor else {
            if ctx.round_phase == RoundPhase::River {
                ctx.request(StateTag::Showdown);
            } else {
                ctx.request(StateTag::CommunityCard);
            }
            return;
        };

        let timed_out = self
            .turn_deadline
            .is_some_and(|deadline| Instant::now() >= deadline);
        if timed_out {
            info!(
                "room {}: {} timed out, auto-folding",
                ctx.id, ctx.seats[actor_idx].nickname
            );
            ctx.seats[actor_idx].is_folded = true;
            ctx.seats[actor_idx].last_action = SeatAction::Fold;
            ctx.seats[actor_idx].last_action_amount = 0;
            let nickname = ctx.seats[actor_idx].nickname.clone();
            ctx.broadcast(&pact_message(&nickname, SeatAction::Fold, 0));
            self.next_turn(ctx);
        }
    }

    fn on_leave(&mut self, ctx: &mut RoomCtx) {
        ctx.current_actor = None;
    }

    fn on_message(&mut self, ctx: &mut RoomCtx, seat_idx: usize, msg: &Message) {
        let is_game_action = [code::FOLD, code::CHCK, code::CALL, code::BETT].contains(&msg.code);
        if !is_game_action {
            debug!("room {}: unexpected {} while betting", ctx.id, msg.code);
            return;
        }
        if ctx.current_actor != Some(seat_idx) {
            ctx.send_to(seat_idx, Message::bare(code::NYET));
            return;
        }

        if msg.code == code::FOLD {
            ctx.seats[seat_idx].is_folded = true;
            self.complete_action(ctx, seat_idx, SeatAction::Fold, 0);
        } else if msg.code == code::CHCK {
            if ctx.current_high_bet > ctx.seats[seat_idx].round_bet {
                ctx.send_to(seat_idx, acfl_message("Cannot check, must call"));
                return;
            }
            self.complete_action(ctx, seat_idx, SeatAction::Check, 0);
        } else if msg.code == code::CALL {
            let seat = &mut ctx.seats[seat_idx];
            let owed = (ctx.current_high_bet - seat.round_bet).max(0);
            let paid = owed.min(seat.chips);
            seat.chips -= paid;
            seat.round_bet += paid;
            ctx.pot += paid;
            self.complete_action(ctx, seat_idx, SeatAction::Call, paid);
        } else {
            // BETT
            if self.has_bet {
                ctx.send_to(seat_idx, acfl_message("Cannot raise (limit 1 bet/round)"));
                return;
            }
            let Some(payload) = &msg.payload else {
                ctx.send_to(seat_idx, acfl_message("Bet amount required"));
                return;
            };
            let amount = match read_var_int(payload) {
                Ok((amount, _)) => amount,
                Err(_) => {
                    ctx.send_to(seat_idx, acfl_message("Invalid bet amount"));
                    return;
                }
            };
            if amount <= 0 {
                ctx.send_to(seat_idx, acfl_message("Invalid bet amount"));
                return;
            }
            if amount > ctx.seats[seat_idx].chips {
                ctx.send_to(seat_idx, acfl_message("Not enough chips"));
                return;
            }
            ctx.current_high_bet = amount;
            let seat = &mut ctx.seats[seat_idx];
            seat.round_bet = amount;
            seat.chips -= amount;
            ctx.pot += amount;
            self.has_bet = true;
            self.requeue_after_bet(ctx, seat_idx);
            self.complete_action(ctx, seat_idx, SeatAction::Bet, amount);
        }
    }
}

/// Reveals hands, picks the winner, and waits for acks.
#[derive(Default)]
pub struct ShowdownState {
    ack_deadline: Option<Instant>,
}

impl ShowdownState {
    fn best_contender(ctx: &RoomCtx, contenders: &[usize]) -> Option<usize> {
        let board: [crate::game::entities::Card; 5] = match ctx.community.as_slice().try_into() {
            Ok(board) => board,
            Err(_) => {
                warn!(
                    "room {}: showdown with {} community cards",
                    ctx.id,
                    ctx.community.len()
                );
                return contenders.first().copied();
            }
        };
        contenders
            .iter()
            .copied()
            .max_by_key(|&idx| match ctx.seats[idx].hand.as_slice() {
                [first, second] => score_hand([*first, *second], board),
                _ => HandScore::default(),
            })
    }
}

impl StateLogic for ShowdownState {
    fn on_enter(&mut self, ctx: &mut RoomCtx) {
        let participants: Vec<usize> = (0..ctx.seats.len())
            .filter(|&idx| ctx.seats[idx].occupied && ctx.seats[idx].hand.len() == 2)
            .collect();

        let mut writer = PayloadWriter::new().sm_int(participants.len() as u8);
        for &idx in &participants {
            let seat = &ctx.seats[idx];
            writer = writer
                .net_str(&seat.nickname)
                .sm_int(seat.hand[0].0)
                .sm_int(seat.hand[1].0);
        }
        ctx.broadcast(&Message::with_payload(code::SDWN, writer.finish()));

        let contenders: Vec<usize> = participants
            .into_iter()
            .filter(|&idx| !ctx.seats[idx].is_folded)
            .collect();
        match Self::best_contender(ctx, &contenders) {
            Some(winner_idx) => {
                let pot = ctx.pot;
                ctx.seats[winner_idx].chips += pot;
                let nickname = ctx.seats[winner_idx].nickname.clone();
                info!("room {}: {} wins {}", ctx.id, nickname, pot);
                ctx.broadcast(&gwin_message(&nickname, pot));
            }
            None => info!("room {}: hand ended with every seat folded", ctx.id),
        }

        self.ack_deadline = Some(Instant::now() + ctx.settings.showdown_ack_timeout);
    }

    fn on_tick(&mut self, ctx: &mut RoomCtx) {
        let all_acked = ctx
            .seats
            .iter()
            .filter(|seat| seat.is_active())
            .all(|seat| seat.showdown_ack);
        let expired = self
            .ack_deadline
            .is_some_and(|deadline| Instant::now() >= deadline);
        if all_acked || expired {
            ctx.broadcast(&Message::bare(code::GMDN));
            ctx.request(StateTag::Lobby);
        }
    }

    fn on_leave(&mut self, _ctx: &mut RoomCtx) {}

    fn on_message(&mut self, ctx: &mut RoomCtx, seat_idx: usize, msg: &Message) {
        if msg.code == code::SDOK {
            ctx.seats[seat_idx].showdown_ack = true;
        } else {
            debug!("room {}: unexpected {} at showdown", ctx.id, msg.code);
        }
    }
}
