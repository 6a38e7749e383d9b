//! Cards, the deck, and seat actions.

use rand::{seq::SliceRandom, thread_rng};
use std::fmt;

use crate::net::messages::action_value;

/// Whole chips. All bets and stacks are whole amounts; signed so wire
/// round-trips through `var_int` are lossless.
pub type Chips = i64;

/// A card is an integer 0..=51: rank = value % 13 (0 is a deuce, 12 an
/// ace), suit = value / 13.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Card(pub u8);

impl Card {
    pub fn rank(self) -> u8 {
        self.0 % 13
    }

    pub fn suit(self) -> u8 {
        self.0 / 13
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let rank = match self.rank() {
            9 => "J".to_string(),
            10 => "Q".to_string(),
            11 => "K".to_string(),
            12 => "A".to_string(),
            r => (r + 2).to_string(),
        };
        let suit = match self.suit() {
            0 => "♣",
            1 => "♠",
            2 => "♦",
            _ => "♥",
        };
        write!(f, "{rank}{suit}")
    }
}

/// The 52-card deck a room deals from. Reshuffled at the start of
/// every hand.
#[derive(Debug)]
pub struct Deck {
    cards: [Card; 52],
    deck_idx: usize,
}

impl Default for Deck {
    fn default() -> Self {
        let mut cards = [Card(0); 52];
        for (value, slot) in cards.iter_mut().enumerate() {
            *slot = Card(value as u8);
        }
        Self { cards, deck_idx: 0 }
    }
}

impl Deck {
    pub fn shuffle(&mut self) {
        self.cards.shuffle(&mut thread_rng());
        self.deck_idx = 0;
    }

    /// Deals the next card. A hand draws at most 13 cards from a fresh
    /// deck, so the index cannot run off the end in normal play.
    pub fn deal_card(&mut self) -> Card {
        let card = self.cards[self.deck_idx];
        self.deck_idx += 1;
        card
    }
}

/// The last action a seat took, as broadcast in PACT and seat blocks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SeatAction {
    #[default]
    None,
    Check,
    Call,
    Fold,
    Bet,
    Left,
}

impl SeatAction {
    pub fn wire_value(self) -> u8 {
        match self {
            Self::None => action_value::NONE,
            Self::Check => action_value::CHECK,
            Self::Call => action_value::CALL,
            Self::Fold => action_value::FOLD,
            Self::Bet => action_value::BET,
            Self::Left => action_value::LEFT,
        }
    }
}

impl fmt::Display for SeatAction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let repr = match self {
            Self::None => "none",
            Self::Check => "check",
            Self::Call => "call",
            Self::Fold => "fold",
            Self::Bet => "bet",
            Self::Left => "left",
        };
        write!(f, "{repr}")
    }
}
