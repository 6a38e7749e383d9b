//! Showdown hand evaluation.
//!
//! Pure and deterministic: two hole cards plus five community cards map
//! to a `HandScore`, and comparing scores matches standard poker
//! ranking, including the A-2-3-4-5 wheel counting as a straight whose
//! high card is the five (rank 3).

use super::entities::Card;

/// A ranked hand: category 0 (high card) through 8 (straight flush),
/// with up to five tie-breaker ranks, highest first. The derived
/// ordering compares category, then tie-breakers lexicographically,
/// which is exactly poker ordering.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct HandScore {
    pub category: u8,
    pub tie_breakers: [u8; 5],
}

pub const HIGH_CARD: u8 = 0;
pub const ONE_PAIR: u8 = 1;
pub const TWO_PAIR: u8 = 2;
pub const THREE_OF_A_KIND: u8 = 3;
pub const STRAIGHT: u8 = 4;
pub const FLUSH: u8 = 5;
pub const FULL_HOUSE: u8 = 6;
pub const FOUR_OF_A_KIND: u8 = 7;
pub const STRAIGHT_FLUSH: u8 = 8;

struct Counts {
    rank: [u8; 13],
    suit: [u8; 4],
}

impl Counts {
    fn new(cards: &[Card; 7]) -> Self {
        let mut rank = [0u8; 13];
        let mut suit = [0u8; 4];
        for card in cards {
            rank[card.rank() as usize] += 1;
            suit[card.suit() as usize] += 1;
        }
        Self { rank, suit }
    }

    fn flush_suit(&self) -> Option<u8> {
        (0..4).find(|&s| self.suit[s as usize] >= 5)
    }

    /// Number of ranks appearing exactly twice.
    fn exact_pairs(&self) -> usize {
        self.rank.iter().filter(|&&n| n == 2).count()
    }
}

/// Highest rank of any five-in-a-row in the histogram; the wheel
/// (A-2-3-4-5) reports rank 3, the five.
fn find_straight_high(rank: &[u8; 13]) -> Option<u8> {
    let mut streak = 0u8;
    let mut high = 0u8;
    for r in (0..13usize).rev() {
        if rank[r] == 0 {
            streak = 0;
            if r < 4 {
                break;
            }
            continue;
        }
        if streak == 0 {
            high = r as u8;
        }
        streak += 1;
        if streak == 5 {
            return Some(high);
        }
    }
    if rank[12] > 0 && rank[0] > 0 && rank[1] > 0 && rank[2] > 0 && rank[3] > 0 {
        return Some(3);
    }
    None
}

fn try_straight_flush(cards: &[Card; 7], counts: &Counts) -> Option<HandScore> {
    let flush_suit = counts.flush_suit()?;
    let mut flush_ranks = [0u8; 13];
    for card in cards {
        if card.suit() == flush_suit {
            flush_ranks[card.rank() as usize] += 1;
        }
    }
    find_straight_high(&flush_ranks).map(|high| HandScore {
        category: STRAIGHT_FLUSH,
        tie_breakers: [high, 0, 0, 0, 0],
    })
}

fn try_four_of_a_kind(counts: &Counts) -> Option<HandScore> {
    let quad = (0..13).rev().find(|&r| counts.rank[r] == 4)?;
    let kicker = (0..13)
        .rev()
        .find(|&k| k != quad && counts.rank[k] > 0)
        .unwrap_or(0);
    Some(HandScore {
        category: FOUR_OF_A_KIND,
        tie_breakers: [quad as u8, kicker as u8, 0, 0, 0],
    })
}

fn try_full_house(counts: &Counts) -> Option<HandScore> {
    let mut trips = None;
    let mut pair = None;
    for r in (0..13).rev() {
        if counts.rank[r] >= 3 && trips.is_none() {
            trips = Some(r as u8);
        } else if counts.rank[r] >= 2 && pair.is_none() {
            pair = Some(r as u8);
        }
    }
    match (trips, pair) {
        (Some(t), Some(p)) => Some(HandScore {
            category: FULL_HOUSE,
            tie_breakers: [t, p, 0, 0, 0],
        }),
        _ => None,
    }
}

fn try_flush(cards: &[Card; 7], counts: &Counts) -> Option<HandScore> {
    let flush_suit = counts.flush_suit()?;
    let mut ranks: Vec<u8> = cards
        .iter()
        .filter(|c| c.suit() == flush_suit)
        .map(|c| c.rank())
        .collect();
    ranks.sort_unstable_by(|a, b| b.cmp(a));
    Some(HandScore {
        category: FLUSH,
        tie_breakers: [ranks[0], ranks[1], ranks[2], ranks[3], ranks[4]],
    })
}

fn try_straight(counts: &Counts) -> Option<HandScore> {
    find_straight_high(&counts.rank).map(|high| HandScore {
        category: STRAIGHT,
        tie_breakers: [high, 0, 0, 0, 0],
    })
}

fn try_three_of_a_kind(counts: &Counts) -> Option<HandScore> {
    let trips = (0..13).rev().find(|&r| counts.rank[r] == 3)?;
    let mut tie_breakers = [trips as u8, 0, 0, 0, 0];
    let mut filled = 1;
    for r in (0..13).rev() {
        if filled == 3 {
            break;
        }
        if r != trips && counts.rank[r] > 0 {
            tie_breakers[filled] = r as u8;
            filled += 1;
        }
    }
    Some(HandScore {
        category: THREE_OF_A_KIND,
        tie_breakers,
    })
}

fn try_two_pair(counts: &Counts) -> Option<HandScore> {
    if counts.exact_pairs() < 2 {
        return None;
    }
    let mut pairs = (0..13).rev().filter(|&r| counts.rank[r] >= 2);
    let high_pair = pairs.next()? as u8;
    let low_pair = pairs.next()? as u8;
    let kicker = (0..13)
        .rev()
        .find(|&k| k != high_pair as usize && k != low_pair as usize && counts.rank[k] > 0)
        .unwrap_or(0) as u8;
    Some(HandScore {
        category: TWO_PAIR,
        tie_breakers: [high_pair, low_pair, kicker, 0, 0],
    })
}

fn try_one_pair(counts: &Counts) -> Option<HandScore> {
    let pair = (0..13).rev().find(|&r| counts.rank[r] >= 2)?;
    let mut tie_breakers = [pair as u8, 0, 0, 0, 0];
    let mut filled = 1;
    for r in (0..13).rev() {
        if filled == 4 {
            break;
        }
        if r != pair && counts.rank[r] > 0 {
            tie_breakers[filled] = r as u8;
            filled += 1;
        }
    }
    Some(HandScore {
        category: ONE_PAIR,
        tie_breakers,
    })
}

fn high_card(counts: &Counts) -> HandScore {
    let mut tie_breakers = [0u8; 5];
    let mut filled = 0;
    for r in (0..13).rev() {
        if filled == 5 {
            break;
        }
        if counts.rank[r] > 0 {
            tie_breakers[filled] = r as u8;
            filled += 1;
        }
    }
    HandScore {
        category: HIGH_CARD,
        tie_breakers,
    }
}

/// Evaluates the best five-card hand from two hole cards and five
/// community cards.
pub fn score_hand(hole: [Card; 2], community: [Card; 5]) -> HandScore {
    let cards = [
        hole[0],
        hole[1],
        community[0],
        community[1],
        community[2],
        community[3],
        community[4],
    ];
    let counts = Counts::new(&cards);

    try_straight_flush(&cards, &counts)
        .or_else(|| try_four_of_a_kind(&counts))
        .or_else(|| try_full_house(&counts))
        .or_else(|| try_flush(&cards, &counts))
        .or_else(|| try_straight(&counts))
        .or_else(|| try_three_of_a_kind(&counts))
        .or_else(|| try_two_pair(&counts))
        .or_else(|| try_one_pair(&counts))
        .unwrap_or_else(|| high_card(&counts))
}
