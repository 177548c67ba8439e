//! Match State Definitions
//!
//! Plain data for matches, moves, outcomes and player statistics.
//! The registry is the only writer of these values.

use serde::{Serialize, Deserialize};

use crate::core::address::Address;
use crate::fhe::handle::Euint8;

/// Sequential match identifier. Zero means "no match".
pub type MatchId = u64;

/// Sentinel for "no active match".
pub const NO_MATCH: MatchId = 0;

// =============================================================================
// MOVES & OUTCOMES
// =============================================================================

/// A player's move. Encrypted before it ever reaches the registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Move {
    /// Beats Scissors.
    Rock = 0,
    /// Beats Rock.
    Paper = 1,
    /// Beats Paper.
    Scissors = 2,
}

impl Move {
    /// All moves in encoding order.
    pub const ALL: [Move; 3] = [Move::Rock, Move::Paper, Move::Scissors];

    /// Encoded value.
    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Decode from the wire value.
    pub fn from_u8(value: u8) -> Option<Move> {
        match value {
            0 => Some(Move::Rock),
            1 => Some(Move::Paper),
            2 => Some(Move::Scissors),
            _ => None,
        }
    }

    /// The move this one defeats.
    pub fn beats(self) -> Move {
        match self {
            Move::Rock => Move::Scissors,
            Move::Paper => Move::Rock,
            Move::Scissors => Move::Paper,
        }
    }
}

/// Settlement outcome, encoded as the cleartext of the result ciphertext.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Outcome {
    /// Equal moves.
    Draw = 0,
    /// Initiator's move beats the opponent's.
    InitiatorWins = 1,
    /// Opponent's move beats the initiator's.
    OpponentWins = 2,
}

impl Outcome {
    /// Encoded value.
    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Decode from a decrypted result.
    pub fn from_u8(value: u8) -> Option<Outcome> {
        match value {
            0 => Some(Outcome::Draw),
            1 => Some(Outcome::InitiatorWins),
            2 => Some(Outcome::OpponentWins),
            _ => None,
        }
    }

    /// Cleartext reference table for a pair of moves.
    pub fn between(initiator: Move, opponent: Move) -> Outcome {
        if initiator == opponent {
            Outcome::Draw
        } else if initiator.beats() == opponent {
            Outcome::InitiatorWins
        } else {
            Outcome::OpponentWins
        }
    }
}

// =============================================================================
// MATCH
// =============================================================================

/// Lifecycle state of a match.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    /// Never allocated.
    #[default]
    None,
    /// Created; waiting for an opponent and/or moves.
    Waiting,
    /// Both moves committed; reveal may be requested.
    BothCommitted,
    /// Settled. Terminal.
    Revealed,
    /// Withdrawn by the initiator before anyone joined. Terminal.
    Cancelled,
}

impl MatchStatus {
    /// Terminal states accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, MatchStatus::Revealed | MatchStatus::Cancelled)
    }

    /// States that occupy a participant's active-match slot.
    pub fn is_active(self) -> bool {
        matches!(self, MatchStatus::Waiting | MatchStatus::BothCommitted)
    }
}

/// Which side of a match a player occupies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    /// Match creator.
    Initiator,
    /// Player who joined.
    Opponent,
}

/// A single match record.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    /// Match identifier (0 for the empty record).
    pub id: MatchId,
    /// Creator.
    pub initiator: Address,
    /// Joined player, if any.
    pub opponent: Option<Address>,
    /// Initiator's encrypted move.
    pub move_initiator: Option<Euint8>,
    /// Opponent's encrypted move.
    pub move_opponent: Option<Euint8>,
    /// Initiator has committed.
    pub initiator_committed: bool,
    /// Opponent has committed.
    pub opponent_committed: bool,
    /// Creation time (Unix seconds).
    pub created_at: i64,
    /// Lifecycle state.
    pub state: MatchStatus,
    /// Winner. Unset until a decryption callback exists.
    pub winner: Option<Address>,
    /// Encrypted settlement result, set on reveal.
    pub result: Option<Euint8>,
}

impl Match {
    /// Create a fresh waiting match.
    pub fn new(id: MatchId, initiator: Address, created_at: i64) -> Self {
        Self {
            id,
            initiator,
            created_at,
            state: MatchStatus::Waiting,
            ..Default::default()
        }
    }

    /// Waiting with nobody joined yet.
    pub fn is_open(&self) -> bool {
        self.state == MatchStatus::Waiting && self.opponent.is_none()
    }

    /// Resolve the slot `player` occupies.
    pub fn slot_of(&self, player: &Address) -> Option<Slot> {
        if self.id != NO_MATCH && *player == self.initiator {
            Some(Slot::Initiator)
        } else if self.opponent.as_ref() == Some(player) {
            Some(Slot::Opponent)
        } else {
            None
        }
    }

    /// Whether `slot` has committed.
    pub fn is_committed(&self, slot: Slot) -> bool {
        match slot {
            Slot::Initiator => self.initiator_committed,
            Slot::Opponent => self.opponent_committed,
        }
    }

    /// Both slots committed.
    pub fn both_committed(&self) -> bool {
        self.initiator_committed && self.opponent_committed
    }

    /// Participants present in the match.
    pub fn participants(&self) -> impl Iterator<Item = Address> + '_ {
        std::iter::once(self.initiator).chain(self.opponent)
    }
}

// =============================================================================
// PLAYER STATS
// =============================================================================

/// Aggregate per-player counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerStats {
    /// Matches won.
    pub wins: u64,
    /// Matches lost.
    pub losses: u64,
    /// Matches drawn.
    pub draws: u64,
    /// Matches settled.
    pub total_matches: u64,
    /// Current win streak.
    pub current_streak: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_move_encoding() {
        for mv in Move::ALL {
            assert_eq!(Move::from_u8(mv.as_u8()), Some(mv));
        }
        assert_eq!(Move::from_u8(3), None);
    }

    #[test]
    fn test_beats_is_cyclic() {
        for mv in Move::ALL {
            assert_ne!(mv.beats(), mv);
            assert_eq!(mv.beats().beats().beats(), mv);
        }
    }

    #[test]
    fn test_reference_table() {
        assert_eq!(Outcome::between(Move::Rock, Move::Scissors), Outcome::InitiatorWins);
        assert_eq!(Outcome::between(Move::Paper, Move::Rock), Outcome::InitiatorWins);
        assert_eq!(Outcome::between(Move::Scissors, Move::Paper), Outcome::InitiatorWins);
        assert_eq!(Outcome::between(Move::Scissors, Move::Rock), Outcome::OpponentWins);
        assert_eq!(Outcome::between(Move::Paper, Move::Paper), Outcome::Draw);
    }

    #[test]
    fn test_status_classes() {
        assert!(MatchStatus::Waiting.is_active());
        assert!(MatchStatus::BothCommitted.is_active());
        assert!(MatchStatus::Revealed.is_terminal());
        assert!(MatchStatus::Cancelled.is_terminal());
        assert!(!MatchStatus::None.is_active());
        assert!(!MatchStatus::None.is_terminal());
    }

    #[test]
    fn test_slot_resolution() {
        let alice = Address::new([1; 20]);
        let bob = Address::new([2; 20]);
        let carol = Address::new([3; 20]);

        let mut m = Match::new(1, alice, 0);
        assert_eq!(m.slot_of(&alice), Some(Slot::Initiator));
        assert_eq!(m.slot_of(&bob), None);
        assert!(m.is_open());

        m.opponent = Some(bob);
        assert_eq!(m.slot_of(&bob), Some(Slot::Opponent));
        assert_eq!(m.slot_of(&carol), None);
        assert!(!m.is_open());
        assert_eq!(m.participants().collect::<Vec<_>>(), vec![alice, bob]);
    }

    #[test]
    fn test_empty_record_has_no_slots() {
        let empty = Match::default();
        assert_eq!(empty.state, MatchStatus::None);
        assert_eq!(empty.slot_of(&Address::ZERO), None);
    }
}
