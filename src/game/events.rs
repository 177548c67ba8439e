//! Registry Events
//!
//! Notifications emitted on every successful state change, for indexers and
//! connected clients.

use serde::{Serialize, Deserialize};

use crate::core::address::Address;
use super::state::MatchId;

/// Event payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RegistryEventData {
    /// A match was opened.
    MatchCreated {
        match_id: MatchId,
        initiator: Address,
    },

    /// An opponent joined.
    MatchJoined {
        match_id: MatchId,
        opponent: Address,
    },

    /// The initiator withdrew an unjoined match.
    MatchCancelled {
        match_id: MatchId,
    },

    /// A player committed an encrypted move.
    MoveCommitted {
        match_id: MatchId,
        player: Address,
    },

    /// The match was settled.
    ///
    /// `winner` and `result` are placeholders (`None` / 0) until a
    /// decryption callback delivers the outcome.
    MatchRevealed {
        match_id: MatchId,
        winner: Option<Address>,
        result: u8,
    },
}

/// An event with its sequence number.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEvent {
    /// Monotonic sequence number, starting at 1.
    pub seq: u64,

    /// Event data
    #[serde(flatten)]
    pub data: RegistryEventData,
}

impl RegistryEvent {
    /// Create a new event.
    pub fn new(seq: u64, data: RegistryEventData) -> Self {
        Self { seq, data }
    }

    /// Match the event refers to.
    pub fn match_id(&self) -> MatchId {
        match &self.data {
            RegistryEventData::MatchCreated { match_id, .. }
            | RegistryEventData::MatchJoined { match_id, .. }
            | RegistryEventData::MatchCancelled { match_id }
            | RegistryEventData::MoveCommitted { match_id, .. }
            | RegistryEventData::MatchRevealed { match_id, .. } => *match_id,
        }
    }

    /// Player the event is about, if any.
    pub fn player(&self) -> Option<Address> {
        match &self.data {
            RegistryEventData::MatchCreated { initiator, .. } => Some(*initiator),
            RegistryEventData::MatchJoined { opponent, .. } => Some(*opponent),
            RegistryEventData::MoveCommitted { player, .. } => Some(*player),
            RegistryEventData::MatchRevealed { winner, .. } => *winner,
            RegistryEventData::MatchCancelled { .. } => None,
        }
    }
}

impl RegistryEventData {
    /// Create match created event.
    pub fn match_created(match_id: MatchId, initiator: Address) -> Self {
        Self::MatchCreated { match_id, initiator }
    }

    /// Create match joined event.
    pub fn match_joined(match_id: MatchId, opponent: Address) -> Self {
        Self::MatchJoined { match_id, opponent }
    }

    /// Create match cancelled event.
    pub fn match_cancelled(match_id: MatchId) -> Self {
        Self::MatchCancelled { match_id }
    }

    /// Create move committed event.
    pub fn move_committed(match_id: MatchId, player: Address) -> Self {
        Self::MoveCommitted { match_id, player }
    }

    /// Create match revealed event with placeholder winner and result.
    pub fn match_revealed(match_id: MatchId) -> Self {
        Self::MatchRevealed { match_id, winner: None, result: 0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_accessors() {
        let alice = Address::new([1; 20]);
        let created = RegistryEvent::new(1, RegistryEventData::match_created(4, alice));
        assert_eq!(created.match_id(), 4);
        assert_eq!(created.player(), Some(alice));

        let revealed = RegistryEvent::new(2, RegistryEventData::match_revealed(4));
        assert_eq!(revealed.player(), None);
    }

    #[test]
    fn test_event_json_shape() {
        let event = RegistryEvent::new(9, RegistryEventData::match_cancelled(3));
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"kind\":\"match_cancelled\""));
        assert!(json.contains("\"seq\":9"));
        let parsed: RegistryEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
    }
}
