//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! Text frames carry JSON; binary frames carry a bincode [`MoveFrame`]
//! for move submission.

use serde::{Serialize, Deserialize};

use crate::core::address::Address;
use crate::fhe::capability::FheError;
use crate::fhe::handle::EncryptedInput;
use crate::game::events::RegistryEvent;
use crate::game::registry::RegistryError;
use crate::game::state::{Match, MatchId, PlayerStats};

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Authenticate with the server.
    Auth(AuthRequest),

    /// Open a new match.
    CreateMatch,

    /// Join an open match.
    JoinMatch { match_id: MatchId },

    /// Withdraw an unjoined match.
    CancelMatch { match_id: MatchId },

    /// Commit an encrypted move.
    SubmitMove {
        match_id: MatchId,
        input: EncryptedInput,
    },

    /// Ask whether both moves are in.
    LockMove { match_id: MatchId },

    /// Settle a fully committed match.
    RequestReveal { match_id: MatchId },

    /// List joinable matches.
    GetPendingMatches,

    /// Fetch a match record.
    GetMatch { match_id: MatchId },

    /// Fetch a player's statistics.
    GetPlayerStats { address: Address },

    /// Fetch a player's active match.
    GetActiveMatch { address: Address },

    /// Ping for latency measurement.
    Ping { timestamp: u64 },
}

impl ClientMessage {
    /// Whether the message changes registry state and so needs an identity.
    pub fn is_state_changing(&self) -> bool {
        matches!(
            self,
            ClientMessage::CreateMatch
                | ClientMessage::JoinMatch { .. }
                | ClientMessage::CancelMatch { .. }
                | ClientMessage::SubmitMove { .. }
                | ClientMessage::RequestReveal { .. }
        )
    }
}

/// Authentication request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthRequest {
    /// Authentication token (JWT).
    pub token: String,
    /// Client version for compatibility check.
    pub client_version: String,
}

/// Binary move submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveFrame {
    /// Target match.
    pub match_id: MatchId,
    /// Encrypted move and proof.
    pub input: EncryptedInput,
}

impl MoveFrame {
    /// Serialize to binary.
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Deserialize from binary.
    pub fn from_bytes(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }

    /// Equivalent JSON request.
    pub fn into_message(self) -> ClientMessage {
        ClientMessage::SubmitMove {
            match_id: self.match_id,
            input: self.input,
        }
    }
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Authentication result.
    AuthResult(AuthResult),

    /// A match was opened for the caller.
    MatchCreated { match_id: MatchId },

    /// A state-changing request succeeded.
    Ok { op: Operation, match_id: MatchId },

    /// Answer to `lock_move`.
    Locked { match_id: MatchId, locked: bool },

    /// Joinable matches (unordered).
    PendingMatches { match_ids: Vec<MatchId> },

    /// A match record.
    Match { record: Match },

    /// A player's statistics.
    PlayerStats { address: Address, stats: PlayerStats },

    /// A player's active match (0 when idle).
    ActiveMatch { address: Address, match_id: MatchId },

    /// Registry event broadcast.
    Event { event: RegistryEvent },

    /// Error message.
    Error(ServerError),

    /// Pong response.
    Pong { timestamp: u64, server_time: u64 },

    /// Server shutting down.
    Shutdown { reason: String },
}

/// Which request an `ok` acknowledges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// `join_match`
    JoinMatch,
    /// `cancel_match`
    CancelMatch,
    /// `submit_move`
    SubmitMove,
    /// `request_reveal`
    RequestReveal,
}

/// Authentication result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResult {
    /// Whether auth succeeded.
    pub success: bool,
    /// Address the connection acts as.
    pub address: Option<Address>,
    /// Error code (if failed).
    pub code: Option<ErrorCode>,
    /// Error message (if failed).
    pub error: Option<String>,
    /// Server version.
    pub server_version: String,
}

/// Error payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

impl ServerError {
    /// Create an error payload.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Authentication failed.
    AuthFailed,
    /// Not authenticated.
    NotAuthenticated,
    /// JWT token has expired.
    TokenExpired,
    /// Invalid JWT token (signature, format, claims).
    InvalidToken,
    /// Malformed request.
    InvalidInput,
    /// Participant already has an active match.
    AlreadyInMatch,
    /// Match id outside the allocated range.
    InvalidMatchId,
    /// Match is not waiting.
    MatchNotWaiting,
    /// Caller may not act on this match.
    UnauthorizedPlayer,
    /// Move already committed.
    MoveAlreadyCommitted,
    /// Reveal requested too early.
    MatchNotReady,
    /// Encrypted input rejected by the FHE subsystem.
    InvalidProof,
    /// Server overloaded.
    ServerOverloaded,
    /// Internal error.
    InternalError,
}

impl From<&RegistryError> for ErrorCode {
    fn from(err: &RegistryError) -> Self {
        match err {
            RegistryError::AlreadyInMatch => ErrorCode::AlreadyInMatch,
            RegistryError::InvalidMatchId => ErrorCode::InvalidMatchId,
            RegistryError::MatchNotWaiting => ErrorCode::MatchNotWaiting,
            RegistryError::UnauthorizedPlayer => ErrorCode::UnauthorizedPlayer,
            RegistryError::MoveAlreadyCommitted => ErrorCode::MoveAlreadyCommitted,
            RegistryError::MatchNotReady => ErrorCode::MatchNotReady,
            RegistryError::Fhe(FheError::InvalidProof(_)) => ErrorCode::InvalidProof,
            RegistryError::Fhe(_) => ErrorCode::InternalError,
        }
    }
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Build an error message.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        ServerMessage::Error(ServerError::new(code, message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fhe::capability::CipherKind;
    use crate::fhe::handle::CiphertextHandle;
    use crate::game::events::RegistryEventData;

    fn sample_input() -> EncryptedInput {
        EncryptedInput {
            handle: [3; 32],
            proof: vec![1, 2, 3, 4],
        }
    }

    #[test]
    fn test_client_message_json_shape() {
        let json = ClientMessage::JoinMatch { match_id: 7 }.to_json().unwrap();
        assert_eq!(json, r#"{"type":"join_match","match_id":7}"#);

        let parsed = ClientMessage::from_json(r#"{"type":"create_match"}"#).unwrap();
        assert!(matches!(parsed, ClientMessage::CreateMatch));
    }

    #[test]
    fn test_submit_move_json() {
        let msg = ClientMessage::SubmitMove { match_id: 2, input: sample_input() };
        let json = msg.to_json().unwrap();
        assert!(json.contains("\"proof\":\"01020304\""));

        match ClientMessage::from_json(&json).unwrap() {
            ClientMessage::SubmitMove { match_id, input } => {
                assert_eq!(match_id, 2);
                assert_eq!(input, sample_input());
            }
            other => panic!("Wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_address_query_json() {
        let address = Address::new([0xab; 20]);
        let json = format!(r#"{{"type":"get_active_match","address":"{}"}}"#, address);
        match ClientMessage::from_json(&json).unwrap() {
            ClientMessage::GetActiveMatch { address: parsed } => assert_eq!(parsed, address),
            other => panic!("Wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_state_changing_classification() {
        assert!(ClientMessage::CreateMatch.is_state_changing());
        assert!(ClientMessage::RequestReveal { match_id: 1 }.is_state_changing());
        assert!(!ClientMessage::LockMove { match_id: 1 }.is_state_changing());
        assert!(!ClientMessage::GetPendingMatches.is_state_changing());
        assert!(!ClientMessage::Ping { timestamp: 0 }.is_state_changing());
    }

    #[test]
    fn test_move_frame_binary() {
        let frame = MoveFrame { match_id: 11, input: sample_input() };
        let bytes = frame.to_bytes().unwrap();
        let parsed = MoveFrame::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, frame);
        assert!(matches!(parsed.into_message(), ClientMessage::SubmitMove { match_id: 11, .. }));
        assert!(MoveFrame::from_bytes(&[0xff]).is_err());
    }

    #[test]
    fn test_event_message_json() {
        let event = RegistryEvent::new(4, RegistryEventData::match_joined(1, Address::new([2; 20])));
        let json = ServerMessage::Event { event: event.clone() }.to_json().unwrap();
        assert!(json.contains("\"type\":\"event\""));
        assert!(json.contains("\"kind\":\"match_joined\""));

        match ServerMessage::from_json(&json).unwrap() {
            ServerMessage::Event { event: parsed } => assert_eq!(parsed, event),
            other => panic!("Wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_match_record_json() {
        let mut record = Match::new(5, Address::new([1; 20]), 1_700_000_000);
        record.move_initiator = Some(crate::fhe::handle::Euint8(CiphertextHandle::new([9; 32])));
        let json = ServerMessage::Match { record: record.clone() }.to_json().unwrap();
        assert!(json.contains("\"state\":\"waiting\""));

        match ServerMessage::from_json(&json).unwrap() {
            ServerMessage::Match { record: parsed } => assert_eq!(parsed, record),
            other => panic!("Wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_error_codes() {
        let msg = ServerMessage::error(ErrorCode::AlreadyInMatch, "player already in a match");
        let json = msg.to_json().unwrap();
        assert!(json.contains("already_in_match"));

        let fhe = RegistryError::Fhe(FheError::InvalidProof("bad".into()));
        assert_eq!(ErrorCode::from(&fhe), ErrorCode::InvalidProof);
        assert_eq!(ErrorCode::from(&RegistryError::MatchNotReady), ErrorCode::MatchNotReady);
    }

    #[test]
    fn test_settlement_faults_are_internal() {
        let handle = CiphertextHandle::new([7; 32]);
        let faults = [
            FheError::AccessDenied(handle),
            FheError::UnknownHandle(handle),
            FheError::TypeMismatch { expected: CipherKind::Uint8, found: CipherKind::Bool },
        ];
        for fault in faults {
            assert_eq!(ErrorCode::from(&RegistryError::Fhe(fault)), ErrorCode::InternalError);
        }
    }
}
