//! Match Logic Module
//!
//! ## Module Structure
//!
//! - `state`: Match, move, outcome and statistics types
//! - `pending`: Joinable-match set with swap-remove
//! - `settle`: Encrypted outcome evaluation
//! - `events`: Registry notifications
//! - `oracle`: Reveals awaiting decryption
//! - `registry`: The match lifecycle state machine

pub mod state;
pub mod pending;
pub mod settle;
pub mod events;
pub mod oracle;
pub mod registry;

// Re-export key types
pub use state::{Match, MatchId, MatchStatus, Move, Outcome, PlayerStats, Slot, NO_MATCH};
pub use pending::PendingSet;
pub use events::{RegistryEvent, RegistryEventData};
pub use oracle::{RevealQueue, RevealRequest};
pub use registry::{MatchRegistry, RegistryConfig, RegistryError};
