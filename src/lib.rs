//! # Veiled RPS
//!
//! Confidential Rock-Paper-Scissors match registry. Moves arrive as
//! homomorphically encrypted inputs with proofs, the winner is computed
//! over ciphertexts, and the registry never sees a cleartext move.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        VEILED RPS                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Primitives                                │
//! │  ├── address.rs  - 20-byte participant identity              │
//! │  ├── clock.rs    - Timestamp source                          │
//! │  └── hash.rs     - Domain-separated SHA-256                  │
//! │                                                              │
//! │  fhe/            - Encrypted computation                     │
//! │  ├── handle.rs   - Ciphertext handles, encrypted inputs      │
//! │  ├── capability.rs - FHE operations used by the registry     │
//! │  └── local.rs    - In-process development backend            │
//! │                                                              │
//! │  game/           - Match lifecycle                           │
//! │  ├── state.rs    - Match, move, outcome, statistics          │
//! │  ├── pending.rs  - Joinable-match set                        │
//! │  ├── settle.rs   - Encrypted winner circuit                  │
//! │  ├── events.rs   - Registry events                           │
//! │  ├── oracle.rs   - Reveals awaiting decryption               │
//! │  └── registry.rs - State machine                             │
//! │                                                              │
//! │  network/        - Host runtime                              │
//! │  ├── auth.rs     - JWT validation                            │
//! │  ├── protocol.rs - Message types                             │
//! │  ├── gateway.rs  - Serialized registry access                │
//! │  └── server.rs   - WebSocket server                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Confidentiality
//!
//! The registry only ever holds ciphertext handles. Outcomes are computed
//! with `eq`/`and`/`or`/`select` over encrypted values and stay encrypted;
//! reveals are queued for an external decryption step.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod fhe;
pub mod game;
pub mod network;

// Re-export commonly used types
pub use core::address::Address;
pub use fhe::{EncryptedInput, Euint8, FheCapability, LocalFhe};
pub use game::registry::{MatchRegistry, RegistryConfig, RegistryError};
pub use game::state::{Match, MatchId, MatchStatus, Move, Outcome, PlayerStats};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
