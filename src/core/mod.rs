//! Core primitives shared by every layer.

pub mod address;
pub mod clock;
pub mod hash;

// Re-export core types
pub use address::{Address, AddressParseError};
pub use clock::{Clock, SystemClock, ManualClock};
pub use hash::{DomainHasher, Digest32, hash_with_domain};
