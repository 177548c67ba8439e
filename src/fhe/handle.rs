//! Ciphertext Handles
//!
//! Opaque references to values held by the FHE subsystem.
//! Nothing in this crate can read the cleartext behind a handle.

use std::fmt;
use serde::{Serialize, Deserialize};

/// Raw 32-byte ciphertext reference.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CiphertextHandle(#[serde(with = "hex")] pub [u8; 32]);

impl CiphertextHandle {
    /// Create from raw bytes.
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for CiphertextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CiphertextHandle({}..)", hex::encode(&self.0[..6]))
    }
}

impl fmt::Display for CiphertextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// Encrypted 8-bit unsigned integer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Euint8(pub CiphertextHandle);

/// Encrypted boolean.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ebool(pub CiphertextHandle);

impl Euint8 {
    /// Underlying handle.
    pub fn handle(&self) -> &CiphertextHandle {
        &self.0
    }
}

impl Ebool {
    /// Underlying handle.
    pub fn handle(&self) -> &CiphertextHandle {
        &self.0
    }
}

/// Client-produced encrypted value awaiting import.
///
/// `handle` names the external ciphertext; `proof` binds it to the
/// importing contract and the submitting user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedInput {
    /// External ciphertext handle.
    #[serde(with = "hex")]
    pub handle: [u8; 32],
    /// Input proof.
    #[serde(with = "hex")]
    pub proof: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_json_is_hex() {
        let handle = CiphertextHandle::new([0x0f; 32]);
        let json = serde_json::to_string(&Euint8(handle)).unwrap();
        assert_eq!(json, format!("\"{}\"", "0f".repeat(32)));
        let parsed: Euint8 = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.handle(), &handle);
    }

    #[test]
    fn test_encrypted_input_json() {
        let input = EncryptedInput {
            handle: [1; 32],
            proof: vec![0xde, 0xad],
        };
        let json = serde_json::to_string(&input).unwrap();
        assert!(json.contains("\"proof\":\"dead\""));
        let parsed: EncryptedInput = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, input);
    }
}
