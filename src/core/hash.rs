//! Domain-Separated Hashing
//!
//! SHA-256 wrapper used for:
//! - Ciphertext handle derivation
//! - Input proof tags
//! - Address derivation from auth subjects

use sha2::{Sha256, Digest};

/// Hash output type (256 bits / 32 bytes)
pub type Digest32 = [u8; 32];

/// Domain for ciphertext handles created by import.
pub const DOMAIN_INPUT_HANDLE: &[u8] = b"VEILED_RPS_INPUT_HANDLE_V1";

/// Domain for handles produced by homomorphic operations.
pub const DOMAIN_COMPUTED_HANDLE: &[u8] = b"VEILED_RPS_COMPUTED_HANDLE_V1";

/// Domain for input proof tags.
pub const DOMAIN_INPUT_PROOF: &[u8] = b"VEILED_RPS_INPUT_PROOF_V1";

/// Domain for the input masking keystream.
pub const DOMAIN_INPUT_MASK: &[u8] = b"VEILED_RPS_INPUT_MASK_V1";

/// Domain for address derivation.
pub const DOMAIN_ADDRESS: &[u8] = b"veiled-rps-address:";

/// Deterministic hasher with a domain separator.
///
/// Order of updates is significant.
pub struct DomainHasher {
    hasher: Sha256,
}

impl DomainHasher {
    /// Create a new hasher with domain separator.
    pub fn new(domain: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(domain);
        Self { hasher }
    }

    /// Update with raw bytes.
    #[inline]
    pub fn update_bytes(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    /// Update with a u8 value.
    #[inline]
    pub fn update_u8(&mut self, value: u8) {
        self.hasher.update([value]);
    }

    /// Update with a u64 value (little-endian).
    #[inline]
    pub fn update_u64(&mut self, value: u64) {
        self.hasher.update(value.to_le_bytes());
    }

    /// Finalize and return the digest.
    pub fn finalize(self) -> Digest32 {
        self.hasher.finalize().into()
    }
}

/// Compute hash with domain separator.
pub fn hash_with_domain(domain: &[u8], data: &[u8]) -> Digest32 {
    let mut hasher = DomainHasher::new(domain);
    hasher.update_bytes(data);
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hasher_determinism() {
        let make_hash = || {
            let mut hasher = DomainHasher::new(DOMAIN_INPUT_PROOF);
            hasher.update_u64(7);
            hasher.update_u8(2);
            hasher.update_bytes(&[9; 20]);
            hasher.finalize()
        };

        assert_eq!(make_hash(), make_hash());
    }

    #[test]
    fn test_hash_order_matters() {
        let hash1 = {
            let mut h = DomainHasher::new(b"test");
            h.update_u64(1);
            h.update_u64(2);
            h.finalize()
        };

        let hash2 = {
            let mut h = DomainHasher::new(b"test");
            h.update_u64(2);
            h.update_u64(1);
            h.finalize()
        };

        assert_ne!(hash1, hash2);
    }

    #[test]
    fn test_domain_separation() {
        let data = [1u8, 2, 3, 4];

        let hash1 = hash_with_domain(DOMAIN_INPUT_HANDLE, &data);
        let hash2 = hash_with_domain(DOMAIN_COMPUTED_HANDLE, &data);

        assert_ne!(hash1, hash2);
    }
}
