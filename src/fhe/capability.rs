//! FHE Capability
//!
//! The operations the registry may perform on encrypted values.
//! An implementation is bound to the address of the contract it executes for,
//! so "self" in `authorize_self` is always that contract.

use thiserror::Error;

use crate::core::address::Address;
use super::handle::{CiphertextHandle, Ebool, EncryptedInput, Euint8};

/// Homomorphic operations and access control exposed by the FHE subsystem.
pub trait FheCapability {
    /// Address the capability acts for.
    fn contract(&self) -> Address;

    /// Verify and import a client ciphertext submitted by `user`.
    fn import_encrypted(&mut self, input: &EncryptedInput, user: &Address) -> Result<Euint8, FheError>;

    /// Grant the executing contract persistent access to `handle`.
    fn authorize_self(&mut self, handle: &CiphertextHandle) -> Result<(), FheError>;

    /// Trivially encrypt a public constant.
    fn as_euint8(&mut self, value: u8) -> Result<Euint8, FheError>;

    /// Encrypted equality.
    fn eq(&mut self, a: Euint8, b: Euint8) -> Result<Ebool, FheError>;

    /// Encrypted equality against a public constant.
    fn eq_scalar(&mut self, a: Euint8, b: u8) -> Result<Ebool, FheError>;

    /// Encrypted conjunction.
    fn and(&mut self, a: Ebool, b: Ebool) -> Result<Ebool, FheError>;

    /// Encrypted disjunction.
    fn or(&mut self, a: Ebool, b: Ebool) -> Result<Ebool, FheError>;

    /// Encrypted conditional: `cond ? if_true : if_false`.
    fn select(&mut self, cond: Ebool, if_true: Euint8, if_false: Euint8) -> Result<Euint8, FheError>;

    /// Drop a ciphertext the contract no longer needs, along with its grants.
    fn release(&mut self, handle: &CiphertextHandle) -> Result<(), FheError>;
}

/// Ciphertext kind tracked by the subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherKind {
    /// Encrypted boolean.
    Bool,
    /// Encrypted u8.
    Uint8,
}

/// FHE subsystem failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FheError {
    /// Input proof did not verify.
    #[error("invalid input proof: {0}")]
    InvalidProof(String),

    /// Contract is not on the handle's ACL.
    #[error("access denied to handle {0}")]
    AccessDenied(CiphertextHandle),

    /// Handle is not known to the subsystem.
    #[error("unknown handle {0}")]
    UnknownHandle(CiphertextHandle),

    /// Handle holds a different ciphertext kind.
    #[error("type mismatch: expected {expected:?}, found {found:?}")]
    TypeMismatch {
        /// Kind the operation needs.
        expected: CipherKind,
        /// Kind stored under the handle.
        found: CipherKind,
    },
}
