//! Local FHE Backend
//!
//! In-process stand-in for the FHE coprocessor, used by tests, the demo and
//! development servers. Cleartexts live in a private table keyed by handle;
//! callers only ever see handles.
//!
//! ## Input format
//!
//! ```text
//! proof  = nonce[16] || masked[1] || tag[32]
//! handle = H(INPUT_HANDLE, nonce || masked)
//! tag    = H(INPUT_PROOF, key || handle || contract || user || nonce || masked)
//! value  = masked ^ H(INPUT_MASK, key || nonce)[0]
//! ```
//!
//! The tag binds a ciphertext to one (contract, user) pair, so a proof
//! replayed by another account or against another contract is rejected.
//!
//! ## Retention
//!
//! Every import and every operation adds a table entry. Entries stay until
//! [`FheCapability::release`] drops them; settlement releases its own
//! intermediates, so each settled match leaves three ciphertexts behind
//! (two moves and the result).

use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, trace};

use crate::core::address::Address;
use crate::core::hash::{
    DomainHasher, Digest32, hash_with_domain,
    DOMAIN_COMPUTED_HANDLE, DOMAIN_INPUT_HANDLE, DOMAIN_INPUT_MASK, DOMAIN_INPUT_PROOF,
};
use super::capability::{CipherKind, FheCapability, FheError};
use super::handle::{CiphertextHandle, Ebool, EncryptedInput, Euint8};

const NONCE_LEN: usize = 16;
const TAG_LEN: usize = 32;
const PROOF_LEN: usize = NONCE_LEN + 1 + TAG_LEN;

/// Local backend configuration.
#[derive(Clone, Debug)]
pub struct LocalFheConfig {
    /// Shared development key.
    pub dev_key: [u8; 32],
}

impl Default for LocalFheConfig {
    fn default() -> Self {
        Self {
            dev_key: hash_with_domain(b"VEILED_RPS_DEV_KEY_V1", b"local"),
        }
    }
}

impl LocalFheConfig {
    /// Create config from environment variables.
    ///
    /// `RPS_FHE_DEV_KEY` must be 64 hex characters when set; anything else
    /// falls back to the built-in development key.
    pub fn from_env() -> Self {
        let dev_key = std::env::var("RPS_FHE_DEV_KEY")
            .ok()
            .and_then(|v| hex::decode(v.trim()).ok())
            .and_then(|bytes| <[u8; 32]>::try_from(bytes.as_slice()).ok());

        match dev_key {
            Some(dev_key) => Self { dev_key },
            None => Self::default(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct StoredCiphertext {
    kind: CipherKind,
    value: u8,
}

/// In-process FHE backend bound to one contract address.
#[derive(Debug)]
pub struct LocalFhe {
    contract: Address,
    dev_key: [u8; 32],
    table: BTreeMap<CiphertextHandle, StoredCiphertext>,
    acl: BTreeSet<(CiphertextHandle, Address)>,
    next_nonce: u64,
}

impl LocalFhe {
    /// Create a backend executing for `contract`.
    pub fn new(contract: Address, config: LocalFheConfig) -> Self {
        Self {
            contract,
            dev_key: config.dev_key,
            table: BTreeMap::new(),
            acl: BTreeSet::new(),
            next_nonce: 0,
        }
    }

    /// Client-side encryptor matching this backend's key and contract.
    pub fn encryptor(&self) -> InputEncryptor {
        InputEncryptor::new(self.dev_key, self.contract)
    }

    /// Check whether `account` is on the ACL of `handle`.
    pub fn is_authorized(&self, handle: &CiphertextHandle, account: &Address) -> bool {
        self.acl.contains(&(*handle, *account))
    }

    /// Number of ciphertexts held.
    pub fn ciphertext_count(&self) -> usize {
        self.table.len()
    }

    /// Decrypt on behalf of the off-chain decryption oracle.
    ///
    /// Only handles the contract has authorized can be decrypted.
    pub fn oracle_decrypt(&self, handle: &CiphertextHandle) -> Result<u8, FheError> {
        let stored = self.table.get(handle).ok_or(FheError::UnknownHandle(*handle))?;
        if !self.is_authorized(handle, &self.contract) {
            return Err(FheError::AccessDenied(*handle));
        }
        Ok(stored.value)
    }

    fn load(&self, handle: &CiphertextHandle, kind: CipherKind) -> Result<u8, FheError> {
        let stored = self.table.get(handle).ok_or(FheError::UnknownHandle(*handle))?;
        if !self.is_authorized(handle, &self.contract) {
            return Err(FheError::AccessDenied(*handle));
        }
        if stored.kind != kind {
            return Err(FheError::TypeMismatch { expected: kind, found: stored.kind });
        }
        Ok(stored.value)
    }

    /// Store a computed value; results are granted to the computing contract.
    fn store_computed(&mut self, op: u8, operands: &[&CiphertextHandle], kind: CipherKind, value: u8) -> CiphertextHandle {
        let mut hasher = DomainHasher::new(DOMAIN_COMPUTED_HANDLE);
        hasher.update_u64(self.next_nonce);
        hasher.update_u8(op);
        for operand in operands {
            hasher.update_bytes(operand.as_bytes());
        }
        self.next_nonce += 1;

        let handle = CiphertextHandle::new(hasher.finalize());
        self.table.insert(handle, StoredCiphertext { kind, value });
        self.acl.insert((handle, self.contract));
        trace!(handle = %handle, op, "stored computed ciphertext");
        handle
    }
}

impl FheCapability for LocalFhe {
    fn contract(&self) -> Address {
        self.contract
    }

    fn import_encrypted(&mut self, input: &EncryptedInput, user: &Address) -> Result<Euint8, FheError> {
        if input.proof.len() != PROOF_LEN {
            return Err(FheError::InvalidProof(format!(
                "expected {} proof bytes, got {}", PROOF_LEN, input.proof.len()
            )));
        }

        let nonce = &input.proof[..NONCE_LEN];
        let masked = input.proof[NONCE_LEN];
        let tag = &input.proof[NONCE_LEN + 1..];

        if input_handle(nonce, masked) != input.handle {
            return Err(FheError::InvalidProof("handle does not match ciphertext".into()));
        }

        let expected = proof_tag(&self.dev_key, &input.handle, &self.contract, user, nonce, masked);
        if expected.as_slice() != tag {
            return Err(FheError::InvalidProof("proof not bound to this contract and user".into()));
        }

        let handle = CiphertextHandle::new(input.handle);
        let value = masked ^ mask_byte(&self.dev_key, nonce);
        self.table.insert(handle, StoredCiphertext { kind: CipherKind::Uint8, value });
        debug!(handle = %handle, user = %user.short(), "imported encrypted input");
        Ok(Euint8(handle))
    }

    fn authorize_self(&mut self, handle: &CiphertextHandle) -> Result<(), FheError> {
        if !self.table.contains_key(handle) {
            return Err(FheError::UnknownHandle(*handle));
        }
        self.acl.insert((*handle, self.contract));
        Ok(())
    }

    fn as_euint8(&mut self, value: u8) -> Result<Euint8, FheError> {
        let handle = self.store_computed(0, &[], CipherKind::Uint8, value);
        Ok(Euint8(handle))
    }

    fn eq(&mut self, a: Euint8, b: Euint8) -> Result<Ebool, FheError> {
        let lhs = self.load(a.handle(), CipherKind::Uint8)?;
        let rhs = self.load(b.handle(), CipherKind::Uint8)?;
        let handle = self.store_computed(1, &[a.handle(), b.handle()], CipherKind::Bool, (lhs == rhs) as u8);
        Ok(Ebool(handle))
    }

    fn eq_scalar(&mut self, a: Euint8, b: u8) -> Result<Ebool, FheError> {
        let lhs = self.load(a.handle(), CipherKind::Uint8)?;
        let handle = self.store_computed(2, &[a.handle()], CipherKind::Bool, (lhs == b) as u8);
        Ok(Ebool(handle))
    }

    fn and(&mut self, a: Ebool, b: Ebool) -> Result<Ebool, FheError> {
        let lhs = self.load(a.handle(), CipherKind::Bool)?;
        let rhs = self.load(b.handle(), CipherKind::Bool)?;
        let handle = self.store_computed(3, &[a.handle(), b.handle()], CipherKind::Bool, lhs & rhs);
        Ok(Ebool(handle))
    }

    fn or(&mut self, a: Ebool, b: Ebool) -> Result<Ebool, FheError> {
        let lhs = self.load(a.handle(), CipherKind::Bool)?;
        let rhs = self.load(b.handle(), CipherKind::Bool)?;
        let handle = self.store_computed(4, &[a.handle(), b.handle()], CipherKind::Bool, lhs | rhs);
        Ok(Ebool(handle))
    }

    fn select(&mut self, cond: Ebool, if_true: Euint8, if_false: Euint8) -> Result<Euint8, FheError> {
        let c = self.load(cond.handle(), CipherKind::Bool)?;
        let t = self.load(if_true.handle(), CipherKind::Uint8)?;
        let f = self.load(if_false.handle(), CipherKind::Uint8)?;
        let value = if c != 0 { t } else { f };
        let handle = self.store_computed(
            5,
            &[cond.handle(), if_true.handle(), if_false.handle()],
            CipherKind::Uint8,
            value,
        );
        Ok(Euint8(handle))
    }

    fn release(&mut self, handle: &CiphertextHandle) -> Result<(), FheError> {
        if self.table.remove(handle).is_none() {
            return Err(FheError::UnknownHandle(*handle));
        }
        let grants: Vec<_> = self
            .acl
            .range((*handle, Address::ZERO)..=(*handle, Address::new([0xff; 20])))
            .copied()
            .collect();
        for grant in &grants {
            self.acl.remove(grant);
        }
        trace!(handle = %handle, "released ciphertext");
        Ok(())
    }
}

// =============================================================================
// CLIENT SIDE
// =============================================================================

/// Produces [`EncryptedInput`]s the matching [`LocalFhe`] will accept.
#[derive(Clone, Debug)]
pub struct InputEncryptor {
    dev_key: [u8; 32],
    contract: Address,
}

impl InputEncryptor {
    /// Create an encryptor for inputs bound to `contract`.
    pub fn new(dev_key: [u8; 32], contract: Address) -> Self {
        Self { dev_key, contract }
    }

    /// Encrypt with a caller-chosen nonce.
    pub fn encrypt_u8_with_nonce(&self, value: u8, user: &Address, nonce: [u8; NONCE_LEN]) -> EncryptedInput {
        let masked = value ^ mask_byte(&self.dev_key, &nonce);
        let handle = input_handle(&nonce, masked);
        let tag = proof_tag(&self.dev_key, &handle, &self.contract, user, &nonce, masked);

        let mut proof = Vec::with_capacity(PROOF_LEN);
        proof.extend_from_slice(&nonce);
        proof.push(masked);
        proof.extend_from_slice(&tag);

        EncryptedInput { handle, proof }
    }

    /// Encrypt with a fresh random nonce.
    pub fn encrypt_u8(&self, value: u8, user: &Address) -> EncryptedInput {
        self.encrypt_u8_with_nonce(value, user, uuid::Uuid::new_v4().into_bytes())
    }
}

fn input_handle(nonce: &[u8], masked: u8) -> Digest32 {
    let mut hasher = DomainHasher::new(DOMAIN_INPUT_HANDLE);
    hasher.update_bytes(nonce);
    hasher.update_u8(masked);
    hasher.finalize()
}

fn mask_byte(key: &[u8; 32], nonce: &[u8]) -> u8 {
    let mut hasher = DomainHasher::new(DOMAIN_INPUT_MASK);
    hasher.update_bytes(key);
    hasher.update_bytes(nonce);
    hasher.finalize()[0]
}

fn proof_tag(
    key: &[u8; 32],
    handle: &[u8; 32],
    contract: &Address,
    user: &Address,
    nonce: &[u8],
    masked: u8,
) -> Digest32 {
    let mut hasher = DomainHasher::new(DOMAIN_INPUT_PROOF);
    hasher.update_bytes(key);
    hasher.update_bytes(handle);
    hasher.update_bytes(contract.as_bytes());
    hasher.update_bytes(user.as_bytes());
    hasher.update_bytes(nonce);
    hasher.update_u8(masked);
    hasher.finalize()
}
