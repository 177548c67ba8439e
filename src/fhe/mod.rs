//! FHE Subsystem Boundary
//!
//! The registry treats encrypted values as opaque handles and reaches the
//! FHE subsystem only through [`FheCapability`].
//!
//! - `handle`: ciphertext handles and client inputs
//! - `capability`: the trait the registry consumes
//! - `local`: in-process development backend

pub mod handle;
pub mod capability;
pub mod local;

pub use handle::{CiphertextHandle, Ebool, EncryptedInput, Euint8};
pub use capability::{CipherKind, FheCapability, FheError};
pub use local::{InputEncryptor, LocalFhe, LocalFheConfig};
