//! Account records and per-invocation account references

use crate::crypto::Address;
use sha2::{Digest, Sha256};

/// Identity of an installed module. Modules are addressed the same way
/// accounts are.
pub type ModuleId = Address;

/// Width of the type discriminator that opens every persisted account and
/// every instruction payload.
pub const DISCRIMINATOR_LEN: usize = 8;

/// Compute the 8-byte discriminator for a namespaced name, e.g.
/// `"account:mint"` or `"basic_token:mint_to"`.
pub fn discriminator(name: &str) -> [u8; DISCRIMINATOR_LEN] {
    let digest = Sha256::digest(name.as_bytes());
    let mut disc = [0u8; DISCRIMINATOR_LEN];
    disc.copy_from_slice(&digest[..DISCRIMINATOR_LEN]);
    disc
}

/// A persisted account: exclusively writable by its owning module.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AccountRecord {
    pub owner: ModuleId,
    pub data: Vec<u8>,
}

impl AccountRecord {
    pub fn new(owner: ModuleId, size: usize) -> Self {
        AccountRecord {
            owner,
            data: vec![0u8; size],
        }
    }
}

/// An account named by an operation, with the privileges the caller grants
/// for this invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AccountRef {
    pub address: Address,
    pub is_signer: bool,
    pub is_writable: bool,
}

impl AccountRef {
    pub fn readonly(address: Address) -> Self {
        AccountRef {
            address,
            is_signer: false,
            is_writable: false,
        }
    }

    pub fn writable(address: Address) -> Self {
        AccountRef {
            address,
            is_signer: false,
            is_writable: true,
        }
    }

    pub fn signer(address: Address) -> Self {
        AccountRef {
            address,
            is_signer: true,
            is_writable: false,
        }
    }
}
