//! Deterministic address derivation for ModToken
//!
//! Logical objects (backend registrations, mints, token accounts) live at
//! addresses computed from a domain tag plus discriminating key material,
//! instead of at randomly generated identities. A derived address must never
//! collide with a wallet identity: wallet addresses are secp256k1
//! x-coordinates, so any candidate that lifts onto the curve is skipped and
//! the bump value is decremented until an off-curve candidate is found.

use crate::crypto::Address;
use crate::error::{LedgerError, Result};
use secp256k1::PublicKey;
use sha2::{Digest, Sha256};

/// Domain separator mixed into every derived address.
pub const DERIVED_ADDRESS_MARKER: &[u8] = b"ModTokenDerivedAddress";

/// A derived address together with the bump that disambiguated it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DerivedAddress {
    pub address: Address,
    pub bump: u8,
}

/// Derive the deterministic address for `(tag, seeds)` under `program`.
///
/// Identical inputs always produce the identical `(address, bump)` pair. The
/// bump search starts at 255 and decrements; exhausting the whole bump space
/// is a fatal configuration error and is not expected in practice.
pub fn derive_address(program: &Address, tag: &[u8], seeds: &[&[u8]]) -> Result<DerivedAddress> {
    let mut bump = u8::MAX;
    loop {
        let address = candidate_address(program, tag, seeds, bump);
        if !is_curve_x_coordinate(&address) {
            return Ok(DerivedAddress { address, bump });
        }
        if bump == 0 {
            return Err(LedgerError::DerivationExhausted);
        }
        bump -= 1;
    }
}

fn candidate_address(program: &Address, tag: &[u8], seeds: &[&[u8]], bump: u8) -> Address {
    let mut hasher = Sha256::new();
    hasher.update(tag);
    for seed in seeds {
        hasher.update(seed);
    }
    hasher.update([bump]);
    hasher.update(program);
    hasher.update(DERIVED_ADDRESS_MARKER);
    hasher.finalize().into()
}

/// True when `address` is a valid secp256k1 x-coordinate, i.e. some keypair
/// could own it as a wallet identity.
pub fn is_curve_x_coordinate(address: &Address) -> bool {
    let mut compressed = [0u8; 33];
    compressed[0] = 0x02;
    compressed[1..].copy_from_slice(address);
    PublicKey::from_slice(&compressed).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{address_from_string, KeyPair};

    #[test]
    fn test_derivation_is_deterministic() {
        let program = address_from_string("test-program");
        let nonce = 7u64.to_le_bytes();

        let first = derive_address(&program, b"mint", &[&nonce]).unwrap();
        let second = derive_address(&program, b"mint", &[&nonce]).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_distinct_nonces_yield_distinct_addresses() {
        let program = address_from_string("test-program");
        let a = derive_address(&program, b"mint", &[&1u64.to_le_bytes()]).unwrap();
        let b = derive_address(&program, b"mint", &[&2u64.to_le_bytes()]).unwrap();

        assert_ne!(a.address, b.address);
    }

    #[test]
    fn test_distinct_tags_yield_distinct_addresses() {
        let program = address_from_string("test-program");
        let nonce = 4u64.to_le_bytes();
        let mint = derive_address(&program, b"mint", &[&nonce]).unwrap();
        let token = derive_address(&program, b"token", &[&nonce]).unwrap();

        assert_ne!(mint.address, token.address);
    }

    #[test]
    fn test_distinct_programs_yield_distinct_addresses() {
        let nonce = 4u64.to_le_bytes();
        let a = derive_address(&address_from_string("program-a"), b"mint", &[&nonce]).unwrap();
        let b = derive_address(&address_from_string("program-b"), b"mint", &[&nonce]).unwrap();

        assert_ne!(a.address, b.address);
    }

    #[test]
    fn test_derived_addresses_are_off_curve() {
        let program = address_from_string("test-program");
        for nonce in 0u64..64 {
            let derived =
                derive_address(&program, b"token", &[&nonce.to_le_bytes()]).unwrap();
            assert!(!is_curve_x_coordinate(&derived.address));
        }
    }

    #[test]
    fn test_wallet_identities_are_on_curve() {
        // A derived address can therefore never equal a wallet identity.
        for _ in 0..8 {
            let keypair = KeyPair::generate().unwrap();
            assert!(is_curve_x_coordinate(&keypair.address()));
        }
    }

    #[test]
    fn test_owner_seed_separates_token_accounts() {
        let program = address_from_string("test-program");
        let nonce = 9u64.to_le_bytes();
        let owner_a = address_from_string("owner-a");
        let owner_b = address_from_string("owner-b");

        let a = derive_address(&program, b"token", &[&nonce, &owner_a]).unwrap();
        let b = derive_address(&program, b"token", &[&nonce, &owner_b]).unwrap();

        assert_ne!(a.address, b.address);
    }
}
