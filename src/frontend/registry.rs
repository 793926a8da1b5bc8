//! Backend registration records
//!
//! One record per registered backend, persisted at a derived address. The
//! record is write-once: it is created by `register_backend` and never
//! mutated or deleted afterwards. Everything the frontend needs to create
//! accounts on a backend's behalf is in here: the fixed sizes of the two
//! account kinds the backend manages.

use crate::crypto::Address;
use crate::derive::{derive_address, DerivedAddress};
use crate::error::{LedgerError, Result};
use crate::runtime::account::{discriminator, ModuleId, DISCRIMINATOR_LEN};
use crate::runtime::ledger::CallContext;

/// Seed tag for registration record addresses.
pub const BACKEND_TAG: &[u8] = b"backend";

/// Layout: discriminator (8) | backend_id (32) | token_account_size (4) | mint_size (4)
pub const REGISTRATION_LEN: usize = DISCRIMINATOR_LEN + 32 + 4 + 4;

fn registration_discriminator() -> [u8; DISCRIMINATOR_LEN] {
    discriminator("account:backend_registration")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendRegistration {
    pub backend_id: ModuleId,
    pub token_account_size: u32,
    pub mint_size: u32,
}

impl BackendRegistration {
    /// Address of the registration record for `backend_id` under `frontend`.
    pub fn derive(frontend: &Address, backend_id: &ModuleId) -> Result<DerivedAddress> {
        derive_address(frontend, BACKEND_TAG, &[backend_id])
    }

    pub fn pack(&self, data: &mut [u8]) -> Result<()> {
        if data.len() != REGISTRATION_LEN {
            return Err(LedgerError::SizeMismatch(format!(
                "Registration record must be {} bytes, got {}",
                REGISTRATION_LEN,
                data.len()
            )));
        }
        data[..8].copy_from_slice(&registration_discriminator());
        data[8..40].copy_from_slice(&self.backend_id);
        data[40..44].copy_from_slice(&self.token_account_size.to_le_bytes());
        data[44..48].copy_from_slice(&self.mint_size.to_le_bytes());
        Ok(())
    }

    pub fn unpack(data: &[u8]) -> Result<Self> {
        if data.len() != REGISTRATION_LEN {
            return Err(LedgerError::SizeMismatch(format!(
                "Registration record must be {} bytes, got {}",
                REGISTRATION_LEN,
                data.len()
            )));
        }
        if data[..8] != registration_discriminator() {
            return Err(LedgerError::InvalidInstruction(
                "Not a backend registration record".to_string(),
            ));
        }
        let mut backend_id = [0u8; 32];
        backend_id.copy_from_slice(&data[8..40]);
        let mut token_account_size = [0u8; 4];
        token_account_size.copy_from_slice(&data[40..44]);
        let token_account_size = u32::from_le_bytes(token_account_size);
        let mut mint_size = [0u8; 4];
        mint_size.copy_from_slice(&data[44..48]);
        let mint_size = u32::from_le_bytes(mint_size);
        Ok(BackendRegistration {
            backend_id,
            token_account_size,
            mint_size,
        })
    }
}

/// Read and decode the registration record for `backend_id`, or fail with
/// `BackendNotRegistered`. Downstream account creation must use exactly the
/// sizes recorded here.
pub fn load_registration(
    ctx: &CallContext<'_>,
    frontend: &Address,
    backend_id: &ModuleId,
) -> Result<BackendRegistration> {
    let derived = BackendRegistration::derive(frontend, backend_id)?;
    if !ctx.account_exists(&derived.address) || ctx.account_owner(&derived.address)? != *frontend {
        return Err(LedgerError::BackendNotRegistered(hex::encode(backend_id)));
    }
    let data = ctx.account_data(&derived.address)?;
    BackendRegistration::unpack(data)
}
