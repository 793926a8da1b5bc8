//! Reference token backend
//!
//! Interprets exactly the payload shapes the frontend forwards:
//! `mint_authority (32) || decimals (1)` for mint initialization, an empty
//! payload for token-account initialization (owner arrives as an account
//! reference), and `amount (u64 LE)` for mint_to. Writes exactly
//! [`MINT_LEN`]/[`TOKEN_ACCOUNT_LEN`] bytes; a registration that recorded
//! other sizes is backend misconfiguration and surfaces as `SizeMismatch`.

use crate::crypto::Address;
use crate::error::{LedgerError, Result};
use crate::frontend::dispatch::{
    BACKEND_OP_INITIALIZE_MINT, BACKEND_OP_INITIALIZE_TOKEN_ACCOUNT, BACKEND_OP_MINT_TO,
};
use crate::runtime::account::{discriminator, AccountRef, ModuleId, DISCRIMINATOR_LEN};
use crate::runtime::ledger::{CallContext, Module};

/// Layout: discriminator (8) | mint_authority (32) | supply (8) | decimals (1)
pub const MINT_LEN: usize = DISCRIMINATOR_LEN + 32 + 8 + 1;

/// Layout: discriminator (8) | owner (32) | balance (8)
pub const TOKEN_ACCOUNT_LEN: usize = DISCRIMINATOR_LEN + 32 + 8;

const INITIALIZE_MINT_PAYLOAD_LEN: usize = 33;
const MINT_TO_PAYLOAD_LEN: usize = 8;

fn mint_discriminator() -> [u8; DISCRIMINATOR_LEN] {
    discriminator("account:mint")
}

fn token_account_discriminator() -> [u8; DISCRIMINATOR_LEN] {
    discriminator("account:token_account")
}

/// A mint: the identity allowed to create supply, the running supply, and
/// the fixed decimal scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mint {
    pub mint_authority: Address,
    pub supply: u64,
    pub decimals: u8,
}

impl Mint {
    pub fn pack(&self, data: &mut [u8]) -> Result<()> {
        if data.len() != MINT_LEN {
            return Err(LedgerError::SizeMismatch(format!(
                "Mint account must be {} bytes, got {}",
                MINT_LEN,
                data.len()
            )));
        }
        data[..8].copy_from_slice(&mint_discriminator());
        data[8..40].copy_from_slice(&self.mint_authority);
        data[40..48].copy_from_slice(&self.supply.to_le_bytes());
        data[48] = self.decimals;
        Ok(())
    }

    pub fn unpack(data: &[u8]) -> Result<Self> {
        if data.len() != MINT_LEN {
            return Err(LedgerError::SizeMismatch(format!(
                "Mint account must be {} bytes, got {}",
                MINT_LEN,
                data.len()
            )));
        }
        if data[..8] != mint_discriminator() {
            return Err(LedgerError::BackendRejected(
                "Not a mint account".to_string(),
            ));
        }
        let mut mint_authority = [0u8; 32];
        mint_authority.copy_from_slice(&data[8..40]);
        let mut supply = [0u8; 8];
        supply.copy_from_slice(&data[40..48]);
        let supply = u64::from_le_bytes(supply);
        Ok(Mint {
            mint_authority,
            supply,
            decimals: data[48],
        })
    }
}

/// A token account: the owning identity and its balance. The mint it is
/// denominated in is committed by the account's derived address, which binds
/// the same nonce as the mint's address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenAccount {
    pub owner: Address,
    pub balance: u64,
}

impl TokenAccount {
    pub fn pack(&self, data: &mut [u8]) -> Result<()> {
        if data.len() != TOKEN_ACCOUNT_LEN {
            return Err(LedgerError::SizeMismatch(format!(
                "Token account must be {} bytes, got {}",
                TOKEN_ACCOUNT_LEN,
                data.len()
            )));
        }
        data[..8].copy_from_slice(&token_account_discriminator());
        data[8..40].copy_from_slice(&self.owner);
        data[40..48].copy_from_slice(&self.balance.to_le_bytes());
        Ok(())
    }

    pub fn unpack(data: &[u8]) -> Result<Self> {
        if data.len() != TOKEN_ACCOUNT_LEN {
            return Err(LedgerError::SizeMismatch(format!(
                "Token account must be {} bytes, got {}",
                TOKEN_ACCOUNT_LEN,
                data.len()
            )));
        }
        if data[..8] != token_account_discriminator() {
            return Err(LedgerError::BackendRejected(
                "Not a token account".to_string(),
            ));
        }
        let mut owner = [0u8; 32];
        owner.copy_from_slice(&data[8..40]);
        let mut balance = [0u8; 8];
        balance.copy_from_slice(&data[40..48]);
        let balance = u64::from_le_bytes(balance);
        Ok(TokenAccount { owner, balance })
    }
}

/// Client-side payload for mint initialization, without any discriminator.
pub fn initialize_mint_payload(mint_authority: &Address, decimals: u8) -> Vec<u8> {
    let mut payload = Vec::with_capacity(INITIALIZE_MINT_PAYLOAD_LEN);
    payload.extend_from_slice(mint_authority);
    payload.push(decimals);
    payload
}

/// The reference backend module.
pub struct BasicTokenBackend {
    module: ModuleId,
}

impl BasicTokenBackend {
    pub fn new(module: ModuleId) -> Self {
        BasicTokenBackend { module }
    }

    /// The account sizes this backend expects the frontend to register.
    pub fn required_sizes() -> (u32, u32) {
        (TOKEN_ACCOUNT_LEN as u32, MINT_LEN as u32)
    }

    fn account_ref(ctx: &CallContext<'_>, index: usize) -> Result<AccountRef> {
        ctx.account_refs().get(index).copied().ok_or_else(|| {
            LedgerError::BackendRejected(format!("Missing account reference {}", index))
        })
    }

    fn ensure_fresh(&self, ctx: &CallContext<'_>, address: &Address, expected: usize) -> Result<()> {
        let data = ctx.account_data(address)?;
        if data.len() != expected {
            return Err(LedgerError::SizeMismatch(format!(
                "Expected a {} byte account, got {}",
                expected,
                data.len()
            )));
        }
        if data[..DISCRIMINATOR_LEN] != [0u8; DISCRIMINATOR_LEN] {
            return Err(LedgerError::AlreadyInitialized);
        }
        Ok(())
    }

    fn process_initialize_mint(&self, ctx: &mut CallContext<'_>, payload: &[u8]) -> Result<()> {
        if payload.len() != INITIALIZE_MINT_PAYLOAD_LEN {
            return Err(LedgerError::BackendRejected(format!(
                "initialize_mint payload must be {} bytes, got {}",
                INITIALIZE_MINT_PAYLOAD_LEN,
                payload.len()
            )));
        }
        let mint_account = Self::account_ref(ctx, 0)?;
        self.ensure_fresh(ctx, &mint_account.address, MINT_LEN)?;

        let mut mint_authority = [0u8; 32];
        mint_authority.copy_from_slice(&payload[..32]);
        let mint = Mint {
            mint_authority,
            supply: 0,
            decimals: payload[32],
        };
        ctx.write_account(&mint_account.address, |data| mint.pack(data))
    }

    fn process_initialize_token_account(
        &self,
        ctx: &mut CallContext<'_>,
        payload: &[u8],
    ) -> Result<()> {
        if !payload.is_empty() {
            return Err(LedgerError::BackendRejected(format!(
                "initialize_token_account payload must be empty, got {} bytes",
                payload.len()
            )));
        }
        let token_account = Self::account_ref(ctx, 0)?;
        let owner = Self::account_ref(ctx, 1)?;
        self.ensure_fresh(ctx, &token_account.address, TOKEN_ACCOUNT_LEN)?;

        let record = TokenAccount {
            owner: owner.address,
            balance: 0,
        };
        ctx.write_account(&token_account.address, |data| record.pack(data))
    }

    fn process_mint_to(&self, ctx: &mut CallContext<'_>, payload: &[u8]) -> Result<()> {
        if payload.len() != MINT_TO_PAYLOAD_LEN {
            return Err(LedgerError::BackendRejected(format!(
                "mint_to payload must be {} bytes, got {}",
                MINT_TO_PAYLOAD_LEN,
                payload.len()
            )));
        }
        let mut amount = [0u8; 8];
        amount.copy_from_slice(payload);
        let amount = u64::from_le_bytes(amount);

        let mint_account = Self::account_ref(ctx, 0)?;
        let token_account = Self::account_ref(ctx, 1)?;

        let mut mint = Mint::unpack(ctx.account_data(&mint_account.address)?)?;
        let mut token = TokenAccount::unpack(ctx.account_data(&token_account.address)?)?;

        let authorized = ctx
            .account_refs()
            .iter()
            .skip(2)
            .any(|r| r.is_signer && r.address == mint.mint_authority && ctx.is_signer(&r.address));
        if !authorized {
            return Err(LedgerError::Unauthorized);
        }

        mint.supply = mint
            .supply
            .checked_add(amount)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        token.balance = token
            .balance
            .checked_add(amount)
            .ok_or(LedgerError::ArithmeticOverflow)?;

        ctx.write_account(&mint_account.address, |data| mint.pack(data))?;
        ctx.write_account(&token_account.address, |data| token.pack(data))
    }
}

impl Module for BasicTokenBackend {
    fn id(&self) -> ModuleId {
        self.module
    }

    fn dispatch(&self, ctx: &mut CallContext<'_>, data: &[u8]) -> Result<()> {
        if data.len() < DISCRIMINATOR_LEN {
            return Err(LedgerError::BackendRejected(
                "Missing instruction discriminator".to_string(),
            ));
        }
        let (disc, payload) = data.split_at(DISCRIMINATOR_LEN);

        if disc == discriminator(BACKEND_OP_INITIALIZE_MINT) {
            self.process_initialize_mint(ctx, payload)
        } else if disc == discriminator(BACKEND_OP_INITIALIZE_TOKEN_ACCOUNT) {
            self.process_initialize_token_account(ctx, payload)
        } else if disc == discriminator(BACKEND_OP_MINT_TO) {
            self.process_mint_to(ctx, payload)
        } else {
            Err(LedgerError::BackendRejected(
                "Unknown backend instruction".to_string(),
            ))
        }
    }
}
