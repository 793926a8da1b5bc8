//! Frontend operations and state machine
//!
//! The frontend owns address derivation and account existence; the backend
//! owns the byte-level contents of mints and token accounts once created.
//! Existence is arbitrated solely by the runtime's create-if-absent account
//! creation; the frontend keeps no separate existence flags.

use crate::crypto::Address;
use crate::derive::{derive_address, DerivedAddress};
use crate::error::{LedgerError, Result};
use crate::frontend::dispatch::{
    self, BACKEND_OP_INITIALIZE_MINT, BACKEND_OP_INITIALIZE_TOKEN_ACCOUNT, BACKEND_OP_MINT_TO,
};
use crate::frontend::registry::{self, BackendRegistration, REGISTRATION_LEN};
use crate::runtime::account::{discriminator, AccountRef, ModuleId, DISCRIMINATOR_LEN};
use crate::runtime::ledger::{CallContext, Module, Operation};
use tracing::info;

/// Seed tag for mint addresses.
pub const MINT_TAG: &[u8] = b"mint";
/// Seed tag for token account addresses.
pub const TOKEN_TAG: &[u8] = b"token";

/// Address of the mint identified by `nonce` under `frontend`.
pub fn mint_address(frontend: &Address, nonce: u64) -> Result<DerivedAddress> {
    derive_address(frontend, MINT_TAG, &[&nonce.to_le_bytes()])
}

/// Address of the token account for `(nonce, owner)` under `frontend`.
pub fn token_account_address(
    frontend: &Address,
    nonce: u64,
    owner: &Address,
) -> Result<DerivedAddress> {
    derive_address(frontend, TOKEN_TAG, &[&nonce.to_le_bytes(), owner])
}

/// Wire format of a frontend call: 8-byte operation discriminator followed
/// by fixed-width fields, trailing opaque backend payload where applicable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrontendInstruction {
    RegisterBackend {
        backend: ModuleId,
        token_account_size: u32,
        mint_size: u32,
    },
    InitializeMint {
        backend: ModuleId,
        nonce: u64,
        payload: Vec<u8>,
    },
    InitializeTokenAccount {
        backend: ModuleId,
        owner: Address,
        nonce: u64,
        payload: Vec<u8>,
    },
    MintTo {
        backend: ModuleId,
        owner: Address,
        nonce: u64,
        amount: u64,
    },
}

fn op_register_backend() -> [u8; DISCRIMINATOR_LEN] {
    discriminator("token_frontend:register_backend")
}

fn op_initialize_mint() -> [u8; DISCRIMINATOR_LEN] {
    discriminator("token_frontend:initialize_mint")
}

fn op_initialize_token_account() -> [u8; DISCRIMINATOR_LEN] {
    discriminator("token_frontend:initialize_token_account")
}

fn op_mint_to() -> [u8; DISCRIMINATOR_LEN] {
    discriminator("token_frontend:mint_to")
}

fn read_address(data: &[u8], offset: &mut usize) -> Result<Address> {
    let end = *offset + 32;
    let bytes = data.get(*offset..end).ok_or_else(|| {
        LedgerError::InvalidInstruction("Truncated instruction data".to_string())
    })?;
    *offset = end;
    let mut address = [0u8; 32];
    address.copy_from_slice(bytes);
    Ok(address)
}

fn read_u32(data: &[u8], offset: &mut usize) -> Result<u32> {
    let end = *offset + 4;
    let bytes = data.get(*offset..end).ok_or_else(|| {
        LedgerError::InvalidInstruction("Truncated instruction data".to_string())
    })?;
    *offset = end;
    let mut buf = [0u8; 4];
    buf.copy_from_slice(bytes);
    Ok(u32::from_le_bytes(buf))
}

fn read_u64(data: &[u8], offset: &mut usize) -> Result<u64> {
    let end = *offset + 8;
    let bytes = data.get(*offset..end).ok_or_else(|| {
        LedgerError::InvalidInstruction("Truncated instruction data".to_string())
    })?;
    *offset = end;
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    Ok(u64::from_le_bytes(buf))
}

impl FrontendInstruction {
    pub fn encode(&self) -> Vec<u8> {
        let mut data = Vec::new();
        match self {
            FrontendInstruction::RegisterBackend {
                backend,
                token_account_size,
                mint_size,
            } => {
                data.extend_from_slice(&op_register_backend());
                data.extend_from_slice(backend);
                data.extend_from_slice(&token_account_size.to_le_bytes());
                data.extend_from_slice(&mint_size.to_le_bytes());
            }
            FrontendInstruction::InitializeMint {
                backend,
                nonce,
                payload,
            } => {
                data.extend_from_slice(&op_initialize_mint());
                data.extend_from_slice(backend);
                data.extend_from_slice(&nonce.to_le_bytes());
                data.extend_from_slice(payload);
            }
            FrontendInstruction::InitializeTokenAccount {
                backend,
                owner,
                nonce,
                payload,
            } => {
                data.extend_from_slice(&op_initialize_token_account());
                data.extend_from_slice(backend);
                data.extend_from_slice(owner);
                data.extend_from_slice(&nonce.to_le_bytes());
                data.extend_from_slice(payload);
            }
            FrontendInstruction::MintTo {
                backend,
                owner,
                nonce,
                amount,
            } => {
                data.extend_from_slice(&op_mint_to());
                data.extend_from_slice(backend);
                data.extend_from_slice(owner);
                data.extend_from_slice(&nonce.to_le_bytes());
                data.extend_from_slice(&amount.to_le_bytes());
            }
        }
        data
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < DISCRIMINATOR_LEN {
            return Err(LedgerError::InvalidInstruction(
                "Instruction data shorter than discriminator".to_string(),
            ));
        }
        let disc = &data[..DISCRIMINATOR_LEN];
        let mut offset = DISCRIMINATOR_LEN;

        if disc == op_register_backend() {
            let backend = read_address(data, &mut offset)?;
            let token_account_size = read_u32(data, &mut offset)?;
            let mint_size = read_u32(data, &mut offset)?;
            if offset != data.len() {
                return Err(LedgerError::InvalidInstruction(
                    "Trailing bytes after register_backend".to_string(),
                ));
            }
            Ok(FrontendInstruction::RegisterBackend {
                backend,
                token_account_size,
                mint_size,
            })
        } else if disc == op_initialize_mint() {
            let backend = read_address(data, &mut offset)?;
            let nonce = read_u64(data, &mut offset)?;
            Ok(FrontendInstruction::InitializeMint {
                backend,
                nonce,
                payload: data[offset..].to_vec(),
            })
        } else if disc == op_initialize_token_account() {
            let backend = read_address(data, &mut offset)?;
            let owner = read_address(data, &mut offset)?;
            let nonce = read_u64(data, &mut offset)?;
            Ok(FrontendInstruction::InitializeTokenAccount {
                backend,
                owner,
                nonce,
                payload: data[offset..].to_vec(),
            })
        } else if disc == op_mint_to() {
            let backend = read_address(data, &mut offset)?;
            let owner = read_address(data, &mut offset)?;
            let nonce = read_u64(data, &mut offset)?;
            let amount = read_u64(data, &mut offset)?;
            if offset != data.len() {
                return Err(LedgerError::InvalidInstruction(
                    "Trailing bytes after mint_to".to_string(),
                ));
            }
            Ok(FrontendInstruction::MintTo {
                backend,
                owner,
                nonce,
                amount,
            })
        } else {
            Err(LedgerError::InvalidInstruction(
                "Unknown frontend instruction".to_string(),
            ))
        }
    }
}

/// The frontend module.
pub struct TokenFrontend {
    module: ModuleId,
}

impl TokenFrontend {
    pub fn new(module: ModuleId) -> Self {
        TokenFrontend { module }
    }

    pub fn module_id(&self) -> ModuleId {
        self.module
    }

    fn expect_declared(&self, ctx: &CallContext<'_>, address: &Address) -> Result<()> {
        if ctx.account_refs().iter().any(|r| r.address == *address) {
            Ok(())
        } else {
            Err(LedgerError::InvalidInstruction(format!(
                "Derived address {} missing from account list",
                hex::encode(address)
            )))
        }
    }

    fn process_register_backend(
        &self,
        ctx: &mut CallContext<'_>,
        backend: ModuleId,
        token_account_size: u32,
        mint_size: u32,
    ) -> Result<()> {
        if !ctx.module_exists(&backend) {
            return Err(LedgerError::UnknownModule(hex::encode(backend)));
        }
        if (token_account_size as usize) < DISCRIMINATOR_LEN
            || (mint_size as usize) < DISCRIMINATOR_LEN
        {
            return Err(LedgerError::InvalidInstruction(format!(
                "Registered sizes must be at least {} bytes",
                DISCRIMINATOR_LEN
            )));
        }

        let derived = BackendRegistration::derive(&self.module, &backend)?;
        self.expect_declared(ctx, &derived.address)?;

        match ctx.create_account(derived.address, self.module, REGISTRATION_LEN) {
            Err(LedgerError::AccountInUse(_)) => return Err(LedgerError::AlreadyRegistered),
            other => other?,
        }

        let record = BackendRegistration {
            backend_id: backend,
            token_account_size,
            mint_size,
        };
        ctx.write_account(&derived.address, |data| record.pack(data))?;

        info!(
            backend = %hex::encode(backend),
            token_account_size,
            mint_size,
            "backend registered"
        );
        Ok(())
    }

    fn process_initialize_mint(
        &self,
        ctx: &mut CallContext<'_>,
        backend: ModuleId,
        nonce: u64,
        payload: &[u8],
    ) -> Result<()> {
        let registration = registry::load_registration(ctx, &self.module, &backend)?;

        let mint = mint_address(&self.module, nonce)?;
        self.expect_declared(ctx, &mint.address)?;

        match ctx.create_account(mint.address, backend, registration.mint_size as usize) {
            Err(LedgerError::AccountInUse(_)) => return Err(LedgerError::AlreadyInitialized),
            other => other?,
        }

        dispatch::delegate(
            ctx,
            backend,
            BACKEND_OP_INITIALIZE_MINT,
            payload,
            vec![AccountRef::writable(mint.address)],
        )?;

        info!(mint = %hex::encode(mint.address), nonce, "mint initialized");
        Ok(())
    }

    fn process_initialize_token_account(
        &self,
        ctx: &mut CallContext<'_>,
        backend: ModuleId,
        owner: Address,
        nonce: u64,
        payload: &[u8],
    ) -> Result<()> {
        let registration = registry::load_registration(ctx, &self.module, &backend)?;

        // Policy: the mint for this nonce must already exist and belong to
        // the registered backend.
        let mint = mint_address(&self.module, nonce)?;
        if !ctx.account_exists(&mint.address) || ctx.account_owner(&mint.address)? != backend {
            return Err(LedgerError::MintNotFound(hex::encode(mint.address)));
        }

        let token = token_account_address(&self.module, nonce, &owner)?;
        self.expect_declared(ctx, &token.address)?;

        match ctx.create_account(
            token.address,
            backend,
            registration.token_account_size as usize,
        ) {
            Err(LedgerError::AccountInUse(_)) => return Err(LedgerError::AlreadyInitialized),
            other => other?,
        }

        dispatch::delegate(
            ctx,
            backend,
            BACKEND_OP_INITIALIZE_TOKEN_ACCOUNT,
            payload,
            vec![
                AccountRef::writable(token.address),
                AccountRef::readonly(owner),
            ],
        )?;

        info!(
            token_account = %hex::encode(token.address),
            owner = %hex::encode(owner),
            nonce,
            "token account initialized"
        );
        Ok(())
    }

    fn process_mint_to(
        &self,
        ctx: &mut CallContext<'_>,
        backend: ModuleId,
        owner: Address,
        nonce: u64,
        amount: u64,
    ) -> Result<()> {
        registry::load_registration(ctx, &self.module, &backend)?;

        let mint = mint_address(&self.module, nonce)?;
        let token = token_account_address(&self.module, nonce, &owner)?;
        self.expect_declared(ctx, &mint.address)?;
        self.expect_declared(ctx, &token.address)?;

        let mut accounts = vec![
            AccountRef::writable(mint.address),
            AccountRef::writable(token.address),
        ];
        let signers: Vec<AccountRef> = ctx
            .account_refs()
            .iter()
            .copied()
            .filter(|r| r.is_signer)
            .collect();
        if signers.is_empty() {
            return Err(LedgerError::Unauthorized);
        }
        accounts.extend(signers);

        dispatch::delegate(
            ctx,
            backend,
            BACKEND_OP_MINT_TO,
            &amount.to_le_bytes(),
            accounts,
        )?;

        info!(
            token_account = %hex::encode(token.address),
            amount,
            "minted to token account"
        );
        Ok(())
    }
}

impl Module for TokenFrontend {
    fn id(&self) -> ModuleId {
        self.module
    }

    fn dispatch(&self, ctx: &mut CallContext<'_>, data: &[u8]) -> Result<()> {
        match FrontendInstruction::decode(data)? {
            FrontendInstruction::RegisterBackend {
                backend,
                token_account_size,
                mint_size,
            } => self.process_register_backend(ctx, backend, token_account_size, mint_size),
            FrontendInstruction::InitializeMint {
                backend,
                nonce,
                payload,
            } => self.process_initialize_mint(ctx, backend, nonce, &payload),
            FrontendInstruction::InitializeTokenAccount {
                backend,
                owner,
                nonce,
                payload,
            } => self.process_initialize_token_account(ctx, backend, owner, nonce, &payload),
            FrontendInstruction::MintTo {
                backend,
                owner,
                nonce,
                amount,
            } => self.process_mint_to(ctx, backend, owner, nonce, amount),
        }
    }
}

// ----------------------------------------------------------------------------
// Client-side operation builders
// ----------------------------------------------------------------------------

/// Build the `register_backend` operation.
pub fn register_backend_op(
    frontend: &ModuleId,
    backend: &ModuleId,
    token_account_size: u32,
    mint_size: u32,
) -> Result<Operation> {
    let registration = BackendRegistration::derive(frontend, backend)?;
    Ok(Operation {
        module: *frontend,
        accounts: vec![
            AccountRef::writable(registration.address),
            AccountRef::readonly(*backend),
        ],
        data: FrontendInstruction::RegisterBackend {
            backend: *backend,
            token_account_size,
            mint_size,
        }
        .encode(),
    })
}

/// Build the `initialize_mint` operation. `payload` is the backend-specific
/// body, without any discriminator.
pub fn initialize_mint_op(
    frontend: &ModuleId,
    backend: &ModuleId,
    nonce: u64,
    payload: Vec<u8>,
) -> Result<Operation> {
    let registration = BackendRegistration::derive(frontend, backend)?;
    let mint = mint_address(frontend, nonce)?;
    Ok(Operation {
        module: *frontend,
        accounts: vec![
            AccountRef::readonly(registration.address),
            AccountRef::writable(mint.address),
            AccountRef::readonly(*backend),
        ],
        data: FrontendInstruction::InitializeMint {
            backend: *backend,
            nonce,
            payload,
        }
        .encode(),
    })
}

/// Build the `initialize_token_account` operation.
pub fn initialize_token_account_op(
    frontend: &ModuleId,
    backend: &ModuleId,
    owner: &Address,
    nonce: u64,
    payload: Vec<u8>,
) -> Result<Operation> {
    let registration = BackendRegistration::derive(frontend, backend)?;
    let mint = mint_address(frontend, nonce)?;
    let token = token_account_address(frontend, nonce, owner)?;
    Ok(Operation {
        module: *frontend,
        accounts: vec![
            AccountRef::readonly(registration.address),
            AccountRef::readonly(mint.address),
            AccountRef::writable(token.address),
            AccountRef::readonly(*owner),
            AccountRef::readonly(*backend),
        ],
        data: FrontendInstruction::InitializeTokenAccount {
            backend: *backend,
            owner: *owner,
            nonce,
            payload,
        }
        .encode(),
    })
}

/// Build the `mint_to` operation. The transaction must additionally be
/// signed by `authority`.
pub fn mint_to_op(
    frontend: &ModuleId,
    backend: &ModuleId,
    owner: &Address,
    nonce: u64,
    amount: u64,
    authority: &Address,
) -> Result<Operation> {
    let registration = BackendRegistration::derive(frontend, backend)?;
    let mint = mint_address(frontend, nonce)?;
    let token = token_account_address(frontend, nonce, owner)?;
    Ok(Operation {
        module: *frontend,
        accounts: vec![
            AccountRef::readonly(registration.address),
            AccountRef::writable(mint.address),
            AccountRef::writable(token.address),
            AccountRef::signer(*authority),
            AccountRef::readonly(*backend),
        ],
        data: FrontendInstruction::MintTo {
            backend: *backend,
            owner: *owner,
            nonce,
            amount,
        }
        .encode(),
    })
}
