//! The deterministic ledger: module table, account store, and all-or-nothing
//! transaction execution.

use crate::config::LedgerConfig;
use crate::crypto::{self, Address, KeyPair};
use crate::error::{LedgerError, Result};
use crate::runtime::account::{AccountRecord, AccountRef, ModuleId};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A module installed in the runtime. Dispatch receives the invocation's
/// account references through the context and the raw instruction data.
pub trait Module: Send + Sync {
    fn id(&self) -> ModuleId;
    fn dispatch(&self, ctx: &mut CallContext<'_>, data: &[u8]) -> Result<()>;
}

/// One top-level call into a module.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Operation {
    pub module: ModuleId,
    pub accounts: Vec<AccountRef>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SignatureEntry {
    pub public_key: Vec<u8>,
    pub signature: Vec<u8>,
}

/// A transaction: operations plus the signatures authorizing them. Applied
/// atomically; a failure in any operation leaves the ledger untouched.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Transaction {
    pub operations: Vec<Operation>,
    pub signatures: Vec<SignatureEntry>,
}

impl Transaction {
    pub fn new(operations: Vec<Operation>) -> Self {
        Transaction {
            operations,
            signatures: Vec::new(),
        }
    }

    pub fn signable_message(&self) -> Vec<u8> {
        let mut message = Vec::new();
        for op in &self.operations {
            message.extend_from_slice(&op.module);
            message.extend_from_slice(&(op.accounts.len() as u64).to_le_bytes());
            for account in &op.accounts {
                message.extend_from_slice(&account.address);
                message.push(account.is_signer as u8);
                message.push(account.is_writable as u8);
            }
            message.extend_from_slice(&(op.data.len() as u64).to_le_bytes());
            message.extend_from_slice(&op.data);
        }
        message
    }

    pub fn sign(&mut self, keypair: &KeyPair) -> Result<()> {
        let signature = keypair.sign(&self.signable_message())?;
        self.signatures.push(SignatureEntry {
            public_key: keypair.public_key_bytes().to_vec(),
            signature: signature.to_vec(),
        });
        Ok(())
    }

    /// Validate serialized size to prevent oversized submissions
    pub fn validate_size(&self, max_size: usize) -> Result<()> {
        let serialized = bincode::serialize(self)?;
        if serialized.len() > max_size {
            return Err(LedgerError::InvalidInstruction(format!(
                "Transaction too large: {} bytes (max: {})",
                serialized.len(),
                max_size
            )));
        }
        Ok(())
    }
}

/// Returned when a transaction commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CommitReceipt {
    pub slot: u64,
    pub timestamp_millis: i64,
}

#[derive(Debug, Default)]
struct LedgerState {
    accounts: HashMap<Address, AccountRecord>,
    slot: u64,
}

/// The replicated state machine stand-in: serialized, deterministic, and
/// atomic per transaction.
pub struct Ledger {
    modules: HashMap<ModuleId, Arc<dyn Module>>,
    state: RwLock<LedgerState>,
    config: LedgerConfig,
}

impl Ledger {
    pub fn new() -> Self {
        Self::with_config(LedgerConfig::default())
    }

    pub fn with_config(config: LedgerConfig) -> Self {
        Ledger {
            modules: HashMap::new(),
            state: RwLock::new(LedgerState::default()),
            config,
        }
    }

    /// Install a module. Installation happens at boot, before transactions
    /// are accepted; installing two modules under one identity is a wiring
    /// error.
    pub fn install_module(&mut self, module: Arc<dyn Module>) -> Result<()> {
        let id = module.id();
        if self.modules.contains_key(&id) {
            return Err(LedgerError::ConfigError(format!(
                "Module {} is already installed",
                hex::encode(id)
            )));
        }
        info!(module = %hex::encode(id), "module installed");
        self.modules.insert(id, module);
        Ok(())
    }

    pub fn module_installed(&self, id: &ModuleId) -> bool {
        self.modules.contains_key(id)
    }

    pub fn current_slot(&self) -> u64 {
        self.state.read().slot
    }

    /// Read a snapshot of an account's data.
    pub fn account_data(&self, address: &Address) -> Result<Vec<u8>> {
        let state = self.state.read();
        state
            .accounts
            .get(address)
            .map(|record| record.data.clone())
            .ok_or_else(|| LedgerError::AccountNotFound(hex::encode(address)))
    }

    pub fn account_owner(&self, address: &Address) -> Result<ModuleId> {
        let state = self.state.read();
        state
            .accounts
            .get(address)
            .map(|record| record.owner)
            .ok_or_else(|| LedgerError::AccountNotFound(hex::encode(address)))
    }

    pub fn account_exists(&self, address: &Address) -> bool {
        self.state.read().accounts.contains_key(address)
    }

    /// Apply a transaction atomically: verify signatures, execute every
    /// operation against a scratch copy of the account store, and only swap
    /// the scratch in if the whole transaction succeeded.
    pub fn submit(&self, tx: &Transaction) -> Result<CommitReceipt> {
        tx.validate_size(self.config.max_transaction_size)?;

        let message = tx.signable_message();
        let mut signers: HashSet<Address> = HashSet::new();
        for entry in &tx.signatures {
            crypto::verify_signature(&entry.public_key, &message, &entry.signature)
                .map_err(|_| LedgerError::Unauthorized)?;
            signers.insert(crypto::address_from_public_key_bytes(&entry.public_key)?);
        }

        for op in &tx.operations {
            for account in &op.accounts {
                if account.is_signer && !signers.contains(&account.address) {
                    return Err(LedgerError::Unauthorized);
                }
            }
        }

        let mut state = self.state.write();
        let mut scratch = state.accounts.clone();

        match self.execute_operations(&mut scratch, &signers, &tx.operations) {
            Ok(()) => {
                state.accounts = scratch;
                state.slot += 1;
                let receipt = CommitReceipt {
                    slot: state.slot,
                    timestamp_millis: chrono::Utc::now().timestamp_millis(),
                };
                info!(slot = receipt.slot, "transaction committed");
                Ok(receipt)
            }
            Err(e) => {
                warn!(error = %e, "transaction aborted, state unchanged");
                Err(e)
            }
        }
    }

    fn execute_operations(
        &self,
        accounts: &mut HashMap<Address, AccountRecord>,
        signers: &HashSet<Address>,
        operations: &[Operation],
    ) -> Result<()> {
        for op in operations {
            let module = self
                .modules
                .get(&op.module)
                .cloned()
                .ok_or_else(|| LedgerError::UnknownModule(hex::encode(op.module)))?;

            let mut ctx = CallContext {
                modules: &self.modules,
                accounts: &mut *accounts,
                signers,
                config: &self.config,
                current_module: op.module,
                account_refs: op.accounts.clone(),
                depth: 0,
            };
            module.dispatch(&mut ctx, &op.data)?;
        }
        Ok(())
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

/// Execution context handed to a module for one invocation. Wraps the
/// transaction's scratch account store; nothing done here is visible outside
/// the transaction until commit.
pub struct CallContext<'a> {
    modules: &'a HashMap<ModuleId, Arc<dyn Module>>,
    accounts: &'a mut HashMap<Address, AccountRecord>,
    signers: &'a HashSet<Address>,
    config: &'a LedgerConfig,
    current_module: ModuleId,
    account_refs: Vec<AccountRef>,
    depth: u8,
}

impl<'a> CallContext<'a> {
    pub fn current_module(&self) -> ModuleId {
        self.current_module
    }

    /// Account references visible to this invocation, in caller order.
    pub fn account_refs(&self) -> &[AccountRef] {
        &self.account_refs
    }

    pub fn module_exists(&self, id: &ModuleId) -> bool {
        self.modules.contains_key(id)
    }

    /// True when `address` is declared as a signer for this invocation and
    /// the transaction carries a verified signature for it.
    pub fn is_signer(&self, address: &Address) -> bool {
        self.signers.contains(address)
            && self
                .account_refs
                .iter()
                .any(|r| r.address == *address && r.is_signer)
    }

    pub fn account_exists(&self, address: &Address) -> bool {
        self.accounts.contains_key(address)
    }

    pub fn account_owner(&self, address: &Address) -> Result<ModuleId> {
        self.accounts
            .get(address)
            .map(|record| record.owner)
            .ok_or_else(|| LedgerError::AccountNotFound(hex::encode(address)))
    }

    pub fn account_data(&self, address: &Address) -> Result<&[u8]> {
        self.accounts
            .get(address)
            .map(|record| record.data.as_slice())
            .ok_or_else(|| LedgerError::AccountNotFound(hex::encode(address)))
    }

    fn require_writable_ref(&self, address: &Address) -> Result<()> {
        let declared = self
            .account_refs
            .iter()
            .any(|r| r.address == *address && r.is_writable);
        if declared {
            Ok(())
        } else {
            Err(LedgerError::InvalidInstruction(format!(
                "Account {} is not declared writable for this invocation",
                hex::encode(address)
            )))
        }
    }

    /// Create a zeroed account at `address`, owned by `owner`. The store's
    /// create-if-absent check is the sole arbiter of address freshness.
    pub fn create_account(&mut self, address: Address, owner: ModuleId, size: usize) -> Result<()> {
        self.require_writable_ref(&address)?;
        if size > self.config.max_account_size {
            return Err(LedgerError::InvalidInstruction(format!(
                "Account size {} exceeds maximum {}",
                size, self.config.max_account_size
            )));
        }
        if self.accounts.contains_key(&address) {
            return Err(LedgerError::AccountInUse(hex::encode(address)));
        }
        debug!(
            address = %hex::encode(address),
            owner = %hex::encode(owner),
            size,
            "account created"
        );
        self.accounts.insert(address, AccountRecord::new(owner, size));
        Ok(())
    }

    /// Mutate an account's bytes. Only the owning module may write, and the
    /// account must be declared writable for this invocation.
    pub fn write_account(
        &mut self,
        address: &Address,
        write: impl FnOnce(&mut [u8]) -> Result<()>,
    ) -> Result<()> {
        self.require_writable_ref(address)?;
        let record = self
            .accounts
            .get_mut(address)
            .ok_or_else(|| LedgerError::AccountNotFound(hex::encode(address)))?;
        if record.owner != self.current_module {
            return Err(LedgerError::Unauthorized);
        }
        write(&mut record.data)
    }

    /// Invoke another module within the same transaction. The callee sees
    /// exactly the account references passed here; signer privileges can be
    /// forwarded only for identities the transaction actually signed for.
    pub fn invoke(
        &mut self,
        module_id: ModuleId,
        data: &[u8],
        accounts: Vec<AccountRef>,
    ) -> Result<()> {
        if self.depth + 1 > self.config.max_invoke_depth {
            return Err(LedgerError::InvalidInstruction(format!(
                "Invoke depth limit {} exceeded",
                self.config.max_invoke_depth
            )));
        }
        let module = self
            .modules
            .get(&module_id)
            .cloned()
            .ok_or_else(|| LedgerError::UnknownModule(hex::encode(module_id)))?;

        for account in &accounts {
            if account.is_signer && !self.signers.contains(&account.address) {
                return Err(LedgerError::Unauthorized);
            }
        }

        debug!(
            caller = %hex::encode(self.current_module),
            callee = %hex::encode(module_id),
            "inter-module call"
        );

        let caller = std::mem::replace(&mut self.current_module, module_id);
        let caller_refs = std::mem::replace(&mut self.account_refs, accounts);
        self.depth += 1;

        let result = module.dispatch(self, data);

        self.depth -= 1;
        self.current_module = caller;
        self.account_refs = caller_refs;
        result
    }
}
