//! Delegation dispatcher
//!
//! Exactly one inter-module call per top-level frontend operation. The
//! frontend owns the 8-byte instruction discriminator; the payload handed in
//! here must not contain it, and the dispatcher never interprets the payload.
//! Atomicity is the runtime's: a failing delegation aborts the enclosing
//! transaction and rolls back any account created earlier in it. No retries.

use crate::error::Result;
use crate::runtime::account::{discriminator, AccountRef, ModuleId, DISCRIMINATOR_LEN};
use crate::runtime::ledger::CallContext;
use tracing::debug;

/// Backend operation names. These are protocol ABI: every backend module
/// dispatches on the discriminators of exactly these names.
pub const BACKEND_OP_INITIALIZE_MINT: &str = "backend:initialize_mint";
pub const BACKEND_OP_INITIALIZE_TOKEN_ACCOUNT: &str = "backend:initialize_token_account";
pub const BACKEND_OP_MINT_TO: &str = "backend:mint_to";

/// Build `discriminator || payload` for a backend operation name.
pub fn encode_call(op_name: &str, payload: &[u8]) -> Vec<u8> {
    let mut data = Vec::with_capacity(DISCRIMINATOR_LEN + payload.len());
    data.extend_from_slice(&discriminator(op_name));
    data.extend_from_slice(payload);
    data
}

/// Forward an opaque operation payload to `backend_id` along with the
/// accounts the backend needs. Errors from the backend propagate verbatim.
pub fn delegate(
    ctx: &mut CallContext<'_>,
    backend_id: ModuleId,
    op_name: &str,
    payload: &[u8],
    accounts: Vec<AccountRef>,
) -> Result<()> {
    debug!(
        backend = %hex::encode(backend_id),
        op = op_name,
        payload_len = payload.len(),
        "delegating to backend"
    );
    ctx.invoke(backend_id, &encode_call(op_name, payload), accounts)
}
