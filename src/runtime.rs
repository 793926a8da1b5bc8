//! Ledger runtime: account storage, transaction atomicity, signature
//! verification, and inter-module invocation. The protocol modules are
//! written against this boundary.

pub mod account;
pub mod ledger;

pub use self::account::*;
pub use self::ledger::*;
