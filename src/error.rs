//! Error types for ModToken

use std::fmt;

#[derive(Debug, Clone)]
pub enum LedgerError {
    AlreadyRegistered,
    BackendNotRegistered(String),
    SizeMismatch(String),
    AlreadyInitialized,
    Unauthorized,
    ArithmeticOverflow,
    DerivationExhausted,
    BackendRejected(String),
    MintNotFound(String),
    UnknownModule(String),
    AccountNotFound(String),
    AccountInUse(String),
    InvalidInstruction(String),
    CryptoError(String),
    ConfigError(String),
    IoError(String),
    BincodeError(String),
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LedgerError::AlreadyRegistered => write!(f, "Backend is already registered"),
            LedgerError::BackendNotRegistered(msg) => {
                write!(f, "Backend not registered: {}", msg)
            }
            LedgerError::SizeMismatch(msg) => write!(f, "Account size mismatch: {}", msg),
            LedgerError::AlreadyInitialized => write!(f, "Account is already initialized"),
            LedgerError::Unauthorized => write!(f, "Missing or invalid authority signature"),
            LedgerError::ArithmeticOverflow => write!(f, "Arithmetic overflow"),
            LedgerError::DerivationExhausted => write!(f, "Address derivation bump space exhausted"),
            LedgerError::BackendRejected(msg) => write!(f, "Backend rejected operation: {}", msg),
            LedgerError::MintNotFound(msg) => write!(f, "Mint not found: {}", msg),
            LedgerError::UnknownModule(msg) => write!(f, "Unknown module: {}", msg),
            LedgerError::AccountNotFound(msg) => write!(f, "Account not found: {}", msg),
            LedgerError::AccountInUse(msg) => write!(f, "Account address in use: {}", msg),
            LedgerError::InvalidInstruction(msg) => write!(f, "Invalid instruction: {}", msg),
            LedgerError::CryptoError(msg) => write!(f, "Cryptographic error: {}", msg),
            LedgerError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            LedgerError::IoError(msg) => write!(f, "IO error: {}", msg),
            LedgerError::BincodeError(msg) => write!(f, "Bincode error: {}", msg),
        }
    }
}

impl std::error::Error for LedgerError {}

impl From<std::io::Error> for LedgerError {
    fn from(err: std::io::Error) -> Self {
        LedgerError::IoError(err.to_string())
    }
}

impl From<Box<bincode::ErrorKind>> for LedgerError {
    fn from(err: Box<bincode::ErrorKind>) -> Self {
        LedgerError::BincodeError(err.to_string())
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, LedgerError>;
