//! Error types for the chain core

use crate::types::Address;
use thiserror::Error;

/// Result type for chain operations
pub type Result<T> = std::result::Result<T, Error>;

/// Chain core errors
#[derive(Error, Debug)]
pub enum Error {
    /// Named precondition violated; aborts only the current operation
    #[error("expectation failed: {0}")]
    Expect(String),

    /// Insufficient token balance, with the exact shortfall for diagnostics
    #[error("insufficient {token} balance in {address}: missing {shortfall}")]
    InsufficientBalance {
        /// Token symbol
        token: String,
        /// Account short of funds
        address: Address,
        /// Exact amount missing
        shortfall: u128,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}

/// Assertion-as-control-flow: fail the current operation when `cond` is false.
pub fn expect(cond: bool, msg: impl Into<String>) -> Result<()> {
    if cond {
        Ok(())
    } else {
        Err(Error::Expect(msg.into()))
    }
}
