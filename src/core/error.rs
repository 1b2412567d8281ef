//! Error handling - Hierarchical, zero-cost errors

use thiserror::Error;

use crate::core::types::AccountId;

pub type Result<T> = std::result::Result<T, Error>;

/// Bankwerk error hierarchy
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration errors
    #[error("Config: {0}")]
    Config(String),

    /// Non-positive amount at a mutation entry point
    #[error("Invalid amount: must be a positive number")]
    InvalidAmount,

    /// Owner change attempted on a locked account
    #[error("Account {0} is locked")]
    Locked(AccountId),

    /// Account id not present in the registry
    #[error("Unknown account: {0}")]
    UnknownAccount(AccountId),

    /// Missing or empty owner at account creation
    #[error("Account owner must be present")]
    InvalidOwner,

    /// Operation not supported by this account kind
    #[error("Operation not supported by this account kind")]
    Unsupported,

    /// Order handle cancelled before completion
    #[error("Order cancelled")]
    Cancelled,

    /// Malformed incoming transfer
    #[error("Invalid transfer: {0}")]
    InvalidTransfer(&'static str),

    /// Price feed errors
    #[error("Feed: {0}")]
    Feed(String),

    /// Background task failures
    #[error("Task: {0}")]
    Task(String),
}
