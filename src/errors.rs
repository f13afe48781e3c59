use crate::models::AccountId;
use std::time::Duration;
use thiserror::Error;

/// Outcome of a transfer or balance request that did not succeed.
///
/// Every variant except `Internal` is a business outcome the caller can act
/// on. `Internal` wraps a storage fault and never displays its cause.
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("amount must be greater than zero")]
    InvalidAmount,
    #[error("cannot transfer to the same account")]
    SameAccount,
    #[error("account {0} not found")]
    AccountNotFound(AccountId),
    #[error("insufficient funds")]
    InsufficientFunds,
    #[error("internal failure")]
    Internal(#[from] StoreError),
}

/// Tag-only view of [`TransferError`], comparable and `Copy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidAmount,
    SameAccount,
    AccountNotFound,
    InsufficientFunds,
    Internal,
}

impl TransferError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransferError::InvalidAmount => ErrorKind::InvalidAmount,
            TransferError::SameAccount => ErrorKind::SameAccount,
            TransferError::AccountNotFound(_) => ErrorKind::AccountNotFound,
            TransferError::InsufficientFunds => ErrorKind::InsufficientFunds,
            TransferError::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidAmount => "invalid_amount",
            ErrorKind::SameAccount => "same_account",
            ErrorKind::AccountNotFound => "account_not_found",
            ErrorKind::InsufficientFunds => "insufficient_funds",
            ErrorKind::Internal => "internal",
        }
    }
}

/// Faults raised by a store implementation.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("journal I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt journal entry at line {line}: {reason}")]
    Journal { line: usize, reason: String },
    #[error("transaction deadline of {0:?} exceeded")]
    Timeout(Duration),
    #[error("account {0} is not locked by this transaction")]
    NotLocked(AccountId),
    #[error("account {0} vanished during update")]
    RowNotFound(AccountId),
    #[error("balance of account {0} would overflow")]
    Overflow(AccountId),
    #[error("balance of account {0} would become negative")]
    NegativeBalance(AccountId),
    #[error("account {0} already exists")]
    DuplicateAccount(AccountId),
    #[error("commit task failed: {0}")]
    CommitTask(#[from] tokio::task::JoinError),
}
