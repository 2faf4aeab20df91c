//! Error types for the distribution ledger and its input boundary.

use thiserror::Error;

use crate::{Address, Hash, U256};
use crate::bank::BankError;

/// Failure classes. Nothing in this crate is retried automatically; the
/// class tells the caller what to do instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad arguments or distributor configuration. Fix the input.
    Configuration,
    /// Caller lacks the admin role.
    Authorization,
    /// Proof data is stale or corrupted. Re-fetch it from the latest snapshot.
    Proof,
    /// Permanent for this leaf (already paid, or pool exhausted).
    State,
    /// The token bank refused a transfer.
    Transfer,
}

/// Errors returned by [`crate::RewardDistributor`]. On any error the ledger
/// and its bank are left exactly as they were before the call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("caller {caller} is not an admin")]
    Unauthorized { caller: Address },

    #[error("cannot revoke the last admin {admin}")]
    LastAdmin { admin: Address },

    #[error("input length mismatch: {left} vs {right}")]
    LengthMismatch { left: usize, right: usize },

    #[error("fee rate {rate} exceeds 100% ({scale})")]
    FeeOutOfRange { rate: U256, scale: U256 },

    #[error("custody account {account} cannot deposit, claim or withdraw")]
    CustodyCounterparty { account: Address },

    #[error("fee recipient is not set")]
    FeeRecipientNotSet,

    #[error("token {token} is not whitelisted")]
    TokenNotWhitelisted { token: Address },

    #[error("deposit of {amount} {token} is below the minimum {min_amount}")]
    BelowMinimum {
        token: Address,
        amount: U256,
        min_amount: U256,
    },

    #[error("amount must be greater than zero")]
    ZeroAmount,

    #[error("no claims supplied")]
    EmptyClaim,

    #[error("proof has {len} elements, limit is {max}")]
    ProofTooLong { len: usize, max: usize },

    #[error("season {season_id} has no published merkle root")]
    NoRootPublished { season_id: u64 },

    #[error("invalid merkle proof for season {season_id}")]
    InvalidProof { season_id: u64 },

    #[error("leaf 0x{} already claimed in season {season_id}", hex::encode(.leaf))]
    AlreadyClaimed { season_id: u64, leaf: Hash },

    #[error("season {season_id} pool holds {available} of {token}, {requested} requested")]
    InsufficientPool {
        season_id: u64,
        token: Address,
        available: U256,
        requested: U256,
    },

    #[error("unused rewards of season {season_id} are locked until {unlock_at}")]
    WithdrawalLocked { season_id: u64, unlock_at: u64 },

    #[error("arithmetic overflow")]
    Overflow,

    #[error("token transfer failed: {0}")]
    Transfer(#[from] BankError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthorized { .. } | Self::LastAdmin { .. } => ErrorKind::Authorization,
            Self::NoRootPublished { .. }
            | Self::InvalidProof { .. }
            | Self::ProofTooLong { .. } => ErrorKind::Proof,
            Self::AlreadyClaimed { .. } | Self::InsufficientPool { .. } => ErrorKind::State,
            Self::Transfer(_) => ErrorKind::Transfer,
            Self::LengthMismatch { .. }
            | Self::FeeOutOfRange { .. }
            | Self::FeeRecipientNotSet
            | Self::CustodyCounterparty { .. }
            | Self::TokenNotWhitelisted { .. }
            | Self::BelowMinimum { .. }
            | Self::ZeroAmount
            | Self::EmptyClaim
            | Self::WithdrawalLocked { .. }
            | Self::Overflow
            | Self::Parse(_) => ErrorKind::Configuration,
        }
    }
}

/// Malformed values at the hex/decimal boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("invalid unsigned integer: {0:?}")]
    InvalidNumber(String),
}
