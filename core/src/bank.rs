//! Fungible token balances the distributor moves funds through.
//!
//! Tokens are opaque here: a token is an [`Address`] and a balance is a
//! [`U256`]. The ledger only needs transfers, balance reads, and the
//! ability to undo transfers issued by an operation that later fails.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::{Address, U256};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BankError {
    #[error("{owner} holds {available} of {token}, {requested} requested")]
    InsufficientBalance {
        token: Address,
        owner: Address,
        available: U256,
        requested: U256,
    },

    #[error("transfer of {token} rejected: {reason}")]
    Rejected { token: Address, reason: String },

    #[error("balance overflow")]
    Overflow,
}

/// Token balance backend.
pub trait TokenBank {
    /// Opaque restore point, see [`TokenBank::rollback`].
    type Checkpoint;

    fn balance_of(&self, token: &Address, owner: &Address) -> U256;

    fn transfer(
        &mut self,
        token: &Address,
        from: &Address,
        to: &Address,
        amount: U256,
    ) -> Result<(), BankError>;

    fn checkpoint(&self) -> Self::Checkpoint;

    /// Restore every balance to what it was at `checkpoint`.
    fn rollback(&mut self, checkpoint: Self::Checkpoint);
}

/// In-process balances keyed by (token, owner).
#[derive(Debug, Clone, Default)]
pub struct InMemoryBank {
    balances: BTreeMap<(Address, Address), U256>,
}

impl InMemoryBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create `amount` of `token` out of thin air for `owner`.
    pub fn mint(&mut self, token: &Address, owner: &Address, amount: U256) -> Result<(), BankError> {
        let balance = self.balances.entry((*token, *owner)).or_default();
        *balance = balance.checked_add(amount).ok_or(BankError::Overflow)?;
        Ok(())
    }

    /// Sum of all balances of `token`.
    pub fn total_supply(&self, token: &Address) -> U256 {
        self.balances
            .iter()
            .filter(|((t, _), _)| t == token)
            .fold(U256::zero(), |acc, (_, v)| acc.saturating_add(*v))
    }
}

impl TokenBank for InMemoryBank {
    type Checkpoint = BTreeMap<(Address, Address), U256>;

    fn balance_of(&self, token: &Address, owner: &Address) -> U256 {
        self.balances
            .get(&(*token, *owner))
            .copied()
            .unwrap_or_default()
    }

    fn transfer(
        &mut self,
        token: &Address,
        from: &Address,
        to: &Address,
        amount: U256,
    ) -> Result<(), BankError> {
        if amount.is_zero() || from == to {
            return Ok(());
        }
        let available = self.balance_of(token, from);
        let remaining = available
            .checked_sub(amount)
            .ok_or(BankError::InsufficientBalance {
                token: *token,
                owner: *from,
                available,
                requested: amount,
            })?;
        let credited = self
            .balance_of(token, to)
            .checked_add(amount)
            .ok_or(BankError::Overflow)?;

        self.balances.insert((*token, *from), remaining);
        self.balances.insert((*token, *to), credited);
        Ok(())
    }

    fn checkpoint(&self) -> Self::Checkpoint {
        self.balances.clone()
    }

    fn rollback(&mut self, checkpoint: Self::Checkpoint) {
        self.balances = checkpoint;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: Address = Address::repeat(0xee);

    #[test]
    fn test_transfer_moves_balance() {
        let alice = Address::repeat(1);
        let bob = Address::repeat(2);
        let mut bank = InMemoryBank::new();
        bank.mint(&TOKEN, &alice, U256::from(100u64)).unwrap();

        bank.transfer(&TOKEN, &alice, &bob, U256::from(30u64)).unwrap();
        assert_eq!(bank.balance_of(&TOKEN, &alice), U256::from(70u64));
        assert_eq!(bank.balance_of(&TOKEN, &bob), U256::from(30u64));
        assert_eq!(bank.total_supply(&TOKEN), U256::from(100u64));
    }

    #[test]
    fn test_transfer_insufficient_balance() {
        let alice = Address::repeat(1);
        let bob = Address::repeat(2);
        let mut bank = InMemoryBank::new();
        bank.mint(&TOKEN, &alice, U256::from(10u64)).unwrap();

        let err = bank
            .transfer(&TOKEN, &alice, &bob, U256::from(11u64))
            .unwrap_err();
        assert!(matches!(err, BankError::InsufficientBalance { .. }));
        assert_eq!(bank.balance_of(&TOKEN, &alice), U256::from(10u64));
        assert!(bank.balance_of(&TOKEN, &bob).is_zero());
    }

    #[test]
    fn test_rollback_restores_checkpoint() {
        let alice = Address::repeat(1);
        let bob = Address::repeat(2);
        let mut bank = InMemoryBank::new();
        bank.mint(&TOKEN, &alice, U256::from(50u64)).unwrap();

        let checkpoint = bank.checkpoint();
        bank.transfer(&TOKEN, &alice, &bob, U256::from(50u64)).unwrap();
        bank.rollback(checkpoint);

        assert_eq!(bank.balance_of(&TOKEN, &alice), U256::from(50u64));
        assert!(bank.balance_of(&TOKEN, &bob).is_zero());
    }
}
