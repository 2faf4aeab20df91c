//! Distribution ledger: per-season roots, pools and claim records, plus the
//! distributor-wide whitelist and fee configuration.
//!
//! Every mutating operation is a transaction. All checks run first against
//! the current state; effects are then applied through a journal, and if any
//! token transfer fails the journal is reverted and the bank rolled back, so
//! a failed call leaves no trace.
//!
//! Claims follow checks-effects-interactions per tuple: the leaf is recorded
//! and the pool debited before the payout transfer is issued.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info, warn};

use crate::bank::TokenBank;
use crate::claim::ClaimRequest;
use crate::error::LedgerError;
use crate::fee::{check_fee_rate, split_fee, FeeSplit};
use crate::{verify_merkle_proof, Address, Hash, U256};

/// Time after a season's last root update before an admin may sweep what
/// is left in its pool (30 days, in seconds).
pub const UNUSED_REWARDS_DELAY: u64 = 30 * 24 * 60 * 60;

/// Record of a successful state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerEvent {
    MerkleRootUpdated {
        season_id: u64,
        root: Hash,
        version: u64,
    },
    TokenWhitelisted {
        token: Address,
        min_amount: U256,
    },
    TokenRemovedFromWhitelist {
        token: Address,
    },
    RewardFeeUpdated {
        rate: U256,
    },
    FeeRecipientUpdated {
        recipient: Address,
    },
    RewardsDeposited {
        season_id: u64,
        depositor: Address,
        token: Address,
        amount: U256,
        fee: U256,
    },
    RewardClaimed {
        season_id: u64,
        claimant: Address,
        token: Address,
        amount: U256,
        leaf: Hash,
    },
    UnusedRewardsWithdrawn {
        season_id: u64,
        token: Address,
        amount: U256,
        to: Address,
    },
    AdminGranted {
        admin: Address,
    },
    AdminRevoked {
        admin: Address,
    },
}

#[derive(Debug, Clone, Default)]
struct Season {
    root: Option<Hash>,
    root_version: u64,
    root_updated_at: Option<u64>,
    pool: BTreeMap<Address, U256>,
    claimed: BTreeSet<Hash>,
}

impl Season {
    fn pool_balance(&self, token: &Address) -> U256 {
        self.pool.get(token).copied().unwrap_or_default()
    }
}

/// Undo log for the effects of one in-flight operation.
#[derive(Default)]
struct Journal {
    entries: Vec<JournalEntry>,
}

enum JournalEntry {
    Claimed { season_id: u64, leaf: Hash },
    PoolDebited { season_id: u64, token: Address, amount: U256 },
    PoolCredited { season_id: u64, token: Address, amount: U256 },
}

impl Journal {
    fn revert(self, seasons: &mut BTreeMap<u64, Season>) {
        for entry in self.entries.into_iter().rev() {
            match entry {
                JournalEntry::Claimed { season_id, leaf } => {
                    if let Some(season) = seasons.get_mut(&season_id) {
                        season.claimed.remove(&leaf);
                    }
                }
                JournalEntry::PoolDebited {
                    season_id,
                    token,
                    amount,
                } => {
                    let season = seasons.entry(season_id).or_default();
                    let balance = season.pool.entry(token).or_default();
                    *balance = balance.saturating_add(amount);
                }
                JournalEntry::PoolCredited {
                    season_id,
                    token,
                    amount,
                } => {
                    let season = seasons.entry(season_id).or_default();
                    let balance = season.pool.entry(token).or_default();
                    *balance = balance.saturating_sub(amount);
                }
            }
        }
    }
}

/// The season-scoped reward distributor.
///
/// Owns its [`TokenBank`]; tokens held for all pools sit under the
/// `custody` address in that bank.
pub struct RewardDistributor<B: TokenBank> {
    custody: Address,
    bank: B,
    admins: BTreeSet<Address>,
    whitelist: BTreeMap<Address, U256>,
    fee_rate: U256,
    fee_recipient: Option<Address>,
    seasons: BTreeMap<u64, Season>,
    events: Vec<LedgerEvent>,
}

impl<B: TokenBank> RewardDistributor<B> {
    pub fn new(admin: Address, custody: Address, bank: B) -> Self {
        Self {
            custody,
            bank,
            admins: BTreeSet::from([admin]),
            whitelist: BTreeMap::new(),
            fee_rate: U256::zero(),
            fee_recipient: None,
            seasons: BTreeMap::new(),
            events: Vec::new(),
        }
    }

    fn ensure_admin(&self, caller: &Address) -> Result<(), LedgerError> {
        if self.admins.contains(caller) {
            Ok(())
        } else {
            warn!(%caller, "rejected privileged call from non-admin");
            Err(LedgerError::Unauthorized { caller: *caller })
        }
    }

    /// Custody cannot move tokens to itself, so it may not act as depositor,
    /// claimant or withdrawal recipient.
    fn ensure_not_custody(&self, account: &Address) -> Result<(), LedgerError> {
        if *account == self.custody {
            warn!(%account, "rejected custody as counterparty");
            return Err(LedgerError::CustodyCounterparty { account: *account });
        }
        Ok(())
    }

    fn emit(&mut self, event: LedgerEvent) {
        debug!(?event, "ledger event");
        self.events.push(event);
    }

    pub fn grant_admin(&mut self, caller: &Address, admin: Address) -> Result<(), LedgerError> {
        self.ensure_admin(caller)?;
        if self.admins.insert(admin) {
            info!(%admin, "admin granted");
            self.emit(LedgerEvent::AdminGranted { admin });
        }
        Ok(())
    }

    pub fn revoke_admin(&mut self, caller: &Address, admin: &Address) -> Result<(), LedgerError> {
        self.ensure_admin(caller)?;
        if !self.admins.contains(admin) {
            return Ok(());
        }
        if self.admins.len() == 1 {
            return Err(LedgerError::LastAdmin { admin: *admin });
        }
        self.admins.remove(admin);
        info!(%admin, "admin revoked");
        self.emit(LedgerEvent::AdminRevoked { admin: *admin });
        Ok(())
    }

    /// Publish or overwrite the root for `season_id`.
    ///
    /// Leaves already claimed in the season stay claimed under the new root.
    /// Proofs issued against the previous root stop verifying.
    pub fn update_merkle_root(
        &mut self,
        caller: &Address,
        season_id: u64,
        root: Hash,
        now: u64,
    ) -> Result<(), LedgerError> {
        self.ensure_admin(caller)?;
        let season = self.seasons.entry(season_id).or_default();
        if season.root.is_some() && !season.claimed.is_empty() {
            warn!(
                season_id,
                claimed = season.claimed.len(),
                "replacing merkle root of a season with existing claims; unclaimed proofs against the old root are orphaned"
            );
        }
        season.root = Some(root);
        season.root_version += 1;
        season.root_updated_at = Some(now);
        let version = season.root_version;
        info!(season_id, version, root = %crate::hash_to_hex(&root), "merkle root updated");
        self.emit(LedgerEvent::MerkleRootUpdated {
            season_id,
            root,
            version,
        });
        Ok(())
    }

    pub fn add_to_whitelist(
        &mut self,
        caller: &Address,
        tokens: &[Address],
        min_amounts: &[U256],
    ) -> Result<(), LedgerError> {
        self.ensure_admin(caller)?;
        if tokens.len() != min_amounts.len() {
            return Err(LedgerError::LengthMismatch {
                left: tokens.len(),
                right: min_amounts.len(),
            });
        }
        for (token, min_amount) in tokens.iter().zip(min_amounts) {
            self.whitelist.insert(*token, *min_amount);
            info!(%token, %min_amount, "token whitelisted");
            self.emit(LedgerEvent::TokenWhitelisted {
                token: *token,
                min_amount: *min_amount,
            });
        }
        Ok(())
    }

    pub fn remove_from_whitelist(
        &mut self,
        caller: &Address,
        tokens: &[Address],
    ) -> Result<(), LedgerError> {
        self.ensure_admin(caller)?;
        if let Some(token) = tokens.iter().find(|t| !self.whitelist.contains_key(t)) {
            return Err(LedgerError::TokenNotWhitelisted { token: *token });
        }
        for token in tokens {
            self.whitelist.remove(token);
            info!(%token, "token removed from whitelist");
            self.emit(LedgerEvent::TokenRemovedFromWhitelist { token: *token });
        }
        Ok(())
    }

    /// Set the deposit fee, 18-decimal fixed point where `FEE_SCALE` is 100%.
    pub fn set_reward_fee(&mut self, caller: &Address, rate: U256) -> Result<(), LedgerError> {
        self.ensure_admin(caller)?;
        check_fee_rate(rate)?;
        self.fee_rate = rate;
        info!(%rate, "reward fee updated");
        self.emit(LedgerEvent::RewardFeeUpdated { rate });
        Ok(())
    }

    pub fn set_fee_recipient(
        &mut self,
        caller: &Address,
        recipient: Address,
    ) -> Result<(), LedgerError> {
        self.ensure_admin(caller)?;
        self.fee_recipient = Some(recipient);
        info!(%recipient, "fee recipient updated");
        self.emit(LedgerEvent::FeeRecipientUpdated { recipient });
        Ok(())
    }

    /// Fund a season's pool. For each `(token, amount)` the fee goes to the
    /// fee recipient and the rest becomes claimable. All pairs succeed or
    /// none do.
    pub fn deposit_rewards(
        &mut self,
        depositor: &Address,
        season_id: u64,
        tokens: &[Address],
        amounts: &[U256],
    ) -> Result<Vec<FeeSplit>, LedgerError> {
        self.ensure_not_custody(depositor)?;
        if tokens.len() != amounts.len() {
            return Err(LedgerError::LengthMismatch {
                left: tokens.len(),
                right: amounts.len(),
            });
        }

        let mut splits = Vec::with_capacity(tokens.len());
        for (token, amount) in tokens.iter().zip(amounts) {
            let min_amount = self
                .whitelist
                .get(token)
                .copied()
                .ok_or(LedgerError::TokenNotWhitelisted { token: *token })?;
            if amount.is_zero() {
                return Err(LedgerError::ZeroAmount);
            }
            if *amount < min_amount {
                return Err(LedgerError::BelowMinimum {
                    token: *token,
                    amount: *amount,
                    min_amount,
                });
            }
            let split = split_fee(*amount, self.fee_rate)?;
            if !split.fee.is_zero() && self.fee_recipient.is_none() {
                return Err(LedgerError::FeeRecipientNotSet);
            }
            splits.push(split);
        }

        let checkpoint = self.bank.checkpoint();
        let mut journal = Journal::default();
        if let Err(err) = self.apply_deposits(depositor, season_id, tokens, &splits, &mut journal) {
            journal.revert(&mut self.seasons);
            self.bank.rollback(checkpoint);
            warn!(%depositor, season_id, error = %err, "deposit reverted");
            return Err(err);
        }

        for ((token, amount), split) in tokens.iter().zip(amounts).zip(&splits) {
            info!(season_id, %depositor, %token, %amount, fee = %split.fee, "rewards deposited");
            self.emit(LedgerEvent::RewardsDeposited {
                season_id,
                depositor: *depositor,
                token: *token,
                amount: *amount,
                fee: split.fee,
            });
        }
        Ok(splits)
    }

    fn apply_deposits(
        &mut self,
        depositor: &Address,
        season_id: u64,
        tokens: &[Address],
        splits: &[FeeSplit],
        journal: &mut Journal,
    ) -> Result<(), LedgerError> {
        for (token, split) in tokens.iter().zip(splits) {
            if let Some(recipient) = self.fee_recipient {
                self.bank.transfer(token, depositor, &recipient, split.fee)?;
            }
            self.bank.transfer(token, depositor, &self.custody, split.net)?;

            let season = self.seasons.entry(season_id).or_default();
            let balance = season.pool.entry(*token).or_default();
            *balance = balance.checked_add(split.net).ok_or(LedgerError::Overflow)?;
            journal.entries.push(JournalEntry::PoolCredited {
                season_id,
                token: *token,
                amount: split.net,
            });
        }
        Ok(())
    }

    /// Claim a single reward.
    pub fn claim(&mut self, claimant: &Address, request: &ClaimRequest) -> Result<(), LedgerError> {
        self.claim_rewards(claimant, std::slice::from_ref(request))
    }

    /// Claim a batch of rewards for `claimant`. Either every tuple is paid
    /// or the whole batch is rejected.
    pub fn claim_rewards(
        &mut self,
        claimant: &Address,
        claims: &[ClaimRequest],
    ) -> Result<(), LedgerError> {
        self.ensure_not_custody(claimant)?;
        if claims.is_empty() {
            return Err(LedgerError::EmptyClaim);
        }

        let leaves = self.check_claims(claimant, claims).map_err(|err| {
            debug!(%claimant, error = %err, "claim rejected");
            err
        })?;

        let checkpoint = self.bank.checkpoint();
        let mut journal = Journal::default();
        if let Err(err) = self.apply_claims(claimant, claims, &leaves, &mut journal) {
            journal.revert(&mut self.seasons);
            self.bank.rollback(checkpoint);
            warn!(%claimant, error = %err, "claim reverted");
            return Err(err);
        }

        for (request, leaf) in claims.iter().zip(leaves) {
            info!(
                season_id = request.season_id,
                %claimant,
                token = %request.token,
                amount = %request.points,
                "reward claimed"
            );
            self.emit(LedgerEvent::RewardClaimed {
                season_id: request.season_id,
                claimant: *claimant,
                token: request.token,
                amount: request.points,
                leaf,
            });
        }
        Ok(())
    }

    /// Validate a whole batch against current state without mutating it.
    /// Returns the reconstructed leaf of every tuple.
    fn check_claims(
        &self,
        claimant: &Address,
        claims: &[ClaimRequest],
    ) -> Result<Vec<Hash>, LedgerError> {
        let mut seen: BTreeSet<(u64, Hash)> = BTreeSet::new();
        let mut requested: BTreeMap<(u64, Address), U256> = BTreeMap::new();
        let mut leaves = Vec::with_capacity(claims.len());

        for request in claims {
            request.validate()?;
            let season_id = request.season_id;
            let leaf = request.leaf_for(claimant);

            let (season, root) = self
                .seasons
                .get(&season_id)
                .and_then(|s| s.root.map(|root| (s, root)))
                .ok_or(LedgerError::NoRootPublished { season_id })?;

            if season.claimed.contains(&leaf) || !seen.insert((season_id, leaf)) {
                return Err(LedgerError::AlreadyClaimed { season_id, leaf });
            }
            if !verify_merkle_proof(&leaf, &request.proof, &root) {
                return Err(LedgerError::InvalidProof { season_id });
            }

            let total = requested.entry((season_id, request.token)).or_default();
            let wanted = total
                .checked_add(request.points)
                .ok_or(LedgerError::Overflow)?;
            let available = season.pool_balance(&request.token);
            if available < wanted {
                return Err(LedgerError::InsufficientPool {
                    season_id,
                    token: request.token,
                    available: available.saturating_sub(*total),
                    requested: request.points,
                });
            }
            *total = wanted;
            leaves.push(leaf);
        }
        Ok(leaves)
    }

    fn apply_claims(
        &mut self,
        claimant: &Address,
        claims: &[ClaimRequest],
        leaves: &[Hash],
        journal: &mut Journal,
    ) -> Result<(), LedgerError> {
        for (request, leaf) in claims.iter().zip(leaves) {
            let season_id = request.season_id;
            let season = self
                .seasons
                .get_mut(&season_id)
                .ok_or(LedgerError::NoRootPublished { season_id })?;

            // effects
            season.claimed.insert(*leaf);
            journal.entries.push(JournalEntry::Claimed {
                season_id,
                leaf: *leaf,
            });
            let balance = season.pool.entry(request.token).or_default();
            *balance = balance.checked_sub(request.points).ok_or(LedgerError::InsufficientPool {
                season_id,
                token: request.token,
                available: *balance,
                requested: request.points,
            })?;
            journal.entries.push(JournalEntry::PoolDebited {
                season_id,
                token: request.token,
                amount: request.points,
            });

            // interaction
            self.bank
                .transfer(&request.token, &self.custody, claimant, request.points)?;
        }
        Ok(())
    }

    /// Sweep the remaining pool balances of `tokens` to the calling admin
    /// once [`UNUSED_REWARDS_DELAY`] has passed since the last root update.
    pub fn withdraw_unused_rewards(
        &mut self,
        caller: &Address,
        season_id: u64,
        tokens: &[Address],
        now: u64,
    ) -> Result<Vec<(Address, U256)>, LedgerError> {
        self.ensure_admin(caller)?;
        self.ensure_not_custody(caller)?;
        let season = self
            .seasons
            .get(&season_id)
            .ok_or(LedgerError::NoRootPublished { season_id })?;
        let updated_at = season
            .root_updated_at
            .ok_or(LedgerError::NoRootPublished { season_id })?;
        let unlock_at = updated_at.saturating_add(UNUSED_REWARDS_DELAY);
        if now < unlock_at {
            return Err(LedgerError::WithdrawalLocked {
                season_id,
                unlock_at,
            });
        }

        let mut seen = BTreeSet::new();
        let withdrawals: Vec<(Address, U256)> = tokens
            .iter()
            .filter(|t| seen.insert(**t))
            .map(|t| (*t, season.pool_balance(t)))
            .filter(|(_, amount)| !amount.is_zero())
            .collect();

        let checkpoint = self.bank.checkpoint();
        let mut journal = Journal::default();
        if let Err(err) = self.apply_withdrawals(caller, season_id, &withdrawals, &mut journal) {
            journal.revert(&mut self.seasons);
            self.bank.rollback(checkpoint);
            return Err(err);
        }

        for (token, amount) in &withdrawals {
            info!(season_id, %token, %amount, to = %caller, "unused rewards withdrawn");
            self.emit(LedgerEvent::UnusedRewardsWithdrawn {
                season_id,
                token: *token,
                amount: *amount,
                to: *caller,
            });
        }
        Ok(withdrawals)
    }

    fn apply_withdrawals(
        &mut self,
        to: &Address,
        season_id: u64,
        withdrawals: &[(Address, U256)],
        journal: &mut Journal,
    ) -> Result<(), LedgerError> {
        for (token, amount) in withdrawals {
            let season = self.seasons.entry(season_id).or_default();
            season.pool.insert(*token, U256::zero());
            journal.entries.push(JournalEntry::PoolDebited {
                season_id,
                token: *token,
                amount: *amount,
            });
            self.bank.transfer(token, &self.custody, to, *amount)?;
        }
        Ok(())
    }

    pub fn get_merkle_root(&self, season_id: u64) -> Option<Hash> {
        self.seasons.get(&season_id).and_then(|s| s.root)
    }

    /// Number of times the season's root has been published (0 = never).
    pub fn root_version(&self, season_id: u64) -> u64 {
        self.seasons
            .get(&season_id)
            .map(|s| s.root_version)
            .unwrap_or(0)
    }

    pub fn is_token_whitelisted(&self, token: &Address) -> bool {
        self.whitelist.contains_key(token)
    }

    /// Minimum deposit for `token`; zero when the token is not whitelisted.
    pub fn get_min_amount_for_token(&self, token: &Address) -> U256 {
        self.whitelist.get(token).copied().unwrap_or_default()
    }

    pub fn pool_balance(&self, season_id: u64, token: &Address) -> U256 {
        self.seasons
            .get(&season_id)
            .map(|s| s.pool_balance(token))
            .unwrap_or_default()
    }

    pub fn is_claimed(&self, season_id: u64, leaf: &Hash) -> bool {
        self.seasons
            .get(&season_id)
            .is_some_and(|s| s.claimed.contains(leaf))
    }

    pub fn reward_fee(&self) -> U256 {
        self.fee_rate
    }

    pub fn fee_recipient(&self) -> Option<Address> {
        self.fee_recipient
    }

    pub fn is_admin(&self, account: &Address) -> bool {
        self.admins.contains(account)
    }

    pub fn custody(&self) -> Address {
        self.custody
    }

    pub fn events(&self) -> &[LedgerEvent] {
        &self.events
    }

    pub fn bank(&self) -> &B {
        &self.bank
    }

    /// Direct access to the token bank, for funding depositors.
    pub fn bank_mut(&mut self) -> &mut B {
        &mut self.bank
    }
}
