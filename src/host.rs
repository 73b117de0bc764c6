//! Host ledger collaborator traits
//!
//! The bridge core never talks to a chain or a token contract directly; the
//! host supplies block context and stake accounting through these seams. The
//! host's total transaction ordering is also what serializes calls into the
//! lifecycle manager.

use alloy_primitives::{Address, B256};

use crate::error::Result;

/// How far back a pinned block may lie. Mirrors the host chain's bounded
/// block-hash retention.
pub const BLOCK_HASH_WINDOW: u64 = 256;

/// Read-only view of the host chain's block context.
pub trait BlockOracle {
    /// The current block number.
    fn block_number(&self) -> u64;

    /// Hash of `number`, if still retrievable (bounded lookback).
    fn block_hash(&self, number: u64) -> Option<B256>;
}

/// Stake accounting collaborator.
///
/// Authorization of attestation signers derives from this ledger's live
/// stake, and dispute settlement is delegated to it; the bridge core only
/// decides who gets slashed or rewarded and by how much.
pub trait StakingLedger {
    /// Slashable protocol stake held by an attestation signer.
    fn slashable_stake(&self, signer: Address) -> u128;

    /// External stake `staker` can commit in `token`.
    fn external_stake(&self, staker: Address, token: Address) -> u128;

    /// Slash `amount` from `identity`.
    fn slash(&mut self, identity: Address, amount: u128) -> Result<()>;

    /// Credit `amount` to `identity` out of slashed funds.
    fn reward(&mut self, identity: Address, amount: u128) -> Result<()>;
}
