//! JaxMine Mining Coordination
//!
//! This crate holds the coordinator that merges three template streams
//! (the beacon chain, a dynamic set of shard chains and the Bitcoin
//! carrier) into one mining job:
//! - template decoding into block candidates
//! - merged-mining proof maintenance over the sparse shard tree
//! - the coinbase skeleton contract with the external hasher
//! - solution checking and block submission routing
//! - the polling loops that keep templates fresh

use std::time::Duration;

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use jaxmine_core::{AddressError, Block, DecodeError, PayoutAddress, TreeError};

pub mod decoding;
pub mod job;
pub mod poller;
pub mod solution;

pub use job::Job;
pub use poller::Poller;
pub use solution::{SolutionOutcome, SolutionReport};

/// Shard chain identifier. The upstream assigns ids from 1; id 0 is
/// reserved for the beacon chain.
pub type ShardId = u32;

/// The reserved beacon id.
pub const BEACON_CHAIN_ID: ShardId = 0;

/// Coordinator error types
#[derive(Debug, Error)]
pub enum JobError {
    /// A template or wire payload failed to decode
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// A shard template arrived before any beacon template
    #[error("shard template received before any beacon template")]
    MissingBeaconContext,

    /// A coinbase skeleton was requested while no beacon is installed
    #[error("no beacon template installed")]
    NoBeacon,

    /// The shard id does not fit the configured sparse-tree capacity
    #[error("shard id {shard_id} outside tree capacity {capacity}")]
    OutOfRange { shard_id: ShardId, capacity: u32 },
}

impl From<TreeError> for JobError {
    fn from(error: TreeError) -> Self {
        match error {
            TreeError::OutOfRange { slot, capacity } => JobError::OutOfRange {
                // slots are 0-indexed, shard ids are 1-indexed
                shard_id: slot + 1,
                capacity,
            },
            TreeError::BadCoding(message) => {
                JobError::Decode(DecodeError::Malformed(message.to_string()))
            }
        }
    }
}

/// Static coordinator configuration, built once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Payout address for the Bitcoin-side coinbase
    pub btc_mining_address: PayoutAddress,

    /// Payout address for beacon and shard coinbases
    pub jax_mining_address: PayoutAddress,

    /// Claim the reward on the Bitcoin side and burn the JAX side.
    /// The flip side applies to shard coinbases: a reward is never
    /// claimable on both sides of the merge.
    pub burn_btc_reward: bool,

    /// Capacity of the sparse merge-mining tree
    pub shards_count: u32,

    /// Enforce the hash-sorting rule when routing solutions
    pub hash_sorting: bool,

    /// Outer shard-set reconcile interval
    pub poll_interval: Duration,

    /// Backoff after a failed template fetch
    pub retry_interval: Duration,
}

impl Config {
    /// Decode the payout addresses and assemble a configuration with the
    /// default intervals. Address errors here are fatal to the process.
    pub fn new(
        btc_address: &str,
        jax_address: &str,
        burn_btc_reward: bool,
        shards_count: u32,
    ) -> Result<Self, AddressError> {
        Ok(Config {
            btc_mining_address: PayoutAddress::from_base58(btc_address)?,
            jax_mining_address: PayoutAddress::from_base58(jax_address)?,
            burn_btc_reward,
            shards_count,
            hash_sorting: false,
            poll_interval: Duration::from_secs(600),
            retry_interval: Duration::from_secs(1),
        })
    }
}

/// One per-chain mining task: the block candidate under construction plus
/// the numbers the solution walk needs.
#[derive(Debug, Clone)]
pub struct Task {
    pub shard_id: ShardId,
    pub block: Block,
    pub height: i64,
    pub target: BigUint,
}

/// The payout parameters the external hasher last asked a skeleton for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinbaseData {
    pub reward: i64,
    pub fee: i64,
    pub height: u32,
}

/// The two halves of a split coinbase; the hasher rolls the 8-byte
/// extra nonce between them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinbaseParts {
    pub part1: Vec<u8>,
    pub part2: Vec<u8>,
}
