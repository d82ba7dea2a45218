//! Solution checking: validating a solved Bitcoin header against every
//! chain target and routing the resulting block submissions upstream.

use log::{error, info};
use num_bigint::BigUint;

use jaxmine_core::codec::hash_to_big;
use jaxmine_core::{
    Block, BlockHeader, BtcAux, BtcHeader, CoinbaseAux, Hash, Transaction,
};

use crate::job::Job;
use crate::{JobError, ShardId, BEACON_CHAIN_ID};

/// One block submission produced by a solution.
#[derive(Debug)]
pub struct SolutionOutcome {
    pub shard_id: ShardId,
    /// Claimed value: reward plus fee outputs of the coinbase
    pub amount: i64,
    pub height: i64,
    pub block_hash: Hash,
    pub result: Result<(), jaxmine_rpc::RpcError>,
}

impl SolutionOutcome {
    pub fn is_accepted(&self) -> bool {
        self.result.is_ok()
    }
}

/// Per-submission outcomes of one solution check. A failed submission
/// never aborts the rest of the batch.
#[derive(Debug, Default)]
pub struct SolutionReport {
    pub outcomes: Vec<SolutionOutcome>,
}

impl SolutionReport {
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn accepted(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_accepted()).count()
    }

    pub fn rejected(&self) -> usize {
        self.outcomes.len() - self.accepted()
    }
}

/// The hash-sorting rule: a solution may only claim the chain whose slot
/// its hash selects.
fn hash_sorting_rule(hash: &BigUint, slot_count: u32, id: ShardId) -> bool {
    if slot_count == 0 {
        return true;
    }
    let slots = BigUint::from(slot_count);
    hash % &slots == BigUint::from(id % slot_count)
}

impl Job {
    /// Check a solved Bitcoin header and its coinbase against the beacon
    /// and every shard target, then submit each qualifying block.
    ///
    /// The walk takes the read lock only while it assembles the candidate
    /// blocks, so the snapshot is coherent; submissions run after release.
    pub async fn check_solution(
        &self,
        btc_header: &[u8],
        coinbase_tx: &[u8],
    ) -> Result<SolutionReport, JobError> {
        let header = BtcHeader::deserialize(btc_header)?;
        let coinbase = Transaction::deserialize(coinbase_tx)?;

        let submissions = self.collect_submissions(header, coinbase)?;

        let mut report = SolutionReport::default();
        for (shard_id, height, block) in submissions {
            if !block.merkle_consistent() {
                error!(
                    "refusing to submit block with stale merkle root (shard_id={shard_id})"
                );
                continue;
            }
            let raw = block.serialize();
            let result = self.rpc.submit_block(shard_id, hex::encode(raw)).await;
            match &result {
                Ok(()) => info!(
                    "submitted block: shard_id={} height={} hash={}",
                    shard_id,
                    height,
                    hex::encode(block.block_hash())
                ),
                Err(e) => error!("can't submit block (shard_id={shard_id}): {e}"),
            }

            let amount = block
                .transactions
                .first()
                .map(|tx| {
                    tx.outputs.get(1).map(|o| o.value).unwrap_or(0)
                        + tx.outputs.get(2).map(|o| o.value).unwrap_or(0)
                })
                .unwrap_or(0);
            report.outcomes.push(SolutionOutcome {
                shard_id,
                amount,
                height,
                block_hash: block.block_hash(),
                result,
            });
        }
        Ok(report)
    }

    /// The locked part of the solution walk: build the list of blocks to
    /// submit from a coherent snapshot of the job state.
    fn collect_submissions(
        &self,
        header: BtcHeader,
        coinbase: Transaction,
    ) -> Result<Vec<(ShardId, i64, Block)>, JobError> {
        let state = self.state.read().unwrap();
        let beacon = state.beacon.as_ref().ok_or(JobError::NoBeacon)?;

        // the beacon block adopts the solved carrier; its proof-of-work
        // hash is what every target comparison runs against
        let mut beacon_header = beacon
            .block
            .header
            .beacon()
            .ok_or(JobError::NoBeacon)?
            .clone();
        beacon_header.btc_aux = BtcAux {
            coinbase_aux: CoinbaseAux::from_coinbase(coinbase),
            header,
        };
        let hash = hash_to_big(&beacon_header.pow_hash());
        let slot_count = self.config.shards_count;

        let mut submissions = Vec::new();
        if hash <= beacon.target
            && (!self.config.hash_sorting
                || hash_sorting_rule(&hash, slot_count, BEACON_CHAIN_ID))
        {
            submissions.push((
                BEACON_CHAIN_ID,
                beacon.height,
                Block::new(
                    BlockHeader::Beacon(beacon_header.clone()),
                    beacon.block.transactions.clone(),
                ),
            ));
        }

        for id in &state.shards_sorted {
            let task = match state.shards.get(id) {
                Some(task) => task,
                None => continue,
            };
            if hash > task.target {
                // every later target is easier but loses the ordering race
                break;
            }
            if self.config.hash_sorting && !hash_sorting_rule(&hash, slot_count, *id) {
                continue;
            }
            let mut shard_header = match task.block.header.shard() {
                Some(header) => header.clone(),
                None => continue,
            };
            // the solved block carries the beacon header with the carrier
            shard_header.beacon_header = beacon_header.clone();
            submissions.push((
                *id,
                task.height,
                Block::new(
                    BlockHeader::Shard(shard_header),
                    task.block.transactions.clone(),
                ),
            ));
        }
        Ok(submissions)
    }
}
