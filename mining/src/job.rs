//! The job coordinator.
//!
//! `Job` owns the current beacon/shard tasks behind one read/write lock.
//! Template processing, coinbase construction and the merged-mining proof
//! refresh run under the write lock; target queries and the solution walk
//! take the read lock. The lock is never held across channel sends or
//! upstream calls.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use log::warn;
use num_bigint::BigUint;
use tokio::sync::mpsc;

use jaxmine_core::{
    split_coinbase, CoinbaseAux, CoinbaseBuilder, Hash, SparseMerkleTree, ZERO_HASH,
};
use jaxmine_rpc::{BeaconTemplate, RpcApi, ShardTemplate};

use crate::decoding;
use crate::{CoinbaseData, CoinbaseParts, Config, JobError, ShardId, Task, BEACON_CHAIN_ID};

/// Capacity of the coinbase skeleton channel. The consumer is the single
/// external-hasher bridge; a small buffer absorbs template bursts.
const COINBASE_CHANNEL_CAPACITY: usize = 8;

pub(crate) struct JobState {
    pub(crate) beacon: Option<Task>,
    /// Exclusive hash of the current beacon header, the 32-byte
    /// commitment the Bitcoin coinbase carries.
    pub(crate) beacon_commitment: Hash,
    pub(crate) shards: HashMap<ShardId, Task>,
    /// Shard ids ordered by ascending target, hardest first; ties break
    /// on the id. Rebuilt from `shards` on every update.
    pub(crate) shards_sorted: Vec<ShardId>,
    pub(crate) last_beacon_coinbase_aux: Option<CoinbaseAux>,
    pub(crate) last_coinbase_data: Option<CoinbaseData>,
}

impl JobState {
    fn new() -> Self {
        JobState {
            beacon: None,
            beacon_commitment: ZERO_HASH,
            shards: HashMap::new(),
            shards_sorted: Vec::new(),
            last_beacon_coinbase_aux: None,
            last_coinbase_data: None,
        }
    }

    fn rebuild_sorted(&mut self) {
        let shards = &self.shards;
        let mut ids: Vec<ShardId> = shards.keys().copied().collect();
        ids.sort_by(|a, b| shards[a].target.cmp(&shards[b].target).then(a.cmp(b)));
        self.shards_sorted = ids;
    }

    /// Rebuild the sparse tree from the current shard set and stamp the
    /// root, the coding proof and the per-slot paths onto every header.
    /// An empty shard set stamps the empty-tree state, so a beacon never
    /// commits to shards that are gone.
    fn update_merged_mining_proof(&mut self, config: &Config) -> Result<(), JobError> {
        let beacon = match self.beacon.as_mut() {
            Some(task) => task,
            None => return Ok(()),
        };

        let mut tree = SparseMerkleTree::new(config.shards_count);
        for (id, task) in &self.shards {
            // shard ids are 1-indexed, tree slots are 0-indexed
            tree.set(id - 1, task.block.header.exclusive_hash())?;
        }

        let root = tree.root();
        let (coding, coding_bits) = tree.catalan_coding();
        let orange_leaves = tree.orange_leaves();
        let merge_mining_number = self.shards.len() as u32;

        let beacon_header = match beacon.block.header.beacon_mut() {
            Some(header) => header,
            None => return Ok(()),
        };
        beacon_header.merge_mining_root = root;
        beacon_header.merge_mining_number = merge_mining_number;
        beacon_header.coding_proof.orange_leaves = orange_leaves;
        beacon_header.coding_proof.coding = coding;
        beacon_header.coding_proof.coding_bits = coding_bits;
        let stamped_beacon = beacon_header.clone();

        for (id, task) in self.shards.iter_mut() {
            let path = tree.proof(id - 1)?;
            if let Some(header) = task.block.header.shard_mut() {
                header.merge_mining_proof = path;
                header.merge_mining_number = merge_mining_number;
                header.coding_proof = stamped_beacon.coding_proof.clone();
                // solved shard blocks must carry the final beacon header
                header.beacon_header = stamped_beacon.clone();
            }
        }
        Ok(())
    }
}

/// The merged-mining job coordinator.
pub struct Job {
    pub(crate) config: Config,
    pub(crate) rpc: Arc<dyn RpcApi>,
    pub(crate) state: RwLock<JobState>,
    coinbase_tx: mpsc::Sender<CoinbaseParts>,
    coinbase_rx: Mutex<Option<mpsc::Receiver<CoinbaseParts>>>,
}

impl Job {
    pub fn new(config: Config, rpc: Arc<dyn RpcApi>) -> Self {
        let (coinbase_tx, coinbase_rx) = mpsc::channel(COINBASE_CHANNEL_CAPACITY);
        Job {
            config,
            rpc,
            state: RwLock::new(JobState::new()),
            coinbase_tx,
            coinbase_rx: Mutex::new(Some(coinbase_rx)),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Hand out the single consumer end of the coinbase channel. The
    /// external-hasher bridge takes it once at startup.
    pub fn take_coinbase_receiver(&self) -> Option<mpsc::Receiver<CoinbaseParts>> {
        self.coinbase_rx.lock().unwrap().take()
    }

    /// Install a fresh beacon template: replace the beacon task, snapshot
    /// its coinbase context, refresh the merged-mining proof and, when a
    /// skeleton was already handed out, re-emit it against the new beacon
    /// commitment.
    pub fn process_beacon_template(&self, template: &BeaconTemplate) -> Result<(), JobError> {
        let redo = {
            let mut state = self.state.write().unwrap();
            let decoded = decoding::decode_beacon_template(&self.config, template)?;
            state.beacon_commitment = decoded.commitment;
            state.last_beacon_coinbase_aux = Some(decoded.coinbase_aux);
            state.beacon = Some(decoded.task);
            state.update_merged_mining_proof(&self.config)?;
            state.last_coinbase_data
        };

        if let Some(data) = redo {
            let parts = self.get_bitcoin_coinbase(data)?;
            let sender = self.coinbase_tx.clone();
            // detached send: the job lock is already released and a slow
            // consumer must not stall template processing
            tokio::spawn(async move {
                if sender.send(parts).await.is_err() {
                    warn!("coinbase channel closed, dropping skeleton");
                }
            });
        }
        Ok(())
    }

    /// Install or replace one shard's template.
    pub fn process_shard_template(
        &self,
        template: &ShardTemplate,
        shard_id: ShardId,
    ) -> Result<(), JobError> {
        if shard_id == BEACON_CHAIN_ID || shard_id > self.config.shards_count {
            return Err(JobError::OutOfRange {
                shard_id,
                capacity: self.config.shards_count,
            });
        }

        let mut state = self.state.write().unwrap();
        let (beacon_header, beacon_aux) =
            match (&state.beacon, &state.last_beacon_coinbase_aux) {
                (Some(task), Some(aux)) => match task.block.header.beacon() {
                    Some(header) => (header.clone(), aux.clone()),
                    None => return Err(JobError::MissingBeaconContext),
                },
                _ => return Err(JobError::MissingBeaconContext),
            };

        let task = decoding::decode_shard_template(
            &self.config,
            &beacon_header,
            &beacon_aux,
            template,
            shard_id,
        )?;
        state.shards.insert(shard_id, task);
        state.rebuild_sorted();
        state.update_merged_mining_proof(&self.config)
    }

    /// Drop a shard the upstream no longer mines.
    pub fn remove_shard(&self, shard_id: ShardId) {
        let mut state = self.state.write().unwrap();
        if state.shards.remove(&shard_id).is_some() {
            state.rebuild_sorted();
            if let Err(error) = state.update_merged_mining_proof(&self.config) {
                warn!("can't refresh merged-mining proof: {error}");
            }
        }
    }

    /// Build the split Bitcoin coinbase for the external hasher, carrying
    /// the current beacon commitment in its signature script.
    pub fn get_bitcoin_coinbase(&self, data: CoinbaseData) -> Result<CoinbaseParts, JobError> {
        let mut state = self.state.write().unwrap();
        if state.beacon.is_none() {
            return Err(JobError::NoBeacon);
        }
        let commitment = state.beacon_commitment;

        let builder =
            CoinbaseBuilder::new(&self.config.btc_mining_address, self.config.burn_btc_reward);
        let tx = builder.build_bitcoin(data.reward, data.fee, data.height, &commitment);
        let (part1, part2) = split_coinbase(&tx)?;

        state.last_coinbase_data = Some(data);
        Ok(CoinbaseParts { part1, part2 })
    }

    /// The hardest target currently mined: the minimum over the beacon
    /// and every shard. Absent while no beacon is installed.
    pub fn get_min_target(&self) -> Option<BigUint> {
        let state = self.state.read().unwrap();
        let beacon = state.beacon.as_ref()?;
        let mut min = beacon.target.clone();
        if let Some(id) = state.shards_sorted.first() {
            if let Some(task) = state.shards.get(id) {
                if task.target < min {
                    min = task.target.clone();
                }
            }
        }
        Some(min)
    }
}
