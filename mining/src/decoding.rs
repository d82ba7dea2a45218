//! Template decoding: turning upstream template responses into per-chain
//! mining tasks.

use chrono::Utc;
use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};

use jaxmine_core::codec::{
    compact_to_target, parse_chain_weight, parse_hash_display, parse_hex, parse_target_hex,
    parse_u32_hex,
};
use jaxmine_core::{
    merkle_root, BeaconHeader, Block, BlockHeader, BtcAux, CodingProof, CoinbaseAux,
    CoinbaseBuilder, DecodeError, Hash, ShardHeader, Transaction, ZERO_HASH,
};
use jaxmine_rpc::{BeaconTemplate, ShardTemplate, TemplateTx};

use crate::{Config, JobError, ShardId, Task, BEACON_CHAIN_ID};

/// Templates dated further in the future than this are discarded.
const MAX_TIME_AHEAD_SECS: i64 = 2 * 60 * 60;

/// A decoded beacon template: the task plus the two values the coordinator
/// snapshots for shard headers and the Bitcoin coinbase.
pub(crate) struct DecodedBeacon {
    pub task: Task,
    pub commitment: Hash,
    pub coinbase_aux: CoinbaseAux,
}

struct TemplateValues {
    mmr_root: Hash,
    prev_hash: Hash,
    bits: u32,
    target: BigUint,
    chain_weight: BigUint,
}

fn decode_template_values(
    mmr_root: &str,
    prev_hash: &str,
    bits: &str,
    target: &str,
    chain_weight: Option<&str>,
) -> Result<TemplateValues, DecodeError> {
    Ok(TemplateValues {
        mmr_root: parse_hash_display(mmr_root)?,
        prev_hash: parse_hash_display(prev_hash)?,
        bits: parse_u32_hex(bits)?,
        target: parse_target_hex(target)?,
        chain_weight: match chain_weight {
            Some(value) => parse_chain_weight(value)?,
            None => BigUint::zero(),
        },
    })
}

fn decode_height(height: i64) -> Result<u32, DecodeError> {
    u32::try_from(height).map_err(|_| DecodeError::BadInt(format!("template height {height}")))
}

fn decode_timestamp(cur_time: i64) -> Result<u32, DecodeError> {
    if cur_time > Utc::now().timestamp() + MAX_TIME_AHEAD_SECS {
        return Err(DecodeError::BadInt(format!(
            "template time {cur_time} too far in the future"
        )));
    }
    u32::try_from(cur_time).map_err(|_| DecodeError::BadInt(format!("template time {cur_time}")))
}

fn decode_tx_hex(data: &str) -> Result<Transaction, DecodeError> {
    Transaction::deserialize(&parse_hex(data)?)
}

/// Decode the coinbase plus every regular template transaction, coinbase
/// first.
fn decode_transactions(
    coinbase: Transaction,
    template_txs: &[TemplateTx],
) -> Result<Vec<Transaction>, DecodeError> {
    let mut transactions = Vec::with_capacity(1 + template_txs.len());
    transactions.push(coinbase);
    for tx in template_txs {
        transactions.push(decode_tx_hex(&tx.data)?);
    }
    Ok(transactions)
}

fn parse_btc_aux(data: &str) -> Result<BtcAux, DecodeError> {
    BtcAux::deserialize(&parse_hex(data)?)
}

/// Shard block subsidy derived from the shard difficulty and the beacon's
/// reward coefficient `k` (16.16 fixed point), spread over the shard set.
pub fn shard_block_subsidy(shards_count: u32, bits: u32, k: u32) -> i64 {
    let target = compact_to_target(bits);
    if target.is_zero() {
        return 0;
    }
    let pow_limit = BigUint::from_bytes_be(&[0xff; 32]);
    let difficulty = pow_limit / target;
    let scaled = (difficulty * BigUint::from(k)) >> 16;
    let per_shard: BigUint = scaled / BigUint::from(shards_count.max(1));
    per_shard.to_i64().unwrap_or(i64::MAX).max(1)
}

pub(crate) fn decode_beacon_template(
    config: &Config,
    template: &BeaconTemplate,
) -> Result<DecodedBeacon, JobError> {
    let values = decode_template_values(
        &template.prev_blocks_mmr_root,
        &template.previous_hash,
        &template.bits,
        &template.target,
        template.chain_weight.as_deref(),
    )?;
    let height = decode_height(template.height)?;
    let timestamp = decode_timestamp(template.cur_time)?;

    // the template-supplied coinbase fixes the reward; the transaction
    // itself is rebuilt for the configured payout address
    let supplied = template
        .coinbase_txn
        .as_ref()
        .ok_or_else(|| DecodeError::Malformed("template carries no coinbasetxn".to_string()))?;
    let supplied_tx = decode_tx_hex(&supplied.data)?;
    if supplied_tx.outputs.len() < 3 {
        return Err(DecodeError::Malformed(format!(
            "template coinbase has {} outputs, want 3",
            supplied_tx.outputs.len()
        ))
        .into());
    }
    let reward = supplied_tx.outputs[1].value + supplied_tx.outputs[2].value;

    let builder = CoinbaseBuilder::new(&config.jax_mining_address, config.burn_btc_reward);
    let coinbase = builder.build_node(reward, 0, height, BEACON_CHAIN_ID);
    let transactions = decode_transactions(coinbase, &template.transactions)?;
    let coinbase_aux = CoinbaseAux {
        tx: transactions[0].clone(),
        tx_merkle: transactions.iter().map(Transaction::txid).collect(),
    };

    let header = BeaconHeader {
        version: template.version,
        height: template.height,
        prev_mmr_root: values.mmr_root,
        prev_hash: values.prev_hash,
        tx_merkle_root: merkle_root(&transactions),
        timestamp,
        bits: values.bits,
        nonce: 0,
        k: template.k,
        vote_k: template.vote_k,
        shards: template.shards,
        chain_weight: values.chain_weight,
        merge_mining_root: ZERO_HASH,
        merge_mining_number: 0,
        coding_proof: CodingProof::default(),
        btc_aux: parse_btc_aux(&template.btc_aux)?,
    };
    let commitment = header.exclusive_hash();

    Ok(DecodedBeacon {
        task: Task {
            shard_id: BEACON_CHAIN_ID,
            block: Block::new(BlockHeader::Beacon(header), transactions),
            height: template.height,
            target: values.target,
        },
        commitment,
        coinbase_aux,
    })
}

pub(crate) fn decode_shard_template(
    config: &Config,
    beacon_header: &BeaconHeader,
    beacon_coinbase_aux: &CoinbaseAux,
    template: &ShardTemplate,
    shard_id: ShardId,
) -> Result<Task, JobError> {
    let values = decode_template_values(
        &template.prev_blocks_mmr_root,
        &template.previous_hash,
        &template.bits,
        &template.target,
        template.chain_weight.as_deref(),
    )?;
    let height = decode_height(template.height)?;
    let timestamp = decode_timestamp(template.cur_time)?;

    let reward = shard_block_subsidy(config.shards_count, values.bits, beacon_header.k);
    // the side not claimed by the Bitcoin coinbase burns here
    let burn = !config.burn_btc_reward;
    let builder = CoinbaseBuilder::new(&config.jax_mining_address, burn);
    let coinbase = builder.build_node(reward, 0, height, shard_id);
    let transactions = decode_transactions(coinbase, &template.transactions)?;

    let header = ShardHeader {
        height: template.height,
        prev_mmr_root: values.mmr_root,
        prev_hash: values.prev_hash,
        tx_merkle_root: merkle_root(&transactions),
        timestamp,
        bits: values.bits,
        chain_weight: values.chain_weight,
        merge_mining_number: 0,
        beacon_header: beacon_header.clone(),
        merge_mining_proof: Vec::new(),
        coding_proof: CodingProof::default(),
        beacon_coinbase_aux: beacon_coinbase_aux.clone(),
    };

    Ok(Task {
        shard_id,
        block: Block::new(BlockHeader::Shard(header), transactions),
        height: template.height,
        target: values.target,
    })
}
