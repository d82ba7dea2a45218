//! Coinbase construction and splitting.
//!
//! Every JAX coinbase has the same three-output shape: a null-data marker,
//! the reward output and the network-fee output, where the two value
//! outputs either pay the configured address or burn. Two signature-script
//! forms exist: the Bitcoin-side form that embeds the 32-byte beacon
//! commitment and an 8-byte extra-nonce slot for the external hasher, and
//! the node-side form used inside beacon and shard block candidates.

use crate::address::PayoutAddress;
use crate::codec::DecodeError;
use crate::transaction::{OutPoint, Transaction, TxIn, TxOut};
use crate::Hash;

/// Null-data payload of output #0.
pub const COINBASE_MARKER: &[u8; 21] = b" https://jax.network ";

/// Signature-script tag of coinbases built for the external Bitcoin hasher.
pub const BTC_SIG_TAG: &[u8] = b"/P2SH/jaxnet/";

/// Signature-script tag of beacon/shard block coinbases.
pub const NODE_SIG_TAG: &[u8] = b"/P2SH/jaxnetd/";

/// The deterministic burn script.
pub const BURN_SCRIPT: [u8; 1] = [0x51];

/// Width of the extra-nonce slot the external hasher rolls.
pub const EXTRA_NONCE_LEN: usize = 8;

/// Builds the JAX multi-output coinbase for one payout address.
pub struct CoinbaseBuilder {
    payout_script: Vec<u8>,
    burn: bool,
}

impl CoinbaseBuilder {
    pub fn new(address: &PayoutAddress, burn: bool) -> Self {
        CoinbaseBuilder {
            payout_script: address.p2pkh_script(),
            burn,
        }
    }

    fn value_script(&self) -> Vec<u8> {
        if self.burn {
            BURN_SCRIPT.to_vec()
        } else {
            self.payout_script.clone()
        }
    }

    fn build_outputs(&self, reward: i64, fee: i64) -> Vec<TxOut> {
        let mut marker = Vec::with_capacity(2 + COINBASE_MARKER.len());
        marker.push(0x6a); // OP_RETURN
        marker.push(COINBASE_MARKER.len() as u8);
        marker.extend_from_slice(COINBASE_MARKER);

        vec![
            TxOut {
                value: 0,
                pk_script: marker,
            },
            TxOut {
                value: reward,
                pk_script: self.value_script(),
            },
            TxOut {
                value: fee,
                pk_script: self.value_script(),
            },
        ]
    }

    fn build(&self, signature_script: Vec<u8>, reward: i64, fee: i64) -> Transaction {
        Transaction {
            version: 1,
            inputs: vec![TxIn {
                previous_out_point: OutPoint::null(),
                signature_script,
                sequence: u32::MAX,
            }],
            outputs: self.build_outputs(reward, fee),
            lock_time: 0,
        }
    }

    /// The coinbase handed to the external Bitcoin hasher. Its signature
    /// script is `height ‖ extra-nonce slot ‖ beacon commitment ‖ tag`,
    /// with the extra nonce zeroed; the hasher rolls it through the
    /// [`split_coinbase`] contract.
    pub fn build_bitcoin(
        &self,
        reward: i64,
        fee: i64,
        height: u32,
        beacon_commitment: &Hash,
    ) -> Transaction {
        let mut script = script_num(height as i64);
        script.push(EXTRA_NONCE_LEN as u8);
        script.extend_from_slice(&0u64.to_le_bytes());
        script.push(32);
        script.extend_from_slice(beacon_commitment);
        script.push(BTC_SIG_TAG.len() as u8);
        script.extend_from_slice(BTC_SIG_TAG);
        self.build(script, reward, fee)
    }

    /// The coinbase placed inside beacon and shard block candidates:
    /// `height ‖ shard id ‖ extra nonce ‖ tag`, all script-number pushes.
    pub fn build_node(&self, reward: i64, fee: i64, height: u32, shard_id: u32) -> Transaction {
        let mut script = script_num(height as i64);
        script.extend_from_slice(&script_num(shard_id as i64));
        script.extend_from_slice(&script_num(0));
        script.push(NODE_SIG_TAG.len() as u8);
        script.extend_from_slice(NODE_SIG_TAG);
        self.build(script, reward, fee)
    }
}

/// Minimal script-number push (BIP-34 style): `OP_0` for zero, the
/// small-int opcodes for 1..=16, otherwise a length-prefixed
/// little-endian integer padded to keep the sign bit clear.
pub fn script_num(value: i64) -> Vec<u8> {
    debug_assert!(value >= 0, "script_num only encodes non-negative values");
    if value == 0 {
        return vec![0x00];
    }
    if (1..=16).contains(&value) {
        return vec![0x50 + value as u8];
    }
    let mut bytes = Vec::new();
    let mut rest = value;
    while rest > 0 {
        bytes.push((rest & 0xff) as u8);
        rest >>= 8;
    }
    if bytes[bytes.len() - 1] & 0x80 != 0 {
        bytes.push(0x00);
    }
    let mut out = Vec::with_capacity(bytes.len() + 1);
    out.push(bytes.len() as u8);
    out.extend_from_slice(&bytes);
    out
}

/// Split a serialized Bitcoin-form coinbase into the two byte slices the
/// external hasher consumes. Reassembly is
/// `part1 ‖ extra-nonce (8 bytes LE) ‖ part2`, bit-exact.
///
/// Byte 42 is the BIP-34 height length byte; values above 0x0f mean the
/// height was packed as a single small-int opcode and adds no padding.
pub fn split_coinbase(tx: &Transaction) -> Result<(Vec<u8>, Vec<u8>), DecodeError> {
    let raw = tx.serialize();

    let height_len_idx = 42;
    if raw.len() <= height_len_idx {
        return Err(DecodeError::Malformed(format!(
            "coinbase too short to split: {} bytes",
            raw.len()
        )));
    }
    let mut height_len = raw[height_len_idx] as usize;
    if height_len > 0xf {
        height_len = 0;
    }

    let extra_nonce_idx = height_len_idx + 1 + height_len;
    if extra_nonce_idx >= raw.len() {
        return Err(DecodeError::Truncated {
            needed: extra_nonce_idx - raw.len() + 1,
        });
    }
    let extra_nonce_len = raw[extra_nonce_idx] as usize;
    let tail_start = extra_nonce_idx + 1 + extra_nonce_len;
    if tail_start > raw.len() {
        return Err(DecodeError::Truncated {
            needed: tail_start - raw.len(),
        });
    }

    let mut part1 = raw[..extra_nonce_idx].to_vec();
    part1.push(EXTRA_NONCE_LEN as u8);
    let part2 = raw[tail_start..].to_vec();
    Ok((part1, part2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::Transaction;
    use crate::ZERO_HASH;

    fn btc_address() -> PayoutAddress {
        PayoutAddress::from_base58("mzDGR33maDBujpqjkvxVzY2ssYDcQG51p3").unwrap()
    }

    fn jax_address() -> PayoutAddress {
        PayoutAddress::from_base58("mxQsksaTJb11i7vSxAUL6VBjoQnhP3bfFz").unwrap()
    }

    #[test]
    fn test_script_num() {
        assert_eq!(script_num(0), vec![0x00]);
        assert_eq!(script_num(1), vec![0x51]);
        assert_eq!(script_num(16), vec![0x60]);
        assert_eq!(script_num(17), vec![0x01, 0x11]);
        assert_eq!(script_num(127), vec![0x01, 0x7f]);
        assert_eq!(script_num(128), vec![0x02, 0x80, 0x00]);
        assert_eq!(script_num(703_687), vec![0x03, 0xc7, 0xbc, 0x0a]);
    }

    #[test]
    fn test_split_matches_reference_fixture() {
        // reward/fee/height fixture mined on testnet, burning the BTC side
        let builder = CoinbaseBuilder::new(&btc_address(), true);
        let tx = builder.build_bitcoin(625_540_727, 666, 703_687, &ZERO_HASH);
        let (part1, part2) = split_coinbase(&tx).unwrap();

        assert_eq!(
            hex::encode(&part1),
            "01000000010000000000000000000000000000000000000000000000000000000000000000ffffffff\
             3c03c7bc0a08"
        );
        assert_eq!(
            hex::encode(&part2),
            "2000000000000000000000000000000000000000000000000000000000000000000d2f503253482f6a\
             61786e65742fffffffff030000000000000000176a152068747470733a2f2f6a61782e6e6574776f72\
             6b2077fe48250000000001519a02000000000000015100000000"
        );
    }

    #[test]
    fn test_split_matches_reference_fixture_paying_out() {
        let builder = CoinbaseBuilder::new(&btc_address(), false);
        let tx = builder.build_bitcoin(625_540_727, 666, 703_687, &ZERO_HASH);
        let (part1, part2) = split_coinbase(&tx).unwrap();

        assert_eq!(
            hex::encode(&part1),
            "01000000010000000000000000000000000000000000000000000000000000000000000000ffffffff\
             3c03c7bc0a08"
        );
        assert_eq!(
            hex::encode(&part2),
            "2000000000000000000000000000000000000000000000000000000000000000000d2f503253482f6a\
             61786e65742fffffffff030000000000000000176a152068747470733a2f2f6a61782e6e6574776f72\
             6b2077fe4825000000001976a914cd120759aa39d9184d19b8c390d30da979218cea88ac9a02000000\
             0000001976a914cd120759aa39d9184d19b8c390d30da979218cea88ac00000000"
        );
    }

    #[test]
    fn test_split_reassembly_roundtrip() {
        let builder = CoinbaseBuilder::new(&btc_address(), false);
        for height in [1u32, 16, 17, 255, 703_687, 10_000_000] {
            let tx = builder.build_bitcoin(5_000, 123, height, &[0xab; 32]);
            let raw = tx.serialize();
            let (part1, part2) = split_coinbase(&tx).unwrap();

            let mut rebuilt = part1.clone();
            rebuilt.extend_from_slice(&0u64.to_le_bytes());
            rebuilt.extend_from_slice(&part2);
            assert_eq!(rebuilt, raw, "height = {height}");

            // the reassembled bytes stay a well-formed transaction
            let parsed = Transaction::deserialize(&rebuilt).unwrap();
            assert!(parsed.is_coinbase());
            assert_eq!(parsed.outputs.len(), 3);
        }
    }

    #[test]
    fn test_bitcoin_script_carries_commitment() {
        let commitment = [0x5a; 32];
        let builder = CoinbaseBuilder::new(&btc_address(), false);
        let tx = builder.build_bitcoin(1_000, 0, 1_000, &commitment);
        let script = &tx.inputs[0].signature_script;
        assert!(script.windows(32).any(|window| window == &commitment[..]));
        assert!(script
            .windows(BTC_SIG_TAG.len())
            .any(|window| window == BTC_SIG_TAG));
    }

    #[test]
    fn test_node_form_script() {
        let builder = CoinbaseBuilder::new(&jax_address(), false);
        let tx = builder.build_node(5_000, 0, 625_923, 1);
        // height push, OP_1 shard id, OP_0 extra nonce, tag push
        assert_eq!(
            hex::encode(&tx.inputs[0].signature_script),
            "03038d0951000e2f503253482f6a61786e6574642f"
        );
        assert_eq!(tx.outputs[1].value, 5_000);
        assert_eq!(
            hex::encode(&tx.outputs[1].pk_script),
            "76a914b953dad0e79288eea918085c9b72c3ca5482349388ac"
        );
    }

    #[test]
    fn test_burn_form_outputs() {
        let builder = CoinbaseBuilder::new(&jax_address(), true);
        let tx = builder.build_node(5_000, 10, 100, 2);
        assert_eq!(tx.outputs[1].pk_script, BURN_SCRIPT.to_vec());
        assert_eq!(tx.outputs[2].pk_script, BURN_SCRIPT.to_vec());
        assert_eq!(tx.outputs[0].value, 0);
        assert_eq!(tx.outputs[1].value, 5_000);
        assert_eq!(tx.outputs[2].value, 10);
    }

    #[test]
    fn test_small_int_height_split() {
        // height 16 packs as OP_16, so the height adds no padding bytes
        let builder = CoinbaseBuilder::new(&btc_address(), true);
        let tx = builder.build_bitcoin(1, 0, 16, &ZERO_HASH);
        let raw = tx.serialize();
        assert_eq!(raw[42], 0x60);
        let (part1, part2) = split_coinbase(&tx).unwrap();
        assert_eq!(part1[part1.len() - 1], 0x08);
        let mut rebuilt = part1;
        rebuilt.extend_from_slice(&0u64.to_le_bytes());
        rebuilt.extend_from_slice(&part2);
        assert_eq!(rebuilt, raw);
    }

    #[test]
    fn test_split_rejects_short_transaction() {
        let tx = Transaction {
            version: 1,
            inputs: vec![],
            outputs: vec![],
            lock_time: 0,
        };
        assert!(split_coinbase(&tx).is_err());
    }
}
