//! Block assembly and the canonical submission serialization: header
//! bytes followed by the CompactSize-counted transaction list.

use std::fmt;

use crate::codec::put_var_int;
use crate::header::BlockHeader;
use crate::transaction::Transaction;
use crate::Hash;

/// Block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn new(header: BlockHeader, transactions: Vec<Transaction>) -> Self {
        Block {
            header,
            transactions,
        }
    }

    /// Serialize the whole block for submission.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1024);
        self.header.write_to(&mut out);
        put_var_int(&mut out, self.transactions.len() as u64);
        for tx in &self.transactions {
            tx.write_to(&mut out);
        }
        out
    }

    /// Block hash: the hash of the serialized header.
    pub fn block_hash(&self) -> Hash {
        self.header.block_hash()
    }

    /// Merkle root recomputed from the current transaction list.
    pub fn calculate_merkle_root(&self) -> Hash {
        crate::merkle::merkle_root(&self.transactions)
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.header {
            BlockHeader::Beacon(_) => "beacon",
            BlockHeader::Shard(_) => "shard",
        };
        write!(
            f,
            "Block {{ chain: {}, hash: {}, txs: {} }}",
            kind,
            hex::encode(&self.block_hash()[0..8]),
            self.transactions.len()
        )
    }
}

impl Block {
    /// Consistency check used before submission: the committed Merkle root
    /// must match the transaction list.
    pub fn merkle_consistent(&self) -> bool {
        let committed = match &self.header {
            BlockHeader::Beacon(header) => header.tx_merkle_root,
            BlockHeader::Shard(header) => header.tx_merkle_root,
        };
        committed == self.calculate_merkle_root()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::ByteReader;
    use crate::header::{BeaconHeader, BtcAux, BtcHeader, CodingProof, CoinbaseAux};
    use crate::transaction::{OutPoint, TxIn, TxOut};
    use num_bigint::BigUint;

    fn coinbase() -> Transaction {
        Transaction {
            version: 1,
            inputs: vec![TxIn {
                previous_out_point: OutPoint::null(),
                signature_script: vec![0x03, 0xaa, 0xbb, 0xcc],
                sequence: u32::MAX,
            }],
            outputs: vec![TxOut {
                value: 5000,
                pk_script: vec![0x51],
            }],
            lock_time: 0,
        }
    }

    fn beacon_block() -> Block {
        let transactions = vec![coinbase()];
        let header = BeaconHeader {
            version: 1,
            height: 100,
            prev_mmr_root: [0x01; 32],
            prev_hash: [0x02; 32],
            tx_merkle_root: crate::merkle::merkle_root(&transactions),
            timestamp: 1_630_000_000,
            bits: 0x1e0dffff,
            nonce: 0,
            k: 1 << 16,
            vote_k: 1 << 16,
            shards: 2,
            chain_weight: BigUint::from(7u32),
            merge_mining_root: [0x03; 32],
            merge_mining_number: 1,
            coding_proof: CodingProof::default(),
            btc_aux: BtcAux {
                header: BtcHeader {
                    version: 0x2000_0000,
                    prev_block: [0x04; 32],
                    merkle_root: [0x05; 32],
                    timestamp: 1_630_000_001,
                    bits: 0x1d00ffff,
                    nonce: 7,
                },
                coinbase_aux: CoinbaseAux::from_coinbase(coinbase()),
            },
        };
        Block::new(BlockHeader::Beacon(header), transactions)
    }

    #[test]
    fn test_submission_layout() {
        let block = beacon_block();
        let raw = block.serialize();

        // header bytes, then the tx count, then the coinbase
        let mut header_bytes = Vec::new();
        block.header.write_to(&mut header_bytes);
        assert_eq!(&raw[..header_bytes.len()], &header_bytes[..]);
        assert_eq!(raw[header_bytes.len()], 0x01);
        let tx_region = &raw[header_bytes.len() + 1..];
        assert_eq!(tx_region, &block.transactions[0].serialize()[..]);
    }

    #[test]
    fn test_block_hash_is_header_hash() {
        let block = beacon_block();
        let mut header_bytes = Vec::new();
        block.header.write_to(&mut header_bytes);
        assert_eq!(block.block_hash(), crate::double_sha256(&header_bytes));
    }

    #[test]
    fn test_merkle_consistency() {
        let mut block = beacon_block();
        assert!(block.merkle_consistent());
        block.transactions.push(coinbase());
        assert!(!block.merkle_consistent());
    }

    #[test]
    fn test_header_survives_block_roundtrip() {
        let block = beacon_block();
        let raw = block.serialize();
        let mut reader = ByteReader::new(&raw);
        let decoded = BeaconHeader::read_from(&mut reader).unwrap();
        assert_eq!(decoded.merge_mining_root, [0x03; 32]);
        assert_eq!(reader.var_int().unwrap(), 1);
        let tx = Transaction::read_from(&mut reader).unwrap();
        assert!(reader.is_empty());
        assert_eq!(tx, block.transactions[0]);
    }
}
