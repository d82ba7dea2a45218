//! JaxMine Core Types and Codecs
//!
//! This crate defines the wire-level building blocks of the merged-mining
//! coordinator: transactions, beacon/shard/Bitcoin block headers, the
//! transaction Merkle tree, the sparse merge-mining tree, and the special
//! multi-output coinbase the coordinator hands to the external hasher.

use sha2::{Digest, Sha256};

pub mod address;
pub mod block;
pub mod codec;
pub mod coinbase;
pub mod header;
pub mod merkle;
pub mod mmtree;
pub mod transaction;

pub use address::{AddressError, PayoutAddress};
pub use block::Block;
pub use codec::{ByteReader, DecodeError};
pub use coinbase::{split_coinbase, CoinbaseBuilder};
pub use header::{
    BeaconHeader, BlockHeader, BtcAux, BtcHeader, CodingProof, CoinbaseAux, ShardHeader,
};
pub use merkle::merkle_root;
pub use mmtree::{SparseMerkleTree, TreeError};
pub use transaction::{OutPoint, Transaction, TxIn, TxOut};

/// Hash type used throughout the system
pub type Hash = [u8; 32];

/// The all-zero hash: empty sparse-tree slots, null outpoints.
pub const ZERO_HASH: Hash = [0u8; 32];

/// Double SHA-256, the hash of every header, txid and tree node.
pub fn double_sha256(data: &[u8]) -> Hash {
    let first = Sha256::digest(data);
    let second = Sha256::digest(first);
    let mut out = [0u8; 32];
    out.copy_from_slice(&second);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_double_sha256_known_vector() {
        let hash = double_sha256(b"hello");
        assert_eq!(
            hex::encode(hash),
            "9595c9df90075148eb06860365df33584b75bff782a510c6cd4883a419833d50"
        );
    }
}
