//! Transaction Merkle tree.
//!
//! Double-SHA-256 over transaction ids with the Bitcoin rule of
//! duplicating the last node at any odd level. The whole tree is kept as
//! a level-order store; the root is the last element.

use crate::transaction::Transaction;
use crate::{double_sha256, Hash, ZERO_HASH};

fn hash_pair(left: &Hash, right: &Hash) -> Hash {
    let mut combined = [0u8; 64];
    combined[..32].copy_from_slice(left);
    combined[32..].copy_from_slice(right);
    double_sha256(&combined)
}

/// Build the level-order Merkle store over the given leaf hashes.
pub fn build_merkle_store(leaves: &[Hash]) -> Vec<Hash> {
    if leaves.is_empty() {
        return vec![ZERO_HASH];
    }

    let mut store: Vec<Hash> = leaves.to_vec();
    let mut level_start = 0;
    let mut level_len = leaves.len();

    while level_len > 1 {
        let mut next_len = 0;
        for i in (0..level_len).step_by(2) {
            let left = store[level_start + i];
            // duplicate the last node of an odd level
            let right = if i + 1 < level_len {
                store[level_start + i + 1]
            } else {
                left
            };
            store.push(hash_pair(&left, &right));
            next_len += 1;
        }
        level_start += level_len;
        level_len = next_len;
    }

    store
}

/// Merkle root of a block's transaction list. A single transaction is its
/// own root.
pub fn merkle_root(transactions: &[Transaction]) -> Hash {
    let leaves: Vec<Hash> = transactions.iter().map(Transaction::txid).collect();
    let store = build_merkle_store(&leaves);
    store[store.len() - 1]
}
