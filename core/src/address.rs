//! Payout address decoding.
//!
//! The coordinator only ever needs the hash160 behind a Base58Check
//! P2PKH address; key handling stays with the wallet.

use std::fmt;
use std::str::FromStr;

use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid base58 encoding")]
    BadBase58,

    #[error("invalid address length: {0}")]
    BadLength(usize),

    #[error("address checksum mismatch")]
    BadChecksum,
}

/// A decoded P2PKH payout address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayoutAddress {
    version: u8,
    hash160: [u8; 20],
}

impl PayoutAddress {
    /// Decode a Base58Check address: version byte, 20-byte hash160 and a
    /// 4-byte double-SHA-256 checksum.
    pub fn from_base58(address: &str) -> Result<Self, AddressError> {
        let decoded = bs58::decode(address)
            .into_vec()
            .map_err(|_| AddressError::BadBase58)?;
        if decoded.len() != 25 {
            return Err(AddressError::BadLength(decoded.len()));
        }

        let checksum = double_sha256_checksum(&decoded[..21]);
        if checksum[..] != decoded[21..] {
            return Err(AddressError::BadChecksum);
        }

        let mut hash160 = [0u8; 20];
        hash160.copy_from_slice(&decoded[1..21]);
        Ok(PayoutAddress {
            version: decoded[0],
            hash160,
        })
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn hash160(&self) -> &[u8; 20] {
        &self.hash160
    }

    /// The standard pay-to-pubkey-hash locking script.
    pub fn p2pkh_script(&self) -> Vec<u8> {
        let mut script = Vec::with_capacity(25);
        script.push(0x76); // OP_DUP
        script.push(0xa9); // OP_HASH160
        script.push(0x14); // push 20 bytes
        script.extend_from_slice(&self.hash160);
        script.push(0x88); // OP_EQUALVERIFY
        script.push(0xac); // OP_CHECKSIG
        script
    }
}

fn double_sha256_checksum(payload: &[u8]) -> [u8; 4] {
    let first = Sha256::digest(payload);
    let second = Sha256::digest(first);
    let mut checksum = [0u8; 4];
    checksum.copy_from_slice(&second[..4]);
    checksum
}

impl FromStr for PayoutAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PayoutAddress::from_base58(s)
    }
}

impl fmt::Display for PayoutAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut payload = Vec::with_capacity(25);
        payload.push(self.version);
        payload.extend_from_slice(&self.hash160);
        let checksum = double_sha256_checksum(&payload);
        payload.extend_from_slice(&checksum);
        write!(f, "{}", bs58::encode(payload).into_string())
    }
}
