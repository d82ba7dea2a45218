//! Transaction wire format.
//!
//! The JAX chains reuse the classic Bitcoin transaction layout (version,
//! inputs, outputs, lock time, CompactSize counts, little-endian integers);
//! none of the coordinator's paths carry witness data.

use crate::codec::{put_var_bytes, put_var_int, ByteReader, DecodeError};
use crate::{double_sha256, Hash, ZERO_HASH};

/// Reference to a previous transaction output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutPoint {
    pub hash: Hash,
    pub index: u32,
}

impl OutPoint {
    /// The null outpoint only a coinbase input may spend.
    pub fn null() -> Self {
        OutPoint {
            hash: ZERO_HASH,
            index: u32::MAX,
        }
    }

    pub fn is_null(&self) -> bool {
        self.hash == ZERO_HASH && self.index == u32::MAX
    }
}

/// Transaction input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxIn {
    pub previous_out_point: OutPoint,
    pub signature_script: Vec<u8>,
    pub sequence: u32,
}

/// Transaction output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOut {
    /// Value in satoshi
    pub value: i64,
    pub pk_script: Vec<u8>,
}

/// Transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub version: i32,
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
    pub lock_time: u32,
}

impl Transaction {
    /// A transaction is a coinbase when its single input spends the null
    /// outpoint.
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].previous_out_point.is_null()
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.version.to_le_bytes());
        put_var_int(out, self.inputs.len() as u64);
        for input in &self.inputs {
            out.extend_from_slice(&input.previous_out_point.hash);
            out.extend_from_slice(&input.previous_out_point.index.to_le_bytes());
            put_var_bytes(out, &input.signature_script);
            out.extend_from_slice(&input.sequence.to_le_bytes());
        }
        put_var_int(out, self.outputs.len() as u64);
        for output in &self.outputs {
            out.extend_from_slice(&output.value.to_le_bytes());
            put_var_bytes(out, &output.pk_script);
        }
        out.extend_from_slice(&self.lock_time.to_le_bytes());
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(256);
        self.write_to(&mut out);
        out
    }

    pub fn read_from(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        let version = reader.i32_le()?;

        let input_count = reader.var_int()?;
        // an input is at least 41 bytes, so an oversized count is always a lie
        if input_count > (reader.remaining() / 41 + 1) as u64 {
            return Err(DecodeError::Malformed(format!(
                "claimed {input_count} inputs in {} bytes",
                reader.remaining()
            )));
        }
        let mut inputs = Vec::with_capacity(input_count as usize);
        for _ in 0..input_count {
            let hash = reader.hash()?;
            let index = reader.u32_le()?;
            let signature_script = reader.var_bytes()?;
            let sequence = reader.u32_le()?;
            inputs.push(TxIn {
                previous_out_point: OutPoint { hash, index },
                signature_script,
                sequence,
            });
        }

        let output_count = reader.var_int()?;
        if output_count > (reader.remaining() / 9 + 1) as u64 {
            return Err(DecodeError::Malformed(format!(
                "claimed {output_count} outputs in {} bytes",
                reader.remaining()
            )));
        }
        let mut outputs = Vec::with_capacity(output_count as usize);
        for _ in 0..output_count {
            let value = reader.i64_le()?;
            let pk_script = reader.var_bytes()?;
            outputs.push(TxOut { value, pk_script });
        }

        let lock_time = reader.u32_le()?;
        Ok(Transaction {
            version,
            inputs,
            outputs,
            lock_time,
        })
    }

    /// Deserialize from an exact buffer; trailing bytes are an error.
    pub fn deserialize(raw: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = ByteReader::new(raw);
        let tx = Self::read_from(&mut reader)?;
        if !reader.is_empty() {
            return Err(DecodeError::Malformed(format!(
                "{} trailing bytes after transaction",
                reader.remaining()
            )));
        }
        Ok(tx)
    }

    /// Transaction id: double SHA-256 of the canonical serialization.
    pub fn txid(&self) -> Hash {
        double_sha256(&self.serialize())
    }
}
