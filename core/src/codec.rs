//! Binary and textual codecs shared by the template decoder and the wire
//! types: hex fields, compact-size integers, 256-bit targets and the
//! truncation-checked byte cursor used by every deserializer.

use num_bigint::BigUint;
use num_traits::Num;
use thiserror::Error;

use crate::Hash;

/// Decoding errors: malformed hex, truncated bytes, bad integers.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("hex decoding error: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("input truncated: need {needed} more bytes")]
    Truncated { needed: usize },

    #[error("invalid integer field: {0}")]
    BadInt(String),

    #[error("target wider than 256 bits ({0} bytes)")]
    TargetTooWide(usize),

    #[error("reserved field violation: {0}")]
    ReservedField(&'static str),

    #[error("malformed structure: {0}")]
    Malformed(String),
}

/// Decode a hex field into raw bytes.
pub fn parse_hex(s: &str) -> Result<Vec<u8>, DecodeError> {
    Ok(hex::decode(s)?)
}

/// Decode a 32-byte hash given in RPC display order (reversed byte order,
/// as Bitcoin-family nodes print hashes).
pub fn parse_hash_display(s: &str) -> Result<Hash, DecodeError> {
    let raw = hex::decode(s)?;
    if raw.len() != 32 {
        return Err(DecodeError::Malformed(format!(
            "hash field is {} bytes, want 32",
            raw.len()
        )));
    }
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&raw);
    hash.reverse();
    Ok(hash)
}

/// Parse a hex-encoded `u32`, e.g. the `bits` template field.
pub fn parse_u32_hex(s: &str) -> Result<u32, DecodeError> {
    u32::from_str_radix(s, 16).map_err(|e| DecodeError::BadInt(format!("{s:?}: {e}")))
}

/// Parse a variable-length big-endian hex target. Anything wider than
/// 32 bytes cannot fit a 256-bit target and is rejected.
pub fn parse_target_hex(s: &str) -> Result<BigUint, DecodeError> {
    let raw = hex::decode(s)?;
    if raw.len() > 32 {
        return Err(DecodeError::TargetTooWide(raw.len()));
    }
    Ok(BigUint::from_bytes_be(&raw))
}

/// Parse a decimal big integer, e.g. the `chainweight` template field.
pub fn parse_chain_weight(s: &str) -> Result<BigUint, DecodeError> {
    BigUint::from_str_radix(s, 10).map_err(|e| DecodeError::BadInt(format!("{s:?}: {e}")))
}

/// Expand a compact difficulty representation into the full 256-bit target.
/// A set sign bit or a zero mantissa yields a zero target.
pub fn compact_to_target(bits: u32) -> BigUint {
    let mantissa = bits & 0x007f_ffff;
    if bits & 0x0080_0000 != 0 {
        return BigUint::from(0u32);
    }
    let exponent = (bits >> 24) as usize;
    if exponent <= 3 {
        BigUint::from(mantissa >> (8 * (3 - exponent)))
    } else {
        BigUint::from(mantissa) << (8 * (exponent - 3))
    }
}

/// Interpret a hash as a big integer for target comparison. Hashes are
/// little-endian on the wire, so the bytes reverse first.
pub fn hash_to_big(hash: &Hash) -> BigUint {
    let mut be = *hash;
    be.reverse();
    BigUint::from_bytes_be(&be)
}

/// Append a Bitcoin CompactSize integer.
pub fn put_var_int(out: &mut Vec<u8>, value: u64) {
    if value < 0xfd {
        out.push(value as u8);
    } else if value <= 0xffff {
        out.push(0xfd);
        out.extend_from_slice(&(value as u16).to_le_bytes());
    } else if value <= 0xffff_ffff {
        out.push(0xfe);
        out.extend_from_slice(&(value as u32).to_le_bytes());
    } else {
        out.push(0xff);
        out.extend_from_slice(&value.to_le_bytes());
    }
}

/// Append a length-prefixed byte string.
pub fn put_var_bytes(out: &mut Vec<u8>, data: &[u8]) {
    put_var_int(out, data.len() as u64);
    out.extend_from_slice(data);
}

/// Cursor over a byte slice. Every read is bounds-checked and reports how
/// many bytes were missing, so deserializers stay total over arbitrary
/// input.
pub struct ByteReader<'a> {
    buf: &'a [u8],
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        ByteReader { buf }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn need(&self, n: usize) -> Result<(), DecodeError> {
        if self.buf.len() < n {
            Err(DecodeError::Truncated {
                needed: n - self.buf.len(),
            })
        } else {
            Ok(())
        }
    }

    pub fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        self.need(n)?;
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    pub fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    pub fn u32_le(&mut self) -> Result<u32, DecodeError> {
        let raw = self.take(4)?;
        Ok(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    pub fn i32_le(&mut self) -> Result<i32, DecodeError> {
        Ok(self.u32_le()? as i32)
    }

    pub fn u64_le(&mut self) -> Result<u64, DecodeError> {
        let raw = self.take(8)?;
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(raw);
        Ok(u64::from_le_bytes(bytes))
    }

    pub fn i64_le(&mut self) -> Result<i64, DecodeError> {
        Ok(self.u64_le()? as i64)
    }

    pub fn hash(&mut self) -> Result<Hash, DecodeError> {
        let raw = self.take(32)?;
        let mut hash = [0u8; 32];
        hash.copy_from_slice(raw);
        Ok(hash)
    }

    /// Read a CompactSize integer, rejecting non-canonical encodings.
    pub fn var_int(&mut self) -> Result<u64, DecodeError> {
        let discriminant = self.u8()?;
        let value = match discriminant {
            0xfd => {
                let raw = self.take(2)?;
                let v = u16::from_le_bytes([raw[0], raw[1]]) as u64;
                if v < 0xfd {
                    return Err(DecodeError::Malformed("non-canonical varint".into()));
                }
                v
            }
            0xfe => {
                let v = self.u32_le()? as u64;
                if v <= 0xffff {
                    return Err(DecodeError::Malformed("non-canonical varint".into()));
                }
                v
            }
            0xff => {
                let v = self.u64_le()?;
                if v <= 0xffff_ffff {
                    return Err(DecodeError::Malformed("non-canonical varint".into()));
                }
                v
            }
            n => n as u64,
        };
        Ok(value)
    }

    pub fn var_bytes(&mut self) -> Result<Vec<u8>, DecodeError> {
        let len = self.var_int()?;
        if len > self.remaining() as u64 {
            return Err(DecodeError::Truncated {
                needed: (len - self.remaining() as u64) as usize,
            });
        }
        Ok(self.take(len as usize)?.to_vec())
    }
}
