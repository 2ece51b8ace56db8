//! Binary value type
//!
//! Immutable, cheaply clonable byte sequence used for both keys and values.
//!
//! ## Responsibilities
//! - Length-prefixed encoding into the backing buffer
//! - Stable 32-bit hash code (CRC-32 of the bytes)
//! - Typed encode/decode through bincode

use std::fmt;
use std::ops::Deref;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::block::MIN_ENTRY;
use crate::error::{BufMapError, Result};

/// Largest key or value a block can hold
pub const MAX_BINARY_LENGTH: usize = i32::MAX as usize - MIN_ENTRY;

/// Hash code of a key given as raw bytes; equal to `Binary::hash_code`
pub fn hash_bytes(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// A length-prefixed, hashable, byte-comparable value
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Binary {
    bytes: Bytes,
}

impl Binary {
    /// Create an empty binary
    pub fn new() -> Self {
        Self { bytes: Bytes::new() }
    }

    /// Copy a slice into a new binary
    pub fn copy_from_slice(data: &[u8]) -> Self {
        Self {
            bytes: Bytes::copy_from_slice(data),
        }
    }

    /// Serialize a typed value with bincode
    pub fn encode<T: Serialize>(value: &T) -> Result<Self> {
        let data = bincode::serialize(value).map_err(|e| BufMapError::Serialization(e.to_string()))?;
        Ok(Self::from(data))
    }

    /// Deserialize this binary as a typed value
    ///
    /// Returns `TypeMismatch` when the bytes are not a valid encoding of `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        bincode::deserialize(&self.bytes).map_err(|e| {
            BufMapError::TypeMismatch(format!(
                "{} byte binary does not decode as {}: {}",
                self.len(),
                std::any::type_name::<T>(),
                e
            ))
        })
    }

    /// Number of bytes
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// 32-bit hash code stored alongside every key in the buffer
    pub fn hash_code(&self) -> u32 {
        hash_bytes(&self.bytes)
    }

    pub fn as_bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.bytes.to_vec()
    }

    /// Verify the length fits the 31-bit length prefix of a block
    pub(crate) fn validate(&self, what: &str) -> Result<()> {
        if self.len() > MAX_BINARY_LENGTH {
            return Err(BufMapError::TypeMismatch(format!(
                "{} of {} bytes exceeds the maximum binary length of {}",
                what,
                self.len(),
                MAX_BINARY_LENGTH
            )));
        }
        Ok(())
    }
}

impl Deref for Binary {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.bytes
    }
}

impl AsRef<[u8]> for Binary {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

impl From<Bytes> for Binary {
    fn from(bytes: Bytes) -> Self {
        Self { bytes }
    }
}

impl From<Vec<u8>> for Binary {
    fn from(data: Vec<u8>) -> Self {
        Self { bytes: Bytes::from(data) }
    }
}

impl From<&[u8]> for Binary {
    fn from(data: &[u8]) -> Self {
        Self::copy_from_slice(data)
    }
}

impl<const N: usize> From<&[u8; N]> for Binary {
    fn from(data: &[u8; N]) -> Self {
        Self::copy_from_slice(data)
    }
}

impl From<&str> for Binary {
    fn from(s: &str) -> Self {
        Self::copy_from_slice(s.as_bytes())
    }
}

impl From<String> for Binary {
    fn from(s: String) -> Self {
        Self::from(s.into_bytes())
    }
}

impl From<Binary> for Bytes {
    fn from(bin: Binary) -> Self {
        bin.bytes
    }
}

impl fmt::Debug for Binary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.bytes) {
            Ok(s) if !s.chars().any(char::is_control) => write!(f, "Binary({:?})", s),
            _ => write!(f, "Binary(0x{})", hex::encode(&self.bytes)),
        }
    }
}

impl fmt::Display for Binary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.bytes))
    }
}
