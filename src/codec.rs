//! Payload codec hooks. Values reach the store as `serde_json` bytes; an entry codec
//! then runs on every write (encryption is the usual case), and a compression codec
//! runs on entries a rule marked for compression.

use crate::errors::CacheError;
use std::fmt::Debug;

pub trait PayloadCodec: Send + Sync + Debug {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// # Errors
    /// Returns `CacheError::Codec` when the payload cannot be transformed.
    fn encode(&self, raw: &[u8]) -> Result<Vec<u8>, CacheError>;

    /// # Errors
    /// Returns `CacheError::Codec` when the stored bytes are not valid for this codec.
    fn decode(&self, stored: &[u8]) -> Result<Vec<u8>, CacheError>;
}

/// Pass-through codec; the default for both hooks.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityCodec;

impl PayloadCodec for IdentityCodec {
    fn name(&self) -> &'static str {
        "identity"
    }

    fn encode(&self, raw: &[u8]) -> Result<Vec<u8>, CacheError> {
        Ok(raw.to_vec())
    }

    fn decode(&self, stored: &[u8]) -> Result<Vec<u8>, CacheError> {
        Ok(stored.to_vec())
    }
}

/// Payload with a CRC32 trailer; decoding rejects corrupted bytes. Useful as an
/// entry codec when stored bytes cross a trust boundary such as a persistence file.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChecksumCodec;

impl PayloadCodec for ChecksumCodec {
    fn name(&self) -> &'static str {
        "crc32"
    }

    fn encode(&self, raw: &[u8]) -> Result<Vec<u8>, CacheError> {
        let mut out = Vec::with_capacity(raw.len() + 4);
        out.extend_from_slice(raw);
        out.extend_from_slice(&crc32fast::hash(raw).to_le_bytes());
        Ok(out)
    }

    fn decode(&self, stored: &[u8]) -> Result<Vec<u8>, CacheError> {
        let Some(split) = stored.len().checked_sub(4) else {
            return Err(CacheError::Codec("payload shorter than checksum".into()));
        };
        let (body, tail) = stored.split_at(split);
        let mut crc = [0u8; 4];
        crc.copy_from_slice(tail);
        if crc32fast::hash(body) != u32::from_le_bytes(crc) {
            return Err(CacheError::Codec("payload checksum mismatch".into()));
        }
        Ok(body.to_vec())
    }
}
