use super::{stream_source, ContentHash, ContentHasher, HashAlgorithm, HashError};
use crate::source::ByteSource;
use std::hash::Hasher as _;
use twox_hash::XxHash64;

/// Streaming XxHash64 (seed 0), rendered as 16 hex digits.
#[derive(Debug, Clone, Copy, Default)]
pub struct XxHasher;

impl ContentHasher for XxHasher {
    fn algorithm(&self) -> HashAlgorithm {
        HashAlgorithm::XxHash
    }

    fn hash_source(&self, source: &dyn ByteSource) -> Result<ContentHash, HashError> {
        let mut hasher = XxHash64::with_seed(0);
        stream_source(source, |chunk| hasher.write(chunk))?;
        Ok(ContentHash::new(format!("{:016x}", hasher.finish())))
    }
}

pub fn hash_data(data: &[u8]) -> u64 {
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(data);
    hasher.finish()
}
