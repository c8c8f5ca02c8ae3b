use super::{stream_source, ContentHash, ContentHasher, HashAlgorithm, HashError};
use crate::source::ByteSource;

/// BLAKE3, for callers that want a cryptographic digest on the upload side.
#[derive(Debug, Clone, Copy, Default)]
pub struct Blake3Hasher;

impl ContentHasher for Blake3Hasher {
    fn algorithm(&self) -> HashAlgorithm {
        HashAlgorithm::Blake3
    }

    fn hash_source(&self, source: &dyn ByteSource) -> Result<ContentHash, HashError> {
        let mut hasher = ::blake3::Hasher::new();
        stream_source(source, |chunk| {
            hasher.update(chunk);
        })?;
        Ok(ContentHash::new(hasher.finalize().to_hex().to_string()))
    }
}
