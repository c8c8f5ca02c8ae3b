pub mod blake;
pub mod pool;
pub mod xxhash;

use crate::source::ByteSource;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{self, Read};
use std::sync::Arc;
use thiserror::Error;

pub use pool::{HashJob, HashPool, HashResults};

const READ_BUFFER_SIZE: usize = 64 * 1024; // 64KB

/// Hex-encoded content digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    pub fn new(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Error, Debug)]
pub enum HashError {
    #[error("failed to open source: {0}")]
    Open(#[source] io::Error),

    #[error("failed to read source: {0}")]
    Read(#[source] io::Error),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    #[serde(alias = "xxh64")]
    XxHash,
    Blake3,
}

/// Computes a deterministic digest for a byte source.
///
/// Implementations must be safe to call from any worker thread.
pub trait ContentHasher: Send + Sync {
    fn algorithm(&self) -> HashAlgorithm;

    fn hash_source(&self, source: &dyn ByteSource) -> Result<ContentHash, HashError>;
}

pub fn hasher_for(algorithm: HashAlgorithm) -> Arc<dyn ContentHasher> {
    match algorithm {
        HashAlgorithm::XxHash => Arc::new(xxhash::XxHasher),
        HashAlgorithm::Blake3 => Arc::new(blake::Blake3Hasher),
    }
}

/// Feed a source to `consume` in fixed-size chunks.
pub(crate) fn stream_source(
    source: &dyn ByteSource,
    mut consume: impl FnMut(&[u8]),
) -> Result<(), HashError> {
    let mut reader = source.open().map_err(HashError::Open)?;
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];
    loop {
        let read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(HashError::Read(e)),
        };
        consume(&buffer[..read]);
    }
    Ok(())
}
