use super::{ContentHash, ContentHasher, HashError};
use crate::error::Error;
use crate::model::FileId;
use crate::progress::ProgressReporter;
use crate::signal::CancelToken;
use crate::source::ByteSource;
use dashmap::DashMap;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{error, trace};

/// One file to hash.
#[derive(Debug, Clone)]
pub struct HashJob {
    pub id: FileId,
    pub source: Arc<dyn ByteSource>,
}

pub type HashResults = DashMap<FileId, Result<ContentHash, HashError>>;

/// Bounded worker pool for content hashing.
pub struct HashPool {
    pool: ThreadPool,
    workers: usize,
}

impl HashPool {
    pub fn new(workers: usize) -> Result<Self, Error> {
        let workers = workers.max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("hash-worker-{}", i))
            .build()?;
        Ok(Self { pool, workers })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Hash every job on the pool. Jobs started after `cancel` is raised are
    /// skipped and have no entry in the result map.
    pub fn hash_all(
        &self,
        jobs: &[HashJob],
        hasher: &dyn ContentHasher,
        cancel: &CancelToken,
        reporter: &dyn ProgressReporter,
    ) -> HashResults {
        let results: HashResults = DashMap::with_capacity(jobs.len());
        let done = AtomicUsize::new(0);
        let total = jobs.len();

        self.pool.install(|| {
            jobs.par_iter().for_each(|job| {
                if cancel.is_cancelled() {
                    return;
                }

                let result = hasher.hash_source(job.source.as_ref());
                match &result {
                    Ok(hash) => trace!(id = %job.id, hash = %hash, "hashed"),
                    Err(e) => error!(
                        id = %job.id,
                        source = %job.source.describe(),
                        "Error hashing file: {}",
                        e
                    ),
                }
                results.insert(job.id, result);

                let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
                reporter.on_hash_progress(finished, total);
            });
        });

        results
    }
}
