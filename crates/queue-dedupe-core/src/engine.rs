use crate::dedupe::matcher::{self, MatchOutcome};
use crate::dedupe::prefilter::{self, PrefilterStats};
use crate::dedupe::verify::{self, VerifyContext, VerifySettings, VerifyStats};
use crate::error::Error;
use crate::hasher::{self, ContentHasher, HashAlgorithm, HashPool};
use crate::model::{ClassifiedFile, FileId, NewFile};
use crate::progress::ProgressReporter;
use crate::queue::QueueStore;
use crate::signal::{CancelToken, PrefilterSignal};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use tracing::info;

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub hash_algorithm: HashAlgorithm,
    pub workers: usize,
    pub verify: VerifySettings,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            hash_algorithm: HashAlgorithm::default(),
            workers: default_workers(),
            verify: VerifySettings::default(),
        }
    }
}

pub fn default_workers() -> usize {
    thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}

/// Result of adding one batch to the queue.
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub batch_order: u64,
    pub added: Vec<FileId>,
    /// Present when the queue already held classified files.
    pub matched: Option<MatchOutcome>,
    pub prefilter: PrefilterStats,
}

/// The upload-queue dedup engine.
///
/// Cloning is cheap and every clone shares the same queue, signal and pool,
/// so a clone can verify on another thread while batches keep arriving.
#[derive(Clone)]
pub struct DedupEngine {
    store: Arc<Mutex<QueueStore>>,
    signal: PrefilterSignal,
    hasher: Arc<dyn ContentHasher>,
    pool: Arc<HashPool>,
    verify_lock: Arc<Mutex<()>>,
    settings: EngineSettings,
}

impl DedupEngine {
    pub fn new(settings: EngineSettings) -> Result<Self, Error> {
        let hasher = hasher::hasher_for(settings.hash_algorithm);
        Self::with_hasher(settings, hasher)
    }

    pub fn with_hasher(settings: EngineSettings, hasher: Arc<dyn ContentHasher>) -> Result<Self, Error> {
        let pool = HashPool::new(settings.workers)?;
        info!(
            "Dedup engine ready: {:?} hashing on {} workers",
            hasher.algorithm(),
            pool.workers()
        );
        Ok(Self {
            store: Arc::new(Mutex::new(QueueStore::new())),
            signal: PrefilterSignal::new(),
            hasher,
            pool: Arc::new(pool),
            verify_lock: Arc::new(Mutex::new(())),
            settings,
        })
    }

    /// Add a batch and run Stage 1 over the whole queue.
    ///
    /// 1. Append the batch under the next batch order
    /// 2. Report how it matches already-classified files (not on the first batch)
    /// 3. Prefilter, then raise the prefilter signal
    pub fn ingest(&self, files: Vec<NewFile>, reporter: &dyn ProgressReporter) -> Result<IngestReport, Error> {
        self.signal.reset();

        let mut store = self.store.lock()?;
        let had_classified = store.has_classified();
        let (batch_order, added) = store.push_batch(files);
        reporter.on_prefilter_start(store.len());

        let matched = if had_classified {
            Some(matcher::match_batch(&store, &added))
        } else {
            None
        };
        let prefilter = prefilter::run_prefilter(&mut store);
        drop(store);

        self.signal.complete();
        reporter.on_prefilter_complete(prefilter.total_files, prefilter.elapsed.as_secs_f64());
        info!(
            "Batch {} ingested: {} files added, {} in queue",
            batch_order,
            added.len(),
            prefilter.total_files
        );

        Ok(IngestReport {
            batch_order,
            added,
            matched,
            prefilter,
        })
    }

    /// Run Stage 2 on the calling thread. Calls are serialized.
    pub fn verify(&self, cancel: &CancelToken, reporter: &dyn ProgressReporter) -> Result<VerifyStats, Error> {
        let _serial = self.verify_lock.lock()?;
        let ctx = VerifyContext {
            signal: &self.signal,
            hasher: self.hasher.as_ref(),
            pool: &self.pool,
            cancel,
            reporter,
            settings: &self.settings.verify,
        };
        verify::verify_hashes(&self.store, &ctx)
    }

    /// Run Stage 2 on a dedicated thread.
    pub fn spawn_verify(&self, reporter: Arc<dyn ProgressReporter>) -> Result<VerifyHandle, Error> {
        let cancel = CancelToken::new();
        let token = cancel.clone();
        let engine = self.clone();
        let handle = thread::Builder::new()
            .name("verify".to_string())
            .spawn(move || engine.verify(&token, reporter.as_ref()))?;
        Ok(VerifyHandle { cancel, handle })
    }

    /// Ingest a batch and verify it, retrying verification while other
    /// batches make it stale.
    pub fn process_batch(
        &self,
        files: Vec<NewFile>,
        cancel: &CancelToken,
        reporter: &dyn ProgressReporter,
    ) -> Result<(IngestReport, VerifyStats), Error> {
        let report = self.ingest(files, reporter)?;
        loop {
            let stats = self.verify(cancel, reporter)?;
            if !stats.stale {
                return Ok((report, stats));
            }
        }
    }

    /// Current classification of every queued file, in queue order.
    pub fn snapshot(&self) -> Result<Vec<ClassifiedFile>, Error> {
        Ok(self.store.lock()?.snapshot())
    }

    pub fn with_store<R>(&self, f: impl FnOnce(&QueueStore) -> R) -> Result<R, Error> {
        let store = self.store.lock()?;
        Ok(f(&store))
    }

    pub fn queue_len(&self) -> Result<usize, Error> {
        Ok(self.store.lock()?.len())
    }

    pub fn prefilter_signal(&self) -> &PrefilterSignal {
        &self.signal
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }
}

/// A verification pass running on its own thread.
pub struct VerifyHandle {
    cancel: CancelToken,
    handle: JoinHandle<Result<VerifyStats, Error>>,
}

impl VerifyHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn join(self) -> Result<VerifyStats, Error> {
        self.handle
            .join()
            .map_err(|_| Error::Other("verification thread panicked".to_string()))?
    }
}
