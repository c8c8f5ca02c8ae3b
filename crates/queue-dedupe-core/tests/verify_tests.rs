use std::io::{self, Read};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use queue_dedupe_core::hasher::xxhash::XxHasher;
use queue_dedupe_core::{
    ByteSource, CancelToken, ContentHash, ContentHasher, DedupEngine, EngineSettings, Error, HashAlgorithm,
    HashError, MemorySource, NewFile, SilentReporter, Status, VerifySettings,
};

/// Counts every source it hashes.
#[derive(Default)]
struct CountingHasher {
    calls: AtomicUsize,
}

impl CountingHasher {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ContentHasher for CountingHasher {
    fn algorithm(&self) -> HashAlgorithm {
        HashAlgorithm::XxHash
    }

    fn hash_source(&self, source: &dyn ByteSource) -> Result<ContentHash, HashError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        XxHasher.hash_source(source)
    }
}

#[derive(Debug)]
struct UnreadableSource;

impl ByteSource for UnreadableSource {
    fn open(&self) -> io::Result<Box<dyn Read + Send + '_>> {
        Err(io::Error::new(io::ErrorKind::PermissionDenied, "file is locked"))
    }
}

fn settings() -> EngineSettings {
    EngineSettings {
        workers: 2,
        verify: VerifySettings {
            readiness_attempts: 2,
            readiness_backoff: Duration::from_millis(10),
        },
        ..EngineSettings::default()
    }
}

fn engine() -> (DedupEngine, Arc<CountingHasher>) {
    let hasher = Arc::new(CountingHasher::default());
    let engine = DedupEngine::with_hasher(settings(), hasher.clone()).unwrap();
    (engine, hasher)
}

fn file(name: &str, modified_at: i64, folder: &str, bytes: &[u8]) -> NewFile {
    NewFile::new(
        name,
        bytes.len() as u64,
        modified_at,
        folder,
        Arc::new(MemorySource::new(bytes.to_vec())),
    )
}

fn unreadable(name: &str, size: u64, modified_at: i64, folder: &str) -> NewFile {
    NewFile::new(name, size, modified_at, folder, Arc::new(UnreadableSource))
}

fn status_of(engine: &DedupEngine, id: queue_dedupe_core::FileId) -> Option<Status> {
    engine.with_store(|store| store.status(id)).unwrap()
}

#[test]
fn test_confirmed_duplicate_becomes_redundant() {
    let (engine, hasher) = engine();
    let report = engine
        .ingest(
            vec![file("a.txt", 1, "x", b"b1-bytes"), file("a.txt", 1, "x", b"b1-bytes")],
            &SilentReporter,
        )
        .unwrap();
    let ids = report.added;

    let stats = engine.verify(&CancelToken::new(), &SilentReporter).unwrap();

    assert_eq!(status_of(&engine, ids[0]), Some(Status::Primary));
    assert_eq!(status_of(&engine, ids[1]), Some(Status::Redundant));
    assert_eq!(stats.redundant, 1);
    assert_eq!(stats.hashed, 2);
    assert_eq!(hasher.calls(), 2);
}

#[test]
fn test_false_duplicate_is_promoted() {
    let (engine, _) = engine();
    let ids = engine
        .ingest(
            vec![file("a.txt", 1, "x", b"b1-bytes"), file("a.txt", 1, "x", b"b2-bytes")],
            &SilentReporter,
        )
        .unwrap()
        .added;

    let stats = engine.verify(&CancelToken::new(), &SilentReporter).unwrap();

    assert_eq!(stats.upgraded_to_primary, 1);
    let b = engine.with_store(|s| s.state(ids[1]).cloned()).unwrap().unwrap();
    assert_eq!(b.status, Some(Status::Primary));
    assert!(b.can_upload);
    assert_eq!(b.reference_id, None, "a promoted file references nothing");
}

#[test]
fn test_less_specific_duplicate_is_redundant() {
    let (engine, _) = engine();
    let ids = engine
        .ingest(
            vec![file("c.txt", 5, "/docs", &[9u8; 50]), file("c.txt", 5, "/docs/2024", &[9u8; 50])],
            &SilentReporter,
        )
        .unwrap()
        .added;

    engine.verify(&CancelToken::new(), &SilentReporter).unwrap();

    assert_eq!(status_of(&engine, ids[0]), Some(Status::Redundant));
    assert_eq!(status_of(&engine, ids[1]), Some(Status::Primary));
}

#[test]
fn test_matching_copy_stays_copy() {
    let (engine, _) = engine();
    let ids = engine
        .ingest(
            vec![file("a.txt", 1, "x", b"same"), file("a.txt", 2, "x", b"same")],
            &SilentReporter,
        )
        .unwrap()
        .added;

    let stats = engine.verify(&CancelToken::new(), &SilentReporter).unwrap();

    assert_eq!(stats.verified, 1);
    assert_eq!(status_of(&engine, ids[1]), Some(Status::Copy));
}

#[test]
fn test_identical_pair_behind_different_head_keeps_one_primary() {
    let (engine, _) = engine();
    let ids = engine
        .ingest(
            vec![
                file("a.txt", 1, "x", b"AAAA"),
                file("a.txt", 1, "x", b"BBBB"),
                file("a.txt", 1, "x", b"BBBB"),
            ],
            &SilentReporter,
        )
        .unwrap()
        .added;

    let stats = engine.verify(&CancelToken::new(), &SilentReporter).unwrap();

    assert_eq!(status_of(&engine, ids[0]), Some(Status::Primary));
    assert_eq!(status_of(&engine, ids[1]), Some(Status::Primary));
    assert_eq!(status_of(&engine, ids[2]), Some(Status::Redundant));
    assert_eq!(stats.upgraded_to_primary, 1);
    assert_eq!(stats.redundant, 1);
}

#[test]
fn test_copy_behind_false_duplicate_references_it() {
    let (engine, _) = engine();
    let ids = engine
        .ingest(
            vec![
                file("a.txt", 1, "x", b"xxxx"),
                file("a.txt", 1, "x", b"yyyy"),
                file("a.txt", 2, "x", b"yyyy"),
            ],
            &SilentReporter,
        )
        .unwrap()
        .added;

    engine.verify(&CancelToken::new(), &SilentReporter).unwrap();

    assert_eq!(status_of(&engine, ids[1]), Some(Status::Primary));
    let copy = engine.with_store(|s| s.state(ids[2]).cloned()).unwrap().unwrap();
    assert_eq!(copy.status, Some(Status::Copy));
    assert_eq!(copy.reference_id, Some(ids[1]));
}

#[test]
fn test_copy_behind_redundant_file_survives_purge() {
    let (engine, _) = engine();
    let cancel = CancelToken::new();
    let ids = engine
        .ingest(
            vec![
                file("a.txt", 1, "x", b"zzzz"),
                file("a.txt", 1, "x", b"zzzz"),
                file("a.txt", 2, "x", b"zzzz"),
            ],
            &SilentReporter,
        )
        .unwrap()
        .added;

    engine.verify(&cancel, &SilentReporter).unwrap();

    assert_eq!(status_of(&engine, ids[1]), Some(Status::Redundant));
    let copy = engine.with_store(|s| s.state(ids[2]).cloned()).unwrap().unwrap();
    assert_eq!(copy.status, Some(Status::Copy));
    assert_eq!(copy.reference_id, Some(ids[0]), "the copy is re-hung on the surviving file");

    engine.ingest(Vec::new(), &SilentReporter).unwrap();
    engine.verify(&cancel, &SilentReporter).unwrap();
    assert_eq!(engine.queue_len().unwrap(), 2);
    assert_eq!(status_of(&engine, ids[0]), Some(Status::Primary));
    assert_eq!(status_of(&engine, ids[2]), Some(Status::Copy));
}

#[test]
fn test_read_error_is_local_to_the_file() {
    let (engine, _) = engine();
    let ids = engine
        .ingest(
            vec![
                file("a.txt", 1, "x", b"aaaa"),
                unreadable("a.txt", 4, 1, "x"),
                file("b.txt", 1, "x", b"bbbbbb"),
                file("b.txt", 1, "x", b"bbbbbb"),
            ],
            &SilentReporter,
        )
        .unwrap()
        .added;

    let stats = engine.verify(&CancelToken::new(), &SilentReporter).unwrap();

    assert_eq!(stats.read_errors, 1);
    let broken = engine.with_store(|s| s.state(ids[1]).cloned()).unwrap().unwrap();
    assert_eq!(broken.status, Some(Status::ReadError));
    assert!(!broken.can_upload);
    assert_eq!(status_of(&engine, ids[0]), Some(Status::Primary));
    assert_eq!(status_of(&engine, ids[3]), Some(Status::Redundant), "siblings still verify");
}

#[test]
fn test_unreadable_reference_promotes_dependent() {
    let (engine, _) = engine();
    let ids = engine
        .ingest(
            vec![unreadable("a.txt", 4, 1, "x"), file("a.txt", 1, "x", b"aaaa")],
            &SilentReporter,
        )
        .unwrap()
        .added;

    let stats = engine.verify(&CancelToken::new(), &SilentReporter).unwrap();

    assert_eq!(status_of(&engine, ids[0]), Some(Status::ReadError));
    assert_eq!(status_of(&engine, ids[1]), Some(Status::Primary));
    assert_eq!(stats.references_missing, 1);
}

#[test]
fn test_read_error_is_not_rehashed() {
    let (engine, hasher) = engine();
    engine
        .ingest(
            vec![file("a.txt", 1, "x", b"aaaa"), unreadable("a.txt", 4, 1, "x")],
            &SilentReporter,
        )
        .unwrap();
    engine.verify(&CancelToken::new(), &SilentReporter).unwrap();
    let calls = hasher.calls();

    engine.ingest(Vec::new(), &SilentReporter).unwrap();
    let stats = engine.verify(&CancelToken::new(), &SilentReporter).unwrap();

    assert_eq!(stats.hashed, 0);
    assert_eq!(hasher.calls(), calls);
}

#[test]
fn test_verify_without_prefilter_times_out() {
    let (engine, hasher) = engine();
    let err = engine.verify(&CancelToken::new(), &SilentReporter).unwrap_err();

    assert!(
        matches!(err, Error::PrefilterTimeout { attempts: 2 }),
        "unexpected error: {}",
        err
    );
    assert_eq!(hasher.calls(), 0);
}

#[test]
fn test_hashes_are_memoized_across_batches() {
    let (engine, hasher) = engine();
    let first = engine
        .ingest(
            vec![file("a.txt", 1, "x", b"payload"), file("a.txt", 1, "x", b"payload")],
            &SilentReporter,
        )
        .unwrap()
        .added;
    engine.verify(&CancelToken::new(), &SilentReporter).unwrap();
    assert_eq!(hasher.calls(), 2);

    let second = engine
        .ingest(vec![file("a.txt", 1, "x", b"payload")], &SilentReporter)
        .unwrap()
        .added;
    let stats = engine.verify(&CancelToken::new(), &SilentReporter).unwrap();

    assert_eq!(stats.hashed, 1, "only the new file needs a digest");
    assert_eq!(hasher.calls(), 3);
    assert_eq!(status_of(&engine, first[0]), Some(Status::Primary));
    assert_eq!(status_of(&engine, first[1]), None, "redundant file was purged");
    assert_eq!(status_of(&engine, second[0]), Some(Status::Redundant));
}

#[test]
fn test_best_file_takes_over_large_groups() {
    let (engine, _) = engine();
    let ids = engine
        .ingest(
            vec![
                file("a.txt", 1, "x", b"shared"),
                file("b.txt", 1, "deep/er/folder", b"shared"),
                file("c.txt", 1, "y", b"shared"),
            ],
            &SilentReporter,
        )
        .unwrap()
        .added;

    let stats = engine.verify(&CancelToken::new(), &SilentReporter).unwrap();

    assert_eq!(stats.best_file_swaps, 1);
    assert_eq!(status_of(&engine, ids[1]), Some(Status::Primary));
    for id in [ids[0], ids[2]] {
        let state = engine.with_store(|s| s.state(id).cloned()).unwrap().unwrap();
        assert_eq!(state.status, Some(Status::Copy));
        assert_eq!(state.reference_id, Some(ids[1]));
    }
}

#[test]
fn test_cancelled_verification_keeps_statuses() {
    let (engine, hasher) = engine();
    let ids = engine
        .ingest(
            vec![file("a.txt", 1, "x", b"payload"), file("a.txt", 1, "x", b"payload")],
            &SilentReporter,
        )
        .unwrap()
        .added;

    let cancel = CancelToken::new();
    cancel.cancel();
    let err = engine.verify(&cancel, &SilentReporter).unwrap_err();

    assert!(matches!(err, Error::Cancelled));
    assert_eq!(hasher.calls(), 0);
    assert_eq!(status_of(&engine, ids[1]), Some(Status::Duplicate));
}

#[test]
fn test_spawned_verification_joins() {
    let (engine, _) = engine();
    let ids = engine
        .ingest(
            vec![file("a.txt", 1, "x", b"payload"), file("a.txt", 1, "x", b"payload")],
            &SilentReporter,
        )
        .unwrap()
        .added;

    let handle = engine.spawn_verify(Arc::new(SilentReporter)).unwrap();
    let stats = handle.join().unwrap();

    assert!(!stats.stale);
    assert_eq!(status_of(&engine, ids[1]), Some(Status::Redundant));
}
