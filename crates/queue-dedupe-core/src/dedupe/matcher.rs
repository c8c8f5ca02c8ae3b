use super::compare::{compare_folder_paths, normalize_folder_path, MetadataKey, PathRelation};
use crate::model::{FileDescriptor, FileId, Status};
use crate::queue::QueueStore;
use ahash::{AHashMap, AHashSet};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// How a new file relates to the best existing metadata match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// Same folder path: the new file duplicates the existing one.
    Duplicate,
    /// The new file's folder is more specific: it becomes primary and the
    /// existing file is demoted.
    PromoteNew,
    /// The existing file's folder is more specific: the new file duplicates it.
    KeepExisting,
    /// Same metadata, unrelated folders.
    Copy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Promotion {
    pub demoted: FileId,
    pub promoted: FileId,
}

#[derive(Debug, Clone, Default)]
pub struct MatchOutcome {
    pub ready: Vec<FileId>,
    /// `(new file, existing file it duplicates)`
    pub duplicates: Vec<(FileId, FileId)>,
    /// `(new file, existing file it copies)`
    pub copies: Vec<(FileId, FileId)>,
    pub promotions: Vec<Promotion>,
    pub elapsed: Duration,
}

/// Pick the existing file a new file should be compared against.
///
/// An identical folder path wins immediately. Otherwise the hierarchy match
/// sharing the longest path wins. With no hierarchy match the first
/// candidate is returned as a copy.
pub fn find_best_match<'a>(
    new_file: &FileDescriptor,
    candidates: &[&'a FileDescriptor],
) -> Option<(&'a FileDescriptor, MatchKind)> {
    let mut best: Option<(&'a FileDescriptor, MatchKind, usize)> = None;

    for &existing in candidates {
        let (kind, score) = match compare_folder_paths(&new_file.folder_path, &existing.folder_path) {
            PathRelation::Identical => return Some((existing, MatchKind::Duplicate)),
            PathRelation::FirstMoreSpecific => (
                MatchKind::PromoteNew,
                normalize_folder_path(&existing.folder_path).len(),
            ),
            PathRelation::SecondMoreSpecific => (
                MatchKind::KeepExisting,
                normalize_folder_path(&new_file.folder_path).len(),
            ),
            PathRelation::Unrelated => continue,
        };

        if best.map_or(true, |(_, _, best_score)| score > best_score) {
            best = Some((existing, kind, score));
        }
    }

    match best {
        Some((file, kind, _)) => Some((file, kind)),
        None => candidates.first().map(|&file| (file, MatchKind::Copy)),
    }
}

/// Report how a newly pushed batch relates to the already-classified queue.
///
/// The store is only read. Stage 1 runs over the whole queue right after and
/// owns every status; the outcome is the batch-level view of the same
/// decisions, for logging and for callers that track what a batch changed.
///
/// Existing files are indexed once by size and then by metadata key, so each
/// new file costs one lookup instead of a scan of the queue. Redundant and
/// unreadable files are not indexed. New files are not compared with each
/// other here.
pub fn match_batch(store: &QueueStore, new_ids: &[FileId]) -> MatchOutcome {
    let t0 = Instant::now();
    let new_set: AHashSet<FileId> = new_ids.iter().copied().collect();

    let mut by_size: AHashMap<u64, Vec<&FileDescriptor>> = AHashMap::new();
    for entry in store.entries() {
        if new_set.contains(&entry.descriptor.id) {
            continue;
        }
        match entry.state.status {
            Some(Status::Redundant) | Some(Status::ReadError) | None => continue,
            _ => {}
        }
        by_size.entry(entry.descriptor.size).or_default().push(&entry.descriptor);
    }

    let mut by_metadata: AHashMap<u64, AHashMap<MetadataKey<'_>, Vec<&FileDescriptor>>> =
        AHashMap::with_capacity(by_size.len());
    for (size, files) in &by_size {
        let index = by_metadata.entry(*size).or_default();
        for &file in files {
            index.entry(MetadataKey::of(file)).or_default().push(file);
        }
    }

    let mut outcome = MatchOutcome::default();

    for new_file in new_ids.iter().filter_map(|&id| store.descriptor(id)) {
        let new_id = new_file.id;
        let matched = by_metadata
            .get(&new_file.size)
            .and_then(|index| index.get(&MetadataKey::of(new_file)))
            .and_then(|candidates| find_best_match(new_file, candidates));

        match matched {
            None => {
                debug!(id = %new_id, "no existing match, ready");
                outcome.ready.push(new_id);
            }
            Some((existing, MatchKind::Duplicate)) => {
                debug!(id = %new_id, reference = %existing.id, "matches existing file, duplicate");
                outcome.duplicates.push((new_id, existing.id));
            }
            Some((existing, MatchKind::KeepExisting)) => {
                debug!(id = %new_id, reference = %existing.id, "existing file more specific, duplicate");
                outcome.duplicates.push((new_id, existing.id));
            }
            Some((existing, MatchKind::PromoteNew)) => {
                debug!(id = %new_id, demoted = %existing.id, "new file more specific, promoted");
                outcome.ready.push(new_id);
                outcome.promotions.push(Promotion {
                    demoted: existing.id,
                    promoted: new_id,
                });
            }
            Some((existing, MatchKind::Copy)) => {
                debug!(id = %new_id, reference = %existing.id, "unrelated folders, copy");
                outcome.copies.push((new_id, existing.id));
            }
        }
    }

    outcome.elapsed = t0.elapsed();
    info!(
        "Batch match: {} ready, {} duplicates, {} copies, {} promotions in {:.2}ms",
        outcome.ready.len(),
        outcome.duplicates.len(),
        outcome.copies.len(),
        outcome.promotions.len(),
        outcome.elapsed.as_secs_f64() * 1000.0,
    );

    outcome
}
