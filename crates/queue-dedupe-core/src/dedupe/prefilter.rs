use super::compare::{compare_folder_paths, prefilter_order, same_metadata, PathRelation};
use super::lifecycle;
use crate::model::{FileId, Status};
use crate::queue::{QueueEntry, QueueStore};
use ahash::AHashMap;
use std::time::{Duration, Instant};
use tracing::{debug, info};

#[derive(Debug, Clone, Default)]
pub struct PrefilterStats {
    pub total_files: usize,
    pub redundant_removed: usize,
    pub primary_count: usize,
    pub copy_count: usize,
    pub duplicate_count: usize,
    pub path_promotions: usize,
    pub read_errors_skipped: usize,
    pub elapsed: Duration,
}

/// Stage 1: classify every queued file from metadata alone.
///
/// 1. Purge files left `Redundant` by the previous verification
/// 2. Sort by (size, modified time, name, selection order)
/// 3. Walk the sorted list once, comparing each file with its predecessor
///
/// No bytes are read. Files in `ReadError` keep their status and take no
/// part in the comparison. The sorted order is stored for Stage 2.
pub fn run_prefilter(store: &mut QueueStore) -> PrefilterStats {
    let t0 = Instant::now();
    let mut stats = PrefilterStats {
        redundant_removed: lifecycle::purge_redundant(store).len(),
        ..Default::default()
    };

    let mut candidates: Vec<&QueueEntry> = Vec::with_capacity(store.len());
    for entry in store.entries() {
        if entry.state.is(Status::ReadError) {
            stats.read_errors_skipped += 1;
        } else {
            candidates.push(entry);
        }
    }
    candidates.sort_by(|a, b| prefilter_order(&a.descriptor, &b.descriptor));
    let order: Vec<FileId> = candidates.iter().map(|e| e.descriptor.id).collect();

    let positions: Vec<usize> = order
        .iter()
        .filter_map(|&id| store.position(id))
        .collect();
    let by_id: AHashMap<FileId, usize> = order.iter().copied().zip(positions.iter().copied()).collect();

    let entries = store.entries_mut();
    for &pos in &positions {
        entries[pos].state.reset_classification();
    }
    classify_sorted(entries, &positions, &by_id, &mut stats);

    for &pos in &positions {
        match entries[pos].state.status {
            Some(Status::Primary) => stats.primary_count += 1,
            Some(Status::Copy) => stats.copy_count += 1,
            Some(Status::Duplicate) => stats.duplicate_count += 1,
            _ => {}
        }
    }

    stats.total_files = order.len();
    store.set_sorted_order(order);
    store.bump_generation();
    stats.elapsed = t0.elapsed();

    info!(
        "Prefilter complete: {} files ({} primary, {} copy, {} duplicate, {} redundant removed) in {:.2}ms",
        stats.total_files,
        stats.primary_count,
        stats.copy_count,
        stats.duplicate_count,
        stats.redundant_removed,
        stats.elapsed.as_secs_f64() * 1000.0,
    );

    stats
}

/// The sequential scan. `positions` are entry positions in sorted order.
fn classify_sorted(
    entries: &mut [QueueEntry],
    positions: &[usize],
    by_id: &AHashMap<FileId, usize>,
    stats: &mut PrefilterStats,
) {
    // Start of the current same-size run, as an index into `positions`.
    let mut run_start = 0;

    for k in 0..positions.len() {
        let cur = positions[k];
        let cur_id = entries[cur].descriptor.id;

        if k == 0 {
            entries[cur].state.mark_primary();
            debug!(id = %cur_id, name = %entries[cur].descriptor.name, "first in order, primary");
            continue;
        }

        let prev = positions[k - 1];
        if entries[cur].descriptor.size != entries[prev].descriptor.size {
            run_start = k;
            entries[cur].state.mark_primary();
            debug!(
                id = %cur_id,
                name = %entries[cur].descriptor.name,
                size = entries[cur].descriptor.size,
                "size-unique, primary"
            );
            continue;
        }

        let prev_id = entries[prev].descriptor.id;

        if !same_metadata(&entries[cur].descriptor, &entries[prev].descriptor) {
            entries[cur].state.mark_copy(prev_id);
            debug!(id = %cur_id, reference = %prev_id, "metadata differs, tentative copy");
            continue;
        }

        let relation = compare_folder_paths(
            &entries[cur].descriptor.folder_path,
            &entries[prev].descriptor.folder_path,
        );
        match relation {
            PathRelation::Identical => {
                entries[cur].state.mark_duplicate(prev_id);
                debug!(id = %cur_id, reference = %prev_id, "metadata duplicate");
            }
            PathRelation::SecondMoreSpecific => {
                let prev_path = entries[prev].descriptor.folder_path.clone();
                entries[cur].state.folder_path_reference = Some(prev_path);
                entries[cur].state.mark_duplicate(prev_id);
                debug!(id = %cur_id, reference = %prev_id, "metadata duplicate, predecessor path more specific");
            }
            PathRelation::FirstMoreSpecific => {
                let cur_path = entries[cur].descriptor.folder_path.clone();
                entries[prev].state.folder_path_reference = Some(cur_path);

                let head = run_head(entries, prev, by_id);
                let outranks_head = head == prev
                    || compare_folder_paths(
                        &entries[cur].descriptor.folder_path,
                        &entries[head].descriptor.folder_path,
                    ) == PathRelation::FirstMoreSpecific;

                if outranks_head {
                    let head_id = entries[head].descriptor.id;
                    promote_over(entries, positions, run_start, k, head);
                    stats.path_promotions += 1;
                    debug!(
                        id = %cur_id,
                        demoted = %head_id,
                        path = %entries[cur].descriptor.folder_path,
                        "path promotion, more specific folder takes over"
                    );
                } else {
                    entries[cur].state.mark_duplicate(prev_id);
                    debug!(id = %cur_id, reference = %prev_id, "metadata duplicate");
                }
            }
            PathRelation::Unrelated => {
                entries[cur].state.mark_copy(prev_id);
                debug!(id = %cur_id, reference = %prev_id, "unrelated folders, tentative copy");
            }
        }
    }
}

/// The file heading the duplicate chain `prev` belongs to: `prev` itself when
/// it is not a duplicate, otherwise the first non-duplicate reached by
/// following references back through the run.
fn run_head(entries: &[QueueEntry], prev: usize, by_id: &AHashMap<FileId, usize>) -> usize {
    let mut target = prev;
    // Bounded walk; a chain never revisits a file.
    for _ in 0..entries.len() {
        let state = &entries[target].state;
        match (state.status, state.reference_id) {
            (Some(Status::Duplicate), Some(reference)) => match by_id.get(&reference) {
                Some(&next) => target = next,
                None => break,
            },
            _ => break,
        }
    }
    target
}

/// The file at `positions[k]` takes over the role of `target`, the head of
/// its duplicate chain, which becomes its duplicate. Earlier files of the run
/// that referenced `target` now reference the new file.
fn promote_over(entries: &mut [QueueEntry], positions: &[usize], run_start: usize, k: usize, target: usize) {
    let cur = positions[k];
    let cur_id = entries[cur].descriptor.id;
    let target_id = entries[target].descriptor.id;
    let cur_path = entries[cur].descriptor.folder_path.clone();

    let inherited_status = entries[target].state.status.unwrap_or(Status::Primary);
    let inherited_reference = entries[target].state.reference_id;
    match (inherited_status, inherited_reference) {
        (Status::Copy, Some(reference)) => entries[cur].state.mark_copy(reference),
        _ => entries[cur].state.mark_primary(),
    }

    entries[target].state.mark_duplicate(cur_id);
    entries[target].state.folder_path_reference = Some(cur_path);

    for &pos in &positions[run_start..k] {
        if pos != target && entries[pos].state.reference_id == Some(target_id) {
            entries[pos].state.reference_id = Some(cur_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NewFile;
    use crate::source::MemorySource;
    use std::sync::Arc;

    fn file(name: &str, size: u64, modified_at: i64, folder: &str) -> NewFile {
        NewFile::new(
            name,
            size,
            modified_at,
            folder,
            Arc::new(MemorySource::new(vec![0u8; size as usize])),
        )
    }

    #[test]
    fn test_duplicate_references_its_predecessor() {
        let mut store = QueueStore::new();
        let (_, ids) = store.push_batch(vec![
            file("a", 5, 1, "x"),
            file("a", 5, 1, "x"),
            file("a", 5, 1, "x"),
        ]);
        run_prefilter(&mut store);

        assert_eq!(store.status(ids[0]), Some(Status::Primary));
        assert_eq!(store.state(ids[1]).unwrap().reference_id, Some(ids[0]));
        assert_eq!(store.status(ids[2]), Some(Status::Duplicate));
        assert_eq!(
            store.state(ids[2]).unwrap().reference_id,
            Some(ids[1]),
            "third file should be compared with the file right before it"
        );
    }

    #[test]
    fn test_copy_after_duplicate_references_predecessor() {
        let mut store = QueueStore::new();
        let (_, ids) = store.push_batch(vec![
            file("a", 5, 1, "x"),
            file("a", 5, 1, "x"),
            file("a", 5, 2, "x"),
        ]);
        run_prefilter(&mut store);

        let copy = store.state(ids[2]).unwrap();
        assert_eq!(copy.status, Some(Status::Copy));
        assert_eq!(copy.reference_id, Some(ids[1]));
    }

    #[test]
    fn test_promotion_over_deeper_chain() {
        let mut store = QueueStore::new();
        let (_, ids) = store.push_batch(vec![
            file("a", 5, 1, "/docs"),
            file("a", 5, 1, "/docs"),
            file("a", 5, 1, "/docs"),
            file("a", 5, 1, "/docs/2024"),
        ]);
        let stats = run_prefilter(&mut store);

        assert_eq!(stats.path_promotions, 1);
        assert_eq!(store.status(ids[3]), Some(Status::Primary));
        assert_eq!(store.state(ids[0]).unwrap().reference_id, Some(ids[3]));
        assert_eq!(store.state(ids[1]).unwrap().reference_id, Some(ids[3]));
        assert_eq!(store.state(ids[2]).unwrap().reference_id, Some(ids[1]));
    }

    #[test]
    fn test_promotion_retargets_earlier_duplicates() {
        let mut store = QueueStore::new();
        let (_, ids) = store.push_batch(vec![
            file("a", 5, 1, "/docs"),
            file("a", 5, 1, "/docs"),
            file("a", 5, 1, "/docs/2024"),
        ]);
        let stats = run_prefilter(&mut store);

        assert_eq!(stats.path_promotions, 1);
        assert_eq!(store.status(ids[2]), Some(Status::Primary));
        for id in &ids[..2] {
            let state = store.state(*id).unwrap();
            assert_eq!(state.status, Some(Status::Duplicate));
            assert_eq!(state.reference_id, Some(ids[2]));
        }
        assert_eq!(
            store.state(ids[0]).unwrap().folder_path_reference.as_deref(),
            Some("/docs/2024")
        );
    }

    #[test]
    fn test_read_errors_are_left_alone() {
        let mut store = QueueStore::new();
        let (_, ids) = store.push_batch(vec![file("a", 5, 1, "x"), file("a", 5, 1, "x")]);
        store.state_mut(ids[0]).unwrap().mark_read_error();

        let stats = run_prefilter(&mut store);
        assert_eq!(stats.read_errors_skipped, 1);
        assert_eq!(store.status(ids[0]), Some(Status::ReadError));
        assert_eq!(store.status(ids[1]), Some(Status::Primary));
        assert_eq!(store.sorted_order(), &[ids[1]]);
    }

    #[test]
    fn test_generation_advances_per_pass() {
        let mut store = QueueStore::new();
        store.push_batch(vec![file("a", 1, 1, "")]);
        let before = store.generation();
        run_prefilter(&mut store);
        run_prefilter(&mut store);
        assert_eq!(store.generation(), before + 2);
    }
}
