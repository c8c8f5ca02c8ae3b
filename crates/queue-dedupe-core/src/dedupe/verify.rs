use super::best_file;
use crate::error::Error;
use crate::hasher::{ContentHash, ContentHasher, HashJob, HashPool, HashResults};
use crate::model::{FileDescriptor, FileId, Status};
use crate::progress::ProgressReporter;
use crate::queue::QueueStore;
use crate::signal::{CancelToken, PrefilterSignal};
use ahash::{AHashMap, AHashSet};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct VerifySettings {
    pub readiness_attempts: u32,
    pub readiness_backoff: Duration,
}

impl Default for VerifySettings {
    fn default() -> Self {
        Self {
            readiness_attempts: 10,
            readiness_backoff: Duration::from_millis(1000),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct VerifyStats {
    /// Comparisons that reached a verdict.
    pub verified: usize,
    /// Files hashed during this pass.
    pub hashed: usize,
    pub upgraded_to_primary: usize,
    pub redundant: usize,
    pub read_errors: usize,
    pub references_missing: usize,
    pub best_file_swaps: usize,
    /// Comparisons left undecided because hashing was cancelled.
    pub pending: usize,
    /// A prefilter pass ran while hashing; hashes were kept, verdicts were not.
    pub stale: bool,
    pub elapsed: Duration,
}

/// One comparison: `id` against the file it references.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Check {
    pub id: FileId,
    pub reference: FileId,
}

#[derive(Debug, Clone)]
pub struct VerificationPlan {
    pub generation: u64,
    /// In prefilter sorted order.
    pub checks: Vec<Check>,
    /// Distinct files without a cached hash.
    pub jobs: Vec<HashJob>,
}

/// Everything a Stage 2 pass needs besides the queue itself.
pub struct VerifyContext<'a> {
    pub signal: &'a PrefilterSignal,
    pub hasher: &'a dyn ContentHasher,
    pub pool: &'a HashPool,
    pub cancel: &'a CancelToken,
    pub reporter: &'a dyn ProgressReporter,
    pub settings: &'a VerifySettings,
}

/// Stage 2: confirm every tentative `Copy` and `Duplicate` by content hash.
///
/// The queue lock is taken twice, once to plan and once to apply. Hashing
/// happens in between without it, so batches can be ingested meanwhile; such
/// a pass is reported as stale.
pub fn verify_hashes(store: &Mutex<QueueStore>, ctx: &VerifyContext<'_>) -> Result<VerifyStats, Error> {
    let t0 = Instant::now();
    ctx.signal
        .wait(ctx.settings.readiness_attempts, ctx.settings.readiness_backoff)?;

    let mut stats = VerifyStats::default();
    let plan = {
        let mut guard = store.lock()?;
        plan(&mut guard, &mut stats)
    };

    info!(
        "Verifying {} comparisons, {} files to hash",
        plan.checks.len(),
        plan.jobs.len()
    );
    ctx.reporter.on_hash_start(plan.jobs.len());
    let results = ctx.pool.hash_all(&plan.jobs, ctx.hasher, ctx.cancel, ctx.reporter);

    {
        let mut guard = store.lock()?;
        apply(&mut guard, &plan, results, &mut stats);
    }

    stats.elapsed = t0.elapsed();
    ctx.reporter
        .on_verify_complete(stats.verified, stats.elapsed.as_secs_f64());
    info!(
        "Verification complete: {} verified, {} hashed, {} promoted, {} redundant, {} read errors, {} swaps in {:.2}s",
        stats.verified,
        stats.hashed,
        stats.upgraded_to_primary,
        stats.redundant,
        stats.read_errors,
        stats.best_file_swaps,
        stats.elapsed.as_secs_f64(),
    );

    if ctx.cancel.is_cancelled() {
        warn!("Verification cancelled, {} comparisons left pending", stats.pending);
        return Err(Error::Cancelled);
    }
    Ok(stats)
}

/// Collect the comparisons and the hashing work for the current sorted order.
///
/// References that no longer resolve to a live file are fixed here: a
/// redundant reference is replaced by the file it duplicated, anything else
/// promotes the dependent file to `Primary`.
pub fn plan(store: &mut QueueStore, stats: &mut VerifyStats) -> VerificationPlan {
    let mut checks = Vec::new();
    let mut jobs = Vec::new();
    let mut queued: AHashSet<FileId> = AHashSet::new();

    let order = store.sorted_order().to_vec();
    for id in order {
        let Some(entry) = store.get(id) else { continue };
        let state = &entry.state;
        if !matches!(state.status, Some(Status::Copy) | Some(Status::Duplicate)) {
            continue;
        }

        let resolved = state
            .reference_id
            .and_then(|reference| resolve_reference(store, id, reference));

        let Some(reference) = resolved else {
            let name = entry.descriptor.name.clone();
            let missing = state.reference_id;
            if let Some(state) = store.state_mut(id) {
                state.mark_primary();
            }
            stats.references_missing += 1;
            stats.upgraded_to_primary += 1;
            warn!(id = %id, name = %name, reference = ?missing, "reference missing, promoted to primary");
            continue;
        };

        if state.reference_id != Some(reference) {
            if let Some(state) = store.state_mut(id) {
                state.reference_id = Some(reference);
            }
        }

        for side in [id, reference] {
            let Some(entry) = store.get(side) else { continue };
            if entry.state.content_hash.is_none() && queued.insert(side) {
                jobs.push(HashJob {
                    id: side,
                    source: entry.descriptor.source.clone(),
                });
            }
        }
        checks.push(Check { id, reference });
    }

    VerificationPlan {
        generation: store.generation(),
        checks,
        jobs,
    }
}

/// Follow redundant references to a live file. `None` when the chain ends
/// at nothing, at an unreadable file or back at `id`.
fn resolve_reference(store: &QueueStore, id: FileId, reference: FileId) -> Option<FileId> {
    let mut current = reference;
    for _ in 0..=store.len() {
        if current == id {
            return None;
        }
        let state = store.state(current)?;
        match state.status {
            Some(Status::Redundant) => current = state.reference_id?,
            Some(Status::ReadError) | None => return None,
            Some(_) => return Some(current),
        }
    }
    None
}

/// Store the hashes and, unless the plan went stale, settle every check.
pub fn apply(store: &mut QueueStore, plan: &VerificationPlan, results: HashResults, stats: &mut VerifyStats) {
    for (id, result) in results {
        let Some(entry) = store.get_mut(id) else { continue };
        match result {
            Ok(hash) => {
                entry.state.content_hash = Some(hash);
                stats.hashed += 1;
            }
            Err(e) => {
                entry.state.mark_read_error();
                stats.read_errors += 1;
                error!(id = %id, name = %entry.descriptor.name, "unreadable, marked read-error: {}", e);
            }
        }
    }

    if store.generation() != plan.generation {
        stats.stale = true;
        info!(
            "Queue changed during hashing (generation {} -> {}), verdicts deferred",
            plan.generation,
            store.generation()
        );
        return;
    }

    for check in &plan.checks {
        settle(store, *check, stats);
    }

    consolidate(store, stats);
}

fn settle(store: &mut QueueStore, check: Check, stats: &mut VerifyStats) {
    let Check { id, reference } = check;
    let Some(entry) = store.get(id) else { return };
    let status = entry.state.status;
    if !matches!(status, Some(Status::Copy) | Some(Status::Duplicate)) {
        return;
    }
    let name = entry.descriptor.name.clone();
    let own_hash = entry.state.content_hash.clone();

    let (reference_status, reference_hash) = match store.state(reference) {
        Some(state) => (state.status, state.content_hash.clone()),
        None => (None, None),
    };

    if matches!(reference_status, Some(Status::ReadError) | None) {
        if let Some(state) = store.state_mut(id) {
            state.mark_primary();
        }
        stats.upgraded_to_primary += 1;
        stats.references_missing += 1;
        stats.verified += 1;
        warn!(id = %id, name = %name, reference = %reference, "reference unreadable, promoted to primary");
        return;
    }

    let (Some(own_hash), Some(reference_hash)) = (own_hash, reference_hash) else {
        stats.pending += 1;
        debug!(id = %id, reference = %reference, "hash unavailable, status kept");
        return;
    };

    // A predecessor settled as redundant earlier in this pass is about to be
    // purged; hang the file on whatever the predecessor duplicated.
    let live_reference = if reference_status == Some(Status::Redundant) {
        resolve_reference(store, id, reference)
    } else {
        Some(reference)
    };

    let Some(state) = store.state_mut(id) else { return };
    stats.verified += 1;

    if let Some(live) = live_reference.filter(|&live| live != reference) {
        state.reference_id = Some(live);
    }

    if own_hash != reference_hash {
        state.mark_primary();
        state.folder_path_reference = None;
        stats.upgraded_to_primary += 1;
        debug!(id = %id, name = %name, reference = %reference, "hash mismatch, promoted to primary");
    } else if status == Some(Status::Duplicate) {
        state.set_status(Status::Redundant);
        stats.redundant += 1;
        debug!(id = %id, name = %name, reference = %reference, hash = %own_hash, "hash match, redundant");
    } else {
        debug!(id = %id, name = %name, reference = %reference, "hash match, copy confirmed");
    }
}

/// Re-elect the primary of every confirmed content group with more than two
/// members, using the best-file ordering.
pub fn consolidate(store: &mut QueueStore, stats: &mut VerifyStats) {
    let swaps: Vec<(FileId, FileId, Vec<FileId>)> = {
        let mut groups: AHashMap<FileId, Vec<FileId>> = AHashMap::new();
        for entry in store.entries() {
            if !entry.state.is(Status::Copy) {
                continue;
            }
            if let Some(primary) = confirmed_primary(store, entry.descriptor.id) {
                groups.entry(primary).or_default().push(entry.descriptor.id);
            }
        }

        let mut swaps = Vec::new();
        for (primary, copies) in groups {
            if copies.len() < 2 {
                continue;
            }
            let members: Vec<&FileDescriptor> = std::iter::once(primary)
                .chain(copies.iter().copied())
                .filter_map(|id| store.descriptor(id))
                .collect();
            if let Some(winner) = best_file::select_best(&members) {
                if winner.id != primary {
                    swaps.push((primary, winner.id, copies));
                }
            }
        }
        swaps
    };

    for (previous, winner, copies) in swaps {
        if let Some(state) = store.state_mut(winner) {
            state.mark_primary();
        }
        if let Some(state) = store.state_mut(previous) {
            state.mark_copy(winner);
        }
        for copy in copies.into_iter().filter(|&c| c != winner) {
            if let Some(state) = store.state_mut(copy) {
                state.reference_id = Some(winner);
            }
        }
        stats.best_file_swaps += 1;
        debug!(previous = %previous, winner = %winner, "best file takes over as primary");
    }
}

/// The primary a hash-confirmed copy ultimately shares content with.
fn confirmed_primary(store: &QueueStore, copy: FileId) -> Option<FileId> {
    let hash: &ContentHash = store.state(copy)?.content_hash.as_ref()?;
    let mut current = store.state(copy)?.reference_id?;
    for _ in 0..store.len() {
        let state = store.state(current)?;
        if state.content_hash.as_ref() != Some(hash) {
            return None;
        }
        match state.status {
            Some(Status::Primary) => return Some(current),
            Some(Status::Copy) => current = state.reference_id?,
            _ => return None,
        }
    }
    None
}
