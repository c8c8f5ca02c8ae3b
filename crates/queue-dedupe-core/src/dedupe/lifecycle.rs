//! Two-phase cleanup of hash-confirmed duplicates.
//!
//! `Duplicate` -> (hash match) -> `Redundant` -> (next prefilter pass) -> removed.

use crate::model::Status;
use crate::queue::{QueueEntry, QueueStore};
use tracing::{debug, info};

/// Remove every redundant file from the queue. Runs first in every prefilter
/// pass, so a redundant file is never verified twice.
pub fn purge_redundant(store: &mut QueueStore) -> Vec<QueueEntry> {
    let removed = store.remove_where(|e| e.state.is(Status::Redundant));

    for entry in &removed {
        debug!(
            id = %entry.descriptor.id,
            name = %entry.descriptor.name,
            reference = ?entry.state.reference_id,
            "purged redundant file"
        );
    }
    if !removed.is_empty() {
        info!("Removed {} redundant files from previous verification", removed.len());
    }

    removed
}
