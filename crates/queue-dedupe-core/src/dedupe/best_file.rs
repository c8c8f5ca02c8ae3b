use super::compare::normalize_folder_path;
use crate::model::FileDescriptor;
use std::cmp::Ordering;

/// Priority order for picking the canonical file among content-identical
/// files with different metadata. Smaller is better.
///
/// 1. earliest modification time
/// 2. longest folder path
/// 3. shortest file name
/// 4. file name, alphabetically
/// 5. selection order
pub fn compare_best(a: &FileDescriptor, b: &FileDescriptor) -> Ordering {
    a.modified_at
        .cmp(&b.modified_at)
        .then_with(|| folder_len(b).cmp(&folder_len(a)))
        .then_with(|| a.name.chars().count().cmp(&b.name.chars().count()))
        .then_with(|| a.name.cmp(&b.name))
        .then_with(|| a.insertion_order().cmp(&b.insertion_order()))
}

fn folder_len(descriptor: &FileDescriptor) -> usize {
    normalize_folder_path(&descriptor.folder_path).chars().count()
}

/// All candidates, best first.
pub fn rank<'a>(candidates: &[&'a FileDescriptor]) -> Vec<&'a FileDescriptor> {
    let mut ranked = candidates.to_vec();
    ranked.sort_by(|a, b| compare_best(a, b));
    ranked
}

pub fn select_best<'a>(candidates: &[&'a FileDescriptor]) -> Option<&'a FileDescriptor> {
    candidates.iter().copied().min_by(|a, b| compare_best(a, b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FileId;
    use crate::source::MemorySource;
    use std::sync::Arc;

    fn descriptor(id: u64, name: &str, modified_at: i64, folder: &str) -> FileDescriptor {
        FileDescriptor {
            id: FileId(id),
            name: name.to_string(),
            size: 10,
            modified_at,
            folder_path: folder.to_string(),
            source: Arc::new(MemorySource::new(vec![0u8; 10])),
            batch_order: 1,
            batch_index: id as usize,
        }
    }

    #[test]
    fn test_earliest_modification_wins() {
        let a = descriptor(1, "a.txt", 200, "deep/er/path");
        let b = descriptor(2, "b.txt", 100, "");
        assert_eq!(select_best(&[&a, &b]).unwrap().id, FileId(2));
    }

    #[test]
    fn test_longest_folder_breaks_time_tie() {
        let a = descriptor(1, "a.txt", 100, "docs");
        let b = descriptor(2, "a.txt", 100, "docs/2024");
        assert_eq!(select_best(&[&a, &b]).unwrap().id, FileId(2));
    }

    #[test]
    fn test_shortest_then_alphabetical_name() {
        let a = descriptor(1, "report-final.pdf", 100, "x");
        let b = descriptor(2, "report.pdf", 100, "y");
        let c = descriptor(3, "annual.pdf", 100, "z");
        let ranked = rank(&[&a, &b, &c]);
        let ids: Vec<FileId> = ranked.iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![FileId(3), FileId(2), FileId(1)]);
    }

    #[test]
    fn test_selection_order_is_final_tiebreak() {
        let a = descriptor(7, "same.txt", 100, "x");
        let b = descriptor(3, "same.txt", 100, "y");
        assert_eq!(select_best(&[&a, &b]).unwrap().id, FileId(3));
    }

    #[test]
    fn test_empty_candidates() {
        assert!(select_best(&[]).is_none());
    }
}
