use crate::model::FileDescriptor;
use std::cmp::Ordering;

/// Relationship between two folder paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathRelation {
    Identical,
    /// The first path nests the second one and is longer.
    FirstMoreSpecific,
    /// The second path nests the first one and is longer.
    SecondMoreSpecific,
    Unrelated,
}

/// `(name, size, modified_at)`: buckets candidates before any hashing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MetadataKey<'a> {
    pub name: &'a str,
    pub size: u64,
    pub modified_at: i64,
}

impl<'a> MetadataKey<'a> {
    pub fn of(descriptor: &'a FileDescriptor) -> Self {
        Self {
            name: &descriptor.name,
            size: descriptor.size,
            modified_at: descriptor.modified_at,
        }
    }
}

pub fn same_metadata(a: &FileDescriptor, b: &FileDescriptor) -> bool {
    MetadataKey::of(a) == MetadataKey::of(b)
}

/// Non-empty segments of a folder path. Both separators are accepted.
pub fn path_segments(path: &str) -> Vec<&str> {
    path.split(['/', '\\']).filter(|s| !s.is_empty()).collect()
}

/// Canonical form of a folder path: `/` separators, no empty segments, no
/// trailing separator. A leading separator is kept.
pub fn normalize_folder_path(path: &str) -> String {
    let joined = path_segments(path).join("/");
    if path.starts_with(['/', '\\']) {
        format!("/{}", joined)
    } else {
        joined
    }
}

/// Compare two folder paths by hierarchy.
///
/// A path is more specific than another when it has more segments and the
/// other path lines up with it on whole segments, either as its tail
/// (`archive/docs` over `docs`) or as its head (`/docs/2024` over `/docs`).
/// The empty path is the root, so every other path is more specific than it.
pub fn compare_folder_paths(first: &str, second: &str) -> PathRelation {
    let a = path_segments(first);
    let b = path_segments(second);

    if a == b {
        PathRelation::Identical
    } else if nests(&a, &b) {
        PathRelation::FirstMoreSpecific
    } else if nests(&b, &a) {
        PathRelation::SecondMoreSpecific
    } else {
        PathRelation::Unrelated
    }
}

fn nests(longer: &[&str], shorter: &[&str]) -> bool {
    longer.len() > shorter.len() && (longer.ends_with(shorter) || longer.starts_with(shorter))
}

/// Stage 1 sort order: size, then modification time, then name, then the
/// order the files were selected in.
pub fn prefilter_order(a: &FileDescriptor, b: &FileDescriptor) -> Ordering {
    a.size
        .cmp(&b.size)
        .then(a.modified_at.cmp(&b.modified_at))
        .then_with(|| a.name.cmp(&b.name))
        .then_with(|| a.insertion_order().cmp(&b.insertion_order()))
}
