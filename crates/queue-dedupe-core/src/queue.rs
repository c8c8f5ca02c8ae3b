use crate::model::{ClassificationState, ClassifiedFile, FileDescriptor, FileId, NewFile, Status};
use ahash::AHashMap;

/// A queued file and its classification.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub descriptor: FileDescriptor,
    pub state: ClassificationState,
}

/// Arena of queued files, indexed by id, in insertion order.
///
/// Holds algorithm state only. Presentation goes through [`ClassifiedFile`].
#[derive(Debug, Default)]
pub struct QueueStore {
    entries: Vec<QueueEntry>,
    index: AHashMap<FileId, usize>,
    sorted: Vec<FileId>,
    next_id: u64,
    next_batch: u64,
    generation: u64,
}

impl QueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append a batch with no classification. Returns the batch order and the
    /// ids assigned, in input order.
    pub fn push_batch(&mut self, files: Vec<NewFile>) -> (u64, Vec<FileId>) {
        self.next_batch += 1;
        let batch_order = self.next_batch;
        let mut ids = Vec::with_capacity(files.len());

        for (batch_index, file) in files.into_iter().enumerate() {
            self.next_id += 1;
            let id = FileId(self.next_id);
            let descriptor = FileDescriptor {
                id,
                name: file.name,
                size: file.size,
                modified_at: file.modified_at,
                folder_path: file.folder_path,
                source: file.source,
                batch_order,
                batch_index,
            };
            self.index.insert(id, self.entries.len());
            self.entries.push(QueueEntry {
                descriptor,
                state: ClassificationState::default(),
            });
            ids.push(id);
        }

        (batch_order, ids)
    }

    pub fn contains(&self, id: FileId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn get(&self, id: FileId) -> Option<&QueueEntry> {
        self.index.get(&id).map(|&pos| &self.entries[pos])
    }

    pub fn get_mut(&mut self, id: FileId) -> Option<&mut QueueEntry> {
        match self.index.get(&id) {
            Some(&pos) => Some(&mut self.entries[pos]),
            None => None,
        }
    }

    pub fn descriptor(&self, id: FileId) -> Option<&FileDescriptor> {
        self.get(id).map(|e| &e.descriptor)
    }

    pub fn state(&self, id: FileId) -> Option<&ClassificationState> {
        self.get(id).map(|e| &e.state)
    }

    pub fn state_mut(&mut self, id: FileId) -> Option<&mut ClassificationState> {
        self.get_mut(id).map(|e| &mut e.state)
    }

    pub fn status(&self, id: FileId) -> Option<Status> {
        self.state(id).and_then(|s| s.status)
    }

    pub fn entries(&self) -> impl Iterator<Item = &QueueEntry> {
        self.entries.iter()
    }

    pub(crate) fn entries_mut(&mut self) -> &mut [QueueEntry] {
        &mut self.entries
    }

    /// Position of an entry in [`Self::entries`].
    pub(crate) fn position(&self, id: FileId) -> Option<usize> {
        self.index.get(&id).copied()
    }

    /// True once any file carries a classification.
    pub fn has_classified(&self) -> bool {
        self.entries.iter().any(|e| e.state.status.is_some())
    }

    /// Remove every entry matching `predicate`, returning the removed entries.
    pub fn remove_where(&mut self, predicate: impl Fn(&QueueEntry) -> bool) -> Vec<QueueEntry> {
        let (removed, kept): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.entries).into_iter().partition(|e| predicate(e));

        self.entries = kept;
        if !removed.is_empty() {
            self.rebuild_index();
            let index = &self.index;
            self.sorted.retain(|id| index.contains_key(id));
        }
        removed
    }

    fn rebuild_index(&mut self) {
        self.index = self
            .entries
            .iter()
            .enumerate()
            .map(|(pos, e)| (e.descriptor.id, pos))
            .collect();
    }

    /// Order produced by the last prefilter pass.
    pub fn sorted_order(&self) -> &[FileId] {
        &self.sorted
    }

    pub(crate) fn set_sorted_order(&mut self, order: Vec<FileId>) {
        self.sorted = order;
    }

    /// Incremented by every prefilter pass.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn bump_generation(&mut self) {
        self.generation += 1;
    }

    pub fn count_status(&self, status: Status) -> usize {
        self.entries.iter().filter(|e| e.state.is(status)).count()
    }

    pub fn snapshot(&self) -> Vec<ClassifiedFile> {
        self.entries
            .iter()
            .map(|e| ClassifiedFile::project(&e.descriptor, &e.state))
            .collect()
    }
}
