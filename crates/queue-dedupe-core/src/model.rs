use crate::hasher::ContentHash;
use crate::source::{ByteSource, FileSource};
use serde::Serialize;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::UNIX_EPOCH;

/// Engine-assigned identifier of a queued file. Monotonic for the life of a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct FileId(pub u64);

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Classification of a queued file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    /// Unique content; its bytes get uploaded.
    Primary,
    /// Same content as its reference but with metadata worth keeping.
    Copy,
    /// Same content and metadata as its reference, pending hash confirmation.
    Duplicate,
    /// Hash-confirmed duplicate, purged by the next prefilter pass.
    Redundant,
    /// The bytes could not be read.
    ReadError,
}

impl Status {
    pub fn can_upload(self) -> bool {
        matches!(self, Status::Primary | Status::Copy)
    }

    /// Copies and duplicates are the only statuses hash verification looks at.
    pub fn needs_verification(self) -> bool {
        matches!(self, Status::Copy | Status::Duplicate)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Primary => "primary",
            Status::Copy => "copy",
            Status::Duplicate => "duplicate",
            Status::Redundant => "redundant",
            Status::ReadError => "read-error",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A file handed to the engine by the file-selection side.
#[derive(Debug, Clone)]
pub struct NewFile {
    pub name: String,
    pub size: u64,
    /// Milliseconds since the Unix epoch.
    pub modified_at: i64,
    pub folder_path: String,
    pub source: Arc<dyn ByteSource>,
}

impl NewFile {
    pub fn new(
        name: impl Into<String>,
        size: u64,
        modified_at: i64,
        folder_path: impl Into<String>,
        source: Arc<dyn ByteSource>,
    ) -> Self {
        Self {
            name: name.into(),
            size,
            modified_at,
            folder_path: folder_path.into(),
            source,
        }
    }

    /// Build a record for a file on disk. Reads metadata only.
    pub fn from_path(path: &Path, folder_path: impl Into<String>) -> io::Result<Self> {
        let metadata = fs::metadata(path)?;

        let modified_at = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);

        let name = path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Self {
            name,
            size: metadata.len(),
            modified_at,
            folder_path: folder_path.into(),
            source: Arc::new(FileSource::new(path)),
        })
    }
}

/// The unit of work: a queued file and its identity fields.
#[derive(Debug, Clone)]
pub struct FileDescriptor {
    pub id: FileId,
    pub name: String,
    pub size: u64,
    pub modified_at: i64,
    pub folder_path: String,
    pub source: Arc<dyn ByteSource>,
    /// Which ingest call produced this file.
    pub batch_order: u64,
    /// Position of the file inside its batch.
    pub batch_index: usize,
}

impl FileDescriptor {
    /// Total selection order across batches.
    pub fn insertion_order(&self) -> (u64, usize) {
        (self.batch_order, self.batch_index)
    }
}

/// Mutable classification owned by the engine, one per descriptor.
#[derive(Debug, Clone, Default)]
pub struct ClassificationState {
    pub status: Option<Status>,
    pub can_upload: bool,
    pub reference_id: Option<FileId>,
    pub content_hash: Option<ContentHash>,
    pub folder_path_reference: Option<String>,
}

impl ClassificationState {
    pub fn is(&self, status: Status) -> bool {
        self.status == Some(status)
    }

    pub fn set_status(&mut self, status: Status) {
        self.status = Some(status);
        self.can_upload = status.can_upload();
    }

    pub fn mark_primary(&mut self) {
        self.set_status(Status::Primary);
        self.reference_id = None;
    }

    pub fn mark_copy(&mut self, reference: FileId) {
        self.set_status(Status::Copy);
        self.reference_id = Some(reference);
    }

    pub fn mark_duplicate(&mut self, reference: FileId) {
        self.set_status(Status::Duplicate);
        self.reference_id = Some(reference);
    }

    pub fn mark_read_error(&mut self) {
        self.set_status(Status::ReadError);
    }

    /// Drop everything a prefilter pass recomputes. The cached hash survives.
    pub fn reset_classification(&mut self) {
        self.status = None;
        self.can_upload = false;
        self.reference_id = None;
        self.folder_path_reference = None;
    }
}

/// What the upload side should do with a classified file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum UploadAction {
    /// Upload the bytes.
    Upload,
    /// Persist metadata pointing at the reference's uploaded content.
    RecordMetadata,
    /// Neither upload nor record.
    Skip,
}

impl UploadAction {
    pub fn for_status(status: Option<Status>) -> Self {
        match status {
            Some(Status::Primary) => UploadAction::Upload,
            Some(Status::Copy) => UploadAction::RecordMetadata,
            _ => UploadAction::Skip,
        }
    }
}

/// Presentation snapshot of one queued file, handed to the upload side.
#[derive(Debug, Clone, Serialize)]
pub struct ClassifiedFile {
    pub id: FileId,
    pub name: String,
    pub size: u64,
    pub modified_at: i64,
    pub folder_path: String,
    pub batch_order: u64,
    pub status: Option<Status>,
    pub can_upload: bool,
    pub reference_id: Option<FileId>,
    pub content_hash: Option<String>,
    pub folder_path_reference: Option<String>,
    pub action: UploadAction,
}

impl ClassifiedFile {
    pub fn project(descriptor: &FileDescriptor, state: &ClassificationState) -> Self {
        Self {
            id: descriptor.id,
            name: descriptor.name.clone(),
            size: descriptor.size,
            modified_at: descriptor.modified_at,
            folder_path: descriptor.folder_path.clone(),
            batch_order: descriptor.batch_order,
            status: state.status,
            can_upload: state.can_upload,
            reference_id: state.reference_id,
            content_hash: state.content_hash.as_ref().map(|h| h.as_str().to_string()),
            folder_path_reference: state.folder_path_reference.clone(),
            action: UploadAction::for_status(state.status),
        }
    }
}
