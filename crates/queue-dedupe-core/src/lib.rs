pub mod config;
pub mod dedupe;
pub mod engine;
pub mod error;
pub mod hasher;
pub mod model;
pub mod progress;
pub mod queue;
pub mod scanner;
pub mod signal;
pub mod source;

pub use config::AppConfig;
pub use dedupe::{MatchOutcome, PrefilterStats, VerifySettings, VerifyStats};
pub use engine::{DedupEngine, EngineSettings, IngestReport, VerifyHandle};
pub use error::Error;
pub use hasher::{ContentHash, ContentHasher, HashAlgorithm, HashError};
pub use model::{ClassifiedFile, FileId, NewFile, Status, UploadAction};
pub use progress::{ProgressReporter, SilentReporter};
pub use signal::{CancelToken, PrefilterSignal};
pub use source::{ByteSource, FileSource, MemorySource};
