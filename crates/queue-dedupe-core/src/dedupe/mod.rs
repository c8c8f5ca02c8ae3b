pub mod best_file;
pub mod compare;
pub mod lifecycle;
pub mod matcher;
pub mod prefilter;
pub mod verify;

pub use matcher::{MatchKind, MatchOutcome, Promotion};
pub use prefilter::PrefilterStats;
pub use verify::{VerifySettings, VerifyStats};
