// Craft-pass errors. A craft error aborts the pass before commit, so a
// failed segment never exposes partial children; content-quality gaps
// (no matching instrument, no matching audio) are logged warnings, not
// errors, and the pass completes without the affected rows.

use ostinato_content::{SegmentId, StoreError};
use ostinato_digest::DigestError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CraftError {
    /// The direct predecessor exists but was never crafted. Fatal:
    /// raised before any writes.
    #[error("segment {0} follows an uncrafted predecessor")]
    DanglingSegment(SegmentId),

    /// No macro program matches the meme constraints for this segment.
    #[error("no macro program available for segment {0}")]
    NoMacroProgramAvailable(SegmentId),

    /// No main program matches the active macro memes.
    #[error("no main program available for segment {0}")]
    NoMainProgramAvailable(SegmentId),

    /// A content reference led nowhere: contract violation in the
    /// snapshot or the draft.
    #[error("missing entity: {0}")]
    MissingEntity(String),

    #[error(transparent)]
    Digest(#[from] DigestError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
