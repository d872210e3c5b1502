// Digest failures.
//
// Digest knowledge is foundational to craft: a failed computation fails
// the whole craft pass, and the cache propagates the same error to every
// caller that was waiting on the computation. Errors are Clone for that
// reason.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DigestError {
    /// A sequence chord name the chord parser rejects. Content contract
    /// violation; nothing is cached.
    #[error("unparseable chord name: {0:?}")]
    UnparseableChord(String),
    /// A cache lock was poisoned by a panicking holder.
    #[error("digest cache lock poisoned")]
    Poisoned,
}
