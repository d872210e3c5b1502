// Ostinato Digest
//
// Library-wide analysis shared by every craft worker. A digest reads one
// immutable content snapshot and produces a reusable summary: which
// chord progressions the library leans on, an order-N Markov model of
// how its harmony moves (forward and in reverse), and where every meme
// appears. Digests are cached by snapshot content hash, so workers on
// the same library pay for each computation once.
//
// Architecture:
// - progression.rs: delta|form chord descriptors, progression equivalence,
//   redundancy, and splice-point scoring between two chord walks
// - markov.rs: order-N forward/reverse chord chains with weighted-lottery
//   sampling
// - chords.rs: distinct-progression digest with usage scoring and
//   redundant-subset pruning
// - memes.rs: meme -> program/binding/instrument usage index
// - cache.rs: bounded single-flight cache with expiry and refresh-ahead
// - hub.rs: one handle bundling the per-kind caches
//
// Digest contents depend only on snapshot contents; sampling order is
// deterministic for a seeded RNG.

pub mod cache;
pub mod chords;
pub mod error;
pub mod hub;
pub mod markov;
pub mod memes;
pub mod progression;

pub use cache::{CacheConfig, DigestCache};
pub use chords::{ChordProgressionDigest, ProgressionItem};
pub use error::DigestError;
pub use hub::{DigestHub, DigestParams};
pub use markov::{ChordMarkovDigest, ChordMarkovNode, MarkovOutcome, precedent_key};
pub use memes::{MemeDigest, MemeUsage};
pub use progression::{
    ChordNode, ChordProgression, SpliceChoice, best_splice, is_redundant_subset,
};
