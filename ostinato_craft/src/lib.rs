// ostinato_craft — the segment fabrication engine.
//
// Craft runs segment by segment: `craft_segment` prepares a `Fabricator`
// over one planned segment, runs the two craft halves, and lands the
// result atomically in the `SegmentStore`.
//
// Module overview:
// - `fabricator.rs`:  The per-pass context both craft halves write
//                     through; drafts reach the store only on success.
// - `foundation.rs`:  Segment kind, macro/main program selection, header
//                     values, memes, and the chord timeline.
// - `harmony.rs`:     Markov-fabricated chord progressions for mains
//                     without authored chords.
// - `arrangement.rs`: Instruments, delta windows on the macro arc, and
//                     the audio picks a mixer renders.
// - `config.rs`:      Every tunable knob, serde-loadable from JSON.
// - `error.rs`:       The craft error type.
//
// **Critical constraint: determinism.** Craft draws randomness only from
// the injected `Rng` and reads content only through the snapshot and the
// digest hub, so a (library, store, seed) triple always fabricates the
// same chain.

pub mod arrangement;
pub mod config;
pub mod error;
pub mod fabricator;
pub mod foundation;
pub mod harmony;

pub use config::CraftConfig;
pub use error::CraftError;
pub use fabricator::Fabricator;

use ostinato_content::{ContentSnapshot, SegmentId, SegmentStore};
use ostinato_digest::DigestHub;
use rand::Rng;

/// Craft one planned segment end to end and commit it.
///
/// The pass is atomic from the store's point of view: children land only
/// with `commit_crafted`. On error the segment is left in the Crafting
/// state with no children; the caller decides whether to revert it to
/// Planned and retry or retire the chain.
pub fn craft_segment(
    snapshot: &ContentSnapshot,
    store: &mut SegmentStore,
    digests: &DigestHub,
    config: &CraftConfig,
    segment_id: SegmentId,
    rng: &mut impl Rng,
) -> Result<(), CraftError> {
    let mut fab = Fabricator::prepare(snapshot, store, config, segment_id)?;
    store.begin_craft(segment_id)?;
    foundation::craft(&mut fab, digests, rng)?;
    arrangement::craft(&mut fab, rng)?;
    store.commit_crafted(fab.finish())?;
    Ok(())
}
