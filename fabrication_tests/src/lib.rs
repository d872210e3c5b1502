// Test harness for whole-pipeline fabrication scenarios.
//
// Wraps a real ContentSnapshot, SegmentStore, and DigestHub behind a
// seeded craft loop, so scenario tests exercise exactly the code path a
// host application runs: create a segment, craft it, inspect the
// committed rows. The only test-specific code here is the convenience
// wiring; every craft decision comes from `ostinato_craft` itself.

use ostinato_content::demo::demo_library;
use ostinato_content::{ContentSnapshot, SegmentId, SegmentStore};
use ostinato_craft::{CraftConfig, CraftError, craft_segment};
use ostinato_digest::DigestHub;
use rand::SeedableRng;
use rand::rngs::StdRng;

/// One chain under fabrication, with everything a craft pass needs.
///
/// Fields are public so scenarios can reach past the harness and assert
/// on store rows or recompute expectations from the snapshot.
pub struct FabricationHarness {
    pub snapshot: ContentSnapshot,
    pub store: SegmentStore,
    pub digests: DigestHub,
    pub config: CraftConfig,
    pub rng: StdRng,
}

impl FabricationHarness {
    /// Harness over the demo library with a seeded rng.
    pub fn new(seed: u64) -> Self {
        Self::with_content(demo_library(), seed)
    }

    /// Harness over an arbitrary library, for content-shape scenarios.
    pub fn with_content(snapshot: ContentSnapshot, seed: u64) -> Self {
        let config = CraftConfig::default();
        let digests = DigestHub::new(config.digest_params(), config.cache_config());
        FabricationHarness {
            snapshot,
            store: SegmentStore::new("test-chain"),
            digests,
            config,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Create the next segment on the chain and craft it.
    pub fn craft_next(&mut self) -> Result<SegmentId, CraftError> {
        let id = self.store.create_segment();
        craft_segment(
            &self.snapshot,
            &mut self.store,
            &self.digests,
            &self.config,
            id,
            &mut self.rng,
        )?;
        Ok(id)
    }

    /// Craft a run of segments, returning their ids in chain order.
    /// Panics on a failed pass; runs in scenarios are expected to land.
    pub fn craft_run(&mut self, count: usize) -> Vec<SegmentId> {
        (0..count)
            .map(|_| self.craft_next().expect("craft pass failed"))
            .collect()
    }
}
