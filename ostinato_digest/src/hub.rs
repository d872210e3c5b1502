// One handle over the per-kind digest caches, keyed by snapshot content
// hash. Craft workers share a hub; each digest kind caches independently
// so a meme lookup never waits behind a Markov computation.

use crate::cache::{CacheConfig, DigestCache};
use crate::chords::ChordProgressionDigest;
use crate::error::DigestError;
use crate::markov::ChordMarkovDigest;
use crate::memes::MemeDigest;
use ostinato_content::ContentSnapshot;
use std::sync::Arc;

/// Digest computation parameters, fixed at hub construction.
#[derive(Clone, Copy, Debug)]
pub struct DigestParams {
    /// Markov precedent window length.
    pub markov_order: usize,
    /// Longest chord window the progression digest considers.
    pub progression_max_length: usize,
    /// How much longer a covering progression may be when pruning.
    pub redundancy_threshold: usize,
    /// Pruned progressions at least this long re-home their usages.
    pub preserve_length_min: usize,
}

impl Default for DigestParams {
    fn default() -> Self {
        DigestParams {
            markov_order: 2,
            progression_max_length: 5,
            redundancy_threshold: 2,
            preserve_length_min: 3,
        }
    }
}

pub struct DigestHub {
    params: DigestParams,
    markov: DigestCache<ChordMarkovDigest>,
    progressions: DigestCache<ChordProgressionDigest>,
    memes: DigestCache<MemeDigest>,
}

impl DigestHub {
    pub fn new(params: DigestParams, cache: CacheConfig) -> Self {
        DigestHub {
            params,
            markov: DigestCache::new(cache),
            progressions: DigestCache::new(cache),
            memes: DigestCache::new(cache),
        }
    }

    pub fn params(&self) -> &DigestParams {
        &self.params
    }

    /// Order-N chord chains for this snapshot.
    pub fn markov(
        &self,
        snapshot: &ContentSnapshot,
    ) -> Result<Arc<ChordMarkovDigest>, DigestError> {
        let key = snapshot.content_hash();
        self.markov.get_or_compute(&key, || {
            log::debug!("computing chord markov digest for {key}");
            ChordMarkovDigest::compute(snapshot, self.params.markov_order)
        })
    }

    /// Scored, pruned chord progressions for this snapshot.
    pub fn progressions(
        &self,
        snapshot: &ContentSnapshot,
    ) -> Result<Arc<ChordProgressionDigest>, DigestError> {
        let key = snapshot.content_hash();
        self.progressions.get_or_compute(&key, || {
            log::debug!("computing chord progression digest for {key}");
            ChordProgressionDigest::compute(
                snapshot,
                self.params.progression_max_length,
                self.params.redundancy_threshold,
                self.params.preserve_length_min,
            )
        })
    }

    /// Meme usage index for this snapshot.
    pub fn memes(&self, snapshot: &ContentSnapshot) -> Result<Arc<MemeDigest>, DigestError> {
        let key = snapshot.content_hash();
        self.memes.get_or_compute(&key, || {
            log::debug!("computing meme digest for {key}");
            Ok(MemeDigest::compute(snapshot))
        })
    }
}

impl Default for DigestHub {
    fn default() -> Self {
        DigestHub::new(DigestParams::default(), CacheConfig::default())
    }
}
