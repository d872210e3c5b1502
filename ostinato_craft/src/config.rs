// Craft configuration.
//
// All tunable fabrication parameters live in `CraftConfig`, loadable from
// JSON. The craft paths read every bound and threshold from here, so the
// same build fabricates with a different musical personality per
// deployment without recompilation.
//
// **Critical constraint: determinism.** Config values feed directly into
// craft decisions; identical snapshot + store + config + seed produce an
// identical segment.

use ostinato_digest::{CacheConfig, DigestParams};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CraftConfig {
    /// Macro arc length bound in beats: the span over which voice
    /// fade-in/fade-out deltas are scheduled.
    pub macro_arc_beats: u32,

    /// Fraction of the arc span reserved for fading, both zones together;
    /// the rest is plateau.
    pub fade_zone_fraction: f64,

    /// Construction share of the fade budget, drawn uniformly per craft;
    /// deconstruction gets the rest. `(min, max)` with min >= 0.5 keeps
    /// construction at least as long as deconstruction.
    pub fade_shift_range: (f64, f64),

    /// Standard deviation (beats) of the jitter applied to each voice's
    /// scheduled delta slot.
    pub delta_jitter_beats: f64,

    /// Linear fade ramp length in beats at a delta window edge, for
    /// categories with a fade envelope.
    pub fade_ramp_beats: f64,

    /// Chord Markov precedent window length.
    pub markov_order: usize,

    /// Size bounds (chords) for a fabricated progression.
    pub progression_size_range: (usize, usize),

    /// Beats between fabricated chords.
    pub beats_per_chord: f64,

    /// Chords kept intact at each end of a fabricated progression when
    /// searching for a splice point.
    pub splice_margin: usize,

    /// Longest chord window the progression digest considers.
    pub digest_max_length: usize,

    /// Length-difference bound for redundant-progression pruning.
    pub digest_redundancy_threshold: usize,

    /// Pruned progressions at least this long re-home their usages.
    pub digest_preserve_min: usize,

    /// Digest cache capacity.
    pub cache_max_entries: usize,

    /// Seconds before a cache entry expires outright.
    pub cache_expiry_seconds: u64,

    /// Seconds before a cache entry is recomputed ahead of expiry.
    pub cache_refresh_seconds: u64,
}

impl CraftConfig {
    pub fn digest_params(&self) -> DigestParams {
        DigestParams {
            markov_order: self.markov_order,
            progression_max_length: self.digest_max_length,
            redundancy_threshold: self.digest_redundancy_threshold,
            preserve_length_min: self.digest_preserve_min,
        }
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            max_entries: self.cache_max_entries,
            expiry: Duration::from_secs(self.cache_expiry_seconds),
            refresh_after: Duration::from_secs(self.cache_refresh_seconds),
        }
    }
}

impl Default for CraftConfig {
    fn default() -> Self {
        CraftConfig {
            macro_arc_beats: 256,
            fade_zone_fraction: 0.5,
            fade_shift_range: (0.5, 0.7),
            delta_jitter_beats: 4.0,
            fade_ramp_beats: 8.0,
            markov_order: 2,
            progression_size_range: (4, 8),
            beats_per_chord: 4.0,
            splice_margin: 1,
            digest_max_length: 5,
            digest_redundancy_threshold: 2,
            digest_preserve_min: 3,
            cache_max_entries: 16,
            cache_expiry_seconds: 300,
            cache_refresh_seconds: 240,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_roundtrips_through_json() {
        let config = CraftConfig::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let restored: CraftConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.macro_arc_beats, config.macro_arc_beats);
        assert_eq!(restored.fade_shift_range, config.fade_shift_range);
        assert_eq!(restored.progression_size_range, config.progression_size_range);
    }

    #[test]
    fn config_loads_from_json_string() {
        let json = r#"{
            "macro_arc_beats": 128,
            "fade_zone_fraction": 0.4,
            "fade_shift_range": [0.55, 0.65],
            "delta_jitter_beats": 2.0,
            "fade_ramp_beats": 4.0,
            "markov_order": 1,
            "progression_size_range": [3, 6],
            "beats_per_chord": 2.0,
            "splice_margin": 1,
            "digest_max_length": 4,
            "digest_redundancy_threshold": 1,
            "digest_preserve_min": 2,
            "cache_max_entries": 8,
            "cache_expiry_seconds": 60,
            "cache_refresh_seconds": 45
        }"#;
        let config: CraftConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.macro_arc_beats, 128);
        assert_eq!(config.markov_order, 1);
        assert_eq!(config.cache_config().max_entries, 8);
        assert_eq!(config.digest_params().progression_max_length, 4);
    }

    #[test]
    fn conversions_carry_the_digest_settings() {
        let config = CraftConfig::default();
        let params = config.digest_params();
        assert_eq!(params.markov_order, config.markov_order);
        assert_eq!(params.redundancy_threshold, config.digest_redundancy_threshold);
        let cache = config.cache_config();
        assert_eq!(cache.expiry, Duration::from_secs(config.cache_expiry_seconds));
    }
}
