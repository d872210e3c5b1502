// Chord progression digest: which progressions a library actually uses,
// and how much they matter.
//
// Every contiguous window of 2..=max_length chords in any sequence is a
// candidate progression, grouped by descriptor across the whole library
// with the parent program recorded per occurrence. Windows are re-rooted
// when sliced, so the first chord of each window carries no delta and
// identical shapes group together regardless of where they sit in their
// source sequences.
//
// Short progressions that appear verbatim inside a longer, higher-scoring
// one are noise: they are pruned, and their usages are folded into the
// covering progression when they are long enough to be worth preserving.

use crate::error::DigestError;
use crate::progression::{ChordProgression, is_redundant_subset};
use ostinato_content::{ContentSnapshot, ProgramId};
use ostinato_music::Chord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One distinct progression and every program that uses it. A program
/// appears once per occurrence, so `usage_count` counts occurrences and
/// `diversity` counts distinct parents.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProgressionItem {
    pub progression: ChordProgression,
    pub usages: Vec<ProgramId>,
}

impl ProgressionItem {
    pub fn usage_count(&self) -> usize {
        self.usages.len()
    }

    pub fn diversity(&self) -> usize {
        let mut distinct: Vec<ProgramId> = self.usages.clone();
        distinct.sort();
        distinct.dedup();
        distinct.len()
    }

    /// usages x (length - 1) x diversity^2. Longer progressions used in
    /// more places by more programs dominate.
    pub fn score(&self) -> u64 {
        let span = self.progression.len().saturating_sub(1) as u64;
        self.usage_count() as u64 * span * (self.diversity() as u64).pow(2)
    }
}

/// All distinct progressions of a library, pruned and ordered by score
/// descending (ties broken by descriptor).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ChordProgressionDigest {
    items: Vec<ProgressionItem>,
}

impl ChordProgressionDigest {
    /// Digest every sequence's chords. `redundancy_threshold` bounds how
    /// much longer a covering progression may be; pruned progressions of
    /// at least `preserve_min` nodes re-home their usages onto the
    /// survivor that covers them.
    pub fn compute(
        snapshot: &ContentSnapshot,
        max_length: usize,
        redundancy_threshold: usize,
        preserve_min: usize,
    ) -> Result<Self, DigestError> {
        let mut by_descriptor: BTreeMap<String, ProgressionItem> = BTreeMap::new();
        for program in snapshot.programs() {
            for sequence in snapshot.sequences_of(program.id) {
                let chords: Vec<Chord> = snapshot
                    .chords_of_sequence(sequence.id)
                    .into_iter()
                    .map(|chord| {
                        Chord::of(&chord.name)
                            .ok_or_else(|| DigestError::UnparseableChord(chord.name.clone()))
                    })
                    .collect::<Result<_, _>>()?;
                for length in 2..=max_length.min(chords.len()) {
                    for window in chords.windows(length) {
                        let progression = ChordProgression::from_chords(window);
                        by_descriptor
                            .entry(progression.descriptor())
                            .or_insert_with(|| ProgressionItem {
                                progression,
                                usages: Vec::new(),
                            })
                            .usages
                            .push(program.id);
                    }
                }
            }
        }

        let mut candidates: Vec<ProgressionItem> = by_descriptor.into_values().collect();
        candidates.sort_by(|a, b| {
            b.score()
                .cmp(&a.score())
                .then_with(|| a.progression.descriptor().cmp(&b.progression.descriptor()))
        });

        // Highest score first: an item survives unless an already-kept
        // item covers it within the threshold.
        let mut items: Vec<ProgressionItem> = Vec::new();
        for candidate in candidates {
            let covering = items.iter().position(|kept| {
                is_redundant_subset(&candidate.progression, &kept.progression, redundancy_threshold)
            });
            match covering {
                None => items.push(candidate),
                Some(index) => {
                    if candidate.progression.len() >= preserve_min {
                        for program in candidate.usages {
                            if !items[index].usages.contains(&program) {
                                items[index].usages.push(program);
                            }
                        }
                    }
                }
            }
        }

        // Re-homing can raise survivor scores; restore the order.
        items.sort_by(|a, b| {
            b.score()
                .cmp(&a.score())
                .then_with(|| a.progression.descriptor().cmp(&b.progression.descriptor()))
        });
        Ok(ChordProgressionDigest { items })
    }

    pub fn items(&self) -> &[ProgressionItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
