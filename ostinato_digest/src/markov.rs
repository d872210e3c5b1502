// Order-N Markov chains over chord progressions.
//
// States are keyed by the descriptor-join of up to N preceding chord
// nodes; the empty key is the sequence-start state. Outcomes carry
// occurrence weights, so frequent transitions in the library dominate
// sampling. Two chains are built per library: forward (chords as
// authored) and reverse (the same walk over each reversed chord list,
// deltas recomputed), which lets harmony fabrication grow a progression
// from both ends toward a splice point.
//
// Sampling is a weighted lottery: each outcome occupies as many pool
// slots as its weight and one slot is drawn uniformly. Outcome maps are
// BTreeMaps so the cumulative walk is deterministic for a seeded RNG.

use crate::error::DigestError;
use crate::progression::{ChordNode, ChordProgression};
use ostinato_content::{ContentSnapshot, SequenceId};
use ostinato_music::Chord;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Join a window of preceding nodes into a state key. An empty window
/// (sequence start) yields the empty key.
pub fn precedent_key(window: &[ChordNode]) -> String {
    window
        .iter()
        .map(ChordNode::descriptor)
        .collect::<Vec<_>>()
        .join(":")
}

/// Weighted outcome of one Markov state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarkovOutcome {
    pub node: ChordNode,
    pub weight: u32,
}

/// One Markov state: the chord nodes observed to follow a precedent
/// sequence, with occurrence weights.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChordMarkovNode {
    /// Outcome descriptor -> outcome.
    pub outcomes: BTreeMap<String, MarkovOutcome>,
}

impl ChordMarkovNode {
    /// Record an observed outcome. An existing descriptor gains weight
    /// rather than creating a duplicate entry.
    pub fn add_outcome(&mut self, node: ChordNode) {
        self.outcomes
            .entry(node.descriptor())
            .and_modify(|outcome| outcome.weight += 1)
            .or_insert(MarkovOutcome { node, weight: 1 });
    }

    pub fn total_weight(&self) -> u32 {
        self.outcomes.values().map(|outcome| outcome.weight).sum()
    }

    /// Draw one outcome by weighted lottery. None when the state has no
    /// outcomes.
    pub fn sample(&self, rng: &mut impl Rng) -> Option<&ChordNode> {
        let total = self.total_weight();
        if total == 0 {
            return None;
        }
        let mut draw = rng.random_range(0..total);
        for outcome in self.outcomes.values() {
            if draw < outcome.weight {
                return Some(&outcome.node);
            }
            draw -= outcome.weight;
        }
        None
    }
}

/// Forward and reverse order-N chord chains for a whole library.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChordMarkovDigest {
    pub order: usize,
    forward: BTreeMap<String, ChordMarkovNode>,
    reverse: BTreeMap<String, ChordMarkovNode>,
}

impl ChordMarkovDigest {
    /// Build both chains from every sequence's chord list.
    pub fn compute(snapshot: &ContentSnapshot, order: usize) -> Result<Self, DigestError> {
        let mut digest = ChordMarkovDigest {
            order,
            forward: BTreeMap::new(),
            reverse: BTreeMap::new(),
        };
        for program in snapshot.programs() {
            for sequence in snapshot.sequences_of(program.id) {
                let chords = parse_sequence_chords(snapshot, sequence.id)?;
                if chords.is_empty() {
                    continue;
                }
                train(&mut digest.forward, order, &chords);
                let reversed: Vec<Chord> = chords.iter().rev().cloned().collect();
                train(&mut digest.reverse, order, &reversed);
            }
        }
        Ok(digest)
    }

    pub fn forward_node(&self, key: &str) -> Option<&ChordMarkovNode> {
        self.forward.get(key)
    }

    pub fn reverse_node(&self, key: &str) -> Option<&ChordMarkovNode> {
        self.reverse.get(key)
    }

    /// True when no sequence contributed any chords.
    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }
}

fn train(chain: &mut BTreeMap<String, ChordMarkovNode>, order: usize, chords: &[Chord]) {
    let progression = ChordProgression::from_chords(chords);
    for i in 0..progression.nodes.len() {
        let window = &progression.nodes[i.saturating_sub(order)..i];
        chain
            .entry(precedent_key(window))
            .or_default()
            .add_outcome(progression.nodes[i].clone());
    }
}

fn parse_sequence_chords(
    snapshot: &ContentSnapshot,
    sequence: SequenceId,
) -> Result<Vec<Chord>, DigestError> {
    snapshot
        .chords_of_sequence(sequence)
        .into_iter()
        .map(|chord| {
            Chord::of(&chord.name).ok_or_else(|| DigestError::UnparseableChord(chord.name.clone()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ostinato_content::demo::demo_library;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn node(delta: Option<u8>, form: &str) -> ChordNode {
        ChordNode::new(delta, form)
    }

    #[test]
    fn add_outcome_sums_weights() {
        let mut state = ChordMarkovNode::default();
        state.add_outcome(node(Some(5), "Major"));
        state.add_outcome(node(Some(5), "Major"));
        state.add_outcome(node(Some(7), "Minor"));
        assert_eq!(state.outcomes.len(), 2);
        assert_eq!(state.outcomes["5|Major"].weight, 2);
        assert_eq!(state.outcomes["7|Minor"].weight, 1);
        assert_eq!(state.total_weight(), 3);
    }

    #[test]
    fn sample_respects_weights() {
        let mut state = ChordMarkovNode::default();
        state.add_outcome(node(Some(5), "Major"));
        state.add_outcome(node(Some(5), "Major"));
        state.add_outcome(node(Some(5), "Major"));
        state.add_outcome(node(Some(7), "Minor"));

        let mut rng = StdRng::seed_from_u64(7);
        let mut majors = 0;
        for _ in 0..400 {
            if state.sample(&mut rng).unwrap().form == "Major" {
                majors += 1;
            }
        }
        // Expect roughly 3:1; allow generous slack.
        assert!(majors > 250, "got {majors} majors out of 400");
    }

    #[test]
    fn sample_empty_state_is_none() {
        let state = ChordMarkovNode::default();
        let mut rng = StdRng::seed_from_u64(1);
        assert!(state.sample(&mut rng).is_none());
    }

    #[test]
    fn sample_is_reproducible_for_a_seed() {
        let mut state = ChordMarkovNode::default();
        state.add_outcome(node(Some(2), "Minor"));
        state.add_outcome(node(Some(5), "Major"));
        state.add_outcome(node(Some(10), "Seventh"));

        let draw = |seed: u64| -> Vec<String> {
            let mut rng = StdRng::seed_from_u64(seed);
            (0..10)
                .map(|_| state.sample(&mut rng).unwrap().descriptor())
                .collect()
        };
        assert_eq!(draw(42), draw(42));
    }

    #[test]
    fn chains_built_from_library_chords() {
        let digest = ChordMarkovDigest::compute(&demo_library(), 2).unwrap();
        assert!(!digest.is_empty());
        // The start state exists in both directions and has outcomes.
        assert!(digest.forward_node("").unwrap().total_weight() > 0);
        assert!(digest.reverse_node("").unwrap().total_weight() > 0);
    }

    #[test]
    fn precedent_windows_respect_order() {
        let chords: Vec<Chord> = ["C Major", "F Major", "G Major", "C Major"]
            .iter()
            .map(|n| Chord::of(n).unwrap())
            .collect();
        let mut chain = BTreeMap::new();
        train(&mut chain, 2, &chords);
        // Fourth chord's precedent is the two nodes before it, not three.
        let progression = ChordProgression::from_chords(&chords);
        let key = precedent_key(&progression.nodes[1..3]);
        assert!(chain.contains_key(&key));
        let full_key = precedent_key(&progression.nodes[0..3]);
        assert!(!chain.contains_key(&full_key));
    }
}
