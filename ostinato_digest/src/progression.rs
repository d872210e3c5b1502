// Transposition-invariant chord descriptors.
//
// A `ChordNode` is a chord stripped of its absolute root: the semitone
// delta (mod 12) from the previous chord's root plus the sanitized form.
// The first node of a progression has no delta, which doubles as a
// wildcard under equivalence — so a progression descriptor matches at any
// transposition, and a sub-progression cut from the middle of a longer
// one still compares node-for-node.
//
// Descriptors are the string keys everything downstream hangs off:
// digest items group by progression descriptor, Markov states key on
// joined node descriptors. Round-trip (`parse` of `descriptor()`) is
// equivalence-preserving and test-enforced.

use ostinato_music::{Chord, PitchClass, chord_similarity};
use serde::{Deserialize, Serialize};

/// Reference root for reconstructing absolute chords during similarity
/// scoring. Any fixed class works; similarity only sees intervals.
const REFERENCE_ROOT: PitchClass = PitchClass::C;

/// One chord in root-relative form.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChordNode {
    /// Semitone delta (0..12) from the previous chord's root. None for
    /// the first node of a progression; None also matches any delta
    /// under equivalence.
    pub delta: Option<u8>,
    pub form: String,
}

impl ChordNode {
    pub fn new(delta: Option<u8>, form: impl Into<String>) -> Self {
        ChordNode {
            delta: delta.map(|d| d % 12),
            form: form.into(),
        }
    }

    /// Render as `form` or `delta|form`.
    pub fn descriptor(&self) -> String {
        match self.delta {
            Some(delta) => format!("{delta}|{}", self.form),
            None => self.form.clone(),
        }
    }

    /// Invert `descriptor()`. Returns None for an empty form or an
    /// unparseable delta.
    pub fn parse(text: &str) -> Option<ChordNode> {
        let (delta, form) = match text.split_once('|') {
            Some((delta_text, form)) => (Some(delta_text.parse::<u8>().ok()? % 12), form),
            None => (None, text),
        };
        if form.is_empty() {
            return None;
        }
        Some(ChordNode {
            delta,
            form: form.to_string(),
        })
    }

    /// Forms equal, and deltas equal unless either side is the wildcard.
    pub fn equivalent(&self, other: &ChordNode) -> bool {
        if self.form != other.form {
            return false;
        }
        match (self.delta, other.delta) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        }
    }

    /// Similarity in [0,1]: reconstruct both as absolute chords against
    /// the reference root and delegate to chord similarity.
    pub fn similarity(&self, other: &ChordNode) -> f64 {
        chord_similarity(&self.as_chord(), &other.as_chord())
    }

    fn as_chord(&self) -> Chord {
        Chord::new(
            REFERENCE_ROOT.step(self.delta.unwrap_or(0) as i32),
            self.form.clone(),
        )
    }
}

/// An ordered list of chord nodes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChordProgression {
    pub nodes: Vec<ChordNode>,
}

impl ChordProgression {
    /// Build from absolute chords: first node has no delta, each later
    /// node carries the semitone distance from its predecessor's root.
    pub fn from_chords(chords: &[Chord]) -> Self {
        let nodes = chords
            .iter()
            .enumerate()
            .map(|(i, chord)| {
                let delta = (i > 0).then(|| chords[i - 1].root.delta_to(chord.root));
                ChordNode::new(delta, chord.form.clone())
            })
            .collect();
        ChordProgression { nodes }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Join node descriptors with `:`.
    pub fn descriptor(&self) -> String {
        self.nodes
            .iter()
            .map(ChordNode::descriptor)
            .collect::<Vec<_>>()
            .join(":")
    }

    /// Invert `descriptor()`. The empty string parses to the empty
    /// progression.
    pub fn parse(text: &str) -> Option<ChordProgression> {
        if text.trim().is_empty() {
            return Some(ChordProgression::default());
        }
        let nodes = text
            .split(':')
            .map(ChordNode::parse)
            .collect::<Option<Vec<_>>>()?;
        Some(ChordProgression { nodes })
    }

    /// Node-for-node equivalence (same length required).
    pub fn equivalent(&self, other: &ChordProgression) -> bool {
        self.len() == other.len()
            && self
                .nodes
                .iter()
                .zip(&other.nodes)
                .all(|(a, b)| a.equivalent(b))
    }

    /// Own nodes before `at`, other's nodes from `at` on.
    pub fn spliced(&self, other: &ChordProgression, at: usize) -> ChordProgression {
        let nodes = self
            .nodes
            .iter()
            .take(at)
            .chain(other.nodes.iter().skip(at))
            .cloned()
            .collect();
        ChordProgression { nodes }
    }
}

/// A strictly shorter progression is redundant of a longer one when their
/// length difference is within `threshold` and some contiguous window of
/// the haystack matches the needle node-for-node. A progression is never
/// redundant of itself.
pub fn is_redundant_subset(
    needle: &ChordProgression,
    haystack: &ChordProgression,
    threshold: usize,
) -> bool {
    if needle.len() >= haystack.len() || haystack.len() - needle.len() > threshold {
        return false;
    }
    haystack
        .nodes
        .windows(needle.len())
        .any(|window| {
            needle
                .nodes
                .iter()
                .zip(window)
                .all(|(a, b)| a.equivalent(b))
        })
}

// ---------------------------------------------------------------------------
// Splice-point search
// ---------------------------------------------------------------------------

/// A splice decision: final progression size, index of the first chord
/// taken from the backward walk, and the [0,1] seam score.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpliceChoice {
    pub size: usize,
    pub index: usize,
    pub score: f64,
}

/// Find the best point to stitch a forward-built chord walk onto a
/// backward-built one (both in chronological order; `backward` supplies
/// the tail, aligned to the final chord).
///
/// Every (size, index) candidate within the size bounds and safety margin
/// is scored by the seam: similarity of the last forward chord to the
/// backward chord replacing its successor, plus half the similarity of
/// the next pair when both are present, normalized to [0,1]. A candidate
/// whose mandatory chords are missing scores exactly 0.0 and is never
/// chosen over any positive score. Returns None when nothing scores
/// above zero.
pub fn best_splice(
    forward: &[Chord],
    backward: &[Chord],
    size_min: usize,
    size_max: usize,
    margin: usize,
) -> Option<SpliceChoice> {
    let mut best: Option<SpliceChoice> = None;
    for size in size_min..=size_max {
        for index in 0..=size {
            let score = splice_score(forward, backward, size, index, margin);
            if score > 0.0 && best.is_none_or(|b| score > b.score) {
                best = Some(SpliceChoice { size, index, score });
            }
        }
    }
    best
}

fn splice_score(
    forward: &[Chord],
    backward: &[Chord],
    size: usize,
    index: usize,
    margin: usize,
) -> f64 {
    // Margins keep the seam away from both ends of the final progression.
    if index < margin || index + margin > size {
        return 0.0;
    }
    // Mandatory material: forward covers [0, index), backward covers
    // [index, size) from its tail.
    if forward.len() < index || backward.len() + index < size {
        return 0.0;
    }
    if index == 0 {
        return 0.0;
    }
    let backward_at = |position: usize| -> Option<&Chord> {
        (backward.len() + position)
            .checked_sub(size)
            .and_then(|i| backward.get(i))
    };
    let Some(seam_chord) = backward_at(index) else {
        return 0.0;
    };
    let seam = chord_similarity(&forward[index - 1], seam_chord);
    let next = match (forward.get(index), backward_at(index + 1)) {
        (Some(own_next), Some(other_next)) if index + 1 < size => {
            chord_similarity(own_next, other_next)
        }
        _ => 0.0,
    };
    (seam + 0.5 * next) / 1.5
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chords(names: &[&str]) -> Vec<Chord> {
        names.iter().map(|n| Chord::of(n).unwrap()).collect()
    }

    #[test]
    fn descriptor_roundtrip_is_equivalent() {
        let progression =
            ChordProgression::from_chords(&chords(&["C Minor", "Ab Major", "Eb Major"]));
        let parsed = ChordProgression::parse(&progression.descriptor()).unwrap();
        assert!(progression.equivalent(&parsed));
        assert_eq!(progression.descriptor(), parsed.descriptor());
    }

    #[test]
    fn first_node_has_no_delta() {
        let progression = ChordProgression::from_chords(&chords(&["C Minor", "G Major"]));
        assert_eq!(progression.nodes[0].delta, None);
        assert_eq!(progression.nodes[1].delta, Some(7));
        assert_eq!(progression.descriptor(), "Minor:7|Major");
    }

    #[test]
    fn wildcard_delta_matches_any() {
        let anchored = ChordNode::new(Some(5), "Minor");
        let wildcard = ChordNode::new(None, "Minor");
        let other = ChordNode::new(Some(2), "Minor");
        assert!(anchored.equivalent(&wildcard));
        assert!(wildcard.equivalent(&other));
        assert!(!anchored.equivalent(&other));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert_eq!(ChordNode::parse(""), None);
        assert_eq!(ChordNode::parse("x|Minor"), None);
        assert!(ChordNode::parse("3|Minor").is_some());
    }

    #[test]
    fn transposition_invariance() {
        let in_c = ChordProgression::from_chords(&chords(&["C Minor", "F Minor", "G Major"]));
        let in_d = ChordProgression::from_chords(&chords(&["D Minor", "G Minor", "A Major"]));
        assert!(in_c.equivalent(&in_d));
    }

    #[test]
    fn spliced_takes_head_and_tail() {
        let a = ChordProgression::from_chords(&chords(&["C Major", "F Major", "G Major"]));
        let b = ChordProgression::from_chords(&chords(&["A Minor", "D Minor", "E Minor"]));
        let joined = a.spliced(&b, 2);
        assert_eq!(joined.len(), 3);
        assert!(joined.nodes[0].equivalent(&a.nodes[0]));
        assert!(joined.nodes[1].equivalent(&a.nodes[1]));
        assert!(joined.nodes[2].equivalent(&b.nodes[2]));
    }

    #[test]
    fn never_redundant_of_itself() {
        let progression = ChordProgression::from_chords(&chords(&["C Major", "F Major"]));
        assert!(!is_redundant_subset(&progression, &progression, 10));
    }

    #[test]
    fn shorter_window_is_redundant_within_threshold() {
        let long =
            ChordProgression::from_chords(&chords(&["C Major", "F Major", "G Major", "C Major"]));
        let window = ChordProgression::from_chords(&chords(&["F Major", "G Major"]));
        assert!(is_redundant_subset(&window, &long, 2));
        assert!(!is_redundant_subset(&window, &long, 1));
    }

    #[test]
    fn transposed_window_is_still_redundant() {
        // The needle's wildcard first node anchors anywhere in the haystack.
        let long =
            ChordProgression::from_chords(&chords(&["C Major", "F Major", "G Major", "C Major"]));
        let window = ChordProgression::from_chords(&chords(&["Bb Major", "C Major"]));
        assert!(is_redundant_subset(&window, &long, 2));
    }

    #[test]
    fn splice_prefers_consonant_seam() {
        let forward = chords(&["C Major", "F Major", "G Major"]);
        let backward = chords(&["G Major", "C Major"]);
        let choice = best_splice(&forward, &backward, 4, 4, 1).unwrap();
        assert_eq!(choice.size, 4);
        assert!(choice.score > 0.0);
        assert!(choice.index >= 1);
    }

    #[test]
    fn out_of_range_candidates_never_win() {
        // Backward material is too short for any candidate: every score
        // is exactly 0.0 and the search returns None.
        let forward = chords(&["C Major", "F Major"]);
        let backward: Vec<Chord> = Vec::new();
        assert_eq!(best_splice(&forward, &backward, 3, 4, 1), None);
    }

    #[test]
    fn margin_excludes_edge_splices() {
        let forward = chords(&["C Major", "F Major", "G Major", "A Minor"]);
        let backward = chords(&["C Major", "F Major", "G Major", "A Minor"]);
        let choice = best_splice(&forward, &backward, 4, 4, 2).unwrap();
        assert_eq!(choice.index, 2);
    }
}
