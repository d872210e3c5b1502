// Harmony fabrication — the Markov smoothing path.
//
// When the chosen main sequence has no authored chords, the segment's
// progression is fabricated from the library's chord chains: a forward
// walk continues the previous segment's trailing chords, a backward walk
// grows from the reverse chain toward the segment's final chord, and the
// two are spliced at the best-scoring seam. The spliced progression is
// then spelled against the segment key — first root on the key root, each
// later root advanced by its node delta — and placed at even beat
// spacing.
//
// Walk roots only matter for seam scoring; the key spelling at the end
// discards them. Sampling backs off from the full precedent window to
// shorter ones and finally the sequence-start state, so a walk never
// stalls while the chains hold any material.

use crate::error::CraftError;
use crate::fabricator::Fabricator;
use ostinato_digest::{
    ChordMarkovDigest, ChordMarkovNode, ChordNode, ChordProgression, DigestHub, best_splice,
    precedent_key,
};
use ostinato_music::{Chord, PitchClass};
use rand::Rng;

pub fn fabricate(
    fab: &mut Fabricator,
    digests: &DigestHub,
    rng: &mut impl Rng,
) -> Result<(), CraftError> {
    let markov = digests.markov(fab.snapshot())?;
    let key = key_chord(fab.key());
    if markov.is_empty() {
        log::debug!("chord chains are empty; falling back to the key chord");
        place_chords(fab, &[key]);
        return Ok(());
    }

    let (size_min, size_max) = fab.config().progression_size_range;
    let margin = fab.config().splice_margin;
    let seed = trailing_chords(fab, markov.order);
    let forward = forward_walk(&markov, &seed, size_max, key.root, rng);
    let backward = backward_walk(&markov, size_max, key.root, rng);

    let spliced: Vec<Chord> = match best_splice(&forward, &backward, size_min, size_max, margin) {
        Some(choice) => forward
            .iter()
            .take(choice.index)
            .chain(
                backward
                    .iter()
                    .skip(backward.len() + choice.index - choice.size),
            )
            .cloned()
            .collect(),
        None => {
            log::debug!("no splice point scored above zero; keeping the forward walk");
            forward
        }
    };
    let spelled = spell_against_key(&spliced, key.root);
    place_chords(fab, &spelled);
    Ok(())
}

// --- walks ------------------------------------------------------------------

struct Walker<'m> {
    markov: &'m ChordMarkovDigest,
    reverse: bool,
}

impl<'m> Walker<'m> {
    fn state(&self, key: &str) -> Option<&'m ChordMarkovNode> {
        if self.reverse {
            self.markov.reverse_node(key)
        } else {
            self.markov.forward_node(key)
        }
    }

    /// Sample the next node, backing off from the deepest precedent
    /// window to the sequence-start state.
    fn next_node(&self, walk: &[Chord], rng: &mut impl Rng) -> Option<ChordNode> {
        let mut k = self.markov.order.min(walk.len());
        loop {
            if let Some(node) = self.state(&context_key(walk, k)).and_then(|s| s.sample(rng)) {
                return Some(node.clone());
            }
            if k == 0 {
                return None;
            }
            k -= 1;
        }
    }
}

/// Precedent key for the last `k` chords of a walk. When a chord precedes
/// the window, its root anchors the window's first delta, matching how
/// deep training windows are keyed; a window at the very start of the
/// walk keys with a delta-less first node, matching sequence-head
/// training windows.
fn context_key(walk: &[Chord], k: usize) -> String {
    if k == 0 {
        return String::new();
    }
    let start = walk.len().saturating_sub(k + 1);
    let nodes = ChordProgression::from_chords(&walk[start..]).nodes;
    let skip = nodes.len().saturating_sub(k);
    precedent_key(&nodes[skip..])
}

fn forward_walk(
    markov: &ChordMarkovDigest,
    seed: &[Chord],
    target: usize,
    key_root: PitchClass,
    rng: &mut impl Rng,
) -> Vec<Chord> {
    let walker = Walker {
        markov,
        reverse: false,
    };
    let mut walk = seed.to_vec();
    while walk.len() < target {
        let Some(node) = walker.next_node(&walk, rng) else {
            break;
        };
        walk.push(advance(&walk, &node, key_root));
    }
    walk
}

/// Grow the progression's tail from the reverse chain: the walk runs in
/// reverse-chronological order (final chord first) and is flipped before
/// returning.
fn backward_walk(
    markov: &ChordMarkovDigest,
    target: usize,
    key_root: PitchClass,
    rng: &mut impl Rng,
) -> Vec<Chord> {
    let walker = Walker {
        markov,
        reverse: true,
    };
    let mut walk: Vec<Chord> = Vec::new();
    while walk.len() < target {
        let Some(node) = walker.next_node(&walk, rng) else {
            break;
        };
        walk.push(advance(&walk, &node, key_root));
    }
    walk.reverse();
    walk
}

/// Absolute chord for a sampled node: step from the last root, or anchor
/// a delta-less (sequence-start) node on the key root.
fn advance(walk: &[Chord], node: &ChordNode, key_root: PitchClass) -> Chord {
    let root = match (walk.last(), node.delta) {
        (Some(previous), Some(delta)) => previous.root.step(i32::from(delta)),
        _ => key_root,
    };
    Chord::new(root, node.form.clone())
}

// --- spelling & placement ---------------------------------------------------

/// Respell a progression so its first root is the key root and each later
/// root advances by the node delta.
fn spell_against_key(chords: &[Chord], key_root: PitchClass) -> Vec<Chord> {
    let nodes = ChordProgression::from_chords(chords).nodes;
    let mut spelled = Vec::with_capacity(nodes.len());
    let mut root = key_root;
    for (i, node) in nodes.iter().enumerate() {
        if i > 0 {
            root = root.step(i32::from(node.delta.unwrap_or(0)));
        }
        spelled.push(Chord::new(root, node.form.clone()));
    }
    spelled
}

fn place_chords(fab: &mut Fabricator, chords: &[Chord]) {
    let spacing = fab.config().beats_per_chord;
    let total = f64::from(fab.total());
    for (i, chord) in chords.iter().enumerate() {
        let position = i as f64 * spacing;
        if i > 0 && position >= total {
            break;
        }
        fab.add_chord(position, &chord.to_string());
    }
}

/// Up to `count` trailing chords of the predecessor, oldest first. Names
/// that fail to parse are skipped.
fn trailing_chords(fab: &Fabricator, count: usize) -> Vec<Chord> {
    let previous = &fab.retrospective().previous_chords;
    let start = previous.len().saturating_sub(count);
    previous[start..]
        .iter()
        .filter_map(|chord| Chord::of(&chord.name))
        .collect()
}

/// The segment key as a chord. An unparseable key falls back to C Major
/// with a warning; fabrication proceeds rather than failing the pass.
fn key_chord(key: &str) -> Chord {
    match Chord::of(key) {
        Some(chord) => chord,
        None => {
            log::warn!("unparseable segment key {key:?}; spelling from C");
            Chord::new(PitchClass::C, "Major")
        }
    }
}
