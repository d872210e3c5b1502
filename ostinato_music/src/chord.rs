// Chords: a root pitch class plus a sanitized form string.
//
// Content authors write chord names loosely ("Cm7", "Bb Minor", "F# 7").
// Parsing splits the root from the quality text and canonicalizes the
// quality into a stable form ("Minor Seventh"), so two spellings of the
// same chord compare equal and progression descriptors stay consistent.
//
// Similarity scoring is the basis for splice-point selection in chord
// progressions and for matching fabricated chords against voiced ones.
// Root distance is folded to an interval class (0-6, direction ignored)
// and weighted by consonance; form distance is token overlap.

use crate::pitch::PitchClass;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A chord: root pitch class and canonical form ("Major", "Minor Seventh").
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Chord {
    pub root: PitchClass,
    pub form: String,
}

impl Chord {
    pub fn new(root: PitchClass, form: impl Into<String>) -> Self {
        Chord {
            root,
            form: form.into(),
        }
    }

    /// Parse a chord name. The root is the leading letter plus an optional
    /// accidental; the rest (attached or space-separated) is the form.
    /// Returns None when no root letter is present.
    pub fn of(text: &str) -> Option<Chord> {
        let text = text.trim();
        let mut chars = text.char_indices();
        let (_, letter) = chars.next()?;
        if !letter.is_ascii_alphabetic() {
            return None;
        }
        // Consume an accidental if present. 'b' only counts as flat when
        // the letter alone is a valid root, so "Bb" parses but "sus" text
        // starting a form is left intact.
        let mut rest_start = letter.len_utf8();
        if let Some((idx, c)) = chars.next() {
            if c == '#' || c == 'b' {
                rest_start = idx + c.len_utf8();
            }
        }
        let root = PitchClass::parse(&text[..rest_start])?;
        Some(Chord {
            root,
            form: sanitize_form(&text[rest_start..]),
        })
    }
}

impl fmt::Display for Chord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.root, self.form)
    }
}

/// Canonicalize a chord quality string.
///
/// Reserved descriptor characters (':' and '|') are stripped, each
/// whitespace token is mapped to its canonical spelling, and unrecognized
/// tokens are kept title-cased rather than dropped. An empty quality
/// defaults to "Major".
pub fn sanitize_form(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .map(|c| if c == ':' || c == '|' { ' ' } else { c })
        .collect();
    let form = cleaned
        .split_whitespace()
        .map(canonical_token)
        .collect::<Vec<_>>()
        .join(" ");
    if form.is_empty() {
        "Major".to_string()
    } else {
        form
    }
}

fn canonical_token(token: &str) -> String {
    // Bare M/m are case-significant in chord notation.
    match token {
        "M" => return "Major".to_string(),
        "m" | "-" => return "Minor".to_string(),
        "+" => return "Augmented".to_string(),
        _ => {}
    }
    let lower = token.to_ascii_lowercase();
    let mapped = match lower.as_str() {
        "maj" | "major" => "Major",
        "min" | "minor" => "Minor",
        "dim" | "diminished" | "o" => "Diminished",
        "aug" | "augmented" => "Augmented",
        "sus" | "sus4" => "Suspended Fourth",
        "sus2" => "Suspended Second",
        "7" | "seventh" => "Seventh",
        "maj7" | "major7" => "Major Seventh",
        "m7" | "min7" | "minor7" => "Minor Seventh",
        "dim7" => "Diminished Seventh",
        "add9" => "Add Ninth",
        "2" | "second" => "Second",
        "4" | "fourth" => "Fourth",
        "5" | "fifth" => "Fifth",
        "6" | "sixth" => "Sixth",
        "9" | "ninth" => "Ninth",
        "11" | "eleventh" => "Eleventh",
        "13" | "thirteenth" => "Thirteenth",
        _ => return title_case(&lower),
    };
    mapped.to_string()
}

fn title_case(lower: &str) -> String {
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

// --- similarity -------------------------------------------------------------

/// Similarity of two chords in [0, 1]. Identical chords score exactly 1.0.
///
/// Half the score comes from root distance (interval-class consonance),
/// half from the form: equal forms take the full half, otherwise token
/// overlap contributes a reduced share so a shared quality word still
/// counts for something.
pub fn chord_similarity(a: &Chord, b: &Chord) -> f64 {
    let root = interval_affinity(a.root.delta_to(b.root));
    let form = if a.form == b.form {
        0.5
    } else {
        form_overlap(&a.form, &b.form) * 0.35
    };
    0.5 * root + form
}

/// Consonance weight for an interval between roots. Direction is ignored:
/// the interval folds to its class (0-6). Unison is full affinity, the
/// perfect fourth/fifth pair is close behind, seconds and the tritone
/// score low.
fn interval_affinity(delta: u8) -> f64 {
    let class = if delta > 6 { 12 - delta } else { delta };
    match class {
        0 => 1.0,
        1 => 0.1,
        2 => 0.3,
        3 => 0.6,
        4 => 0.65,
        5 => 0.8,
        6 => 0.2,
        _ => 0.0,
    }
}

/// Jaccard overlap of whitespace-delimited form tokens.
fn form_overlap(a: &str, b: &str) -> f64 {
    let set_a: BTreeSet<&str> = a.split_whitespace().collect();
    let set_b: BTreeSet<&str> = b.split_whitespace().collect();
    let union = set_a.union(&set_b).count();
    if union == 0 {
        return 0.0;
    }
    set_a.intersection(&set_b).count() as f64 / union as f64
}

/// Similarity of two names in [0, 1]: Dice coefficient over character
/// bigrams, case-insensitive, ignoring non-alphanumeric characters.
/// Used to match percussive audio (e.g. "Kick" against "Kick Drum 808").
pub fn name_similarity(a: &str, b: &str) -> f64 {
    let a = normalize_name(a);
    let b = normalize_name(b);
    if a == b {
        return if a.is_empty() { 0.0 } else { 1.0 };
    }
    let bigrams_a = bigrams(&a);
    let bigrams_b = bigrams(&b);
    if bigrams_a.is_empty() || bigrams_b.is_empty() {
        return 0.0;
    }
    let mut shared = 0usize;
    let mut pool = bigrams_b.clone();
    for bigram in &bigrams_a {
        if let Some(pos) = pool.iter().position(|other| other == bigram) {
            pool.swap_remove(pos);
            shared += 1;
        }
    }
    2.0 * shared as f64 / (bigrams_a.len() + bigrams_b.len()) as f64
}

fn normalize_name(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn bigrams(text: &str) -> Vec<(char, char)> {
    let chars: Vec<char> = text.chars().collect();
    chars.windows(2).map(|w| (w[0], w[1])).collect()
}
