// Ostinato Music Theory
//
// Shared leaf crate for the ostinato fabrication engine. Provides the
// pitch/note/chord vocabulary that the content, digest, and craft crates
// build on:
// - pitch.rs: the twelve chromatic pitch classes, octave-qualified notes,
//   parsing and transposition, and the atonal event marker
// - chord.rs: chord descriptors (root + sanitized form), chord similarity
//   scoring, and name similarity for sample matching
//
// Everything here is pure data and arithmetic — no randomness, no I/O.
// All scoring functions are deterministic and return values in [0, 1] so
// callers can compare and rank without normalization.

pub mod chord;
pub mod pitch;

pub use chord::{Chord, chord_similarity, name_similarity};
pub use pitch::{ATONAL_MARKER, Note, PitchClass, is_atonal};
