// Pitch classes and octave-qualified notes.
//
// A `PitchClass` is one of the twelve chromatic classes; a `Note` is a
// pitch class plus an octave. Notes parse from compact text ("C4", "F#2",
// "Bb5") and render back to the same canonical spelling, so note lists in
// content (voicings, event tones, audio notes) round-trip losslessly.
//
// The special marker "X" denotes an atonal event (unpitched percussion).
// It is deliberately not a `Note` — callers branch on `is_atonal` before
// parsing.
//
// Canonical spelling mixes sharps and flats the way players write them:
// C# Eb F# Ab Bb. Parsing accepts either accidental for any class.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Marker used in event tones and picks for unpitched (atonal) material.
pub const ATONAL_MARKER: &str = "X";

/// True when a tone string denotes the atonal marker rather than a note.
pub fn is_atonal(text: &str) -> bool {
    text.trim().eq_ignore_ascii_case(ATONAL_MARKER)
}

/// One of the twelve chromatic pitch classes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PitchClass {
    C,
    Cs,
    D,
    Eb,
    E,
    F,
    Fs,
    G,
    Ab,
    A,
    Bb,
    B,
}

impl PitchClass {
    pub const ALL: [PitchClass; 12] = [
        PitchClass::C,
        PitchClass::Cs,
        PitchClass::D,
        PitchClass::Eb,
        PitchClass::E,
        PitchClass::F,
        PitchClass::Fs,
        PitchClass::G,
        PitchClass::Ab,
        PitchClass::A,
        PitchClass::Bb,
        PitchClass::B,
    ];

    /// Semitone offset above C (0–11).
    pub fn semitone(self) -> u8 {
        self as u8
    }

    /// Pitch class for a semitone offset (taken mod 12).
    pub fn from_semitone(semitone: i32) -> PitchClass {
        Self::ALL[semitone.rem_euclid(12) as usize]
    }

    /// Parse a pitch class from text: a letter A–G plus an optional
    /// accidental (`#` or `b`). Case-insensitive on the letter.
    pub fn parse(text: &str) -> Option<PitchClass> {
        let mut chars = text.trim().chars();
        let letter = chars.next()?.to_ascii_uppercase();
        let base: i32 = match letter {
            'C' => 0,
            'D' => 2,
            'E' => 4,
            'F' => 5,
            'G' => 7,
            'A' => 9,
            'B' => 11,
            _ => return None,
        };
        let accidental: i32 = match chars.next() {
            None => 0,
            Some('#') => 1,
            Some('b') => -1,
            Some(_) => return None,
        };
        if chars.next().is_some() {
            return None;
        }
        Some(Self::from_semitone(base + accidental))
    }

    /// Step up (positive) or down (negative) by semitones, wrapping mod 12.
    pub fn step(self, semitones: i32) -> PitchClass {
        Self::from_semitone(self.semitone() as i32 + semitones)
    }

    /// Ascending semitone distance from `self` to `other`, in 0..12.
    pub fn delta_to(self, other: PitchClass) -> u8 {
        (other.semitone() as i32 - self.semitone() as i32).rem_euclid(12) as u8
    }

    /// Canonical spelling (C, C#, D, Eb, E, F, F#, G, Ab, A, Bb, B).
    pub fn name(self) -> &'static str {
        match self {
            PitchClass::C => "C",
            PitchClass::Cs => "C#",
            PitchClass::D => "D",
            PitchClass::Eb => "Eb",
            PitchClass::E => "E",
            PitchClass::F => "F",
            PitchClass::Fs => "F#",
            PitchClass::G => "G",
            PitchClass::Ab => "Ab",
            PitchClass::A => "A",
            PitchClass::Bb => "Bb",
            PitchClass::B => "B",
        }
    }
}

impl fmt::Display for PitchClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An octave-qualified note, e.g. C4 or F#2.
///
/// Octaves follow scientific pitch notation (C4 = middle C). Negative
/// octaves are representable but never produced by content in practice.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Note {
    pub pitch_class: PitchClass,
    pub octave: i8,
}

impl Note {
    pub fn new(pitch_class: PitchClass, octave: i8) -> Self {
        Note {
            pitch_class,
            octave,
        }
    }

    /// Parse "C4", "F#2", "Bb5". Returns None for the atonal marker and
    /// any other non-note text.
    pub fn parse(text: &str) -> Option<Note> {
        let text = text.trim();
        let split = text.find(|c: char| c == '-' || c.is_ascii_digit())?;
        let pitch_class = PitchClass::parse(&text[..split])?;
        let octave: i8 = text[split..].parse().ok()?;
        Some(Note {
            pitch_class,
            octave,
        })
    }

    /// Absolute semitone number: C4 = 60, matching MIDI numbering.
    pub fn number(self) -> i32 {
        (self.octave as i32 + 1) * 12 + self.pitch_class.semitone() as i32
    }

    /// Note for an absolute semitone number.
    pub fn from_number(number: i32) -> Note {
        Note {
            pitch_class: PitchClass::from_semitone(number),
            octave: (number.div_euclid(12) - 1) as i8,
        }
    }

    /// Transpose by semitones (positive = up).
    pub fn transpose(self, semitones: i32) -> Note {
        Self::from_number(self.number() + semitones)
    }

    /// The octave placement of `self`'s pitch class nearest to `target`.
    /// Used to shift voicing notes into an event's register.
    pub fn nearest_to(self, target: Note) -> Note {
        let base = Note {
            pitch_class: self.pitch_class,
            octave: target.octave,
        };
        [-1, 0, 1]
            .into_iter()
            .map(|shift| base.transpose(shift * 12))
            .min_by_key(|candidate| (candidate.number() - target.number()).abs())
            .unwrap_or(base)
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.pitch_class, self.octave)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_naturals_sharps_and_flats() {
        assert_eq!(PitchClass::parse("C"), Some(PitchClass::C));
        assert_eq!(PitchClass::parse("c#"), Some(PitchClass::Cs));
        assert_eq!(PitchClass::parse("Db"), Some(PitchClass::Cs));
        assert_eq!(PitchClass::parse("Eb"), Some(PitchClass::Eb));
        assert_eq!(PitchClass::parse("d#"), Some(PitchClass::Eb));
        assert_eq!(PitchClass::parse("Cb"), Some(PitchClass::B));
        assert_eq!(PitchClass::parse("B#"), Some(PitchClass::C));
        assert_eq!(PitchClass::parse("H"), None);
        assert_eq!(PitchClass::parse(""), None);
    }

    #[test]
    fn delta_wraps_mod_twelve() {
        assert_eq!(PitchClass::C.delta_to(PitchClass::G), 7);
        assert_eq!(PitchClass::G.delta_to(PitchClass::C), 5);
        assert_eq!(PitchClass::A.delta_to(PitchClass::A), 0);
    }

    #[test]
    fn step_is_inverse_of_delta() {
        for a in PitchClass::ALL {
            for b in PitchClass::ALL {
                assert_eq!(a.step(a.delta_to(b) as i32), b);
            }
        }
    }

    #[test]
    fn note_roundtrip_through_text() {
        for text in ["C4", "F#2", "Bb5", "A0", "Eb7"] {
            let note = Note::parse(text).unwrap();
            assert_eq!(note.to_string(), text);
        }
    }

    #[test]
    fn note_number_matches_midi_convention() {
        assert_eq!(Note::parse("C4").unwrap().number(), 60);
        assert_eq!(Note::parse("A4").unwrap().number(), 69);
        assert_eq!(Note::from_number(60), Note::parse("C4").unwrap());
    }

    #[test]
    fn transpose_crosses_octaves() {
        let note = Note::parse("B3").unwrap();
        assert_eq!(note.transpose(1), Note::parse("C4").unwrap());
        assert_eq!(note.transpose(-12), Note::parse("B2").unwrap());
    }

    #[test]
    fn nearest_to_shifts_into_register() {
        let voicing = Note::parse("E2").unwrap();
        let event = Note::parse("C4").unwrap();
        let shifted = voicing.nearest_to(event);
        assert_eq!(shifted.pitch_class, PitchClass::E);
        assert!((shifted.number() - event.number()).abs() <= 6);
    }

    #[test]
    fn atonal_marker_is_not_a_note() {
        assert!(is_atonal("X"));
        assert!(is_atonal(" x "));
        assert!(!is_atonal("C4"));
        assert_eq!(Note::parse("X"), None);
    }
}
