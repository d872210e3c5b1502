// Chain and segment entities — the fabricated output stream.
//
// A chain is an endless sequence of segments at dense, monotonic offsets.
// Each segment is created Planned/Pending, then crafted in one pass that
// stamps the header (kind, key, tempo, intensity, total, delta) and
// attaches the child rows: choices, arrangements, picks, memes, chords,
// and chord voicings. Downstream consumers (render, ship) read only these
// rows — a crafted segment is self-contained.

use crate::ids::{
    ArrangementId, AudioId, BindingId, ChainId, ChoiceId, EventId, InstrumentId, PatternId, PickId,
    ProgramId, SegmentId, VoiceId,
};
use crate::library::{InstrumentCategory, ProgramKind};
use serde::{Deserialize, Serialize};

/// Sentinel delta meaning "always audible": a choice with this deltaIn is
/// active from the start of the arc, one with this deltaOut never fades.
pub const DELTA_UNLIMITED: i32 = -1;

/// How a segment relates to its predecessor. Pending means not yet
/// determined; craft resolves it as its first act.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SegmentKind {
    Pending,
    Initial,
    Continue,
    NextMain,
    NextMacro,
}

/// Lifecycle state of a segment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SegmentState {
    Planned,
    Crafting,
    Crafted,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chain {
    pub id: ChainId,
    pub name: String,
}

/// One fabricated span of the chain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub id: SegmentId,
    pub chain_id: ChainId,
    /// Dense position in the chain: 0, 1, 2, ...
    pub offset: u32,
    pub kind: SegmentKind,
    pub state: SegmentState,
    pub key: String,
    pub tempo: f64,
    pub intensity: f64,
    /// Length in beats.
    pub total: u32,
    /// Arc position in beats: predecessor delta + predecessor total.
    pub delta: u32,
}

/// A program (and optionally voice + instrument) chosen for a segment.
/// Macro/main choices carry the sequence binding; arrangement choices
/// carry the voice, instrument, and delta window.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentChoice {
    pub id: ChoiceId,
    pub segment_id: SegmentId,
    pub program_id: ProgramId,
    pub program_kind: ProgramKind,
    pub sequence_binding_id: Option<BindingId>,
    pub voice_id: Option<VoiceId>,
    pub instrument_id: Option<InstrumentId>,
    pub delta_in: i32,
    pub delta_out: i32,
}

impl SegmentChoice {
    pub fn is_unlimited_in(&self) -> bool {
        self.delta_in == DELTA_UNLIMITED
    }

    pub fn is_unlimited_out(&self) -> bool {
        self.delta_out == DELTA_UNLIMITED
    }
}

/// One pattern of a choice's voice placed into the segment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentChoiceArrangement {
    pub id: ArrangementId,
    pub choice_id: ChoiceId,
    pub pattern_id: PatternId,
}

/// One audio scheduled by the arrangement: the atom of fabricated sound.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SegmentChoiceArrangementPick {
    pub id: PickId,
    pub arrangement_id: ArrangementId,
    pub event_id: EventId,
    pub audio_id: AudioId,
    /// Seconds from segment start.
    pub start: f64,
    /// Seconds, clipped to segment end.
    pub length: f64,
    pub amplitude: f64,
    /// Note name, or "X" for unpitched.
    pub note: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentMeme {
    pub segment_id: SegmentId,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SegmentChord {
    pub segment_id: SegmentId,
    pub position: f64,
    pub name: String,
}

/// Voicing copied from content for one segment chord, so downstream
/// render needs no library snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentChordVoicing {
    pub segment_id: SegmentId,
    /// Index into the segment's chord list (sorted by position).
    pub chord_index: usize,
    pub category: InstrumentCategory,
    pub notes: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlimited_sentinel_helpers() {
        let choice = SegmentChoice {
            id: ChoiceId(1),
            segment_id: SegmentId(1),
            program_id: ProgramId(1),
            program_kind: ProgramKind::Main,
            sequence_binding_id: None,
            voice_id: Some(VoiceId(3)),
            instrument_id: Some(InstrumentId(2)),
            delta_in: DELTA_UNLIMITED,
            delta_out: 64,
        };
        assert!(choice.is_unlimited_in());
        assert!(!choice.is_unlimited_out());
    }

    #[test]
    fn segment_roundtrips_through_json() {
        let segment = Segment {
            id: SegmentId(4),
            chain_id: ChainId(1),
            offset: 3,
            kind: SegmentKind::Continue,
            state: SegmentState::Crafted,
            key: "C minor".to_string(),
            tempo: 120.0,
            intensity: 0.6,
            total: 16,
            delta: 48,
        };
        let json = serde_json::to_string(&segment).unwrap();
        let back: Segment = serde_json::from_str(&json).unwrap();
        assert_eq!(segment, back);
    }
}
