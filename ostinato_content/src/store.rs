// SegmentStore — the per-chain segment stream.
//
// One store owns one chain. Segments are created Planned at dense offsets
// and crafted exactly once: the craft pass assembles a `CraftedDraft`
// off to the side and lands it with `commit_crafted`, a single call that
// either writes the whole segment (header + children) or nothing.
// Concurrent chains are separate stores; nothing here is shared.
//
// The `Retrospective` is the store's read model for craft: the direct
// predecessor with its choices and chords, plus the arc-start delta —
// everything the next pass needs to know about history, cloned out so the
// pass never holds a live borrow of the store.
//
// Store state serializes to JSON in whole for snapshotting and tests.

use crate::ids::{ArrangementId, ChainId, ChoiceId, PickId, SegmentId};
use crate::library::ProgramKind;
use crate::segment::{
    Chain, Segment, SegmentChoice, SegmentChoiceArrangement, SegmentChoiceArrangementPick,
    SegmentChord, SegmentChordVoicing, SegmentKind, SegmentMeme, SegmentState,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("unknown segment {0}")]
    UnknownSegment(SegmentId),
    #[error("segment {id} is {actual:?}, expected {expected:?}")]
    WrongState {
        id: SegmentId,
        actual: SegmentState,
        expected: SegmentState,
    },
}

/// Everything a craft pass writes for one segment, assembled before any
/// store mutation. Child rows already carry their final ids.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CraftedDraft {
    pub segment_id: SegmentId,
    pub kind: SegmentKind,
    pub key: String,
    pub tempo: f64,
    pub intensity: f64,
    pub total: u32,
    pub delta: u32,
    pub choices: Vec<SegmentChoice>,
    pub arrangements: Vec<SegmentChoiceArrangement>,
    pub picks: Vec<SegmentChoiceArrangementPick>,
    pub memes: Vec<SegmentMeme>,
    pub chords: Vec<SegmentChord>,
    pub voicings: Vec<SegmentChordVoicing>,
}

impl CraftedDraft {
    pub fn new(segment_id: SegmentId) -> Self {
        CraftedDraft {
            segment_id,
            kind: SegmentKind::Pending,
            key: String::new(),
            tempo: 0.0,
            intensity: 0.0,
            total: 0,
            delta: 0,
            choices: Vec::new(),
            arrangements: Vec::new(),
            picks: Vec::new(),
            memes: Vec::new(),
            chords: Vec::new(),
            voicings: Vec::new(),
        }
    }
}

/// Crafted-history view for the segment about to be crafted at an offset.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Retrospective {
    /// Direct predecessor (offset - 1), if any.
    pub previous_segment: Option<Segment>,
    pub previous_choices: Vec<SegmentChoice>,
    pub previous_chords: Vec<SegmentChord>,
    /// Delta of the first segment of the predecessor's macro-program arc.
    /// Zero when there is no history.
    pub arc_start_delta: u32,
}

impl Retrospective {
    /// The predecessor's macro-kind choice, if any.
    pub fn previous_macro_choice(&self) -> Option<&SegmentChoice> {
        self.previous_choices
            .iter()
            .find(|c| c.program_kind == ProgramKind::Macro)
    }

    /// The predecessor's main-kind choice (the one carrying a binding).
    pub fn previous_main_choice(&self) -> Option<&SegmentChoice> {
        self.previous_choices
            .iter()
            .find(|c| c.program_kind == ProgramKind::Main && c.sequence_binding_id.is_some())
    }
}

/// Owns one chain's segment stream.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SegmentStore {
    chain: Chain,
    segments: Vec<Segment>,
    choices: Vec<SegmentChoice>,
    arrangements: Vec<SegmentChoiceArrangement>,
    picks: Vec<SegmentChoiceArrangementPick>,
    memes: Vec<SegmentMeme>,
    chords: Vec<SegmentChord>,
    voicings: Vec<SegmentChordVoicing>,
}

impl SegmentStore {
    pub fn new(chain_name: &str) -> Self {
        SegmentStore {
            chain: Chain {
                id: ChainId(1),
                name: chain_name.to_string(),
            },
            segments: Vec::new(),
            choices: Vec::new(),
            arrangements: Vec::new(),
            picks: Vec::new(),
            memes: Vec::new(),
            chords: Vec::new(),
            voicings: Vec::new(),
        }
    }

    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    // --- creation & lifecycle ---

    /// Append a planned segment at the next offset. Segment offsets are
    /// dense: the new offset is always `segment_count()`.
    pub fn create_segment(&mut self) -> SegmentId {
        let offset = self.segments.len() as u32;
        let id = SegmentId(offset + 1);
        self.segments.push(Segment {
            id,
            chain_id: self.chain.id,
            offset,
            kind: SegmentKind::Pending,
            state: SegmentState::Planned,
            key: String::new(),
            tempo: 0.0,
            intensity: 0.0,
            total: 0,
            delta: 0,
        });
        id
    }

    /// Transition Planned -> Crafting. The craft pass calls this before
    /// doing any work so a concurrent observer sees the segment claimed.
    pub fn begin_craft(&mut self, id: SegmentId) -> Result<(), StoreError> {
        let segment = self.segment_mut(id)?;
        if segment.state != SegmentState::Planned {
            return Err(StoreError::WrongState {
                id,
                actual: segment.state,
                expected: SegmentState::Planned,
            });
        }
        segment.state = SegmentState::Crafting;
        Ok(())
    }

    /// Land a fully assembled draft: header fields, state = Crafted, and
    /// all child rows, in one call. On error nothing is written.
    pub fn commit_crafted(&mut self, draft: CraftedDraft) -> Result<(), StoreError> {
        let segment = self.segment_mut(draft.segment_id)?;
        if segment.state == SegmentState::Crafted {
            return Err(StoreError::WrongState {
                id: draft.segment_id,
                actual: SegmentState::Crafted,
                expected: SegmentState::Crafting,
            });
        }
        let offset = segment.offset;
        segment.kind = draft.kind;
        segment.key = draft.key;
        segment.tempo = draft.tempo;
        segment.intensity = draft.intensity;
        segment.total = draft.total;
        segment.delta = draft.delta;
        segment.state = SegmentState::Crafted;
        self.choices.extend(draft.choices);
        self.arrangements.extend(draft.arrangements);
        self.picks.extend(draft.picks);
        self.memes.extend(draft.memes);
        self.chords.extend(draft.chords);
        self.voicings.extend(draft.voicings);
        log::debug!("committed segment {} at offset {offset}", draft.segment_id);
        Ok(())
    }

    /// Discard a segment's children and reset it to Planned/Pending so a
    /// later pass can craft it again. Recovery path for failed crafts.
    pub fn revert_to_planned(&mut self, id: SegmentId) -> Result<(), StoreError> {
        let chain = self.chain.id;
        let segment = self.segment_mut(id)?;
        segment.kind = SegmentKind::Pending;
        segment.state = SegmentState::Planned;
        segment.key.clear();
        segment.tempo = 0.0;
        segment.intensity = 0.0;
        segment.total = 0;
        segment.delta = 0;
        let dropped_choices: Vec<_> = self
            .choices
            .iter()
            .filter(|c| c.segment_id == id)
            .map(|c| c.id)
            .collect();
        let dropped_arrangements: Vec<_> = self
            .arrangements
            .iter()
            .filter(|a| dropped_choices.contains(&a.choice_id))
            .map(|a| a.id)
            .collect();
        self.choices.retain(|c| c.segment_id != id);
        self.arrangements
            .retain(|a| !dropped_choices.contains(&a.choice_id));
        self.picks
            .retain(|p| !dropped_arrangements.contains(&p.arrangement_id));
        self.memes.retain(|m| m.segment_id != id);
        self.chords.retain(|c| c.segment_id != id);
        self.voicings.retain(|v| v.segment_id != id);
        log::warn!("reverted segment {id} of chain {chain} to planned");
        Ok(())
    }

    /// Terminal failure marking, for orchestrators that give up on a
    /// segment instead of requeueing it.
    pub fn mark_failed(&mut self, id: SegmentId) -> Result<(), StoreError> {
        self.segment_mut(id)?.state = SegmentState::Failed;
        Ok(())
    }

    /// Reset to an empty stream. Test support.
    pub fn clear(&mut self) {
        self.segments.clear();
        self.choices.clear();
        self.arrangements.clear();
        self.picks.clear();
        self.memes.clear();
        self.chords.clear();
        self.voicings.clear();
    }

    // --- reads ---

    pub fn segment(&self, id: SegmentId) -> Option<&Segment> {
        self.segments.iter().find(|s| s.id == id)
    }

    pub fn segment_at_offset(&self, offset: u32) -> Option<&Segment> {
        self.segments.get(offset as usize)
    }

    pub fn last_segment(&self) -> Option<&Segment> {
        self.segments.last()
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn choices_of(&self, id: SegmentId) -> Vec<&SegmentChoice> {
        self.choices.iter().filter(|c| c.segment_id == id).collect()
    }

    pub fn arrangements_of(&self, id: SegmentId) -> Vec<&SegmentChoiceArrangement> {
        let choice_ids: Vec<_> = self.choices_of(id).iter().map(|c| c.id).collect();
        self.arrangements
            .iter()
            .filter(|a| choice_ids.contains(&a.choice_id))
            .collect()
    }

    pub fn picks_of(&self, id: SegmentId) -> Vec<&SegmentChoiceArrangementPick> {
        let arrangement_ids: Vec<_> = self.arrangements_of(id).iter().map(|a| a.id).collect();
        self.picks
            .iter()
            .filter(|p| arrangement_ids.contains(&p.arrangement_id))
            .collect()
    }

    pub fn memes_of(&self, id: SegmentId) -> Vec<&SegmentMeme> {
        self.memes.iter().filter(|m| m.segment_id == id).collect()
    }

    /// Segment chords in position order (the craft pass writes them
    /// sorted; insertion order is preserved).
    pub fn chords_of(&self, id: SegmentId) -> Vec<&SegmentChord> {
        self.chords.iter().filter(|c| c.segment_id == id).collect()
    }

    pub fn voicings_of(&self, id: SegmentId) -> Vec<&SegmentChordVoicing> {
        self.voicings
            .iter()
            .filter(|v| v.segment_id == id)
            .collect()
    }

    // --- child id allocation ---
    //
    // Draft children carry final ids: one past the highest id currently
    // stored. A revert may free ids for reuse, but an id can never be
    // reissued while a surviving row still carries it.

    pub fn next_choice_id(&self) -> ChoiceId {
        ChoiceId(self.choices.iter().map(|c| c.id.0).max().unwrap_or(0) + 1)
    }

    pub fn next_arrangement_id(&self) -> ArrangementId {
        ArrangementId(self.arrangements.iter().map(|a| a.id.0).max().unwrap_or(0) + 1)
    }

    pub fn next_pick_id(&self) -> PickId {
        PickId(self.picks.iter().map(|p| p.id.0).max().unwrap_or(0) + 1)
    }

    /// Crafted-history view for crafting the segment at `offset`.
    pub fn retrospective(&self, offset: u32) -> Retrospective {
        let Some(previous) = offset
            .checked_sub(1)
            .and_then(|o| self.segment_at_offset(o))
        else {
            return Retrospective::default();
        };
        let previous_choices: Vec<SegmentChoice> = self
            .choices_of(previous.id)
            .into_iter()
            .cloned()
            .collect();
        let previous_chords: Vec<SegmentChord> =
            self.chords_of(previous.id).into_iter().cloned().collect();
        let arc_start_delta = self.arc_start_delta(previous, &previous_choices);
        Retrospective {
            previous_segment: Some(previous.clone()),
            previous_choices,
            previous_chords,
            arc_start_delta,
        }
    }

    /// Walk back from the predecessor while segments share its macro
    /// program; the earliest such segment's delta is the arc start.
    fn arc_start_delta(&self, previous: &Segment, previous_choices: &[SegmentChoice]) -> u32 {
        let Some(macro_program) = previous_choices
            .iter()
            .find(|c| c.program_kind == ProgramKind::Macro)
            .map(|c| c.program_id)
        else {
            return previous.delta;
        };
        let mut arc_start = previous.delta;
        for offset in (0..previous.offset).rev() {
            let Some(segment) = self.segment_at_offset(offset) else {
                break;
            };
            let same_macro = self
                .choices_of(segment.id)
                .iter()
                .any(|c| c.program_kind == ProgramKind::Macro && c.program_id == macro_program);
            if !same_macro {
                break;
            }
            arc_start = segment.delta;
        }
        arc_start
    }

    fn segment_mut(&mut self, id: SegmentId) -> Result<&mut Segment, StoreError> {
        self.segments
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(StoreError::UnknownSegment(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{ArrangementId, AudioId, ChoiceId, EventId, PatternId, PickId, ProgramId};

    fn crafted_draft(segment_id: SegmentId) -> CraftedDraft {
        let mut draft = CraftedDraft::new(segment_id);
        draft.kind = SegmentKind::Initial;
        draft.key = "C minor".to_string();
        draft.tempo = 120.0;
        draft.intensity = 0.5;
        draft.total = 16;
        draft.choices.push(SegmentChoice {
            id: ChoiceId(1),
            segment_id,
            program_id: ProgramId(1),
            program_kind: ProgramKind::Macro,
            sequence_binding_id: None,
            voice_id: None,
            instrument_id: None,
            delta_in: crate::segment::DELTA_UNLIMITED,
            delta_out: crate::segment::DELTA_UNLIMITED,
        });
        draft.arrangements.push(SegmentChoiceArrangement {
            id: ArrangementId(1),
            choice_id: ChoiceId(1),
            pattern_id: PatternId(1),
        });
        draft.picks.push(SegmentChoiceArrangementPick {
            id: PickId(1),
            arrangement_id: ArrangementId(1),
            event_id: EventId(1),
            audio_id: AudioId(1),
            start: 0.0,
            length: 0.5,
            amplitude: 1.0,
            note: "X".to_string(),
        });
        draft.memes.push(SegmentMeme {
            segment_id,
            name: "COZY".to_string(),
        });
        draft.chords.push(SegmentChord {
            segment_id,
            position: 0.0,
            name: "C Minor".to_string(),
        });
        draft
    }

    #[test]
    fn create_assigns_dense_offsets() {
        let mut store = SegmentStore::new("test");
        let first = store.create_segment();
        let second = store.create_segment();
        assert_eq!(store.segment(first).unwrap().offset, 0);
        assert_eq!(store.segment(second).unwrap().offset, 1);
        assert_eq!(store.segment_count(), 2);
        assert_eq!(store.last_segment().unwrap().id, second);
    }

    #[test]
    fn commit_writes_header_and_children() {
        let mut store = SegmentStore::new("test");
        let id = store.create_segment();
        store.begin_craft(id).unwrap();
        store.commit_crafted(crafted_draft(id)).unwrap();

        let segment = store.segment(id).unwrap();
        assert_eq!(segment.state, SegmentState::Crafted);
        assert_eq!(segment.kind, SegmentKind::Initial);
        assert_eq!(segment.key, "C minor");
        assert_eq!(store.choices_of(id).len(), 1);
        assert_eq!(store.arrangements_of(id).len(), 1);
        assert_eq!(store.picks_of(id).len(), 1);
        assert_eq!(store.memes_of(id).len(), 1);
        assert_eq!(store.chords_of(id).len(), 1);
    }

    #[test]
    fn commit_unknown_segment_writes_nothing() {
        let mut store = SegmentStore::new("test");
        let id = store.create_segment();
        let bogus = SegmentId(99);
        assert!(store.commit_crafted(crafted_draft(bogus)).is_err());
        assert!(store.choices_of(id).is_empty());
        assert!(store.choices_of(bogus).is_empty());
        assert_eq!(store.segment(id).unwrap().state, SegmentState::Planned);
    }

    #[test]
    fn double_commit_rejected() {
        let mut store = SegmentStore::new("test");
        let id = store.create_segment();
        store.commit_crafted(crafted_draft(id)).unwrap();
        assert!(store.commit_crafted(crafted_draft(id)).is_err());
    }

    #[test]
    fn begin_craft_requires_planned() {
        let mut store = SegmentStore::new("test");
        let id = store.create_segment();
        store.begin_craft(id).unwrap();
        assert!(store.begin_craft(id).is_err());
    }

    #[test]
    fn revert_drops_children_and_resets_header() {
        let mut store = SegmentStore::new("test");
        let id = store.create_segment();
        store.commit_crafted(crafted_draft(id)).unwrap();
        store.revert_to_planned(id).unwrap();

        let segment = store.segment(id).unwrap();
        assert_eq!(segment.state, SegmentState::Planned);
        assert_eq!(segment.kind, SegmentKind::Pending);
        assert!(segment.key.is_empty());
        assert!(store.choices_of(id).is_empty());
        assert!(store.arrangements_of(id).is_empty());
        assert!(store.picks_of(id).is_empty());
        assert!(store.memes_of(id).is_empty());
        assert!(store.chords_of(id).is_empty());
    }

    #[test]
    fn mark_failed_sets_state() {
        let mut store = SegmentStore::new("test");
        let id = store.create_segment();
        store.mark_failed(id).unwrap();
        assert_eq!(store.segment(id).unwrap().state, SegmentState::Failed);
    }

    #[test]
    fn retrospective_empty_without_history() {
        let mut store = SegmentStore::new("test");
        store.create_segment();
        let retro = store.retrospective(0);
        assert!(retro.previous_segment.is_none());
        assert_eq!(retro.arc_start_delta, 0);
    }

    #[test]
    fn retrospective_clones_predecessor() {
        let mut store = SegmentStore::new("test");
        let first = store.create_segment();
        store.commit_crafted(crafted_draft(first)).unwrap();
        store.create_segment();

        let retro = store.retrospective(1);
        let previous = retro.previous_segment.as_ref().unwrap();
        assert_eq!(previous.id, first);
        assert_eq!(retro.previous_choices.len(), 1);
        assert_eq!(retro.previous_chords.len(), 1);
        assert!(retro.previous_macro_choice().is_some());
    }

    #[test]
    fn store_roundtrips_through_json() {
        let mut store = SegmentStore::new("test");
        let id = store.create_segment();
        store.commit_crafted(crafted_draft(id)).unwrap();

        let json = serde_json::to_string(&store).unwrap();
        let back: SegmentStore = serde_json::from_str(&json).unwrap();
        assert_eq!(back.segment_count(), 1);
        assert_eq!(back.chords_of(id).len(), 1);
        assert_eq!(back.chain().name, "test");
    }
}
