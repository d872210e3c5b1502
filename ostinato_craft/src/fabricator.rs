// Fabricator — the per-segment craft context.
//
// One Fabricator owns one craft pass: it borrows the immutable content
// snapshot, clones the retrospective (crafted history) out of the store
// at construction, and accumulates the `CraftedDraft` that a successful
// pass lands with `SegmentStore::commit_crafted`. Nothing reads the store
// again between construction and commit, so the pass sees one consistent
// world even while other chains fabricate concurrently.
//
// Construction performs the dangling check: a direct predecessor that is
// not Crafted fails the pass fatally, before any writes.

use crate::config::CraftConfig;
use crate::error::CraftError;
use ostinato_content::{
    ArrangementId, AudioId, BindingId, ChoiceId, ContentSnapshot, CraftedDraft, DELTA_UNLIMITED,
    EventId, InstrumentCategory, InstrumentId, PatternId, PickId, ProgramId, ProgramKind,
    Retrospective, SegmentChoice, SegmentChoiceArrangement, SegmentChoiceArrangementPick,
    SegmentChord, SegmentChordVoicing, SegmentId, SegmentKind, SegmentMeme, SegmentState,
    SegmentStore, StoreError, VoiceId, normalize_meme,
};
use std::collections::BTreeMap;

pub struct Fabricator<'a> {
    snapshot: &'a ContentSnapshot,
    config: &'a CraftConfig,
    offset: u32,
    retrospective: Retrospective,
    draft: CraftedDraft,
    next_choice: u32,
    next_arrangement: u32,
    next_pick: u32,
    /// (event, note) -> chosen audio, for within-segment stability.
    /// `None` records a miss so its warning fires once.
    pick_cache: BTreeMap<(EventId, String), Option<AudioId>>,
}

impl<'a> Fabricator<'a> {
    /// Build the context for one craft pass. Fails with
    /// `DanglingSegment` when the predecessor exists and is not Crafted;
    /// nothing has been written at that point.
    pub fn prepare(
        snapshot: &'a ContentSnapshot,
        store: &SegmentStore,
        config: &'a CraftConfig,
        segment_id: SegmentId,
    ) -> Result<Fabricator<'a>, CraftError> {
        let segment = store
            .segment(segment_id)
            .ok_or(StoreError::UnknownSegment(segment_id))?;
        let retrospective = store.retrospective(segment.offset);
        if let Some(previous) = &retrospective.previous_segment {
            if previous.state != SegmentState::Crafted {
                return Err(CraftError::DanglingSegment(segment_id));
            }
        }
        Ok(Fabricator {
            snapshot,
            config,
            offset: segment.offset,
            retrospective,
            draft: CraftedDraft::new(segment_id),
            next_choice: store.next_choice_id().0,
            next_arrangement: store.next_arrangement_id().0,
            next_pick: store.next_pick_id().0,
            pick_cache: BTreeMap::new(),
        })
    }

    // --- context reads ---

    pub fn snapshot(&self) -> &'a ContentSnapshot {
        self.snapshot
    }

    pub fn config(&self) -> &CraftConfig {
        self.config
    }

    pub fn segment_id(&self) -> SegmentId {
        self.draft.segment_id
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn retrospective(&self) -> &Retrospective {
        &self.retrospective
    }

    pub fn kind(&self) -> SegmentKind {
        self.draft.kind
    }

    pub fn key(&self) -> &str {
        &self.draft.key
    }

    pub fn tempo(&self) -> f64 {
        self.draft.tempo
    }

    pub fn intensity(&self) -> f64 {
        self.draft.intensity
    }

    pub fn total(&self) -> u32 {
        self.draft.total
    }

    pub fn delta(&self) -> u32 {
        self.draft.delta
    }

    /// Seconds from segment start for a beat position, at segment tempo.
    pub fn seconds_at(&self, beats: f64) -> f64 {
        beats * 60.0 / self.draft.tempo
    }

    /// The draft's program-level main choice (the one carrying a binding).
    pub fn main_choice(&self) -> Option<&SegmentChoice> {
        self.draft
            .choices
            .iter()
            .find(|c| c.program_kind == ProgramKind::Main && c.sequence_binding_id.is_some())
    }

    pub fn macro_choice(&self) -> Option<&SegmentChoice> {
        self.draft
            .choices
            .iter()
            .find(|c| c.program_kind == ProgramKind::Macro)
    }

    /// Last draft chord at or before `position`, with its index.
    pub fn chord_at(&self, position: f64) -> Option<(usize, &SegmentChord)> {
        self.draft
            .chords
            .iter()
            .enumerate()
            .filter(|(_, chord)| chord.position <= position)
            .last()
    }

    pub fn voicing_at(
        &self,
        chord_index: usize,
        category: InstrumentCategory,
    ) -> Option<&SegmentChordVoicing> {
        self.draft
            .voicings
            .iter()
            .find(|v| v.chord_index == chord_index && v.category == category)
    }

    /// The predecessor's choice for one of its voices.
    pub fn previous_choice_for_voice(&self, voice: VoiceId) -> Option<&SegmentChoice> {
        self.retrospective
            .previous_choices
            .iter()
            .find(|c| c.voice_id == Some(voice))
    }

    /// Category of the predecessor voice choice that was
    /// deltaOut-unlimited, if any.
    pub fn previous_unlimited_out_category(&self) -> Option<InstrumentCategory> {
        self.retrospective
            .previous_choices
            .iter()
            .filter(|c| c.voice_id.is_some() && c.delta_out == DELTA_UNLIMITED)
            .find_map(|c| Some(self.snapshot.voice(c.voice_id?)?.category))
    }

    pub fn arc_start_delta(&self) -> u32 {
        self.retrospective.arc_start_delta
    }

    // --- draft mutation ---

    pub fn set_kind(&mut self, kind: SegmentKind) {
        self.draft.kind = kind;
    }

    pub fn set_values(&mut self, key: &str, tempo: f64, intensity: f64, total: u32, delta: u32) {
        self.draft.key = key.to_string();
        self.draft.tempo = tempo;
        self.draft.intensity = intensity;
        self.draft.total = total;
        self.draft.delta = delta;
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_choice(
        &mut self,
        program_id: ProgramId,
        program_kind: ProgramKind,
        sequence_binding_id: Option<BindingId>,
        voice_id: Option<VoiceId>,
        instrument_id: Option<InstrumentId>,
        delta_in: i32,
        delta_out: i32,
    ) -> ChoiceId {
        let id = ChoiceId(self.next_choice);
        self.next_choice += 1;
        self.draft.choices.push(SegmentChoice {
            id,
            segment_id: self.draft.segment_id,
            program_id,
            program_kind,
            sequence_binding_id,
            voice_id,
            instrument_id,
            delta_in,
            delta_out,
        });
        id
    }

    pub fn add_arrangement(&mut self, choice_id: ChoiceId, pattern_id: PatternId) -> ArrangementId {
        let id = ArrangementId(self.next_arrangement);
        self.next_arrangement += 1;
        self.draft.arrangements.push(SegmentChoiceArrangement {
            id,
            choice_id,
            pattern_id,
        });
        id
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_pick(
        &mut self,
        arrangement_id: ArrangementId,
        event_id: EventId,
        audio_id: AudioId,
        start: f64,
        length: f64,
        amplitude: f64,
        note: &str,
    ) -> PickId {
        let id = PickId(self.next_pick);
        self.next_pick += 1;
        self.draft.picks.push(SegmentChoiceArrangementPick {
            id,
            arrangement_id,
            event_id,
            audio_id,
            start,
            length,
            amplitude,
            note: note.to_string(),
        });
        id
    }

    /// Add a segment meme. Names are normalized and the set is a union:
    /// duplicates collapse.
    pub fn add_meme(&mut self, name: &str) {
        let name = normalize_meme(name);
        if name.is_empty() {
            return;
        }
        if !self.draft.memes.iter().any(|m| m.name == name) {
            self.draft.memes.push(SegmentMeme {
                segment_id: self.draft.segment_id,
                name,
            });
        }
    }

    pub fn memes(&self) -> &[SegmentMeme] {
        &self.draft.memes
    }

    /// Append a chord; craft adds them in position order. Returns the
    /// chord index voicing rows refer to.
    pub fn add_chord(&mut self, position: f64, name: &str) -> usize {
        self.draft.chords.push(SegmentChord {
            segment_id: self.draft.segment_id,
            position,
            name: name.to_string(),
        });
        self.draft.chords.len() - 1
    }

    pub fn chords(&self) -> &[SegmentChord] {
        &self.draft.chords
    }

    pub fn add_voicing(&mut self, chord_index: usize, category: InstrumentCategory, notes: &str) {
        self.draft.voicings.push(SegmentChordVoicing {
            segment_id: self.draft.segment_id,
            chord_index,
            category,
            notes: notes.to_string(),
        });
    }

    // --- audio pick cache ---

    pub fn cached_pick(&self, event: EventId, note: &str) -> Option<Option<AudioId>> {
        self.pick_cache.get(&(event, note.to_string())).copied()
    }

    pub fn cache_pick(&mut self, event: EventId, note: &str, audio: Option<AudioId>) {
        self.pick_cache.insert((event, note.to_string()), audio);
    }

    /// Yield the assembled draft for `SegmentStore::commit_crafted`.
    pub fn finish(self) -> CraftedDraft {
        self.draft
    }
}
