// Content library entities and the immutable snapshot.
//
// A library is authored once (or exported from an editor) and never
// mutated during fabrication. `ContentBuilder` assembles the entities with
// auto-assigned ids; `build()` freezes them into a `ContentSnapshot` whose
// parent-to-child indexes are sorted up front, so every lookup during a
// craft pass is cheap and iterates in a fixed order.
//
// The entity shape mirrors a relational schema: programs own sequences,
// sequences own bindings/chords/patterns, voices own tracks, patterns own
// events, instruments own audios. Memes hang off programs, bindings, and
// instruments as plain name rows.
//
// `content_hash()` is the identity digests key on. It is recomputed from
// the entities on every call, never cached, so a digest cache can trust
// that equal hashes mean equal content.

use crate::ids::{
    AudioId, BindingId, ChordId, EventId, InstrumentId, PatternId, ProgramId, SequenceId, TrackId,
    VoiceId,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// The two program roles in fabrication: macros shape the long arc,
/// mains supply the per-segment material.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProgramKind {
    Macro,
    Main,
}

/// Instrument (and voice, and voicing) category. Drives envelope choice
/// and audio selection during arrangement craft.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum InstrumentCategory {
    Drum,
    Stab,
    Bass,
    PercussionLoop,
    Pad,
    Sticky,
    Stripe,
}

impl InstrumentCategory {
    pub const ALL: [InstrumentCategory; 7] = [
        InstrumentCategory::Drum,
        InstrumentCategory::Stab,
        InstrumentCategory::Bass,
        InstrumentCategory::PercussionLoop,
        InstrumentCategory::Pad,
        InstrumentCategory::Sticky,
        InstrumentCategory::Stripe,
    ];

    /// Percussive categories pick audio by name rather than by note.
    pub fn is_percussive(self) -> bool {
        matches!(
            self,
            InstrumentCategory::Drum | InstrumentCategory::PercussionLoop
        )
    }
}

/// Canonical meme spelling: trimmed, UPPERCASE.
pub fn normalize_meme(name: &str) -> String {
    name.trim().to_uppercase()
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

/// A macro or main program.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub id: ProgramId,
    pub kind: ProgramKind,
    pub name: String,
    /// Key text, e.g. "C minor"; parsed on demand by craft.
    pub key: String,
    pub tempo: f64,
    pub intensity: f64,
    /// When set, patterns restart at each segment chord boundary instead
    /// of looping continuously.
    pub restart_on_chord_change: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramMeme {
    pub program_id: ProgramId,
    pub name: String,
}

/// One section of a program's material.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sequence {
    pub id: SequenceId,
    pub program_id: ProgramId,
    pub name: String,
    pub key: String,
    pub intensity: f64,
    /// Length in beats.
    pub total: u32,
}

/// Places a sequence at an offset in its program's arc. Multiple bindings
/// may share one offset; they are variations chosen at random.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceBinding {
    pub id: BindingId,
    pub program_id: ProgramId,
    pub sequence_id: SequenceId,
    pub offset: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingMeme {
    pub binding_id: BindingId,
    pub name: String,
}

/// A chord within a sequence, at a beat position.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SequenceChord {
    pub id: ChordId,
    pub sequence_id: SequenceId,
    pub position: f64,
    pub name: String,
}

/// Note set realizing a sequence chord for one instrument category.
/// Keyed by (chord, category); at most one voicing per pair.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChordVoicing {
    pub chord_id: ChordId,
    pub category: InstrumentCategory,
    /// Comma-separated note names, e.g. "C2, Eb2, G2".
    pub notes: String,
}

/// A performing voice of a main program (one per instrument role).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramVoice {
    pub id: VoiceId,
    pub program_id: ProgramId,
    pub category: InstrumentCategory,
    pub name: String,
}

/// A loopable phrase for one voice within one sequence.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pattern {
    pub id: PatternId,
    pub sequence_id: SequenceId,
    pub voice_id: VoiceId,
    pub name: String,
    /// Length in beats.
    pub total: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceTrack {
    pub id: TrackId,
    pub voice_id: VoiceId,
    pub name: String,
}

/// One note event within a pattern.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PatternEvent {
    pub id: EventId,
    pub pattern_id: PatternId,
    pub track_id: TrackId,
    pub position: f64,
    pub duration: f64,
    pub velocity: f64,
    /// Comma-separated note names, or "X" for unpitched hits.
    pub tones: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub id: InstrumentId,
    pub category: InstrumentCategory,
    pub name: String,
    pub volume: f64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentMeme {
    pub instrument_id: InstrumentId,
    pub name: String,
}

/// A playable sample belonging to an instrument.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InstrumentAudio {
    pub id: AudioId,
    pub instrument_id: InstrumentId,
    pub name: String,
    /// Note name the sample was recorded at, or "X" for unpitched.
    pub note: String,
    pub start: f64,
    pub length: f64,
    pub tempo: f64,
    pub intensity: f64,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Assembles library entities with auto-assigned ids. Call order defines
/// the ids; `build()` freezes everything into a snapshot.
#[derive(Default)]
pub struct ContentBuilder {
    programs: Vec<Program>,
    program_memes: Vec<ProgramMeme>,
    sequences: Vec<Sequence>,
    bindings: Vec<SequenceBinding>,
    binding_memes: Vec<BindingMeme>,
    chords: Vec<SequenceChord>,
    voicings: Vec<ChordVoicing>,
    voices: Vec<ProgramVoice>,
    patterns: Vec<Pattern>,
    tracks: Vec<VoiceTrack>,
    events: Vec<PatternEvent>,
    instruments: Vec<Instrument>,
    instrument_memes: Vec<InstrumentMeme>,
    audios: Vec<InstrumentAudio>,
}

impl ContentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn program(
        &mut self,
        kind: ProgramKind,
        name: &str,
        key: &str,
        tempo: f64,
        intensity: f64,
    ) -> ProgramId {
        let id = ProgramId(self.programs.len() as u32 + 1);
        self.programs.push(Program {
            id,
            kind,
            name: name.to_string(),
            key: key.to_string(),
            tempo,
            intensity,
            restart_on_chord_change: false,
        });
        id
    }

    /// Flag a program's patterns to restart at segment chord boundaries.
    pub fn restart_on_chord_change(&mut self, program: ProgramId) {
        if let Some(p) = self.programs.iter_mut().find(|p| p.id == program) {
            p.restart_on_chord_change = true;
        }
    }

    pub fn program_meme(&mut self, program: ProgramId, name: &str) {
        self.program_memes.push(ProgramMeme {
            program_id: program,
            name: normalize_meme(name),
        });
    }

    pub fn sequence(
        &mut self,
        program: ProgramId,
        name: &str,
        key: &str,
        intensity: f64,
        total: u32,
    ) -> SequenceId {
        let id = SequenceId(self.sequences.len() as u32 + 1);
        self.sequences.push(Sequence {
            id,
            program_id: program,
            name: name.to_string(),
            key: key.to_string(),
            intensity,
            total,
        });
        id
    }

    pub fn binding(&mut self, program: ProgramId, sequence: SequenceId, offset: u32) -> BindingId {
        let id = BindingId(self.bindings.len() as u32 + 1);
        self.bindings.push(SequenceBinding {
            id,
            program_id: program,
            sequence_id: sequence,
            offset,
        });
        id
    }

    pub fn binding_meme(&mut self, binding: BindingId, name: &str) {
        self.binding_memes.push(BindingMeme {
            binding_id: binding,
            name: normalize_meme(name),
        });
    }

    pub fn sequence_chord(&mut self, sequence: SequenceId, position: f64, name: &str) -> ChordId {
        let id = ChordId(self.chords.len() as u32 + 1);
        self.chords.push(SequenceChord {
            id,
            sequence_id: sequence,
            position,
            name: name.to_string(),
        });
        id
    }

    pub fn voicing(&mut self, chord: ChordId, category: InstrumentCategory, notes: &str) {
        self.voicings.push(ChordVoicing {
            chord_id: chord,
            category,
            notes: notes.to_string(),
        });
    }

    pub fn voice(
        &mut self,
        program: ProgramId,
        category: InstrumentCategory,
        name: &str,
    ) -> VoiceId {
        let id = VoiceId(self.voices.len() as u32 + 1);
        self.voices.push(ProgramVoice {
            id,
            program_id: program,
            category,
            name: name.to_string(),
        });
        id
    }

    pub fn pattern(
        &mut self,
        sequence: SequenceId,
        voice: VoiceId,
        name: &str,
        total: u32,
    ) -> PatternId {
        let id = PatternId(self.patterns.len() as u32 + 1);
        self.patterns.push(Pattern {
            id,
            sequence_id: sequence,
            voice_id: voice,
            name: name.to_string(),
            total,
        });
        id
    }

    pub fn track(&mut self, voice: VoiceId, name: &str) -> TrackId {
        let id = TrackId(self.tracks.len() as u32 + 1);
        self.tracks.push(VoiceTrack {
            id,
            voice_id: voice,
            name: name.to_string(),
        });
        id
    }

    #[allow(clippy::too_many_arguments)]
    pub fn event(
        &mut self,
        pattern: PatternId,
        track: TrackId,
        position: f64,
        duration: f64,
        velocity: f64,
        tones: &str,
    ) -> EventId {
        let id = EventId(self.events.len() as u32 + 1);
        self.events.push(PatternEvent {
            id,
            pattern_id: pattern,
            track_id: track,
            position,
            duration,
            velocity,
            tones: tones.to_string(),
        });
        id
    }

    pub fn instrument(
        &mut self,
        category: InstrumentCategory,
        name: &str,
        volume: f64,
    ) -> InstrumentId {
        let id = InstrumentId(self.instruments.len() as u32 + 1);
        self.instruments.push(Instrument {
            id,
            category,
            name: name.to_string(),
            volume,
        });
        id
    }

    pub fn instrument_meme(&mut self, instrument: InstrumentId, name: &str) {
        self.instrument_memes.push(InstrumentMeme {
            instrument_id: instrument,
            name: normalize_meme(name),
        });
    }

    #[allow(clippy::too_many_arguments)]
    pub fn audio(
        &mut self,
        instrument: InstrumentId,
        name: &str,
        note: &str,
        start: f64,
        length: f64,
        tempo: f64,
        intensity: f64,
    ) -> AudioId {
        let id = AudioId(self.audios.len() as u32 + 1);
        self.audios.push(InstrumentAudio {
            id,
            instrument_id: instrument,
            name: name.to_string(),
            note: note.to_string(),
            start,
            length,
            tempo,
            intensity,
        });
        id
    }

    /// Freeze the entities into a snapshot with sorted child indexes.
    pub fn build(self) -> ContentSnapshot {
        let mut snapshot = ContentSnapshot {
            programs: self.programs.into_iter().map(|e| (e.id, e)).collect(),
            sequences: self.sequences.into_iter().map(|e| (e.id, e)).collect(),
            bindings: self.bindings.into_iter().map(|e| (e.id, e)).collect(),
            chords: self.chords.into_iter().map(|e| (e.id, e)).collect(),
            voices: self.voices.into_iter().map(|e| (e.id, e)).collect(),
            patterns: self.patterns.into_iter().map(|e| (e.id, e)).collect(),
            tracks: self.tracks.into_iter().map(|e| (e.id, e)).collect(),
            events: self.events.into_iter().map(|e| (e.id, e)).collect(),
            instruments: self.instruments.into_iter().map(|e| (e.id, e)).collect(),
            audios: self.audios.into_iter().map(|e| (e.id, e)).collect(),
            voicings: self
                .voicings
                .into_iter()
                .map(|v| ((v.chord_id, v.category), v))
                .collect(),
            program_memes: group_memes(self.program_memes, |m| m.program_id, |m| &m.name),
            binding_memes: group_memes(self.binding_memes, |m| m.binding_id, |m| &m.name),
            instrument_memes: group_memes(self.instrument_memes, |m| m.instrument_id, |m| &m.name),
            sequences_of_program: BTreeMap::new(),
            bindings_of_program: BTreeMap::new(),
            chords_of_sequence: BTreeMap::new(),
            voices_of_program: BTreeMap::new(),
            patterns_of_sequence_voice: BTreeMap::new(),
            tracks_of_voice: BTreeMap::new(),
            events_of_pattern: BTreeMap::new(),
            audios_of_instrument: BTreeMap::new(),
        };
        snapshot.index();
        snapshot
    }
}

fn group_memes<K: Ord + Copy, M>(
    memes: Vec<M>,
    key: impl Fn(&M) -> K,
    name: impl Fn(&M) -> &str,
) -> BTreeMap<K, Vec<M>> {
    let mut grouped: BTreeMap<K, Vec<M>> = BTreeMap::new();
    for meme in memes {
        grouped.entry(key(&meme)).or_default().push(meme);
    }
    for list in grouped.values_mut() {
        list.sort_by(|a, b| name(a).cmp(name(b)));
    }
    grouped
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Immutable, indexed view of a content library. All child lists come back
/// in a fixed order: bindings by (offset, id), chords and events by
/// position, everything else by id.
pub struct ContentSnapshot {
    programs: BTreeMap<ProgramId, Program>,
    sequences: BTreeMap<SequenceId, Sequence>,
    bindings: BTreeMap<BindingId, SequenceBinding>,
    chords: BTreeMap<ChordId, SequenceChord>,
    voices: BTreeMap<VoiceId, ProgramVoice>,
    patterns: BTreeMap<PatternId, Pattern>,
    tracks: BTreeMap<TrackId, VoiceTrack>,
    events: BTreeMap<EventId, PatternEvent>,
    instruments: BTreeMap<InstrumentId, Instrument>,
    audios: BTreeMap<AudioId, InstrumentAudio>,
    voicings: BTreeMap<(ChordId, InstrumentCategory), ChordVoicing>,
    program_memes: BTreeMap<ProgramId, Vec<ProgramMeme>>,
    binding_memes: BTreeMap<BindingId, Vec<BindingMeme>>,
    instrument_memes: BTreeMap<InstrumentId, Vec<InstrumentMeme>>,
    sequences_of_program: BTreeMap<ProgramId, Vec<SequenceId>>,
    bindings_of_program: BTreeMap<ProgramId, Vec<BindingId>>,
    chords_of_sequence: BTreeMap<SequenceId, Vec<ChordId>>,
    voices_of_program: BTreeMap<ProgramId, Vec<VoiceId>>,
    patterns_of_sequence_voice: BTreeMap<(SequenceId, VoiceId), Vec<PatternId>>,
    tracks_of_voice: BTreeMap<VoiceId, Vec<TrackId>>,
    events_of_pattern: BTreeMap<PatternId, Vec<EventId>>,
    audios_of_instrument: BTreeMap<InstrumentId, Vec<AudioId>>,
}

impl ContentSnapshot {
    fn index(&mut self) {
        for sequence in self.sequences.values() {
            self.sequences_of_program
                .entry(sequence.program_id)
                .or_default()
                .push(sequence.id);
        }
        for binding in self.bindings.values() {
            self.bindings_of_program
                .entry(binding.program_id)
                .or_default()
                .push(binding.id);
        }
        for ids in self.bindings_of_program.values_mut() {
            ids.sort_by_key(|id| (self.bindings[id].offset, *id));
        }
        for chord in self.chords.values() {
            self.chords_of_sequence
                .entry(chord.sequence_id)
                .or_default()
                .push(chord.id);
        }
        for ids in self.chords_of_sequence.values_mut() {
            ids.sort_by(|a, b| {
                self.chords[a]
                    .position
                    .total_cmp(&self.chords[b].position)
                    .then(a.cmp(b))
            });
        }
        for voice in self.voices.values() {
            self.voices_of_program
                .entry(voice.program_id)
                .or_default()
                .push(voice.id);
        }
        for pattern in self.patterns.values() {
            self.patterns_of_sequence_voice
                .entry((pattern.sequence_id, pattern.voice_id))
                .or_default()
                .push(pattern.id);
        }
        for track in self.tracks.values() {
            self.tracks_of_voice
                .entry(track.voice_id)
                .or_default()
                .push(track.id);
        }
        for event in self.events.values() {
            self.events_of_pattern
                .entry(event.pattern_id)
                .or_default()
                .push(event.id);
        }
        for ids in self.events_of_pattern.values_mut() {
            ids.sort_by(|a, b| {
                self.events[a]
                    .position
                    .total_cmp(&self.events[b].position)
                    .then(a.cmp(b))
            });
        }
        for audio in self.audios.values() {
            self.audios_of_instrument
                .entry(audio.instrument_id)
                .or_default()
                .push(audio.id);
        }
    }

    // --- programs ---

    pub fn programs(&self) -> impl Iterator<Item = &Program> {
        self.programs.values()
    }

    pub fn programs_of_kind(&self, kind: ProgramKind) -> Vec<&Program> {
        self.programs.values().filter(|p| p.kind == kind).collect()
    }

    pub fn program(&self, id: ProgramId) -> Option<&Program> {
        self.programs.get(&id)
    }

    // --- sequences & bindings ---

    pub fn sequence(&self, id: SequenceId) -> Option<&Sequence> {
        self.sequences.get(&id)
    }

    pub fn sequences_of(&self, program: ProgramId) -> Vec<&Sequence> {
        child_refs(&self.sequences_of_program, program, &self.sequences)
    }

    pub fn binding(&self, id: BindingId) -> Option<&SequenceBinding> {
        self.bindings.get(&id)
    }

    /// Bindings of a program, sorted by (offset, id).
    pub fn bindings_of(&self, program: ProgramId) -> Vec<&SequenceBinding> {
        child_refs(&self.bindings_of_program, program, &self.bindings)
    }

    /// Bindings at one offset — variations, chosen among at random.
    pub fn bindings_at(&self, program: ProgramId, offset: u32) -> Vec<&SequenceBinding> {
        self.bindings_of(program)
            .into_iter()
            .filter(|b| b.offset == offset)
            .collect()
    }

    pub fn first_binding_offset(&self, program: ProgramId) -> Option<u32> {
        self.bindings_of(program).first().map(|b| b.offset)
    }

    pub fn last_binding_offset(&self, program: ProgramId) -> Option<u32> {
        self.bindings_of(program).last().map(|b| b.offset)
    }

    // --- memes ---

    pub fn memes_of_program(&self, id: ProgramId) -> &[ProgramMeme] {
        self.program_memes.get(&id).map_or(&[], Vec::as_slice)
    }

    pub fn memes_of_binding(&self, id: BindingId) -> &[BindingMeme] {
        self.binding_memes.get(&id).map_or(&[], Vec::as_slice)
    }

    pub fn memes_of_instrument(&self, id: InstrumentId) -> &[InstrumentMeme] {
        self.instrument_memes.get(&id).map_or(&[], Vec::as_slice)
    }

    // --- chords & voicings ---

    /// Chords of a sequence, sorted by position.
    pub fn chords_of_sequence(&self, sequence: SequenceId) -> Vec<&SequenceChord> {
        child_refs(&self.chords_of_sequence, sequence, &self.chords)
    }

    pub fn voicing_of(
        &self,
        chord: ChordId,
        category: InstrumentCategory,
    ) -> Option<&ChordVoicing> {
        self.voicings.get(&(chord, category))
    }

    // --- voices, patterns, tracks, events ---

    pub fn voice(&self, id: VoiceId) -> Option<&ProgramVoice> {
        self.voices.get(&id)
    }

    pub fn voices_of(&self, program: ProgramId) -> Vec<&ProgramVoice> {
        child_refs(&self.voices_of_program, program, &self.voices)
    }

    pub fn patterns_of(&self, sequence: SequenceId, voice: VoiceId) -> Vec<&Pattern> {
        child_refs(
            &self.patterns_of_sequence_voice,
            (sequence, voice),
            &self.patterns,
        )
    }

    pub fn track(&self, id: TrackId) -> Option<&VoiceTrack> {
        self.tracks.get(&id)
    }

    pub fn tracks_of(&self, voice: VoiceId) -> Vec<&VoiceTrack> {
        child_refs(&self.tracks_of_voice, voice, &self.tracks)
    }

    pub fn event(&self, id: EventId) -> Option<&PatternEvent> {
        self.events.get(&id)
    }

    /// Events of a pattern, sorted by position.
    pub fn events_of(&self, pattern: PatternId) -> Vec<&PatternEvent> {
        child_refs(&self.events_of_pattern, pattern, &self.events)
    }

    // --- instruments & audios ---

    pub fn instruments(&self) -> impl Iterator<Item = &Instrument> {
        self.instruments.values()
    }

    pub fn instruments_of_category(&self, category: InstrumentCategory) -> Vec<&Instrument> {
        self.instruments
            .values()
            .filter(|i| i.category == category)
            .collect()
    }

    pub fn instrument(&self, id: InstrumentId) -> Option<&Instrument> {
        self.instruments.get(&id)
    }

    pub fn audio(&self, id: AudioId) -> Option<&InstrumentAudio> {
        self.audios.get(&id)
    }

    pub fn audios_of(&self, instrument: InstrumentId) -> Vec<&InstrumentAudio> {
        child_refs(&self.audios_of_instrument, instrument, &self.audios)
    }

    // --- identity ---

    /// Stable hex digest over every entity, recomputed on each call.
    /// Equal hashes mean equal content; digest caches key on this.
    pub fn content_hash(&self) -> String {
        let mut feed = HashFeed(crc32fast::Hasher::new());
        for p in self.programs.values() {
            feed.str("program");
            feed.u32(p.id.0);
            feed.str(match p.kind {
                ProgramKind::Macro => "macro",
                ProgramKind::Main => "main",
            });
            feed.str(&p.name);
            feed.str(&p.key);
            feed.f64(p.tempo);
            feed.f64(p.intensity);
            feed.flag(p.restart_on_chord_change);
        }
        for (id, memes) in &self.program_memes {
            for m in memes {
                feed.str("program_meme");
                feed.u32(id.0);
                feed.str(&m.name);
            }
        }
        for s in self.sequences.values() {
            feed.str("sequence");
            feed.u32(s.id.0);
            feed.u32(s.program_id.0);
            feed.str(&s.name);
            feed.str(&s.key);
            feed.f64(s.intensity);
            feed.u32(s.total);
        }
        for b in self.bindings.values() {
            feed.str("binding");
            feed.u32(b.id.0);
            feed.u32(b.program_id.0);
            feed.u32(b.sequence_id.0);
            feed.u32(b.offset);
        }
        for (id, memes) in &self.binding_memes {
            for m in memes {
                feed.str("binding_meme");
                feed.u32(id.0);
                feed.str(&m.name);
            }
        }
        for c in self.chords.values() {
            feed.str("chord");
            feed.u32(c.id.0);
            feed.u32(c.sequence_id.0);
            feed.f64(c.position);
            feed.str(&c.name);
        }
        for v in self.voicings.values() {
            feed.str("voicing");
            feed.u32(v.chord_id.0);
            feed.str(&format!("{:?}", v.category));
            feed.str(&v.notes);
        }
        for v in self.voices.values() {
            feed.str("voice");
            feed.u32(v.id.0);
            feed.u32(v.program_id.0);
            feed.str(&format!("{:?}", v.category));
            feed.str(&v.name);
        }
        for p in self.patterns.values() {
            feed.str("pattern");
            feed.u32(p.id.0);
            feed.u32(p.sequence_id.0);
            feed.u32(p.voice_id.0);
            feed.str(&p.name);
            feed.u32(p.total);
        }
        for t in self.tracks.values() {
            feed.str("track");
            feed.u32(t.id.0);
            feed.u32(t.voice_id.0);
            feed.str(&t.name);
        }
        for e in self.events.values() {
            feed.str("event");
            feed.u32(e.id.0);
            feed.u32(e.pattern_id.0);
            feed.u32(e.track_id.0);
            feed.f64(e.position);
            feed.f64(e.duration);
            feed.f64(e.velocity);
            feed.str(&e.tones);
        }
        for i in self.instruments.values() {
            feed.str("instrument");
            feed.u32(i.id.0);
            feed.str(&format!("{:?}", i.category));
            feed.str(&i.name);
            feed.f64(i.volume);
        }
        for (id, memes) in &self.instrument_memes {
            for m in memes {
                feed.str("instrument_meme");
                feed.u32(id.0);
                feed.str(&m.name);
            }
        }
        for a in self.audios.values() {
            feed.str("audio");
            feed.u32(a.id.0);
            feed.u32(a.instrument_id.0);
            feed.str(&a.name);
            feed.str(&a.note);
            feed.f64(a.start);
            feed.f64(a.length);
            feed.f64(a.tempo);
            feed.f64(a.intensity);
        }
        format!("{:08x}", feed.0.finalize())
    }
}

fn child_refs<'a, P: Ord, I: Ord + Copy, E>(
    index: &BTreeMap<P, Vec<I>>,
    parent: P,
    entities: &'a BTreeMap<I, E>,
) -> Vec<&'a E> {
    index
        .get(&parent)
        .map(|ids| ids.iter().filter_map(|id| entities.get(id)).collect())
        .unwrap_or_default()
}

/// Field-by-field byte feed into the crc32 hasher. Strings terminate with
/// a zero byte so adjacent fields cannot alias.
struct HashFeed(crc32fast::Hasher);

impl HashFeed {
    fn str(&mut self, s: &str) {
        self.0.update(s.as_bytes());
        self.0.update(&[0]);
    }

    fn u32(&mut self, v: u32) {
        self.0.update(&v.to_le_bytes());
    }

    fn f64(&mut self, v: f64) {
        self.0.update(&v.to_bits().to_le_bytes());
    }

    fn flag(&mut self, v: bool) {
        self.0.update(&[v as u8]);
    }
}
