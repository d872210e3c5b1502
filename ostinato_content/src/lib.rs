// ostinato_content — content library snapshot and segment persistence.
//
// This crate holds the two data worlds of the fabrication engine and the
// boundary between them:
//
// - The *library*: programs (macro and main), sequences, bindings, chords,
//   voicings, voices, patterns, events, instruments, and audios, assembled
//   once into an immutable `ContentSnapshot` with indexed lookups.
// - The *segment stream*: chains, segments, and the crafted child entities
//   (choices, arrangements, picks, memes, chords, voicings), owned by a
//   per-chain `SegmentStore`.
//
// Module overview:
// - `ids.rs`:     Strongly-typed integer id wrappers for every entity kind.
// - `library.rs`: Library entities, `ContentBuilder`, `ContentSnapshot`,
//                 and the content hash digests key on.
// - `segment.rs`: Chain/segment entities and crafted child rows.
// - `store.rs`:   `SegmentStore` — planned-segment creation, retrospective
//                 reads, and the atomic crafted-segment commit.
// - `demo.rs`:    A small built-in demo library for binaries and tests.
//
// **Critical constraint: determinism.** Snapshot lookups return children in
// a fixed order (sorted at build time), and all collections iterate
// deterministically. Use `BTreeMap` for keyed lookups, never `HashMap`.

pub mod demo;
pub mod ids;
pub mod library;
pub mod segment;
pub mod store;

pub use ids::{
    ArrangementId, AudioId, BindingId, ChainId, ChoiceId, ChordId, EventId, InstrumentId,
    PatternId, PickId, ProgramId, SegmentId, SequenceId, TrackId, VoiceId,
};
pub use library::{
    BindingMeme, ChordVoicing, ContentBuilder, ContentSnapshot, Instrument, InstrumentAudio,
    InstrumentCategory, InstrumentMeme, Pattern, PatternEvent, Program, ProgramKind, ProgramMeme,
    ProgramVoice, Sequence, SequenceBinding, SequenceChord, VoiceTrack, normalize_meme,
};
pub use segment::{
    Chain, DELTA_UNLIMITED, Segment, SegmentChoice, SegmentChoiceArrangement,
    SegmentChoiceArrangementPick, SegmentChord, SegmentChordVoicing, SegmentKind, SegmentMeme,
    SegmentState,
};
pub use store::{CraftedDraft, Retrospective, SegmentStore, StoreError};
