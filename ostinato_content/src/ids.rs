// Strongly-typed entity id wrappers.
//
// All ids are compact integers: library ids are assigned by the
// `ContentBuilder` in authoring order, segment-side ids by the store and
// the craft draft as entities are created. The wrapper types keep a
// program id from being passed where an instrument id belongs.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub u32);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

entity_id!(/// Unique identifier for a program (macro or main).
ProgramId);
entity_id!(/// Unique identifier for a program sequence.
SequenceId);
entity_id!(/// Unique identifier for a sequence binding.
BindingId);
entity_id!(/// Unique identifier for a sequence chord.
ChordId);
entity_id!(/// Unique identifier for a pattern within a sequence/voice.
PatternId);
entity_id!(/// Unique identifier for a program voice.
VoiceId);
entity_id!(/// Unique identifier for a voice track.
TrackId);
entity_id!(/// Unique identifier for a pattern event.
EventId);
entity_id!(/// Unique identifier for an instrument.
InstrumentId);
entity_id!(/// Unique identifier for an instrument audio sample.
AudioId);
entity_id!(/// Unique identifier for a chain.
ChainId);
entity_id!(/// Unique identifier for a segment.
SegmentId);
entity_id!(/// Unique identifier for a segment choice.
ChoiceId);
entity_id!(/// Unique identifier for a segment choice arrangement.
ArrangementId);
entity_id!(/// Unique identifier for an arrangement pick.
PickId);
