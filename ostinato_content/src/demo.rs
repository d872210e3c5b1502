// Built-in demo library.
//
// A small but complete content set used by the `fabricate` binary and the
// integration fixtures. The meme topology is closed on purpose:
//
// - Two macro programs, "Daybreak" and "Nightfall", chain head-to-tail:
//   Daybreak's last binding and Nightfall's first are both WILD, and
//   Nightfall's last and Daybreak's first are both TROPICAL, so macro
//   selection always finds exactly one forward candidate.
// - Main "Coastline" (TROPICAL, COZY) carries authored chords and
//   voicings; main "Undertow" (WILD, PESSIMISM) has a chordless sequence,
//   which routes harmony through the Markov fabrication path.
// - Every TROPICAL phase matches Coastline, every WILD phase matches
//   Undertow, so main selection never comes up empty.
//
// Undertow performs only percussive voices (Drum, PercussionLoop):
// fabricated chords carry no voicings, and percussive picking does not
// need them.

use crate::library::{ContentBuilder, ContentSnapshot, InstrumentCategory, ProgramKind};

/// Build the demo snapshot. Deterministic: same entities, same ids,
/// same content hash on every call.
pub fn demo_library() -> ContentSnapshot {
    let mut b = ContentBuilder::new();

    // --- macro programs ---

    let daybreak = b.program(ProgramKind::Macro, "Daybreak", "C major", 110.0, 0.4);
    b.program_meme(daybreak, "outlook");
    let dawning = b.sequence(daybreak, "Dawning", "C major", 0.3, 16);
    let noon = b.sequence(daybreak, "Noon", "G major", 0.6, 16);
    let daybreak_first = b.binding(daybreak, dawning, 0);
    b.binding_meme(daybreak_first, "tropical");
    let daybreak_last = b.binding(daybreak, noon, 1);
    b.binding_meme(daybreak_last, "wild");

    let nightfall = b.program(ProgramKind::Macro, "Nightfall", "A minor", 110.0, 0.6);
    b.program_meme(nightfall, "outlook");
    let dusk = b.sequence(nightfall, "Dusk", "A minor", 0.7, 16);
    let midnight = b.sequence(nightfall, "Midnight", "E minor", 0.4, 16);
    let nightfall_first = b.binding(nightfall, dusk, 0);
    b.binding_meme(nightfall_first, "wild");
    let nightfall_last = b.binding(nightfall, midnight, 1);
    b.binding_meme(nightfall_last, "tropical");

    // --- main "Coastline": authored chords and voicings ---

    let coastline = b.program(ProgramKind::Main, "Coastline", "C minor", 121.0, 0.5);
    b.program_meme(coastline, "tropical");
    b.program_meme(coastline, "cozy");

    let rising = b.sequence(coastline, "Rising", "C minor", 0.4, 16);
    let cresting = b.sequence(coastline, "Cresting", "Eb major", 0.7, 16);
    b.binding(coastline, rising, 0);
    b.binding(coastline, cresting, 1);
    b.binding(coastline, rising, 2);

    let chords = [
        (0.0, "C Minor", "C2, G2", "C4, Eb4, G4"),
        (4.0, "Ab Major", "Ab2, Eb2", "C4, Eb4, Ab4"),
        (8.0, "Eb Major", "Eb2, Bb2", "Bb3, Eb4, G4"),
        (12.0, "Bb Major", "Bb2, F2", "Bb3, D4, F4"),
    ];
    for (position, name, bass, pad) in chords {
        let chord = b.sequence_chord(rising, position, name);
        b.voicing(chord, InstrumentCategory::Bass, bass);
        b.voicing(chord, InstrumentCategory::Pad, pad);
    }
    let chords = [
        (0.0, "Eb Major", "Eb2, Bb2", "Bb3, Eb4, G4"),
        (8.0, "F Minor", "F2, Ab2", "C4, F4, Ab4"),
    ];
    for (position, name, bass, pad) in chords {
        let chord = b.sequence_chord(cresting, position, name);
        b.voicing(chord, InstrumentCategory::Bass, bass);
        b.voicing(chord, InstrumentCategory::Pad, pad);
    }

    let drums = b.voice(coastline, InstrumentCategory::Drum, "Drums");
    let bass = b.voice(coastline, InstrumentCategory::Bass, "Bass");
    let pad = b.voice(coastline, InstrumentCategory::Pad, "Pad");

    let kick = b.track(drums, "Kick");
    let snare = b.track(drums, "Snare");
    let hat = b.track(drums, "Hat");
    let bass_track = b.track(bass, "Bass");
    let pad_track = b.track(pad, "Pad");

    for sequence in [rising, cresting] {
        let beat = b.pattern(sequence, drums, "Beat", 4);
        b.event(beat, kick, 0.0, 0.5, 1.0, "X");
        b.event(beat, kick, 2.0, 0.5, 1.0, "X");
        b.event(beat, snare, 1.0, 0.5, 0.8, "X");
        b.event(beat, snare, 3.0, 0.5, 0.8, "X");
        for eighth in 0..8 {
            b.event(beat, hat, eighth as f64 * 0.5, 0.25, 0.5, "X");
        }
    }

    let undercurrent = b.pattern(rising, bass, "Undercurrent", 4);
    b.event(undercurrent, bass_track, 0.0, 1.0, 0.9, "C2");
    b.event(undercurrent, bass_track, 1.5, 0.5, 0.7, "C2");
    b.event(undercurrent, bass_track, 2.0, 1.0, 0.9, "G2");
    b.event(undercurrent, bass_track, 3.5, 0.5, 0.7, "Bb2");
    let undertow_line = b.pattern(cresting, bass, "Swell", 4);
    b.event(undertow_line, bass_track, 0.0, 1.5, 0.9, "Eb2");
    b.event(undertow_line, bass_track, 2.0, 1.5, 0.9, "F2");

    let wash = b.pattern(rising, pad, "Wash", 16);
    for (position, tones) in [
        (0.0, "C4, Eb4, G4"),
        (4.0, "C4, Eb4, Ab4"),
        (8.0, "Bb3, Eb4, G4"),
        (12.0, "Bb3, D4, F4"),
    ] {
        b.event(wash, pad_track, position, 4.0, 0.6, tones);
    }
    let wash_b = b.pattern(cresting, pad, "Wash B", 8);
    b.event(wash_b, pad_track, 0.0, 8.0, 0.6, "Bb3, Eb4, G4");

    // --- main "Undertow": chordless, percussion only ---

    let undertow = b.program(ProgramKind::Main, "Undertow", "A minor", 118.0, 0.7);
    b.program_meme(undertow, "wild");
    b.program_meme(undertow, "pessimism");

    let deep = b.sequence(undertow, "Deep", "A minor", 0.7, 16);
    b.binding(undertow, deep, 0);
    b.binding(undertow, deep, 1);

    let storm_drums = b.voice(undertow, InstrumentCategory::Drum, "Drums");
    let loops = b.voice(undertow, InstrumentCategory::PercussionLoop, "Loops");
    let storm_kick = b.track(storm_drums, "Kick");
    let storm_snare = b.track(storm_drums, "Snare");
    let loop_track = b.track(loops, "Loop");

    let storm_beat = b.pattern(deep, storm_drums, "Storm Beat", 4);
    b.event(storm_beat, storm_kick, 0.0, 0.5, 1.0, "X");
    b.event(storm_beat, storm_kick, 1.5, 0.5, 0.9, "X");
    b.event(storm_beat, storm_kick, 2.0, 0.5, 1.0, "X");
    b.event(storm_beat, storm_snare, 1.0, 0.5, 0.8, "X");
    b.event(storm_beat, storm_snare, 3.0, 0.5, 0.9, "X");
    let roll = b.pattern(deep, loops, "Roll", 8);
    b.event(roll, loop_track, 0.0, 8.0, 0.6, "X");

    // --- instruments ---

    let coastal_kit = b.instrument(InstrumentCategory::Drum, "Coastal Kit", 1.0);
    b.instrument_meme(coastal_kit, "tropical");
    b.audio(coastal_kit, "Kick Drum", "X", 0.0, 0.4, 120.0, 0.5);
    b.audio(coastal_kit, "Snare Drum", "X", 0.0, 0.3, 120.0, 0.5);
    b.audio(coastal_kit, "Closed Hat", "X", 0.0, 0.1, 120.0, 0.4);
    b.audio(coastal_kit, "Open Hat", "X", 0.0, 0.4, 120.0, 0.6);

    let storm_kit = b.instrument(InstrumentCategory::Drum, "Storm Kit", 1.0);
    b.instrument_meme(storm_kit, "wild");
    b.audio(storm_kit, "Heavy Kick", "X", 0.0, 0.5, 120.0, 0.8);
    b.audio(storm_kit, "Heavy Snare", "X", 0.0, 0.4, 120.0, 0.8);
    b.audio(storm_kit, "Heavy Hat", "X", 0.0, 0.2, 120.0, 0.6);

    let surf = b.instrument(InstrumentCategory::PercussionLoop, "Surf", 0.7);
    b.audio(surf, "Wave Loop", "X", 0.0, 4.0, 118.0, 0.6);
    b.audio(surf, "Foam Loop", "X", 0.0, 4.0, 118.0, 0.4);

    let round_bass = b.instrument(InstrumentCategory::Bass, "Round Bass", 0.9);
    for note in [
        "C2", "C#2", "D2", "Eb2", "E2", "F2", "F#2", "G2", "Ab2", "A2", "Bb2", "B2",
    ] {
        b.audio(
            round_bass,
            &format!("Round Bass {note}"),
            note,
            0.0,
            2.0,
            120.0,
            0.5,
        );
    }

    let glass_pad = b.instrument(InstrumentCategory::Pad, "Glass Pad", 0.8);
    for note in [
        "Bb3", "B3", "C4", "C#4", "D4", "Eb4", "E4", "F4", "F#4", "G4", "Ab4", "A4", "Bb4", "B4",
    ] {
        b.audio(
            glass_pad,
            &format!("Glass Pad {note}"),
            note,
            0.0,
            6.0,
            120.0,
            0.5,
        );
    }

    b.build()
}
