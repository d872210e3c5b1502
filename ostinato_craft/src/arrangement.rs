// Arrangement craft — voices, instruments, deltas, picks.
//
// The second half of a craft pass: for every voice of the main program,
// choose an instrument, place the voice's delta window on the macro arc,
// and expand its patterns into concrete audio picks. Picks are the
// terminal output of fabrication: (audio, start, length, amplitude, note)
// rows a mixer renders with no further lookups.
//
// The delta schedule shapes long-form intensity. Voices enter across the
// fade-in zone of the arc and leave across the fade-out zone, and
// per-kind overrides pin unlimited windows so at least one voice stays
// audible through every transition. Volume ratios derive from each
// choice's window through the category's envelope variant.

use crate::error::CraftError;
use crate::fabricator::Fabricator;
use ostinato_content::{
    ArrangementId, AudioId, ContentSnapshot, DELTA_UNLIMITED, Instrument, InstrumentAudio,
    InstrumentCategory, InstrumentId, Pattern, ProgramKind, ProgramVoice, SegmentKind,
};
use ostinato_music::{ATONAL_MARKER, Note, is_atonal, name_similarity};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use std::collections::BTreeSet;

pub fn craft(fab: &mut Fabricator, rng: &mut impl Rng) -> Result<(), CraftError> {
    let snapshot = fab.snapshot();
    let (main_program, main_binding) = match fab.main_choice() {
        Some(choice) => (choice.program_id, choice.sequence_binding_id),
        None => return Err(CraftError::MissingEntity("main choice".to_string())),
    };
    let main_binding =
        main_binding.ok_or_else(|| CraftError::MissingEntity("main binding".to_string()))?;
    let binding = snapshot
        .binding(main_binding)
        .ok_or_else(|| CraftError::MissingEntity(format!("{main_binding}")))?;
    let program = snapshot
        .program(main_program)
        .ok_or_else(|| CraftError::MissingEntity(format!("{main_program}")))?;
    let voices = snapshot.voices_of(main_program);
    if voices.is_empty() {
        log::warn!("main program {} has no voices to arrange", program.name);
        return Ok(());
    }

    let plans = schedule_deltas(fab, &voices, rng);
    let segment_memes: BTreeSet<String> = fab.memes().iter().map(|m| m.name.clone()).collect();

    for (voice, plan) in voices.iter().zip(&plans) {
        let reused = if fab.kind() == SegmentKind::Continue {
            fab.previous_choice_for_voice(voice.id)
                .and_then(|c| c.instrument_id.map(|i| (i, c.delta_in, c.delta_out)))
        } else {
            None
        };
        let (instrument_id, delta_in, delta_out) = match reused {
            Some(carried) => carried,
            None => match choose_instrument(snapshot, voice, &segment_memes, rng) {
                Some(id) => (id, plan.delta_in, plan.delta_out),
                None => continue,
            },
        };
        let instrument = snapshot
            .instrument(instrument_id)
            .ok_or_else(|| CraftError::MissingEntity(format!("{instrument_id}")))?;
        let choice_id = fab.add_choice(
            main_program,
            ProgramKind::Main,
            None,
            Some(voice.id),
            Some(instrument_id),
            delta_in,
            delta_out,
        );
        for pattern in snapshot.patterns_of(binding.sequence_id, voice.id) {
            if pattern.total == 0 {
                log::warn!("pattern {} has zero length; skipped", pattern.name);
                continue;
            }
            let ctx = VoiceArrangement {
                arrangement_id: fab.add_arrangement(choice_id, pattern.id),
                pattern,
                category: voice.category,
                instrument,
                delta_in,
                delta_out,
                restart_on_chord_change: program.restart_on_chord_change,
            };
            arrange_pattern(fab, &ctx, rng)?;
        }
    }
    Ok(())
}

// --- delta scheduling --------------------------------------------------------

struct DeltaPlan {
    delta_in: i32,
    delta_out: i32,
}

/// Place every voice's delta window on the macro arc. The fade budget
/// splits between construction and deconstruction by a ratio drawn from
/// `fade_shift_range`, voices take evenly spaced slots in each zone, and
/// jitter keeps entrances from stacking. Overrides then pin the
/// unlimited windows each segment kind requires. Callers guarantee at
/// least one voice.
fn schedule_deltas(
    fab: &Fabricator,
    voices: &[&ProgramVoice],
    rng: &mut impl Rng,
) -> Vec<DeltaPlan> {
    let config = fab.config();
    // A new arc starts with this segment; otherwise the running arc
    // carries over from the retrospective.
    let arc_start = match fab.kind() {
        SegmentKind::Initial | SegmentKind::NextMacro => f64::from(fab.delta()),
        _ => f64::from(fab.arc_start_delta()),
    };
    let arc_end = arc_start + f64::from(config.macro_arc_beats);
    let budget = f64::from(config.macro_arc_beats) * config.fade_zone_fraction;
    let (low, high) = config.fade_shift_range;
    let share = rng.random_range(low.min(high)..=high.max(low));
    let in_zone = budget * share;
    let out_zone = budget * (1.0 - share);
    let jitter = Normal::new(0.0, config.delta_jitter_beats).ok();

    let count = voices.len();
    let mut plans = Vec::with_capacity(count);
    for index in 0..count {
        let slot = (index as f64 + 0.5) / count as f64;
        let noise_in = jitter.map_or(0.0, |d| d.sample(rng));
        let noise_out = jitter.map_or(0.0, |d| d.sample(rng));
        let delta_in = (arc_start + slot * in_zone + noise_in)
            .clamp(arc_start, arc_start + in_zone)
            .round() as i32;
        let delta_out = (arc_end - out_zone + slot * out_zone + noise_out)
            .clamp(arc_end - out_zone, arc_end)
            .round() as i32;
        plans.push(DeltaPlan { delta_in, delta_out });
    }

    match fab.kind() {
        SegmentKind::Initial => {
            plans[rng.random_range(0..count)].delta_in = DELTA_UNLIMITED;
            plans[rng.random_range(0..count)].delta_out = DELTA_UNLIMITED;
        }
        SegmentKind::NextMain | SegmentKind::NextMacro => {
            plans[rng.random_range(0..count)].delta_out = DELTA_UNLIMITED;
            // The voice carrying the predecessor's unlimited-out category
            // opens unlimited, so the transition hands off audibly.
            let carried = fab
                .previous_unlimited_out_category()
                .and_then(|category| voices.iter().position(|v| v.category == category))
                .unwrap_or_else(|| rng.random_range(0..count));
            plans[carried].delta_in = DELTA_UNLIMITED;
        }
        SegmentKind::Continue | SegmentKind::Pending => {}
    }
    plans
}

// --- instrument selection ----------------------------------------------------

/// Uniform pick among instruments of the voice's category whose memes
/// (if any) overlap the segment memes. None is a content gap: warn and
/// let the caller skip the voice.
fn choose_instrument(
    snapshot: &ContentSnapshot,
    voice: &ProgramVoice,
    segment_memes: &BTreeSet<String>,
    rng: &mut impl Rng,
) -> Option<InstrumentId> {
    let candidates: Vec<&Instrument> = snapshot
        .instruments_of_category(voice.category)
        .into_iter()
        .filter(|instrument| {
            let memes = snapshot.memes_of_instrument(instrument.id);
            memes.is_empty() || memes.iter().any(|m| segment_memes.contains(&m.name))
        })
        .collect();
    if candidates.is_empty() {
        log::warn!(
            "no {:?} instrument matches segment memes; voice {} skipped",
            voice.category,
            voice.name
        );
        return None;
    }
    Some(candidates[rng.random_range(0..candidates.len())].id)
}

// --- pattern expansion -------------------------------------------------------

/// Everything one (choice, pattern) expansion needs.
struct VoiceArrangement<'a> {
    arrangement_id: ArrangementId,
    pattern: &'a Pattern,
    category: InstrumentCategory,
    instrument: &'a Instrument,
    delta_in: i32,
    delta_out: i32,
    restart_on_chord_change: bool,
}

/// Loop the pattern across the segment, or restart it at every chord
/// boundary when the program is flagged for it, and pick audio for each
/// sounding event.
fn arrange_pattern(
    fab: &mut Fabricator,
    ctx: &VoiceArrangement,
    rng: &mut impl Rng,
) -> Result<(), CraftError> {
    let total = f64::from(fab.total());
    let mut bounds = vec![0.0];
    if ctx.restart_on_chord_change {
        for chord in fab.chords() {
            if chord.position > 0.0 && chord.position < total {
                bounds.push(chord.position);
            }
        }
    }
    bounds.push(total);

    let step = f64::from(ctx.pattern.total);
    for window in bounds.windows(2) {
        let (span_start, span_end) = (window[0], window[1]);
        let mut start = span_start;
        while start < span_end {
            place_instance(fab, ctx, start, span_end, rng)?;
            start += step;
        }
    }
    Ok(())
}

/// Pick audio for every event of one pattern instance starting at
/// `instance_start` beats.
fn place_instance(
    fab: &mut Fabricator,
    ctx: &VoiceArrangement,
    instance_start: f64,
    span_end: f64,
    rng: &mut impl Rng,
) -> Result<(), CraftError> {
    let snapshot = fab.snapshot();
    let total = f64::from(fab.total());
    let shape = envelope(ctx.category);
    let ramp = fab.config().fade_ramp_beats;
    for event in snapshot.events_of(ctx.pattern.id) {
        let beat = instance_start + event.position;
        if beat >= span_end {
            continue;
        }
        let arc_position = if shape.top_of_segment {
            f64::from(fab.delta())
        } else {
            f64::from(fab.delta()) + beat
        };
        let ratio = volume_ratio(shape, ctx.delta_in, ctx.delta_out, arc_position, ramp);
        if ratio <= 0.0 {
            continue;
        }
        let track = snapshot
            .track(event.track_id)
            .ok_or_else(|| CraftError::MissingEntity(format!("{}", event.track_id)))?;
        for tone in event.tones.split(',') {
            let tone = tone.trim();
            if tone.is_empty() {
                continue;
            }
            let note = pick_note(fab, ctx.category, tone, beat);
            let audio = match fab.cached_pick(event.id, &note) {
                Some(cached) => cached,
                None => {
                    let selected = select_audio(
                        snapshot,
                        ctx.instrument.id,
                        ctx.category,
                        &track.name,
                        &note,
                        rng,
                    );
                    if selected.is_none() {
                        log::warn!(
                            "no audio on {} for track {} note {note}; event skipped",
                            ctx.instrument.name,
                            track.name
                        );
                    }
                    fab.cache_pick(event.id, &note, selected);
                    selected
                }
            };
            let Some(audio_id) = audio else {
                continue;
            };
            let start = fab.seconds_at(beat);
            let length = fab.seconds_at(event.duration.min(total - beat));
            let amplitude = event.velocity * ratio * ctx.instrument.volume;
            fab.add_pick(
                ctx.arrangement_id,
                event.id,
                audio_id,
                start,
                length,
                amplitude,
                &note,
            );
        }
    }
    Ok(())
}

// --- envelopes ---------------------------------------------------------------

/// Which features of the delta window shape a category's volume.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Envelope {
    top_of_segment: bool,
    fade_in: bool,
    fade_out: bool,
}

/// Per-category envelope variants. Top-of-segment categories judge
/// audibility by the segment's own delta; the rest judge per event.
fn envelope(category: InstrumentCategory) -> Envelope {
    match category {
        InstrumentCategory::Drum | InstrumentCategory::Stab => Envelope {
            top_of_segment: true,
            fade_in: false,
            fade_out: true,
        },
        InstrumentCategory::Bass => Envelope {
            top_of_segment: false,
            fade_in: false,
            fade_out: false,
        },
        InstrumentCategory::PercussionLoop => Envelope {
            top_of_segment: false,
            fade_in: true,
            fade_out: false,
        },
        InstrumentCategory::Pad | InstrumentCategory::Sticky | InstrumentCategory::Stripe => {
            Envelope {
                top_of_segment: true,
                fade_in: true,
                fade_out: true,
            }
        }
    }
}

/// Volume ratio for a delta window at arc position `x`. Unlimited bounds
/// always pass; fading bounds ramp linearly across `ramp` beats inside
/// the window edge; hard bounds step.
fn volume_ratio(shape: Envelope, delta_in: i32, delta_out: i32, x: f64, ramp: f64) -> f64 {
    let ramp = ramp.max(f64::EPSILON);
    let mut ratio = 1.0_f64;
    if delta_in != DELTA_UNLIMITED {
        let lower = f64::from(delta_in);
        if shape.fade_in {
            ratio = ratio.min(((x - lower) / ramp).clamp(0.0, 1.0));
        } else if x < lower {
            return 0.0;
        }
    }
    if delta_out != DELTA_UNLIMITED {
        let upper = f64::from(delta_out);
        if shape.fade_out {
            ratio = ratio.min(((upper - x) / ramp).clamp(0.0, 1.0));
        } else if x >= upper {
            return 0.0;
        }
    }
    ratio
}

// --- note and audio picking --------------------------------------------------

/// Resolve one event tone to the note a pick carries. Percussive
/// categories and atonal tones take the atonal marker; pitched tones
/// take the active chord voicing's note nearest the tone, shifted into
/// its register. Missing chord or voicing also falls back to the marker.
fn pick_note(fab: &Fabricator, category: InstrumentCategory, tone: &str, beat: f64) -> String {
    if category.is_percussive() || is_atonal(tone) {
        return ATONAL_MARKER.to_string();
    }
    let Some(target) = Note::parse(tone) else {
        return ATONAL_MARKER.to_string();
    };
    let Some((chord_index, _)) = fab.chord_at(beat) else {
        return ATONAL_MARKER.to_string();
    };
    let Some(voicing) = fab.voicing_at(chord_index, category) else {
        return ATONAL_MARKER.to_string();
    };
    let mut best: Option<(i32, Note)> = None;
    for text in voicing.notes.split(',') {
        let Some(candidate) = Note::parse(text) else {
            continue;
        };
        let shifted = candidate.nearest_to(target);
        let distance = (shifted.number() - target.number()).abs();
        if best.is_none_or(|(nearest, _)| distance < nearest) {
            best = Some((distance, shifted));
        }
    }
    match best {
        Some((_, note)) => note.to_string(),
        None => ATONAL_MARKER.to_string(),
    }
}

/// Choose the audio for one (event, note). Percussive categories match
/// the track name against audio names; pitched categories demand the
/// exact note, uniformly among ties.
fn select_audio(
    snapshot: &ContentSnapshot,
    instrument: InstrumentId,
    category: InstrumentCategory,
    track_name: &str,
    note: &str,
    rng: &mut impl Rng,
) -> Option<AudioId> {
    let audios = snapshot.audios_of(instrument);
    if category.is_percussive() {
        return audios
            .into_iter()
            .max_by(|a, b| {
                name_similarity(track_name, &a.name)
                    .total_cmp(&name_similarity(track_name, &b.name))
            })
            .map(|audio| audio.id);
    }
    let target = Note::parse(note);
    let matches: Vec<&InstrumentAudio> = audios
        .into_iter()
        .filter(|audio| match target {
            Some(wanted) => Note::parse(&audio.note) == Some(wanted),
            None => is_atonal(&audio.note),
        })
        .collect();
    if matches.is_empty() {
        None
    } else {
        Some(matches[rng.random_range(0..matches.len())].id)
    }
}
