// End-to-end fabrication scenarios.
//
// Each test drives the real pipeline — create a segment, craft it, read
// the committed rows back out of the store — and verifies the
// chain-level contracts: kind progression under binding exhaustion,
// arc accumulation, meme union, delta-window pinning, atomic failure
// with revert, digest sharing, and seed reproducibility.

use fabrication_tests::FabricationHarness;
use ostinato_content::demo::demo_library;
use ostinato_content::{
    ContentBuilder, ProgramId, ProgramKind, SegmentId, SegmentKind, SegmentState, SegmentStore,
};
use ostinato_craft::{CraftConfig, CraftError, craft_segment};
use ostinato_digest::DigestHub;
use ostinato_music::Note;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::BTreeSet;
use std::sync::Arc;

// --- helpers ----------------------------------------------------------------

/// The (program, binding offset) of a segment's macro or main choice.
fn program_binding(
    harness: &FabricationHarness,
    id: SegmentId,
    kind: ProgramKind,
) -> (ProgramId, u32) {
    let choice = harness
        .store
        .choices_of(id)
        .into_iter()
        .find(|c| c.program_kind == kind && c.voice_id.is_none())
        .expect("segment is missing a program choice");
    let binding_id = choice
        .sequence_binding_id
        .expect("program choice carries no binding");
    let binding = harness.snapshot.binding(binding_id).expect("binding exists");
    (choice.program_id, binding.offset)
}

/// Every committed row of one segment, serialized for whole-row
/// comparison across chains.
fn segment_rows(harness: &FabricationHarness, id: SegmentId) -> String {
    serde_json::to_string(&(
        harness.store.segment(id),
        harness.store.choices_of(id),
        harness.store.arrangements_of(id),
        harness.store.picks_of(id),
        harness.store.memes_of(id),
        harness.store.chords_of(id),
        harness.store.voicings_of(id),
    ))
    .expect("segment rows serialize")
}

// --- scenarios --------------------------------------------------------------

/// The first crafted segment of a chain is Initial, committed, and fully
/// populated: memes, chords, choices, arrangements, and picks.
#[test]
fn first_segment_is_initial_and_committed() {
    let mut harness = FabricationHarness::new(1);
    let id = harness.craft_next().unwrap();

    let segment = harness.store.segment(id).unwrap();
    assert_eq!(segment.offset, 0);
    assert_eq!(segment.kind, SegmentKind::Initial);
    assert_eq!(segment.state, SegmentState::Crafted);
    assert_eq!(segment.delta, 0);
    assert!(segment.total > 0);
    assert!(segment.tempo > 0.0);
    assert!(!segment.key.is_empty());

    assert!(!harness.store.memes_of(id).is_empty());
    assert!(!harness.store.chords_of(id).is_empty());
    assert!(!harness.store.choices_of(id).is_empty());
    assert!(!harness.store.arrangements_of(id).is_empty());
    assert!(!harness.store.picks_of(id).is_empty());
}

/// Mid-chain kinds relate each segment to its predecessor exactly the
/// way binding exhaustion dictates: Continue advances the main binding
/// by one, NextMain advances the macro binding by one, NextMacro lands
/// on a different macro program at its first offset.
#[test]
fn kinds_follow_binding_exhaustion() {
    let mut harness = FabricationHarness::new(3);
    let ids = harness.craft_run(8);

    for pair in ids.windows(2) {
        let (previous, current) = (pair[0], pair[1]);
        let kind = harness.store.segment(current).unwrap().kind;

        let macro_now = program_binding(&harness, current, ProgramKind::Macro);
        let macro_before = program_binding(&harness, previous, ProgramKind::Macro);
        let main_now = program_binding(&harness, current, ProgramKind::Main);
        let main_before = program_binding(&harness, previous, ProgramKind::Main);

        match kind {
            SegmentKind::Continue => {
                assert_eq!(macro_now, macro_before);
                assert_eq!(main_now.0, main_before.0);
                assert_eq!(main_now.1, main_before.1 + 1);
            }
            SegmentKind::NextMain => {
                assert_eq!(macro_now.0, macro_before.0);
                assert_eq!(macro_now.1, macro_before.1 + 1);
                assert_eq!(
                    Some(main_now.1),
                    harness.snapshot.first_binding_offset(main_now.0)
                );
            }
            SegmentKind::NextMacro => {
                assert_ne!(macro_now.0, macro_before.0);
                assert_eq!(
                    Some(macro_now.1),
                    harness.snapshot.first_binding_offset(macro_now.0)
                );
                assert_eq!(
                    Some(main_now.1),
                    harness.snapshot.first_binding_offset(main_now.0)
                );
            }
            other => panic!("unexpected kind {other:?} mid-chain"),
        }
    }

    // A run this long must exercise every transition at least once.
    let kinds: Vec<SegmentKind> = ids
        .iter()
        .map(|&id| harness.store.segment(id).unwrap().kind)
        .collect();
    assert_eq!(kinds[0], SegmentKind::Initial);
    assert!(kinds.contains(&SegmentKind::Continue));
    assert!(kinds.contains(&SegmentKind::NextMain));
    assert!(kinds.contains(&SegmentKind::NextMacro));
}

/// Segment deltas accumulate: each segment starts on the beat where its
/// predecessor ended.
#[test]
fn deltas_accumulate_across_the_run() {
    let mut harness = FabricationHarness::new(5);
    let mut expected = 0;
    for id in harness.craft_run(6) {
        let segment = harness.store.segment(id).unwrap();
        assert_eq!(segment.delta, expected);
        assert!(segment.total > 0);
        expected += segment.total;
    }
}

/// A segment's memes are exactly the union of the program and binding
/// memes of its macro and main choices, stored normalized.
#[test]
fn segment_memes_union_programs_and_bindings() {
    let mut harness = FabricationHarness::new(9);
    for id in harness.craft_run(5) {
        let mut expected = BTreeSet::new();
        for choice in harness.store.choices_of(id) {
            let Some(binding) = choice.sequence_binding_id else {
                continue;
            };
            for meme in harness.snapshot.memes_of_program(choice.program_id) {
                expected.insert(meme.name.clone());
            }
            for meme in harness.snapshot.memes_of_binding(binding) {
                expected.insert(meme.name.clone());
            }
        }
        let actual: BTreeSet<String> = harness
            .store
            .memes_of(id)
            .into_iter()
            .map(|m| m.name.clone())
            .collect();
        assert_eq!(actual, expected);
        assert!(actual.iter().all(|name| !name.is_empty()));
        assert!(actual.iter().all(|name| *name == name.to_uppercase()));
    }
}

/// An Initial segment pins exactly one voice unlimited-in and one
/// unlimited-out, so something sounds from the first beat and something
/// carries across the first transition.
#[test]
fn initial_pins_one_unlimited_window_each_way() {
    for seed in [2, 4, 8, 16] {
        let mut harness = FabricationHarness::new(seed);
        let id = harness.craft_next().unwrap();

        let voiced: Vec<_> = harness
            .store
            .choices_of(id)
            .into_iter()
            .filter(|c| c.voice_id.is_some())
            .collect();
        assert!(!voiced.is_empty());
        assert_eq!(voiced.iter().filter(|c| c.is_unlimited_in()).count(), 1);
        assert_eq!(voiced.iter().filter(|c| c.is_unlimited_out()).count(), 1);
    }
}

/// A pass that fails program selection commits nothing, and reverting
/// the segment to planned makes it craftable again with better content
/// on the same store.
#[test]
fn failed_pass_reverts_and_requeues() {
    // A library with a macro program but no mains: main selection must
    // come up empty on the first pass.
    let mut builder = ContentBuilder::new();
    let solo = builder.program(ProgramKind::Macro, "Solo", "C major", 100.0, 0.5);
    let only = builder.sequence(solo, "Only", "C major", 0.5, 16);
    builder.binding(solo, only, 0);
    let broken = builder.build();

    let config = CraftConfig::default();
    let digests = DigestHub::new(config.digest_params(), config.cache_config());
    let mut store = SegmentStore::new("requeue");
    let mut rng = StdRng::seed_from_u64(6);

    let id = store.create_segment();
    let result = craft_segment(&broken, &mut store, &digests, &config, id, &mut rng);
    assert!(matches!(result, Err(CraftError::NoMainProgramAvailable(_))));

    // Nothing landed; the segment is parked mid-craft.
    assert_eq!(store.segment(id).unwrap().state, SegmentState::Crafting);
    assert!(store.choices_of(id).is_empty());
    assert!(store.picks_of(id).is_empty());

    store.revert_to_planned(id).unwrap();
    assert_eq!(store.segment(id).unwrap().state, SegmentState::Planned);

    // The same planned segment crafts cleanly against the demo library.
    let demo = demo_library();
    craft_segment(&demo, &mut store, &digests, &config, id, &mut rng).unwrap();
    assert_eq!(store.segment(id).unwrap().state, SegmentState::Crafted);
    assert!(!store.picks_of(id).is_empty());
}

/// Segments craft strictly in chain order: a segment whose predecessor
/// is still planned is rejected before any writes, and crafting in
/// order then succeeds.
#[test]
fn predecessors_must_craft_first() {
    let mut harness = FabricationHarness::new(12);
    let first = harness.store.create_segment();
    let second = harness.store.create_segment();

    let result = craft_segment(
        &harness.snapshot,
        &mut harness.store,
        &harness.digests,
        &harness.config,
        second,
        &mut harness.rng,
    );
    assert!(matches!(result, Err(CraftError::DanglingSegment(id)) if id == second));
    assert_eq!(
        harness.store.segment(second).unwrap().state,
        SegmentState::Planned
    );

    for id in [first, second] {
        craft_segment(
            &harness.snapshot,
            &mut harness.store,
            &harness.digests,
            &harness.config,
            id,
            &mut harness.rng,
        )
        .unwrap();
        assert_eq!(harness.store.segment(id).unwrap().state, SegmentState::Crafted);
    }
}

/// One digest hub serves any number of chains: repeated lookups over
/// the same library share a single computed digest, keyed on content
/// rather than snapshot identity.
#[test]
fn digests_are_shared_across_chains() {
    let snapshot = demo_library();
    let config = CraftConfig::default();
    let digests = DigestHub::new(config.digest_params(), config.cache_config());
    let mut rng = StdRng::seed_from_u64(21);

    for chain in ["alpha", "beta"] {
        let mut store = SegmentStore::new(chain);
        let id = store.create_segment();
        craft_segment(&snapshot, &mut store, &digests, &config, id, &mut rng).unwrap();
    }

    let first = digests.markov(&snapshot).unwrap();
    let second = digests.markov(&snapshot).unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    // A separately built but identical library hits the same entry.
    let rebuilt = demo_library();
    let third = digests.markov(&rebuilt).unwrap();
    assert!(Arc::ptr_eq(&first, &third));
}

/// The same library and seed fabricate the same chain, row for row.
#[test]
fn chains_are_reproducible_for_a_seed() {
    let mut a = FabricationHarness::new(33);
    let mut b = FabricationHarness::new(33);
    let ids_a = a.craft_run(5);
    let ids_b = b.craft_run(5);
    assert_eq!(ids_a, ids_b);

    for (&left, &right) in ids_a.iter().zip(&ids_b) {
        assert_eq!(segment_rows(&a, left), segment_rows(&b, right));
    }
}

/// Every committed pick references real content and stays inside the
/// segment's time box.
#[test]
fn picks_reference_real_content_within_the_segment() {
    let mut harness = FabricationHarness::new(44);
    for id in harness.craft_run(6) {
        let segment = harness.store.segment(id).unwrap();
        let seconds = f64::from(segment.total) * 60.0 / segment.tempo;

        let chords = harness.store.chords_of(id);
        assert!(!chords.is_empty());
        assert_eq!(chords[0].position, 0.0);

        let arrangements = harness.store.arrangements_of(id);
        for pick in harness.store.picks_of(id) {
            assert!(arrangements.iter().any(|a| a.id == pick.arrangement_id));
            assert!(harness.snapshot.event(pick.event_id).is_some());
            assert!(harness.snapshot.audio(pick.audio_id).is_some());
            assert!(pick.amplitude > 0.0 && pick.amplitude <= 1.0);
            assert!(pick.start >= 0.0 && pick.start < seconds);
            assert!(pick.length > 0.0);
            assert!(pick.note == "X" || Note::parse(&pick.note).is_some());
        }
    }
}
