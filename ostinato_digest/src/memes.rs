// Meme digest: every meme a library mentions, with the programs,
// sequence bindings, and instruments that carry it. Names are stored in
// canonical form, so grouping here is a straight key match.

use ostinato_content::{BindingId, ContentSnapshot, InstrumentId, ProgramId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Everywhere one meme appears.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemeUsage {
    pub program_ids: BTreeSet<ProgramId>,
    pub binding_ids: BTreeSet<BindingId>,
    pub instrument_ids: BTreeSet<InstrumentId>,
}

impl MemeUsage {
    pub fn usage_count(&self) -> usize {
        self.program_ids.len() + self.binding_ids.len() + self.instrument_ids.len()
    }
}

/// Meme name -> usage, over a whole library.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MemeDigest {
    usages: BTreeMap<String, MemeUsage>,
}

impl MemeDigest {
    pub fn compute(snapshot: &ContentSnapshot) -> Self {
        let mut usages: BTreeMap<String, MemeUsage> = BTreeMap::new();
        for program in snapshot.programs() {
            for meme in snapshot.memes_of_program(program.id) {
                usages
                    .entry(meme.name.clone())
                    .or_default()
                    .program_ids
                    .insert(program.id);
            }
            for binding in snapshot.bindings_of(program.id) {
                for meme in snapshot.memes_of_binding(binding.id) {
                    usages
                        .entry(meme.name.clone())
                        .or_default()
                        .binding_ids
                        .insert(binding.id);
                }
            }
        }
        for instrument in snapshot.instruments() {
            for meme in snapshot.memes_of_instrument(instrument.id) {
                usages
                    .entry(meme.name.clone())
                    .or_default()
                    .instrument_ids
                    .insert(instrument.id);
            }
        }
        MemeDigest { usages }
    }

    pub fn usage(&self, name: &str) -> Option<&MemeUsage> {
        self.usages.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.usages.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.usages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.usages.is_empty()
    }
}
