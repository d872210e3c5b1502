// fabricate — demo fabrication at the command line.
//
// Builds the built-in demo library and fabricates a run of segments on
// one chain, printing a summary line per crafted segment. Useful for
// eyeballing macro handoffs, meme flow, and pick counts without a host
// application.
//
// Usage:
//   fabricate [--segments N] [--seed N] [--config FILE]
//     --segments <N>   Number of segments to craft (default: 8)
//     --seed <N>       RNG seed for a reproducible chain
//     --config <FILE>  Craft configuration JSON (built-in defaults
//                      otherwise; missing fields keep their defaults)

use ostinato_content::demo::demo_library;
use ostinato_content::{SegmentId, SegmentStore};
use ostinato_craft::{CraftConfig, craft_segment};
use ostinato_digest::DigestHub;
use rand::SeedableRng;
use rand::rngs::StdRng;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let segments: u32 = parse_flag(&args, "--segments").unwrap_or(8);
    let seed: Option<u64> = parse_flag(&args, "--seed");
    let config = match parse_flag::<String>(&args, "--config") {
        Some(path) => match load_config(&path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("failed to load config {path}: {e}");
                std::process::exit(1);
            }
        },
        None => CraftConfig::default(),
    };

    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let snapshot = demo_library();
    let mut store = SegmentStore::new("demo");
    let digests = DigestHub::new(config.digest_params(), config.cache_config());

    println!(
        "fabricating {segments} segments on chain {}",
        store.chain().name
    );
    for _ in 0..segments {
        let id = store.create_segment();
        if let Err(e) = craft_segment(&snapshot, &mut store, &digests, &config, id, &mut rng) {
            log::error!("craft failed on chain {} {id}: {e}", store.chain().id);
            if let Err(revert) = store.revert_to_planned(id) {
                log::error!("revert failed for {id}: {revert}");
            }
            break;
        }
        print_summary(&store, id);
    }
}

fn print_summary(store: &SegmentStore, id: SegmentId) {
    let Some(segment) = store.segment(id) else {
        return;
    };
    let memes: Vec<&str> = store
        .memes_of(id)
        .iter()
        .map(|m| m.name.as_str())
        .collect();
    let chords: Vec<&str> = store
        .chords_of(id)
        .iter()
        .map(|c| c.name.as_str())
        .collect();
    println!(
        "[{:>3}] {:<9} {:<9} {:>5.1} bpm  [{}]  {}  ({} picks)",
        segment.offset,
        format!("{:?}", segment.kind),
        segment.key,
        segment.tempo,
        memes.join(", "),
        chords.join(" | "),
        store.picks_of(id).len()
    );
}

fn load_config(path: &str) -> Result<CraftConfig, Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

fn parse_flag<T: std::str::FromStr>(args: &[String], flag: &str) -> Option<T> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|v| v.parse().ok())
}
