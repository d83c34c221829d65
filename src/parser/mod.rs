pub mod episodes;
pub mod markup;

use serde::Serialize;

pub use episodes::Episode;

/// Episode count and summed minutes for one listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub episodes: usize,
    pub minutes: u64,
}

/// Two-pass pipeline: html → markup events → episodes. Never fails; garbage in
/// yields an empty list.
pub fn extract(html: &str) -> Vec<Episode> {
    episodes::extract_events(markup::Tokenizer::new(html))
}

pub fn aggregate(episodes: &[Episode]) -> Totals {
    Totals {
        episodes: episodes.len(),
        minutes: episodes.iter().map(|e| u64::from(e.duration)).sum(),
    }
}

// ── Tests ──
