pub mod calculator;
pub mod parlay;

pub use calculator::{compute_markets, markets_for, MarketProbabilityTable};
pub use parlay::{generate_candidates, ConfidenceTier, ParlayCandidate};
