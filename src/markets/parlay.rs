use std::collections::HashSet;

use serde::Serialize;

use crate::config::{
    PARLAY_HIGH_TIER_MIN, PARLAY_MEDIUM_TIER_MIN, SAFE_LEG_MIN_PROB, TRIPLE_LEG_POOL,
};
use crate::markets::calculator::MarketProbabilityTable;

// ---------------------------------------------------------------------------
// Legs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketFamily {
    Totals,
    HomeTotals,
    AwayTotals,
    Btts,
    DoubleChance,
    WinToNil,
    CleanSheet,
    Parity,
}

/// Which side of its family a leg takes. Two legs of the same family on
/// different sides contradict each other and cannot share a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LegSide {
    Over,
    Under,
    Yes,
    No,
    Home,
    Away,
    HomeOrDraw,
    DrawOrAway,
    HomeOrAway,
    Odd,
    Even,
}

/// One market outcome eligible for parlay inclusion.
#[derive(Debug, Clone, Serialize)]
pub struct ParlayLeg {
    /// Canonical outcome code, e.g. `OVER_2_5`, `BTTS_YES`, `DC_1X`.
    pub code: String,
    pub family: MarketFamily,
    pub side: LegSide,
    pub probability: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceTier {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConfidenceTier::High => "high",
            ConfidenceTier::Medium => "medium",
            ConfidenceTier::Low => "low",
        };
        write!(f, "{s}")
    }
}

/// A same-game multi-leg candidate. Ephemeral: regenerated per request,
/// cacheable for display but never authoritative.
#[derive(Debug, Clone, Serialize)]
pub struct ParlayCandidate {
    pub match_id: String,
    pub legs: Vec<ParlayLeg>,
    /// Product of leg probabilities, treated as independent.
    pub combined_probability: f64,
    pub fair_odds: f64,
    pub tier: ConfidenceTier,
}

// ---------------------------------------------------------------------------
// Leg enumeration
// ---------------------------------------------------------------------------

/// Every individual market outcome from the table whose probability clears
/// the safe-leg floor, tagged with its canonical code.
pub fn enumerate_safe_legs(table: &MarketProbabilityTable) -> Vec<ParlayLeg> {
    let mut legs = Vec::new();
    let mut push = |code: String, family: MarketFamily, side: LegSide, probability: f64| {
        if probability >= SAFE_LEG_MIN_PROB {
            legs.push(ParlayLeg {
                code,
                family,
                side,
                probability,
            });
        }
    };

    for t in &table.totals {
        push(
            format!("OVER_{}", code_line(t.line)),
            MarketFamily::Totals,
            LegSide::Over,
            t.over,
        );
        push(
            format!("UNDER_{}", code_line(t.line)),
            MarketFamily::Totals,
            LegSide::Under,
            t.under,
        );
    }
    for t in &table.home_totals {
        push(
            format!("HOME_OVER_{}", code_line(t.line)),
            MarketFamily::HomeTotals,
            LegSide::Over,
            t.over,
        );
        push(
            format!("HOME_UNDER_{}", code_line(t.line)),
            MarketFamily::HomeTotals,
            LegSide::Under,
            t.under,
        );
    }
    for t in &table.away_totals {
        push(
            format!("AWAY_OVER_{}", code_line(t.line)),
            MarketFamily::AwayTotals,
            LegSide::Over,
            t.over,
        );
        push(
            format!("AWAY_UNDER_{}", code_line(t.line)),
            MarketFamily::AwayTotals,
            LegSide::Under,
            t.under,
        );
    }

    push(
        "BTTS_YES".to_string(),
        MarketFamily::Btts,
        LegSide::Yes,
        table.btts_yes,
    );
    push(
        "BTTS_NO".to_string(),
        MarketFamily::Btts,
        LegSide::No,
        table.btts_no,
    );

    let o = &table.outcome;
    push(
        "DC_1X".to_string(),
        MarketFamily::DoubleChance,
        LegSide::HomeOrDraw,
        o.home + o.draw,
    );
    push(
        "DC_X2".to_string(),
        MarketFamily::DoubleChance,
        LegSide::DrawOrAway,
        o.draw + o.away,
    );
    push(
        "DC_12".to_string(),
        MarketFamily::DoubleChance,
        LegSide::HomeOrAway,
        o.home + o.away,
    );

    push(
        "HOME_WIN_TO_NIL".to_string(),
        MarketFamily::WinToNil,
        LegSide::Home,
        o.home * (1.0 - table.p_away_scores),
    );
    push(
        "AWAY_WIN_TO_NIL".to_string(),
        MarketFamily::WinToNil,
        LegSide::Away,
        o.away * (1.0 - table.p_home_scores),
    );

    push(
        "HOME_CLEAN_SHEET".to_string(),
        MarketFamily::CleanSheet,
        LegSide::Home,
        1.0 - table.p_away_scores,
    );
    push(
        "AWAY_CLEAN_SHEET".to_string(),
        MarketFamily::CleanSheet,
        LegSide::Away,
        1.0 - table.p_home_scores,
    );

    push(
        "TOTAL_ODD".to_string(),
        MarketFamily::Parity,
        LegSide::Odd,
        table.total_odd,
    );
    push(
        "TOTAL_EVEN".to_string(),
        MarketFamily::Parity,
        LegSide::Even,
        table.total_even,
    );

    legs
}

fn code_line(line: f64) -> String {
    format!("{line:.1}").replace('.', "_")
}

/// Two legs can share a ticket unless they resolve to the same outcome code
/// or take opposite sides of the same market family.
fn compatible(a: &ParlayLeg, b: &ParlayLeg) -> bool {
    if a.code == b.code {
        return false;
    }
    !(a.family == b.family && a.side != b.side)
}

// ---------------------------------------------------------------------------
// Candidate generation
// ---------------------------------------------------------------------------

/// Enumerate ranked 2- and 3-leg same-game parlay candidates across the
/// given per-match tables. Candidates are deduplicated by sorted outcome
/// codes (leg order never produces a duplicate) and sorted descending by
/// combined probability across all matches.
pub fn generate_candidates(
    match_markets: &[(String, MarketProbabilityTable)],
) -> Vec<ParlayCandidate> {
    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut candidates = Vec::new();

    for (match_id, table) in match_markets {
        let mut legs = enumerate_safe_legs(table);
        legs.sort_by(|a, b| b.probability.total_cmp(&a.probability));

        // All pairs of safe legs.
        for i in 0..legs.len() {
            for j in i + 1..legs.len() {
                if !compatible(&legs[i], &legs[j]) {
                    continue;
                }
                push_candidate(
                    &mut candidates,
                    &mut seen,
                    match_id,
                    vec![legs[i].clone(), legs[j].clone()],
                );
            }
        }

        // Triples only from the strongest legs, bounding the blow-up.
        let pool = &legs[..legs.len().min(TRIPLE_LEG_POOL)];
        for i in 0..pool.len() {
            for j in i + 1..pool.len() {
                if !compatible(&pool[i], &pool[j]) {
                    continue;
                }
                for k in j + 1..pool.len() {
                    if !compatible(&pool[i], &pool[k]) || !compatible(&pool[j], &pool[k]) {
                        continue;
                    }
                    push_candidate(
                        &mut candidates,
                        &mut seen,
                        match_id,
                        vec![pool[i].clone(), pool[j].clone(), pool[k].clone()],
                    );
                }
            }
        }
    }

    candidates.sort_by(|a, b| b.combined_probability.total_cmp(&a.combined_probability));
    candidates
}

fn push_candidate(
    candidates: &mut Vec<ParlayCandidate>,
    seen: &mut HashSet<(String, String)>,
    match_id: &str,
    legs: Vec<ParlayLeg>,
) {
    let mut codes: Vec<&str> = legs.iter().map(|l| l.code.as_str()).collect();
    codes.sort_unstable();
    let key = (match_id.to_string(), codes.join("+"));
    if !seen.insert(key) {
        return;
    }

    let combined: f64 = legs.iter().map(|l| l.probability).product();
    candidates.push(ParlayCandidate {
        match_id: match_id.to_string(),
        tier: tier_for(combined, legs.len()),
        fair_odds: 1.0 / combined,
        combined_probability: combined,
        legs,
    });
}

/// Combined-probability tier; triples never rate above medium.
fn tier_for(combined: f64, leg_count: usize) -> ConfidenceTier {
    let tier = if combined >= PARLAY_HIGH_TIER_MIN {
        ConfidenceTier::High
    } else if combined >= PARLAY_MEDIUM_TIER_MIN {
        ConfidenceTier::Medium
    } else {
        ConfidenceTier::Low
    };
    if leg_count >= 3 {
        tier.min(ConfidenceTier::Medium)
    } else {
        tier
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
