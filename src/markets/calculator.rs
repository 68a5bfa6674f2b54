use serde::Serialize;

use crate::config::{HANDICAP_LINES, TEAM_TOTAL_LINES, TOTAL_LINES};
use crate::types::{CanonicalMatch, ConsensusOdds, MatchStatus, Score};

/// Attack-share weights: how much of a side's expected scoring comes from
/// its win probability vs the draw probability.
const WIN_ATTACK_WEIGHT: f64 = 1.5;
const DRAW_ATTACK_WEIGHT: f64 = 0.5;
/// Scales the probability-weighted attack share into goals per match.
const MATCH_GOAL_RATE: f64 = 2.15;

/// Marginal scoring weights for both-teams-to-score.
const BTTS_WIN_WEIGHT: f64 = 0.7;
const BTTS_DRAW_WEIGHT: f64 = 0.5;

/// Win-probability shift per goal of Asian handicap.
const HANDICAP_SHIFT_PER_GOAL: f64 = 0.15;

/// Probability clamp bounds: quoted probabilities never reach certainty
/// unless the outcome is already decided on the pitch.
const PROB_FLOOR: f64 = 0.01;
const PROB_CEIL: f64 = 0.99;

/// A full match when no clock is available: non-live matches have no time
/// left to accrue goals.
const FULL_TIME_MINUTES: f64 = 90.0;

// ---------------------------------------------------------------------------
// Output table
// ---------------------------------------------------------------------------

/// Normalized three-way outcome probabilities (bookmaker margin removed).
#[derive(Debug, Clone, Copy, Serialize)]
pub struct OutcomeProbs {
    pub home: f64,
    pub draw: f64,
    pub away: f64,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct TotalLine {
    pub line: f64,
    pub over: f64,
    pub under: f64,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct HandicapLine {
    /// Home-oriented handicap in goals; negative means home gives a start.
    pub line: f64,
    pub home: f64,
    pub away: f64,
}

/// Derived per-match market probabilities. Ephemeral: recomputed from the
/// canonical record on every request, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct MarketProbabilityTable {
    pub outcome: OutcomeProbs,
    /// Goals already scored plus remaining expected goals, both sides.
    pub expected_goals_total: f64,
    pub expected_goals_home: f64,
    pub expected_goals_away: f64,
    pub totals: Vec<TotalLine>,
    pub home_totals: Vec<TotalLine>,
    pub away_totals: Vec<TotalLine>,
    pub btts_yes: f64,
    pub btts_no: f64,
    /// Marginal probability that each side scores (at least once).
    pub p_home_scores: f64,
    pub p_away_scores: f64,
    /// Final total-goals parity.
    pub total_odd: f64,
    pub total_even: f64,
    pub handicaps: Vec<HandicapLine>,
}

// ---------------------------------------------------------------------------
// Calculator
// ---------------------------------------------------------------------------

/// Compute the derived-market table from current three-way odds, the score,
/// and the match clock. Returns `None` when any of the three odds is missing
/// or non-positive; an incomplete market is an expected condition, not an
/// error. Pure and stateless; safe to call concurrently from any reader.
pub fn compute_markets(
    odds: Option<&ConsensusOdds>,
    current_score: Option<Score>,
    elapsed_minutes: Option<u32>,
) -> Option<MarketProbabilityTable> {
    let odds = odds?;
    if odds.home <= 0.0 || odds.draw <= 0.0 || odds.away <= 0.0 {
        return None;
    }

    // De-vig: normalize implied probabilities to sum to one.
    let implied = [1.0 / odds.home, 1.0 / odds.draw, 1.0 / odds.away];
    let margin: f64 = implied.iter().sum();
    let outcome = OutcomeProbs {
        home: implied[0] / margin,
        draw: implied[1] / margin,
        away: implied[2] / margin,
    };

    let score = current_score.unwrap_or(Score { home: 0, away: 0 });

    // Time decay: the fraction of the match still to be played. Defaults to
    // zero for non-live matches, leaving only goals already on the board.
    let elapsed = elapsed_minutes.map(f64::from).unwrap_or(FULL_TIME_MINUTES);
    let time_factor = (FULL_TIME_MINUTES - elapsed).max(0.0) / FULL_TIME_MINUTES;

    let remaining_home = expected_goals(outcome.home, outcome.draw) * time_factor;
    let remaining_away = expected_goals(outcome.away, outcome.draw) * time_factor;

    let lambda_home = f64::from(score.home) + remaining_home;
    let lambda_away = f64::from(score.away) + remaining_away;
    let lambda_total = lambda_home + lambda_away;

    let totals = TOTAL_LINES
        .iter()
        .map(|&line| total_line(line, score.total(), lambda_total))
        .collect();
    let home_totals = TEAM_TOTAL_LINES
        .iter()
        .map(|&line| total_line(line, score.home, lambda_home))
        .collect();
    let away_totals = TEAM_TOTAL_LINES
        .iter()
        .map(|&line| total_line(line, score.away, lambda_away))
        .collect();

    // Marginal scoring probabilities, combined as if independent. Known
    // simplification: no joint scoreline model ties the two margins together.
    let p_home_scores = BTTS_WIN_WEIGHT * outcome.home + BTTS_DRAW_WEIGHT * outcome.draw;
    let p_away_scores = BTTS_WIN_WEIGHT * outcome.away + BTTS_DRAW_WEIGHT * outcome.draw;
    let btts_yes = p_home_scores * p_away_scores;

    let (total_odd, total_even) =
        parity_probs(score.total(), remaining_home + remaining_away);

    let handicaps = HANDICAP_LINES
        .iter()
        .map(|&line| handicap_line(line, &outcome))
        .collect();

    Some(MarketProbabilityTable {
        outcome,
        expected_goals_total: lambda_total,
        expected_goals_home: lambda_home,
        expected_goals_away: lambda_away,
        totals,
        home_totals,
        away_totals,
        btts_yes,
        btts_no: 1.0 - btts_yes,
        p_home_scores,
        p_away_scores,
        total_odd,
        total_even,
        handicaps,
    })
}

/// Derive the table straight from a canonical record: live matches feed
/// their score and clock in, everything else prices from the odds alone.
pub fn markets_for(record: &CanonicalMatch) -> Option<MarketProbabilityTable> {
    let (score, elapsed) = match (&record.status, &record.live) {
        (MatchStatus::Live, Some(live)) => (Some(live.score), Some(live.elapsed_minutes)),
        _ => (None, None),
    };
    compute_markets(record.consensus_odds.as_ref(), score, elapsed)
}

fn expected_goals(p_win: f64, p_draw: f64) -> f64 {
    (p_win * WIN_ATTACK_WEIGHT + p_draw * DRAW_ATTACK_WEIGHT) * MATCH_GOAL_RATE
}

/// One over/under quote. A line already beaten by goals on the board is
/// deterministic; otherwise a Poisson-tail approximation on the expected
/// total, clamped away from certainty. Under is the exact complement.
fn total_line(line: f64, current_goals: u32, lambda: f64) -> TotalLine {
    let over = if f64::from(current_goals) > line {
        1.0
    } else {
        clamp_prob(1.0 - (-lambda / (line + 1.0)).exp())
    };
    TotalLine {
        line,
        over,
        under: 1.0 - over,
    }
}

/// Parity of the final total: a Poisson count N has
/// P(N odd) = (1 − e^(−2λ))/2, flipped when the goals already scored are odd.
fn parity_probs(current_goals: u32, lambda_remaining: f64) -> (f64, f64) {
    let p_remaining_odd = (1.0 - (-2.0 * lambda_remaining).exp()) / 2.0;
    let p_odd = if current_goals % 2 == 0 {
        p_remaining_odd
    } else {
        1.0 - p_remaining_odd
    };
    let p_odd = clamp_prob(p_odd);
    (p_odd, 1.0 - p_odd)
}

/// Linear perturbation of the normalized win probabilities by the handicap
/// magnitude; the level line passes them through unchanged.
fn handicap_line(line: f64, outcome: &OutcomeProbs) -> HandicapLine {
    if line == 0.0 {
        return HandicapLine {
            line,
            home: outcome.home,
            away: outcome.away,
        };
    }
    let shift = line * HANDICAP_SHIFT_PER_GOAL;
    HandicapLine {
        line,
        home: clamp_prob(outcome.home + shift),
        away: clamp_prob(outcome.away - shift),
    }
}

fn clamp_prob(p: f64) -> f64 {
    p.clamp(PROB_FLOOR, PROB_CEIL)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn odds(home: f64, draw: f64, away: f64) -> ConsensusOdds {
        ConsensusOdds { home, draw, away }
    }

    #[test]
    fn missing_or_invalid_odds_yield_none() {
        assert!(compute_markets(None, None, None).is_none());
        assert!(compute_markets(Some(&odds(0.0, 3.4, 4.5)), None, None).is_none());
        assert!(compute_markets(Some(&odds(1.8, -1.0, 4.5)), None, None).is_none());
    }

    #[test]
    fn normalized_outcome_probs_sum_to_one() {
        for o in [
            odds(1.80, 3.40, 4.50),
            odds(1.05, 12.0, 34.0),
            odds(2.9, 3.1, 2.6),
        ] {
            let t = compute_markets(Some(&o), None, None).unwrap();
            let sum = t.outcome.home + t.outcome.draw + t.outcome.away;
            assert!((sum - 1.0).abs() < 1e-9, "sum={sum}");
        }
    }

    #[test]
    fn over_under_are_exact_complements() {
        let t = compute_markets(
            Some(&odds(1.80, 3.40, 4.50)),
            Some(Score { home: 1, away: 1 }),
            Some(55),
        )
        .unwrap();
        for line in t.totals.iter().chain(&t.home_totals).chain(&t.away_totals) {
            assert_eq!(line.over + line.under, 1.0, "line {}", line.line);
        }
    }

    #[test]
    fn moderate_favorite_prices_a_plausible_goal_count() {
        // 1.80 / 3.40 / 4.50 at kickoff of a live match.
        let t = compute_markets(
            Some(&odds(1.80, 3.40, 4.50)),
            Some(Score { home: 0, away: 0 }),
            Some(0),
        )
        .unwrap();
        assert!(
            t.expected_goals_total > 2.0 && t.expected_goals_total < 3.0,
            "expected_goals_total={}",
            t.expected_goals_total
        );
        let over_05 = t.totals.iter().find(|l| l.line == 0.5).unwrap().over;
        assert!(over_05 > 0.85, "P(over 0.5)={over_05}");
        // The favorite carries the higher expected goals.
        assert!(t.expected_goals_home > t.expected_goals_away);
    }

    #[test]
    fn beaten_lines_are_deterministic() {
        let t = compute_markets(
            Some(&odds(2.0, 3.3, 3.9)),
            Some(Score { home: 2, away: 1 }),
            Some(80),
        )
        .unwrap();
        for line in &t.totals {
            if line.line < 3.0 {
                assert_eq!(line.over, 1.0, "line {}", line.line);
                assert_eq!(line.under, 0.0);
            } else {
                assert!(line.over < 1.0);
            }
        }
        // Home has 2 goals: home total 1.5 is decided, 2.5 is not.
        let home_15 = t.home_totals.iter().find(|l| l.line == 1.5).unwrap();
        assert_eq!(home_15.over, 1.0);
        let home_25 = t.home_totals.iter().find(|l| l.line == 2.5).unwrap();
        assert!(home_25.over < 1.0);
    }

    #[test]
    fn non_live_defaults_leave_no_time_on_the_clock() {
        // No score, no clock: only the 0.01 floor keeps overs alive.
        let t = compute_markets(Some(&odds(1.80, 3.40, 4.50)), None, None).unwrap();
        assert_eq!(t.expected_goals_total, 0.0);
        for line in &t.totals {
            assert_eq!(line.over, 0.01);
            assert_eq!(line.under, 0.99);
        }
    }

    #[test]
    fn probabilities_are_clamped_away_from_certainty() {
        // Overwhelming favorite: nothing undecided may hit 0 or 1.
        let t = compute_markets(
            Some(&odds(1.01, 18.0, 41.0)),
            Some(Score { home: 0, away: 0 }),
            Some(0),
        )
        .unwrap();
        for line in t.totals.iter().chain(&t.home_totals).chain(&t.away_totals) {
            assert!(line.over >= 0.01 && line.over <= 0.99);
        }
        for h in &t.handicaps {
            assert!(h.home >= 0.01 && h.home <= 0.99);
            assert!(h.away >= 0.01 && h.away <= 0.99);
        }
    }

    #[test]
    fn zero_handicap_passes_outcome_probs_through() {
        let t = compute_markets(Some(&odds(1.80, 3.40, 4.50)), None, None).unwrap();
        let level = t.handicaps.iter().find(|h| h.line == 0.0).unwrap();
        assert_eq!(level.home, t.outcome.home);
        assert_eq!(level.away, t.outcome.away);

        // A half-goal start for home raises its side of the quote.
        let plus_half = t.handicaps.iter().find(|h| h.line == 0.5).unwrap();
        assert!(plus_half.home > t.outcome.home);
        assert!(plus_half.away < t.outcome.away);
    }

    #[test]
    fn btts_multiplies_marginal_scoring_probs() {
        let t = compute_markets(Some(&odds(1.80, 3.40, 4.50)), None, None).unwrap();
        assert!((t.btts_yes - t.p_home_scores * t.p_away_scores).abs() < 1e-12);
        assert_eq!(t.btts_yes + t.btts_no, 1.0);
    }

    #[test]
    fn parity_flips_with_goals_on_the_board() {
        let o = odds(1.80, 3.40, 4.50);
        let even_board = compute_markets(Some(&o), Some(Score { home: 0, away: 0 }), Some(30))
            .unwrap();
        let odd_board = compute_markets(Some(&o), Some(Score { home: 1, away: 0 }), Some(30))
            .unwrap();
        // Same remaining-goal rate, opposite parity of the current total.
        assert!((even_board.total_odd - odd_board.total_even).abs() < 1e-12);
        assert_eq!(even_board.total_odd + even_board.total_even, 1.0);
    }

    #[test]
    fn markets_for_uses_live_clock_only_when_live() {
        use crate::transform::transform;
        use chrono::{TimeZone, Utc};
        use serde_json::json;

        let now = Utc.with_ymd_and_hms(2026, 3, 14, 12, 0, 0).unwrap();
        let live = transform(
            &json!({
                "id": "m-1",
                "status": "live",
                "odds": { "home": 1.8, "draw": 3.4, "away": 4.5 },
                "score": { "home": 1, "away": 0 },
                "minute": 40,
            }),
            now,
        )
        .unwrap();
        let table = markets_for(&live).unwrap();
        assert!(table.expected_goals_total > 1.0);

        let upcoming = transform(
            &json!({
                "id": "m-2",
                "status": "upcoming",
                "odds": { "home": 1.8, "draw": 3.4, "away": 4.5 },
            }),
            now,
        )
        .unwrap();
        let table = markets_for(&upcoming).unwrap();
        assert_eq!(table.expected_goals_total, 0.0);

        let no_odds = transform(&json!({ "id": "m-3", "status": "upcoming" }), now).unwrap();
        assert!(markets_for(&no_odds).is_none());
    }
}
