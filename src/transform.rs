use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

use crate::config::{
    KICKOFF_SOON_HOURS, LIVE_RESYNC_SECS, UPCOMING_RESYNC_SECS,
};
use crate::types::{
    CanonicalMatch, ConsensusOdds, FinalResult, FinishedState, LiveState, MatchOutcome,
    MatchStatus, ModelSnapshot, Score, SyncPriority,
};

// ---------------------------------------------------------------------------
// Field mapping tables
//
// Provider payloads drift across versions: the same datum shows up under
// different names depending on which API revision produced it. Each canonical
// field lists its accepted source paths in priority order ("a.b" descends
// into nested objects), so absorbing a new provider revision is a table edit.
// ---------------------------------------------------------------------------

const ID_PATHS: &[&str] = &["match_id", "matchId", "id", "fixture_id", "fixtureId"];
const HOME_TEAM_PATHS: &[&str] = &["home_team", "homeTeam", "teams.home.name", "home.name", "home"];
const AWAY_TEAM_PATHS: &[&str] = &["away_team", "awayTeam", "teams.away.name", "away.name", "away"];
const LEAGUE_PATHS: &[&str] = &["league", "league_name", "competition.name", "tournament"];
const HOME_LOGO_PATHS: &[&str] = &["home_logo", "teams.home.logo", "home.logo"];
const AWAY_LOGO_PATHS: &[&str] = &["away_logo", "teams.away.logo", "away.logo"];
const STATUS_PATHS: &[&str] = &["status", "match_status", "state", "fixture.status"];
const KICKOFF_PATHS: &[&str] = &[
    "kickoff_date",
    "kickoffDate",
    "commence_time",
    "start_time",
    "date",
];

const ODDS_HOME_PATHS: &[&str] = &["consensus_odds.home", "odds.home", "odds_home"];
const ODDS_DRAW_PATHS: &[&str] = &["consensus_odds.draw", "odds.draw", "odds_draw"];
const ODDS_AWAY_PATHS: &[&str] = &["consensus_odds.away", "odds.away", "odds_away"];
const BOOKMAKERS_PATHS: &[&str] = &["all_bookmakers", "allBookmakers", "bookmakers"];
const BOOK_COUNT_PATHS: &[&str] = &["book_count", "bookCount"];

const V1_MODEL_PATHS: &[&str] = &["v1_model", "v1Model", "models.v1"];
const V2_MODEL_PATHS: &[&str] = &["v2_model", "v2Model", "models.v2"];

const SCORE_HOME_PATHS: &[&str] = &[
    "current_score.home",
    "currentScore.home",
    "score.home",
    "home_score",
    "goals.home",
];
const SCORE_AWAY_PATHS: &[&str] = &[
    "current_score.away",
    "currentScore.away",
    "score.away",
    "away_score",
    "goals.away",
];
const ELAPSED_PATHS: &[&str] = &["elapsed_minutes", "elapsed", "minute", "time.elapsed"];
const PERIOD_PATHS: &[&str] = &["period", "time.period", "half"];
const LIVE_STATS_PATHS: &[&str] = &["live_statistics", "liveStatistics", "statistics"];

const MATCH_STATS_PATHS: &[&str] = &["match_statistics", "matchStatistics", "statistics"];
const VENUE_PATHS: &[&str] = &["venue", "venue.name", "stadium"];
const REFEREE_PATHS: &[&str] = &["referee", "referee.name"];
const ATTENDANCE_PATHS: &[&str] = &["attendance"];

/// Identifier values that mean "absent" in sloppy upstream serializers.
const ID_SENTINELS: &[&str] = &["undefined", "null"];

// ---------------------------------------------------------------------------
// Transform
// ---------------------------------------------------------------------------

/// Map a raw provider payload into a canonical record. Returns `None` when no
/// usable external identifier can be extracted: a data-quality skip, not an
/// error. Pure: `now` is injected so priority and resync computation never
/// read the wall clock.
pub fn transform(raw: &Value, now: DateTime<Utc>) -> Option<CanonicalMatch> {
    let match_id = first_str(raw, ID_PATHS)
        .map(str::trim)
        .filter(|id| !id.is_empty() && !ID_SENTINELS.contains(&id.to_lowercase().as_str()))?
        .to_string();

    let status = first_str(raw, STATUS_PATHS)
        .map(normalize_status)
        .unwrap_or(MatchStatus::Upcoming);

    let kickoff_at = first_value(raw, KICKOFF_PATHS).and_then(parse_timestamp);

    let consensus_odds = extract_consensus_odds(raw);
    let all_bookmakers = extract_bookmakers(raw);
    let book_count = first_u64(raw, BOOK_COUNT_PATHS)
        .map(|n| n as u32)
        .unwrap_or(all_bookmakers.len() as u32);

    let live = (status == MatchStatus::Live).then(|| extract_live_state(raw));
    let finished = (status == MatchStatus::Finished).then(|| extract_finished_state(raw));

    Some(CanonicalMatch {
        match_id,
        home_team: first_str(raw, HOME_TEAM_PATHS).unwrap_or("").to_string(),
        away_team: first_str(raw, AWAY_TEAM_PATHS).unwrap_or("").to_string(),
        league: first_str(raw, LEAGUE_PATHS).map(str::to_string),
        home_logo: first_str(raw, HOME_LOGO_PATHS).map(str::to_string),
        away_logo: first_str(raw, AWAY_LOGO_PATHS).map(str::to_string),
        status,
        kickoff_at,
        consensus_odds,
        all_bookmakers,
        book_count,
        v1_model: first_value(raw, V1_MODEL_PATHS).and_then(extract_model),
        v2_model: first_value(raw, V2_MODEL_PATHS).and_then(extract_model),
        live,
        finished,
        last_synced_at: now,
        next_sync_at: next_sync_at(status, now),
        sync_priority: sync_priority(status, kickoff_at, now),
        sync_error_count: 0,
        last_sync_error: None,
    })
}

/// Normalize a provider status label to the canonical lifecycle.
/// Unrecognized values default to UPCOMING.
pub fn normalize_status(raw: &str) -> MatchStatus {
    match raw.trim().to_lowercase().as_str() {
        "live" | "inplay" | "in_play" | "playing" | "1h" | "2h" | "ht" => MatchStatus::Live,
        "finished" | "ft" | "full_time" | "completed" | "ended" | "aet" => MatchStatus::Finished,
        "cancelled" | "canceled" | "abandoned" => MatchStatus::Cancelled,
        "postponed" | "suspended" | "delayed" => MatchStatus::Postponed,
        _ => MatchStatus::Upcoming,
    }
}

/// High for live, medium for upcoming matches kicking off within 24h,
/// low for everything else.
pub fn sync_priority(
    status: MatchStatus,
    kickoff_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> SyncPriority {
    match status {
        MatchStatus::Live => SyncPriority::High,
        MatchStatus::Upcoming => match kickoff_at {
            Some(kickoff) if kickoff - now <= Duration::hours(KICKOFF_SOON_HOURS) => {
                SyncPriority::Medium
            }
            _ => SyncPriority::Low,
        },
        _ => SyncPriority::Low,
    }
}

/// Next scheduled resync: +30s live, +10min upcoming, never for terminal
/// statuses.
pub fn next_sync_at(status: MatchStatus, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if status.is_terminal() {
        return None;
    }
    let horizon = if status == MatchStatus::Live {
        LIVE_RESYNC_SECS
    } else {
        UPCOMING_RESYNC_SECS
    };
    Some(now + Duration::seconds(horizon))
}

// ---------------------------------------------------------------------------
// Sub-object extraction
// ---------------------------------------------------------------------------

fn extract_consensus_odds(raw: &Value) -> Option<ConsensusOdds> {
    let home = first_f64(raw, ODDS_HOME_PATHS)?;
    let draw = first_f64(raw, ODDS_DRAW_PATHS)?;
    let away = first_f64(raw, ODDS_AWAY_PATHS)?;
    if home <= 0.0 || draw <= 0.0 || away <= 0.0 {
        return None;
    }
    Some(ConsensusOdds { home, draw, away })
}

/// Bookmaker quotes arrive either as `{name: {home, draw, away}}` or as a
/// list of `{name|key|bookmaker, home, draw, away}` entries.
fn extract_bookmakers(raw: &Value) -> BTreeMap<String, ConsensusOdds> {
    let mut books = BTreeMap::new();
    let Some(v) = first_value(raw, BOOKMAKERS_PATHS) else {
        return books;
    };

    match v {
        Value::Object(map) => {
            for (name, quote) in map {
                if let Some(odds) = quote_odds(quote) {
                    books.insert(name.clone(), odds);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                let name = item
                    .get("name")
                    .or_else(|| item.get("key"))
                    .or_else(|| item.get("bookmaker"))
                    .and_then(Value::as_str);
                if let (Some(name), Some(odds)) = (name, quote_odds(item)) {
                    books.insert(name.to_string(), odds);
                }
            }
        }
        _ => {}
    }
    books
}

fn quote_odds(v: &Value) -> Option<ConsensusOdds> {
    let home = num_at(v, "home")?;
    let draw = num_at(v, "draw")?;
    let away = num_at(v, "away")?;
    if home <= 0.0 || draw <= 0.0 || away <= 0.0 {
        return None;
    }
    Some(ConsensusOdds { home, draw, away })
}

fn extract_model(v: &Value) -> Option<ModelSnapshot> {
    let pick = v.get("pick").and_then(Value::as_str)?.to_string();
    let confidence = num_at(v, "confidence")?.clamp(0.0, 1.0);
    Some(ModelSnapshot {
        pick,
        confidence,
        probs: v.get("probs").cloned(),
    })
}

fn extract_live_state(raw: &Value) -> LiveState {
    LiveState {
        score: extract_score(raw),
        elapsed_minutes: first_u64(raw, ELAPSED_PATHS).unwrap_or(0) as u32,
        period: first_str(raw, PERIOD_PATHS).map(str::to_string),
        statistics: first_value(raw, LIVE_STATS_PATHS).cloned(),
    }
}

fn extract_finished_state(raw: &Value) -> FinishedState {
    let score = extract_score(raw);
    let outcome = MatchOutcome::from_score(score);
    FinishedState {
        result: FinalResult {
            score,
            outcome,
            outcome_text: outcome.text().to_string(),
        },
        statistics: first_value(raw, MATCH_STATS_PATHS).cloned(),
        venue: first_str(raw, VENUE_PATHS).map(str::to_string),
        referee: first_str(raw, REFEREE_PATHS).map(str::to_string),
        attendance: first_u64(raw, ATTENDANCE_PATHS).map(|n| n as u32),
    }
}

fn extract_score(raw: &Value) -> Score {
    Score {
        home: first_u64(raw, SCORE_HOME_PATHS).unwrap_or(0) as u32,
        away: first_u64(raw, SCORE_AWAY_PATHS).unwrap_or(0) as u32,
    }
}

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

/// Descend a dotted path ("teams.home.name") into nested objects.
fn path_value<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut cur = root;
    for segment in path.split('.') {
        cur = cur.get(segment)?;
    }
    Some(cur)
}

fn first_value<'a>(root: &'a Value, paths: &[&str]) -> Option<&'a Value> {
    paths
        .iter()
        .filter_map(|p| path_value(root, p))
        .find(|v| !v.is_null())
}

fn first_str<'a>(root: &'a Value, paths: &[&str]) -> Option<&'a str> {
    paths
        .iter()
        .filter_map(|p| path_value(root, p))
        .find_map(Value::as_str)
}

/// Numbers arrive as JSON numbers or as numeric strings, provider-dependent.
fn first_f64(root: &Value, paths: &[&str]) -> Option<f64> {
    paths
        .iter()
        .filter_map(|p| path_value(root, p))
        .find_map(as_f64)
}

fn first_u64(root: &Value, paths: &[&str]) -> Option<u64> {
    paths
        .iter()
        .filter_map(|p| path_value(root, p))
        .find_map(|v| v.as_u64().or_else(|| as_f64(v).map(|f| f.max(0.0) as u64)))
}

fn num_at(v: &Value, key: &str) -> Option<f64> {
    v.get(key).and_then(as_f64)
}

fn as_f64(v: &Value) -> Option<f64> {
    v.as_f64()
        .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
}

fn parse_timestamp(v: &Value) -> Option<DateTime<Utc>> {
    if let Some(secs) = v.as_i64() {
        return DateTime::<Utc>::from_timestamp(secs, 0);
    }
    let s = v.as_str()?.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 12, 0, 0).unwrap()
    }

    #[test]
    fn sentinel_ids_are_rejected() {
        for id in ["undefined", "null", "NULL", "", "   "] {
            let raw = json!({ "match_id": id, "status": "live" });
            assert!(transform(&raw, now()).is_none(), "id {id:?} should skip");
        }
    }

    #[test]
    fn missing_id_is_rejected() {
        let raw = json!({ "home_team": "Arsenal", "status": "live" });
        assert!(transform(&raw, now()).is_none());
    }

    #[test]
    fn id_drift_fields_are_accepted_in_priority_order() {
        let raw = json!({ "fixtureId": "f-9", "status": "upcoming" });
        assert_eq!(transform(&raw, now()).unwrap().match_id, "f-9");

        // match_id beats fixtureId when both present
        let raw = json!({ "match_id": "m-1", "fixtureId": "f-9" });
        assert_eq!(transform(&raw, now()).unwrap().match_id, "m-1");
    }

    #[test]
    fn unrecognized_status_defaults_to_upcoming() {
        let raw = json!({ "id": "m-1", "status": "warming_up" });
        assert_eq!(transform(&raw, now()).unwrap().status, MatchStatus::Upcoming);
    }

    #[test]
    fn live_fields_only_on_live_matches() {
        let raw = json!({
            "id": "m-1",
            "status": "live",
            "score": { "home": 2, "away": 1 },
            "minute": 67,
            "period": "2H",
        });
        let m = transform(&raw, now()).unwrap();
        let live = m.live.expect("live state");
        assert_eq!(live.score, Score { home: 2, away: 1 });
        assert_eq!(live.elapsed_minutes, 67);
        assert!(m.finished.is_none());

        // Same payload claiming upcoming: no live sub-object.
        let raw = json!({ "id": "m-1", "status": "upcoming", "score": { "home": 2, "away": 1 } });
        let m = transform(&raw, now()).unwrap();
        assert!(m.live.is_none());
    }

    #[test]
    fn finished_match_gets_final_result() {
        let raw = json!({
            "id": "m-2",
            "status": "FT",
            "score": { "home": 0, "away": 3 },
            "venue": "Anfield",
            "attendance": 53000,
        });
        let m = transform(&raw, now()).unwrap();
        let fin = m.finished.expect("finished state");
        assert_eq!(fin.result.outcome, MatchOutcome::Away);
        assert_eq!(fin.result.outcome_text, "Away win");
        assert_eq!(fin.venue.as_deref(), Some("Anfield"));
        assert!(m.live.is_none());
        assert!(m.next_sync_at.is_none());
    }

    #[test]
    fn priority_tiers() {
        let soon = now() + Duration::hours(3);
        let far = now() + Duration::hours(72);
        assert_eq!(sync_priority(MatchStatus::Live, None, now()), SyncPriority::High);
        assert_eq!(
            sync_priority(MatchStatus::Upcoming, Some(soon), now()),
            SyncPriority::Medium
        );
        assert_eq!(
            sync_priority(MatchStatus::Upcoming, Some(far), now()),
            SyncPriority::Low
        );
        assert_eq!(
            sync_priority(MatchStatus::Upcoming, None, now()),
            SyncPriority::Low
        );
        assert_eq!(
            sync_priority(MatchStatus::Finished, None, now()),
            SyncPriority::Low
        );
    }

    #[test]
    fn next_sync_horizons() {
        assert_eq!(
            next_sync_at(MatchStatus::Live, now()),
            Some(now() + Duration::seconds(30))
        );
        assert_eq!(
            next_sync_at(MatchStatus::Upcoming, now()),
            Some(now() + Duration::seconds(600))
        );
        assert_eq!(next_sync_at(MatchStatus::Finished, now()), None);
        assert_eq!(next_sync_at(MatchStatus::Cancelled, now()), None);
        assert_eq!(next_sync_at(MatchStatus::Postponed, now()), None);
    }

    #[test]
    fn odds_require_all_three_positive() {
        let raw = json!({ "id": "m-1", "odds": { "home": 1.8, "draw": 3.4, "away": 4.5 } });
        let m = transform(&raw, now()).unwrap();
        assert!(m.consensus_odds.is_some());

        let raw = json!({ "id": "m-1", "odds": { "home": 1.8, "draw": 3.4 } });
        assert!(transform(&raw, now()).unwrap().consensus_odds.is_none());

        let raw = json!({ "id": "m-1", "odds": { "home": 1.8, "draw": 0, "away": 4.5 } });
        assert!(transform(&raw, now()).unwrap().consensus_odds.is_none());
    }

    #[test]
    fn numeric_strings_parse_as_odds() {
        let raw = json!({ "id": "m-1", "odds": { "home": "1.80", "draw": "3.40", "away": "4.50" } });
        let odds = transform(&raw, now()).unwrap().consensus_odds.unwrap();
        assert!((odds.home - 1.80).abs() < 1e-9);
    }

    #[test]
    fn bookmaker_map_and_list_shapes() {
        let raw = json!({
            "id": "m-1",
            "bookmakers": {
                "bet365": { "home": 1.85, "draw": 3.3, "away": 4.2 },
                "pinnacle": { "home": 1.83, "draw": 3.5, "away": 4.4 },
            }
        });
        let m = transform(&raw, now()).unwrap();
        assert_eq!(m.all_bookmakers.len(), 2);
        assert_eq!(m.book_count, 2);

        let raw = json!({
            "id": "m-1",
            "bookmakers": [
                { "name": "bet365", "home": 1.85, "draw": 3.3, "away": 4.2 },
            ],
            "book_count": 7,
        });
        let m = transform(&raw, now()).unwrap();
        assert_eq!(m.all_bookmakers.len(), 1);
        assert_eq!(m.book_count, 7);
    }

    #[test]
    fn nested_team_paths_resolve() {
        let raw = json!({
            "id": "m-1",
            "teams": { "home": { "name": "Arsenal" }, "away": { "name": "Spurs" } },
        });
        let m = transform(&raw, now()).unwrap();
        assert_eq!(m.home_team, "Arsenal");
        assert_eq!(m.away_team, "Spurs");
    }

    #[test]
    fn kickoff_accepts_rfc3339_and_unix() {
        let raw = json!({ "id": "m-1", "kickoff_date": "2026-03-14T15:00:00Z" });
        let m = transform(&raw, now()).unwrap();
        assert_eq!(
            m.kickoff_at.unwrap(),
            Utc.with_ymd_and_hms(2026, 3, 14, 15, 0, 0).unwrap()
        );

        let raw = json!({ "id": "m-1", "commence_time": 1773500400 });
        assert!(transform(&raw, now()).unwrap().kickoff_at.is_some());
    }

    #[test]
    fn model_snapshot_confidence_is_clamped() {
        let raw = json!({
            "id": "m-1",
            "v1_model": { "pick": "home", "confidence": 1.7 },
        });
        let m = transform(&raw, now()).unwrap();
        assert_eq!(m.v1_model.unwrap().confidence, 1.0);
    }

    #[test]
    fn transform_is_deterministic_for_fixed_now() {
        let raw = json!({
            "id": "m-1",
            "status": "live",
            "odds": { "home": 2.0, "draw": 3.2, "away": 3.8 },
            "score": { "home": 1, "away": 0 },
        });
        let a = transform(&raw, now()).unwrap();
        let b = transform(&raw, now()).unwrap();
        assert_eq!(serde_json::to_value(&a).unwrap(), serde_json::to_value(&b).unwrap());
    }
}
