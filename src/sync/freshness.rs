use chrono::{DateTime, Utc};

use crate::config::{LIVE_FRESHNESS_SECS, UPCOMING_FRESHNESS_SECS};
use crate::types::{CanonicalMatch, MatchStatus};

/// Decide whether sync work for a match may be skipped because the stored
/// record is still fresh enough for its lifecycle status. Evaluated before
/// the upsert as a work-avoidance optimization; concurrent syncs of the
/// same match remain safe without it, just redundant.
///
/// Age is measured from the stored record's `last_synced_at`:
/// - no stored record: never skip
/// - LIVE: skip under 30s
/// - UPCOMING (and CANCELLED/POSTPONED, which may be rescheduled): skip under 10min
/// - FINISHED: always skip (terminal; a resync is a no-op by definition)
pub fn should_skip(existing: Option<&CanonicalMatch>, now: DateTime<Utc>) -> bool {
    let Some(existing) = existing else {
        return false;
    };

    let age_secs = (now - existing.last_synced_at).num_seconds();
    match existing.status {
        MatchStatus::Live => age_secs < LIVE_FRESHNESS_SECS,
        MatchStatus::Upcoming | MatchStatus::Cancelled | MatchStatus::Postponed => {
            age_secs < UPCOMING_FRESHNESS_SECS
        }
        MatchStatus::Finished => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    use crate::types::SyncPriority;

    fn record(status: MatchStatus, synced_at: DateTime<Utc>) -> CanonicalMatch {
        CanonicalMatch {
            match_id: "m-1".to_string(),
            home_team: "Home".to_string(),
            away_team: "Away".to_string(),
            league: None,
            home_logo: None,
            away_logo: None,
            status,
            kickoff_at: None,
            consensus_odds: None,
            all_bookmakers: Default::default(),
            book_count: 0,
            v1_model: None,
            v2_model: None,
            live: None,
            finished: None,
            last_synced_at: synced_at,
            next_sync_at: None,
            sync_priority: SyncPriority::Low,
            sync_error_count: 0,
            last_sync_error: None,
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 12, 0, 0).unwrap()
    }

    #[test]
    fn new_match_is_never_skipped() {
        assert!(!should_skip(None, t0()));
    }

    #[test]
    fn live_window_is_thirty_seconds() {
        let rec = record(MatchStatus::Live, t0());
        // Re-observed 10s later: inside the window.
        assert!(should_skip(Some(&rec), t0() + Duration::seconds(10)));
        // 31s later: stale, sync proceeds.
        assert!(!should_skip(Some(&rec), t0() + Duration::seconds(31)));
    }

    #[test]
    fn upcoming_window_is_ten_minutes() {
        let rec = record(MatchStatus::Upcoming, t0());
        assert!(should_skip(Some(&rec), t0() + Duration::seconds(599)));
        assert!(!should_skip(Some(&rec), t0() + Duration::seconds(600)));
    }

    #[test]
    fn finished_is_always_skipped() {
        let rec = record(MatchStatus::Finished, t0());
        assert!(should_skip(Some(&rec), t0() + Duration::days(365)));
    }

    #[test]
    fn postponed_uses_upcoming_window() {
        let rec = record(MatchStatus::Postponed, t0());
        assert!(should_skip(Some(&rec), t0() + Duration::seconds(30)));
        assert!(!should_skip(Some(&rec), t0() + Duration::seconds(601)));
    }
}
