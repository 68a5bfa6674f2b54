use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Upcoming,
    Live,
    Finished,
    Cancelled,
    Postponed,
}

impl MatchStatus {
    /// Terminal statuses get no scheduled resync.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MatchStatus::Finished | MatchStatus::Cancelled | MatchStatus::Postponed
        )
    }
}

impl std::fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MatchStatus::Upcoming => "upcoming",
            MatchStatus::Live => "live",
            MatchStatus::Finished => "finished",
            MatchStatus::Cancelled => "cancelled",
            MatchStatus::Postponed => "postponed",
        };
        write!(f, "{s}")
    }
}

/// A sync batch requested by a trigger. `Completed` is the trigger-facing
/// alias for the provider's own `finished` vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTarget {
    Live,
    Upcoming,
    Completed,
}

impl SyncTarget {
    pub const ALL: &'static [SyncTarget] =
        &[SyncTarget::Live, SyncTarget::Upcoming, SyncTarget::Completed];

    /// Parse a trigger `type` parameter. `all` expands to every target.
    pub fn parse(raw: &str) -> Option<Vec<SyncTarget>> {
        match raw.trim().to_lowercase().as_str() {
            "live" => Some(vec![SyncTarget::Live]),
            "upcoming" => Some(vec![SyncTarget::Upcoming]),
            "completed" => Some(vec![SyncTarget::Completed]),
            "all" | "" => Some(Self::ALL.to_vec()),
            _ => None,
        }
    }

    /// The status value the provider's query API understands.
    pub fn provider_status(&self) -> &'static str {
        match self {
            SyncTarget::Live => "live",
            SyncTarget::Upcoming => "upcoming",
            SyncTarget::Completed => "finished",
        }
    }
}

impl std::fmt::Display for SyncTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SyncTarget::Live => "live",
            SyncTarget::Upcoming => "upcoming",
            SyncTarget::Completed => "completed",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncPriority {
    High,
    Medium,
    Low,
}

impl std::fmt::Display for SyncPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SyncPriority::High => "high",
            SyncPriority::Medium => "medium",
            SyncPriority::Low => "low",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Market + model snapshots
// ---------------------------------------------------------------------------

/// Three-way decimal odds. Storable consensus odds must each exceed 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConsensusOdds {
    pub home: f64,
    pub draw: f64,
    pub away: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    pub home: u32,
    pub away: u32,
}

impl Score {
    pub fn total(&self) -> u32 {
        self.home + self.away
    }
}

/// One prediction-model snapshot as delivered by the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSnapshot {
    pub pick: String,
    /// In [0, 1].
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probs: Option<serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Status-conditional sub-objects
// ---------------------------------------------------------------------------

/// Present iff status == LIVE.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveState {
    pub score: Score,
    pub elapsed_minutes: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statistics: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchOutcome {
    Home,
    Draw,
    Away,
}

impl MatchOutcome {
    pub fn from_score(score: Score) -> Self {
        if score.home > score.away {
            MatchOutcome::Home
        } else if score.home < score.away {
            MatchOutcome::Away
        } else {
            MatchOutcome::Draw
        }
    }

    pub fn text(&self) -> &'static str {
        match self {
            MatchOutcome::Home => "Home win",
            MatchOutcome::Draw => "Draw",
            MatchOutcome::Away => "Away win",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalResult {
    pub score: Score,
    pub outcome: MatchOutcome,
    pub outcome_text: String,
}

/// Present iff status == FINISHED. Append-only once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinishedState {
    pub result: FinalResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statistics: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referee: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attendance: Option<u32>,
}

// ---------------------------------------------------------------------------
// Canonical record
// ---------------------------------------------------------------------------

/// The single authoritative representation of a match, keyed by the
/// provider's external id. Upsert is the only mutation path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalMatch {
    pub match_id: String,
    pub home_team: String,
    pub away_team: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub league: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home_logo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub away_logo: Option<String>,

    pub status: MatchStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kickoff_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consensus_odds: Option<ConsensusOdds>,
    /// Bookmaker name → quoted three-way odds.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub all_bookmakers: BTreeMap<String, ConsensusOdds>,
    pub book_count: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub v1_model: Option<ModelSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub v2_model: Option<ModelSnapshot>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub live: Option<LiveState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished: Option<FinishedState>,

    pub last_synced_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_sync_at: Option<DateTime<Utc>>,
    pub sync_priority: SyncPriority,
    pub sync_error_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync_error: Option<String>,
}

// ---------------------------------------------------------------------------
// Sync reporting
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub synced: u32,
    pub errors: u32,
    pub skipped: u32,
}

impl StatusCounts {
    pub fn add(&mut self, other: StatusCounts) {
        self.synced += other.synced;
        self.errors += other.errors;
        self.skipped += other.skipped;
    }
}

/// Aggregated outcome of one orchestrator run.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub started_at: DateTime<Utc>,
    /// Per-target counts, keyed by the trigger-facing target name.
    pub results: BTreeMap<String, StatusCounts>,
    pub duration_ms: u64,
    /// Every error message collected during the run, in order.
    pub errors: Vec<String>,
}

impl SyncReport {
    pub fn totals(&self) -> StatusCounts {
        let mut total = StatusCounts::default();
        for counts in self.results.values() {
            total.add(*counts);
        }
        total
    }

    pub fn summary(&self) -> String {
        let t = self.totals();
        format!(
            "synced={} errors={} skipped={} in {}ms",
            t.synced, t.errors, t.skipped, self.duration_ms
        )
    }
}
