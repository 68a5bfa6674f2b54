use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use crate::error::{AppError, Result};
use crate::types::{CanonicalMatch, MatchStatus};

/// Result of an upsert against the canonical store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
    /// The write would not advance `last_synced_at`; rejected, nothing stored.
    Stale,
}

// ---------------------------------------------------------------------------
// MatchStore
// ---------------------------------------------------------------------------

/// Canonical match records keyed by external match id. Upsert is the only
/// mutation path; the DashMap entry API makes each upsert an atomic per-key
/// read-modify-write, so overlapping syncs of the same match cannot corrupt
/// a record. The later write simply wins.
pub struct MatchStore {
    matches: DashMap<String, CanonicalMatch>,
}

impl MatchStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            matches: DashMap::new(),
        })
    }

    /// Create or update the record for `incoming.match_id`.
    ///
    /// Rules enforced here rather than by callers:
    /// - `last_synced_at` only advances; a write at an earlier or equal time
    ///   is rejected as `Stale`.
    /// - a FINISHED record accepts sync bookkeeping only; its final result
    ///   and statistics are append-only and never altered.
    /// - `kickoff_at` is immutable once observed, barring postponement.
    /// - success resets the error counter and clears the last error.
    pub fn upsert(&self, incoming: CanonicalMatch) -> Result<UpsertOutcome> {
        if incoming.match_id.trim().is_empty() {
            return Err(AppError::InvalidRecord("empty match id".to_string()));
        }
        if let Some(odds) = &incoming.consensus_odds {
            // A decimal odd at or below 1.0 is not a price.
            if odds.home <= 1.0 || odds.draw <= 1.0 || odds.away <= 1.0 {
                return Err(AppError::InvalidRecord(format!(
                    "consensus odds out of range for {}: {:.2}/{:.2}/{:.2}",
                    incoming.match_id, odds.home, odds.draw, odds.away
                )));
            }
        }

        match self.matches.entry(incoming.match_id.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(incoming);
                Ok(UpsertOutcome::Created)
            }
            Entry::Occupied(mut slot) => {
                let existing = slot.get_mut();

                if incoming.last_synced_at <= existing.last_synced_at {
                    debug!(
                        match_id = %incoming.match_id,
                        "stale write rejected (last_synced_at would not advance)"
                    );
                    return Ok(UpsertOutcome::Stale);
                }

                if existing.status == MatchStatus::Finished {
                    existing.last_synced_at = incoming.last_synced_at;
                    existing.next_sync_at = None;
                    existing.sync_error_count = 0;
                    existing.last_sync_error = None;
                    return Ok(UpsertOutcome::Updated);
                }

                let mut merged = incoming;
                if let Some(kickoff) = existing.kickoff_at {
                    if merged.status != MatchStatus::Postponed {
                        merged.kickoff_at = Some(kickoff);
                    } else if merged.kickoff_at.is_none() {
                        merged.kickoff_at = Some(kickoff);
                    }
                }
                // Display metadata is sticky: a sparse payload must not wipe
                // what an earlier, richer one provided.
                if merged.league.is_none() {
                    merged.league = existing.league.take();
                }
                if merged.home_logo.is_none() {
                    merged.home_logo = existing.home_logo.take();
                }
                if merged.away_logo.is_none() {
                    merged.away_logo = existing.away_logo.take();
                }
                merged.sync_error_count = 0;
                merged.last_sync_error = None;

                *existing = merged;
                Ok(UpsertOutcome::Updated)
            }
        }
    }

    /// Best-effort diagnostic bookkeeping after a per-match sync failure.
    /// Missing records are ignored; this must never fail the caller.
    pub fn record_sync_error(&self, match_id: &str, message: &str) {
        if let Some(mut rec) = self.matches.get_mut(match_id) {
            rec.sync_error_count += 1;
            rec.last_sync_error = Some(message.to_string());
        }
    }

    pub fn get(&self, match_id: &str) -> Option<CanonicalMatch> {
        self.matches.get(match_id).map(|r| r.clone())
    }

    pub fn match_count(&self) -> usize {
        self.matches.len()
    }

    pub fn all(&self) -> Vec<CanonicalMatch> {
        self.matches.iter().map(|r| r.value().clone()).collect()
    }

    pub fn by_status(&self, status: MatchStatus) -> Vec<CanonicalMatch> {
        self.matches
            .iter()
            .filter(|r| r.value().status == status)
            .map(|r| r.value().clone())
            .collect()
    }

    /// Record counts per status, for the health endpoint.
    pub fn status_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for r in self.matches.iter() {
            *counts.entry(r.value().status.to_string()).or_insert(0) += 1;
        }
        counts
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
