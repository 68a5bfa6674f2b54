pub mod freshness;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout};
use tracing::{error, info, warn};

use crate::client::ProviderClient;
use crate::config::Config;
use crate::db::PersistEvent;
use crate::error::{AppError, Result};
use crate::state::{MatchStore, UpsertOutcome};
use crate::transform::transform;
use crate::types::{StatusCounts, SyncReport, SyncTarget};

// ---------------------------------------------------------------------------
// SyncEngine
// ---------------------------------------------------------------------------

/// Orchestrates one sync pass: fetch per status, transform, gate, upsert.
/// Failures are contained at the narrowest possible scope: a bad match
/// never aborts its batch, and a dead status fetch never blocks the sibling
/// statuses in the same run.
pub struct SyncEngine {
    client: ProviderClient,
    store: Arc<MatchStore>,
    fetch_limit: u32,
    batch_timeout: Duration,
    persist_tx: Option<mpsc::Sender<PersistEvent>>,
}

impl SyncEngine {
    pub fn new(
        cfg: &Config,
        store: Arc<MatchStore>,
        persist_tx: Option<mpsc::Sender<PersistEvent>>,
    ) -> Result<Self> {
        Ok(Self {
            client: ProviderClient::new(cfg)?,
            store,
            fetch_limit: cfg.fetch_limit,
            batch_timeout: Duration::from_secs(cfg.batch_timeout_secs.max(1)),
            persist_tx,
        })
    }

    /// Run one sync pass over the requested targets. `force` bypasses the
    /// freshness gate (operator catch-up); stale-write protection in the
    /// store still applies.
    pub async fn run(&self, targets: &[SyncTarget], force: bool) -> SyncReport {
        let started_at = Utc::now();
        let clock = std::time::Instant::now();
        let mut results = BTreeMap::new();
        let mut errors = Vec::new();

        for &target in targets {
            let counts = match timeout(self.batch_timeout, self.sync_target(target, force)).await {
                Ok((counts, mut batch_errors)) => {
                    errors.append(&mut batch_errors);
                    counts
                }
                // Batch abandoned: report the partial run rather than hang.
                Err(_) => {
                    let e = AppError::BatchTimeout(target.to_string());
                    error!("{e}");
                    errors.push(e.to_string());
                    StatusCounts {
                        synced: 0,
                        errors: 1,
                        skipped: 0,
                    }
                }
            };
            results.insert(target.to_string(), counts);
        }

        let report = SyncReport {
            started_at,
            results,
            duration_ms: clock.elapsed().as_millis() as u64,
            errors,
        };
        let totals = report.totals();
        info!(
            synced = totals.synced,
            errors = totals.errors,
            skipped = totals.skipped,
            duration_ms = report.duration_ms,
            force,
            "sync run complete: {}",
            report.summary()
        );

        self.persist(PersistEvent::RunCompleted {
            started_at,
            duration_ms: report.duration_ms,
            totals,
            forced: force,
            detail: report.summary(),
        });
        report
    }

    /// One status batch: a single provider fetch (retried internally), then
    /// the per-match pipeline. Fetch exhaustion costs exactly one aggregate
    /// error and the run moves on.
    async fn sync_target(&self, target: SyncTarget, force: bool) -> (StatusCounts, Vec<String>) {
        let raw = match self.client.fetch_matches(target, self.fetch_limit).await {
            Ok(raw) => raw,
            Err(e) => {
                error!("sync '{target}' fetch failed: {e}");
                return (
                    StatusCounts {
                        synced: 0,
                        errors: 1,
                        skipped: 0,
                    },
                    vec![e.to_string()],
                );
            }
        };
        self.process_batch(&raw, force)
    }

    /// Transform, gate, and upsert a batch of raw matches. Synchronous on
    /// purpose: everything here is in-memory, and it keeps the per-match
    /// pipeline testable without a provider.
    pub fn process_batch(&self, raw_items: &[Value], force: bool) -> (StatusCounts, Vec<String>) {
        let mut counts = StatusCounts::default();
        let mut errors = Vec::new();

        for raw in raw_items {
            let now = Utc::now();

            // No usable identifier: data-quality skip, not a fault.
            let Some(record) = transform(raw, now) else {
                counts.skipped += 1;
                continue;
            };
            let match_id = record.match_id.clone();

            if !force {
                let existing = self.store.get(&match_id);
                if freshness::should_skip(existing.as_ref(), now) {
                    counts.skipped += 1;
                    continue;
                }
            }

            match self.store.upsert(record) {
                Ok(UpsertOutcome::Stale) => counts.skipped += 1,
                Ok(_) => {
                    counts.synced += 1;
                    if let Some(stored) = self.store.get(&match_id) {
                        self.persist(PersistEvent::MatchUpserted(Box::new(stored)));
                    }
                }
                Err(e) => {
                    counts.errors += 1;
                    let message = e.to_string();
                    self.store.record_sync_error(&match_id, &message);
                    self.persist(PersistEvent::SyncFailure {
                        match_id: match_id.clone(),
                        message: message.clone(),
                    });
                    errors.push(format!("{match_id}: {message}"));
                }
            }
        }

        (counts, errors)
    }

    /// Diagnostic side channel: failure to enqueue must never fail the sync
    /// path, so a full or closed channel is only logged.
    fn persist(&self, event: PersistEvent) {
        if let Some(tx) = &self.persist_tx {
            if let Err(e) = tx.try_send(event) {
                warn!("persist channel rejected event: {e}");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// SyncScheduler
// ---------------------------------------------------------------------------

/// Periodic in-process trigger over the engine. The scheduled `GET /sync`
/// endpoint remains the primary trigger; this loop covers deployments
/// without an external cron. Interval 0 disables it.
pub struct SyncScheduler {
    engine: Arc<SyncEngine>,
    interval_secs: u64,
}

impl SyncScheduler {
    pub fn new(engine: Arc<SyncEngine>, interval_secs: u64) -> Self {
        Self {
            engine,
            interval_secs,
        }
    }

    pub async fn run(self) {
        if self.interval_secs == 0 {
            info!("in-process sync scheduler disabled (SYNC_INTERVAL_SECS=0)");
            return;
        }

        let mut ticker = interval(Duration::from_secs(self.interval_secs));
        ticker.tick().await; // skip immediate first tick, the trigger endpoints own startup syncs

        loop {
            ticker.tick().await;
            self.engine.run(SyncTarget::ALL, false).await;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_config() -> Config {
        Config {
            provider_api_url: "http://localhost:9".to_string(),
            provider_api_key: "test-key".to_string(),
            cron_secret: "secret".to_string(),
            operator_tokens: vec![],
            admin_tokens: vec![],
            log_level: "info".to_string(),
            db_path: ":memory:".to_string(),
            api_port: 0,
            fetch_limit: 100,
            sync_interval_secs: 0,
            batch_timeout_secs: 5,
        }
    }

    fn engine() -> SyncEngine {
        SyncEngine::new(&test_config(), MatchStore::new(), None).unwrap()
    }

    #[tokio::test]
    async fn unusable_ids_count_as_skipped_not_errored() {
        let engine = engine();
        let batch = vec![
            json!({ "id": "undefined", "status": "live" }),
            json!({ "status": "live" }),
            json!({ "id": "m-1", "status": "live" }),
        ];
        let (counts, errors) = engine.process_batch(&batch, false);
        assert_eq!(counts.synced, 1);
        assert_eq!(counts.skipped, 2);
        assert_eq!(counts.errors, 0);
        assert!(errors.is_empty());
    }

    #[tokio::test]
    async fn fresh_records_are_gated_and_force_bypasses() {
        let engine = engine();
        let batch = vec![json!({
            "id": "m-1",
            "status": "live",
            "score": { "home": 0, "away": 0 },
        })];

        let (counts, _) = engine.process_batch(&batch, false);
        assert_eq!(counts.synced, 1);

        // Immediately re-observed: inside the 30s live window.
        let (counts, _) = engine.process_batch(&batch, false);
        assert_eq!(counts.synced, 0);
        assert_eq!(counts.skipped, 1);

        // Forced: the gate is bypassed and the record upserts again.
        let (counts, _) = engine.process_batch(&batch, true);
        assert_eq!(counts.skipped + counts.synced, 1);
        assert_eq!(counts.errors, 0);
    }

    #[tokio::test]
    async fn finished_matches_are_terminal_for_unforced_syncs() {
        let engine = engine();
        let finished = vec![json!({
            "id": "m-9",
            "status": "finished",
            "score": { "home": 2, "away": 2 },
        })];

        let (counts, _) = engine.process_batch(&finished, false);
        assert_eq!(counts.synced, 1);

        // Any later unforced observation, changed payload or not, is skipped.
        let changed = vec![json!({
            "id": "m-9",
            "status": "live",
            "score": { "home": 3, "away": 2 },
        })];
        let (counts, _) = engine.process_batch(&changed, false);
        assert_eq!(counts.skipped, 1);
        assert_eq!(counts.synced, 0);

        let stored = engine.store.get("m-9").unwrap();
        assert!(stored.next_sync_at.is_none());
        assert_eq!(stored.finished.unwrap().result.score.total(), 4);
    }

    #[tokio::test]
    async fn per_match_errors_do_not_abort_the_batch() {
        let engine = engine();
        // Seed a record so the failing re-sync has a row to annotate.
        let (counts, _) = engine.process_batch(
            &[json!({ "id": "m-1", "status": "live", "odds": { "home": 2.0, "draw": 3.3, "away": 3.8 } })],
            false,
        );
        assert_eq!(counts.synced, 1);

        // One poisoned match (odds at 1.0 are rejected by the store), one
        // good one. Forced so the gate does not hide the poisoned row.
        let batch = vec![
            json!({ "id": "m-1", "status": "live", "odds": { "home": 1.0, "draw": 3.3, "away": 3.8 } }),
            json!({ "id": "m-2", "status": "upcoming" }),
        ];
        let (counts, errors) = engine.process_batch(&batch, true);
        assert_eq!(counts.errors, 1);
        assert_eq!(counts.synced, 1);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("m-1:"));

        let annotated = engine.store.get("m-1").unwrap();
        assert_eq!(annotated.sync_error_count, 1);
        assert!(annotated.last_sync_error.is_some());
        // The previously stored good record is untouched.
        assert!(annotated.consensus_odds.is_some());
    }
}
