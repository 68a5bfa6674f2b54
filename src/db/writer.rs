use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::error;

use crate::error::Result;
use crate::types::{CanonicalMatch, StatusCounts};

/// Events mirrored from the sync path into SQLite. The channel is fed with
/// `try_send`: persistence is a diagnostic side channel and its failures
/// must never fail the sync itself.
#[derive(Debug)]
pub enum PersistEvent {
    MatchUpserted(Box<CanonicalMatch>),
    SyncFailure {
        match_id: String,
        message: String,
    },
    RunCompleted {
        started_at: DateTime<Utc>,
        duration_ms: u64,
        totals: StatusCounts,
        forced: bool,
        detail: String,
    },
}

/// Receives persist events and writes them to SQLite from a dedicated task,
/// off the sync path. Write errors are logged and dropped.
pub struct DbWriter {
    pool: sqlx::SqlitePool,
    rx: mpsc::Receiver<PersistEvent>,
}

impl DbWriter {
    pub fn new(pool: sqlx::SqlitePool, rx: mpsc::Receiver<PersistEvent>) -> Self {
        Self { pool, rx }
    }

    pub async fn run(mut self) {
        while let Some(event) = self.rx.recv().await {
            if let Err(e) = self.write(event).await {
                error!("DB write error: {e}");
            }
        }
    }

    async fn write(&self, event: PersistEvent) -> Result<()> {
        match event {
            PersistEvent::MatchUpserted(m) => self.write_match(&m).await,
            PersistEvent::SyncFailure { match_id, message } => {
                sqlx::query(
                    "UPDATE matches SET sync_error_count = sync_error_count + 1, \
                     last_sync_error = ? WHERE match_id = ?",
                )
                .bind(&message)
                .bind(&match_id)
                .execute(&self.pool)
                .await?;
                Ok(())
            }
            PersistEvent::RunCompleted {
                started_at,
                duration_ms,
                totals,
                forced,
                detail,
            } => {
                sqlx::query(
                    "INSERT INTO sync_runs (started_at, duration_ms, synced, errors, skipped, forced, detail) \
                     VALUES (?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(started_at.to_rfc3339())
                .bind(duration_ms as i64)
                .bind(totals.synced as i64)
                .bind(totals.errors as i64)
                .bind(totals.skipped as i64)
                .bind(forced as i64)
                .bind(&detail)
                .execute(&self.pool)
                .await?;
                Ok(())
            }
        }
    }

    async fn write_match(&self, m: &CanonicalMatch) -> Result<()> {
        let (score_home, score_away, elapsed) = match (&m.live, &m.finished) {
            (Some(live), _) => (
                Some(live.score.home as i64),
                Some(live.score.away as i64),
                Some(live.elapsed_minutes as i64),
            ),
            (None, Some(fin)) => (
                Some(fin.result.score.home as i64),
                Some(fin.result.score.away as i64),
                None,
            ),
            (None, None) => (None, None, None),
        };
        let final_outcome = m
            .finished
            .as_ref()
            .map(|f| f.result.outcome_text.clone());

        sqlx::query(
            "INSERT INTO matches (\
                match_id, home_team, away_team, league, status, kickoff_at, \
                odds_home, odds_draw, odds_away, book_count, \
                score_home, score_away, elapsed_minutes, final_outcome, \
                sync_priority, last_synced_at, next_sync_at, sync_error_count, last_sync_error\
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(match_id) DO UPDATE SET \
                home_team = excluded.home_team, \
                away_team = excluded.away_team, \
                league = excluded.league, \
                status = excluded.status, \
                kickoff_at = excluded.kickoff_at, \
                odds_home = excluded.odds_home, \
                odds_draw = excluded.odds_draw, \
                odds_away = excluded.odds_away, \
                book_count = excluded.book_count, \
                score_home = excluded.score_home, \
                score_away = excluded.score_away, \
                elapsed_minutes = excluded.elapsed_minutes, \
                final_outcome = excluded.final_outcome, \
                sync_priority = excluded.sync_priority, \
                last_synced_at = excluded.last_synced_at, \
                next_sync_at = excluded.next_sync_at, \
                sync_error_count = excluded.sync_error_count, \
                last_sync_error = excluded.last_sync_error",
        )
        .bind(&m.match_id)
        .bind(&m.home_team)
        .bind(&m.away_team)
        .bind(&m.league)
        .bind(m.status.to_string())
        .bind(m.kickoff_at.map(|t| t.to_rfc3339()))
        .bind(m.consensus_odds.map(|o| o.home))
        .bind(m.consensus_odds.map(|o| o.draw))
        .bind(m.consensus_odds.map(|o| o.away))
        .bind(m.book_count as i64)
        .bind(score_home)
        .bind(score_away)
        .bind(elapsed)
        .bind(final_outcome)
        .bind(m.sync_priority.to_string())
        .bind(m.last_synced_at.to_rfc3339())
        .bind(m.next_sync_at.map(|t| t.to_rfc3339()))
        .bind(m.sync_error_count as i64)
        .bind(&m.last_sync_error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
