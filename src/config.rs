use crate::error::{AppError, Result};

pub const PROVIDER_API_URL: &str = "https://api.sportsfeed.example.com/v2";

/// Provider fetch retry policy: total attempts and first backoff delay.
/// Delays double per attempt (2s, 4s), so a fully failed fetch costs ~6s.
pub const FETCH_MAX_ATTEMPTS: u32 = 3;
pub const FETCH_BACKOFF_BASE_SECS: u64 = 2;

/// Freshness windows: a stored record younger than this (per its status)
/// is skipped by the gate rather than re-upserted.
pub const LIVE_FRESHNESS_SECS: i64 = 30;
pub const UPCOMING_FRESHNESS_SECS: i64 = 600;

/// Resync horizons written into `next_sync_at` by the transformer.
pub const LIVE_RESYNC_SECS: i64 = 30;
pub const UPCOMING_RESYNC_SECS: i64 = 600;

/// Upcoming matches kicking off within this horizon get medium priority.
pub const KICKOFF_SOON_HOURS: i64 = 24;

/// Over/under lines quoted per match, and per-team total lines.
pub const TOTAL_LINES: &[f64] = &[0.5, 1.5, 2.5, 3.5, 4.5];
pub const TEAM_TOTAL_LINES: &[f64] = &[0.5, 1.5, 2.5];

/// Asian handicap lines, home-oriented. Zero is the level line.
pub const HANDICAP_LINES: &[f64] = &[-1.5, -1.0, -0.5, 0.0, 0.5, 1.0, 1.5];

/// Minimum individual leg probability for parlay inclusion.
pub const SAFE_LEG_MIN_PROB: f64 = 0.55;
/// Confidence tier cutoffs on combined parlay probability.
pub const PARLAY_HIGH_TIER_MIN: f64 = 0.30;
pub const PARLAY_MEDIUM_TIER_MIN: f64 = 0.20;
/// 3-leg combinations draw only from this many top legs.
pub const TRIPLE_LEG_POOL: usize = 10;

/// Channel capacity for the persistence side channel.
pub const CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub struct Config {
    pub provider_api_url: String,
    pub provider_api_key: String,
    /// Shared secret for the scheduled `GET /sync` trigger.
    pub cron_secret: String,
    /// Bearer tokens accepted on `POST /sync-manual` (OPERATOR_TOKENS, comma-separated).
    pub operator_tokens: Vec<String>,
    /// Subset of operator tokens with admin role (ADMIN_TOKENS, comma-separated).
    pub admin_tokens: Vec<String>,
    pub log_level: String,
    pub db_path: String,
    pub api_port: u16,
    /// Max matches requested per status fetch (FETCH_LIMIT).
    pub fetch_limit: u32,
    /// In-process scheduler interval; 0 disables it (external cron only).
    pub sync_interval_secs: u64,
    /// Hard ceiling on a single status batch before it is abandoned.
    pub batch_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            provider_api_url: std::env::var("PROVIDER_API_URL")
                .unwrap_or_else(|_| PROVIDER_API_URL.to_string()),
            provider_api_key: std::env::var("PROVIDER_API_KEY")
                .map_err(|_| AppError::Config("PROVIDER_API_KEY must be set".to_string()))?,
            cron_secret: std::env::var("CRON_SECRET")
                .map_err(|_| AppError::Config("CRON_SECRET must be set".to_string()))?,
            operator_tokens: split_csv(&std::env::var("OPERATOR_TOKENS").unwrap_or_default()),
            admin_tokens: split_csv(&std::env::var("ADMIN_TOKENS").unwrap_or_default()),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "matchsync.db".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            fetch_limit: std::env::var("FETCH_LIMIT")
                .unwrap_or_else(|_| "100".to_string())
                .parse::<u32>()
                .unwrap_or(100),
            sync_interval_secs: std::env::var("SYNC_INTERVAL_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse::<u64>()
                .unwrap_or(60),
            batch_timeout_secs: std::env::var("BATCH_TIMEOUT_SECS")
                .unwrap_or_else(|_| "120".to_string())
                .parse::<u64>()
                .unwrap_or(120),
        })
    }
}

fn split_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
