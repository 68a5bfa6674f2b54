use std::future::Future;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::config::{Config, FETCH_BACKOFF_BASE_SECS, FETCH_MAX_ATTEMPTS};
use crate::error::{AppError, Result};
use crate::types::SyncTarget;

/// Authenticated client for the upstream match-market provider.
///
/// Every failure mode of one request (connect error, non-2xx, malformed
/// JSON) surfaces as a single fetch error; callers only ever see either a
/// list of raw matches or an exhausted-retries error.
pub struct ProviderClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl ProviderClient {
    pub fn new(cfg: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            base_url: cfg.provider_api_url.clone(),
            api_key: cfg.provider_api_key.clone(),
        })
    }

    /// Fetch matches for one lifecycle status, retrying with exponential
    /// backoff. Exhausting retries returns an error for the orchestrator to
    /// bulkhead; it never takes down sibling status batches.
    pub async fn fetch_matches(&self, target: SyncTarget, limit: u32) -> Result<Vec<Value>> {
        let status = target.provider_status();
        with_retry(
            status,
            FETCH_MAX_ATTEMPTS,
            Duration::from_secs(FETCH_BACKOFF_BASE_SECS),
            || self.fetch_once(status, limit),
        )
        .await
    }

    async fn fetch_once(&self, status: &str, limit: u32) -> Result<Vec<Value>> {
        let url = format!(
            "{}/market?status={}&limit={}&include_v2=false",
            self.base_url, status, limit
        );
        let resp = self.http.get(&url).bearer_auth(&self.api_key).send().await?;
        if !resp.status().is_success() {
            return Err(AppError::UpstreamStatus(resp.status()));
        }

        let body: Value = resp.json().await?;
        let matches = decode_match_list(body)?;
        debug!(status, count = matches.len(), "provider fetch ok");
        Ok(matches)
    }
}

/// The provider has shipped both a bare array and an enveloped object over
/// its API revisions; accept either.
fn decode_match_list(body: Value) -> Result<Vec<Value>> {
    match body {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => {
            for key in ["matches", "data", "results"] {
                if let Some(Value::Array(items)) = map.remove(key) {
                    return Ok(items);
                }
            }
            Err(AppError::UpstreamPayload(
                "match list response was neither an array nor an envelope".to_string(),
            ))
        }
        other => Err(AppError::UpstreamPayload(format!(
            "match list response was {}",
            value_kind(&other)
        ))),
    }
}

fn value_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a bool",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Delay before the retry following a failed `attempt` (1-based): the base
/// delay doubled per prior attempt: 2s after the first failure, 4s after
/// the second.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base * 2u32.saturating_pow(attempt.saturating_sub(1))
}

/// Run `op` up to `max_attempts` times, sleeping `backoff_delay` between
/// attempts and logging each retry with its attempt number and delay.
/// The final failure is wrapped with the status label and attempt count.
pub async fn with_retry<T, F, Fut>(
    label: &str,
    max_attempts: u32,
    base_delay: Duration,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt >= max_attempts => {
                return Err(AppError::Fetch {
                    status: label.to_string(),
                    attempts: attempt,
                    message: err.to_string(),
                });
            }
            Err(err) => {
                let delay = backoff_delay(base_delay, attempt);
                warn!(
                    attempt,
                    delay_secs = delay.as_secs(),
                    "fetch '{label}' attempt {attempt} failed: {err}; retrying in {}s",
                    delay.as_secs()
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn backoff_ladder_doubles_from_two_seconds() {
        let base = Duration::from_secs(2);
        assert_eq!(backoff_delay(base, 1), Duration::from_secs(2));
        assert_eq!(backoff_delay(base, 2), Duration::from_secs(4));
        assert_eq!(backoff_delay(base, 3), Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn two_failures_then_success_reports_no_error() {
        let calls = AtomicU32::new(0);
        let started = tokio::time::Instant::now();

        let result = with_retry("live", 3, Duration::from_secs(2), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(AppError::UpstreamPayload("transient".to_string()))
                } else {
                    Ok(vec![1, 2, 3])
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), vec![1, 2, 3]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // Backoff slept 2s then 4s before the succeeding attempt.
        assert_eq!(started.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_surface_attempt_count() {
        let result: Result<()> = with_retry("upcoming", 3, Duration::from_secs(2), || async {
            Err(AppError::UpstreamPayload("down".to_string()))
        })
        .await;

        match result {
            Err(AppError::Fetch {
                status, attempts, ..
            }) => {
                assert_eq!(status, "upcoming");
                assert_eq!(attempts, 3);
            }
            other => panic!("expected Fetch error, got {other:?}"),
        }
    }

    #[test]
    fn decode_accepts_bare_array_and_envelope() {
        let bare = serde_json::json!([{ "id": "a" }]);
        assert_eq!(decode_match_list(bare).unwrap().len(), 1);

        let envelope = serde_json::json!({ "matches": [{ "id": "a" }, { "id": "b" }] });
        assert_eq!(decode_match_list(envelope).unwrap().len(), 2);

        let bogus = serde_json::json!("nope");
        assert!(decode_match_list(bogus).is_err());
    }
}
