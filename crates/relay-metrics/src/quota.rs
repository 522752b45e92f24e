//! Advisory request and token counters for the cloud backend.
//!
//! Counters live in external key-value caches, one per counter. Minute
//! counters are keyed `account:model`, day counters `account:model:YYYY-MM-DD`
//! (UTC); the windows themselves come from the caches' entry expiry. Updates are a
//! plain read-increment-write, so concurrent callers may lose increments.
//! Nothing here ever blocks or fails a request.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use relay_core::{InMemoryCache, QuotaConfig, SharedCache};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::MetricsResult;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaCounters {
    pub requests_per_minute: u64,
    pub tokens_per_minute: u64,
    pub requests_per_day: u64,
    pub tokens_per_day: u64,
}

/// One counter measured against its limit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuotaGauge {
    pub current: u64,
    pub limit: u64,
    pub percentage: f64,
    pub approaching: bool,
}

impl QuotaGauge {
    /// A zero limit means "no limit known" and never warns.
    fn measure(current: u64, limit: u64, threshold: f64) -> Self {
        if limit == 0 {
            return Self {
                current,
                limit,
                percentage: 0.0,
                approaching: false,
            };
        }
        Self {
            current,
            limit,
            percentage: current as f64 / limit as f64 * 100.0,
            approaching: current as f64 > limit as f64 * threshold,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuotaStatus {
    pub rpm: QuotaGauge,
    pub tpm: QuotaGauge,
    pub warnings: Vec<String>,
}

/// The four counter stores. Minute stores should expire entries about a
/// minute after their last write; day keys carry the date, so day stores
/// only need an expiry for housekeeping.
#[derive(Clone)]
pub struct QuotaStores {
    pub rpm: SharedCache,
    pub tpm: SharedCache,
    pub rpd: SharedCache,
    pub tpd: SharedCache,
}

impl QuotaStores {
    /// Process-local stores with a 60 s minute window and a 25 h day window.
    pub fn in_memory() -> Self {
        let minute = || -> SharedCache { Arc::new(InMemoryCache::with_ttl(Duration::from_secs(60))) };
        let day = || -> SharedCache { Arc::new(InMemoryCache::with_ttl(Duration::from_secs(25 * 3600))) };
        Self {
            rpm: minute(),
            tpm: minute(),
            rpd: day(),
            tpd: day(),
        }
    }
}

pub struct QuotaLedger {
    stores: QuotaStores,
}

impl QuotaLedger {
    pub fn new(stores: QuotaStores) -> Self {
        Self { stores }
    }

    fn minute_key(account: &str, model: &str) -> String {
        format!("{}:{}", account, model)
    }

    fn day_key(account: &str, model: &str, now: DateTime<Utc>) -> String {
        format!("{}:{}:{}", account, model, now.format("%Y-%m-%d"))
    }

    async fn read(store: &SharedCache, key: &str) -> MetricsResult<u64> {
        Ok(store.get(key).await?.as_ref().and_then(Value::as_u64).unwrap_or(0))
    }

    async fn increment(store: &SharedCache, key: &str, by: u64) -> MetricsResult<u64> {
        let next = Self::read(store, key).await?.saturating_add(by);
        store.set(key, Value::from(next)).await?;
        Ok(next)
    }

    async fn try_record(
        &self,
        account: &str,
        model: &str,
        total_tokens: u64,
        now: DateTime<Utc>,
    ) -> MetricsResult<QuotaCounters> {
        let minute_key = Self::minute_key(account, model);
        let day_key = Self::day_key(account, model, now);

        Ok(QuotaCounters {
            requests_per_minute: Self::increment(&self.stores.rpm, &minute_key, 1).await?,
            tokens_per_minute: Self::increment(&self.stores.tpm, &minute_key, total_tokens).await?,
            requests_per_day: Self::increment(&self.stores.rpd, &day_key, 1).await?,
            tokens_per_day: Self::increment(&self.stores.tpd, &day_key, total_tokens).await?,
        })
    }

    async fn try_snapshot(&self, account: &str, model: &str, now: DateTime<Utc>) -> MetricsResult<QuotaCounters> {
        let minute_key = Self::minute_key(account, model);
        let day_key = Self::day_key(account, model, now);

        Ok(QuotaCounters {
            requests_per_minute: Self::read(&self.stores.rpm, &minute_key).await?,
            tokens_per_minute: Self::read(&self.stores.tpm, &minute_key).await?,
            requests_per_day: Self::read(&self.stores.rpd, &day_key).await?,
            tokens_per_day: Self::read(&self.stores.tpd, &day_key).await?,
        })
    }

    /// Count one request and its tokens. Returns the updated counters, or
    /// `None` if the cache failed (the failure is logged).
    pub async fn record_usage(
        &self,
        account: &str,
        model: &str,
        prompt_tokens: u64,
        completion_tokens: u64,
    ) -> Option<QuotaCounters> {
        self.record_usage_at(account, model, prompt_tokens, completion_tokens, Utc::now())
            .await
    }

    pub async fn record_usage_at(
        &self,
        account: &str,
        model: &str,
        prompt_tokens: u64,
        completion_tokens: u64,
        now: DateTime<Utc>,
    ) -> Option<QuotaCounters> {
        let total = prompt_tokens.saturating_add(completion_tokens);

        match self.try_record(account, model, total, now).await {
            Ok(counters) => {
                log::debug!(
                    "[QuotaLedger] quota tracking project={} model={} rpm={} tpm={} rpd={} tpd={}",
                    account,
                    model,
                    counters.requests_per_minute,
                    counters.tokens_per_minute,
                    counters.requests_per_day,
                    counters.tokens_per_day
                );
                Some(counters)
            }
            Err(e) => {
                log::warn!("[QuotaLedger] Failed to track quota usage: {}", e);
                None
            }
        }
    }

    /// Current counters; missing keys read as zero, and a failing cache
    /// yields an all-zero snapshot.
    pub async fn snapshot(&self, account: &str, model: &str) -> QuotaCounters {
        self.snapshot_at(account, model, Utc::now()).await
    }

    pub async fn snapshot_at(&self, account: &str, model: &str, now: DateTime<Utc>) -> QuotaCounters {
        self.try_snapshot(account, model, now).await.unwrap_or_else(|e| {
            log::warn!("[QuotaLedger] Failed to get quota usage: {}", e);
            QuotaCounters::default()
        })
    }

    /// Compare minute counters against `limits`. Purely observational:
    /// crossing the threshold only produces warnings.
    pub async fn check_threshold(&self, account: &str, model: &str, limits: &QuotaConfig) -> QuotaStatus {
        let usage = self.snapshot(account, model).await;
        evaluate(&usage, limits)
    }
}

/// Build a [`QuotaStatus`] for already-read counters.
pub fn evaluate(usage: &QuotaCounters, limits: &QuotaConfig) -> QuotaStatus {
    let threshold = limits.warn_threshold_fraction;
    let rpm = QuotaGauge::measure(usage.requests_per_minute, limits.rpm_limit, threshold);
    let tpm = QuotaGauge::measure(usage.tokens_per_minute, limits.tpm_limit, threshold);

    let mut warnings = Vec::new();
    for (name, gauge) in [("RPM", &rpm), ("TPM", &tpm)] {
        if gauge.approaching {
            let msg = format!(
                "Vertex AI {} quota at {:.1}% ({}/{})",
                name, gauge.percentage, gauge.current, gauge.limit
            );
            log::warn!("[QuotaLedger] {}", msg);
            warnings.push(msg);
        }
    }

    QuotaStatus { rpm, tpm, warnings }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use relay_core::{CacheError, KeyValueCache};

    struct DownCache;

    #[async_trait]
    impl KeyValueCache for DownCache {
        async fn get(&self, _key: &str) -> Result<Option<Value>, CacheError> {
            Err(CacheError::Unavailable("connection refused".to_string()))
        }

        async fn set(&self, _key: &str, _value: Value) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("connection refused".to_string()))
        }
    }

    fn ledger() -> QuotaLedger {
        QuotaLedger::new(QuotaStores::in_memory())
    }

    #[tokio::test]
    async fn record_accumulates_all_four_counters() {
        let ledger = ledger();
        ledger.record_usage("acme", "gemini-1.5-pro", 100, 20).await;
        let counters = ledger.record_usage("acme", "gemini-1.5-pro", 50, 5).await.unwrap();

        assert_eq!(
            counters,
            QuotaCounters {
                requests_per_minute: 2,
                tokens_per_minute: 175,
                requests_per_day: 2,
                tokens_per_day: 175,
            }
        );
        assert_eq!(ledger.snapshot("acme", "gemini-1.5-pro").await, counters);
        assert_eq!(ledger.snapshot("acme", "gemini-1.5-flash").await, QuotaCounters::default());
    }

    #[tokio::test]
    async fn day_counters_roll_over_at_utc_midnight() {
        let ledger = ledger();
        let late = Utc.with_ymd_and_hms(2024, 3, 1, 23, 59, 0).unwrap();
        let early = Utc.with_ymd_and_hms(2024, 3, 2, 0, 1, 0).unwrap();

        ledger.record_usage_at("acme", "m", 10, 0, late).await;
        let counters = ledger.record_usage_at("acme", "m", 10, 0, early).await.unwrap();

        assert_eq!(counters.requests_per_minute, 2);
        assert_eq!(counters.requests_per_day, 1);
        assert_eq!(counters.tokens_per_day, 10);
        assert_eq!(ledger.snapshot_at("acme", "m", late).await.tokens_per_day, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn minute_counters_expire_with_the_store() {
        let ledger = ledger();

        ledger.record_usage("acme", "m", 5, 5).await;
        tokio::time::advance(Duration::from_secs(61)).await;

        let counters = ledger.snapshot("acme", "m").await;
        assert_eq!(counters.requests_per_minute, 0);
        assert_eq!(counters.requests_per_day, 1);
    }

    #[tokio::test]
    async fn cache_failures_are_swallowed() {
        let down: SharedCache = Arc::new(DownCache);
        let ledger = QuotaLedger::new(QuotaStores {
            rpm: down.clone(),
            tpm: down.clone(),
            rpd: down.clone(),
            tpd: down,
        });

        assert_eq!(ledger.record_usage("acme", "m", 1, 1).await, None);
        assert_eq!(ledger.snapshot("acme", "m").await, QuotaCounters::default());
        let status = ledger.check_threshold("acme", "m", &QuotaConfig::default()).await;
        assert!(status.warnings.is_empty());
    }

    #[test]
    fn threshold_is_strictly_greater_than() {
        let limits = QuotaConfig {
            rpm_limit: 1000,
            tpm_limit: 4_000_000,
            warn_threshold_fraction: 0.8,
        };

        let at = evaluate(
            &QuotaCounters {
                requests_per_minute: 800,
                ..QuotaCounters::default()
            },
            &limits,
        );
        assert!(!at.rpm.approaching);
        assert!(at.warnings.is_empty());

        let over = evaluate(
            &QuotaCounters {
                requests_per_minute: 850,
                tokens_per_minute: 3_900_000,
                ..QuotaCounters::default()
            },
            &limits,
        );
        assert!(over.rpm.approaching);
        assert!(over.tpm.approaching);
        assert_eq!(over.warnings[0], "Vertex AI RPM quota at 85.0% (850/1000)");
        assert_eq!(over.warnings[1], "Vertex AI TPM quota at 97.5% (3900000/4000000)");
    }

    #[test]
    fn zero_limit_never_warns() {
        let limits = QuotaConfig {
            rpm_limit: 0,
            ..QuotaConfig::default()
        };
        let status = evaluate(
            &QuotaCounters {
                requests_per_minute: 5,
                ..QuotaCounters::default()
            },
            &limits,
        );
        assert!(!status.rpm.approaching);
        assert_eq!(status.rpm.percentage, 0.0);
    }
}
