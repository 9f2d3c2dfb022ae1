//! Per-payment-hash usage accounting and revocation.

use std::{
    collections::HashMap,
    convert::Infallible,
    sync::{Arc, Weak},
    time::Duration,
};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

/// Default age after which the sweeper drops records without an expiry.
pub const DEFAULT_SWEEP_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Usage state of one payment hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    pub count: u64,
    pub revoked: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_used: DateTime<Utc>,
}

impl UsageRecord {
    fn new(expires_at: Option<DateTime<Utc>>) -> Self {
        UsageRecord {
            count: 0,
            revoked: false,
            expires_at,
            last_used: Utc::now(),
        }
    }
}

/// Outcome of [`TokenStore::redeem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redemption {
    /// The use was recorded; `usage_count` includes it.
    Granted { usage_count: u64 },
    /// The token had been revoked before this use.
    Revoked,
    /// This use went past the limit; the token is now revoked.
    Exhausted { max_uses: u64 },
}

impl Redemption {
    pub fn is_granted(&self) -> bool {
        matches!(self, Redemption::Granted { .. })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreMetrics {
    pub active_tokens: u64,
    pub revoked_tokens: u64,
    pub total_payments: u64,
}

/// Storage for usage counts and revocations.
///
/// Implementations must make [`redeem`](TokenStore::redeem) linearizable per payment hash.
/// Operations on different hashes should not block each other.
pub trait TokenStore: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    fn get_usage(&self, payment_hash: &str)
    -> impl Future<Output = Result<u64, Self::Error>> + Send;

    /// Increment and return the new count.
    fn increment_usage(
        &self,
        payment_hash: &str,
    ) -> impl Future<Output = Result<u64, Self::Error>> + Send;

    fn is_revoked(&self, payment_hash: &str)
    -> impl Future<Output = Result<bool, Self::Error>> + Send;

    fn revoke(&self, payment_hash: &str) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Register a freshly minted token with a zero usage count.
    fn record_token(
        &self,
        payment_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Atomically check revocation, count one use and revoke the token once the count
    /// goes past `max_uses`.
    fn redeem(
        &self,
        payment_hash: &str,
        max_uses: u64,
        expires_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<Redemption, Self::Error>> + Send;

    fn metrics(&self) -> impl Future<Output = Result<StoreMetrics, Self::Error>> + Send;

    /// Drop records of expired tokens and records idle for longer than `max_age`.
    /// Returns the number of records removed.
    fn sweep(
        &self,
        now: DateTime<Utc>,
        max_age: Duration,
    ) -> impl Future<Output = Result<usize, Self::Error>> + Send;
}

/// An in-process [`TokenStore`] with one lock per payment hash.
///
/// Suitable for a single instance only: usage limits are not shared across processes.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    records: RwLock<HashMap<String, Arc<Mutex<UsageRecord>>>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, payment_hash: &str) -> Option<Arc<Mutex<UsageRecord>>> {
        self.records.read().get(payment_hash).cloned()
    }

    fn record_or_insert(
        &self,
        payment_hash: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Arc<Mutex<UsageRecord>> {
        if let Some(record) = self.record(payment_hash) {
            return record;
        }
        self.records
            .write()
            .entry(payment_hash.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(UsageRecord::new(expires_at))))
            .clone()
    }

    /// Snapshot of the record for `payment_hash`.
    pub fn usage_record(&self, payment_hash: &str) -> Option<UsageRecord> {
        self.record(payment_hash).map(|r| r.lock().clone())
    }

    /// Sweep every `interval` until the store is dropped.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        max_age: Duration,
    ) -> tokio::task::JoinHandle<()> {
        let store: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(store) = store.upgrade() else {
                    break;
                };
                let _removed = store.sweep_now(Utc::now(), max_age);

                #[cfg(feature = "tracing")]
                if _removed > 0 {
                    tracing::debug!("Swept {_removed} token records");
                }
            }
        })
    }

    fn sweep_now(&self, now: DateTime<Utc>, max_age: Duration) -> usize {
        let max_age = chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX);
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|_, record| {
            let record = record.lock();
            match record.expires_at {
                Some(expires_at) => expires_at > now,
                None => now.signed_duration_since(record.last_used) <= max_age,
            }
        });
        before - records.len()
    }
}

impl TokenStore for MemoryTokenStore {
    type Error = Infallible;

    async fn get_usage(&self, payment_hash: &str) -> Result<u64, Self::Error> {
        Ok(self
            .record(payment_hash)
            .map(|r| r.lock().count)
            .unwrap_or(0))
    }

    async fn increment_usage(&self, payment_hash: &str) -> Result<u64, Self::Error> {
        let record = self.record_or_insert(payment_hash, None);
        let mut record = record.lock();
        record.count += 1;
        record.last_used = Utc::now();
        Ok(record.count)
    }

    async fn is_revoked(&self, payment_hash: &str) -> Result<bool, Self::Error> {
        Ok(self
            .record(payment_hash)
            .is_some_and(|r| r.lock().revoked))
    }

    async fn revoke(&self, payment_hash: &str) -> Result<(), Self::Error> {
        self.record_or_insert(payment_hash, None).lock().revoked = true;
        Ok(())
    }

    async fn record_token(
        &self,
        payment_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), Self::Error> {
        let record = self.record_or_insert(payment_hash, Some(expires_at));
        record.lock().expires_at = Some(expires_at);
        Ok(())
    }

    async fn redeem(
        &self,
        payment_hash: &str,
        max_uses: u64,
        expires_at: DateTime<Utc>,
    ) -> Result<Redemption, Self::Error> {
        let record = self.record_or_insert(payment_hash, Some(expires_at));
        let mut record = record.lock();
        if record.expires_at.is_none() {
            record.expires_at = Some(expires_at);
        }
        if record.revoked {
            return Ok(Redemption::Revoked);
        }

        record.count += 1;
        record.last_used = Utc::now();
        if record.count > max_uses {
            record.revoked = true;
            return Ok(Redemption::Exhausted { max_uses });
        }

        Ok(Redemption::Granted {
            usage_count: record.count,
        })
    }

    async fn metrics(&self) -> Result<StoreMetrics, Self::Error> {
        let records = self.records.read();
        let revoked = records.values().filter(|r| r.lock().revoked).count() as u64;
        let total = records.len() as u64;
        Ok(StoreMetrics {
            active_tokens: total - revoked,
            revoked_tokens: revoked,
            total_payments: total,
        })
    }

    async fn sweep(&self, now: DateTime<Utc>, max_age: Duration) -> Result<usize, Self::Error> {
        Ok(self.sweep_now(now, max_age))
    }
}
