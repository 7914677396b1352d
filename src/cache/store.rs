//! The process-scoped TTL store.

use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use metrics::counter;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tracing::warn;

use super::lock::{rw_read, rw_write};
use super::signature::CallSignature;

const SOURCE: &str = "cache::store";

struct CacheEntry {
    value: serde_json::Value,
    stored_at: Instant,
}

/// Per-signature slot. The async mutex gives single-flight behaviour:
/// concurrent misses on one signature serialize, so the upstream sees one
/// call per expiry window instead of a herd.
#[derive(Default)]
struct Slot {
    flight: Mutex<()>,
    entry: RwLock<Option<CacheEntry>>,
}

/// Memoizes successful results for a bounded time.
///
/// Values round-trip through JSON so one cache instance serves
/// heterogeneous result types; a stored value that no longer deserializes
/// is treated as a miss and overwritten. Failures are never stored, and
/// expiry is checked only on read — there is no background sweeper.
pub struct TtlCache {
    slots: DashMap<CallSignature, Arc<Slot>>,
}

impl TtlCache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
        }
    }

    /// Number of signatures that have ever stored or attempted a value.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Return the cached value for `signature` if still live, otherwise run
    /// `op` and store its successful result for `ttl`.
    pub async fn get_or_try_insert_with<V, E, F, Fut>(
        &self,
        signature: CallSignature,
        ttl: Duration,
        op: F,
    ) -> Result<V, E>
    where
        V: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let slot = self.slot(&signature);
        let _flight = slot.flight.lock().await;

        if let Some(value) = read_fresh::<V>(&slot, &signature, ttl) {
            counter!("plateful_cache_hit_total").increment(1);
            return Ok(value);
        }
        counter!("plateful_cache_miss_total").increment(1);

        let value = op().await?;
        match serde_json::to_value(&value) {
            Ok(raw) => {
                *rw_write(&slot.entry, SOURCE, "store") = Some(CacheEntry {
                    value: raw,
                    stored_at: Instant::now(),
                });
                counter!("plateful_cache_store_total").increment(1);
            }
            Err(err) => {
                warn!(
                    signature = %signature,
                    error = %err,
                    "result is not cacheable; returning it uncached"
                );
            }
        }
        Ok(value)
    }

    fn slot(&self, signature: &CallSignature) -> Arc<Slot> {
        self.slots
            .entry(signature.clone())
            .or_insert_with(|| Arc::new(Slot::default()))
            .clone()
    }
}

impl Default for TtlCache {
    fn default() -> Self {
        Self::new()
    }
}

fn read_fresh<V: DeserializeOwned>(
    slot: &Slot,
    signature: &CallSignature,
    ttl: Duration,
) -> Option<V> {
    let guard = rw_read(&slot.entry, SOURCE, "read");
    let entry = guard.as_ref()?;
    if entry.stored_at.elapsed() >= ttl {
        return None;
    }
    match serde_json::from_value(entry.value.clone()) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(
                signature = %signature,
                error = %err,
                "cached value no longer deserializes; treating as a miss"
            );
            None
        }
    }
}
