//! Context cache
//!
//! Per-user, per-key TTL cache of the state the instruction builder needs on
//! every turn. Entries live in the store (`context_cache` collection, indexed
//! by `(user_id, cache_key)`) so they survive restarts and are visible to every
//! process sharing the store.
//!
//! # Coherence
//!
//! - A read past `expires_at` is a miss and triggers a synchronous rebuild.
//! - Writers emit a [`CacheEvent`]; every entry subscribed to it is deleted in
//!   the same write batch as the data change (see [`ContextCache::invalidation_batch`]).
//! - Each `(user, event)` pair carries an epoch counter bumped by the same
//!   batch. Rebuilds snapshot the epochs before reading the store, so an entry
//!   built from data that was overwritten mid-rebuild is recognised as stale on
//!   the next read.
//! - Day-scoped keys record the local date they were built for. After the
//!   user's midnight such an entry is a miss even if its TTL has not run out.
//! - Entries are never updated in place. A rebuild atomically replaces the
//!   existing entry for its key.
//!
//! Rebuild failures propagate as [`NutriError::CacheRebuild`]; there is no
//! fallback to an empty payload.

mod rebuild;

pub use rebuild::{CacheRebuilder, StoreRebuilder};

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::config::Config;
use crate::domain::{CoreStats, Preferences, ThreadContext, TodayFoodLog, UserProfile, WeightTrend};
use crate::error::{NutriError, Result};
use crate::store::{collections, Document, Filter, Store, WriteBatch};

const EPOCH_FIELD: &str = "value";
const MAX_TTL_SECS: u64 = 10 * 365 * 24 * 3600;

// ============================================================================
// Keys and events
// ============================================================================

/// The fixed set of cached context slices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    CoreStats,
    Profile,
    Preferences,
    WeightTrend,
    TodayFoodLog,
    ThreadContext,
}

impl CacheKey {
    pub fn all() -> [CacheKey; 6] {
        [
            CacheKey::CoreStats,
            CacheKey::Profile,
            CacheKey::Preferences,
            CacheKey::WeightTrend,
            CacheKey::TodayFoodLog,
            CacheKey::ThreadContext,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheKey::CoreStats => "coreStats",
            CacheKey::Profile => "profile",
            CacheKey::Preferences => "preferences",
            CacheKey::WeightTrend => "weightTrend",
            CacheKey::TodayFoodLog => "todayFoodLog",
            CacheKey::ThreadContext => "threadContext",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::all().into_iter().find(|k| k.as_str() == s)
    }

    /// Events that evict this key.
    pub fn invalidate_on(&self) -> &'static [CacheEvent] {
        match self {
            CacheKey::CoreStats => &[
                CacheEvent::FoodLogged,
                CacheEvent::WeightLogged,
                CacheEvent::ProfileUpdated,
            ],
            CacheKey::Profile => &[
                CacheEvent::ProfileUpdated,
                CacheEvent::OnboardingUpdated,
                CacheEvent::WeightLogged,
            ],
            CacheKey::Preferences => &[CacheEvent::PreferencesUpdated],
            CacheKey::WeightTrend => &[CacheEvent::WeightLogged],
            CacheKey::TodayFoodLog => &[CacheEvent::FoodLogged],
            CacheKey::ThreadContext => &[CacheEvent::ThreadStarted],
        }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named signals emitted by writers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheEvent {
    FoodLogged,
    WeightLogged,
    ProfileUpdated,
    PreferencesUpdated,
    OnboardingUpdated,
    ThreadStarted,
}

impl CacheEvent {
    pub fn all() -> [CacheEvent; 6] {
        [
            CacheEvent::FoodLogged,
            CacheEvent::WeightLogged,
            CacheEvent::ProfileUpdated,
            CacheEvent::PreferencesUpdated,
            CacheEvent::OnboardingUpdated,
            CacheEvent::ThreadStarted,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheEvent::FoodLogged => "food_logged",
            CacheEvent::WeightLogged => "weight_logged",
            CacheEvent::ProfileUpdated => "profile_updated",
            CacheEvent::PreferencesUpdated => "preferences_updated",
            CacheEvent::OnboardingUpdated => "onboarding_updated",
            CacheEvent::ThreadStarted => "thread_started",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::all().into_iter().find(|e| e.as_str() == s)
    }
}

impl std::fmt::Display for CacheEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Entries
// ============================================================================

/// Stored form of a cache entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    data: Value,
    expires_at: DateTime<Utc>,
    invalidate_on: Vec<String>,
    /// Event epochs observed before the rebuild read the store
    epochs: HashMap<String, u64>,
    /// Local date a day-scoped payload was built for
    #[serde(default)]
    built_for: Option<NaiveDate>,
}

impl CacheEntry {
    fn is_fresh(
        &self,
        now: DateTime<Utc>,
        current: &HashMap<String, u64>,
        today: Option<NaiveDate>,
    ) -> bool {
        if now >= self.expires_at || self.built_for != today {
            return false;
        }
        self.invalidate_on.iter().all(|event| {
            self.epochs.get(event).copied().unwrap_or(0)
                == current.get(event).copied().unwrap_or(0)
        })
    }
}

// ============================================================================
// Cache
// ============================================================================

/// Store-backed context cache.
pub struct ContextCache {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    rebuilder: Arc<dyn CacheRebuilder>,
    ttls: HashMap<CacheKey, Duration>,
}

impl ContextCache {
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        rebuilder: Arc<dyn CacheRebuilder>,
        config: &Config,
    ) -> Self {
        let ttls = CacheKey::all()
            .into_iter()
            .map(|key| {
                let secs = config.cache_ttl(key).as_secs().min(MAX_TTL_SECS);
                (key, Duration::seconds(secs as i64))
            })
            .collect();
        Self {
            store,
            clock,
            rebuilder,
            ttls,
        }
    }

    /// Cached data for `(user_id, key)`, rebuilding synchronously on a miss.
    pub async fn get(&self, user_id: &str, key: CacheKey) -> Result<Value> {
        let now = self.clock.now();
        let existing = self
            .store
            .query(collections::CONTEXT_CACHE, user_id, Some(key.as_str()))
            .await
            .map_err(|e| NutriError::cache_rebuild(key, e))?;

        if !existing.is_empty() {
            let epochs = self
                .current_epochs(user_id)
                .await
                .map_err(|e| NutriError::cache_rebuild(key, e))?;
            let today = self
                .rebuilder
                .day_scope(user_id, key)
                .await
                .map_err(|e| NutriError::cache_rebuild(key, e))?;
            if let Some(data) = fresh_data(&existing, now, &epochs, today) {
                debug!(user_id = %user_id, key = %key, "Context cache hit");
                return Ok(data);
            }
        }

        debug!(user_id = %user_id, key = %key, "Context cache miss");
        self.rebuild(user_id, key).await
    }

    /// Typed variant of [`ContextCache::get`].
    pub async fn get_as<T: DeserializeOwned>(&self, user_id: &str, key: CacheKey) -> Result<T> {
        let data = self.get(user_id, key).await?;
        serde_json::from_value(data).map_err(|e| NutriError::cache_rebuild(key, e))
    }

    pub async fn core_stats(&self, user_id: &str) -> Result<CoreStats> {
        self.get_as(user_id, CacheKey::CoreStats).await
    }

    pub async fn profile(&self, user_id: &str) -> Result<UserProfile> {
        self.get_as(user_id, CacheKey::Profile).await
    }

    pub async fn preferences(&self, user_id: &str) -> Result<Preferences> {
        self.get_as(user_id, CacheKey::Preferences).await
    }

    pub async fn weight_trend(&self, user_id: &str) -> Result<WeightTrend> {
        self.get_as(user_id, CacheKey::WeightTrend).await
    }

    pub async fn today_food_log(&self, user_id: &str) -> Result<TodayFoodLog> {
        self.get_as(user_id, CacheKey::TodayFoodLog).await
    }

    pub async fn thread_context(&self, user_id: &str) -> Result<Option<ThreadContext>> {
        self.get_as(user_id, CacheKey::ThreadContext).await
    }

    /// Evict every entry of the user subscribed to `event`.
    pub async fn invalidate(&self, user_id: &str, event: CacheEvent) -> Result<()> {
        self.store
            .apply(Self::invalidation_batch(user_id, &[event]))
            .await?;
        crate::log_component!(
            debug,
            "context_cache",
            "Context cache invalidated",
            user_id = user_id,
            event = event.as_str()
        );
        Ok(())
    }

    /// Evict one key directly.
    pub async fn invalidate_key(&self, user_id: &str, key: CacheKey) -> Result<()> {
        self.store
            .apply(WriteBatch::new().delete_where(
                collections::CONTEXT_CACHE,
                user_id,
                Filter::KeyEquals(key.as_str().to_string()),
            ))
            .await?;
        debug!(user_id = %user_id, key = %key, "Context cache key invalidated");
        Ok(())
    }

    /// Write ops that evict entries for `events` and bump their epochs.
    ///
    /// Writers append this to the batch carrying their data change so the
    /// eviction commits atomically with it.
    pub fn invalidation_batch(user_id: &str, events: &[CacheEvent]) -> WriteBatch {
        events.iter().fold(WriteBatch::new(), |batch, event| {
            batch
                .delete_where(
                    collections::CONTEXT_CACHE,
                    user_id,
                    Filter::ArrayContains {
                        field: "invalidate_on".to_string(),
                        value: json!(event.as_str()),
                    },
                )
                .increment(collections::CACHE_EPOCHS, user_id, event.as_str(), EPOCH_FIELD)
        })
    }

    async fn rebuild(&self, user_id: &str, key: CacheKey) -> Result<Value> {
        // Epochs first: a write landing after this point makes the entry stale.
        let epochs = self
            .current_epochs(user_id)
            .await
            .map_err(|e| NutriError::cache_rebuild(key, e))?;
        let built_for = self
            .rebuilder
            .day_scope(user_id, key)
            .await
            .map_err(|e| NutriError::cache_rebuild(key, e))?;

        let data = self
            .rebuilder
            .rebuild(user_id, key)
            .await
            .map_err(|e| match e {
                NutriError::CacheRebuild { .. } => e,
                other => NutriError::cache_rebuild(key, other),
            })?;

        let ttl = self
            .ttls
            .get(&key)
            .copied()
            .unwrap_or_else(|| Duration::seconds(60));
        let entry = CacheEntry {
            data: data.clone(),
            expires_at: self.clock.now() + ttl,
            invalidate_on: key
                .invalidate_on()
                .iter()
                .map(|e| e.as_str().to_string())
                .collect(),
            epochs: key
                .invalidate_on()
                .iter()
                .map(|e| {
                    let name = e.as_str().to_string();
                    let epoch = epochs.get(&name).copied().unwrap_or(0);
                    (name, epoch)
                })
                .collect(),
            built_for,
        };
        let body = serde_json::to_value(&entry).map_err(|e| NutriError::cache_rebuild(key, e))?;

        let write = WriteBatch::new()
            .delete_where(
                collections::CONTEXT_CACHE,
                user_id,
                Filter::KeyEquals(key.as_str().to_string()),
            )
            .insert(collections::CONTEXT_CACHE, user_id, key.as_str(), body);
        if let Err(e) = self.store.apply(write).await {
            // The freshly built data is still correct to return.
            warn!(user_id = %user_id, key = %key, error = %e, "Failed to store cache entry");
        }

        Ok(data)
    }

    async fn current_epochs(&self, user_id: &str) -> Result<HashMap<String, u64>> {
        let docs = self
            .store
            .query(collections::CACHE_EPOCHS, user_id, None)
            .await?;
        Ok(docs
            .into_iter()
            .map(|d| {
                let value = d.body.get(EPOCH_FIELD).and_then(Value::as_u64).unwrap_or(0);
                (d.key, value)
            })
            .collect())
    }
}

/// Data of the newest fresh entry, if any.
fn fresh_data(
    docs: &[Document],
    now: DateTime<Utc>,
    epochs: &HashMap<String, u64>,
    today: Option<NaiveDate>,
) -> Option<Value> {
    docs.iter().rev().find_map(|doc| {
        let entry: CacheEntry = serde_json::from_value(doc.body.clone()).ok()?;
        entry.is_fresh(now, epochs, today).then_some(entry.data)
    })
}
