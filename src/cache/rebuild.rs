//! Rebuild functions: pure reads of the store that produce cache payloads.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;

use super::CacheKey;
use crate::clock::{local_date, Clock};
use crate::domain::{CoreStats, TodayFoodLog, WeightTrend};
use crate::error::Result;
use crate::store::{records, Store};
use crate::threads;

/// Number of readings kept in the weight trend.
const WEIGHT_TREND_READINGS: usize = 14;

/// Produces the payload for one cache key. Must not write.
#[async_trait]
pub trait CacheRebuilder: Send + Sync {
    async fn rebuild(&self, user_id: &str, key: CacheKey) -> Result<Value>;

    /// Local day a payload for `key` is scoped to, if it is day-scoped.
    /// An entry built for another day is a miss.
    async fn day_scope(&self, _user_id: &str, _key: CacheKey) -> Result<Option<NaiveDate>> {
        Ok(None)
    }
}

/// Rebuilds every key from the store.
pub struct StoreRebuilder {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    default_offset_minutes: i32,
}

impl StoreRebuilder {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, default_offset_minutes: i32) -> Self {
        Self {
            store,
            clock,
            default_offset_minutes,
        }
    }

    async fn today(&self, user_id: &str) -> Result<NaiveDate> {
        let profile = records::load_profile(self.store.as_ref(), user_id).await?;
        let offset = records::user_offset(&profile, self.default_offset_minutes);
        Ok(local_date(self.clock.now(), offset))
    }
}

#[async_trait]
impl CacheRebuilder for StoreRebuilder {
    async fn rebuild(&self, user_id: &str, key: CacheKey) -> Result<Value> {
        let store = self.store.as_ref();
        let value = match key {
            CacheKey::Profile => serde_json::to_value(records::load_profile(store, user_id).await?)?,
            CacheKey::Preferences => {
                serde_json::to_value(records::load_preferences(store, user_id).await?)?
            }
            CacheKey::WeightTrend => {
                let entries = records::weight_entries(store, user_id).await?;
                serde_json::to_value(WeightTrend::compute(&entries, WEIGHT_TREND_READINGS))?
            }
            CacheKey::CoreStats | CacheKey::TodayFoodLog | CacheKey::ThreadContext => {
                let profile = records::load_profile(store, user_id).await?;
                let offset = records::user_offset(&profile, self.default_offset_minutes);
                let today = local_date(self.clock.now(), offset);
                match key {
                    CacheKey::CoreStats => {
                        let entries = records::food_entries(store, user_id, today).await?;
                        serde_json::to_value(CoreStats::compute(today, &entries, &profile))?
                    }
                    CacheKey::TodayFoodLog => {
                        let entries = records::food_entries(store, user_id, today).await?;
                        serde_json::to_value(TodayFoodLog::compute(today, &entries))?
                    }
                    _ => {
                        let current = threads::current_thread(store, user_id, today).await?;
                        serde_json::to_value(current.map(|t| t.context()))?
                    }
                }
            }
        };
        Ok(value)
    }

    async fn day_scope(&self, user_id: &str, key: CacheKey) -> Result<Option<NaiveDate>> {
        match key {
            CacheKey::CoreStats | CacheKey::TodayFoodLog | CacheKey::ThreadContext => {
                Ok(Some(self.today(user_id).await?))
            }
            _ => Ok(None),
        }
    }
}
