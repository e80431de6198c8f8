//! Typed accessors for the user-owned collections.
//!
//! Profiles and preferences are single documents per user (`key` is a fixed
//! name). Ledger rows are indexed by `(user_id, date)`.

use chrono::{FixedOffset, NaiveDate};
use serde_json::Value;

use super::{collections, Document, Store};
use crate::clock::offset_from_minutes;
use crate::domain::{FoodEntry, Preferences, UserProfile, WeightEntry};
use crate::error::{NutriError, Result};

pub const PROFILE_KEY: &str = "profile";
pub const PREFERENCES_KEY: &str = "preferences";

/// Index key for a calendar date.
pub fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// The user's profile document, if one exists. When concurrent first writes
/// produced more than one, the oldest wins.
pub async fn find_profile(store: &dyn Store, user_id: &str) -> Result<Option<Document>> {
    Ok(store
        .query(collections::PROFILES, user_id, Some(PROFILE_KEY))
        .await?
        .into_iter()
        .next())
}

/// The user's profile, or a fresh default one.
pub async fn load_profile(store: &dyn Store, user_id: &str) -> Result<UserProfile> {
    match find_profile(store, user_id).await? {
        Some(doc) => doc.decode(),
        None => Ok(UserProfile::default()),
    }
}

/// Fetch the profile document, creating a default one when absent.
pub async fn ensure_profile(store: &dyn Store, user_id: &str) -> Result<Document> {
    if let Some(doc) = find_profile(store, user_id).await? {
        return Ok(doc);
    }
    let body = serde_json::to_value(UserProfile::default())?;
    store
        .insert(collections::PROFILES, user_id, PROFILE_KEY, body)
        .await
}

pub async fn find_preferences(store: &dyn Store, user_id: &str) -> Result<Option<Document>> {
    Ok(store
        .query(collections::PREFERENCES, user_id, Some(PREFERENCES_KEY))
        .await?
        .into_iter()
        .next())
}

pub async fn load_preferences(store: &dyn Store, user_id: &str) -> Result<Preferences> {
    match find_preferences(store, user_id).await? {
        Some(doc) => doc.decode(),
        None => Ok(Preferences::default()),
    }
}

pub async fn ensure_preferences(store: &dyn Store, user_id: &str) -> Result<Document> {
    if let Some(doc) = find_preferences(store, user_id).await? {
        return Ok(doc);
    }
    let body = serde_json::to_value(Preferences::default())?;
    store
        .insert(collections::PREFERENCES, user_id, PREFERENCES_KEY, body)
        .await
}

/// Food ledger rows for one local date, in logging order.
pub async fn food_entries(
    store: &dyn Store,
    user_id: &str,
    date: NaiveDate,
) -> Result<Vec<FoodEntry>> {
    store
        .query(collections::FOOD_LOGS, user_id, Some(&date_key(date)))
        .await?
        .iter()
        .map(Document::decode)
        .collect()
}

/// Every weight ledger row for the user, in logging order.
pub async fn weight_entries(store: &dyn Store, user_id: &str) -> Result<Vec<WeightEntry>> {
    store
        .query(collections::WEIGHT_LOGS, user_id, None)
        .await?
        .iter()
        .map(Document::decode)
        .collect()
}

/// The user's UTC offset, falling back to the configured default.
pub fn user_offset(profile: &UserProfile, default_minutes: i32) -> FixedOffset {
    offset_from_minutes(profile.utc_offset_minutes.unwrap_or(default_minutes))
}

/// Serialize a record into a JSON object suitable for [`Store::patch`].
pub fn to_fields<T: serde::Serialize>(record: &T) -> Result<Value> {
    let value = serde_json::to_value(record)?;
    if !value.is_object() {
        return Err(NutriError::Store(
            "record did not serialize to a JSON object".into(),
        ));
    }
    Ok(value)
}
