//! Short-window duplicate guard for commit tools.
//!
//! Remembers recent ledger writes keyed by `(user, kind, bucket)`; for food
//! the bucket is the meal type plus the calorie total rounded to a step. A
//! second commit with the same key inside the window is refused as a likely
//! repeat.
//!
//! This is a heuristic. Two genuinely different snacks with the same rounded
//! calories inside the window are refused (false positive), and the same meal
//! re-proposed with slightly different numbers is accepted (false negative).
//! The strong once-per-confirmation guarantee comes from the store
//! precondition on the pending record, not from here.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};

use crate::clock::Clock;
use crate::domain::{round_to_step, MealType};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DuplicateKey(String);

impl DuplicateKey {
    pub fn food(user_id: &str, meal_type: MealType, rounded_calories: i64) -> Self {
        Self(format!("{}|food|{}|{}", user_id, meal_type, rounded_calories))
    }

    /// Weight readings bucket to 0.1 kg.
    pub fn weight(user_id: &str, weight_kg: f64) -> Self {
        Self(format!(
            "{}|weight|{}",
            user_id,
            round_to_step(weight_kg * 10.0, 1)
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// In-memory recent-write record with TTL and size cap.
pub struct DuplicateGuard {
    entries: Mutex<HashMap<DuplicateKey, DateTime<Utc>>>,
    window: Duration,
    max_entries: usize,
    clock: Arc<dyn Clock>,
}

impl DuplicateGuard {
    pub fn new(window: std::time::Duration, max_entries: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            window: Duration::seconds(window.as_secs().min(i32::MAX as u64) as i64),
            max_entries: max_entries.max(1),
            clock,
        }
    }

    /// Whether a write with this key happened inside the window.
    pub fn is_recent(&self, key: &DuplicateKey) -> bool {
        let now = self.clock.now();
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries
            .get(key)
            .map(|recorded_at| now - *recorded_at < self.window)
            .unwrap_or(false)
    }

    /// Claim `key` for a write about to happen. Returns `false` when a write
    /// with this key is already inside the window. Check and claim happen
    /// under one lock, so of two concurrent callers only one gets `true`.
    pub fn try_reserve(&self, key: &DuplicateKey) -> bool {
        let now = self.clock.now();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());

        // Evict expired entries first
        let cutoff = now - self.window;
        entries.retain(|_, recorded_at| *recorded_at > cutoff);
        if entries.contains_key(key) {
            return false;
        }

        // Evict oldest if at capacity
        if entries.len() >= self.max_entries {
            if let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, t)| **t)
                .map(|(k, _)| k.clone())
            {
                entries.remove(&oldest);
            }
        }

        entries.insert(key.clone(), now);
        true
    }

    /// Drop a claim whose write did not happen.
    pub fn release(&self, key: &DuplicateKey) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.remove(key);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;

    fn guard(max_entries: usize) -> (DuplicateGuard, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        ));
        (
            DuplicateGuard::new(std::time::Duration::from_secs(30), max_entries, clock.clone()),
            clock,
        )
    }

    #[test]
    fn test_recent_write_detected() {
        let (guard, _) = guard(100);
        let key = DuplicateKey::food("u1", MealType::Snack, 110);
        assert!(!guard.is_recent(&key));
        assert!(guard.try_reserve(&key));
        assert!(guard.is_recent(&key));
        assert!(!guard.try_reserve(&key));
    }

    #[test]
    fn test_release_frees_the_key() {
        let (guard, _) = guard(100);
        let key = DuplicateKey::food("u1", MealType::Snack, 110);
        assert!(guard.try_reserve(&key));
        guard.release(&key);
        assert!(!guard.is_recent(&key));
        assert!(guard.try_reserve(&key));
    }

    #[test]
    fn test_concurrent_reserve_admits_one() {
        let (guard, _) = guard(100);
        let guard = Arc::new(guard);
        let key = DuplicateKey::weight("u1", 70.0);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let guard = guard.clone();
                let key = key.clone();
                std::thread::spawn(move || guard.try_reserve(&key))
            })
            .collect();
        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(admitted, 1);
    }

    #[test]
    fn test_window_expires() {
        let (guard, clock) = guard(100);
        let key = DuplicateKey::food("u1", MealType::Snack, 110);
        assert!(guard.try_reserve(&key));
        clock.advance(Duration::seconds(29));
        assert!(guard.is_recent(&key));
        clock.advance(Duration::seconds(1));
        assert!(!guard.is_recent(&key));
    }

    #[test]
    fn test_keys_are_scoped() {
        let (guard, _) = guard(100);
        assert!(guard.try_reserve(&DuplicateKey::food("u1", MealType::Snack, 110)));
        assert!(!guard.is_recent(&DuplicateKey::food("u2", MealType::Snack, 110)));
        assert!(!guard.is_recent(&DuplicateKey::food("u1", MealType::Lunch, 110)));
        assert!(!guard.is_recent(&DuplicateKey::food("u1", MealType::Snack, 120)));
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let (guard, clock) = guard(2);
        let a = DuplicateKey::weight("u1", 70.0);
        let b = DuplicateKey::weight("u1", 71.0);
        let c = DuplicateKey::weight("u1", 72.0);
        assert!(guard.try_reserve(&a));
        clock.advance(Duration::seconds(1));
        assert!(guard.try_reserve(&b));
        clock.advance(Duration::seconds(1));
        assert!(guard.try_reserve(&c));
        assert_eq!(guard.len(), 2);
        assert!(!guard.is_recent(&a));
        assert!(guard.is_recent(&c));
    }

    #[test]
    fn test_expired_entries_evicted_on_reserve() {
        let (guard, clock) = guard(100);
        assert!(guard.try_reserve(&DuplicateKey::weight("u1", 70.0)));
        clock.advance(Duration::minutes(5));
        assert!(guard.try_reserve(&DuplicateKey::weight("u1", 71.0)));
        assert_eq!(guard.len(), 1);
    }

    #[test]
    fn test_weight_key_buckets() {
        assert_eq!(
            DuplicateKey::weight("u1", 72.41),
            DuplicateKey::weight("u1", 72.44)
        );
        assert_ne!(
            DuplicateKey::weight("u1", 72.4),
            DuplicateKey::weight("u1", 72.5)
        );
    }
}
