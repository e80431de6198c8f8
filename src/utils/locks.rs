//! Per-key async locks.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

/// Map of per-key locks, guarded by the caller's own mutex.
pub type LockMap = HashMap<String, Arc<Mutex<()>>>;

/// The lock for `key`, creating it if needed.
///
/// Entries nobody else holds a handle to are dropped first, so the map only
/// keeps locks that are in use.
pub fn keyed_lock(locks: &mut LockMap, key: &str) -> Arc<Mutex<()>> {
    locks.retain(|k, lock| k == key || Arc::strong_count(lock) > 1);
    locks
        .entry(key.to_string())
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_same_key_shares_a_lock() {
        let mut locks = LockMap::new();
        let a = keyed_lock(&mut locks, "t1");
        let b = keyed_lock(&mut locks, "t1");
        assert!(Arc::ptr_eq(&a, &b));
        let _guard = a.lock().await;
        assert!(b.try_lock().is_err());
    }

    #[test]
    fn test_idle_entries_are_dropped() {
        let mut locks = LockMap::new();
        for i in 0..100 {
            let lock = keyed_lock(&mut locks, &format!("t{}", i));
            drop(lock);
        }
        assert_eq!(locks.len(), 1);
    }

    #[test]
    fn test_held_entries_survive() {
        let mut locks = LockMap::new();
        let held = keyed_lock(&mut locks, "busy");
        keyed_lock(&mut locks, "other");
        keyed_lock(&mut locks, "third");
        assert!(locks.contains_key("busy"));
        assert!(!locks.contains_key("other"));
        assert_eq!(locks.len(), 2);
        drop(held);
    }
}
