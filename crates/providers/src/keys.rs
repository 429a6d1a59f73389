//! API key rotation.
//!
//! One rotator per provider, shared by every concurrent request. The key order
//! is shuffled once at construction so that several processes started with the
//! same key list do not all hammer the first key.

use rand::seq::SliceRandom;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug)]
struct RotatorState {
    keys: Vec<String>,
    cursor: usize,
}

#[derive(Debug)]
pub struct KeyRotator {
    state: Mutex<RotatorState>,
}

impl KeyRotator {
    /// Create a rotator over `keys` in a random order.
    pub fn new(keys: Vec<String>) -> Self {
        let mut keys = keys;
        keys.shuffle(&mut rand::rng());
        Self::in_order(keys)
    }

    /// Create a rotator that keeps the given order.
    pub fn in_order(keys: Vec<String>) -> Self {
        Self {
            state: Mutex::new(RotatorState { keys, cursor: 0 }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RotatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The active key, if any remain.
    pub fn current(&self) -> Option<String> {
        let state = self.lock();
        state.keys.get(state.cursor).cloned()
    }

    /// Advance to the next key.
    ///
    /// Returns `None` (and changes nothing) when there is no other key to move to.
    pub fn rotate(&self) -> Option<String> {
        let mut state = self.lock();
        if state.keys.len() < 2 {
            return None;
        }
        state.cursor = (state.cursor + 1) % state.keys.len();
        Some(rotation_message(&state.keys[state.cursor]))
    }

    /// Advance only if `failed` is still the active key.
    ///
    /// Concurrent requests that hit the same rate limit rotate once, not once each.
    pub fn rotate_past(&self, failed: &str) -> Option<String> {
        let mut state = self.lock();
        if state.keys.len() < 2 {
            return None;
        }
        if state.keys.get(state.cursor).map(String::as_str) == Some(failed) {
            state.cursor = (state.cursor + 1) % state.keys.len();
        }
        Some(rotation_message(&state.keys[state.cursor]))
    }

    /// Drop the active key from the pool for the rest of the process lifetime.
    pub fn remove_current(&self) -> Option<String> {
        let mut state = self.lock();
        if state.keys.is_empty() {
            return None;
        }
        let cursor = state.cursor;
        let removed = state.keys.remove(cursor);
        if state.cursor >= state.keys.len() {
            state.cursor = 0;
        }
        Some(removed)
    }

    /// Drop a specific key; returns whether it was still in the pool.
    pub fn remove(&self, key: &str) -> bool {
        let mut state = self.lock();
        let Some(index) = state.keys.iter().position(|k| k == key) else {
            return false;
        };
        state.keys.remove(index);
        if index < state.cursor {
            state.cursor -= 1;
        }
        if state.cursor >= state.keys.len() {
            state.cursor = 0;
        }
        true
    }

    pub fn len(&self) -> usize {
        self.lock().keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().keys.is_empty()
    }

    /// Masked keys in rotation order, for display.
    pub fn masked(&self) -> Vec<String> {
        self.lock().keys.iter().map(|k| suffix(k)).collect()
    }
}

/// `...abcd` for a key ending in `abcd`.
pub fn suffix(key: &str) -> String {
    let tail: Vec<char> = key.chars().rev().take(4).collect();
    let tail: String = tail.into_iter().rev().collect();
    format!("...{tail}")
}

fn rotation_message(key: &str) -> String {
    format!("rotating to key ending in {}", suffix(key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn keys(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("sk-test-key-{i:04}")).collect()
    }

    #[test]
    fn single_key_never_rotates() {
        let rotator = KeyRotator::new(keys(1));
        let before = rotator.current();
        assert_eq!(rotator.rotate(), None);
        assert_eq!(rotator.current(), before);
    }

    #[test]
    fn rotation_covers_every_key() {
        for n in 1..=6 {
            let rotator = KeyRotator::new(keys(n));
            let mut seen = HashSet::new();
            for _ in 0..3 * n {
                seen.insert(rotator.current().unwrap());
                rotator.rotate();
            }
            let expected: HashSet<String> = keys(n).into_iter().collect();
            assert_eq!(seen, expected, "n = {n}");
        }
    }

    #[test]
    fn rotate_message_names_suffix() {
        let rotator = KeyRotator::in_order(vec!["sk-aaaa1111".into(), "sk-bbbb2222".into()]);
        assert_eq!(
            rotator.rotate().as_deref(),
            Some("rotating to key ending in ...2222")
        );
        assert_eq!(rotator.current().as_deref(), Some("sk-bbbb2222"));
    }

    #[test]
    fn rotate_past_is_idempotent_for_the_same_failure() {
        let rotator = KeyRotator::in_order(keys(3));
        let first = rotator.current().unwrap();
        rotator.rotate_past(&first);
        rotator.rotate_past(&first);
        assert_eq!(rotator.current().unwrap(), keys(3)[1]);
    }

    #[test]
    fn removal_shrinks_pool() {
        let rotator = KeyRotator::in_order(keys(3));
        assert_eq!(rotator.remove_current().unwrap(), keys(3)[0]);
        assert_eq!(rotator.len(), 2);
        assert_eq!(rotator.current().unwrap(), keys(3)[1]);

        rotator.rotate();
        assert!(rotator.remove(&keys(3)[2]));
        assert!(!rotator.remove(&keys(3)[2]));
        assert_eq!(rotator.current().unwrap(), keys(3)[1]);

        rotator.remove_current();
        assert!(rotator.is_empty());
        assert_eq!(rotator.current(), None);
        assert_eq!(rotator.remove_current(), None);
    }

    #[test]
    fn masked_hides_key_body() {
        let rotator = KeyRotator::in_order(vec!["sk-secret-9876".into()]);
        assert_eq!(rotator.masked(), vec!["...9876"]);
        assert_eq!(suffix("ab"), "...ab");
    }
}
