// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-local TTL cache for docs completions.
//!
//! Stale reads are acceptable: docs output is advisory, so eviction is
//! lazy (checked on read, swept on write).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::provider::Completion;

struct CacheSlot {
    stored_at: Instant,
    completion: Completion,
}

/// TTL map keyed by `sha256(prompt):task:model`.
pub struct DocsCache {
    ttl: Duration,
    slots: Mutex<HashMap<String, CacheSlot>>,
}

impl DocsCache {
    /// A zero TTL disables the cache entirely.
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, slots: Mutex::new(HashMap::new()) }
    }

    pub fn enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    pub fn get(&self, key: &str) -> Option<Completion> {
        if !self.enabled() {
            return None;
        }
        let mut slots = self.slots.lock();
        match slots.get(key) {
            Some(slot) if slot.stored_at.elapsed() < self.ttl => Some(slot.completion.clone()),
            Some(_) => {
                slots.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, key: String, completion: Completion) {
        if !self.enabled() {
            return;
        }
        let mut slots = self.slots.lock();
        slots.retain(|_, slot| slot.stored_at.elapsed() < self.ttl);
        slots.insert(key, CacheSlot { stored_at: Instant::now(), completion });
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completion(text: &str) -> Completion {
        Completion {
            text: text.to_string(),
            provider: "gemini".to_string(),
            model: "gemini-2.0-flash".to_string(),
            usage: None,
        }
    }

    #[test]
    fn hit_within_ttl() {
        let cache = DocsCache::new(Duration::from_secs(60));
        cache.put("k".to_string(), completion("cached"));
        assert_eq!(cache.get("k").map(|c| c.text), Some("cached".to_string()));
    }

    #[test]
    fn expired_entries_are_evicted_on_read() {
        let cache = DocsCache::new(Duration::from_millis(1));
        cache.put("k".to_string(), completion("cached"));
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("k").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn zero_ttl_disables() {
        let cache = DocsCache::new(Duration::ZERO);
        cache.put("k".to_string(), completion("cached"));
        assert!(cache.get("k").is_none());
        assert!(cache.is_empty());
    }
}
