//! Per-location counter table.
//!
//! Keys are locations quantised to two decimals. The table is bounded: touching a
//! bucket moves it to the back, and the front (least recently touched) is evicted
//! once the capacity is exceeded.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;

use crate::event::Location;

/// Two-decimal bucket key, e.g. `"40.71,-74.01"`.
pub fn bucket_key(loc: &Location) -> String {
    format!("{:.2},{:.2}", loc.lat, loc.lon)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BucketState {
    /// Social-media events since the last reset.
    pub social_media: u32,
    pub last_reset: DateTime<Utc>,
}

impl BucketState {
    fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            social_media: 0,
            last_reset: now,
        }
    }

    pub fn reset(&mut self, now: DateTime<Utc>) {
        self.social_media = 0;
        self.last_reset = now;
    }
}

#[derive(Debug)]
pub struct BucketTable {
    buckets: IndexMap<String, BucketState>,
    capacity: usize,
    evicted: u64,
}

impl BucketTable {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buckets: IndexMap::new(),
            capacity: capacity.max(1),
            evicted: 0,
        }
    }

    /// Get or lazily create the bucket for `key`, marking it most recently used.
    pub fn touch(&mut self, key: &str, now: DateTime<Utc>) -> &mut BucketState {
        match self.buckets.get_index_of(key) {
            Some(i) => {
                let last = self.buckets.len() - 1;
                if i != last {
                    self.buckets.move_index(i, last);
                }
            }
            None => {
                self.buckets.insert(key.to_string(), BucketState::fresh(now));
                while self.buckets.len() > self.capacity {
                    self.buckets.shift_remove_index(0);
                    self.evicted += 1;
                }
            }
        }

        // The touched bucket is always last.
        let last = self.buckets.len() - 1;
        &mut self.buckets[last]
    }

    pub fn get(&self, key: &str) -> Option<&BucketState> {
        self.buckets.get(key)
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Buckets dropped by the capacity bound since creation.
    pub fn evicted(&self) -> u64 {
        self.evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn nearby_points_collide() {
        let a = bucket_key(&Location::new(40.7128, -74.0060));
        let b = bucket_key(&Location::new(40.7149, -74.0091));
        assert_eq!(a, "40.71,-74.01");
        assert_eq!(a, b);
    }

    #[test]
    fn touch_creates_lazily_and_keeps_state() {
        let mut t = BucketTable::with_capacity(4);
        assert!(t.get("k").is_none());
        t.touch("k", t0()).social_media += 2;
        let later = t0() + chrono::Duration::seconds(5);
        let s = t.touch("k", later);
        assert_eq!(s.social_media, 2);
        assert_eq!(s.last_reset, t0());
    }

    #[test]
    fn retouching_moves_bucket_to_the_back() {
        let mut t = BucketTable::with_capacity(3);
        for k in ["a", "b", "c"] {
            t.touch(k, t0());
        }
        t.touch("a", t0()).social_media += 1;
        t.touch("a", t0()).social_media += 1;
        let order: Vec<&str> = t.buckets.keys().map(String::as_str).collect();
        assert_eq!(order, ["b", "c", "a"]);
        assert_eq!(t.get("a").unwrap().social_media, 2);

        t.touch("d", t0());
        assert!(t.get("b").is_none());
        assert_eq!(t.evicted(), 1);
    }

    #[test]
    fn evicts_least_recently_touched() {
        let mut t = BucketTable::with_capacity(2);
        t.touch("a", t0());
        t.touch("b", t0());
        t.touch("a", t0()); // a is now most recent
        t.touch("c", t0()); // evicts b
        assert_eq!(t.len(), 2);
        assert!(t.get("a").is_some());
        assert!(t.get("b").is_none());
        assert!(t.get("c").is_some());
        assert_eq!(t.evicted(), 1);
    }
}
